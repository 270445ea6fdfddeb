//! Appointment slot model.
//!
//! This module provides [`SlotRecord`], the normalized form of one item
//! returned by the portal's slot search, together with the identity types
//! used to de-duplicate slots across polling cycles:
//!
//! - [`PortalId`] - an identifier that may arrive as a JSON number or string
//! - [`SlotFingerprint`] - the comparison key of a bookable slot
//! - [`SeenSet`] - every fingerprint observed during one run

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Separator placed between fingerprint components.
///
/// Unit separator (U+001F). It is stripped from components before joining.
pub const FINGERPRINT_SEPARATOR: char = '\u{1f}';

/// An identifier as sent by the portal.
///
/// The search API is not consistent about id encoding: the same field may be
/// a number in one response and a numeric string in another. Numeric values
/// are stored in canonical decimal form so that `9`, `"9"` and `" 9 "` are
/// the same id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortalId(String);

impl PortalId {
    /// Creates an id from its textual form, canonicalizing numeric values.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        match trimmed.parse::<i64>() {
            Ok(n) => Self(n.to_string()),
            Err(_) => Self(trimmed.to_string()),
        }
    }

    /// Returns the id as a number, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    /// Returns the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the portal sent no id.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<i64> for PortalId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl From<&str> for PortalId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for PortalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for PortalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_i64() {
            Some(n) => serializer.serialize_i64(n),
            None => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for PortalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Float(f64),
            Text(String),
        }

        Ok(match Option::<RawId>::deserialize(deserializer)? {
            Some(RawId::Number(n)) => Self::from(n),
            Some(RawId::Float(f)) if f.fract() == 0.0 => Self::from(f as i64),
            Some(RawId::Float(f)) => Self(f.to_string()),
            Some(RawId::Text(s)) => Self::new(s),
            None => Self::default(),
        })
    }
}

/// An `{id, name}` pair nested in a search item (clinic, doctor, specialty).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    /// Portal identifier.
    #[serde(default)]
    pub id: PortalId,
    /// Display name as sent by the portal.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

impl NamedRef {
    /// Creates a new reference.
    pub fn new(id: impl Into<PortalId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One bookable appointment slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRecord {
    /// Appointment start in the portal's own format (`YYYY-MM-DDTHH:MM:SS`).
    #[serde(rename = "appointmentDate")]
    pub appointment_datetime: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clinic: NamedRef,
    #[serde(default, deserialize_with = "null_as_default")]
    pub doctor: NamedRef,
    #[serde(default, deserialize_with = "null_as_default")]
    pub specialty: NamedRef,
    /// Whether this is a remote (phone) consultation.
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_phone_consultation: bool,
}

impl SlotRecord {
    /// Creates a slot record.
    pub fn new(
        appointment_datetime: impl Into<String>,
        clinic: NamedRef,
        doctor: NamedRef,
        specialty: NamedRef,
    ) -> Self {
        Self {
            appointment_datetime: appointment_datetime.into(),
            clinic,
            doctor,
            specialty,
            is_phone_consultation: false,
        }
    }

    /// Builder method to mark the slot as a phone consultation.
    pub fn with_phone_consultation(mut self, phone: bool) -> Self {
        self.is_phone_consultation = phone;
        self
    }

    /// Returns the de-duplication key of this slot.
    pub fn fingerprint(&self) -> SlotFingerprint {
        SlotFingerprint::of(self)
    }

    /// Returns the doctor id as a number, if the portal sent a numeric one.
    pub fn doctor_id(&self) -> Option<i64> {
        self.doctor.id.as_i64()
    }
}

/// Comparison key identifying a bookable slot.
///
/// Built from the appointment time and the clinic, doctor and specialty ids
/// only, so cosmetic differences in display names never produce a new key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotFingerprint(String);

impl SlotFingerprint {
    /// Computes the fingerprint of a slot.
    pub fn of(slot: &SlotRecord) -> Self {
        let parts = [
            slot.appointment_datetime.as_str(),
            slot.clinic.id.as_str(),
            slot.doctor.id.as_str(),
            slot.specialty.id.as_str(),
        ];

        let mut key = String::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                key.push(FINGERPRINT_SEPARATOR);
            }
            key.extend(part.chars().filter(|c| *c != FINGERPRINT_SEPARATOR));
        }
        Self(key)
    }

    /// Returns the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Readable form for logs; the separator is a control character.
        for (i, part) in self.0.split(FINGERPRINT_SEPARATOR).enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(part)?;
        }
        Ok(())
    }
}

/// Every slot fingerprint observed during one run.
///
/// Grows monotonically and is never pruned; memory is proportional to the
/// number of distinct slots seen since the process started.
#[derive(Debug, Default)]
pub struct SeenSet {
    seen: HashSet<SlotFingerprint>,
}

impl SeenSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fingerprint. Returns true if it had not been seen before.
    pub fn insert(&mut self, fingerprint: SlotFingerprint) -> bool {
        self.seen.insert(fingerprint)
    }

    /// Returns true if the fingerprint has been recorded.
    pub fn contains(&self, fingerprint: &SlotFingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Records every slot and returns the ones not seen before, in order.
    ///
    /// Duplicates within `slots` itself are also collapsed to their first
    /// occurrence.
    pub fn retain_new(&mut self, slots: Vec<SlotRecord>) -> Vec<SlotRecord> {
        slots
            .into_iter()
            .filter(|slot| self.insert(slot.fingerprint()))
            .collect()
    }

    /// Number of distinct fingerprints seen.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns true if nothing has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(date: &str, clinic: i64, doctor: i64, specialty: i64) -> SlotRecord {
        SlotRecord::new(
            date,
            NamedRef::new(clinic, "Clinic"),
            NamedRef::new(doctor, "Doctor"),
            NamedRef::new(specialty, "Specialty"),
        )
    }

    #[test]
    fn portal_id_is_loose() {
        assert_eq!(PortalId::from(414656), PortalId::new("414656"));
        assert_eq!(PortalId::new(" 414656 ").as_i64(), Some(414656));
        assert_eq!(PortalId::new("abc").as_i64(), None);
        assert!(PortalId::default().is_empty());
    }

    #[test]
    fn portal_id_deserializes_numbers_and_strings() {
        let ids: Vec<PortalId> = serde_json::from_str(r#"[9, "9", 9.0, null, "x"]"#).unwrap();
        assert_eq!(ids[0], PortalId::from(9));
        assert_eq!(ids[1], PortalId::from(9));
        assert_eq!(ids[2], PortalId::from(9));
        assert!(ids[3].is_empty());
        assert_eq!(ids[4].as_str(), "x");
    }

    #[test]
    fn slot_deserializes_portal_item() {
        let json = r#"{
            "appointmentDate": "2026-10-20T09:00:00",
            "clinic": {"id": 1, "name": "A"},
            "doctor": {"id": "9", "name": "Dr X"},
            "specialty": {"id": 30, "name": "Uro"},
            "isPhoneConsultation": true,
            "bookingString": "ignored"
        }"#;
        let slot: SlotRecord = serde_json::from_str(json).unwrap();
        assert_eq!(slot.appointment_datetime, "2026-10-20T09:00:00");
        assert_eq!(slot.clinic.name, "A");
        assert_eq!(slot.doctor_id(), Some(9));
        assert_eq!(slot.specialty.id, PortalId::from(30));
        assert!(slot.is_phone_consultation);
    }

    #[test]
    fn slot_tolerates_null_nested_objects() {
        let json = r#"{"appointmentDate": "2026-10-20T09:00:00", "doctor": null, "isPhoneConsultation": null}"#;
        let slot: SlotRecord = serde_json::from_str(json).unwrap();
        assert!(slot.doctor.id.is_empty());
        assert_eq!(slot.doctor_id(), None);
        assert!(!slot.is_phone_consultation);
    }

    #[test]
    fn fingerprint_ignores_display_names() {
        let a = slot("2026-10-20T09:00:00", 1, 9, 30);
        let mut b = a.clone();
        b.clinic.name = "  CLINIC ".to_string();
        b.doctor.name = "dr x".to_string();
        b.is_phone_consultation = true;
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_on_any_id() {
        let base = slot("2026-10-20T09:00:00", 1, 9, 30);
        assert_ne!(base.fingerprint(), slot("2026-10-20T09:30:00", 1, 9, 30).fingerprint());
        assert_ne!(base.fingerprint(), slot("2026-10-20T09:00:00", 2, 9, 30).fingerprint());
        assert_ne!(base.fingerprint(), slot("2026-10-20T09:00:00", 1, 8, 30).fingerprint());
        assert_ne!(base.fingerprint(), slot("2026-10-20T09:00:00", 1, 9, 31).fingerprint());
    }

    #[test]
    fn fingerprint_components_cannot_collide_through_separator() {
        let mut a = slot("2026-10-20T09:00:00", 1, 9, 30);
        a.clinic.id = PortalId::new(format!("1{}9", FINGERPRINT_SEPARATOR));
        a.doctor.id = PortalId::default();
        let b = slot("2026-10-20T09:00:00", 1, 9, 30);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(
            a.fingerprint().as_str().matches(FINGERPRINT_SEPARATOR).count(),
            3
        );
    }

    #[test]
    fn fingerprint_display_is_readable() {
        let fp = slot("2026-10-20T09:00:00", 1, 9, 30).fingerprint();
        assert_eq!(fp.to_string(), "2026-10-20T09:00:00|1|9|30");
    }

    #[test]
    fn seen_set_reports_each_fingerprint_once() {
        let mut seen = SeenSet::new();
        let first = seen.retain_new(vec![
            slot("2026-10-20T09:00:00", 1, 9, 30),
            slot("2026-10-20T09:00:00", 1, 9, 30),
            slot("2026-10-20T10:00:00", 1, 9, 30),
        ]);
        assert_eq!(first.len(), 2);

        let second = seen.retain_new(vec![
            slot("2026-10-20T10:00:00", 1, 9, 30),
            slot("2026-10-21T08:00:00", 1, 9, 30),
        ]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].appointment_datetime, "2026-10-21T08:00:00");
        assert_eq!(seen.len(), 3);
    }
}
