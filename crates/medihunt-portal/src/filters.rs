//! Resolving region, specialty and doctor names to portal ids.
//!
//! Names are compared case-insensitively with whitespace collapsed. An exact
//! match wins over a substring match; among equals the first listed entry
//! wins.

use medihunt_core::PortalId;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::client::{AppointmentApi, FiltersQuery};
use crate::error::{PortalError, PortalResult};

/// Region id used to seed the filters lookup.
pub const BOOTSTRAP_REGION_ID: i64 = 204;
/// Specialty id used to seed the filters lookup.
pub const BOOTSTRAP_SPECIALTY_ID: i64 = 30;

/// Maximum length of the examples listed in a resolution error.
const EXAMPLES_MAX_CHARS: usize = 200;

/// One selectable value of the filters payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterEntry {
    /// Portal id.
    pub id: PortalId,
    /// Label shown by the portal.
    #[serde(rename = "value", default, deserialize_with = "null_as_empty")]
    pub display_name: String,
}

impl FilterEntry {
    /// Creates an entry.
    pub fn new(id: impl Into<PortalId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Response of the filters endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiltersPayload {
    /// Available regions.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub regions: Vec<FilterEntry>,
    /// Available specialties.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub specialties: Vec<FilterEntry>,
    /// Doctors for the queried region and specialty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub doctors: Vec<FilterEntry>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Outcome of matching a name against a list of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// The entry that matched.
    Resolved(&'a FilterEntry),
    /// Nothing matched; `examples` lists some valid names.
    NotResolved { examples: String },
}

/// Lower-cases `s` and collapses runs of whitespace.
pub fn normalize_name(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Matches `name` against `entries`: exact first, then substring.
pub fn match_entry<'a>(entries: &'a [FilterEntry], name: &str) -> Resolution<'a> {
    let wanted = normalize_name(name);
    if !wanted.is_empty() {
        let normalized: Vec<String> = entries
            .iter()
            .map(|e| normalize_name(&e.display_name))
            .collect();
        let hit = normalized
            .iter()
            .position(|n| *n == wanted)
            .or_else(|| normalized.iter().position(|n| n.contains(&wanted)));
        if let Some(index) = hit {
            return Resolution::Resolved(&entries[index]);
        }
    }
    Resolution::NotResolved {
        examples: examples(entries),
    }
}

/// Sorted, de-duplicated names, truncated for display.
fn examples(entries: &[FilterEntry]) -> String {
    let mut names: Vec<&str> = entries
        .iter()
        .map(|e| e.display_name.trim())
        .filter(|n| !n.is_empty())
        .collect();
    names.sort_unstable();
    names.dedup();
    names.join(", ").chars().take(EXAMPLES_MAX_CHARS).collect()
}

/// A region and specialty resolved to ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFilters {
    /// Region id.
    pub region_id: i64,
    /// Specialty id.
    pub specialty_id: i64,
    /// Region label as listed by the portal.
    pub region_label: String,
    /// Specialty label as listed by the portal.
    pub specialty_label: String,
}

/// How the doctor filter was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoctorSelector {
    /// A numeric id, used verbatim.
    Id(i64),
    /// A name to resolve.
    Name(String),
}

/// A doctor resolved to an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDoctor {
    /// Doctor id.
    pub id: i64,
    /// Label as listed by the portal; absent when the id was given.
    pub label: Option<String>,
}

/// Resolves names through the filters endpoint.
pub struct FilterResolver<'a, A: AppointmentApi + ?Sized> {
    api: &'a mut A,
}

impl<'a, A: AppointmentApi + ?Sized> FilterResolver<'a, A> {
    /// Creates a resolver calling `api`.
    pub fn new(api: &'a mut A) -> Self {
        Self { api }
    }

    /// Resolves a region and a specialty name.
    pub async fn resolve(&mut self, region: &str, specialty: &str) -> PortalResult<ResolvedFilters> {
        let payload = self
            .api
            .filters(FiltersQuery::new(BOOTSTRAP_REGION_ID, BOOTSTRAP_SPECIALTY_ID))
            .await?;
        debug!(
            regions = payload.regions.len(),
            specialties = payload.specialties.len(),
            "fetched filters"
        );

        let region = resolve_in(&payload.regions, "region", region)?;
        let specialty = resolve_in(&payload.specialties, "specialty", specialty)?;
        let resolved = ResolvedFilters {
            region_id: region.0,
            specialty_id: specialty.0,
            region_label: region.1,
            specialty_label: specialty.1,
        };
        info!(
            "resolved region '{}' ({}) and specialty '{}' ({})",
            resolved.region_label, resolved.region_id, resolved.specialty_label, resolved.specialty_id
        );
        Ok(resolved)
    }

    /// Resolves the doctor filter for a region/specialty pair.
    pub async fn resolve_doctor(
        &mut self,
        region_id: i64,
        specialty_id: i64,
        selector: &DoctorSelector,
    ) -> PortalResult<ResolvedDoctor> {
        let name = match selector {
            DoctorSelector::Id(id) => {
                return Ok(ResolvedDoctor {
                    id: *id,
                    label: None,
                });
            }
            DoctorSelector::Name(name) => name,
        };

        let payload = self
            .api
            .filters(FiltersQuery::new(region_id, specialty_id))
            .await?;
        let (id, label) = resolve_in(&payload.doctors, "doctor", name)?;
        info!("resolved doctor '{}' ({})", label, id);
        Ok(ResolvedDoctor {
            id,
            label: Some(label),
        })
    }
}

fn resolve_in(entries: &[FilterEntry], kind: &str, name: &str) -> PortalResult<(i64, String)> {
    match match_entry(entries, name) {
        Resolution::Resolved(entry) => {
            let id = entry.id.as_i64().ok_or_else(|| {
                PortalError::invalid_response(format!(
                    "{} '{}' has a non-numeric id '{}'",
                    kind, entry.display_name, entry.id
                ))
            })?;
            Ok((id, entry.display_name.clone()))
        }
        Resolution::NotResolved { examples } => {
            Err(PortalError::not_resolved(kind, name, &examples))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::BoxFuture;
    use crate::client::{SlotPage, SlotQuery};
    use crate::error::PortalErrorCode;

    struct FakeApi {
        payloads: VecDeque<FiltersPayload>,
        queries: Vec<FiltersQuery>,
    }

    impl FakeApi {
        fn new(payloads: Vec<FiltersPayload>) -> Self {
            Self {
                payloads: payloads.into(),
                queries: Vec::new(),
            }
        }
    }

    impl AppointmentApi for FakeApi {
        fn filters(&mut self, query: FiltersQuery) -> BoxFuture<'_, PortalResult<FiltersPayload>> {
            self.queries.push(query);
            let payload = self.payloads.pop_front().unwrap_or_default();
            Box::pin(async move { Ok(payload) })
        }

        fn search_slots(&mut self, _query: SlotQuery) -> BoxFuture<'_, PortalResult<SlotPage>> {
            Box::pin(async { Ok(SlotPage::default()) })
        }
    }

    fn payload() -> FiltersPayload {
        serde_json::from_value(serde_json::json!({
            "regions": [
                { "id": 200, "value": "Warszawa - okolice" },
                { "id": "204", "value": "Warszawa" },
                { "id": 202, "value": "Kraków" }
            ],
            "specialties": [
                { "id": 30, "value": "Urolog" },
                { "id": 31, "value": "Urolog dziecięcy" }
            ],
            "doctors": [
                { "id": 414656, "value": "Jan  KOWALSKI" },
                { "id": 5, "value": "Anna Nowak" }
            ],
            "clinics": [{ "id": 1, "value": "ignored" }]
        }))
        .unwrap()
    }

    #[test]
    fn exact_match_beats_substring() {
        let payload = payload();
        match match_entry(&payload.regions, "  warszawa ") {
            Resolution::Resolved(e) => assert_eq!(e.id.as_i64(), Some(204)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn substring_takes_first_listed() {
        let payload = payload();
        match match_entry(&payload.specialties, "urol") {
            Resolution::Resolved(e) => assert_eq!(e.display_name, "Urolog"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_candidates_never_resolve() {
        assert!(matches!(
            match_entry(&[], "Warszawa"),
            Resolution::NotResolved { ref examples } if examples.is_empty()
        ));
    }

    #[test]
    fn blank_name_never_resolves() {
        let payload = payload();
        assert!(matches!(
            match_entry(&payload.regions, "   "),
            Resolution::NotResolved { .. }
        ));
    }

    #[test]
    fn examples_are_sorted_unique_and_truncated() {
        let entries = vec![
            FilterEntry::new(2, "Kraków"),
            FilterEntry::new(1, "Gdańsk"),
            FilterEntry::new(3, "Kraków"),
            FilterEntry::new(4, ""),
        ];
        assert_eq!(examples(&entries), "Gdańsk, Kraków");

        let many: Vec<FilterEntry> = (0..100).map(|i| FilterEntry::new(i, format!("Miasto {:03}", i))).collect();
        assert_eq!(examples(&many).chars().count(), EXAMPLES_MAX_CHARS);
    }

    #[test]
    fn null_lists_deserialize_empty() {
        let payload: FiltersPayload =
            serde_json::from_str(r#"{"regions":null,"doctors":[{"id":1,"value":null}]}"#).unwrap();
        assert!(payload.regions.is_empty());
        assert!(payload.specialties.is_empty());
        assert_eq!(payload.doctors[0].display_name, "");
    }

    #[tokio::test]
    async fn resolve_uses_bootstrap_ids() {
        let mut api = FakeApi::new(vec![payload()]);
        let resolved = FilterResolver::new(&mut api)
            .resolve("Warszawa", "urolog")
            .await
            .unwrap();
        assert_eq!(
            resolved,
            ResolvedFilters {
                region_id: 204,
                specialty_id: 30,
                region_label: "Warszawa".to_string(),
                specialty_label: "Urolog".to_string(),
            }
        );
        assert_eq!(api.queries, vec![FiltersQuery::new(204, 30)]);
    }

    #[tokio::test]
    async fn unresolved_region_lists_examples() {
        let mut api = FakeApi::new(vec![payload()]);
        let err = FilterResolver::new(&mut api)
            .resolve("Gdańsk", "urolog")
            .await
            .unwrap_err();
        assert_eq!(err.code(), PortalErrorCode::NotResolved);
        assert!(err.message().contains("Kraków, Warszawa, Warszawa - okolice"));
    }

    #[tokio::test]
    async fn doctor_by_name_is_scoped_to_pair() {
        let mut api = FakeApi::new(vec![payload()]);
        let doctor = FilterResolver::new(&mut api)
            .resolve_doctor(204, 30, &DoctorSelector::Name("jan kowalski".to_string()))
            .await
            .unwrap();
        assert_eq!(doctor.id, 414656);
        assert_eq!(doctor.label.as_deref(), Some("Jan  KOWALSKI"));
        assert_eq!(api.queries, vec![FiltersQuery::new(204, 30)]);
    }

    #[tokio::test]
    async fn doctor_id_bypasses_lookup() {
        let mut api = FakeApi::new(vec![]);
        let doctor = FilterResolver::new(&mut api)
            .resolve_doctor(204, 30, &DoctorSelector::Id(414656))
            .await
            .unwrap();
        assert_eq!(doctor, ResolvedDoctor { id: 414656, label: None });
        assert!(api.queries.is_empty());
    }

    #[tokio::test]
    async fn unknown_doctor_is_not_resolved() {
        let mut api = FakeApi::new(vec![payload()]);
        let err = FilterResolver::new(&mut api)
            .resolve_doctor(204, 30, &DoctorSelector::Name("Zieliński".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), PortalErrorCode::NotResolved);
        assert!(err.message().contains("Anna Nowak"));
    }
}
