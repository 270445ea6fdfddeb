//! Output formatting for newly found slots.
//!
//! Two renderings are supported:
//! - **Text**: a header line followed by one `date | specialty | clinic |
//!   doctor | doctor id` line per slot
//! - **JSON**: one object per batch, `{"found": n, "items": [...]}`, on a
//!   single line so that consumers can read reports line by line

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::slot::SlotRecord;

/// Errors produced while rendering a batch.
#[derive(Debug, Error)]
pub enum FormatError {
    /// JSON serialization failed.
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// The output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per batch.
    Json,
}

/// Configuration options for output formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatOptions {
    /// Tag printed at the start of the text header.
    pub tag: String,
    /// Append a `phone` column to remote consultations in text output.
    pub mark_phone_consultations: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            tag: "medihunt".to_string(),
            mark_phone_consultations: true,
        }
    }
}

/// JSON report for one batch of new slots.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    /// Number of slots in the batch.
    pub found: usize,
    /// The slots themselves.
    pub items: &'a [SlotRecord],
}

/// Output formatter for slot batches.
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    options: FormatOptions,
}

impl OutputFormatter {
    /// Creates a new formatter with the given options.
    pub fn new(options: FormatOptions) -> Self {
        Self { options }
    }

    /// Renders a batch in the requested format, without trailing newline.
    pub fn render(&self, format: OutputFormat, slots: &[SlotRecord]) -> Result<String, FormatError> {
        match format {
            OutputFormat::Text => Ok(self.format_text(slots).join("\n")),
            OutputFormat::Json => Ok(serde_json::to_string(&self.format_json(slots))?),
        }
    }

    /// Formats a batch as text lines (header first).
    pub fn format_text(&self, slots: &[SlotRecord]) -> Vec<String> {
        let mut lines = Vec::with_capacity(slots.len() + 1);
        lines.push(format!(
            "[{}] FOUND {} new slot(s)",
            self.options.tag,
            slots.len()
        ));
        lines.extend(slots.iter().map(|slot| self.format_line(slot)));
        lines
    }

    /// Formats a single slot line.
    pub fn format_line(&self, slot: &SlotRecord) -> String {
        let mut line = format!(
            "  {} | {} | {} | {} | {}",
            slot.appointment_datetime,
            slot.specialty.name.trim(),
            slot.clinic.name.trim(),
            slot.doctor.name.trim(),
            slot.doctor.id,
        );
        if self.options.mark_phone_consultations && slot.is_phone_consultation {
            line.push_str(" | phone");
        }
        line
    }

    /// Builds the JSON report for a batch.
    pub fn format_json<'a>(&self, slots: &'a [SlotRecord]) -> JsonOutput<'a> {
        JsonOutput {
            found: slots.len(),
            items: slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::NamedRef;

    fn sample() -> Vec<SlotRecord> {
        vec![
            SlotRecord::new(
                "2026-10-20T09:00:00",
                NamedRef::new(1, "A"),
                NamedRef::new(9, "Dr X"),
                NamedRef::new(30, "Uro "),
            ),
            SlotRecord::new(
                "2026-10-21T10:30:00",
                NamedRef::new(2, "B"),
                NamedRef::new("10", "Dr Y"),
                NamedRef::new(30, "Uro"),
            )
            .with_phone_consultation(true),
        ]
    }

    #[test]
    fn text_output() {
        let output = OutputFormatter::default()
            .render(OutputFormat::Text, &sample())
            .unwrap();
        insta::assert_snapshot!(output, @r"
        [medihunt] FOUND 2 new slot(s)
          2026-10-20T09:00:00 | Uro | A | Dr X | 9
          2026-10-21T10:30:00 | Uro | B | Dr Y | 10 | phone
        ");
    }

    #[test]
    fn text_output_without_phone_marker() {
        let formatter = OutputFormatter::new(FormatOptions {
            tag: "hunt".to_string(),
            mark_phone_consultations: false,
        });
        let lines = formatter.format_text(&sample());
        assert_eq!(lines[0], "[hunt] FOUND 2 new slot(s)");
        assert!(!lines[2].ends_with("phone"));
    }

    #[test]
    fn json_output() {
        let slots = sample();
        let output = OutputFormatter::default()
            .render(OutputFormat::Json, &slots[..1])
            .unwrap();
        assert_eq!(
            output,
            r#"{"found":1,"items":[{"appointmentDate":"2026-10-20T09:00:00","clinic":{"id":1,"name":"A"},"doctor":{"id":9,"name":"Dr X"},"specialty":{"id":30,"name":"Uro "},"isPhoneConsultation":false}]}"#
        );
    }

    #[test]
    fn json_output_is_single_line() {
        let output = OutputFormatter::default()
            .render(OutputFormat::Json, &sample())
            .unwrap();
        assert!(!output.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["found"], 2);
        assert_eq!(value["items"][1]["doctor"]["id"], 10);
    }
}
