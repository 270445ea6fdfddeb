//! Core types: slots, fingerprints, date ranges, formatting, tracing

pub mod format;
pub mod slot;
pub mod time;
pub mod tracing;

pub use format::{FormatError, FormatOptions, JsonOutput, OutputFormat, OutputFormatter};
pub use slot::{NamedRef, PortalId, SeenSet, SlotFingerprint, SlotRecord, FINGERPRINT_SEPARATOR};
pub use time::{DateRange, TimeError, format_query_date, parse_date, today};
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
