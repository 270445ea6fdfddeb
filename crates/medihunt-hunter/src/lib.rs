//! Slot hunting: repeated searches, de-duplication and reporting.
//!
//! This crate drives the appointments API on a schedule:
//! - [`SlotPoller`] searches every day of a [`DateRange`] each cycle
//! - Slots are de-duplicated by fingerprint for the whole run
//! - New slots are handed to a [`ReportSink`] as one batch per cycle
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use medihunt_core::{DateRange, FormatOptions, OutputFormat, today};
//! use medihunt_hunter::{PollerConfig, SearchTarget, SlotPoller, WriterSink};
//! use medihunt_portal::PortalClient;
//!
//! async fn hunt(client: PortalClient) -> medihunt_hunter::HunterResult<()> {
//!     let config = PollerConfig::new(DateRange::new(today(), 7))
//!         .with_interval(Duration::from_secs(60));
//!     let sink = WriterSink::stdout(OutputFormat::Text, FormatOptions::default());
//!     let mut poller = SlotPoller::new(client, sink, SearchTarget::new(204, 30), config);
//!     poller.run().await
//! }
//! ```
//!
//! [`DateRange`]: medihunt_core::DateRange

mod error;
mod poller;
mod report;

pub use error::{HunterError, HunterResult};
pub use poller::{
    CycleOutcome, MIN_POLL_INTERVAL, PollerConfig, PollerState, SearchTarget, SlotPoller,
};
pub use report::{ReportSink, WriterSink};
