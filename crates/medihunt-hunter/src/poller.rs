//! Repeated slot searches over a date range.
//!
//! Each cycle searches every day of the range page by page, keeps only slots
//! whose fingerprint was never seen during this run and reports them as one
//! batch. Between cycles the poller sleeps for the configured interval,
//! never less than [`MIN_POLL_INTERVAL`].

use std::time::Duration;

use chrono::NaiveDate;
use medihunt_core::{DateRange, SeenSet, SlotRecord};
use medihunt_portal::client::DEFAULT_PAGE_SIZE;
use medihunt_portal::{AppointmentApi, SlotQuery};
use tracing::{debug, info, warn};

use crate::error::{HunterError, HunterResult};
use crate::report::ReportSink;

/// Lower bound for the pause between cycles.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Pages fetched per day before giving up on pagination.
const MAX_PAGES_PER_DAY: u32 = 100;

/// What to search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTarget {
    /// Region id.
    pub region_id: i64,
    /// Specialty id.
    pub specialty_id: i64,
    /// Keep only slots with this doctor.
    pub doctor_id: Option<i64>,
}

impl SearchTarget {
    /// Creates a target without a doctor filter.
    pub fn new(region_id: i64, specialty_id: i64) -> Self {
        Self {
            region_id,
            specialty_id,
            doctor_id: None,
        }
    }

    /// Builder: restrict to one doctor.
    pub fn with_doctor(mut self, doctor_id: Option<i64>) -> Self {
        self.doctor_id = doctor_id;
        self
    }

    /// Returns true if `slot` passes the doctor filter.
    pub fn accepts(&self, slot: &SlotRecord) -> bool {
        match self.doctor_id {
            Some(wanted) => slot.doctor_id() == Some(wanted),
            None => true,
        }
    }
}

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Days searched on every cycle.
    pub range: DateRange,
    /// Requested pause between cycles.
    pub interval: Duration,
    /// Page size of slot searches.
    pub page_size: u32,
    /// Stop after the first cycle.
    pub once: bool,
}

impl PollerConfig {
    /// Creates a config for `range` with default interval and page size.
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            interval: Duration::from_secs(60),
            page_size: DEFAULT_PAGE_SIZE,
            once: false,
        }
    }

    /// Builder: set the interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Builder: set the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Builder: single-run mode.
    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    /// Pause actually used between cycles.
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_POLL_INTERVAL)
    }

    /// Checks the configuration.
    pub fn validate(&self) -> HunterResult<()> {
        if self.page_size == 0 {
            return Err(HunterError::config("page size must be at least 1"));
        }
        Ok(())
    }
}

/// Where the poller is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollerState {
    /// Waiting for the next cycle.
    #[default]
    Idle,
    /// Searching the date range.
    Searching,
    /// Handing the new batch to the sink.
    Reporting,
    /// Finished (single-run mode or after an error).
    Done,
}

/// Numbers from one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleOutcome {
    /// Pages requested.
    pub pages: u32,
    /// Slots returned by the portal after the doctor filter.
    pub matched: usize,
    /// Slots not seen in earlier cycles.
    pub new_slots: usize,
}

/// Polls the portal and reports new slots.
pub struct SlotPoller<A, S> {
    api: A,
    sink: S,
    target: SearchTarget,
    config: PollerConfig,
    seen: SeenSet,
    state: PollerState,
    cycles: u64,
}

impl<A: AppointmentApi, S: ReportSink> SlotPoller<A, S> {
    /// Creates a poller.
    pub fn new(api: A, sink: S, target: SearchTarget, config: PollerConfig) -> Self {
        Self {
            api,
            sink,
            target,
            config,
            seen: SeenSet::new(),
            state: PollerState::Idle,
            cycles: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Fingerprints reported so far.
    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// The API used for searches.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// The report sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Runs cycles until single-run mode ends or an error occurs.
    ///
    /// In continuous mode this only returns on error; callers stop it by
    /// dropping the future.
    pub async fn run(&mut self) -> HunterResult<()> {
        self.config.validate()?;
        let interval = self.config.effective_interval();
        info!(
            start = %self.config.range.start(),
            days = self.config.range.days(),
            interval_secs = interval.as_secs(),
            once = self.config.once,
            "poller started"
        );

        loop {
            if let Err(e) = self.run_cycle().await {
                self.state = PollerState::Done;
                return Err(e);
            }

            if self.config.once {
                self.state = PollerState::Done;
                return Ok(());
            }

            debug!(delay_secs = interval.as_secs(), "waiting for next cycle");
            tokio::time::sleep(interval).await;
        }
    }

    /// Runs one search cycle and reports its new slots.
    pub async fn run_cycle(&mut self) -> HunterResult<CycleOutcome> {
        self.state = PollerState::Searching;
        let mut outcome = CycleOutcome::default();
        let mut fresh = Vec::new();

        let target = self.target;
        for date in self.config.range.iter() {
            let (pages, slots) = self.search_day(date).await?;
            outcome.pages += pages;
            let matched: Vec<SlotRecord> = slots.into_iter().filter(|s| target.accepts(s)).collect();
            outcome.matched += matched.len();
            fresh.extend(self.seen.retain_new(matched));
        }

        outcome.new_slots = fresh.len();
        if !fresh.is_empty() {
            self.state = PollerState::Reporting;
            self.sink.report(&fresh)?;
        }

        self.cycles += 1;
        self.state = PollerState::Idle;
        info!(
            cycle = self.cycles,
            pages = outcome.pages,
            matched = outcome.matched,
            new = outcome.new_slots,
            "cycle finished"
        );
        Ok(outcome)
    }

    async fn search_day(&mut self, date: NaiveDate) -> HunterResult<(u32, Vec<SlotRecord>)> {
        let base = SlotQuery::new(self.target.region_id, self.target.specialty_id, date)
            .with_page_size(self.config.page_size);
        let mut slots = Vec::new();
        let mut page = 1;
        let mut seen_items = 0u64;

        loop {
            let result = self.api.search_slots(base.page(page)).await?;
            let received = result.received();
            seen_items += received as u64;
            if result.dropped > 0 {
                warn!(%date, page, dropped = result.dropped, "skipped malformed slots");
            }
            slots.extend(result.items);

            let short = received < base.page_size as usize;
            let complete = result.total_count.is_some_and(|total| seen_items >= total);
            if received == 0 || short || complete {
                return Ok((page, slots));
            }
            if page >= MAX_PAGES_PER_DAY {
                warn!(%date, pages = page, "stopping pagination early");
                return Ok((page, slots));
            }
            page += 1;
        }
    }
}
