//! The `hunt` command.

use std::time::Duration;

use medihunt_core::{DateRange, FormatOptions, OutputFormat, parse_date, today};
use medihunt_hunter::{PollerConfig, SearchTarget, SlotPoller, WriterSink};
use medihunt_portal::{DoctorSelector, FilterResolver};
use tracing::info;

use crate::cli::{Cli, HuntArgs};
use crate::config::{HuntSettings, MedihuntConfig};
use crate::error::{CliError, CliResult};

/// Fully merged hunt options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuntPlan {
    pub region: String,
    pub specialty: String,
    pub doctor: Option<DoctorSelector>,
    pub range: DateRange,
    pub interval: Duration,
    pub page_size: u32,
    pub once: bool,
    pub format: OutputFormat,
}

impl HuntPlan {
    /// Merges flags over the `[hunt]` defaults.
    pub fn new(args: HuntArgs, settings: &HuntSettings) -> CliResult<Self> {
        let region = required(args.region.or_else(|| settings.region.clone()), "region")?;
        let specialty = required(args.specialty.or_else(|| settings.specialty.clone()), "specialty")?;

        let start = match args.start.as_deref() {
            Some(raw) => parse_date(raw)?,
            None => today(),
        };
        let days = args.days.unwrap_or(settings.days);
        if days == 0 {
            return Err(CliError::Argument("--days must be at least 1".to_string()));
        }
        let page_size = args.page_size.unwrap_or(settings.page_size);
        if page_size == 0 {
            return Err(CliError::Argument("--page-size must be at least 1".to_string()));
        }

        Ok(Self {
            region,
            specialty,
            doctor: args
                .doctor
                .or_else(|| settings.doctor.clone())
                .as_deref()
                .and_then(doctor_selector),
            range: DateRange::new(start, days),
            interval: Duration::from_secs(args.interval.unwrap_or(settings.interval)),
            page_size,
            once: args.once,
            format: if args.json {
                OutputFormat::Json
            } else {
                settings.format
            },
        })
    }
}

fn required(value: Option<String>, name: &str) -> CliResult<String> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        CliError::Config(format!("missing {name}: pass --{name} or set it in [hunt]"))
    })
}

/// A numeric value is a doctor id, anything else a name.
pub fn doctor_selector(raw: &str) -> Option<DoctorSelector> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(match raw.parse::<i64>() {
        Ok(id) => DoctorSelector::Id(id),
        Err(_) => DoctorSelector::Name(raw.to_string()),
    })
}

/// Resolves the filters and polls until interrupted.
pub async fn hunt(args: HuntArgs, config: &MedihuntConfig, cli: &Cli) -> CliResult<()> {
    let plan = HuntPlan::new(args, &config.hunt)?;
    let mut client = super::portal_client(config, cli)?;

    let filters = FilterResolver::new(&mut client)
        .resolve(&plan.region, &plan.specialty)
        .await?;
    let doctor = match &plan.doctor {
        Some(selector) => Some(
            FilterResolver::new(&mut client)
                .resolve_doctor(filters.region_id, filters.specialty_id, selector)
                .await?,
        ),
        None => None,
    };

    let poller_config = PollerConfig::new(plan.range)
        .with_interval(plan.interval)
        .with_page_size(plan.page_size)
        .with_once(plan.once);

    let doctor_note = match &doctor {
        Some(d) => format!(
            ", doctor={} ({})",
            d.label.as_deref().unwrap_or("by id"),
            d.id
        ),
        None => String::new(),
    };
    eprintln!(
        "[medihunt] OK. Hunting: region={} ({}), spec={} ({}){}, start={}, days={}, interval={}s",
        filters.region_label,
        filters.region_id,
        filters.specialty_label,
        filters.specialty_id,
        doctor_note,
        plan.range.start(),
        plan.range.days(),
        poller_config.effective_interval().as_secs(),
    );

    let target = SearchTarget::new(filters.region_id, filters.specialty_id)
        .with_doctor(doctor.map(|d| d.id));
    let sink = WriterSink::stdout(plan.format, FormatOptions::default());
    let mut poller = SlotPoller::new(client, sink, target, poller_config);

    tokio::select! {
        result = poller.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping");
        }
    }
    Ok(())
}
