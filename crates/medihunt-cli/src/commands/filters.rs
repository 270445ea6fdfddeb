//! The `filters` command.

use medihunt_portal::filters::{BOOTSTRAP_REGION_ID, BOOTSTRAP_SPECIALTY_ID};
use medihunt_portal::{FilterEntry, FilterResolver, FiltersPayload, FiltersQuery};

use crate::cli::{Cli, FiltersArgs};
use crate::config::MedihuntConfig;
use crate::error::{CliError, CliResult};

/// Lists regions and specialties, or doctors for a region/specialty pair.
pub async fn filters(args: FiltersArgs, config: &MedihuntConfig, cli: &Cli) -> CliResult<()> {
    let mut client = super::portal_client(config, cli)?;

    let (query, title) = match (&args.region, &args.specialty) {
        (Some(region), Some(specialty)) => {
            let resolved = FilterResolver::new(&mut client).resolve(region, specialty).await?;
            let title = format!(
                "{} ({}) / {} ({})",
                resolved.region_label,
                resolved.region_id,
                resolved.specialty_label,
                resolved.specialty_id
            );
            (
                FiltersQuery::new(resolved.region_id, resolved.specialty_id),
                Some(title),
            )
        }
        (None, None) => (
            FiltersQuery::new(BOOTSTRAP_REGION_ID, BOOTSTRAP_SPECIALTY_ID),
            None,
        ),
        _ => {
            return Err(CliError::Argument(
                "--region and --specialty must be given together".to_string(),
            ));
        }
    };

    let payload = client.fetch_filters(query).await?;
    if args.json {
        let json = serde_json::to_string_pretty(&payload)
            .map_err(|e| CliError::Config(format!("failed to serialize filters: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    print!("{}", render(&payload, title.as_deref()));
    Ok(())
}

/// Renders the lists as text: the doctors when a pair was given, otherwise
/// regions and specialties.
fn render(payload: &FiltersPayload, pair: Option<&str>) -> String {
    let mut out = String::new();
    match pair {
        Some(pair) => section(&mut out, &format!("Doctors for {}", pair), &payload.doctors),
        None => {
            section(&mut out, "Regions", &payload.regions);
            section(&mut out, "Specialties", &payload.specialties);
        }
    }
    out
}

fn section(out: &mut String, title: &str, entries: &[FilterEntry]) {
    out.push_str(&format!("{} ({}):\n", title, entries.len()));
    for entry in entries {
        out.push_str(&format!("  {:>8}  {}\n", entry.id.as_str(), entry.display_name.trim()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> FiltersPayload {
        FiltersPayload {
            regions: vec![FilterEntry::new(204, "Warszawa"), FilterEntry::new(202, "Kraków")],
            specialties: vec![FilterEntry::new(30, "Urolog ")],
            doctors: vec![FilterEntry::new(414656, "Jan Kowalski")],
        }
    }

    #[test]
    fn renders_regions_and_specialties() {
        insta::assert_snapshot!(render(&payload(), None).trim_end(), @r"
        Regions (2):
               204  Warszawa
               202  Kraków
        Specialties (1):
                30  Urolog
        ");
    }

    #[test]
    fn renders_doctors_for_pair() {
        insta::assert_snapshot!(render(&payload(), Some("Warszawa (204) / Urolog (30)")).trim_end(), @r"
        Doctors for Warszawa (204) / Urolog (30) (1):
            414656  Jan Kowalski
        ");
    }
}
