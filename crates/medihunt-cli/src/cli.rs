//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// medihunt - Watch the patient portal for free appointment slots
#[derive(Debug, Parser)]
#[command(name = "medihunt")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "MEDIHUNT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    // --- Account ---
    /// Portal username
    #[arg(long, env = "MEDICOVER_USER", hide_env_values = true, global = true)]
    pub user: Option<String>,

    /// Portal password
    #[arg(long, env = "MEDICOVER_PASS", hide_env_values = true, global = true)]
    pub password: Option<String>,

    // --- Browser login ---
    /// WebDriver (chromedriver) endpoint used for the interactive login
    #[arg(long, env = "MEDIHUNT_WEBDRIVER_URL", global = true)]
    pub webdriver_url: Option<String>,

    /// Show the browser window during login
    #[arg(long, global = true)]
    pub headed: bool,

    /// Save screenshots, page source and storage dumps when login fails
    #[arg(long, global = true)]
    pub debug_dir: Option<PathBuf>,

    /// Directory holding cached tokens
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll for new appointment slots
    Hunt(HuntArgs),

    /// Run the interactive login and cache the tokens
    Login,

    /// Remove cached tokens
    Logout,

    /// List regions, specialties and doctors known to the portal
    Filters(FiltersArgs),

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Options of the `hunt` command.
#[derive(Debug, Clone, Default, Args)]
pub struct HuntArgs {
    /// Region name, e.g. Warszawa
    #[arg(long)]
    pub region: Option<String>,

    /// Specialty name, e.g. urolog
    #[arg(long, visible_alias = "spec")]
    pub specialty: Option<String>,

    /// Doctor name or numeric doctor id
    #[arg(long)]
    pub doctor: Option<String>,

    /// First day to search (YYYY-MM-DD, default: today)
    #[arg(long)]
    pub start: Option<String>,

    /// Number of days to search
    #[arg(long)]
    pub days: Option<u32>,

    /// Seconds between polling cycles (at least 5)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Slots page size
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Print new slots as JSON
    #[arg(long)]
    pub json: bool,
}

/// Options of the `filters` command.
#[derive(Debug, Clone, Default, Args)]
pub struct FiltersArgs {
    /// Region name; with --specialty, also lists doctors
    #[arg(long)]
    pub region: Option<String>,

    /// Specialty name
    #[arg(long, visible_alias = "spec")]
    pub specialty: Option<String>,

    /// Print the raw filters as JSON
    #[arg(long)]
    pub json: bool,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}
