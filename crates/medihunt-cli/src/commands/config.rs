//! Configuration commands.

use crate::config::MedihuntConfig;
use crate::error::{CliError, CliResult};
use crate::secret::SecretRef;

/// Dump the current configuration to stdout.
///
/// A plain-text password is masked; secret references are shown as written.
pub fn dump(config: &MedihuntConfig) -> CliResult<()> {
    let toml_str = toml::to_string_pretty(&redacted(config))
        .map_err(|e| CliError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", MedihuntConfig::default_path().display());
    println!("{}", toml_str);
    Ok(())
}

/// Show the configuration file path.
pub fn path() -> CliResult<()> {
    println!("config: {}", MedihuntConfig::default_path().display());
    Ok(())
}

fn redacted(config: &MedihuntConfig) -> MedihuntConfig {
    let mut config = config.clone();
    if let Some(password) = config.account.password.as_mut()
        && matches!(SecretRef::parse(password), SecretRef::Plain(_))
    {
        *password = "********".to_string();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_password_is_masked() {
        let config = MedihuntConfig::parse("[account]\nusername = \"jan\"\npassword = \"hunter2\"\n").unwrap();
        let out = toml::to_string_pretty(&redacted(&config)).unwrap();
        assert!(out.contains("********"));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn secret_reference_is_kept() {
        let config = MedihuntConfig::parse("[account]\npassword = \"pass::portal/jan\"\n").unwrap();
        assert_eq!(
            redacted(&config).account.password.as_deref(),
            Some("pass::portal/jan")
        );
    }
}
