use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Optional TOML configuration file.
///
/// Every field is optional; values present in the file override the
/// corresponding CLI arguments during [`super::AppConfig::resolve`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub cron_key: Option<String>,
    pub mail_relay_url: Option<String>,
    pub geocoder_url: Option<String>,
    pub community_api_url: Option<String>,
    pub http_timeout_sec: Option<u64>,
    pub cron: Option<CronFileConfig>,
}

/// The `[cron]` section: orchestrator tuning knobs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CronFileConfig {
    pub batch_size: Option<usize>,
    pub batch_pause_ms: Option<u64>,
    pub geocode_batch_size: Option<usize>,
    pub lock_stale_after_secs: Option<u64>,
    pub claim_stale_after_secs: Option<u64>,
    pub sent_retention_days: Option<u64>,
    pub run_log_retention_days: Option<u64>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config file {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_full_config() {
        let raw = r#"
            db_dir = "/var/lib/hourbank"
            port = 3005
            cron_key = "secret"
            mail_relay_url = "http://mail:8025"

            [cron]
            batch_size = 25
            batch_pause_ms = 500
        "#;
        let config: FileConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.db_dir.as_deref(), Some("/var/lib/hourbank"));
        assert_eq!(config.port, Some(3005));
        assert_eq!(config.cron_key.as_deref(), Some("secret"));
        let cron = config.cron.unwrap();
        assert_eq!(cron.batch_size, Some(25));
        assert_eq!(cron.batch_pause_ms, Some(500));
        assert_eq!(cron.geocode_batch_size, None);
    }

    #[test]
    fn rejects_unknown_keys() {
        let raw = "not_a_real_key = true";
        assert!(toml::from_str::<FileConfig>(raw).is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 4000").unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.port, Some(4000));
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(FileConfig::load("/definitely/not/here.toml").is_err());
    }
}
