use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "software@example.com";
pub const DEFAULT_ARCHIVES_URL: &str = "https://www.sec.gov/Archives/edgar/data";

#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub user_agent: String,
    pub data_dir: PathBuf,
    pub archives_url: String,
    pub max_concurrent: usize,
    pub fetch_retries: u32,
    pub fetch_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            data_dir: PathBuf::from("data"),
            archives_url: DEFAULT_ARCHIVES_URL.to_string(),
            max_concurrent: 10,
            fetch_retries: 1,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let user_agent = lookup("EDGAR_USER_AGENT").unwrap_or(defaults.user_agent);
        let data_dir = lookup("INSIDER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let archives_url = lookup("EDGAR_ARCHIVES_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.archives_url);

        let max_concurrent = parse_var(&lookup, "EDGAR_MAX_CONCURRENT", defaults.max_concurrent)?;
        let fetch_retries = parse_var(&lookup, "EDGAR_FETCH_RETRIES", defaults.fetch_retries)?;
        let timeout_secs = parse_var(
            &lookup,
            "EDGAR_FETCH_TIMEOUT_SECS",
            defaults.fetch_timeout.as_secs(),
        )?;

        if max_concurrent == 0 {
            return Err(anyhow!("EDGAR_MAX_CONCURRENT must be at least 1"));
        }

        Ok(Self {
            user_agent,
            data_dir,
            archives_url,
            max_concurrent,
            fetch_retries,
            fetch_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn filings_dir(&self) -> PathBuf {
        self.data_dir.join("edgar").join("filings")
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.fetch_retries, 1);
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.filings_dir(), PathBuf::from("data/edgar/filings"));
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("EDGAR_USER_AGENT", "me@example.org"),
            ("EDGAR_ARCHIVES_URL", "http://localhost:8080/data/"),
            ("EDGAR_FETCH_RETRIES", "3"),
        ]))
        .unwrap();
        assert_eq!(config.user_agent, "me@example.org");
        assert_eq!(config.archives_url, "http://localhost:8080/data");
        assert_eq!(config.fetch_retries, 3);

        let err = IngestConfig::from_lookup(lookup_from(&[("EDGAR_FETCH_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("EDGAR_FETCH_TIMEOUT_SECS"));

        assert!(IngestConfig::from_lookup(lookup_from(&[("EDGAR_MAX_CONCURRENT", "0")])).is_err());
    }
}
