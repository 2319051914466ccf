use crate::error::{Error, Result};
use crate::version::ApiVersion;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use tracing::debug;

/// Settings shared by every test suite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TestConfig {
	pub log_level: String,
	pub enable_https: bool,
	pub http_timeout_ms: u64,
	pub api_processing_timeout_ms: u64,
	/// `0` waits for an answer forever.
	pub controller_testing_timeout_secs: u64,
	pub paging_timestamp_delay_ms: u64,
	pub heartbeat_interval_secs: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub random_seed: Option<u64>,
	pub port_base: u16,
	pub query_api_version: ApiVersion,
}

impl Default for TestConfig {
	fn default() -> Self {
		Self {
			log_level: "info".into(),
			enable_https: false,
			http_timeout_ms: 1000,
			api_processing_timeout_ms: 1000,
			controller_testing_timeout_secs: 600,
			paging_timestamp_delay_ms: 100,
			heartbeat_interval_secs: 5,
			random_seed: None,
			port_base: 5000,
			query_api_version: ApiVersion::V1_3,
		}
	}
}

impl TestConfig {
	pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let data = fs::read_to_string(path)?;
		let cfg: Self = toml::from_str(&data).map_err(|e| Error::config(format!("toml parse error: {e}")))?;
		cfg.validate()?;
		debug!(path = %path.display(), "configuration loaded");
		Ok(cfg)
	}

	pub fn from_env() -> Result<Self> {
		let mut cfg = Self::default();
		if let Ok(v) = std::env::var("NMOS_LOG_LEVEL") { cfg.log_level = v; }
		if let Ok(v) = std::env::var("NMOS_ENABLE_HTTPS") { cfg.enable_https = v == "1" || v.eq_ignore_ascii_case("true"); }
		if let Ok(v) = std::env::var("NMOS_HTTP_TIMEOUT_MS") { cfg.http_timeout_ms = parse_env("NMOS_HTTP_TIMEOUT_MS", &v)?; }
		if let Ok(v) = std::env::var("NMOS_API_PROCESSING_TIMEOUT_MS") { cfg.api_processing_timeout_ms = parse_env("NMOS_API_PROCESSING_TIMEOUT_MS", &v)?; }
		if let Ok(v) = std::env::var("NMOS_CONTROLLER_TESTING_TIMEOUT_SECS") { cfg.controller_testing_timeout_secs = parse_env("NMOS_CONTROLLER_TESTING_TIMEOUT_SECS", &v)?; }
		if let Ok(v) = std::env::var("NMOS_PAGING_TIMESTAMP_DELAY_MS") { cfg.paging_timestamp_delay_ms = parse_env("NMOS_PAGING_TIMESTAMP_DELAY_MS", &v)?; }
		if let Ok(v) = std::env::var("NMOS_HEARTBEAT_INTERVAL_SECS") { cfg.heartbeat_interval_secs = parse_env("NMOS_HEARTBEAT_INTERVAL_SECS", &v)?; }
		if let Ok(v) = std::env::var("NMOS_RANDOM_SEED") { cfg.random_seed = Some(parse_env("NMOS_RANDOM_SEED", &v)?); }
		if let Ok(v) = std::env::var("NMOS_PORT_BASE") { cfg.port_base = parse_env("NMOS_PORT_BASE", &v)?; }
		if let Ok(v) = std::env::var("NMOS_QUERY_API_VERSION") { cfg.query_api_version = v.parse()?; }
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn validate(&self) -> Result<()> {
		let allowed = ["trace", "debug", "info", "warn", "error"];
		if !allowed.contains(&self.log_level.as_str()) {
			return Err(Error::config(format!("invalid log_level: {}", self.log_level)));
		}
		if self.http_timeout_ms == 0 {
			return Err(Error::config("http_timeout_ms must be non-zero"));
		}
		if self.heartbeat_interval_secs == 0 {
			return Err(Error::config("heartbeat_interval_secs must be non-zero"));
		}
		if self.port_base.checked_add(100).is_none() {
			return Err(Error::config(format!("port_base too large: {}", self.port_base)));
		}
		Ok(())
	}

	/// `http` or `https`, as expected in Link header URLs.
	pub fn protocol(&self) -> &'static str {
		if self.enable_https { "https" } else { "http" }
	}

	pub fn http_timeout(&self) -> Duration { Duration::from_millis(self.http_timeout_ms) }

	pub fn paging_delay(&self) -> Duration { Duration::from_millis(self.paging_timestamp_delay_ms) }

	pub fn heartbeat_interval(&self) -> Duration { Duration::from_secs(self.heartbeat_interval_secs) }

	/// How long the oracle waits for an answer, or `None` to wait forever.
	pub fn oracle_timeout(&self) -> Option<Duration> {
		if self.controller_testing_timeout_secs == 0 {
			return None;
		}
		Some(Duration::from_secs(self.controller_testing_timeout_secs) + self.processing_grace())
	}

	pub fn processing_grace(&self) -> Duration { Duration::from_millis(2 * self.api_processing_timeout_ms) }

	pub fn mock_registry_port(&self) -> u16 { self.port_base.saturating_add(100) }

	pub fn answer_port(&self) -> u16 { self.port_base }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
	value.trim().parse().map_err(|_| Error::config(format!("invalid {name}: {value:?}")))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn defaults_are_valid() {
		let cfg = TestConfig::default();
		cfg.validate().unwrap();
		assert_eq!(cfg.protocol(), "http");
		assert_eq!(cfg.mock_registry_port(), 5100);
		assert_eq!(cfg.oracle_timeout(), Some(Duration::from_secs(602)));
	}

	#[test]
	fn zero_controller_timeout_disables_wait_limit() {
		let cfg = TestConfig { controller_testing_timeout_secs: 0, ..TestConfig::default() };
		assert_eq!(cfg.oracle_timeout(), None);
	}

	#[test]
	fn load_partial_toml() {
		let mut f = tempfile::NamedTempFile::new().unwrap();
		writeln!(f, "log_level = \"debug\"\nenable_https = true\nquery_api_version = \"v1.2\"\nrandom_seed = 7").unwrap();
		let cfg = TestConfig::load_from_file(f.path()).unwrap();
		assert_eq!(cfg.log_level, "debug");
		assert_eq!(cfg.protocol(), "https");
		assert_eq!(cfg.query_api_version.to_string(), "v1.2");
		assert_eq!(cfg.random_seed, Some(7));
		assert_eq!(cfg.http_timeout_ms, 1000);
	}

	#[test]
	fn invalid_log_level_rejected() {
		let mut f = tempfile::NamedTempFile::new().unwrap();
		writeln!(f, "log_level = \"loud\"").unwrap();
		let e = TestConfig::load_from_file(f.path()).unwrap_err();
		assert!(format!("{e}").contains("log_level"));
	}
}
