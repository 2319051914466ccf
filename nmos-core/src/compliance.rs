use crate::config::TestConfig;
use crate::error::{Error, Result};
use crate::types::GARBAGE_COLLECTION_SECS;

/// Limits a configuration must respect for the suites to be meaningful.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
	pub allow_trace_logs: bool,
	/// Upper bound on the delay inserted between paging fixture registrations.
	pub max_paging_delay_ms: u64,
}

impl Default for Policy {
	fn default() -> Self { Self { allow_trace_logs: true, max_paging_delay_ms: 250 } }
}

/// Validate a configuration against a policy.
pub fn validate_against(cfg: &TestConfig, pol: Policy) -> Result<()> {
	if !pol.allow_trace_logs && cfg.log_level == "trace" {
		return Err(Error::config("trace logs are disallowed by policy"));
	}
	if cfg.paging_timestamp_delay_ms > pol.max_paging_delay_ms {
		return Err(Error::config(format!(
			"paging_timestamp_delay_ms {} exceeds {} (fixtures must register within the {GARBAGE_COLLECTION_SECS}s garbage-collection interval)",
			cfg.paging_timestamp_delay_ms, pol.max_paging_delay_ms
		)));
	}
	if cfg.controller_testing_timeout_secs != 0
		&& std::time::Duration::from_secs(cfg.controller_testing_timeout_secs) < cfg.processing_grace()
	{
		return Err(Error::config("controller_testing_timeout_secs is shorter than the api processing grace period"));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn policy_blocks_trace() {
		let cfg = TestConfig { log_level: "trace".into(), ..TestConfig::default() };
		let e = validate_against(&cfg, Policy { allow_trace_logs: false, ..Policy::default() }).unwrap_err();
		assert!(format!("{e}").contains("disallowed"));
	}

	#[test]
	fn long_paging_delay_rejected() {
		let cfg = TestConfig { paging_timestamp_delay_ms: 600, ..TestConfig::default() };
		assert!(validate_against(&cfg, Policy::default()).is_err());
		validate_against(&TestConfig::default(), Policy::default()).unwrap();
	}

	#[test]
	fn controller_timeout_must_cover_grace() {
		let cfg = TestConfig { controller_testing_timeout_secs: 1, api_processing_timeout_ms: 1000, ..TestConfig::default() };
		assert!(validate_against(&cfg, Policy::default()).is_err());
		let cfg = TestConfig { controller_testing_timeout_secs: 0, ..cfg };
		validate_against(&cfg, Policy::default()).unwrap();
	}
}
