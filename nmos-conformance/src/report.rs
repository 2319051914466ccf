//! Suite-level results, their JSON form and the process exit code.

use crate::result::{TestResult, TestState};
use chrono::{DateTime, Utc};
use nmos_core::TestConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const EXIT_OK: i32 = 0;
pub const EXIT_WARNING: i32 = 1;
pub const EXIT_FAIL: i32 = 2;
/// The suite could not be run at all.
pub const EXIT_ERROR: i32 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
	pub suite: String,
	pub timestamp: DateTime<Utc>,
	/// Seconds, set-up and tear-down included.
	pub duration: f64,
	pub results: Vec<TestResult>,
	pub config: serde_json::Value,
}

impl SuiteReport {
	pub fn new(suite: &str, config: &TestConfig) -> Self {
		Self {
			suite: suite.into(),
			timestamp: Utc::now(),
			duration: 0.0,
			results: Vec::new(),
			config: serde_json::to_value(config).unwrap_or(serde_json::Value::Null),
		}
	}

	/// The most severe verdict, `None` for an empty report.
	pub fn worst(&self) -> Option<TestState> { self.results.iter().map(|r| r.state).max() }

	pub fn counts(&self) -> BTreeMap<TestState, usize> {
		let mut counts = BTreeMap::new();
		for r in &self.results {
			*counts.entry(r.state).or_insert(0) += 1;
		}
		counts
	}

	pub fn exit_code(&self) -> i32 {
		let any = |state| self.results.iter().any(|r| r.state == state);
		if any(TestState::Fail) {
			EXIT_FAIL
		} else if any(TestState::Warning) {
			EXIT_WARNING
		} else {
			EXIT_OK
		}
	}

	pub fn to_json_pretty(&self) -> serde_json::Result<String> { serde_json::to_string_pretty(self) }
}
