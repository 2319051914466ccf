//! Test verdicts and the early-exit channel used by verification helpers.

use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Verdict of a single test case, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestState {
	Disabled,
	#[serde(rename = "NA")]
	NotApplicable,
	Pass,
	Manual,
	Optional,
	Warning,
	Unclear,
	Fail,
}

impl TestState {
	pub fn as_str(&self) -> &'static str {
		match self {
			TestState::Disabled => "Test Disabled",
			TestState::NotApplicable => "Not Applicable",
			TestState::Pass => "Pass",
			TestState::Manual => "Manual",
			TestState::Optional => "Not Implemented",
			TestState::Warning => "Warning",
			TestState::Unclear => "Could Not Test",
			TestState::Fail => "Fail",
		}
	}
}

impl fmt::Display for TestState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Immutable outcome of one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
	pub name: String,
	pub description: String,
	pub state: TestState,
	pub detail: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub link: Option<String>,
	/// Wall time in seconds, filled in by the runner.
	#[serde(default)]
	pub duration: f64,
}

impl TestResult {
	pub fn with_duration(mut self, d: Duration) -> Self {
		self.duration = d.as_secs_f64();
		self
	}
}

/// Handle passed to each test body for building its verdicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Test {
	pub name: String,
	pub description: String,
}

impl Test {
	pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
		Self { name: name.into(), description: description.into() }
	}

	pub fn result(&self, state: TestState, detail: impl Into<String>) -> TestResult {
		TestResult {
			name: self.name.clone(),
			description: self.description.clone(),
			state,
			detail: detail.into(),
			link: None,
			duration: 0.0,
		}
	}

	pub fn pass(&self) -> TestResult { self.result(TestState::Pass, "") }
	pub fn pass_with(&self, detail: impl Into<String>) -> TestResult { self.result(TestState::Pass, detail) }
	pub fn fail(&self, detail: impl Into<String>) -> TestResult { self.result(TestState::Fail, detail) }
	pub fn warning(&self, detail: impl Into<String>) -> TestResult { self.result(TestState::Warning, detail) }
	pub fn unclear(&self, detail: impl Into<String>) -> TestResult { self.result(TestState::Unclear, detail) }
	pub fn optional(&self, detail: impl Into<String>) -> TestResult { self.result(TestState::Optional, detail) }
	pub fn na(&self, detail: impl Into<String>) -> TestResult { self.result(TestState::NotApplicable, detail) }
	pub fn manual(&self, detail: impl Into<String>) -> TestResult { self.result(TestState::Manual, detail) }
	pub fn disabled(&self, detail: impl Into<String>) -> TestResult { self.result(TestState::Disabled, detail) }

	/// An OPTIONAL verdict pointing at further reading.
	pub fn optional_with_link(&self, detail: impl Into<String>, link: impl Into<String>) -> TestResult {
		TestResult { link: Some(link.into()), ..self.optional(detail) }
	}
}

/// A pre-built verdict that unwinds a test body up to the runner.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}: {}", .0.state, .0.detail)]
pub struct TestAbort(pub TestResult);

impl TestAbort {
	pub fn into_result(self) -> TestResult { self.0 }
}

impl From<TestResult> for TestAbort {
	fn from(r: TestResult) -> Self { Self(r) }
}

/// Either a value to keep working with, or a verdict that ends the test.
pub type Outcome<T> = Result<T, TestAbort>;

/// Turn harness errors into a verdict for the current test.
pub trait OrAbort<T> {
	fn or_fail(self, test: &Test) -> Outcome<T>;
	fn or_unclear(self, test: &Test) -> Outcome<T>;
}

impl<T, E: fmt::Display> OrAbort<T> for Result<T, E> {
	fn or_fail(self, test: &Test) -> Outcome<T> {
		self.map_err(|e| TestAbort(test.fail(e.to_string())))
	}

	fn or_unclear(self, test: &Test) -> Outcome<T> {
		self.map_err(|e| TestAbort(test.unclear(e.to_string())))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn severity_order() {
		let mut states = vec![TestState::Fail, TestState::Pass, TestState::Warning, TestState::Disabled, TestState::Unclear];
		states.sort();
		assert_eq!(states, vec![TestState::Disabled, TestState::Pass, TestState::Warning, TestState::Unclear, TestState::Fail]);
		assert!(TestState::Optional < TestState::Warning);
		assert!(TestState::NotApplicable < TestState::Pass);
	}

	#[test]
	fn wire_names() {
		assert_eq!(serde_json::to_string(&TestState::NotApplicable).unwrap(), "\"NA\"");
		assert_eq!(serde_json::to_string(&TestState::Unclear).unwrap(), "\"UNCLEAR\"");
	}

	#[test]
	fn abort_carries_result() {
		let t = Test::new("test_01", "demo");
		let r: Outcome<()> = Err("boom").or_fail(&t);
		let abort = r.unwrap_err();
		assert_eq!(abort.0.state, TestState::Fail);
		assert_eq!(abort.0.detail, "boom");
		assert_eq!(abort.to_string(), "Fail: boom");
	}
}
