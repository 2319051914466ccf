//! Sequences a suite's test cases and collects their verdicts.
//!
//! Cases run one at a time, in registration order. A verdict returned
//! early through [`TestAbort`](crate::result::TestAbort) or a panic inside
//! a test body is recorded against that case only; the rest of the suite
//! still runs. Only a failing [`TestSuite::set_up`] aborts the run.

use crate::error::{ConformanceError, Result};
use crate::report::SuiteReport;
use crate::result::{Outcome, Test, TestResult};
use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use nmos_core::TestConfig;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{error, info, warn};

/// Body of a test case: borrows the suite mutably for its whole run.
pub type TestFn<S> = for<'a> fn(&'a mut S, &'a Test) -> LocalBoxFuture<'a, Outcome<TestResult>>;

/// A named test case, registered explicitly by its suite.
pub struct TestCase<S> {
	pub name: &'static str,
	pub description: &'static str,
	pub run: TestFn<S>,
}

impl<S> TestCase<S> {
	pub fn new(name: &'static str, description: &'static str, run: TestFn<S>) -> Self {
		Self { name, description, run }
	}

	pub fn test(&self) -> Test { Test::new(self.name, self.description) }
}

impl<S> std::fmt::Debug for TestCase<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TestCase").field("name", &self.name).finish()
	}
}

#[async_trait(?Send)]
pub trait TestSuite {
	fn name(&self) -> &'static str;

	fn tests(&self) -> Vec<TestCase<Self>>
	where
		Self: Sized;

	/// Runs once before any case. An error aborts the suite.
	async fn set_up(&mut self) -> Result<()> { Ok(()) }

	/// Runs once after the last case, whatever their verdicts.
	async fn tear_down(&mut self) -> Result<()> { Ok(()) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
	All,
	Single(String),
}

/// Lifecycle of one case within a run.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseState {
	NotRun,
	Running,
	Finished(TestResult),
}

impl CaseState {
	fn start(&mut self) -> bool {
		if *self != CaseState::NotRun {
			return false;
		}
		*self = CaseState::Running;
		true
	}

	/// Records the verdict; later verdicts for the same case are dropped.
	fn finish(&mut self, result: TestResult) -> bool {
		if matches!(self, CaseState::Finished(_)) {
			return false;
		}
		*self = CaseState::Finished(result);
		true
	}
}

#[derive(Debug, Clone, Default)]
pub struct ConformanceRunner {
	config: TestConfig,
	ignore: Vec<String>,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	payload
		.downcast_ref::<&str>()
		.map(|s| s.to_string())
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "unknown panic".into())
}

impl ConformanceRunner {
	pub fn new(config: TestConfig) -> Self { Self { config, ignore: Vec::new() } }

	/// Cases reported DISABLED instead of being run.
	pub fn with_ignored(mut self, names: impl IntoIterator<Item = String>) -> Self {
		self.ignore.extend(names);
		self
	}

	pub fn config(&self) -> &TestConfig { &self.config }

	pub async fn run<S: TestSuite>(&self, suite: &mut S, selection: &Selection) -> Result<SuiteReport> {
		let cases = suite.tests();
		if let Selection::Single(name) = selection {
			if !cases.iter().any(|c| c.name == name) {
				return Err(ConformanceError::init(format!("{} has no test named {name}", suite.name())));
			}
		}
		let mut report = SuiteReport::new(suite.name(), &self.config);
		let started = Instant::now();

		info!(suite = suite.name(), "setting up");
		suite.set_up().await.map_err(|e| ConformanceError::init(e.to_string()))?;

		let mut states: Vec<CaseState> = vec![CaseState::NotRun; cases.len()];
		for (case, state) in cases.iter().zip(states.iter_mut()) {
			if let Selection::Single(name) = selection {
				if case.name != name {
					continue;
				}
			}
			let test = case.test();
			if self.ignore.iter().any(|n| n == case.name) {
				state.finish(test.disabled("This test was ignored by configuration"));
				continue;
			}
			if !state.start() {
				continue;
			}

			info!(" * Running {}", case.name);
			let began = Instant::now();
			let outcome = AssertUnwindSafe((case.run)(suite, &test)).catch_unwind().await;
			let result = match outcome {
				Ok(Ok(result)) => result,
				Ok(Err(abort)) => abort.into_result(),
				Err(payload) => {
					let msg = panic_message(payload.as_ref());
					error!(test = case.name, %msg, "test panicked");
					test.fail(format!("Uncaught exception in test: {msg}"))
				}
			};
			state.finish(result.with_duration(began.elapsed()));
		}

		if let Err(e) = suite.tear_down().await {
			warn!(suite = suite.name(), error = %e, "tear down failed");
		}

		report.results = states
			.into_iter()
			.filter_map(|s| match s {
				CaseState::Finished(r) => Some(r),
				_ => None,
			})
			.collect();
		report.duration = started.elapsed().as_secs_f64();
		Ok(report)
	}
}
