//! A Node under test registers into the mock registry; its request log is
//! checked for registration order and heartbeat timing.

use super::{Harness, Target};
use crate::error::{ConformanceError, Result};
use crate::integrity::{check_heartbeats, check_referential_integrity};
use crate::registry::MockRegistry;
use crate::result::{Outcome, Test, TestAbort, TestResult};
use crate::runner::{TestCase, TestSuite};
use async_trait::async_trait;
use futures::FutureExt;
use nmos_core::{ResourceType, TestConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct NodeRegistrationSuite {
	config: TestConfig,
	target: Target,
	harness: Option<Harness>,
}

impl NodeRegistrationSuite {
	pub const NAME: &'static str = "node-registration";

	pub fn new(config: TestConfig, target: Target) -> Self { Self { config, target, harness: None } }

	/// Long enough for a Node to find the registry and register.
	fn registration_timeout(&self) -> Duration { self.config.heartbeat_interval() * 2 + self.config.processing_grace() }

	fn mock(harness: &mut Option<Harness>, test: &Test) -> Outcome<Arc<MockRegistry>> {
		let h = super::harness(harness, test)?;
		h.mock.clone().ok_or_else(|| TestAbort(test.unclear("This suite needs the mock registry")))
	}

	async fn test_01(&mut self, test: &Test) -> Outcome<TestResult> {
		let timeout = self.registration_timeout();
		let mock = Self::mock(&mut self.harness, test)?;
		if !mock.wait_for_post(ResourceType::Node, timeout).await {
			return Ok(test.fail(format!("Node did not register with the mock registry within {}s", timeout.as_secs_f64())));
		}
		Ok(test.pass())
	}

	async fn test_02(&mut self, test: &Test) -> Outcome<TestResult> {
		let interval = self.config.heartbeat_interval();
		let timeout = self.registration_timeout();
		let mock = Self::mock(&mut self.harness, test)?;
		if !mock.wait_for_post(ResourceType::Node, timeout).await {
			return Ok(test.unclear("Node did not register with the mock registry"));
		}
		// three heartbeats give two intervals to check
		mock.wait_until(interval * 3 + timeout, |h| h.heartbeats.len() >= 3).await;
		Ok(check_heartbeats(test, &mock.history(), interval))
	}

	async fn integrity(&mut self, test: &Test, resource_type: ResourceType) -> Outcome<TestResult> {
		let timeout = self.registration_timeout();
		let mock = Self::mock(&mut self.harness, test)?;
		mock.wait_for_post(resource_type, timeout).await;
		Ok(check_referential_integrity(test, &mock.history(), resource_type))
	}

	async fn test_03(&mut self, test: &Test) -> Outcome<TestResult> { self.integrity(test, ResourceType::Device).await }

	async fn test_04(&mut self, test: &Test) -> Outcome<TestResult> { self.integrity(test, ResourceType::Source).await }

	async fn test_05(&mut self, test: &Test) -> Outcome<TestResult> { self.integrity(test, ResourceType::Flow).await }

	async fn test_06(&mut self, test: &Test) -> Outcome<TestResult> { self.integrity(test, ResourceType::Sender).await }

	async fn test_07(&mut self, test: &Test) -> Outcome<TestResult> { self.integrity(test, ResourceType::Receiver).await }
}

#[async_trait(?Send)]
impl TestSuite for NodeRegistrationSuite {
	fn name(&self) -> &'static str { Self::NAME }

	fn tests(&self) -> Vec<TestCase<Self>> {
		vec![
			TestCase::new("test_01", "Node can register a valid Node resource with the network registration service", |s, t| {
				s.test_01(t).boxed_local()
			}),
			TestCase::new("test_02", "Node maintains itself in the registry via periodic calls to the health resource", |s, t| {
				s.test_02(t).boxed_local()
			}),
			TestCase::new("test_03", "Registration API receives Devices after their referenced Node", |s, t| s.test_03(t).boxed_local()),
			TestCase::new("test_04", "Registration API receives Sources after their referenced Device", |s, t| s.test_04(t).boxed_local()),
			TestCase::new("test_05", "Registration API receives Flows after their referenced Device and Source", |s, t| {
				s.test_05(t).boxed_local()
			}),
			TestCase::new("test_06", "Registration API receives Senders after their referenced Device and Flow", |s, t| {
				s.test_06(t).boxed_local()
			}),
			TestCase::new("test_07", "Registration API receives Receivers after their referenced Device", |s, t| s.test_07(t).boxed_local()),
		]
	}

	async fn set_up(&mut self) -> Result<()> {
		if !matches!(self.target, Target::Mock(_)) {
			return Err(ConformanceError::init("node-registration runs against the mock registry only"));
		}
		let h = Harness::connect(&self.config, &self.target).await?;
		if let Some(url) = h.mock_registration_url() {
			info!(%url, "point the Node under test at this Registration API");
		}
		self.harness = Some(h);
		Ok(())
	}

	async fn tear_down(&mut self) -> Result<()> {
		self.harness = None;
		Ok(())
	}
}
