//! The concrete test suites and the registry connection they share.

pub mod node_registration;
pub mod query_paging;
pub mod tr08_controller;

use crate::error::{ConformanceError, Result};
use crate::fixtures::ResourceFixtureGenerator;
use crate::registry::{HttpRegistryClient, MockRegistry, MockRegistryServer, QueryApi};
use crate::result::{Outcome, Test, TestAbort};
use nmos_core::TestConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub use node_registration::NodeRegistrationSuite;
pub use query_paging::QueryPagingSuite;
pub use tr08_controller::Tr08ControllerSuite;

/// Suite names accepted by the CLI, with a short description.
pub const SUITES: &[(&str, &str)] = &[
	(QueryPagingSuite::NAME, "IS-04 Registration and Query API behaviour, including pagination"),
	(NodeRegistrationSuite::NAME, "IS-04 Node registration order and heartbeats against the mock registry"),
	(Tr08ControllerSuite::NAME, "TR-08 JPEG XS compatibility as presented by a controller"),
];

/// Which registry a suite talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
	/// Start an in-process mock registry on this address.
	Mock(SocketAddr),
	/// An implementation under test.
	Remote { registration_url: String, query_url: String },
}

impl Target {
	pub fn mock_on_port(port: u16) -> Self { Self::Mock(SocketAddr::from(([127, 0, 0, 1], port))) }
}

/// Registry client, optional mock registry and fixture generator.
pub struct Harness {
	pub client: Arc<HttpRegistryClient>,
	pub mock: Option<Arc<MockRegistry>>,
	pub fixtures: ResourceFixtureGenerator,
	server: Option<MockRegistryServer>,
}

impl Harness {
	pub async fn connect(config: &TestConfig, target: &Target) -> Result<Self> {
		let (client, mock, server) = match target {
			Target::Mock(addr) => {
				let registry = MockRegistry::new(config.protocol(), config.query_api_version);
				let server = registry.spawn(*addr).await?;
				let client = HttpRegistryClient::new(&server.registration_url(), &server.query_url(), config.http_timeout())?;
				(client, Some(registry), Some(server))
			}
			Target::Remote { registration_url, query_url } => {
				(HttpRegistryClient::new(registration_url, query_url, config.http_timeout())?, None, None)
			}
		};
		let client = Arc::new(client);
		let fixtures = ResourceFixtureGenerator::new(client.clone(), Some(client.clone()), config);
		let harness = Self { client, mock, fixtures, server };
		harness.check_reachable().await?;
		Ok(harness)
	}

	async fn check_reachable(&self) -> Result<()> {
		let r = self.client.get("").await?;
		if r.status != 200 {
			return Err(ConformanceError::init(format!("Query API at {} returned {}", self.client.query_url(), r.status)));
		}
		info!(url = self.client.query_url(), "registry reachable");
		Ok(())
	}

	pub fn mock_registration_url(&self) -> Option<String> { self.server.as_ref().map(MockRegistryServer::registration_url) }
}

/// The harness, or UNCLEAR when set-up has not connected one.
pub(crate) fn harness<'a>(harness: &'a mut Option<Harness>, test: &Test) -> Outcome<&'a mut Harness> {
	harness.as_mut().ok_or_else(|| TestAbort(test.unclear("No registry connection; set-up did not run")))
}
