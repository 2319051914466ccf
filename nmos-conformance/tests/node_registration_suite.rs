//! The node-registration suite against a simulated Node that registers into
//! the suite's mock registry.

use nmos_conformance::registry::{HttpRegistryClient, RegistrationApi};
use nmos_conformance::suites::{NodeRegistrationSuite, Target};
use nmos_conformance::{ConformanceRunner, ResourceFixtureGenerator, Selection, TestState};
use nmos_core::{Resource, TestConfig};
use std::sync::Arc;
use std::time::Duration;

fn free_port() -> u16 {
	let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
	listener.local_addr().unwrap().port()
}

fn config(seed: u64) -> TestConfig {
	TestConfig { heartbeat_interval_secs: 1, api_processing_timeout_ms: 500, random_seed: Some(seed), ..TestConfig::default() }
}

/// Registers `order` (indices into a resource graph) as soon as the
/// registry is up, then heartbeats once per interval.
fn simulate_node(port: u16, config: TestConfig, order: [usize; 6]) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		let url = format!("http://127.0.0.1:{port}/x-nmos/registration/v1.3/");
		let client = Arc::new(HttpRegistryClient::new(&url, &url, Duration::from_secs(1)).unwrap());
		let mut fixtures = ResourceFixtureGenerator::new(client.clone(), None, &config);
		let resources: Vec<Resource> = fixtures.graph("simulated node").in_registration_order();
		let node_id = resources[0].id();

		let first = resources[order[0]].registration_body().unwrap();
		while client.post_resource(&first).await.map(|r| r.status).unwrap_or(0) != 201 {
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
		for i in &order[1..] {
			client.post_resource(&resources[*i].registration_body().unwrap()).await.unwrap();
		}
		loop {
			tokio::time::sleep(config.heartbeat_interval()).await;
			let _ = client.heartbeat(node_id).await;
		}
	})
}

#[tokio::test]
async fn well_behaved_node_passes() {
	let port = free_port();
	let cfg = config(1);
	let node = simulate_node(port, cfg.clone(), [0, 1, 2, 3, 4, 5]);

	let mut suite = NodeRegistrationSuite::new(cfg.clone(), Target::mock_on_port(port));
	let report = ConformanceRunner::new(cfg).run(&mut suite, &Selection::All).await.unwrap();
	node.abort();

	assert_eq!(report.results.len(), 7);
	for r in &report.results {
		assert_eq!(r.state, TestState::Pass, "{}: {}", r.name, r.detail);
	}
}

#[tokio::test]
async fn sender_before_flow_is_a_warning() {
	let port = free_port();
	let cfg = config(2);
	// node, device, source, sender, flow, receiver
	let node = simulate_node(port, cfg.clone(), [0, 1, 2, 4, 3, 5]);

	let mut suite = NodeRegistrationSuite::new(cfg.clone(), Target::mock_on_port(port));
	let runner = ConformanceRunner::new(cfg).with_ignored(["test_02".to_string()]);
	let report = runner.run(&mut suite, &Selection::All).await.unwrap();
	node.abort();

	let state = |name: &str| report.results.iter().find(|r| r.name == name).map(|r| r.state).unwrap();
	assert_eq!(state("test_02"), TestState::Disabled);
	assert_eq!(state("test_05"), TestState::Pass);
	assert_eq!(state("test_06"), TestState::Warning);
	assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn remote_target_is_rejected() {
	let cfg = config(3);
	let target = Target::Remote { registration_url: "http://127.0.0.1:9/".into(), query_url: "http://127.0.0.1:9/".into() };
	let mut suite = NodeRegistrationSuite::new(cfg.clone(), target);
	tokio_test::assert_err!(ConformanceRunner::new(cfg).run(&mut suite, &Selection::All).await);
}
