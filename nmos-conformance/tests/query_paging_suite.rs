//! The query-paging suite run end to end over loopback HTTP.

use nmos_conformance::properties::check_strictly_increasing;
use nmos_conformance::registry::MockRegistry;
use nmos_conformance::suites::{QueryPagingSuite, Target};
use nmos_conformance::{ConformanceRunner, Selection, TestState};
use nmos_core::{ApiVersion, TestConfig, Version};
use tokio_test::assert_err;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::builder().with_default_directive(LevelFilter::WARN.into()).from_env_lossy())
		.with_test_writer()
		.try_init();
}

fn config() -> TestConfig {
	TestConfig { paging_timestamp_delay_ms: 2, random_seed: Some(21), ..TestConfig::default() }
}

/// Against the built-in mock every case passes.
#[tokio::test]
async fn mock_registry_passes_every_case() {
	init_tracing();
	let mut suite = QueryPagingSuite::new(config(), Target::Mock("127.0.0.1:0".parse().unwrap()));
	let report = ConformanceRunner::new(config()).run(&mut suite, &Selection::All).await.unwrap();

	assert_eq!(report.results.len(), 15);
	for r in &report.results {
		assert_eq!(r.state, TestState::Pass, "{}: {}", r.name, r.detail);
	}
	assert_eq!(report.exit_code(), 0);
}

/// A registry without pagination is reported OPTIONAL, never FAIL, and its
/// update timestamps still increase strictly.
#[tokio::test]
async fn registry_without_paging_is_optional() {
	init_tracing();
	let registry = MockRegistry::new("http", ApiVersion::V1_3);
	registry.set_paging_supported(false);
	let server = registry.spawn("127.0.0.1:0".parse().unwrap()).await.unwrap();
	let target = Target::Remote { registration_url: server.registration_url(), query_url: server.query_url() };

	let mut suite = QueryPagingSuite::new(config(), target);
	let report = ConformanceRunner::new(config()).run(&mut suite, &Selection::All).await.unwrap();

	let state = |name: &str| report.results.iter().find(|r| r.name == name).map(|r| r.state).unwrap();
	assert_eq!(state("test_11"), TestState::Pass);
	assert_eq!(state("test_14"), TestState::Pass);
	for name in ["test_21_1", "test_21_2", "test_21_5", "test_21_6", "test_21_7"] {
		assert_eq!(state(name), TestState::Optional, "{name}");
	}
	assert!(report.results.iter().all(|r| r.state != TestState::Fail));

	let stamps: Vec<Version> = registry.history().posts.iter().map(|p| p.at).collect();
	assert!(stamps.len() > 40);
	check_strictly_increasing(&stamps).unwrap();
}

#[tokio::test]
async fn single_case_and_unreachable_registry() {
	let mut suite = QueryPagingSuite::new(config(), Target::Mock("127.0.0.1:0".parse().unwrap()));
	let runner = ConformanceRunner::new(config());
	let report = runner.run(&mut suite, &Selection::Single("test_21_4".into())).await.unwrap();
	assert_eq!(report.results.len(), 1);
	assert_eq!(report.results[0].state, TestState::Pass);

	// nothing listens on the discard port
	let target = Target::Remote {
		registration_url: "http://127.0.0.1:9/x-nmos/registration/v1.3/".into(),
		query_url: "http://127.0.0.1:9/x-nmos/query/v1.3/".into(),
	};
	let mut suite = QueryPagingSuite::new(config(), target);
	let err = assert_err!(runner.run(&mut suite, &Selection::All).await);
	assert!(matches!(err, nmos_conformance::ConformanceError::Init(_)));
}

#[tokio::test]
async fn v1_0_query_api_is_not_applicable() {
	let cfg = TestConfig { query_api_version: ApiVersion::V1_0, ..config() };
	let mut suite = QueryPagingSuite::new(cfg.clone(), Target::Mock("127.0.0.1:0".parse().unwrap()));
	let report = ConformanceRunner::new(cfg).run(&mut suite, &Selection::Single("test_21_1".into())).await.unwrap();
	assert_eq!(report.results[0].state, TestState::NotApplicable);
}
