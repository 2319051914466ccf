#![forbid(unsafe_code)]
//! NMOS conformance testing.
//!
//! The pieces a suite is built from: verdicts ([`result`]), timestamp
//! ranges ([`timestamp_spec`]), the Query API pagination oracle
//! ([`paging`]), the TR-08 interoperability model ([`compatibility`]),
//! registry clients and an in-process mock registry ([`registry`]),
//! resource fixtures ([`fixtures`]), registration log checks
//! ([`integrity`]), the interactive question/answer oracle ([`oracle`]) and
//! the runner that sequences a suite's cases ([`runner`]).
//!
//! # Quick Start
//!
//! ```no_run
//! use nmos_conformance::suites::{QueryPagingSuite, Target};
//! use nmos_conformance::{ConformanceRunner, Selection};
//! use nmos_core::TestConfig;
//!
//! # async fn run() -> nmos_conformance::Result<()> {
//! let config = TestConfig::default();
//! let target = Target::mock_on_port(config.mock_registry_port());
//! let mut suite = QueryPagingSuite::new(config.clone(), target);
//! let report = ConformanceRunner::new(config).run(&mut suite, &Selection::All).await?;
//! println!("{}", report.to_json_pretty()?);
//! # Ok(())
//! # }
//! ```

pub mod compatibility;
pub mod error;
pub mod fixtures;
pub mod integrity;
pub mod oracle;
pub mod paging;
pub mod properties;
pub mod registry;
pub mod report;
pub mod result;
pub mod runner;
pub mod suites;
pub mod timestamp_spec;

pub use compatibility::{is_compatible, CapabilitySet, ConformanceLevel, InteropPoint, Tr08Capability};
pub use error::{ConformanceError, Result};
pub use fixtures::ResourceFixtureGenerator;
pub use oracle::{AnswerSource, InteractiveOracleClient, Question, QuestionType, ScriptedOracle};
pub use paging::{PagedQuery, PagingExpectation, PagingOracle};
pub use registry::{MockRegistry, RequestHistory};
pub use report::SuiteReport;
pub use result::{Outcome, Test, TestAbort, TestResult, TestState};
pub use runner::{ConformanceRunner, Selection, TestCase, TestSuite};
pub use timestamp_spec::VersionSpec;
