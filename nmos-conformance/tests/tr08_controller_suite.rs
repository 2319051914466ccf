//! The tr08-controller suite with scripted testers standing in for a human.

use nmos_conformance::compatibility::{catalogue, is_compatible, InteropPoint, MEDIA_TYPE_JXSV};
use nmos_conformance::oracle::{AnswerSink, AnswerSource, Question};
use nmos_conformance::suites::{Target, Tr08ControllerSuite};
use nmos_conformance::{ConformanceRunner, ScriptedOracle, Selection, TestState};
use nmos_core::TestConfig;
use serde_json::{json, Value};
use std::sync::Arc;

fn config() -> TestConfig { TestConfig { random_seed: Some(8), controller_testing_timeout_secs: 1, ..TestConfig::default() } }

fn mock() -> Target { Target::Mock("127.0.0.1:0".parse().unwrap()) }

/// Fixture labels end in the interop point id.
fn point_of(label: &str) -> Option<InteropPoint> {
	let id = label.rsplit(' ').next()?;
	catalogue().into_iter().find(|p| p.id == id)
}

fn select(question: &Question, keep: impl Fn(&InteropPoint) -> bool) -> Value {
	let ids: Vec<&str> = question
		.answers
		.iter()
		.filter(|a| point_of(&a.resource.label).map_or(false, |p| keep(&p)))
		.map(|a| a.answer_id.as_str())
		.collect();
	json!(ids)
}

/// Answers the way a controller with a correct TR-08 model would.
fn correct_tester(question: &Question) -> Value {
	match question.metadata.as_ref().and_then(|m| m["sender"]["label"].as_str()).and_then(point_of) {
		Some(sender) => select(question, |r| is_compatible(&sender.capability, &r.capability)),
		None => select(question, |r| r.format.media_type == MEDIA_TYPE_JXSV),
	}
}

#[tokio::test]
async fn correct_answers_pass() {
	let mut suite = Tr08ControllerSuite::new(config(), mock(), Arc::new(ScriptedOracle::new(correct_tester)));
	let report = ConformanceRunner::new(config()).run(&mut suite, &Selection::All).await.unwrap();
	for r in &report.results {
		assert_eq!(r.state, TestState::Pass, "{}: {}", r.name, r.detail);
	}
	assert_eq!(suite.senders().len(), 4);
	assert_eq!(suite.receivers().len(), 4);
	assert!(suite.receivers().iter().any(|(_, p)| p.format.media_type == MEDIA_TYPE_JXSV));
}

#[tokio::test]
async fn selecting_everything_fails() {
	let everything = |q: &Question| json!(q.answers.iter().map(|a| a.answer_id.clone()).collect::<Vec<_>>());
	let mut suite = Tr08ControllerSuite::new(config(), mock(), Arc::new(ScriptedOracle::new(everything)));
	let report = ConformanceRunner::new(config()).run(&mut suite, &Selection::Single("test_02".into())).await.unwrap();
	// an uncompressed sender is never compatible with a JPEG XS receiver, nor a JPEG XS sender with an uncompressed one
	assert_eq!(report.results[0].state, TestState::Fail);
}

struct Silent;

#[async_trait::async_trait]
impl AnswerSource for Silent {
	async fn post_question(&self, _: &Question, _: &AnswerSink) -> nmos_conformance::Result<()> { Ok(()) }
}

#[tokio::test]
async fn no_answer_is_unclear() {
	let mut suite = Tr08ControllerSuite::new(config(), mock(), Arc::new(Silent));
	let report = ConformanceRunner::new(config()).run(&mut suite, &Selection::Single("test_01".into())).await.unwrap();
	assert_eq!(report.results[0].state, TestState::Unclear);
	assert_eq!(report.results[0].detail, "oracle: Test timed out");
	assert_eq!(report.exit_code(), 0);
}
