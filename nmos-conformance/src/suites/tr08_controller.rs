//! TR-08 controller checks: the registry is populated with JPEG XS and
//! uncompressed senders and receivers, and the tester is asked what the
//! controller under test shows.

use super::{harness, Harness, Target};
use crate::compatibility::{is_compatible, shuffled_catalogue, InteropPoint, MEDIA_TYPE_JXSV};
use crate::error::{ConformanceError, Result};
use crate::fixtures::Tr08Sender;
use crate::oracle::{callback_router, Answer, AnswerSource, InteractiveOracleClient, Question, QuestionType, TestingFacade};
use crate::result::{Outcome, Test, TestAbort, TestResult};
use crate::runner::{TestCase, TestSuite};
use async_trait::async_trait;
use futures::FutureExt;
use nmos_core::resource::Receiver;
use nmos_core::{Resource, TestConfig};
use rand::seq::index;
use rand::Rng;
use serde_json::json;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const RECEIVER_COUNT: usize = 4;

pub struct Tr08ControllerSuite {
	config: TestConfig,
	target: Target,
	source: Arc<dyn AnswerSource>,
	serve_callback: bool,
	harness: Option<Harness>,
	oracle: Option<InteractiveOracleClient>,
	callback: Option<JoinHandle<()>>,
	senders: Vec<Tr08Sender>,
	receivers: Vec<(Receiver, InteropPoint)>,
}

impl Tr08ControllerSuite {
	pub const NAME: &'static str = "tr08-controller";

	/// Answers come straight from `source`; no callback listener is started.
	pub fn new(config: TestConfig, target: Target, source: Arc<dyn AnswerSource>) -> Self {
		Self {
			config,
			target,
			source,
			serve_callback: false,
			harness: None,
			oracle: None,
			callback: None,
			senders: Vec::new(),
			receivers: Vec::new(),
		}
	}

	/// Questions go to the Testing Façade at `url`; its answers come back on
	/// the callback listener at the configured answer port.
	pub fn with_facade(config: TestConfig, target: Target, url: &str) -> Result<Self> {
		let facade = TestingFacade::new(url, config.http_timeout())?;
		let mut suite = Self::new(config, target, Arc::new(facade));
		suite.serve_callback = true;
		Ok(suite)
	}

	pub fn senders(&self) -> &[Tr08Sender] { &self.senders }

	pub fn receivers(&self) -> &[(Receiver, InteropPoint)] { &self.receivers }

	fn answer_uri(&self) -> String { format!("http://localhost:{}/x-nmos/testanswer/v1.0", self.config.answer_port()) }

	async fn start_callback(&mut self, oracle: &InteractiveOracleClient) -> Result<()> {
		let addr = SocketAddr::from(([0, 0, 0, 0], self.config.answer_port()));
		let listener = tokio::net::TcpListener::bind(addr).await?;
		let app = callback_router(oracle.sink());
		info!(%addr, "answer callback listening");
		self.callback = Some(tokio::spawn(async move {
			if let Err(e) = axum::serve(listener, app).await {
				warn!(error = %e, "answer callback stopped");
			}
		}));
		Ok(())
	}

	/// Registers a Node and Device carrying two JPEG XS and two
	/// uncompressed senders, and receivers of which a random non-empty
	/// subset are JPEG XS.
	async fn populate(&mut self) -> Result<()> {
		let set_up = Test::new("set_up", "Populate the registry");
		let abort = |a: TestAbort| ConformanceError::init(a.into_result().detail);
		let h = self.harness.as_mut().ok_or_else(|| ConformanceError::init("no registry connection"))?;
		let fixtures = &mut h.fixtures;

		let points = shuffled_catalogue(fixtures.rng());
		let (jxsv, raw): (Vec<InteropPoint>, Vec<InteropPoint>) = points.into_iter().partition(|p| p.format.media_type == MEDIA_TYPE_JXSV);
		if jxsv.len() < 2 || raw.is_empty() {
			return Err(ConformanceError::init("interop catalogue has too few points"));
		}

		let node = fixtures.node("TR-08 test node");
		let device = fixtures.device(&node, "TR-08 test device");
		fixtures.post_resource(&set_up, &node.clone().into(), &[200, 201]).await.map_err(abort)?;
		fixtures.post_resource(&set_up, &device.clone().into(), &[200, 201]).await.map_err(abort)?;

		let sender_points = [&jxsv[0], &raw[0], &jxsv[1], &raw[raw.len() - 1]];
		let mut senders = Vec::with_capacity(sender_points.len());
		for point in sender_points {
			let s = fixtures.tr08_sender(&device, point)?;
			for resource in [Resource::from(s.source.clone()), s.flow.clone().into(), s.sender.clone().into()] {
				fixtures.post_resource(&set_up, &resource, &[200, 201]).await.map_err(abort)?;
			}
			senders.push(s);
		}

		let count = fixtures.rng().gen_range(1..=RECEIVER_COUNT);
		let picked: BTreeSet<usize> = index::sample(fixtures.rng(), RECEIVER_COUNT, count).into_iter().collect();
		let mut receivers = Vec::with_capacity(RECEIVER_COUNT);
		for i in 0..RECEIVER_COUNT {
			let point = if picked.contains(&i) { jxsv[i % jxsv.len()].clone() } else { raw[i % raw.len()].clone() };
			let receiver = fixtures.tr08_receiver(&device, &point)?;
			fixtures.post_resource(&set_up, &receiver.clone().into(), &[200, 201]).await.map_err(abort)?;
			receivers.push((receiver, point));
		}
		info!(senders = senders.len(), receivers = receivers.len(), jxsv_receivers = count, "registry populated");
		self.senders = senders;
		self.receivers = receivers;
		Ok(())
	}

	fn receiver_answers(&self) -> Vec<Answer> {
		self.receivers
			.iter()
			.enumerate()
			.map(|(i, (r, _))| Answer::numbered(i, r.common.id, &r.common.label, &r.common.description))
			.collect()
	}

	fn answer_ids<F: Fn(&InteropPoint) -> bool>(&self, select: F) -> BTreeSet<String> {
		self.receivers.iter().enumerate().filter(|(_, (_, p))| select(p)).map(|(i, _)| format!("answer_{i}")).collect()
	}

	/// Ask a multi-choice question; `Ok(true)` when exactly `expected` was selected.
	async fn ask(&self, test: &Test, question: Question, expected: &BTreeSet<String>) -> Outcome<bool> {
		let oracle = self.oracle.as_ref().ok_or_else(|| TestAbort(test.unclear("No interactive oracle; set-up did not run")))?;
		let answer = oracle.invoke(question).await.map_err(|e| TestAbort(test.unclear(e.to_string())))?;
		let selected = answer.selected(QuestionType::MultiChoice).map_err(|e| TestAbort(test.unclear(e.to_string())))?;
		let selected: BTreeSet<String> = selected.into_iter().collect();
		Ok(&selected == expected)
	}

	async fn test_01(&mut self, test: &Test) -> Outcome<TestResult> {
		harness(&mut self.harness, test)?;
		let question = "The NCuT should be able to discover all JPEG XS capable Receivers that are registered in the Registry.\n\n\
			Refresh the NCuT's view of the Registry and carefully select the Receivers that are JPEG XS capable from the following list.";
		let q = Question::new(QuestionType::MultiChoice, &test.name, &test.description, question, None).with_answers(self.receiver_answers());
		let expected = self.answer_ids(|p| p.format.media_type == MEDIA_TYPE_JXSV);
		if !self.ask(test, q, &expected).await? {
			return Ok(test.fail("Incorrect receiver identified"));
		}
		Ok(test.pass_with("All devices correctly identified"))
	}

	async fn test_02(&mut self, test: &Test) -> Outcome<TestResult> {
		harness(&mut self.harness, test)?;
		for (part, sender) in self.senders.iter().enumerate() {
			let label = &sender.sender.common.label;
			let question = format!(
				"The NCuT should be able to determine which Receivers can receive the Sender '{label}'.\n\n\
				Select every Receiver from the following list that is compatible with this Sender."
			);
			let q = Question::new(QuestionType::MultiChoice, &test.name, &test.description, question, Some(part as u32 + 1))
				.with_answers(self.receiver_answers())
				.with_metadata(json!({ "sender": { "id": sender.sender.common.id, "label": label } }));
			let expected = self.answer_ids(|p| is_compatible(&sender.point.capability, &p.capability));
			if !self.ask(test, q, &expected).await? {
				return Ok(test.fail(format!("Incorrect receivers identified for Sender '{label}'")));
			}
		}
		Ok(test.pass_with("All compatible receivers correctly identified"))
	}
}

#[async_trait(?Send)]
impl TestSuite for Tr08ControllerSuite {
	fn name(&self) -> &'static str { Self::NAME }

	fn tests(&self) -> Vec<TestCase<Self>> {
		vec![
			TestCase::new("test_01", "Ensure NCuT can identify JPEG XS Receivers", |s, t| s.test_01(t).boxed_local()),
			TestCase::new("test_02", "Ensure NCuT can identify the Receivers compatible with each JPEG XS or uncompressed Sender", |s, t| {
				s.test_02(t).boxed_local()
			}),
		]
	}

	async fn set_up(&mut self) -> Result<()> {
		self.harness = Some(Harness::connect(&self.config, &self.target).await?);
		let oracle = InteractiveOracleClient::new(self.source.clone(), self.config.oracle_timeout(), self.answer_uri());
		if self.serve_callback {
			self.start_callback(&oracle).await?;
		}
		self.oracle = Some(oracle);
		self.populate().await
	}

	async fn tear_down(&mut self) -> Result<()> {
		if let Some(task) = self.callback.take() {
			task.abort();
		}
		self.oracle = None;
		self.harness = None;
		Ok(())
	}
}
