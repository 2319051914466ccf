//! Question and answer exchange with a human (or scripted) tester.
//!
//! A question is handed to an [`AnswerSource`]; the answer comes back later
//! on the client's channel, either from the HTTP callback route or straight
//! from a scripted source. Every delivered answer also sets the client's
//! [`ExitLatch`], waking any test that is sleeping while it waits for the
//! controller under test to do something.

use crate::error::{ConformanceError, Result};
use async_trait::async_trait;
use axum::{
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Json, Response},
	routing::post,
	Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Route the answer callback is served on.
pub const CALLBACK_ROUTE: &str = "/x-nmos/testanswer/{version}";

const ANSWER_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
	SingleChoice,
	MultiChoice,
	Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResource {
	pub id: Uuid,
	pub label: String,
	pub description: String,
}

/// One selectable answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
	pub answer_id: String,
	pub display_answer: String,
	pub resource: AnswerResource,
}

impl Answer {
	/// Answers are numbered `answer_0`, `answer_1`, ... in presentation order.
	pub fn numbered(index: usize, id: Uuid, label: &str, description: &str) -> Self {
		Self {
			answer_id: format!("answer_{index}"),
			display_answer: format!("{label} ({id})"),
			resource: AnswerResource { id, label: label.into(), description: description.into() },
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
	pub test_type: QuestionType,
	pub question_id: String,
	pub name: String,
	pub description: String,
	pub question: String,
	pub answers: Vec<Answer>,
	/// Seconds the tester has to answer.
	pub timeout: u64,
	pub answer_uri: String,
	#[serde(default)]
	pub metadata: Option<Value>,
}

impl Question {
	/// `part` numbers the questions of a multipart test.
	pub fn new(test_type: QuestionType, name: &str, description: &str, question: impl Into<String>, part: Option<u32>) -> Self {
		Self {
			test_type,
			question_id: match part {
				Some(n) => format!("{name}_{n}"),
				None => name.to_string(),
			},
			name: name.into(),
			description: description.into(),
			question: question.into(),
			answers: Vec::new(),
			timeout: 0,
			answer_uri: String::new(),
			metadata: None,
		}
	}

	pub fn with_answers(mut self, answers: Vec<Answer>) -> Self {
		self.answers = answers;
		self
	}

	pub fn with_metadata(mut self, metadata: Value) -> Self {
		self.metadata = Some(metadata);
		self
	}
}

/// The callback body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
	pub question_id: String,
	#[serde(default)]
	pub answer_response: Value,
	#[serde(default)]
	pub time_received: Option<f64>,
}

impl AnswerPayload {
	/// Selected answer ids. A `multi_choice` answer of `null` means nothing
	/// was selected; an `action` has no selection.
	pub fn selected(&self, test_type: QuestionType) -> Result<Vec<String>> {
		let malformed = || ConformanceError::oracle(format!("Integrity check failed: result format error: {}", self.answer_response));
		match test_type {
			QuestionType::Action => Ok(Vec::new()),
			QuestionType::SingleChoice => self.answer_response.as_str().map(|s| vec![s.to_string()]).ok_or_else(malformed),
			QuestionType::MultiChoice => match &self.answer_response {
				Value::Null => Ok(Vec::new()),
				Value::Array(items) => items.iter().map(|v| v.as_str().map(str::to_string).ok_or_else(malformed)).collect(),
				_ => Err(malformed()),
			},
		}
	}
}

fn now_secs() -> f64 { chrono::Utc::now().timestamp_millis() as f64 / 1000.0 }

/// One-shot wake-up signal. Several sets before a clear collapse into one.
#[derive(Debug, Default)]
pub struct ExitLatch {
	set: AtomicBool,
	notify: Notify,
}

impl ExitLatch {
	pub fn set(&self) {
		self.set.store(true, Ordering::SeqCst);
		self.notify.notify_waiters();
	}

	pub fn clear(&self) { self.set.store(false, Ordering::SeqCst); }

	pub fn is_set(&self) -> bool { self.set.load(Ordering::SeqCst) }

	/// Sleep for `duration` or until the latch is set. Returns whether it was set.
	pub async fn wait(&self, duration: Duration) -> bool {
		let notified = self.notify.notified();
		tokio::pin!(notified);
		notified.as_mut().enable();
		if self.is_set() {
			return true;
		}
		let _ = tokio::time::timeout(duration, notified).await;
		self.is_set()
	}
}

/// Where answers are delivered.
#[derive(Debug, Clone)]
pub struct AnswerSink {
	tx: mpsc::Sender<AnswerPayload>,
	exit: Arc<ExitLatch>,
}

impl AnswerSink {
	/// Queue an answer without waiting. A full queue drops the answer.
	pub fn deliver(&self, mut answer: AnswerPayload) -> Result<()> {
		answer.time_received.get_or_insert_with(now_secs);
		debug!(question_id = %answer.question_id, "answer received");
		self.exit.set();
		self.tx.try_send(answer).map_err(|e| match e {
			TrySendError::Full(stale) => {
				warn!(question_id = %stale.question_id, "answer queue full, dropping answer");
				ConformanceError::oracle("answer queue full")
			}
			TrySendError::Closed(_) => ConformanceError::oracle("answer channel closed"),
		})
	}
}

/// Puts a question in front of whoever answers it.
#[async_trait]
pub trait AnswerSource: Send + Sync {
	async fn post_question(&self, question: &Question, sink: &AnswerSink) -> Result<()>;
}

/// HTTP client for a Testing Façade; answers arrive via [`callback_router`].
#[derive(Debug, Clone)]
pub struct TestingFacade {
	http: reqwest::Client,
	url: String,
}

impl TestingFacade {
	pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
		Ok(Self { http: reqwest::Client::builder().timeout(timeout).build()?, url: url.into() })
	}
}

#[async_trait]
impl AnswerSource for TestingFacade {
	async fn post_question(&self, question: &Question, _sink: &AnswerSink) -> Result<()> {
		let r = self.http.post(&self.url).json(question).send().await?;
		if !r.status().is_success() {
			return Err(ConformanceError::oracle(format!("Problem contacting Testing Façade: {}", r.status())));
		}
		Ok(())
	}
}

type Script = dyn Fn(&Question) -> Value + Send + Sync;

/// Answers every question immediately with the value `script` returns.
pub struct ScriptedOracle {
	script: Box<Script>,
}

impl ScriptedOracle {
	pub fn new(script: impl Fn(&Question) -> Value + Send + Sync + 'static) -> Self { Self { script: Box::new(script) } }
}

impl std::fmt::Debug for ScriptedOracle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("ScriptedOracle") }
}

#[async_trait]
impl AnswerSource for ScriptedOracle {
	async fn post_question(&self, question: &Question, sink: &AnswerSink) -> Result<()> {
		let answer_response = (self.script)(question);
		sink.deliver(AnswerPayload { question_id: question.question_id.clone(), answer_response, time_received: None })
	}
}

/// Owns the answer channel and exit latch for one suite run.
pub struct InteractiveOracleClient {
	source: Arc<dyn AnswerSource>,
	sink: AnswerSink,
	answers: Mutex<mpsc::Receiver<AnswerPayload>>,
	timeout: Option<Duration>,
	answer_uri: String,
}

impl InteractiveOracleClient {
	/// `timeout` of `None` waits forever.
	pub fn new(source: Arc<dyn AnswerSource>, timeout: Option<Duration>, answer_uri: impl Into<String>) -> Self {
		let (tx, rx) = mpsc::channel(ANSWER_QUEUE_DEPTH);
		Self {
			source,
			sink: AnswerSink { tx, exit: Arc::new(ExitLatch::default()) },
			answers: Mutex::new(rx),
			timeout,
			answer_uri: answer_uri.into(),
		}
	}

	pub fn sink(&self) -> AnswerSink { self.sink.clone() }

	pub fn exit_latch(&self) -> Arc<ExitLatch> { self.sink.exit.clone() }

	/// Ask `question` and wait for its answer.
	pub async fn invoke(&self, mut question: Question) -> Result<AnswerPayload> {
		question.answer_uri = self.answer_uri.clone();
		question.timeout = self.timeout.map_or(0, |t| t.as_secs());
		let mut answers = self.answers.lock().await;
		while let Ok(stale) = answers.try_recv() {
			warn!(question_id = %stale.question_id, "discarding unsolicited answer");
		}
		self.sink.exit.clear();

		info!(question_id = %question.question_id, "asking");
		self.source.post_question(&question, &self.sink).await?;

		let answer = match self.timeout {
			Some(t) => tokio::time::timeout(t, answers.recv()).await.map_err(|_| ConformanceError::oracle("Test timed out"))?,
			None => answers.recv().await,
		}
		.ok_or_else(|| ConformanceError::oracle("answer channel closed"))?;

		if answer.question_id != question.question_id {
			return Err(ConformanceError::oracle(format!(
				"Integrity check failed: cannot compare result of {} with expected result for {}",
				question.question_id, answer.question_id
			)));
		}
		Ok(answer)
	}
}

/// Serves the answer callback, feeding answers into `sink`.
pub fn callback_router(sink: AnswerSink) -> Router {
	Router::new().route(CALLBACK_ROUTE, post(receive_answer)).with_state(sink)
}

async fn receive_answer(State(sink): State<AnswerSink>, Json(body): Json<Value>) -> Response {
	if body.get("question_id").is_none() {
		return (StatusCode::BAD_REQUEST, "Invalid JSON received").into_response();
	}
	let answer: AnswerPayload = match serde_json::from_value(body) {
		Ok(a) => a,
		Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
	};
	match sink.deliver(answer) {
		Ok(()) => StatusCode::ACCEPTED.into_response(),
		Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::Request;
	use serde_json::json;
	use tower::ServiceExt;

	fn question(name: &str, test_type: QuestionType) -> Question { Question::new(test_type, name, "d", "q?", None) }

	#[tokio::test]
	async fn scripted_answer_round_trip() {
		let oracle = ScriptedOracle::new(|q| json!(q.answers.iter().map(|a| a.answer_id.clone()).collect::<Vec<_>>()));
		let client = InteractiveOracleClient::new(Arc::new(oracle), Some(Duration::from_secs(1)), "http://127.0.0.1/cb");
		let q = question("test_01", QuestionType::MultiChoice)
			.with_answers(vec![Answer::numbered(0, Uuid::new_v4(), "r0", ""), Answer::numbered(1, Uuid::new_v4(), "r1", "")]);
		let answer = client.invoke(q).await.unwrap();
		assert_eq!(answer.selected(QuestionType::MultiChoice).unwrap(), vec!["answer_0", "answer_1"]);
		assert!(answer.time_received.is_some());
		assert!(client.exit_latch().is_set());
	}

	struct Silent;

	#[async_trait]
	impl AnswerSource for Silent {
		async fn post_question(&self, _: &Question, _: &AnswerSink) -> Result<()> { Ok(()) }
	}

	#[tokio::test]
	async fn timeout_is_an_oracle_error() {
		let client = InteractiveOracleClient::new(Arc::new(Silent), Some(Duration::from_millis(20)), "");
		let err = client.invoke(question("test_02", QuestionType::Action)).await.unwrap_err();
		assert!(matches!(err, ConformanceError::Oracle(ref m) if m == "Test timed out"));
	}

	#[tokio::test]
	async fn mismatched_question_id_rejected() {
		let oracle = ScriptedOracle::new(|_| json!("answer_0"));
		struct Wrong(ScriptedOracle);
		#[async_trait]
		impl AnswerSource for Wrong {
			async fn post_question(&self, q: &Question, sink: &AnswerSink) -> Result<()> {
				let mut other = q.clone();
				other.question_id = "test_99".into();
				self.0.post_question(&other, sink).await
			}
		}
		let client = InteractiveOracleClient::new(Arc::new(Wrong(oracle)), Some(Duration::from_secs(1)), "");
		let err = client.invoke(question("test_01", QuestionType::SingleChoice)).await.unwrap_err();
		assert!(err.to_string().contains("Integrity check failed"));
	}

	#[test]
	fn null_multi_choice_is_empty() {
		let a = AnswerPayload { question_id: "q".into(), answer_response: Value::Null, time_received: None };
		assert!(a.selected(QuestionType::MultiChoice).unwrap().is_empty());
		assert!(a.selected(QuestionType::SingleChoice).is_err());
	}

	#[tokio::test]
	async fn latch_wakes_sleeper() {
		let latch = Arc::new(ExitLatch::default());
		let sleeper = {
			let latch = latch.clone();
			tokio::spawn(async move { latch.wait(Duration::from_secs(10)).await })
		};
		tokio::time::sleep(Duration::from_millis(10)).await;
		latch.set();
		latch.set();
		assert!(sleeper.await.unwrap());
		latch.clear();
		assert!(!latch.wait(Duration::from_millis(5)).await);
	}

	#[tokio::test]
	async fn callback_route() {
		let client = InteractiveOracleClient::new(Arc::new(Silent), Some(Duration::from_secs(1)), "");
		let app = callback_router(client.sink());
		let bad = Request::builder()
			.method("POST")
			.uri("/x-nmos/testanswer/v1.0")
			.header("content-type", "application/json")
			.body(Body::from(json!({"answer_response": "x"}).to_string()))
			.unwrap();
		assert_eq!(app.clone().oneshot(bad).await.unwrap().status(), StatusCode::BAD_REQUEST);
		let good = Request::builder()
			.method("POST")
			.uri("/x-nmos/testanswer/v1.0")
			.header("content-type", "application/json")
			.body(Body::from(json!({"question_id": "test_01", "answer_response": "answer_1"}).to_string()))
			.unwrap();
		assert_eq!(app.oneshot(good).await.unwrap().status(), StatusCode::ACCEPTED);
		assert!(client.exit_latch().is_set());
	}

	#[tokio::test]
	async fn unsolicited_answers_never_block_the_callback() {
		let client = InteractiveOracleClient::new(Arc::new(Silent), Some(Duration::from_secs(1)), "");
		let app = callback_router(client.sink());
		let post = |n: usize| {
			Request::builder()
				.method("POST")
				.uri("/x-nmos/testanswer/v1.0")
				.header("content-type", "application/json")
				.body(Body::from(json!({"question_id": format!("test_{n}"), "answer_response": "answer_0"}).to_string()))
				.unwrap()
		};
		for n in 0..ANSWER_QUEUE_DEPTH {
			assert_eq!(app.clone().oneshot(post(n)).await.unwrap().status(), StatusCode::ACCEPTED);
		}
		let overflow = tokio::time::timeout(Duration::from_secs(1), app.oneshot(post(99))).await.unwrap();
		assert_eq!(overflow.unwrap().status(), StatusCode::SERVICE_UNAVAILABLE);

		// the stale answers are discarded before the next question
		let err = client.invoke(question("test_50", QuestionType::Action)).await.unwrap_err();
		assert!(matches!(err, ConformanceError::Oracle(ref m) if m == "Test timed out"));
	}
}
