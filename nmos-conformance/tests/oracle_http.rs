//! Question and answer round trip through a Testing Façade over HTTP.

use axum::{extract::Json, http::StatusCode, routing::post, Router};
use nmos_conformance::oracle::{callback_router, Answer, Question, TestingFacade};
use nmos_conformance::{InteractiveOracleClient, QuestionType};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn serve(app: Router) -> SocketAddr {
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
	addr
}

/// A façade whose tester always picks the last answer, after a short pause.
async fn facade() -> SocketAddr {
	async fn ask(Json(question): Json<Question>) -> StatusCode {
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(50)).await;
			let pick = question.answers.last().map(|a| a.answer_id.clone());
			let body = json!({ "question_id": question.question_id, "answer_response": [pick] });
			reqwest::Client::new().post(&question.answer_uri).json(&body).send().await.unwrap();
		});
		StatusCode::ACCEPTED
	}
	serve(Router::new().route("/", post(ask))).await
}

#[tokio::test]
async fn answer_arrives_on_callback() {
	let facade_addr = facade().await;
	let source = TestingFacade::new(format!("http://{facade_addr}/"), Duration::from_secs(1)).unwrap();

	// the callback address is only known once bound
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let callback_addr = listener.local_addr().unwrap();
	let answer_uri = format!("http://{callback_addr}/x-nmos/testanswer/v1.0");
	let client = InteractiveOracleClient::new(Arc::new(source), Some(Duration::from_secs(5)), answer_uri);
	let app = callback_router(client.sink());
	tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

	let answers = (0..3).map(|i| Answer::numbered(i, Uuid::new_v4(), &format!("r{i}"), "receiver")).collect();
	let question = Question::new(QuestionType::MultiChoice, "test_01", "pick one", "Which?", Some(2)).with_answers(answers);
	let payload = client.invoke(question).await.unwrap();

	assert_eq!(payload.question_id, "test_01_2");
	assert_eq!(payload.selected(QuestionType::MultiChoice).unwrap(), vec!["answer_2".to_string()]);
	assert!(payload.time_received.is_some());
	assert!(client.exit_latch().is_set());
}

#[tokio::test]
async fn malformed_callback_is_rejected() {
	let source = TestingFacade::new("http://127.0.0.1:9/", Duration::from_secs(1)).unwrap();
	let client = InteractiveOracleClient::new(Arc::new(source), Some(Duration::from_secs(1)), "http://127.0.0.1:9/");
	let addr = serve(callback_router(client.sink())).await;

	let r = reqwest::Client::new()
		.post(format!("http://{addr}/x-nmos/testanswer/v1.0"))
		.json(&json!({ "answer_response": "answer_0" }))
		.send()
		.await
		.unwrap();
	assert_eq!(r.status(), 400);
	assert_eq!(r.text().await.unwrap(), "Invalid JSON received");
}
