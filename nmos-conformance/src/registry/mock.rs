//! In-process mock Registry
//!
//! Serves the Registration and Query APIs over HTTP so that a Node under
//! test can register into it, and so that the paging oracle can be exercised
//! against a registry with known behaviour.
//!
//! ## Endpoints
//! - POST   /x-nmos/registration/{version}/resource
//! - DELETE /x-nmos/registration/{version}/resource/{resources}/{id}
//! - POST   /x-nmos/registration/{version}/health/nodes/{id}
//! - GET    /x-nmos/query/{version}/{resources}
//! - GET    /x-nmos/query/{version}/{resources}/{id}
//!
//! Every request is appended to a [`RequestHistory`] which tests read back
//! to check registration order and heartbeat timing.

use crate::error::Result;
use axum::{
	extract::{Path, RawQuery, State},
	http::{header, HeaderMap, HeaderValue, StatusCode},
	response::{IntoResponse, Json, Response},
	routing::{delete, get, post},
	Router,
};
use nmos_core::types::{DEFAULT_PAGING_LIMIT, MAX_PAGING_LIMIT};
use nmos_core::{ApiVersion, RegistrationRequest, ResourceType, Version};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
	pub at: Version,
	pub resource_type: ResourceType,
	pub id: Uuid,
	pub data: Value,
	pub created: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRecord {
	pub at: Version,
	pub resource_type: ResourceType,
	pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatRecord {
	pub at: Version,
	pub node_id: Uuid,
}

/// Append-only log of the requests the registry accepted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestHistory {
	pub posts: Vec<PostRecord>,
	pub deletes: Vec<DeleteRecord>,
	pub heartbeats: Vec<HeartbeatRecord>,
}

impl RequestHistory {
	pub fn posts_of(&self, resource_type: ResourceType) -> impl Iterator<Item = &PostRecord> {
		self.posts.iter().filter(move |p| p.resource_type == resource_type)
	}
}

#[derive(Debug, Clone)]
struct Entry {
	data: Value,
	updated: Version,
}

#[derive(Debug)]
struct Inner {
	resources: BTreeMap<(ResourceType, Uuid), Entry>,
	last_update: Version,
	enabled: bool,
	paging_supported: bool,
	history: RequestHistory,
}

/// Registry state shared by the HTTP handlers and the test code.
#[derive(Debug)]
pub struct MockRegistry {
	inner: Mutex<Inner>,
	changed: Notify,
	protocol: String,
	api_version: ApiVersion,
}

/// NMOS style error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
	pub code: u16,
	pub error: String,
	pub debug: Option<String>,
}

impl ErrorResponse {
	fn new(code: StatusCode, error: impl Into<String>) -> Self { Self { code: code.as_u16(), error: error.into(), debug: None } }
}

impl IntoResponse for ErrorResponse {
	fn into_response(self) -> Response {
		let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self)).into_response()
	}
}

impl MockRegistry {
	pub fn new(protocol: impl Into<String>, api_version: ApiVersion) -> Arc<Self> {
		Arc::new(Self {
			inner: Mutex::new(Inner {
				resources: BTreeMap::new(),
				last_update: Version::EPOCH,
				enabled: true,
				paging_supported: true,
				history: RequestHistory::default(),
			}),
			changed: Notify::new(),
			protocol: protocol.into(),
			api_version,
		})
	}

	pub fn api_version(&self) -> ApiVersion { self.api_version }

	pub fn enable(&self) { self.inner.lock().enabled = true; }

	pub fn disable(&self) { self.inner.lock().enabled = false; }

	pub fn is_enabled(&self) -> bool { self.inner.lock().enabled }

	/// When off, paged queries get 501 and plain queries carry no paging headers.
	pub fn set_paging_supported(&self, supported: bool) { self.inner.lock().paging_supported = supported; }

	/// Snapshot of the request log so far.
	pub fn history(&self) -> RequestHistory { self.inner.lock().history.clone() }

	pub fn resource(&self, resource_type: ResourceType, id: Uuid) -> Option<Value> {
		self.inner.lock().resources.get(&(resource_type, id)).map(|e| e.data.clone())
	}

	/// Wait until `done` holds for the history, or `timeout` elapses.
	pub async fn wait_until<F>(&self, timeout: Duration, mut done: F) -> bool
	where
		F: FnMut(&RequestHistory) -> bool,
	{
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			let notified = self.changed.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();
			if done(&self.inner.lock().history) {
				return true;
			}
			if tokio::time::timeout_at(deadline, notified).await.is_err() {
				return done(&self.inner.lock().history);
			}
		}
	}

	/// Wait for at least one registration of `resource_type`.
	pub async fn wait_for_post(&self, resource_type: ResourceType, timeout: Duration) -> bool {
		self.wait_until(timeout, |h| h.posts_of(resource_type).next().is_some()).await
	}

	/// Record a registration, returning whether it was new and its update timestamp.
	fn store(&self, request: RegistrationRequest, id: Uuid) -> (bool, Version) {
		let mut inner = self.inner.lock();
		let now = Version::now_tai(0.0);
		let updated = if now > inner.last_update { now } else { inner.last_update.successor() };
		inner.last_update = updated;
		let key = (request.resource_type, id);
		let created = inner.resources.insert(key, Entry { data: request.data.clone(), updated }).is_none();
		inner.history.posts.push(PostRecord { at: updated, resource_type: request.resource_type, id, data: request.data, created });
		drop(inner);
		self.changed.notify_waiters();
		(created, updated)
	}

	fn remove(&self, resource_type: ResourceType, id: Uuid) -> bool {
		let mut inner = self.inner.lock();
		let removed = inner.resources.remove(&(resource_type, id)).is_some();
		if removed {
			inner.history.deletes.push(DeleteRecord { at: Version::now_tai(0.0), resource_type, id });
		}
		drop(inner);
		self.changed.notify_waiters();
		removed
	}

	fn beat(&self, node_id: Uuid) -> bool {
		let mut inner = self.inner.lock();
		if !inner.resources.contains_key(&(ResourceType::Node, node_id)) {
			return false;
		}
		inner.history.heartbeats.push(HeartbeatRecord { at: Version::now_tai(0.0), node_id });
		drop(inner);
		self.changed.notify_waiters();
		true
	}

	pub fn router(self: Arc<Self>) -> Router {
		Router::new()
			.route("/x-nmos/registration/{version}/", get(registration_root))
			.route("/x-nmos/registration/{version}/resource", post(register))
			.route("/x-nmos/registration/{version}/resource/{resources}/{id}", delete(unregister))
			.route("/x-nmos/registration/{version}/health/nodes/{id}", post(heartbeat))
			.route("/x-nmos/query/{version}/", get(query_root))
			.route("/x-nmos/query/{version}/{resources}", get(list_resources))
			.route("/x-nmos/query/{version}/{resources}/{id}", get(get_resource))
			.with_state(self)
	}

	/// Serve on `addr` until the returned handle is dropped.
	pub async fn spawn(self: &Arc<Self>, addr: SocketAddr) -> Result<MockRegistryServer> {
		let listener = tokio::net::TcpListener::bind(addr).await?;
		let addr = listener.local_addr()?;
		let app = self.clone().router();
		info!(%addr, "mock registry listening");
		let task = tokio::spawn(async move {
			if let Err(e) = axum::serve(listener, app).await {
				warn!(error = %e, "mock registry stopped");
			}
		});
		Ok(MockRegistryServer { addr, api_version: self.api_version, task })
	}
}

/// A running mock registry. It serves plain HTTP whatever protocol its
/// `Link` headers advertise.
#[derive(Debug)]
pub struct MockRegistryServer {
	pub addr: SocketAddr,
	api_version: ApiVersion,
	task: JoinHandle<()>,
}

impl MockRegistryServer {
	pub fn base_url(&self) -> String { format!("http://{}/", self.addr) }

	pub fn registration_url(&self) -> String { format!("{}x-nmos/registration/{}/", self.base_url(), self.api_version) }

	pub fn query_url(&self) -> String { format!("{}x-nmos/query/{}/", self.base_url(), self.api_version) }
}

impl Drop for MockRegistryServer {
	fn drop(&mut self) { self.task.abort(); }
}

async fn registration_root(State(reg): State<Arc<MockRegistry>>) -> Response {
	if !reg.is_enabled() {
		return StatusCode::SERVICE_UNAVAILABLE.into_response();
	}
	Json(json!(["resource/", "health/"])).into_response()
}

async fn query_root(State(reg): State<Arc<MockRegistry>>) -> Response {
	if !reg.is_enabled() {
		return StatusCode::SERVICE_UNAVAILABLE.into_response();
	}
	let listing: Vec<String> = ResourceType::ALL.iter().map(|t| format!("{}/", t.plural())).collect();
	Json(listing).into_response()
}

/// POST /resource - create (201) or update (200) a registration
async fn register(
	State(reg): State<Arc<MockRegistry>>,
	Path(version): Path<String>,
	Json(body): Json<Value>,
) -> Result<Response, ErrorResponse> {
	if !reg.is_enabled() {
		return Err(ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "registry disabled"));
	}
	let request: RegistrationRequest =
		serde_json::from_value(body).map_err(|e| ErrorResponse::new(StatusCode::BAD_REQUEST, e.to_string()))?;
	let resource = request
		.clone()
		.into_resource()
		.map_err(|e| ErrorResponse::new(StatusCode::BAD_REQUEST, e.to_string()))?;
	let resource_type = request.resource_type;
	let id = resource.id();
	let data = request.data.clone();
	let (created, updated) = reg.store(request, id);
	info!(%resource_type, %id, created, "POST /resource");

	let location = format!("/x-nmos/registration/{version}/resource/{}/{id}", resource_type.plural());
	let mut headers = HeaderMap::new();
	if let Ok(v) = HeaderValue::from_str(&location) {
		headers.insert(header::LOCATION, v);
	}
	if let Ok(v) = HeaderValue::from_str(&updated.to_string()) {
		headers.insert("x-paging-timestamp", v);
	}
	let status = if created { StatusCode::CREATED } else { StatusCode::OK };
	Ok((status, headers, Json(data)).into_response())
}

/// DELETE /resource/{resources}/{id}
async fn unregister(
	State(reg): State<Arc<MockRegistry>>,
	Path((_version, resources, id)): Path<(String, String, Uuid)>,
) -> Result<StatusCode, ErrorResponse> {
	if !reg.is_enabled() {
		return Err(ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "registry disabled"));
	}
	let resource_type = ResourceType::from_plural(&resources)
		.ok_or_else(|| ErrorResponse::new(StatusCode::NOT_FOUND, format!("unknown resource type {resources}")))?;
	info!(%resource_type, %id, "DELETE /resource");
	if reg.remove(resource_type, id) {
		Ok(StatusCode::NO_CONTENT)
	} else {
		Err(ErrorResponse::new(StatusCode::NOT_FOUND, format!("{resource_type} {id} is not registered")))
	}
}

/// POST /health/nodes/{id}
async fn heartbeat(
	State(reg): State<Arc<MockRegistry>>,
	Path((_version, id)): Path<(String, Uuid)>,
) -> Result<Json<Value>, ErrorResponse> {
	if !reg.is_enabled() {
		return Err(ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "registry disabled"));
	}
	if !reg.beat(id) {
		return Err(ErrorResponse::new(StatusCode::NOT_FOUND, format!("node {id} is not registered")));
	}
	debug!(%id, "heartbeat");
	Ok(Json(json!({ "health": Version::now_tai(0.0).seconds() })))
}

async fn get_resource(
	State(reg): State<Arc<MockRegistry>>,
	Path((_version, resources, id)): Path<(String, String, Uuid)>,
) -> Result<Json<Value>, ErrorResponse> {
	ResourceType::from_plural(&resources)
		.and_then(|t| reg.resource(t, id))
		.map(Json)
		.ok_or_else(|| ErrorResponse::new(StatusCode::NOT_FOUND, format!("{resources}/{id} not found")))
}

/// Paging and filter parameters of a Query API request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueryParams {
	pub limit: u32,
	pub since: Option<Version>,
	pub until: Option<Version>,
	pub explicit_paging: bool,
	/// Decoded basic filters.
	pub filters: Vec<(String, String)>,
	/// Non-paging parameters exactly as received, for echoing in `Link`.
	pub raw_filters: Vec<String>,
}

pub(crate) fn parse_query(raw: Option<&str>) -> std::result::Result<QueryParams, String> {
	let mut params = QueryParams {
		limit: DEFAULT_PAGING_LIMIT,
		since: None,
		until: None,
		explicit_paging: false,
		filters: Vec::new(),
		raw_filters: Vec::new(),
	};
	for pair in raw.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
		let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
		match key {
			"paging.limit" => {
				let limit: u32 = value.parse().map_err(|_| format!("invalid paging.limit: {value:?}"))?;
				params.limit = limit.min(MAX_PAGING_LIMIT);
				params.explicit_paging = true;
			}
			"paging.since" => {
				params.since = Some(value.parse().map_err(|_| format!("invalid paging.since: {value:?}"))?);
				params.explicit_paging = true;
			}
			"paging.until" => {
				params.until = Some(value.parse().map_err(|_| format!("invalid paging.until: {value:?}"))?);
				params.explicit_paging = true;
			}
			k if k.starts_with("paging.") => return Err(format!("unknown paging parameter: {k}")),
			_ => {
				let decoded = urlencoding::decode(value).map_err(|e| e.to_string())?.into_owned();
				params.filters.push((key.to_string(), decoded));
				params.raw_filters.push(pair.to_string());
			}
		}
	}
	Ok(params)
}

/// The slice of a filtered, oldest-first timeline returned for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Page {
	/// Indices into the timeline, oldest first.
	pub indices: Vec<usize>,
	pub since: Version,
	pub until: Version,
}

/// Select a page from `updated` (ascending) for the window `(since, until]`.
///
/// With `since` given the oldest matches are returned, otherwise the newest.
/// The reported bounds always enclose exactly the returned items so that the
/// `prev`/`next` cursors continue without gaps or overlap.
pub(crate) fn select_page(
	updated: &[Version],
	limit: u32,
	since: Option<Version>,
	until: Option<Version>,
	now: Version,
) -> std::result::Result<Page, String> {
	let lo = since.unwrap_or(Version::EPOCH);
	let hi = until.unwrap_or_else(|| now.max(lo));
	if lo > hi {
		return Err(format!("paging.since {lo} is after paging.until {hi}"));
	}
	let window: Vec<usize> = (0..updated.len()).filter(|&i| lo < updated[i] && updated[i] <= hi).collect();
	let limit = limit as usize;
	if since.is_some() {
		let taken: Vec<usize> = window.iter().copied().take(limit).collect();
		let until = if limit == 0 || window.len() > taken.len() { taken.last().map_or(lo, |&i| updated[i]) } else { hi };
		Ok(Page { indices: taken, since: lo, until })
	} else {
		let start = window.len().saturating_sub(limit);
		// a zero limit collapses the window onto `until`
		let since = if limit == 0 {
			hi
		} else if start > 0 {
			updated[window[start - 1]]
		} else {
			lo
		};
		Ok(Page { indices: window[start..].to_vec(), since, until: hi })
	}
}

fn link_header(base: &str, page: &Page, limit: u32, raw_filters: &[String]) -> String {
	let extra: String = raw_filters.iter().map(|p| format!("&{p}")).collect();
	let link = |query: String, rel: &str| format!("<{base}?{query}&paging.limit={limit}{extra}>; rel=\"{rel}\"");
	[
		link("paging.since=0:0".into(), "first"),
		link(format!("paging.until={}", page.since), "prev"),
		link(format!("paging.since={}", page.until), "next"),
		format!("<{base}?paging.limit={limit}{extra}>; rel=\"last\""),
	]
	.join(", ")
}

/// GET /{resources} - filtered, paged listing, newest first
async fn list_resources(
	State(reg): State<Arc<MockRegistry>>,
	Path((version, resources)): Path<(String, String)>,
	RawQuery(raw): RawQuery,
	request_headers: HeaderMap,
) -> Result<Response, ErrorResponse> {
	let resource_type = ResourceType::from_plural(&resources)
		.ok_or_else(|| ErrorResponse::new(StatusCode::NOT_FOUND, format!("unknown resource type {resources}")))?;
	let params = parse_query(raw.as_deref()).map_err(|e| ErrorResponse::new(StatusCode::BAD_REQUEST, e))?;
	debug!(%resource_type, query = ?raw, "GET query");

	let (matching, paging_supported) = {
		let inner = reg.inner.lock();
		let mut matching: Vec<(Version, Value)> = inner
			.resources
			.iter()
			.filter(|((t, _), _)| *t == resource_type)
			.filter(|(_, e)| {
				params.filters.iter().all(|(k, v)| e.data.get(k).and_then(Value::as_str) == Some(v.as_str()))
			})
			.map(|(_, e)| (e.updated, e.data.clone()))
			.collect();
		matching.sort_by_key(|(u, _)| *u);
		(matching, inner.paging_supported)
	};

	if !paging_supported {
		if params.explicit_paging {
			return Err(ErrorResponse::new(StatusCode::NOT_IMPLEMENTED, "paging is not supported"));
		}
		let body: Vec<Value> = matching.into_iter().rev().map(|(_, d)| d).collect();
		return Ok(Json(body).into_response());
	}

	let updated: Vec<Version> = matching.iter().map(|(u, _)| *u).collect();
	let page = select_page(&updated, params.limit, params.since, params.until, Version::now_tai(0.0))
		.map_err(|e| ErrorResponse::new(StatusCode::BAD_REQUEST, e))?;
	let body: Vec<Value> = page.indices.iter().rev().map(|&i| matching[i].1.clone()).collect();

	let host = request_headers.get(header::HOST).and_then(|h| h.to_str().ok()).unwrap_or("localhost");
	let base = format!("{}://{host}/x-nmos/query/{version}/{resources}", reg.protocol);
	let mut headers = HeaderMap::new();
	for (name, value) in [
		("link", link_header(&base, &page, params.limit, &params.raw_filters)),
		("x-paging-limit", params.limit.to_string()),
		("x-paging-since", page.since.to_string()),
		("x-paging-until", page.until.to_string()),
	] {
		if let Ok(v) = HeaderValue::from_str(&value) {
			headers.insert(name, v);
		}
	}
	Ok((StatusCode::OK, headers, Json(body)).into_response())
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::Request;
	use http_body_util::BodyExt;
	use tower::ServiceExt;

	fn v(s: u64) -> Version { Version::new(s, 0).unwrap() }

	fn timeline() -> Vec<Version> { (1..=20).map(v).collect() }

	#[test]
	fn newest_page_by_default() {
		let page = select_page(&timeline(), 10, None, None, v(100)).unwrap();
		assert_eq!(page.indices, (10..20).collect::<Vec<_>>());
		assert_eq!(page.since, v(10));
		assert_eq!(page.until, v(100));
	}

	#[test]
	fn oldest_page_after_since() {
		let page = select_page(&timeline(), 10, Some(v(4)), None, v(100)).unwrap();
		assert_eq!(page.indices, (4..14).collect::<Vec<_>>());
		assert_eq!(page.since, v(4));
		assert_eq!(page.until, v(14));
	}

	#[test]
	fn until_only_takes_newest_in_window() {
		let page = select_page(&timeline(), 10, None, Some(v(16)), v(100)).unwrap();
		assert_eq!(page.indices, (6..16).collect::<Vec<_>>());
		assert_eq!(page.since, v(6));
		assert_eq!(page.until, v(16));
	}

	#[test]
	fn zero_limit_collapses_window() {
		let page = select_page(&timeline(), 0, Some(v(12)), None, v(100)).unwrap();
		assert_eq!((page.since, page.until), (v(12), v(12)));
		let page = select_page(&timeline(), 0, None, Some(v(12)), v(100)).unwrap();
		assert_eq!((page.since, page.until), (v(12), v(12)));
		assert!(page.indices.is_empty());
	}

	#[test]
	fn zero_limit_between_items_collapses_onto_until() {
		let until = Version::new(12, 500_000_000).unwrap();
		let page = select_page(&timeline(), 0, None, Some(until), v(100)).unwrap();
		assert_eq!((page.since, page.until), (until, until));
		assert!(page.indices.is_empty());

		// likewise onto `since`, whether or not items follow it
		let page = select_page(&timeline(), 0, Some(v(30)), None, v(100)).unwrap();
		assert_eq!((page.since, page.until), (v(30), v(30)));
		let page = select_page(&timeline(), 0, Some(v(5)), None, v(100)).unwrap();
		assert_eq!((page.since, page.until), (v(5), v(5)));

		// with no `until` the window collapses onto now
		let page = select_page(&timeline(), 0, None, None, v(100)).unwrap();
		assert_eq!((page.since, page.until), (v(100), v(100)));

		// an empty page under a non-zero limit still starts at the epoch
		let before_first = Version::new(0, 500_000_000).unwrap();
		let page = select_page(&timeline(), 10, None, Some(before_first), v(100)).unwrap();
		assert_eq!((page.since, page.until), (Version::EPOCH, before_first));
	}

	#[test]
	fn since_after_until_rejected() {
		assert!(select_page(&timeline(), 10, Some(v(5)), Some(v(4)), v(100)).is_err());
	}

	#[test]
	fn query_parsing() {
		let p = parse_query(Some("paging.limit=500&label=foo%26bar&paging.since=1:2")).unwrap();
		assert_eq!(p.limit, MAX_PAGING_LIMIT);
		assert_eq!(p.since, Some(Version::new(1, 2).unwrap()));
		assert_eq!(p.filters, vec![("label".to_string(), "foo&bar".to_string())]);
		assert_eq!(p.raw_filters, vec!["label=foo%26bar".to_string()]);
		assert!(parse_query(Some("paging.since=yesterday")).is_err());
		assert!(!parse_query(None).unwrap().explicit_paging);
	}

	fn node(id: Uuid, label: &str) -> Value {
		json!({
			"type": "node",
			"data": {
				"id": id, "version": "1:0", "label": label, "description": "d", "tags": {},
				"href": "http://127.0.0.1/", "api": {"versions": ["v1.3"], "endpoints": []},
				"caps": {}, "services": [], "clocks": [], "interfaces": []
			}
		})
	}

	async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
		let resp = app.oneshot(req).await.unwrap();
		let status = resp.status();
		let headers = resp.headers().clone();
		let bytes = resp.into_body().collect().await.unwrap().to_bytes();
		let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
		(status, headers, body)
	}

	fn post(body: &Value) -> Request<Body> {
		Request::builder()
			.method("POST")
			.uri("/x-nmos/registration/v1.3/resource")
			.header("content-type", "application/json")
			.body(Body::from(body.to_string()))
			.unwrap()
	}

	#[tokio::test]
	async fn create_then_update() {
		let reg = MockRegistry::new("http", ApiVersion::V1_3);
		let id = Uuid::new_v4();
		let (status, headers, _) = send(reg.clone().router(), post(&node(id, "a"))).await;
		assert_eq!(status, StatusCode::CREATED);
		let location = headers.get("location").unwrap().to_str().unwrap();
		assert_eq!(location, format!("/x-nmos/registration/v1.3/resource/nodes/{id}"));
		assert!(headers.contains_key("x-paging-timestamp"));
		let (status, _, _) = send(reg.clone().router(), post(&node(id, "b"))).await;
		assert_eq!(status, StatusCode::OK);
		let h = reg.history();
		assert_eq!(h.posts.len(), 2);
		assert!(h.posts[0].at < h.posts[1].at);
	}

	#[tokio::test]
	async fn missing_label_is_bad_request() {
		let reg = MockRegistry::new("http", ApiVersion::V1_3);
		let mut body = node(Uuid::new_v4(), "a");
		body["data"].as_object_mut().unwrap().remove("label");
		let (status, _, err) = send(reg.router(), post(&body)).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(err["code"], 400);
	}

	#[tokio::test]
	async fn delete_and_heartbeat_unknown() {
		let reg = MockRegistry::new("http", ApiVersion::V1_3);
		let id = Uuid::new_v4();
		let del = |id: Uuid| {
			Request::builder()
				.method("DELETE")
				.uri(format!("/x-nmos/registration/v1.3/resource/nodes/{id}"))
				.body(Body::empty())
				.unwrap()
		};
		let (status, _, _) = send(reg.clone().router(), del(id)).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let hb = Request::builder()
			.method("POST")
			.uri(format!("/x-nmos/registration/v1.3/health/nodes/{id}"))
			.body(Body::empty())
			.unwrap();
		let (status, _, _) = send(reg.clone().router(), hb).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		send(reg.clone().router(), post(&node(id, "a"))).await;
		let (status, _, _) = send(reg.clone().router(), del(id)).await;
		assert_eq!(status, StatusCode::NO_CONTENT);
		assert_eq!(reg.history().deletes.len(), 1);
	}

	#[tokio::test]
	async fn disabled_registry_errors() {
		let reg = MockRegistry::new("http", ApiVersion::V1_3);
		reg.disable();
		let (status, _, _) = send(reg.clone().router(), post(&node(Uuid::new_v4(), "a"))).await;
		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
		let root = Request::builder().uri("/x-nmos/query/v1.3/").body(Body::empty()).unwrap();
		let (status, _, _) = send(reg.router(), root).await;
		assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	}

	#[tokio::test]
	async fn paged_listing_headers() {
		let reg = MockRegistry::new("http", ApiVersion::V1_3);
		for i in 0..3 {
			send(reg.clone().router(), post(&node(Uuid::new_v4(), &format!("n{i}")))).await;
		}
		let req = Request::builder()
			.uri("/x-nmos/query/v1.3/nodes?paging.limit=2&description=d")
			.header("host", "registry.local:80")
			.body(Body::empty())
			.unwrap();
		let (status, headers, body) = send(reg.clone().router(), req).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body.as_array().unwrap().len(), 2);
		assert_eq!(body[0]["label"], "n2");
		assert_eq!(headers.get("x-paging-limit").unwrap(), "2");
		let link = headers.get("link").unwrap().to_str().unwrap();
		assert!(link.contains("<http://registry.local:80/x-nmos/query/v1.3/nodes?paging.since=0:0&paging.limit=2&description=d>; rel=\"first\""));

		reg.set_paging_supported(false);
		let req = Request::builder().uri("/x-nmos/query/v1.3/nodes?paging.limit=2").body(Body::empty()).unwrap();
		let (status, _, _) = send(reg.router(), req).await;
		assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
	}

	#[tokio::test]
	async fn wait_for_post_wakes() {
		let reg = MockRegistry::new("http", ApiVersion::V1_3);
		let waiter = {
			let reg = reg.clone();
			tokio::spawn(async move { reg.wait_for_post(ResourceType::Node, Duration::from_secs(5)).await })
		};
		tokio::time::sleep(Duration::from_millis(20)).await;
		send(reg.clone().router(), post(&node(Uuid::new_v4(), "a"))).await;
		assert!(waiter.await.unwrap());
		assert!(!reg.wait_until(Duration::from_millis(10), |h| !h.deletes.is_empty()).await);
	}
}
