use crate::error::Result;
use crate::paging::{HttpResponse, PagedQuery, PagedResponse};
use async_trait::async_trait;
use nmos_core::{RegistrationRequest, ResourceType};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// The IS-04 Registration API as seen by the test harness.
#[async_trait]
pub trait RegistrationApi: Send + Sync {
	/// Base URL, ending in `/`.
	fn registration_url(&self) -> &str;

	async fn post_resource(&self, body: &RegistrationRequest) -> Result<HttpResponse>;

	async fn delete_resource(&self, resource_type: ResourceType, id: Uuid) -> Result<HttpResponse>;

	async fn heartbeat(&self, node_id: Uuid) -> Result<HttpResponse>;
}

/// The IS-04 Query API as seen by the test harness.
#[async_trait]
pub trait QueryApi: Send + Sync {
	/// Base URL, ending in `/`.
	fn query_url(&self) -> &str;

	/// GET a path relative to the base URL; the query string is sent as is.
	async fn get(&self, path: &str) -> Result<HttpResponse>;

	async fn paged_request(&self, query: &PagedQuery) -> PagedResponse {
		let response = self.get(&query.path()).await.map_err(|e| e.to_string());
		PagedResponse { query: query.clone(), response }
	}
}

fn with_trailing_slash(url: &str) -> String {
	if url.ends_with('/') { url.to_string() } else { format!("{url}/") }
}

/// Registration and Query API client over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
	http: reqwest::Client,
	registration_url: String,
	query_url: String,
}

impl HttpRegistryClient {
	pub fn new(registration_url: &str, query_url: &str, timeout: Duration) -> Result<Self> {
		let http = reqwest::Client::builder().timeout(timeout).build()?;
		Ok(Self { http, registration_url: with_trailing_slash(registration_url), query_url: with_trailing_slash(query_url) })
	}
}

#[async_trait]
impl RegistrationApi for HttpRegistryClient {
	fn registration_url(&self) -> &str { &self.registration_url }

	async fn post_resource(&self, body: &RegistrationRequest) -> Result<HttpResponse> {
		let url = format!("{}resource", self.registration_url);
		debug!(%url, resource_type = %body.resource_type, "POST");
		let r = self.http.post(url).json(body).send().await?;
		Ok(HttpResponse::from_reqwest(r).await?)
	}

	async fn delete_resource(&self, resource_type: ResourceType, id: Uuid) -> Result<HttpResponse> {
		let url = format!("{}resource/{}/{id}", self.registration_url, resource_type.plural());
		debug!(%url, "DELETE");
		let r = self.http.delete(url).send().await?;
		Ok(HttpResponse::from_reqwest(r).await?)
	}

	async fn heartbeat(&self, node_id: Uuid) -> Result<HttpResponse> {
		let url = format!("{}health/nodes/{node_id}", self.registration_url);
		let r = self.http.post(url).send().await?;
		Ok(HttpResponse::from_reqwest(r).await?)
	}
}

#[async_trait]
impl QueryApi for HttpRegistryClient {
	fn query_url(&self) -> &str { &self.query_url }

	async fn get(&self, path: &str) -> Result<HttpResponse> {
		let url = format!("{}{path}", self.query_url);
		debug!(%url, "GET");
		let r = self.http.get(url).send().await?;
		Ok(HttpResponse::from_reqwest(r).await?)
	}
}
