//! Verification of cursor-based Query API pagination.
//!
//! [`PagingOracle`] is stateless with respect to the registry: it is handed a
//! response together with the window the tester expects and either returns
//! `Ok(())` or aborts the test with a FAIL or OPTIONAL verdict.

use crate::result::{Outcome, Test, TestAbort, TestResult};
use crate::timestamp_spec::VersionSpec;
use nmos_core::{ApiVersion, ResourceType, Version};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const PAGING_WIKI_URL: &str = "https://github.com/AMWA-TV/nmos/wiki/IS-04#registries-pagination";

pub const HEADER_LINK: &str = "link";
pub const HEADER_LIMIT: &str = "x-paging-limit";
pub const HEADER_SINCE: &str = "x-paging-since";
pub const HEADER_UNTIL: &str = "x-paging-until";
pub const HEADER_TIMESTAMP: &str = "x-paging-timestamp";

const PAGING_HEADERS: [&str; 4] = [HEADER_LINK, HEADER_LIMIT, HEADER_SINCE, HEADER_UNTIL];

/// A Query API request with optional paging and basic filter parameters.
///
/// Filter values are sent as given, so a pre-encoded value such as
/// `foo%26bar` reaches the registry unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedQuery {
	pub resource_type: ResourceType,
	pub limit: Option<u32>,
	pub since: Option<Version>,
	pub until: Option<Version>,
	pub description: Option<String>,
	pub label: Option<String>,
	pub id: Option<String>,
}

impl PagedQuery {
	pub fn new(resource_type: ResourceType) -> Self {
		Self { resource_type, limit: None, since: None, until: None, description: None, label: None, id: None }
	}

	pub fn nodes() -> Self { Self::new(ResourceType::Node) }

	pub fn limit(mut self, limit: u32) -> Self {
		self.limit = Some(limit);
		self
	}

	/// Use the upper bound of `ts` as `paging.since`.
	pub fn since(mut self, ts: &VersionSpec) -> Self {
		self.since = ts.cursor();
		self
	}

	/// Use the upper bound of `ts` as `paging.until`.
	pub fn until(mut self, ts: &VersionSpec) -> Self {
		self.until = ts.cursor();
		self
	}

	pub fn description(mut self, d: impl Into<String>) -> Self {
		self.description = Some(d.into());
		self
	}

	pub fn label(mut self, l: impl Into<String>) -> Self {
		self.label = Some(l.into());
		self
	}

	pub fn id(mut self, id: impl ToString) -> Self {
		self.id = Some(id.to_string());
		self
	}

	/// `key=value` pairs in request order.
	pub fn parameters(&self) -> Vec<String> {
		let mut params = Vec::new();
		if let Some(l) = self.limit {
			params.push(format!("paging.limit={l}"));
		}
		if let Some(s) = self.since {
			params.push(format!("paging.since={s}"));
		}
		if let Some(u) = self.until {
			params.push(format!("paging.until={u}"));
		}
		if let Some(d) = &self.description {
			params.push(format!("description={d}"));
		}
		if let Some(l) = &self.label {
			params.push(format!("label={l}"));
		}
		if let Some(i) = &self.id {
			params.push(format!("id={i}"));
		}
		params
	}

	pub fn query_string(&self) -> String {
		let params = self.parameters();
		if params.is_empty() { String::new() } else { format!("?{}", params.join("&")) }
	}

	/// Whether the client opted in to paging explicitly.
	pub fn explicit_paging(&self) -> bool { self.limit.is_some() || self.since.is_some() || self.until.is_some() }

	/// Path relative to the Query API base, e.g. `nodes?paging.limit=10`.
	pub fn path(&self) -> String { format!("{}{}", self.resource_type.plural(), self.query_string()) }
}

/// Status, lower-cased headers and raw body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpResponse {
	pub status: u16,
	pub headers: BTreeMap<String, String>,
	pub body: String,
}

impl HttpResponse {
	pub fn header(&self, name: &str) -> Option<&str> { self.headers.get(&name.to_ascii_lowercase()).map(String::as_str) }

	pub fn json(&self) -> serde_json::Result<Value> { serde_json::from_str(&self.body) }

	pub async fn from_reqwest(r: reqwest::Response) -> reqwest::Result<Self> {
		let status = r.status().as_u16();
		let headers = r
			.headers()
			.iter()
			.filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_ascii_lowercase(), v.to_string())))
			.collect();
		let body = r.text().await?;
		Ok(Self { status, headers, body })
	}
}

/// A paged request together with what came back. `Err` means the request
/// never produced an HTTP response.
#[derive(Debug, Clone)]
pub struct PagedResponse {
	pub query: PagedQuery,
	pub response: Result<HttpResponse, String>,
}

/// What the tester expects a paged response to contain. `None` fields are
/// not checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagingExpectation {
	/// Expected resources, oldest first.
	pub ids: Option<Vec<Uuid>>,
	pub since: Option<VersionSpec>,
	pub until: Option<VersionSpec>,
	pub limit: Option<u32>,
}

impl PagingExpectation {
	/// Only header presence and Link structure are checked.
	pub fn headers_only() -> Self { Self::default() }

	pub fn window(ids: Vec<Uuid>, since: Option<VersionSpec>, until: Option<VersionSpec>) -> Self {
		Self { ids: Some(ids), since, until, limit: None }
	}

	pub fn with_limit(mut self, limit: u32) -> Self {
		self.limit = Some(limit);
		self
	}
}

/// Split an RFC 5988 style `Link` header into `rel -> url`. Later
/// duplicates win; malformed entries are skipped.
pub fn parse_link_header(header: &str) -> BTreeMap<String, String> {
	header.split(',').filter_map(parse_link).collect()
}

// `<url>;[ \t]*rel="rel"` with greedy url and rel
fn parse_link(piece: &str) -> Option<(String, String)> {
	let start = piece.find('<')?;
	let rest = &piece[start + 1..];
	for (i, _) in rest.match_indices('>').rev() {
		if i == 0 {
			continue;
		}
		let Some(tail) = rest[i + 1..].strip_prefix(';') else { continue };
		let Some(tail) = tail.trim_start_matches([' ', '\t']).strip_prefix("rel=\"") else { continue };
		match tail.rfind('"') {
			Some(end) if end > 0 => return Some((tail[..end].to_string(), rest[..i].to_string())),
			_ => continue,
		}
	}
	None
}

/// Checks paged Query API responses for one API version and protocol.
#[derive(Debug, Clone)]
pub struct PagingOracle {
	protocol: String,
	api_version: ApiVersion,
}

impl PagingOracle {
	pub fn new(protocol: impl Into<String>, api_version: ApiVersion) -> Self {
		Self { protocol: protocol.into(), api_version }
	}

	pub fn protocol(&self) -> &str { &self.protocol }

	pub fn api_version(&self) -> ApiVersion { self.api_version }

	/// The `paged` trait only exists in v1.x from v1.1.
	pub fn check_paged_trait(&self, test: &Test) -> Outcome<()> {
		if self.api_version < ApiVersion::V1_1 {
			return Err(TestAbort(test.na("This test does not apply to v1.0")));
		}
		if self.api_version >= ApiVersion::V2_0 {
			return Err(TestAbort(test.fail("Version > 1 not supported yet.")));
		}
		Ok(())
	}

	pub fn verify_paged_response(&self, test: &Test, paged: &PagedResponse, expected: &PagingExpectation) -> Outcome<()> {
		let query_string = paged.query.query_string();
		let fail = |msg: String| TestAbort(test.fail(msg));

		let response = match &paged.response {
			Err(e) => return Err(fail(format!("Query API did not respond as expected, for query: {query_string} ({e})"))),
			Ok(r) => r,
		};
		if response.status == 501 {
			return Err(TestAbort(test.optional_with_link(
				format!(
					"Query API signalled that it does not support this query: {query_string}. Query APIs should support pagination for scalability."
				),
				PAGING_WIKI_URL,
			)));
		}
		if response.status != 200 {
			return Err(fail(format!("Query API returned an unexpected response: {} {}", response.status, response.body)));
		}

		self.check_header_presence(test, paged, response)?;
		if let Some(ids) = &expected.ids {
			check_body(test, &query_string, response, ids)?;
		}
		self.check_header_values(test, &paged.query, response, expected)
	}

	fn check_header_presence(&self, test: &Test, paged: &PagedResponse, response: &HttpResponse) -> Outcome<()> {
		let absent: Vec<&str> = PAGING_HEADERS.iter().copied().filter(|h| response.header(h).is_none()).collect();
		if absent.len() == PAGING_HEADERS.len() {
			if paged.query.explicit_paging() && self.api_version >= ApiVersion::V1_3 {
				return Err(TestAbort(test.fail(
					"Query API response did not include any pagination headers. Query APIs must return 501 if they do not support pagination. Query APIs should support pagination for scalability.",
				)));
			}
			return Err(TestAbort(test.optional_with_link(
				"Query API response did not include any pagination headers. Query APIs should support pagination for scalability.",
				PAGING_WIKI_URL,
			)));
		}
		if !absent.is_empty() {
			return Err(TestAbort(test.fail(format!("Query API response did not include all pagination headers, missing: {absent:?}"))));
		}
		Ok(())
	}

	fn check_header_values(&self, test: &Test, query: &PagedQuery, response: &HttpResponse, expected: &PagingExpectation) -> Outcome<()> {
		let query_string = query.query_string();
		let fail = |msg: String| TestAbort(test.fail(msg));
		let header = |name: &str| {
			response
				.header(name)
				.ok_or_else(|| fail(format!("Query API response did not include the expected value in the Link header: {name}")))
		};

		let since = header(HEADER_SINCE)?;
		let until = header(HEADER_UNTIL)?;
		let limit = header(HEADER_LIMIT)?;

		// an absent expectation matches anything, parseable or not
		let check = |name: &str, actual: &str, expected: Option<&VersionSpec>| -> Outcome<()> {
			let Some(spec) = expected else { return Ok(()) };
			let version: Version = actual
				.parse()
				.map_err(|_| fail(format!("Query API response header {name} '{actual}' is not a valid version, for query: {query_string}")))?;
			if !spec.contains(&version) {
				return Err(fail(out_of_range(name, actual, Some(spec), &query_string)));
			}
			Ok(())
		};
		check("X-Paging-Since", since, expected.since.as_ref())?;
		check("X-Paging-Until", until, expected.until.as_ref())?;
		if let Some(l) = expected.limit {
			if l.to_string() != limit {
				return Err(fail(format!("Query API response did not include the correct X-Paging-Limit header, for query: {query_string}")));
			}
		}

		let links = parse_link_header(header(HEADER_LINK)?);
		let rel = |name: &str| {
			links
				.get(name)
				.map(String::as_str)
				.ok_or_else(|| fail(format!("Query API response did not include the expected value in the Link header: '{name}'")))
		};
		let wrong = |name: &str| fail(format!("Query API response did not include the correct '{name}' value in the Link header, for query: {query_string}"));

		let prev = rel("prev")?;
		if !prev.contains(&format!("paging.until={since}")) || prev.contains("paging.since=") {
			return Err(wrong("prev"));
		}
		let next = rel("next")?;
		if !next.contains(&format!("paging.since={until}")) || next.contains("paging.until=") {
			return Err(wrong("next"));
		}
		if let Some(first) = links.get("first") {
			if !first.contains("paging.since=0:0") || first.contains("paging.until=") {
				return Err(wrong("first"));
			}
		}
		if let Some(last) = links.get("last") {
			if last.contains("paging.until=") || last.contains("paging.since=") {
				return Err(wrong("last"));
			}
		}

		let scheme = format!("{}://", self.protocol);
		let params = query.parameters();
		for name in ["first", "prev", "next", "last"] {
			let Some(url) = links.get(name) else { continue };
			if !url.starts_with(&scheme) {
				return Err(fail(format!("Query API Link header is invalid for the current protocol. Expected '{scheme}'")));
			}
			if !url.contains(&format!("paging.limit={limit}")) {
				return Err(wrong(name));
			}
			if params.iter().filter(|p| !p.contains("paging.")).any(|p| !url.contains(p.as_str())) {
				return Err(wrong(name));
			}
		}
		Ok(())
	}

	/// `https` links should name a host, not an IP literal. Returns a
	/// WARNING verdict when one does.
	pub fn check_link_hosts(&self, test: &Test, response: &HttpResponse) -> Option<TestResult> {
		let links = parse_link_header(response.header(HEADER_LINK)?);
		["first", "prev", "next", "last"]
			.iter()
			.filter_map(|rel| links.get(*rel))
			.filter(|url| url.starts_with("https://"))
			.any(|url| url::Url::parse(url).map_or(false, |u| matches!(u.host(), Some(url::Host::Ipv4(_) | url::Host::Ipv6(_)))))
			.then(|| test.warning("Query API Link header has an IP address not a hostname"))
	}

	/// A request with `paging.since` after `paging.until` must be rejected
	/// with 400, unless paging is not implemented at all.
	pub fn check_bad_request(&self, test: &Test, paged: &PagedResponse) -> Outcome<()> {
		let query_string = paged.query.query_string();
		let response = paged
			.response
			.as_ref()
			.map_err(|_| TestAbort(test.fail(format!("Query API did not respond as expected, for query: {query_string}"))))?;
		if response.status == 501 {
			return Err(TestAbort(test.optional_with_link(
				format!(
					"Query API signalled that it does not support this query: {query_string}. Query APIs should support pagination for scalability."
				),
				PAGING_WIKI_URL,
			)));
		}
		let none_present = PAGING_HEADERS.iter().all(|h| response.header(h).is_none());
		if response.status == 200 && none_present {
			return Err(TestAbort(test.optional_with_link(
				"Query API response did not include any pagination headers. Query APIs should support pagination for scalability.",
				PAGING_WIKI_URL,
			)));
		}
		if response.status != 400 {
			return Err(TestAbort(test.fail(format!("Query API responded with wrong HTTP code, for query: {query_string}"))));
		}
		Ok(())
	}
}

fn out_of_range(header: &str, actual: &str, expected: Option<&VersionSpec>, query_string: &str) -> String {
	let expected = expected.map(ToString::to_string).unwrap_or_default();
	format!(
		"Query API response header {header} '{actual}' is outside the expected range {expected}, for query: {query_string}. This could just indicate the API and Testing Tool clocks are not synchronized."
	)
}

// Registries return newest first; expectations are built oldest first.
fn check_body(test: &Test, query_string: &str, response: &HttpResponse, expected: &[Uuid]) -> Outcome<()> {
	let body = response.json().map_err(|_| TestAbort(test.fail("Non-JSON response returned")))?;
	let items = body
		.as_array()
		.ok_or_else(|| TestAbort(test.fail(format!("Query API did not respond as expected, for query: {query_string}"))))?;
	if items.len() != expected.len() {
		return Err(TestAbort(test.fail(format!(
			"Query API response did not include the correct number of resources, for query: {query_string}"
		))));
	}
	for (item, want) in items.iter().zip(expected.iter().rev()) {
		let id = item
			.get("id")
			.and_then(Value::as_str)
			.ok_or_else(|| TestAbort(test.fail(format!("Query API did not respond as expected, for query: {query_string}"))))?;
		if id != want.to_string() {
			return Err(TestAbort(test.fail(format!(
				"Query API response did not include the correct resources, for query: {query_string}"
			))));
		}
	}
	Ok(())
}
