//! IS-04 Registration API basics and Query API pagination against a
//! registry under test, or against the in-process mock.

use super::{harness, Harness, Target};
use crate::error::Result;
use crate::paging::{PagedQuery, PagedResponse, PagingExpectation, PagingOracle};
use crate::registry::{HttpRegistryClient, QueryApi, RegistrationApi};
use crate::result::{OrAbort, Outcome, Test, TestAbort, TestResult};
use crate::runner::{TestCase, TestSuite};
use crate::timestamp_spec::VersionSpec;
use async_trait::async_trait;
use futures::FutureExt;
use nmos_core::{RegistrationRequest, Resource, ResourceType, TestConfig, Version};
use serde_json::Value;
use uuid::Uuid;

pub struct QueryPagingSuite {
	config: TestConfig,
	target: Target,
	oracle: PagingOracle,
	harness: Option<Harness>,
}

impl QueryPagingSuite {
	pub const NAME: &'static str = "query-paging";

	pub fn new(config: TestConfig, target: Target) -> Self {
		let oracle = PagingOracle::new(config.protocol(), config.query_api_version);
		Self { config, target, oracle, harness: None }
	}

	pub fn harness(&self) -> Option<&Harness> { self.harness.as_ref() }
}

async fn expect_page(
	client: &HttpRegistryClient,
	oracle: &PagingOracle,
	test: &Test,
	query: PagedQuery,
	expected: PagingExpectation,
) -> Outcome<PagedResponse> {
	let paged = client.paged_request(&query).await;
	oracle.verify_paged_response(test, &paged, &expected)?;
	Ok(paged)
}

fn window(ids: &[Uuid], since: Option<VersionSpec>, until: Option<VersionSpec>, limit: u32) -> PagingExpectation {
	PagingExpectation::window(ids.to_vec(), since, until).with_limit(limit)
}

async fn get_status(client: &HttpRegistryClient, test: &Test, path: &str) -> Outcome<u16> {
	let r = client.get(path).await.map_err(|e| TestAbort(test.fail(format!("Query API did not respond as expected: {e}"))))?;
	Ok(r.status)
}

impl QueryPagingSuite {
	async fn test_11(&mut self, test: &Test) -> Outcome<TestResult> {
		let h = harness(&mut self.harness, test)?;
		let node: Resource = h.fixtures.node("test_11").into();
		// Location and X-Paging-Timestamp are checked on every registration
		h.fixtures.post_resource(test, &node, &[201]).await?;
		Ok(test.pass())
	}

	async fn test_12(&mut self, test: &Test) -> Outcome<TestResult> {
		let h = harness(&mut self.harness, test)?;
		let mut node = h.fixtures.post_super_resources_and_resource(test, ResourceType::Node, "test_12").await?;
		node.bump_version();
		h.fixtures.post_resource(test, &node, &[200]).await?;
		Ok(test.pass())
	}

	async fn test_13(&mut self, test: &Test) -> Outcome<TestResult> {
		let h = harness(&mut self.harness, test)?;
		let node = h.fixtures.post_super_resources_and_resource(test, ResourceType::Node, "test_13").await?;
		let r = h
			.client
			.delete_resource(ResourceType::Node, node.id())
			.await
			.map_err(|e| TestAbort(test.fail(format!("Registration API did not respond as expected: {e}"))))?;
		if r.status != 204 {
			return Ok(test.fail(format!("Registration API returned an unexpected response: {} {}", r.status, r.body)));
		}
		let status = get_status(&h.client, test, &format!("nodes/{}", node.id())).await?;
		if status != 404 {
			return Ok(test.fail(format!("Query API returned {status} for a deleted Node, expected 404")));
		}
		Ok(test.pass())
	}

	async fn test_14(&mut self, test: &Test) -> Outcome<TestResult> {
		let h = harness(&mut self.harness, test)?;
		let node: Resource = h.fixtures.node("test_14").into();
		let mut data = node.to_json().or_unclear(test)?;
		if let Value::Object(fields) = &mut data {
			fields.remove("label");
		}
		let body = RegistrationRequest { resource_type: ResourceType::Node, data };
		let r = h
			.client
			.post_resource(&body)
			.await
			.map_err(|e| TestAbort(test.fail(format!("Registration API did not respond as expected: {e}"))))?;
		match r.status {
			400 => Ok(test.pass()),
			200 | 201 => Ok(test.fail("Registration API accepted a Node resource with no label")),
			other => Ok(test.fail(format!("Registration API returned an unexpected response: {other} {}", r.body))),
		}
	}

	async fn test_15(&mut self, test: &Test) -> Outcome<TestResult> {
		let h = harness(&mut self.harness, test)?;
		for resource_type in [ResourceType::Flow, ResourceType::Sender, ResourceType::Receiver] {
			let resource = h.fixtures.post_super_resources_and_resource(test, resource_type, "test_15").await?;
			let mut chain = vec![(resource_type, resource.id())];
			chain.extend(resource.parent_ref());
			for (t, id) in chain {
				let status = get_status(&h.client, test, &format!("{}/{id}", t.plural())).await?;
				if status != 200 {
					return Ok(test.fail(format!("Query API returned {status} for registered {t} '{id}'")));
				}
			}
		}
		Ok(test.pass())
	}

	async fn test_21_1(&mut self, test: &Test) -> Outcome<TestResult> {
		self.oracle.check_paged_trait(test)?;
		let h = harness(&mut self.harness, test)?;
		expect_page(&h.client, &self.oracle, test, PagedQuery::nodes(), PagingExpectation::headers_only()).await?;
		Ok(test.pass())
	}

	async fn test_21_1_1(&mut self, test: &Test) -> Outcome<TestResult> {
		self.oracle.check_paged_trait(test)?;
		let h = harness(&mut self.harness, test)?;
		expect_page(&h.client, &self.oracle, test, PagedQuery::nodes().limit(10), PagingExpectation::headers_only()).await?;
		Ok(test.pass())
	}

	async fn test_21_2(&mut self, test: &Test) -> Outcome<TestResult> {
		self.oracle.check_paged_trait(test)?;
		let description = "test_21_2";
		let h = harness(&mut self.harness, test)?;
		let (ts, ids) = h.fixtures.post_sample_nodes(test, 20, description, None).await?;

		// 1-based indices, as in the documentation examples
		let t = |i: usize| &ts[i - 1];
		let span = |first: usize, last: usize| &ids[first - 1..last];
		// after the i-th post and before the following one
		let recommended = |i: usize| VersionSpec::extended(Some(t(i)), Some(t(i)), ts.get(i));
		let query = || PagedQuery::nodes().description(description);

		// Example 1: initial request
		let expected = window(span(11, 20), Some(recommended(10)), Some(recommended(20)), 10);
		expect_page(&h.client, &self.oracle, test, query().limit(10), expected).await?;

		// Example 2: custom limit
		let expected = window(span(16, 20), Some(recommended(15)), Some(recommended(20)), 5);
		expect_page(&h.client, &self.oracle, test, query().limit(5), expected).await?;

		// Example 3: since
		let expected = window(span(5, 14), Some(VersionSpec::upper(t(4))), Some(recommended(14)), 10);
		expect_page(&h.client, &self.oracle, test, query().since(t(4)).limit(10), expected).await?;

		// Example 4: until
		let expected = window(span(7, 16), Some(recommended(6)), Some(VersionSpec::upper(t(16))), 10);
		expect_page(&h.client, &self.oracle, test, query().until(t(16)).limit(10), expected).await?;

		// Example 5: since and until
		let expected = window(span(5, 14), Some(VersionSpec::upper(t(4))), Some(recommended(14)), 10);
		expect_page(&h.client, &self.oracle, test, query().since(t(4)).until(t(16)).limit(10), expected).await?;

		Ok(test.pass())
	}

	async fn test_21_3(&mut self, test: &Test) -> Outcome<TestResult> {
		self.oracle.check_paged_trait(test)?;
		let description = "test_21_3";
		let h = harness(&mut self.harness, test)?;
		let (ts, ids) = h.fixtures.post_sample_nodes(test, 20, description, None).await?;
		let (first, last) = (&ts[0], &ts[ts.len() - 1]);

		let after = VersionSpec::upper(last);
		let before = VersionSpec::lower(first);
		let query = || PagedQuery::nodes().description(description);

		let expected = PagingExpectation::window(vec![], Some(after.clone()), Some(VersionSpec::ge(&after)));
		expect_page(&h.client, &self.oracle, test, query().since(&after), expected).await?;

		let expected = PagingExpectation::window(vec![], Some(VersionSpec::epoch()), Some(before.clone()));
		expect_page(&h.client, &self.oracle, test, query().until(&before), expected).await?;

		// a single match, no paging parameters
		let expected = PagingExpectation::window(vec![ids[12]], Some(VersionSpec::epoch()), Some(VersionSpec::ge(last)));
		expect_page(&h.client, &self.oracle, test, PagedQuery::nodes().id(ids[12]), expected).await?;

		// no match, no paging parameters
		let unknown = h.fixtures.next_id();
		let expected = PagingExpectation::window(vec![], Some(VersionSpec::epoch()), Some(VersionSpec::ge(last)));
		expect_page(&h.client, &self.oracle, test, PagedQuery::nodes().id(unknown), expected).await?;

		Ok(test.pass())
	}

	async fn test_21_4(&mut self, test: &Test) -> Outcome<TestResult> {
		self.oracle.check_paged_trait(test)?;
		let description = "test_21_4";
		let h = harness(&mut self.harness, test)?;
		let (timestamps, _) = h.fixtures.post_sample_nodes(test, 20, description, None).await?;
		let ts = VersionSpec::upper(&timestamps[12]);
		let query = || PagedQuery::nodes().description(description);

		// since == until
		let expected = window(&[], Some(ts.clone()), Some(ts.clone()), 10);
		expect_page(&h.client, &self.oracle, test, query().since(&ts).until(&ts).limit(10), expected).await?;

		// limit 0 with since
		let expected = window(&[], Some(ts.clone()), Some(ts.clone()), 0);
		expect_page(&h.client, &self.oracle, test, query().since(&ts).limit(0), expected).await?;

		// limit 0 with until
		let expected = window(&[], Some(ts.clone()), Some(ts.clone()), 0);
		expect_page(&h.client, &self.oracle, test, query().until(&ts).limit(0), expected).await?;

		Ok(test.pass())
	}

	async fn test_21_5(&mut self, test: &Test) -> Outcome<TestResult> {
		self.oracle.check_paged_trait(test)?;
		let description = "test_21_5";
		let h = harness(&mut self.harness, test)?;

		let foo = |index: usize| 3 > (index + 1) % 5;
		let labeller = |index: usize| if foo(index) { "foo".to_string() } else { "bar".to_string() };
		let (ts, ids) = h.fixtures.post_sample_nodes(test, 20, description, Some(&labeller)).await?;

		let foo_ids: Vec<Uuid> = ids.iter().enumerate().filter(|(i, _)| foo(*i)).map(|(_, id)| *id).collect();
		let bar_ids: Vec<Uuid> = ids.iter().enumerate().filter(|(i, _)| !foo(*i)).map(|(_, id)| *id).collect();
		let query = |label: &str| PagedQuery::nodes().description(description).label(label);
		let oracle = &self.oracle;
		let client = &h.client;

		// filter   0, 1, -, -, 4, 5, 6, -, -, 9, 10, 11, --, --, 14, 15, 16, --, --, 19
		// 1: "foo", newest 10
		let expected = window(&foo_ids[foo_ids.len() - 10..], Some(VersionSpec::extended(Some(&ts[1]), Some(&ts[1]), Some(&ts[4]))), Some(VersionSpec::ge(&ts[19])), 10);
		expect_page(client, oracle, test, query("foo").limit(10), expected).await?;

		// 2: 'prev' of 1
		let expected = window(&foo_ids[..foo_ids.len() - 10], Some(VersionSpec::epoch()), Some(VersionSpec::gt(&ts[1])), 10);
		expect_page(client, oracle, test, query("foo").until(&ts[1]).limit(10), expected).await?;

		// 3: 'next' of 1
		let expected = window(&[], Some(VersionSpec::upper(&ts[19])), Some(VersionSpec::gt(&ts[19])), 10);
		expect_page(client, oracle, test, query("foo").since(&ts[19]).limit(10), expected).await?;

		// filter   -, -, 2, 3, -, -, -, 7, 8, -, --, --, 12, 13, --, --, --, 17, 18, --
		// 4: "bar", everything fits
		let expected = window(&bar_ids, Some(VersionSpec::epoch()), Some(VersionSpec::ge(&ts[19])), 10);
		expect_page(client, oracle, test, query("bar").limit(10), expected).await?;

		// 5: "bar", limited to 3
		let expected = window(&[ids[13], ids[17], ids[18]], Some(VersionSpec::extended(Some(&ts[12]), Some(&ts[12]), Some(&ts[13]))), Some(VersionSpec::ge(&ts[18])), 3);
		expect_page(client, oracle, test, query("bar").limit(3), expected).await?;

		// 6: 'prev' of 5
		let expected = window(&[ids[7], ids[8], ids[12]], Some(VersionSpec::extended(Some(&ts[3]), Some(&ts[3]), Some(&ts[7]))), Some(VersionSpec::upper(&ts[12])), 3);
		expect_page(client, oracle, test, query("bar").until(&ts[12]).limit(3), expected).await?;

		// 7: since given, still enough matches
		let expected = window(&[ids[7], ids[8], ids[12]], Some(VersionSpec::upper(&ts[4])), Some(VersionSpec::upper(&ts[12])), 3);
		expect_page(client, oracle, test, query("bar").since(&ts[4]).until(&ts[12]).limit(3), expected).await?;

		// 8: since given, not enough matches
		let expected = window(&[ids[12]], Some(VersionSpec::upper(&ts[9])), Some(VersionSpec::upper(&ts[12])), 3);
		expect_page(client, oracle, test, query("bar").since(&ts[9]).until(&ts[12]).limit(3), expected).await?;

		// 9: no matches
		let expected = window(&[], Some(VersionSpec::upper(&ts[9])), Some(VersionSpec::upper(&ts[11])), 3);
		expect_page(client, oracle, test, query("bar").since(&ts[9]).until(&ts[11]).limit(3), expected).await?;

		Ok(test.pass())
	}

	async fn test_21_6(&mut self, test: &Test) -> Outcome<TestResult> {
		self.oracle.check_paged_trait(test)?;
		let h = harness(&mut self.harness, test)?;
		let before = VersionSpec::required(Version::now_tai(0.0));
		let after = VersionSpec::required(Version::now_tai(1.0));
		let paged = h.client.paged_request(&PagedQuery::nodes().since(&after).until(&before)).await;
		self.oracle.check_bad_request(test, &paged)?;
		Ok(test.pass())
	}

	async fn test_21_7(&mut self, test: &Test) -> Outcome<TestResult> {
		self.oracle.check_paged_trait(test)?;
		let description = "test_21_7";
		let count = 3;
		let h = harness(&mut self.harness, test)?;
		let (ts, ids) = h.fixtures.post_sample_nodes(test, count, description, None).await?;
		let last = &ts[count - 1];
		let limit = count as u32;
		let query = || PagedQuery::nodes().description(description).limit(limit);
		let next = || query().since(last);
		let current = || query().until(last);

		let expected = window(&ids, Some(VersionSpec::epoch()), Some(VersionSpec::ge(last)), limit);
		let initial = expect_page(&h.client, &self.oracle, test, query(), expected).await?;
		let mut resources = match initial.response.as_ref().map(|r| r.json()) {
			Ok(Ok(Value::Array(items))) => items,
			_ => return Ok(test.fail("Query API response was not a JSON array")),
		};
		resources.reverse();

		let expected = window(&[], Some(VersionSpec::upper(last)), None, limit);
		expect_page(&h.client, &self.oracle, test, next(), expected).await?;

		let expected = window(&ids, None, Some(VersionSpec::ge(last)), limit);
		expect_page(&h.client, &self.oracle, test, current(), expected).await?;

		// after one update, 'next' holds only the updated resource
		let reregister = |data: &Value| -> Outcome<Resource> {
			let mut resource = Resource::from_json(ResourceType::Node, data.clone()).or_fail(test)?;
			resource.bump_version();
			Ok(resource)
		};
		h.fixtures.post_resource(test, &reregister(&resources[1])?, &[200]).await?;

		let expected = window(&[ids[1]], Some(VersionSpec::upper(last)), None, limit);
		expect_page(&h.client, &self.oracle, test, next(), expected).await?;

		let expected = window(&[ids[0], ids[2]], None, Some(VersionSpec::upper(last)), limit);
		expect_page(&h.client, &self.oracle, test, current(), expected).await?;

		// once the rest are updated too, 'current' is empty and 'next' has them in update order
		h.fixtures.post_resource(test, &reregister(&resources[2])?, &[200]).await?;
		h.fixtures.post_resource(test, &reregister(&resources[0])?, &[200]).await?;

		let expected = window(&[], None, Some(VersionSpec::upper(last)), limit);
		expect_page(&h.client, &self.oracle, test, current(), expected).await?;

		let expected = window(&[ids[1], ids[2], ids[0]], Some(VersionSpec::upper(last)), None, limit);
		expect_page(&h.client, &self.oracle, test, next(), expected).await?;

		Ok(test.pass())
	}

	async fn test_21_8(&mut self, test: &Test) -> Outcome<TestResult> {
		self.oracle.check_paged_trait(test)?;
		let h = harness(&mut self.harness, test)?;
		// the encoded '&' must come back encoded in the Link header
		let query = PagedQuery::nodes().label("foo%26bar");
		expect_page(&h.client, &self.oracle, test, query, PagingExpectation::headers_only()).await?;
		Ok(test.pass())
	}

	async fn test_21_9(&mut self, test: &Test) -> Outcome<TestResult> {
		self.oracle.check_paged_trait(test)?;
		let h = harness(&mut self.harness, test)?;
		let paged = expect_page(&h.client, &self.oracle, test, PagedQuery::nodes(), PagingExpectation::headers_only()).await?;
		let response = paged.response.as_ref().or_fail(test)?;
		Ok(self.oracle.check_link_hosts(test, response).unwrap_or_else(|| test.pass()))
	}
}

#[async_trait(?Send)]
impl TestSuite for QueryPagingSuite {
	fn name(&self) -> &'static str { Self::NAME }

	fn tests(&self) -> Vec<TestCase<Self>> {
		vec![
			TestCase::new("test_11", "Registration API responds with 201 and a Location header on creating a Node", |s, t| s.test_11(t).boxed_local()),
			TestCase::new("test_12", "Registration API responds with 200 HTTP code on updating a registered Node", |s, t| s.test_12(t).boxed_local()),
			TestCase::new("test_13", "Registration API responds with 204 HTTP code on deleting a registered Node", |s, t| s.test_13(t).boxed_local()),
			TestCase::new("test_14", "Registration API rejects an invalid Node resource with a 400 HTTP code", |s, t| s.test_14(t).boxed_local()),
			TestCase::new("test_15", "Registration API accepts super-resources registered in referential order", |s, t| s.test_15(t).boxed_local()),
			TestCase::new("test_21_1", "Query API implements pagination (no query or paging parameters)", |s, t| s.test_21_1(t).boxed_local()),
			TestCase::new("test_21_1_1", "Query API implements pagination (when explicitly requested)", |s, t| s.test_21_1_1(t).boxed_local()),
			TestCase::new("test_21_2", "Query API implements pagination (documentation examples)", |s, t| s.test_21_2(t).boxed_local()),
			TestCase::new("test_21_3", "Query API implements pagination (edge cases)", |s, t| s.test_21_3(t).boxed_local()),
			TestCase::new("test_21_4", "Query API implements pagination (requests that require empty responses)", |s, t| s.test_21_4(t).boxed_local()),
			TestCase::new("test_21_5", "Query API implements pagination (filters that select discontiguous resources)", |s, t| s.test_21_5(t).boxed_local()),
			TestCase::new("test_21_6", "Query API implements pagination (bad requests)", |s, t| s.test_21_6(t).boxed_local()),
			TestCase::new("test_21_7", "Query API implements pagination (updates between paged requests)", |s, t| s.test_21_7(t).boxed_local()),
			TestCase::new("test_21_8", "Query API implements pagination (correct encoding of URLs in Link header)", |s, t| s.test_21_8(t).boxed_local()),
			TestCase::new("test_21_9", "Query API implements pagination (correct protocol and IP/hostname in Link header)", |s, t| s.test_21_9(t).boxed_local()),
		]
	}

	async fn set_up(&mut self) -> Result<()> {
		self.harness = Some(Harness::connect(&self.config, &self.target).await?);
		Ok(())
	}

	async fn tear_down(&mut self) -> Result<()> {
		self.harness = None;
		Ok(())
	}
}
