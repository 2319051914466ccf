//! Checks over the mock registry's request log: registration order and
//! heartbeat timing.

use crate::properties::check_strictly_increasing;
use crate::registry::RequestHistory;
use crate::result::{Test, TestResult};
use nmos_core::{Resource, ResourceType};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

pub const REFERENTIAL_INTEGRITY_URL: &str =
	"https://specs.amwa.tv/is-04/releases/v1.3.2/docs/Behaviour_-_Registration.html#referential-integrity";

/// Allowed deviation from the configured heartbeat interval.
pub const HEARTBEAT_TOLERANCE: Duration = Duration::from_millis(500);

fn title(resource_type: ResourceType) -> String {
	let s = resource_type.as_str();
	let mut chars = s.chars();
	chars.next().map(|c| c.to_ascii_uppercase().to_string() + chars.as_str()).unwrap_or_default()
}

/// Every `resource_type` registration must follow its parent; the
/// recommended preceding resource missing is only a warning.
pub fn check_referential_integrity(test: &Test, history: &RequestHistory, resource_type: ResourceType) -> TestResult {
	let mut registered: HashSet<(ResourceType, uuid::Uuid)> = HashSet::new();
	let mut preceding_warn = None;
	let mut found = false;

	for post in &history.posts {
		if post.resource_type == resource_type {
			found = true;
			let resource = match Resource::from_json(post.resource_type, post.data.clone()) {
				Ok(r) => r,
				Err(e) => return test.fail(format!("Unable to find expected key in the registered {}: {e}", title(resource_type))),
			};
			if let Some((parent_type, parent_id)) = resource.parent_ref() {
				if !registered.contains(&(parent_type, parent_id)) {
					return test.fail(format!(
						"{} '{}' was registered before its referenced '{parent_type}_id' '{parent_id}'",
						title(resource_type),
						post.id
					));
				}
			}
			if let Some((preceding_type, preceding_id)) = resource.preceding_ref() {
				if preceding_warn.is_none() && !registered.contains(&(preceding_type, preceding_id)) {
					preceding_warn = Some(format!(
						"{} '{}' was registered before its referenced '{preceding_type}_id' '{preceding_id}'",
						title(resource_type),
						post.id
					));
				}
			}
		}
		registered.insert((post.resource_type, post.id));
	}

	match (preceding_warn, found) {
		(Some(warn), _) => TestResult { link: Some(REFERENTIAL_INTEGRITY_URL.into()), ..test.warning(warn) },
		(None, true) => test.pass(),
		(None, false) => test.unclear(format!("No {} resources were registered with the mock registry.", title(resource_type))),
	}
}

/// Heartbeats must all be for the first registered Node, start within one
/// interval of its registration and keep to the interval.
pub fn check_heartbeats(test: &Test, history: &RequestHistory, interval: Duration) -> TestResult {
	if history.heartbeats.len() < 2 {
		return test.fail("Not enough heartbeats were made in the time period.");
	}
	let Some(initial) = history.posts_of(ResourceType::Node).next() else {
		return test.fail("Heartbeats were made without a Node registration.");
	};

	let mut last = None;
	for hb in &history.heartbeats {
		if hb.node_id != initial.id {
			return test.fail("Heartbeats matched a different Node ID to the initial registration.");
		}
		match last {
			None => {
				if hb.at.duration_since(&initial.at) > interval + HEARTBEAT_TOLERANCE {
					return test.fail("First heartbeat occurred too long after initial Node registration.");
				}
			}
			Some(prev) => {
				let gap = hb.at.duration_since(&prev);
				if gap > interval + HEARTBEAT_TOLERANCE {
					return test.fail("Heartbeats are not frequent enough.");
				}
				if gap + HEARTBEAT_TOLERANCE < interval {
					return test.fail("Heartbeats are too frequent.");
				}
			}
		}
		last = Some(hb.at);
	}
	let times: Vec<_> = history.heartbeats.iter().map(|hb| hb.at).collect();
	if let Err(e) = check_strictly_increasing(&times) {
		return test.fail(format!("Heartbeats were recorded out of order: {e}"));
	}
	debug!(count = times.len(), "heartbeats in order");
	test.pass()
}
