//! Deterministic resource graphs and the registration helpers built on them.
//!
//! Ids come from a seeded RNG so a run with a fixed `random_seed` registers
//! the same resources every time. Registrations are strictly sequential;
//! the paging tests depend on it.

use crate::compatibility::{generate_constraint_set, generate_flow_params, InteropPoint};
use crate::paging::{PagedQuery, HEADER_TIMESTAMP, HEADER_UNTIL};
use crate::registry::{QueryApi, RegistrationApi};
use crate::result::{OrAbort, Outcome, Test, TestAbort, TestState};
use crate::timestamp_spec::VersionSpec;
use nmos_core::caps::ReceiverCaps;
use nmos_core::resource::{Common, Device, Endpoint, Flow, Node, NodeApi, Receiver, Sender, Source};
use nmos_core::{ApiVersion, Resource, ResourceType, TestConfig, Version};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const TRANSPORT_RTP_MCAST: &str = "urn:x-nmos:transport:rtp.mcast";
const FORMAT_VIDEO: &str = "urn:x-nmos:format:video";

/// One of each resource type, wired together.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGraph {
	pub node: Node,
	pub device: Device,
	pub source: Source,
	pub flow: Flow,
	pub sender: Sender,
	pub receiver: Receiver,
}

impl ResourceGraph {
	/// All resources in an order that satisfies referential integrity.
	pub fn in_registration_order(&self) -> Vec<Resource> {
		vec![
			self.node.clone().into(),
			self.device.clone().into(),
			self.source.clone().into(),
			self.flow.clone().into(),
			self.sender.clone().into(),
			self.receiver.clone().into(),
		]
	}
}

/// A TR-08 sender with its source and flow, derived from one interop point.
#[derive(Debug, Clone, PartialEq)]
pub struct Tr08Sender {
	pub point: InteropPoint,
	pub source: Source,
	pub flow: Flow,
	pub sender: Sender,
}

pub struct ResourceFixtureGenerator {
	registration: Arc<dyn RegistrationApi>,
	query: Option<Arc<dyn QueryApi>>,
	rng: StdRng,
	protocol: String,
	delay: Duration,
	api_version: ApiVersion,
}

impl ResourceFixtureGenerator {
	pub fn new(registration: Arc<dyn RegistrationApi>, query: Option<Arc<dyn QueryApi>>, config: &TestConfig) -> Self {
		let rng = match config.random_seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};
		Self {
			registration,
			query,
			rng,
			protocol: config.protocol().to_string(),
			delay: config.paging_delay(),
			api_version: config.query_api_version,
		}
	}

	pub fn rng(&mut self) -> &mut StdRng { &mut self.rng }

	/// A v4 UUID drawn from the generator's RNG.
	pub fn next_id(&mut self) -> Uuid { uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid() }

	fn common(&mut self, label: &str, description: &str) -> Common { Common::new(self.next_id(), label, description) }

	pub fn node(&mut self, description: &str) -> Node {
		let common = self.common("sample node", description);
		Node {
			href: "http://127.0.0.1:12345/".into(),
			hostname: Some("sample-node.local".into()),
			api: NodeApi {
				versions: vec![self.api_version.to_string()],
				endpoints: vec![Endpoint { host: "127.0.0.1".into(), port: 12345, protocol: self.protocol.clone() }],
			},
			caps: Default::default(),
			services: Vec::new(),
			clocks: Vec::new(),
			interfaces: Vec::new(),
			common,
		}
	}

	pub fn device(&mut self, node: &Node, description: &str) -> Device {
		Device {
			common: self.common("sample device", description),
			device_type: "urn:x-nmos:device:generic".into(),
			node_id: node.common.id,
			senders: Vec::new(),
			receivers: Vec::new(),
			controls: Vec::new(),
		}
	}

	pub fn source(&mut self, device: &Device, description: &str) -> Source {
		Source {
			common: self.common("sample source", description),
			format: FORMAT_VIDEO.into(),
			device_id: device.common.id,
			parents: Vec::new(),
			clock_name: None,
			caps: Default::default(),
			grain_rate: None,
		}
	}

	pub fn flow(&mut self, source: &Source, description: &str) -> Flow {
		Flow {
			common: self.common("sample flow", description),
			format: FORMAT_VIDEO.into(),
			source_id: source.common.id,
			device_id: Some(source.device_id),
			parents: Vec::new(),
			media_type: None,
			grain_rate: None,
			frame_width: None,
			frame_height: None,
			interlace_mode: None,
			colorspace: None,
			transfer_characteristic: None,
			components: None,
			profile: None,
			level: None,
			sublevel: None,
			bit_rate: None,
		}
	}

	pub fn sender(&mut self, device: &Device, flow_id: Option<Uuid>, description: &str) -> Sender {
		Sender {
			common: self.common("sample sender", description),
			flow_id,
			transport: TRANSPORT_RTP_MCAST.into(),
			device_id: device.common.id,
			manifest_href: Some("http://127.0.0.1:12345/sdp".into()),
			interface_bindings: Vec::new(),
			subscription: Default::default(),
		}
	}

	pub fn receiver(&mut self, device: &Device, description: &str) -> Receiver {
		Receiver {
			common: self.common("sample receiver", description),
			format: FORMAT_VIDEO.into(),
			caps: ReceiverCaps::default(),
			device_id: device.common.id,
			transport: TRANSPORT_RTP_MCAST.into(),
			interface_bindings: Vec::new(),
			subscription: Default::default(),
		}
	}

	/// Node -> Device -> Source -> Flow -> Sender, and Device -> Receiver.
	pub fn graph(&mut self, description: &str) -> ResourceGraph {
		let node = self.node(description);
		let mut device = self.device(&node, description);
		let source = self.source(&device, description);
		let flow = self.flow(&source, description);
		let sender = self.sender(&device, Some(flow.common.id), description);
		let receiver = self.receiver(&device, description);
		device.senders.push(sender.common.id);
		device.receivers.push(receiver.common.id);
		ResourceGraph { node, device, source, flow, sender, receiver }
	}

	/// Source, flow and sender advertising the format of `point`.
	pub fn tr08_sender(&mut self, device: &Device, point: &InteropPoint) -> nmos_core::Result<Tr08Sender> {
		let label = format!("TR-08 sender {}", point.id);
		let mut source = self.source(device, &label);
		source.common.label = label.clone();
		let params = generate_flow_params(&point.format)?;
		let mut flow = self.flow(&source, &label);
		flow.media_type = Some(params.media_type);
		flow.grain_rate = Some(params.grain_rate);
		flow.frame_width = Some(params.frame_width);
		flow.frame_height = Some(params.frame_height);
		flow.interlace_mode = Some(params.interlace_mode);
		flow.colorspace = Some(params.colorspace);
		flow.transfer_characteristic = params.transfer_characteristic;
		flow.components = params.components;
		flow.profile = params.profile;
		flow.level = params.level;
		flow.sublevel = params.sublevel;
		flow.bit_rate = params.bit_rate;
		let mut sender = self.sender(device, Some(flow.common.id), &label);
		sender.common.label = label;
		Ok(Tr08Sender { point: point.clone(), source, flow, sender })
	}

	/// Receiver whose caps admit exactly the format of `point`.
	pub fn tr08_receiver(&mut self, device: &Device, point: &InteropPoint) -> nmos_core::Result<Receiver> {
		let label = format!("TR-08 receiver {}", point.id);
		let mut receiver = self.receiver(device, &label);
		receiver.common.label = label;
		receiver.caps = ReceiverCaps {
			media_types: vec![point.format.media_type.clone()],
			constraint_sets: vec![generate_constraint_set(&point.format)?],
			version: Some(Version::now_tai(0.0)),
		};
		Ok(receiver)
	}

	/// POST a registration and check the status code and `Location` header.
	/// Returns the `X-Paging-Timestamp` debugging header when present.
	pub async fn post_resource(&self, test: &Test, resource: &Resource, codes: &[u16]) -> Outcome<Option<Version>> {
		self.post_resource_or(test, resource, codes, TestState::Fail).await
	}

	/// As [`Self::post_resource`], reporting problems with `severity`.
	pub async fn post_resource_or(
		&self,
		test: &Test,
		resource: &Resource,
		codes: &[u16],
		severity: TestState,
	) -> Outcome<Option<Version>> {
		let abort = |detail: String| TestAbort(test.result(severity, detail));
		let body = resource.registration_body().or_fail(test)?;
		let r = self
			.registration
			.post_resource(&body)
			.await
			.map_err(|e| abort(format!("Registration API returned an unexpected response: {e}")))?;
		debug!(resource_type = %body.resource_type, id = %resource.id(), status = r.status, "registered");

		let wrong_code = [200, 201].iter().any(|c| *c == r.status && !codes.contains(c));
		if wrong_code {
			return Err(abort(format!("Registration API returned wrong HTTP code: {}", r.status)));
		}
		if !codes.contains(&r.status) {
			return Err(abort(format!("Registration API returned an unexpected response: {} {}", r.status, r.body)));
		}
		if r.status != 200 && r.status != 201 {
			return Ok(None);
		}

		let location = r.header("location").ok_or_else(|| abort("Registration API failed to return a 'Location' response header".into()))?;
		let path = format!("resource/{}/{}", body.resource_type.plural(), resource.id());
		if !location.contains(&path) {
			return Err(abort(format!("Registration API 'Location' response header is incorrect: Location: {location}")));
		}
		if !location.starts_with('/') && !location.starts_with(&format!("{}://", self.protocol)) {
			return Err(abort(format!(
				"Registration API 'Location' response header is invalid for the current protocol: Location: {location}"
			)));
		}
		match r.header(HEADER_TIMESTAMP) {
			None => Ok(None),
			Some(ts) => ts
				.parse()
				.map(Some)
				.map_err(|_| abort(format!("Registration API returned an invalid X-Paging-Timestamp: {ts}"))),
		}
	}

	/// Register `count` nodes one at a time, returning the bracketing
	/// update timestamp and id of each, oldest first.
	///
	/// `labeller` maps the index of each node to its label.
	pub async fn post_sample_nodes(
		&mut self,
		test: &Test,
		count: usize,
		description: &str,
		labeller: Option<&dyn Fn(usize) -> String>,
	) -> Outcome<(Vec<VersionSpec>, Vec<Uuid>)> {
		let mut timestamps = Vec::with_capacity(count);
		let mut ids = Vec::with_capacity(count);
		let mut resource: Resource = self.node(description).into();
		for index in 0..count {
			let id = self.next_id();
			let common = resource.common_mut();
			common.id = id;
			if let Some(label) = labeller {
				common.label = label(index);
			}
			// for debugging
			common.tags.insert("index".into(), vec![index.to_string()]);
			resource.bump_version();

			let before = Version::now_tai(0.0);
			tokio::time::sleep(self.delay).await;
			let timestamp = self.post_resource(test, &resource, &[201]).await?;
			let observed = match timestamp {
				Some(ts) => Some(ts),
				None => self.observe_update(id).await,
			};
			tokio::time::sleep(self.delay).await;
			let after = Version::now_tai(0.0);

			let permitted = VersionSpec::permitted(before, after);
			if let Some(ts) = timestamp {
				if !permitted.contains(&ts) {
					return Err(TestAbort(test.fail(format!(
						"API and Testing Tool clocks appear not to be synchronized. The response header X-Paging-Timestamp '{ts}' is outside the expected range: {permitted}"
					))));
				}
			}
			let observed = observed.filter(|v| permitted.contains(v));
			timestamps.push(VersionSpec::recommended(before, observed, after));
			ids.push(id);
		}
		Ok((timestamps, ids))
	}

	/// Best effort guess at the registry's update timestamp for `id`.
	async fn observe_update(&self, id: Uuid) -> Option<Version> {
		let query = self.query.as_ref()?;
		let paged = query.paged_request(&PagedQuery::nodes().id(id).limit(1)).await;
		paged.response.ok()?.header(HEADER_UNTIL)?.parse().ok()
	}

	/// Register the parent chain of `resource_type`, then a fresh resource of
	/// that type. Parent failures are UNCLEAR, the final one FAIL.
	pub async fn post_super_resources_and_resource(&mut self, test: &Test, resource_type: ResourceType, description: &str) -> Outcome<Resource> {
		self.post_chain(test, resource_type, description, TestState::Fail).await
	}

	async fn post_chain(&mut self, test: &Test, resource_type: ResourceType, description: &str, severity: TestState) -> Outcome<Resource> {
		let resource: Resource = match resource_type {
			ResourceType::Node => self.node(description).into(),
			ResourceType::Device => {
				let node = self.parent(test, ResourceType::Node, description).await?;
				let Resource::Node(node) = node else { return Err(TestAbort(test.unclear("unexpected parent type"))) };
				self.device(&node, description).into()
			}
			ResourceType::Source | ResourceType::Sender | ResourceType::Receiver => {
				let device = self.parent(test, ResourceType::Device, description).await?;
				let Resource::Device(device) = device else { return Err(TestAbort(test.unclear("unexpected parent type"))) };
				match resource_type {
					ResourceType::Source => self.source(&device, description).into(),
					ResourceType::Sender => {
						let flow_id = self.next_id();
						self.sender(&device, Some(flow_id), description).into()
					}
					_ => self.receiver(&device, description).into(),
				}
			}
			ResourceType::Flow => {
				let source = self.parent(test, ResourceType::Source, description).await?;
				let Resource::Source(source) = source else { return Err(TestAbort(test.unclear("unexpected parent type"))) };
				self.flow(&source, description).into()
			}
		};
		self.post_resource_or(test, &resource, &[201], severity).await?;
		Ok(resource)
	}

	async fn parent(&mut self, test: &Test, resource_type: ResourceType, description: &str) -> Outcome<Resource> {
		Box::pin(self.post_chain(test, resource_type, description, TestState::Unclear)).await
	}
}
