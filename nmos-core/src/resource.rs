//! Typed IS-04 resources.
//!
//! Internal logic works on these structs; JSON only appears at the HTTP
//! edges via [`Resource::from_json`] and [`Resource::to_json`].

use crate::caps::ReceiverCaps;
use crate::error::{Error, Result};
use crate::types::{Rational, ResourceType};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

pub type Tags = BTreeMap<String, Vec<String>>;

/// Fields shared by every resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Common {
	pub id: Uuid,
	pub version: Version,
	pub label: String,
	pub description: String,
	#[serde(default)]
	pub tags: Tags,
}

impl Common {
	pub fn new(id: Uuid, label: impl Into<String>, description: impl Into<String>) -> Self {
		Self { id, version: Version::now_tai(0.0), label: label.into(), description: description.into(), tags: Tags::new() }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
	pub host: String,
	pub port: u16,
	pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeApi {
	pub versions: Vec<String>,
	pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
	#[serde(flatten)]
	pub common: Common,
	pub href: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hostname: Option<String>,
	#[serde(default)]
	pub api: NodeApi,
	#[serde(default)]
	pub caps: serde_json::Map<String, Value>,
	#[serde(default)]
	pub services: Vec<Value>,
	#[serde(default)]
	pub clocks: Vec<Value>,
	#[serde(default)]
	pub interfaces: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
	#[serde(flatten)]
	pub common: Common,
	#[serde(rename = "type")]
	pub device_type: String,
	pub node_id: Uuid,
	#[serde(default)]
	pub senders: Vec<Uuid>,
	#[serde(default)]
	pub receivers: Vec<Uuid>,
	#[serde(default)]
	pub controls: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
	#[serde(flatten)]
	pub common: Common,
	pub format: String,
	pub device_id: Uuid,
	#[serde(default)]
	pub parents: Vec<Uuid>,
	#[serde(default)]
	pub clock_name: Option<String>,
	#[serde(default)]
	pub caps: serde_json::Map<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub grain_rate: Option<Rational>,
}

/// Per-component raster geometry of a video flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
	pub name: String,
	pub width: u32,
	pub height: u32,
	pub bit_depth: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
	#[serde(flatten)]
	pub common: Common,
	pub format: String,
	pub source_id: Uuid,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub device_id: Option<Uuid>,
	#[serde(default)]
	pub parents: Vec<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub media_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub grain_rate: Option<Rational>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frame_width: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frame_height: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub interlace_mode: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub colorspace: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transfer_characteristic: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub components: Option<Vec<Component>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub profile: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub level: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sublevel: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bit_rate: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SenderSubscription {
	pub receiver_id: Option<Uuid>,
	pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReceiverSubscription {
	pub sender_id: Option<Uuid>,
	pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sender {
	#[serde(flatten)]
	pub common: Common,
	pub flow_id: Option<Uuid>,
	pub transport: String,
	pub device_id: Uuid,
	pub manifest_href: Option<String>,
	#[serde(default)]
	pub interface_bindings: Vec<String>,
	#[serde(default)]
	pub subscription: SenderSubscription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
	#[serde(flatten)]
	pub common: Common,
	pub format: String,
	#[serde(default)]
	pub caps: ReceiverCaps,
	pub device_id: Uuid,
	pub transport: String,
	#[serde(default)]
	pub interface_bindings: Vec<String>,
	#[serde(default)]
	pub subscription: ReceiverSubscription,
}

/// Any registrable resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
	Node(Node),
	Device(Device),
	Source(Source),
	Flow(Flow),
	Sender(Sender),
	Receiver(Receiver),
}

impl Resource {
	pub fn resource_type(&self) -> ResourceType {
		match self {
			Resource::Node(_) => ResourceType::Node,
			Resource::Device(_) => ResourceType::Device,
			Resource::Source(_) => ResourceType::Source,
			Resource::Flow(_) => ResourceType::Flow,
			Resource::Sender(_) => ResourceType::Sender,
			Resource::Receiver(_) => ResourceType::Receiver,
		}
	}

	pub fn common(&self) -> &Common {
		match self {
			Resource::Node(r) => &r.common,
			Resource::Device(r) => &r.common,
			Resource::Source(r) => &r.common,
			Resource::Flow(r) => &r.common,
			Resource::Sender(r) => &r.common,
			Resource::Receiver(r) => &r.common,
		}
	}

	pub fn common_mut(&mut self) -> &mut Common {
		match self {
			Resource::Node(r) => &mut r.common,
			Resource::Device(r) => &mut r.common,
			Resource::Source(r) => &mut r.common,
			Resource::Flow(r) => &mut r.common,
			Resource::Sender(r) => &mut r.common,
			Resource::Receiver(r) => &mut r.common,
		}
	}

	pub fn id(&self) -> Uuid { self.common().id }

	pub fn version(&self) -> Version { self.common().version }

	/// Set a fresh version, strictly greater than the current one.
	pub fn bump_version(&mut self) {
		let common = self.common_mut();
		let now = Version::now_tai(0.0);
		common.version = if now > common.version { now } else { common.version.successor() };
	}

	/// Reference to the resource that must be registered first.
	pub fn parent_ref(&self) -> Option<(ResourceType, Uuid)> {
		match self {
			Resource::Node(_) => None,
			Resource::Device(d) => Some((ResourceType::Node, d.node_id)),
			Resource::Source(s) => Some((ResourceType::Device, s.device_id)),
			Resource::Flow(f) => match f.device_id {
				Some(device_id) => Some((ResourceType::Device, device_id)),
				// v1.0 flows reference only their source
				None => Some((ResourceType::Source, f.source_id)),
			},
			Resource::Sender(s) => Some((ResourceType::Device, s.device_id)),
			Resource::Receiver(r) => Some((ResourceType::Device, r.device_id)),
		}
	}

	/// Reference to the resource recommended to be registered first, if
	/// different from [`Resource::parent_ref`].
	pub fn preceding_ref(&self) -> Option<(ResourceType, Uuid)> {
		match self {
			Resource::Flow(f) if f.device_id.is_some() => Some((ResourceType::Source, f.source_id)),
			Resource::Sender(s) => s.flow_id.map(|id| (ResourceType::Flow, id)),
			_ => None,
		}
	}

	pub fn from_json(resource_type: ResourceType, data: Value) -> Result<Self> {
		Ok(match resource_type {
			ResourceType::Node => Resource::Node(serde_json::from_value(data)?),
			ResourceType::Device => Resource::Device(serde_json::from_value(data)?),
			ResourceType::Source => Resource::Source(serde_json::from_value(data)?),
			ResourceType::Flow => Resource::Flow(serde_json::from_value(data)?),
			ResourceType::Sender => Resource::Sender(serde_json::from_value(data)?),
			ResourceType::Receiver => Resource::Receiver(serde_json::from_value(data)?),
		})
	}

	pub fn to_json(&self) -> Result<Value> {
		Ok(match self {
			Resource::Node(r) => serde_json::to_value(r)?,
			Resource::Device(r) => serde_json::to_value(r)?,
			Resource::Source(r) => serde_json::to_value(r)?,
			Resource::Flow(r) => serde_json::to_value(r)?,
			Resource::Sender(r) => serde_json::to_value(r)?,
			Resource::Receiver(r) => serde_json::to_value(r)?,
		})
	}

	/// Body of a Registration API `POST /resource`.
	pub fn registration_body(&self) -> Result<RegistrationRequest> {
		Ok(RegistrationRequest { resource_type: self.resource_type(), data: self.to_json()? })
	}
}

/// Wire form of a registration: `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRequest {
	#[serde(rename = "type")]
	pub resource_type: ResourceType,
	pub data: Value,
}

impl RegistrationRequest {
	pub fn into_resource(self) -> Result<Resource> {
		if !self.data.is_object() {
			return Err(Error::protocol("registration data must be an object"));
		}
		Resource::from_json(self.resource_type, self.data)
	}
}

impl From<Node> for Resource {
	fn from(r: Node) -> Self { Resource::Node(r) }
}
impl From<Device> for Resource {
	fn from(r: Device) -> Self { Resource::Device(r) }
}
impl From<Source> for Resource {
	fn from(r: Source) -> Self { Resource::Source(r) }
}
impl From<Flow> for Resource {
	fn from(r: Flow) -> Self { Resource::Flow(r) }
}
impl From<Sender> for Resource {
	fn from(r: Sender) -> Self { Resource::Sender(r) }
}
impl From<Receiver> for Resource {
	fn from(r: Receiver) -> Self { Resource::Receiver(r) }
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn node_json() -> Value {
		json!({
			"id": "3b8be755-08ff-452b-b217-c9151eb21193",
			"version": "1441704616:587121295",
			"label": "host1",
			"description": "host1",
			"tags": {},
			"href": "http://172.29.176.102:12345/",
			"api": {"versions": ["v1.3"], "endpoints": [{"host": "172.29.176.102", "port": 12345, "protocol": "http"}]},
			"caps": {},
			"services": [],
			"clocks": [],
			"interfaces": []
		})
	}

	#[test]
	fn node_from_json() {
		let r = Resource::from_json(ResourceType::Node, node_json()).unwrap();
		assert_eq!(r.resource_type(), ResourceType::Node);
		assert_eq!(r.version().to_string(), "1441704616:587121295");
		assert_eq!(r.parent_ref(), None);
	}

	#[test]
	fn missing_label_is_rejected() {
		let mut v = node_json();
		v.as_object_mut().unwrap().remove("label");
		assert!(Resource::from_json(ResourceType::Node, v).is_err());
	}

	#[test]
	fn bump_version_is_strictly_increasing() {
		let mut r = Resource::from_json(ResourceType::Node, node_json()).unwrap();
		let before = r.version();
		r.bump_version();
		assert!(r.version() > before);
	}

	#[test]
	fn flow_refs() {
		let source_id = Uuid::new_v4();
		let device_id = Uuid::new_v4();
		let flow = Flow {
			common: Common::new(Uuid::new_v4(), "f", "f"),
			format: "urn:x-nmos:format:video".into(),
			source_id,
			device_id: Some(device_id),
			parents: vec![],
			media_type: Some("video/raw".into()),
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
		};
		let r = Resource::from(flow);
		assert_eq!(r.parent_ref(), Some((ResourceType::Device, device_id)));
		assert_eq!(r.preceding_ref(), Some((ResourceType::Source, source_id)));
		let body = serde_json::to_value(r.registration_body().unwrap()).unwrap();
		assert_eq!(body["type"], "flow");
		assert_eq!(body["data"]["media_type"], "video/raw");
	}
}
