//! BCP-004-01 receiver capability vocabulary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const CAP_MEDIA_TYPE: &str = "urn:x-nmos:cap:format:media_type";
pub const CAP_FRAME_WIDTH: &str = "urn:x-nmos:cap:format:frame_width";
pub const CAP_FRAME_HEIGHT: &str = "urn:x-nmos:cap:format:frame_height";
pub const CAP_COLOR_SAMPLING: &str = "urn:x-nmos:cap:format:color_sampling";
pub const CAP_COMPONENT_DEPTH: &str = "urn:x-nmos:cap:format:component_depth";
pub const CAP_COLORSPACE: &str = "urn:x-nmos:cap:format:colorspace";
pub const CAP_TRANSFER_CHARACTERISTIC: &str = "urn:x-nmos:cap:format:transfer_characteristic";
pub const CAP_GRAIN_RATE: &str = "urn:x-nmos:cap:format:grain_rate";
pub const CAP_INTERLACE_MODE: &str = "urn:x-nmos:cap:format:interlace_mode";
pub const CAP_PROFILE: &str = "urn:x-nmos:cap:format:profile";
pub const CAP_LEVEL: &str = "urn:x-nmos:cap:format:level";
pub const CAP_SUBLEVEL: &str = "urn:x-nmos:cap:format:sublevel";
pub const CAP_BIT_RATE: &str = "urn:x-nmos:cap:format:bit_rate";
pub const CAP_PACKET_TRANSMISSION_MODE: &str = "urn:x-nmos:cap:transport:packet_transmission_mode";
pub const CAP_ST2110_21_SENDER_TYPE: &str = "urn:x-nmos:cap:transport:st2110_21_sender_type";

/// A single parameter constraint: an enumeration, a range, or both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Constraint {
	#[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
	pub allowed: Option<Vec<Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub minimum: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub maximum: Option<Value>,
}

impl Constraint {
	pub fn enumeration<I, V>(values: I) -> Self
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		Self { allowed: Some(values.into_iter().map(Into::into).collect()), ..Self::default() }
	}

	pub fn range(minimum: impl Into<Value>, maximum: impl Into<Value>) -> Self {
		Self { allowed: None, minimum: Some(minimum.into()), maximum: Some(maximum.into()) }
	}

	/// Whether `value` satisfies every part of the constraint that is present.
	pub fn admits(&self, value: &Value) -> bool {
		if let Some(allowed) = &self.allowed {
			if !allowed.contains(value) {
				return false;
			}
		}
		let as_f64 = |v: &Value| v.as_f64();
		if let (Some(min), Some(v)) = (self.minimum.as_ref().and_then(as_f64), as_f64(value)) {
			if v < min {
				return false;
			}
		}
		if let (Some(max), Some(v)) = (self.maximum.as_ref().and_then(as_f64), as_f64(value)) {
			if v > max {
				return false;
			}
		}
		true
	}
}

/// Map of capability URN to constraint. Keys are kept sorted for stable output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintSet(pub BTreeMap<String, Constraint>);

impl ConstraintSet {
	pub fn new() -> Self { Self::default() }

	pub fn insert(&mut self, urn: impl Into<String>, constraint: Constraint) {
		self.0.insert(urn.into(), constraint);
	}

	pub fn get(&self, urn: &str) -> Option<&Constraint> { self.0.get(urn) }

	pub fn contains(&self, urn: &str) -> bool { self.0.contains_key(urn) }

	pub fn len(&self) -> usize { self.0.len() }

	pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// The `caps` object of a Receiver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReceiverCaps {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub media_types: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub constraint_sets: Vec<ConstraintSet>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<crate::Version>,
}
