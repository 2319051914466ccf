//! TR-08 JPEG XS interoperability model.
//!
//! Decides whether a Sender and a Receiver interoperate, and derives the
//! BCP-004-01 constraint set and IS-04 flow parameters for a format.

use nmos_core::caps::*;
use nmos_core::resource::Component;
use nmos_core::{Rational, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

pub const MEDIA_TYPE_RAW: &str = "video/raw";
pub const MEDIA_TYPE_JXSV: &str = "video/jxsv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilitySet {
	#[serde(rename = "A/B")]
	AB,
	C,
	D,
}

impl CapabilitySet {
	/// Sender capability sets a Receiver of this set accepts.
	pub fn accepts(&self) -> &'static [CapabilitySet] {
		match self {
			CapabilitySet::D => &[CapabilitySet::AB, CapabilitySet::C, CapabilitySet::D],
			CapabilitySet::C => &[CapabilitySet::AB, CapabilitySet::C],
			CapabilitySet::AB => &[CapabilitySet::AB],
		}
	}
}

impl fmt::Display for CapabilitySet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			CapabilitySet::AB => "A/B",
			CapabilitySet::C => "C",
			CapabilitySet::D => "D",
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConformanceLevel {
	Fhd,
	Uhd1,
	Uhd2,
}

impl fmt::Display for ConformanceLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ConformanceLevel::Fhd => "FHD",
			ConformanceLevel::Uhd1 => "UHD1",
			ConformanceLevel::Uhd2 => "UHD2",
		})
	}
}

/// Capability set and conformance level of one endpoint. Both `None`
/// describes an uncompressed (`video/raw`) endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tr08Capability {
	pub capability_set: Option<CapabilitySet>,
	pub conformance_level: Option<ConformanceLevel>,
}

impl Tr08Capability {
	pub fn new(capability_set: CapabilitySet, conformance_level: ConformanceLevel) -> Self {
		Self { capability_set: Some(capability_set), conformance_level: Some(conformance_level) }
	}

	pub fn raw() -> Self { Self::default() }
}

/// Whether `sender` can be received by `receiver`.
///
/// Not symmetric: the acceptance table is indexed by the receiver's set. A
/// `None` capability set only ever matches `None`.
pub fn is_compatible(sender: &Tr08Capability, receiver: &Tr08Capability) -> bool {
	if sender.conformance_level != receiver.conformance_level {
		return false;
	}
	match (receiver.capability_set, sender.capability_set) {
		(None, s) => s.is_none(),
		(Some(r), Some(s)) => r.accepts().contains(&s),
		(Some(_), None) => false,
	}
}

/// Chroma sampling of a video format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampling {
	YCbCr422,
	YCbCr420,
	YCbCr444,
	Rgb,
}

impl Sampling {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"YCbCr-4:2:2" => Some(Sampling::YCbCr422),
			"YCbCr-4:2:0" => Some(Sampling::YCbCr420),
			"YCbCr-4:4:4" => Some(Sampling::YCbCr444),
			"RGB" => Some(Sampling::Rgb),
			_ => None,
		}
	}

	/// Component names with their horizontal and vertical subsampling divisors.
	fn layout(&self) -> [(&'static str, u32, u32); 3] {
		match self {
			Sampling::YCbCr422 => [("Y", 1, 1), ("Cb", 2, 1), ("Cr", 2, 1)],
			Sampling::YCbCr420 => [("Y", 1, 1), ("Cb", 2, 2), ("Cr", 2, 2)],
			Sampling::YCbCr444 => [("Y", 1, 1), ("Cb", 1, 1), ("Cr", 1, 1)],
			Sampling::Rgb => [("R", 1, 1), ("G", 1, 1), ("B", 1, 1)],
		}
	}
}

/// Human-readable description of a video format, as found in SDP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatParams {
	pub media_type: String,
	pub width: u32,
	pub height: u32,
	pub depth: u8,
	/// e.g. `YCbCr-4:2:2`; kept as text so unknown modes pass through.
	pub sampling: String,
	pub colorimetry: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transfer_characteristic: Option<String>,
	/// `"N/D"` or `"N"`.
	pub frame_rate: String,
	#[serde(default)]
	pub interlace: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub profile: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub level: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sublevel: Option<String>,
	/// Bit rate range in kilobits per second.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bit_rate: Option<(u64, u64)>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub packet_transmission_mode: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub st2110_21_sender_type: Option<String>,
}

impl FormatParams {
	pub fn raw(width: u32, height: u32, frame_rate: &str) -> Self {
		Self {
			media_type: MEDIA_TYPE_RAW.into(),
			width,
			height,
			depth: 10,
			sampling: "YCbCr-4:2:2".into(),
			colorimetry: "BT709".into(),
			transfer_characteristic: Some("SDR".into()),
			frame_rate: frame_rate.into(),
			interlace: false,
			profile: None,
			level: None,
			sublevel: None,
			bit_rate: None,
			packet_transmission_mode: None,
			st2110_21_sender_type: None,
		}
	}

	/// Codec keys only apply when both profile and level are known.
	pub fn is_codec(&self) -> bool { self.profile.is_some() && self.level.is_some() }

	pub fn interlace_modes(&self) -> Vec<&'static str> {
		if self.interlace {
			vec!["interlaced_bff", "interlaced_tff", "interlaced_psf"]
		} else {
			vec!["progressive"]
		}
	}

	pub fn grain_rate(&self) -> Result<Rational> { self.frame_rate.parse() }
}

pub fn generate_constraint_set(params: &FormatParams) -> Result<ConstraintSet> {
	let rate = params.grain_rate()?;
	let mut set = ConstraintSet::new();
	set.insert(CAP_MEDIA_TYPE, Constraint::enumeration([params.media_type.clone()]));
	set.insert(CAP_FRAME_WIDTH, Constraint::enumeration([params.width]));
	set.insert(CAP_FRAME_HEIGHT, Constraint::enumeration([params.height]));
	set.insert(CAP_COLOR_SAMPLING, Constraint::enumeration([params.sampling.clone()]));
	set.insert(CAP_COMPONENT_DEPTH, Constraint::enumeration([params.depth]));
	set.insert(CAP_COLORSPACE, Constraint::enumeration([params.colorimetry.clone()]));
	if let Some(tc) = &params.transfer_characteristic {
		set.insert(CAP_TRANSFER_CHARACTERISTIC, Constraint::enumeration([tc.clone()]));
	}
	set.insert(
		CAP_GRAIN_RATE,
		Constraint::enumeration([json!({"numerator": rate.numerator, "denominator": rate.denominator})]),
	);
	set.insert(CAP_INTERLACE_MODE, Constraint::enumeration(params.interlace_modes()));

	if let (Some(profile), Some(level)) = (&params.profile, &params.level) {
		set.insert(CAP_PROFILE, Constraint::enumeration([profile.clone()]));
		set.insert(CAP_LEVEL, Constraint::enumeration([level.clone()]));
		if let Some(sublevel) = &params.sublevel {
			set.insert(CAP_SUBLEVEL, Constraint::enumeration([sublevel.clone()]));
		}
		if let Some((min, max)) = params.bit_rate {
			set.insert(CAP_BIT_RATE, Constraint::range(min, max));
		}
		if let Some(mode) = &params.packet_transmission_mode {
			set.insert(CAP_PACKET_TRANSMISSION_MODE, Constraint::enumeration([mode.clone()]));
		}
		if let Some(t) = &params.st2110_21_sender_type {
			set.insert(CAP_ST2110_21_SENDER_TYPE, Constraint::enumeration([t.clone()]));
		}
	}
	Ok(set)
}

/// Flow attributes derived from a format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDescriptor {
	pub media_type: String,
	pub frame_width: u32,
	pub frame_height: u32,
	pub interlace_mode: String,
	pub colorspace: String,
	pub transfer_characteristic: Option<String>,
	pub grain_rate: Rational,
	/// `None` when the sampling mode is not recognised.
	pub components: Option<Vec<Component>>,
	pub profile: Option<String>,
	pub level: Option<String>,
	pub sublevel: Option<String>,
	/// Nominal bit rate in kilobits per second.
	pub bit_rate: Option<u64>,
}

pub fn generate_flow_params(params: &FormatParams) -> Result<FlowDescriptor> {
	let components = match Sampling::parse(&params.sampling) {
		Some(sampling) => Some(
			sampling
				.layout()
				.iter()
				.map(|(name, dx, dy)| Component {
					name: (*name).to_string(),
					width: params.width / dx,
					height: params.height / dy,
					bit_depth: params.depth,
				})
				.collect(),
		),
		None => {
			tracing::warn!(sampling = %params.sampling, "unrecognised sampling, flow components omitted");
			None
		}
	};
	let codec = params.is_codec();
	Ok(FlowDescriptor {
		media_type: params.media_type.clone(),
		frame_width: params.width,
		frame_height: params.height,
		interlace_mode: if params.interlace { "interlaced_tff".into() } else { "progressive".into() },
		colorspace: params.colorimetry.clone(),
		transfer_characteristic: params.transfer_characteristic.clone(),
		grain_rate: params.grain_rate()?,
		components,
		profile: params.profile.clone().filter(|_| codec),
		level: params.level.clone().filter(|_| codec),
		sublevel: params.sublevel.clone().filter(|_| codec),
		bit_rate: params.bit_rate.filter(|_| codec).map(|(_, max)| max),
	})
}

/// One entry of the interoperability catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteropPoint {
	pub id: String,
	pub capability: Tr08Capability,
	pub format: FormatParams,
}

fn jxsv(
	width: u32,
	height: u32,
	frame_rate: &str,
	sampling: &str,
	depth: u8,
	profile: &str,
	level: &str,
	sublevel: &str,
	bit_rate: (u64, u64),
) -> FormatParams {
	FormatParams {
		media_type: MEDIA_TYPE_JXSV.into(),
		depth,
		sampling: sampling.into(),
		profile: Some(profile.into()),
		level: Some(level.into()),
		sublevel: Some(sublevel.into()),
		bit_rate: Some(bit_rate),
		packet_transmission_mode: Some("codestream".into()),
		st2110_21_sender_type: Some("2110TPN".into()),
		..FormatParams::raw(width, height, frame_rate)
	}
}

fn point(id: &str, capability: Tr08Capability, format: FormatParams) -> InteropPoint {
	InteropPoint { id: id.into(), capability, format }
}

/// Fixed catalogue of interoperability points, in a stable order.
pub fn catalogue() -> Vec<InteropPoint> {
	use CapabilitySet::*;
	use ConformanceLevel::*;
	let cap = Tr08Capability::new;
	let interlaced = |mut f: FormatParams| {
		f.interlace = true;
		f
	};
	vec![
		point("1a", cap(AB, Fhd), jxsv(1920, 1080, "60000/1001", "YCbCr-4:2:2", 10, "Main422.10", "2k-1", "Sublev3bpp", (100_000, 200_000))),
		point("1b", cap(AB, Fhd), interlaced(jxsv(1920, 1080, "30000/1001", "YCbCr-4:2:2", 10, "Main422.10", "2k-1", "Sublev3bpp", (100_000, 200_000)))),
		point("2a", cap(C, Fhd), jxsv(1920, 1080, "60000/1001", "YCbCr-4:4:4", 12, "High444.12", "2k-1", "Sublev4bpp", (150_000, 300_000))),
		point("2b", cap(C, Fhd), jxsv(1920, 1080, "50", "RGB", 12, "High444.12", "2k-1", "Sublev4bpp", (150_000, 300_000))),
		point("3a", cap(D, Fhd), jxsv(1920, 1080, "60000/1001", "YCbCr-4:4:4", 12, "High444.12", "4k-1", "Sublev4bpp", (200_000, 400_000))),
		point("3e", cap(D, Fhd), jxsv(1920, 1080, "50", "YCbCr-4:2:2", 10, "High444.12", "4k-1", "Sublev4bpp", (200_000, 400_000))),
		point("4a", cap(AB, Uhd1), jxsv(3840, 2160, "60000/1001", "YCbCr-4:2:2", 10, "Main422.10", "4k-2", "Sublev3bpp", (400_000, 800_000))),
		point("5a", cap(C, Uhd1), jxsv(3840, 2160, "50", "YCbCr-4:4:4", 12, "High444.12", "4k-2", "Sublev4bpp", (600_000, 1_200_000))),
		point("6a", cap(D, Uhd1), jxsv(3840, 2160, "60000/1001", "YCbCr-4:2:0", 10, "High444.12", "4k-3", "Sublev4bpp", (800_000, 1_600_000))),
		point("7a", cap(AB, Uhd2), jxsv(7680, 4320, "50", "YCbCr-4:2:2", 10, "Main422.10", "8k-2", "Sublev3bpp", (1_600_000, 3_200_000))),
		point("8a", cap(C, Uhd2), jxsv(7680, 4320, "60000/1001", "YCbCr-4:4:4", 12, "High444.12", "8k-2", "Sublev4bpp", (2_400_000, 4_800_000))),
		point("9a", cap(D, Uhd2), jxsv(7680, 4320, "60000/1001", "YCbCr-4:2:0", 10, "High444.12", "8k-3", "Sublev4bpp", (3_200_000, 6_400_000))),
		point("raw-fhd", Tr08Capability::raw(), FormatParams::raw(1920, 1080, "60000/1001")),
		point("raw-uhd1", Tr08Capability::raw(), FormatParams::raw(3840, 2160, "50")),
	]
}

/// The catalogue in an order fixed by `rng`.
pub fn shuffled_catalogue<R: Rng + ?Sized>(rng: &mut R) -> Vec<InteropPoint> {
	let mut points = catalogue();
	points.shuffle(rng);
	points
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::{rngs::StdRng, SeedableRng};
	use serde_json::Value;

	#[test]
	fn receiver_indexed_table() {
		let ab = Tr08Capability::new(CapabilitySet::AB, ConformanceLevel::Fhd);
		let d = Tr08Capability::new(CapabilitySet::D, ConformanceLevel::Fhd);
		assert!(is_compatible(&ab, &d));
		assert!(!is_compatible(&d, &ab));
		let c = Tr08Capability::new(CapabilitySet::C, ConformanceLevel::Fhd);
		assert!(is_compatible(&ab, &c));
		assert!(is_compatible(&c, &c));
		assert!(!is_compatible(&d, &c));
	}

	#[test]
	fn levels_must_match() {
		let s = Tr08Capability::new(CapabilitySet::AB, ConformanceLevel::Fhd);
		let r = Tr08Capability::new(CapabilitySet::D, ConformanceLevel::Uhd1);
		assert!(!is_compatible(&s, &r));
	}

	#[test]
	fn null_only_matches_null() {
		let raw = Tr08Capability::raw();
		assert!(is_compatible(&raw, &raw));
		let ab = Tr08Capability::new(CapabilitySet::AB, ConformanceLevel::Fhd);
		assert!(!is_compatible(&raw, &ab));
		assert!(!is_compatible(&ab, &raw));
	}

	#[test]
	fn capability_wire_names() {
		let v = serde_json::to_value(Tr08Capability::new(CapabilitySet::AB, ConformanceLevel::Uhd1)).unwrap();
		assert_eq!(v, json!({"capability_set": "A/B", "conformance_level": "UHD1"}));
	}

	#[test]
	fn uhd_420_constraints_and_components() {
		let mut p = FormatParams::raw(3840, 2160, "60000/1001");
		p.sampling = "YCbCr-4:2:0".into();
		let set = generate_constraint_set(&p).unwrap();
		let v = serde_json::to_value(&set).unwrap();
		assert_eq!(v[CAP_COLOR_SAMPLING], json!({"enum": ["YCbCr-4:2:0"]}));
		assert_eq!(v[CAP_GRAIN_RATE], json!({"enum": [{"numerator": 60000, "denominator": 1001}]}));
		assert!(!set.contains(CAP_PROFILE));

		let flow = generate_flow_params(&p).unwrap();
		let comps = flow.components.unwrap();
		assert_eq!((comps[0].width, comps[0].height), (3840, 2160));
		assert_eq!((comps[1].name.as_str(), comps[1].width, comps[1].height), ("Cb", 1920, 1080));
		assert_eq!((comps[2].name.as_str(), comps[2].width, comps[2].height), ("Cr", 1920, 1080));
	}

	#[test]
	fn bare_frame_rate_and_interlace() {
		let mut p = FormatParams::raw(1920, 1080, "50");
		p.interlace = true;
		let v = serde_json::to_value(generate_constraint_set(&p).unwrap()).unwrap();
		assert_eq!(v[CAP_GRAIN_RATE]["enum"][0], json!({"numerator": 50, "denominator": 1}));
		assert_eq!(v[CAP_INTERLACE_MODE], json!({"enum": ["interlaced_bff", "interlaced_tff", "interlaced_psf"]}));
	}

	#[test]
	fn codec_keys_need_profile_and_level() {
		let mut p = catalogue().into_iter().find(|p| p.id == "1a").unwrap().format;
		let set = generate_constraint_set(&p).unwrap();
		for key in [CAP_PROFILE, CAP_LEVEL, CAP_SUBLEVEL, CAP_BIT_RATE, CAP_PACKET_TRANSMISSION_MODE, CAP_ST2110_21_SENDER_TYPE] {
			assert!(set.contains(key), "{key}");
		}
		assert_eq!(serde_json::to_value(set.get(CAP_BIT_RATE).unwrap()).unwrap(), json!({"minimum": 100000, "maximum": 200000}));
		p.level = None;
		let set = generate_constraint_set(&p).unwrap();
		assert!(!set.contains(CAP_PROFILE));
		assert!(!set.contains(CAP_BIT_RATE));
	}

	#[test]
	fn unknown_sampling_omits_components() {
		let mut p = FormatParams::raw(1920, 1080, "25");
		p.sampling = "YCbCr-4:1:1".into();
		assert!(generate_flow_params(&p).unwrap().components.is_none());
		let v: Value = serde_json::to_value(generate_constraint_set(&p).unwrap()).unwrap();
		assert_eq!(v[CAP_COLOR_SAMPLING]["enum"][0], "YCbCr-4:1:1");
	}

	#[test]
	fn shuffle_is_seeded() {
		let a: Vec<String> = shuffled_catalogue(&mut StdRng::seed_from_u64(3)).into_iter().map(|p| p.id).collect();
		let b: Vec<String> = shuffled_catalogue(&mut StdRng::seed_from_u64(3)).into_iter().map(|p| p.id).collect();
		assert_eq!(a, b);
		assert_eq!(a.len(), catalogue().len());
	}
}
