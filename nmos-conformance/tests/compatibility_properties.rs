//! Property tests for the TR-08 compatibility table and the constraint sets
//! derived from the interop catalogue.

use nmos_conformance::compatibility::{catalogue, generate_constraint_set, generate_flow_params};
use nmos_conformance::{is_compatible, CapabilitySet, ConformanceLevel, Tr08Capability};
use nmos_core::caps::*;
use proptest::prelude::*;
use serde_json::{json, Value};

fn set_strategy() -> impl Strategy<Value = CapabilitySet> {
	prop_oneof![Just(CapabilitySet::AB), Just(CapabilitySet::C), Just(CapabilitySet::D)]
}

fn level_strategy() -> impl Strategy<Value = ConformanceLevel> {
	prop_oneof![Just(ConformanceLevel::Fhd), Just(ConformanceLevel::Uhd1), Just(ConformanceLevel::Uhd2)]
}

fn capability_strategy() -> impl Strategy<Value = Tr08Capability> {
	prop_oneof![
		1 => Just(Tr08Capability::raw()),
		6 => (set_strategy(), level_strategy()).prop_map(|(s, l)| Tr08Capability::new(s, l)),
	]
}

fn rank(set: CapabilitySet) -> u8 {
	match set {
		CapabilitySet::AB => 0,
		CapabilitySet::C => 1,
		CapabilitySet::D => 2,
	}
}

proptest! {
	#[test]
	fn every_capability_receives_itself(cap in capability_strategy()) {
		prop_assert!(is_compatible(&cap, &cap));
	}

	#[test]
	fn level_mismatch_never_interoperates(s in set_strategy(), r in set_strategy(), a in level_strategy(), b in level_strategy()) {
		prop_assume!(a != b);
		prop_assert!(!is_compatible(&Tr08Capability::new(s, a), &Tr08Capability::new(r, b)));
	}

	/// At one level, a receiver accepts exactly the senders of its own set or a lower one.
	#[test]
	fn receiver_accepts_lower_sets(s in set_strategy(), r in set_strategy(), l in level_strategy()) {
		let ok = is_compatible(&Tr08Capability::new(s, l), &Tr08Capability::new(r, l));
		prop_assert_eq!(ok, rank(s) <= rank(r));
	}

	#[test]
	fn raw_and_jpeg_xs_never_mix(cap in capability_strategy()) {
		let raw = Tr08Capability::raw();
		let expected = cap == raw;
		prop_assert_eq!(is_compatible(&raw, &cap), expected);
		prop_assert_eq!(is_compatible(&cap, &raw), expected);
	}
}

/// A receiver built from an interop point admits the flow built from the same point.
#[test]
fn catalogue_constraints_admit_their_own_flow() {
	for point in catalogue() {
		let set = generate_constraint_set(&point.format).unwrap();
		let flow = generate_flow_params(&point.format).unwrap();
		let checks: Vec<(&str, Value)> = vec![
			(CAP_MEDIA_TYPE, json!(flow.media_type)),
			(CAP_FRAME_WIDTH, json!(flow.frame_width)),
			(CAP_FRAME_HEIGHT, json!(flow.frame_height)),
			(CAP_INTERLACE_MODE, json!(flow.interlace_mode)),
			(CAP_GRAIN_RATE, json!({"numerator": flow.grain_rate.numerator, "denominator": flow.grain_rate.denominator})),
		];
		for (urn, value) in checks {
			let constraint = set.get(urn).unwrap();
			assert!(constraint.admits(&value), "{} {urn} {value}", point.id);
		}
		if let Some(rate) = flow.bit_rate {
			assert!(set.get(CAP_BIT_RATE).unwrap().admits(&json!(rate)), "{}", point.id);
		}
		assert_eq!(point.format.is_codec(), set.contains(CAP_PROFILE), "{}", point.id);
	}
}
