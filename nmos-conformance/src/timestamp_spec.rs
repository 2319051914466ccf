//! Ranges of acceptable version timestamps.
//!
//! The tester can only bracket the moment a registry stamped a resource
//! (local clock readings taken before and after the request), so expected
//! paging cursors are ranges with an optional most-likely value.

use nmos_core::Version;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionSpec {
	/// Inclusive lower bound, `None` is unbounded.
	pub lower: Option<Version>,
	/// Most likely value, informational only.
	pub recommended: Option<Version>,
	/// Inclusive upper bound, `None` is unbounded.
	pub upper: Option<Version>,
}

impl VersionSpec {
	/// Exactly `v`.
	pub fn required(v: Version) -> Self { Self { lower: Some(v), recommended: Some(v), upper: Some(v) } }

	pub fn recommended(lower: Version, recommended: Option<Version>, upper: Version) -> Self {
		Self { lower: Some(lower), recommended, upper: Some(upper) }
	}

	/// Anything in `[lower, upper]`.
	pub fn permitted(lower: Version, upper: Version) -> Self { Self { lower: Some(lower), recommended: None, upper: Some(upper) } }

	pub fn epoch() -> Self { Self::required(Version::EPOCH) }

	/// Exactly the lower bound of `ts`.
	pub fn lower(ts: &VersionSpec) -> Self { Self::point(ts.lower) }

	/// Exactly the upper bound of `ts`.
	pub fn upper(ts: &VersionSpec) -> Self { Self::point(ts.upper) }

	/// Anything up to the lower bound of `ts`.
	pub fn lt(ts: &VersionSpec) -> Self { Self { lower: None, recommended: None, upper: ts.lower } }

	/// Anything up to the upper bound of `ts`.
	pub fn le(ts: &VersionSpec) -> Self { Self { lower: None, recommended: None, upper: ts.upper } }

	/// Anything from the upper bound of `ts`.
	pub fn gt(ts: &VersionSpec) -> Self { Self { lower: ts.upper, recommended: None, upper: None } }

	/// Anything from the lower bound of `ts`.
	pub fn ge(ts: &VersionSpec) -> Self { Self { lower: ts.lower, recommended: None, upper: None } }

	/// Lower bound of `lower`, recommended value of `recommended` and upper
	/// bound of `upper`; a missing part leaves that side open.
	pub fn extended(lower: Option<&VersionSpec>, recommended: Option<&VersionSpec>, upper: Option<&VersionSpec>) -> Self {
		Self {
			lower: lower.and_then(|t| t.lower),
			recommended: recommended.and_then(|t| t.recommended),
			upper: upper.and_then(|t| t.upper),
		}
	}

	fn point(v: Option<Version>) -> Self { Self { lower: v, recommended: v, upper: v } }

	pub fn contains(&self, v: &Version) -> bool {
		self.lower.map_or(true, |l| l <= *v) && self.upper.map_or(true, |u| *v <= u)
	}

	/// Value to send as a paging cursor: the upper bound.
	pub fn cursor(&self) -> Option<Version> { self.upper }
}

impl fmt::Display for VersionSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let show = |v: Option<Version>| v.map(|v| v.to_string()).unwrap_or_default();
		match self.recommended {
			Some(r) if self.lower != self.upper || self.lower.is_none() => {
				write!(f, "{} -({})- {}", show(self.lower), r, show(self.upper))
			}
			_ => write!(f, "{} - {}", show(self.lower), show(self.upper)),
		}
	}
}
