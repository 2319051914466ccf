//! Resource version timestamps.
//!
//! NMOS resources carry a `version` of the form `<seconds>:<nanoseconds>` in
//! TAI. The same representation is used for Query API paging cursors
//! (`paging.since`, `paging.until`, `X-Paging-Since`, `X-Paging-Until`), so
//! ordering must always be numeric, never lexical.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

/// UTC second at which each leap second took effect, paired with TAI - UTC
/// from that moment on. Most recent first.
const UTC_LEAP: &[(i64, i64)] = &[
	(1_483_228_800, 37), // 1 Jan 2017
	(1_435_708_800, 36), // 1 Jul 2015
	(1_341_100_800, 35), // 1 Jul 2012
	(1_230_768_000, 34), // 1 Jan 2009
	(1_136_073_600, 33), // 1 Jan 2006
	(915_148_800, 32),   // 1 Jan 1999
	(867_715_200, 31),   // 1 Jul 1997
	(820_454_400, 30),   // 1 Jan 1996
	(63_072_000, 10),    // 1 Jan 1972
];

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A TAI timestamp with nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
	seconds: u64,
	nanoseconds: u32,
}

impl Version {
	/// `0:0`, the start of every paging window.
	pub const EPOCH: Version = Version { seconds: 0, nanoseconds: 0 };

	pub fn new(seconds: u64, nanoseconds: u32) -> Result<Self> {
		if nanoseconds >= NANOS_PER_SEC {
			return Err(Error::InvalidVersion(format!("{seconds}:{nanoseconds}")));
		}
		Ok(Self { seconds, nanoseconds })
	}

	pub fn seconds(&self) -> u64 { self.seconds }
	pub fn nanoseconds(&self) -> u32 { self.nanoseconds }

	/// Current TAI time, optionally shifted by `offset` seconds.
	pub fn now_tai(offset: f64) -> Self {
		let now = chrono::Utc::now();
		let mut secs = now.timestamp();
		let mut nanos = i64::from(now.timestamp_subsec_nanos());
		if offset != 0.0 {
			let shift = (offset * f64::from(NANOS_PER_SEC)).round() as i64;
			let total = nanos + shift;
			secs += total.div_euclid(i64::from(NANOS_PER_SEC));
			nanos = total.rem_euclid(i64::from(NANOS_PER_SEC));
		}
		Self::from_utc(secs, nanos as u32)
	}

	/// Convert a UTC instant into TAI using the leap second table.
	pub fn from_utc(secs: i64, nanos: u32) -> Self {
		let leap = UTC_LEAP.iter().find(|(utc, _)| secs >= *utc).map(|(_, l)| *l).unwrap_or(0);
		let tai = (secs + leap).max(0) as u64;
		Self { seconds: tai, nanoseconds: nanos.min(NANOS_PER_SEC - 1) }
	}

	/// The smallest version strictly greater than `self`.
	pub fn successor(&self) -> Self {
		if self.nanoseconds + 1 == NANOS_PER_SEC {
			Self { seconds: self.seconds + 1, nanoseconds: 0 }
		} else {
			Self { seconds: self.seconds, nanoseconds: self.nanoseconds + 1 }
		}
	}

	pub fn saturating_add(&self, d: Duration) -> Self {
		let total = u64::from(self.nanoseconds) + u64::from(d.subsec_nanos());
		Self {
			seconds: self.seconds.saturating_add(d.as_secs()).saturating_add(total / u64::from(NANOS_PER_SEC)),
			nanoseconds: (total % u64::from(NANOS_PER_SEC)) as u32,
		}
	}

	/// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
	pub fn duration_since(&self, earlier: &Version) -> Duration {
		if self <= earlier {
			return Duration::ZERO;
		}
		let a = Duration::new(self.seconds, self.nanoseconds);
		let b = Duration::new(earlier.seconds, earlier.nanoseconds);
		a.saturating_sub(b)
	}
}

impl fmt::Display for Version {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.seconds, self.nanoseconds)
	}
}

impl FromStr for Version {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		let invalid = || Error::InvalidVersion(s.to_string());
		let (secs, nanos) = s.trim().split_once(':').ok_or_else(invalid)?;
		if secs.is_empty() || nanos.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) || !nanos.bytes().all(|b| b.is_ascii_digit()) {
			return Err(invalid());
		}
		let seconds = secs.parse::<u64>().map_err(|_| invalid())?;
		let nanoseconds = nanos.parse::<u32>().map_err(|_| invalid())?;
		Version::new(seconds, nanoseconds).map_err(|_| invalid())
	}
}

impl TryFrom<String> for Version {
	type Error = Error;
	fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<Version> for String {
	fn from(v: Version) -> Self { v.to_string() }
}

/// An IS-04 style API version, e.g. `v1.3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
	pub major: u16,
	pub minor: u16,
}

impl ApiVersion {
	pub const V1_0: ApiVersion = ApiVersion { major: 1, minor: 0 };
	pub const V1_1: ApiVersion = ApiVersion { major: 1, minor: 1 };
	pub const V1_3: ApiVersion = ApiVersion { major: 1, minor: 3 };
	pub const V2_0: ApiVersion = ApiVersion { major: 2, minor: 0 };
}

impl fmt::Display for ApiVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "v{}.{}", self.major, self.minor)
	}
}

impl FromStr for ApiVersion {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		let invalid = || Error::InvalidApiVersion(s.to_string());
		let body = s.trim().strip_prefix('v').ok_or_else(invalid)?;
		let (major, minor) = body.split_once('.').ok_or_else(invalid)?;
		Ok(Self {
			major: major.parse().map_err(|_| invalid())?,
			minor: minor.parse().map_err(|_| invalid())?,
		})
	}
}

impl TryFrom<String> for ApiVersion {
	type Error = Error;
	fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<ApiVersion> for String {
	fn from(v: ApiVersion) -> Self { v.to_string() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_and_display() {
		let v: Version = "1439299836:10".parse().unwrap();
		assert_eq!(v.seconds(), 1439299836);
		assert_eq!(v.nanoseconds(), 10);
		assert_eq!(v.to_string(), "1439299836:10");
	}

	#[test]
	fn ordering_is_numeric() {
		let a: Version = "9:999999999".parse().unwrap();
		let b: Version = "10:0".parse().unwrap();
		assert!(a < b);
		let c: Version = "10:5".parse().unwrap();
		let d: Version = "10:40".parse().unwrap();
		assert!(c < d);
	}

	#[test]
	fn rejects_malformed() {
		for bad in ["", "10", "10:", ":5", "a:b", "1:1000000000", "-1:0", "1:2:3"] {
			assert!(bad.parse::<Version>().is_err(), "{bad}");
		}
	}

	#[test]
	fn successor_carries() {
		let v = Version::new(5, 999_999_999).unwrap();
		assert_eq!(v.successor(), Version::new(6, 0).unwrap());
		assert!(Version::EPOCH < Version::EPOCH.successor());
	}

	#[test]
	fn utc_to_tai_applies_leap_seconds() {
		assert_eq!(Version::from_utc(1_500_000_000, 0).seconds(), 1_500_000_037);
		assert_eq!(Version::from_utc(1_440_000_000, 0).seconds(), 1_440_000_036);
	}

	#[test]
	fn serde_as_string() {
		let v = Version::new(12, 34).unwrap();
		let s = serde_json::to_string(&v).unwrap();
		assert_eq!(s, "\"12:34\"");
		let back: Version = serde_json::from_str(&s).unwrap();
		assert_eq!(back, v);
	}

	#[test]
	fn api_version_compare() {
		let a: ApiVersion = "v1.3".parse().unwrap();
		assert!(a > ApiVersion::V1_1);
		assert!(a < ApiVersion::V2_0);
		assert_eq!(a.to_string(), "v1.3");
		assert!("1.3".parse::<ApiVersion>().is_err());
	}
}
