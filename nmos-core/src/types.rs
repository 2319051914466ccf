use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Default Query API page size when `paging.limit` is not given.
pub const DEFAULT_PAGING_LIMIT: u32 = 10;

/// Maximum page size a registry is expected to honour.
pub const MAX_PAGING_LIMIT: u32 = 100;

/// Registry garbage-collection interval for nodes that stop heartbeating.
pub const GARBAGE_COLLECTION_SECS: u64 = 12;

/// The six IS-04 resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
	Node,
	Device,
	Source,
	Flow,
	Sender,
	Receiver,
}

impl ResourceType {
	pub const ALL: [ResourceType; 6] = [
		ResourceType::Node,
		ResourceType::Device,
		ResourceType::Source,
		ResourceType::Flow,
		ResourceType::Sender,
		ResourceType::Receiver,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			ResourceType::Node => "node",
			ResourceType::Device => "device",
			ResourceType::Source => "source",
			ResourceType::Flow => "flow",
			ResourceType::Sender => "sender",
			ResourceType::Receiver => "receiver",
		}
	}

	/// Path segment used by both Registration and Query APIs (`nodes`, `flows`, ...).
	pub fn plural(&self) -> &'static str {
		match self {
			ResourceType::Node => "nodes",
			ResourceType::Device => "devices",
			ResourceType::Source => "sources",
			ResourceType::Flow => "flows",
			ResourceType::Sender => "senders",
			ResourceType::Receiver => "receivers",
		}
	}

	pub fn from_plural(s: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|t| t.plural() == s)
	}

	/// Resource type that must be registered before this one.
	pub fn parent(&self) -> Option<ResourceType> {
		match self {
			ResourceType::Node => None,
			ResourceType::Device => Some(ResourceType::Node),
			ResourceType::Source | ResourceType::Flow | ResourceType::Sender | ResourceType::Receiver => {
				Some(ResourceType::Device)
			}
		}
	}

	/// Resource type recommended to precede this one, when different from the parent.
	pub fn preceding(&self) -> Option<ResourceType> {
		match self {
			ResourceType::Flow => Some(ResourceType::Source),
			ResourceType::Sender => Some(ResourceType::Flow),
			_ => None,
		}
	}
}

impl fmt::Display for ResourceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ResourceType {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Self::ALL
			.into_iter()
			.find(|t| t.as_str() == s)
			.ok_or_else(|| Error::protocol(format!("unknown resource type: {s}")))
	}
}

/// A rational number such as a grain rate (`60000/1001`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
	pub numerator: u64,
	#[serde(default = "one")]
	pub denominator: u64,
}

fn one() -> u64 { 1 }

impl Rational {
	pub fn new(numerator: u64, denominator: u64) -> Self { Self { numerator, denominator } }
}

impl fmt::Display for Rational {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.denominator == 1 {
			write!(f, "{}", self.numerator)
		} else {
			write!(f, "{}/{}", self.numerator, self.denominator)
		}
	}
}

impl FromStr for Rational {
	type Err = Error;

	/// Parses `"N/D"` or a bare `"N"` (denominator 1).
	fn from_str(s: &str) -> Result<Self> {
		let invalid = || Error::protocol(format!("invalid rational: {s:?}"));
		let (n, d) = match s.trim().split_once('/') {
			Some((n, d)) => (n.trim(), d.trim()),
			None => (s.trim(), "1"),
		};
		let numerator = n.parse::<u64>().map_err(|_| invalid())?;
		let denominator = d.parse::<u64>().map_err(|_| invalid())?;
		if denominator == 0 {
			return Err(invalid());
		}
		Ok(Self { numerator, denominator })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plural_round_trip() {
		for t in ResourceType::ALL {
			assert_eq!(ResourceType::from_plural(t.plural()), Some(t));
			assert_eq!(t.as_str().parse::<ResourceType>().unwrap(), t);
		}
		assert_eq!(ResourceType::from_plural("subscriptions"), None);
	}

	#[test]
	fn parents() {
		assert_eq!(ResourceType::Node.parent(), None);
		assert_eq!(ResourceType::Flow.parent(), Some(ResourceType::Device));
		assert_eq!(ResourceType::Flow.preceding(), Some(ResourceType::Source));
		assert_eq!(ResourceType::Receiver.preceding(), None);
	}

	#[test]
	fn rational_parse() {
		assert_eq!("60000/1001".parse::<Rational>().unwrap(), Rational::new(60000, 1001));
		assert_eq!("50".parse::<Rational>().unwrap(), Rational::new(50, 1));
		assert!("25/0".parse::<Rational>().is_err());
		assert!("x/2".parse::<Rational>().is_err());
	}
}
