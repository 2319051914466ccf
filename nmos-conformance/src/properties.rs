//! Ordering properties of version sequences.

use nmos_core::Version;

/// Errors from ordering checks over version sequences.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MonotonicError {
	/// Sequence is not strictly increasing at index `idx` (prev, next).
	#[error("not strictly increasing at {idx}: {prev} -> {next}")]
	NotIncreasing { idx: usize, prev: Version, next: Version },
}

/// Check that each version is strictly greater than the one before.
pub fn check_strictly_increasing(a: &[Version]) -> Result<(), MonotonicError> {
	for (i, w) in a.windows(2).enumerate() {
		if w[0] >= w[1] {
			return Err(MonotonicError::NotIncreasing { idx: i, prev: w[0], next: w[1] });
		}
	}
	Ok(())
}
