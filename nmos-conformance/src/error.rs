use thiserror::Error;

pub type Result<T, E = ConformanceError> = core::result::Result<T, E>;

/// Errors raised by the harness itself, as opposed to verdicts about the
/// implementation under test.
#[derive(Debug, Error)]
pub enum ConformanceError {
	#[error(transparent)]
	Core(#[from] nmos_core::Error),
	#[error("http: {0}")]
	Http(#[from] reqwest::Error),
	#[error("io: {0}")]
	Io(#[from] std::io::Error),
	/// Suite set-up failed; nothing can be run.
	#[error("initialisation failed: {0}")]
	Init(String),
	/// Exchange with the interactive oracle failed or timed out.
	#[error("oracle: {0}")]
	Oracle(String),
}

impl ConformanceError {
	pub fn init(msg: impl Into<String>) -> Self { Self::Init(msg.into()) }
	pub fn oracle(msg: impl Into<String>) -> Self { Self::Oracle(msg.into()) }
}

impl From<serde_json::Error> for ConformanceError {
	fn from(e: serde_json::Error) -> Self { Self::Core(nmos_core::Error::from(e)) }
}
