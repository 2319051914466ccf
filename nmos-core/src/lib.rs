//! Core NMOS types shared by the conformance suites and the CLI.

pub mod caps;
pub mod compliance;
pub mod config;
pub mod error;
pub mod resource;
pub mod types;
pub mod version;

pub use config::TestConfig;
pub use error::{Error, Result};
pub use resource::{RegistrationRequest, Resource};
pub use types::{Rational, ResourceType};
pub use version::{ApiVersion, Version};
