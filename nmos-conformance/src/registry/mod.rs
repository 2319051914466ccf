//! Registration and Query API access for the test harness: an HTTP client
//! for talking to an implementation under test, and an in-process mock
//! registry for Nodes to register into.

pub mod client;
pub mod mock;

pub use client::{HttpRegistryClient, QueryApi, RegistrationApi};
pub use mock::{DeleteRecord, HeartbeatRecord, MockRegistry, MockRegistryServer, PostRecord, RequestHistory};
