//! kith-cloud: signed HTTP client for the cloud face-comparison API.
//!
//! Request signing is a pure function in [`sigv4`]; [`client`] owns the
//! wire format, the error taxonomy and the bounded comparison fan-out.

pub mod client;
pub mod credentials;
pub mod sigv4;

pub use client::{CloudCapability, CloudError, CloudMatch, CloudMatcher, MatchBudget};
pub use credentials::CloudCredentials;
