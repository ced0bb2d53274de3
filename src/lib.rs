//! Core library for the Katze adoption platform service.
//!
//! The `adoption` module carries the application-evaluation pipeline and the
//! post-adoption tracking scheduler; `config`, `telemetry`, and `error` hold
//! the service plumbing shared by the binary.

pub mod adoption;
pub mod config;
pub mod error;
pub mod telemetry;
