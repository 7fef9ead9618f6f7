//! Vigil server library surface
//!
//! Exposes the HTTP API and the reporting subsystems so the binary and the
//! integration tests share one implementation.

pub mod http;
pub mod subsystems;
