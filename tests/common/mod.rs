//! Common test utilities for media-dl end-to-end tests

#[allow(dead_code)]
pub mod assertions;
#[allow(dead_code)]
pub mod config;
#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use config::*;
#[allow(unused_imports)]
pub use fixtures::*;
