//! Common test utilities and fixtures for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: Fixture loaders and settings factories
//! - `logger`: Structured test logging infrastructure

pub mod fixtures;
pub mod logger;
