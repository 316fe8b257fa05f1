//! Common functionality for the trust center.
//!
//! This crate holds everything except the edge entry point: request handling, the signing and
//! storage seams with their Fastly implementations, and configuration. Handlers produce plain
//! [`http`] responses so the whole flow can be exercised in native tests.
//!
//! # Modules
//!
//! - [`constants`]: Header names, caller facing messages and store key prefixes
//! - [`digest`]: SHA-256 content digests and signature input decoding
//! - [`error`]: Error types and HTTP mapping
//! - [`fastly_storage`]: Fastly Secret Store and KV Store access
//! - [`models`]: Issuance and verification records
//! - [`settings`]: Configuration management and validation
//! - [`settings_data`]: Embedded configuration
//! - [`signing`]: Signing backend abstraction and the ECDSA backend
//! - [`storage`]: Issuance record storage abstraction
//! - [`test_support`]: Testing utilities and mocks
//! - [`trust_center`]: Issuance, duplicate guard, verification and endpoints

pub mod constants;
pub mod digest;
pub mod error;
pub mod fastly_storage;
pub mod models;
pub mod settings;
pub mod settings_data;
pub mod signing;
pub mod storage;
pub mod trust_center;
