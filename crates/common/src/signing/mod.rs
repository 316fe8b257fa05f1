//! Signing backend abstraction.
//!
//! The trust center never holds key material itself; it asks a [`SigningBackend`] to sign or
//! verify a digest under a key identifier. [`EcdsaSigningBackend`] is the in-process backend
//! loading its keys from a Fastly Secret Store.

pub mod backend;
pub mod ecdsa;
pub mod metadata;

pub use backend::*;
pub use ecdsa::*;
pub use metadata::*;
