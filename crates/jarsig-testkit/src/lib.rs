//! Fixture tooling for jarsig tests
//!
//! Generates signing keys with self-signed certificates and builds JARs the
//! way `jar` and `jarsigner` do, so verification can be exercised against
//! realistic archives: signing is additive, an update keeps the existing
//! manifest, and signing again refreshes stale manifest digests.
//!
//! Entries are stored uncompressed so tests can corrupt payload bytes in
//! place.

mod error;
mod jar;
mod keys;
mod manifest;
mod pkcs7;

pub use error::{FixtureError, FixtureResult};
pub use jar::{corrupt_payload, create_jar, sign_jar, update_jar, FixtureEntry};
pub use keys::{KeyAlgorithm, TestSigner};
pub use pkcs7::{sign_detached, sign_detached_with_signed_attributes};
