//! jarsig - signer sets of signed Java archives
//!
//! Determines the set of identities whose signatures cover every content
//! entry of a JAR, rejecting archives whose entries disagree or whose
//! signatures fail verification. Trust decisions about the returned
//! identities are left to the caller.

pub mod collector;
pub mod config;
pub mod error;
pub mod identity;

pub use collector::{collect_signers, JarSignatureCollector, SignerSet};
pub use config::{CollectorConfig, ConfigError, LimitsConfig};
pub use error::{CollectError, CollectResult, SignerMismatchError};
pub use identity::SignerIdentity;
pub use jarsig_verify::{CertificateChain, JarError, SecurityFailure};
