//! Request authentication
//!
//! This module provides:
//! - Credentials and the provider contract polled once per signed request
//! - The operation catalog (HTTP verb + canonical resource rule per operation)
//! - The legacy `AWS <key>:<signature>` HMAC-SHA1 signature calculator

pub mod credentials;
pub mod operation;
pub mod signer;

pub use credentials::{
    Credentials, CredentialsError, CredentialsProvider, EnvCredentialsProvider,
    StaticCredentialsProvider,
};
pub use operation::Operation;
pub use signer::{SignatureCalculator, SignedHeaders, SigningInput, HEADER_SECURITY_TOKEN};
