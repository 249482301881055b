//! s3conduit - asynchronous S3 client over a bounded pool of keep-alive channels

pub mod auth;
pub mod cli;
pub mod config;
pub mod http;
pub mod pool;
pub mod s3;
pub mod xml;

pub use auth::{Credentials, CredentialsProvider, EnvCredentialsProvider, StaticCredentialsProvider};
pub use config::{ClientConfig, Config};
pub use s3::{S3Client, S3Error};
