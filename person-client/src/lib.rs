pub mod client;
pub mod config;
pub mod error;

pub use client::{Person, PersonClient, PersonStream};
pub use config::{ClientConfig, ClientMode};
pub use error::ClientError;
