//! service-core: Shared infrastructure for the person stream service and client.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

