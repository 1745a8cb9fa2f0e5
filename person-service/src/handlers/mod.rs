//! HTTP handlers for person-service.

pub mod health;
pub mod persons;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use persons::{flux_persons, rx_persons, stream_persons, NameQuery, STREAM_JSON};
