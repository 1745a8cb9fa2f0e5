use crate::error::ClientError;
use service_core::config::{get_env, get_env_parsed, is_prod};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    /// `GET /?name=`
    Query,
    /// `GET /rx?name=`
    Rx,
    /// `GET /stream`, runs until the server closes the connection.
    Follow,
}

impl FromStr for ClientMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "query" => Ok(ClientMode::Query),
            "rx" => Ok(ClientMode::Rx),
            "follow" | "stream" => Ok(ClientMode::Follow),
            other => Err(ClientError::Config(format!("unknown client mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub name: String,
    pub mode: ClientMode,
    pub otlp_endpoint: Option<String>,
}

impl ClientConfig {
    pub fn load() -> Result<Self, ClientError> {
        let is_prod = is_prod();

        Ok(Self {
            base_url: get_env("PERSON_SERVICE_URL", Some("http://localhost:8080/"), is_prod)?,
            name: get_env("PERSON_NAME", Some("Eddard"), false)?,
            mode: get_env_parsed("CLIENT_MODE", ClientMode::Query)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
        })
    }
}
