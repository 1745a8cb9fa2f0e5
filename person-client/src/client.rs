//! Streaming HTTP client for person-service.
//!
//! Responses are decoded line by line as bytes arrive, so records are yielded
//! while the server is still writing. Query endpoints return one JSON object
//! per line; `/stream` returns server-sent events.

use crate::error::ClientError;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

pub const STREAM_JSON: &str = "application/stream+json";
pub const EVENT_STREAM: &str = "text/event-stream";

/// Longest line accepted from the server before the stream fails.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Person {
    pub id: Option<String>,
    pub name: String,
}

impl std::fmt::Display for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Person(id={}, name={})",
            self.id.as_deref().unwrap_or("null"),
            self.name
        )
    }
}

pub type PersonStream = BoxStream<'static, Result<Person, ClientError>>;

#[derive(Clone)]
pub struct PersonClient {
    http: reqwest::Client,
    base_url: Url,
}

impl PersonClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Config(format!("invalid base url '{}': {}", base_url, e)))?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /?name=<name>`
    pub async fn find_by_name(&self, name: &str) -> Result<PersonStream, ClientError> {
        self.query(self.base_url.clone(), name).await
    }

    /// `GET /rx?name=<name>`
    pub async fn find_by_name_rx(&self, name: &str) -> Result<PersonStream, ClientError> {
        self.query(self.endpoint("rx")?, name).await
    }

    /// `GET /stream`: every stored person, then new ones as they are inserted.
    pub async fn follow(&self) -> Result<PersonStream, ClientError> {
        let response = self.get(self.endpoint("stream")?, EVENT_STREAM).await?;

        let persons = lines(response)
            .scan(SseDecoder::default(), |decoder, line| {
                let item = match line {
                    Ok(line) => decoder.push_line(&line).map(|data| decode(&data)),
                    Err(e) => Some(Err(e)),
                };
                futures::future::ready(Some(item))
            })
            .filter_map(futures::future::ready);

        Ok(persons.boxed())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Config(format!("invalid endpoint '{}': {}", path, e)))
    }

    async fn query(&self, mut url: Url, name: &str) -> Result<PersonStream, ClientError> {
        url.query_pairs_mut().append_pair("name", name);
        let response = self.get(url, STREAM_JSON).await?;

        let persons = lines(response).try_filter_map(|line| async move {
            if line.trim().is_empty() {
                return Ok(None);
            }
            decode(&line).map(Some)
        });

        Ok(persons.boxed())
    }

    async fn get(&self, url: Url, accept: &str) -> Result<reqwest::Response, ClientError> {
        tracing::debug!(url = %url, "Requesting person stream");

        let response = self.http.get(url).header(ACCEPT, accept).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "person-service returned an error");
            return Err(ClientError::Status { status, body });
        }

        Ok(response)
    }
}

fn decode(json: &str) -> Result<Person, ClientError> {
    Ok(serde_json::from_str(json)?)
}

fn lines(response: reqwest::Response) -> impl Stream<Item = Result<String, ClientError>> + Send {
    let bytes = response.bytes_stream().map_err(std::io::Error::other);
    FramedRead::new(
        StreamReader::new(bytes),
        LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
    )
    .map_err(ClientError::from)
}

/// Collects `data:` fields until the blank line that ends an event.
#[derive(Debug, Default)]
struct SseDecoder {
    data: Vec<String>,
}

impl SseDecoder {
    fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data).join("\n"));
        }

        // Comment lines carry keep-alives
        if line.starts_with(':') {
            return None;
        }

        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_sse(body: &str) -> Vec<Result<Person, ClientError>> {
        let mut decoder = SseDecoder::default();
        body.lines()
            .chain(std::iter::once(""))
            .filter_map(|line| decoder.push_line(line).map(|data| decode(&data)))
            .collect()
    }

    #[test]
    fn test_sse_decoder_joins_event() {
        let mut decoder = SseDecoder::default();
        assert_eq!(decoder.push_line(":keep-alive"), None);
        assert_eq!(decoder.push_line("data: {\"id\":\"1\","), None);
        assert_eq!(decoder.push_line("data: \"name\":\"Jon\"}"), None);
        assert_eq!(
            decoder.push_line(""),
            Some("{\"id\":\"1\",\n\"name\":\"Jon\"}".to_string())
        );
        assert_eq!(decoder.push_line(""), None);
    }

    #[test]
    fn test_decode_sse_body() {
        let body = "data: {\"id\":\"a\",\"name\":\"Sansa\"}\n\n:\n\ndata:{\"id\":\"b\",\"name\":\"Bran\"}\n\n";
        let persons: Vec<Person> = decode_sse(body).into_iter().map(|p| p.unwrap()).collect();

        assert_eq!(persons.len(), 2);
        assert_eq!(persons[0].name, "Sansa");
        assert_eq!(persons[1].id.as_deref(), Some("b"));
    }

    #[test]
    fn test_display() {
        let person = Person {
            id: Some("abc".to_string()),
            name: "Eddard".to_string(),
        };
        assert_eq!(person.to_string(), "Person(id=abc, name=Eddard)");
    }

    #[test]
    fn test_endpoint_join() {
        let client = PersonClient::new("http://localhost:8080/").unwrap();
        assert_eq!(
            client.endpoint("rx").unwrap().as_str(),
            "http://localhost:8080/rx"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            PersonClient::new("not a url"),
            Err(ClientError::Config(_))
        ));
    }
}
