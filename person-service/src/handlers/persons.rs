use crate::models::{Person, PersonResponse};
use crate::services::metrics::record_stream_opened;
use crate::services::PersonStream;
use crate::startup::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{Stream, StreamExt, TryStreamExt};
use serde::Deserialize;
use service_core::error::AppError;

/// Content type of newline-delimited JSON person streams.
pub const STREAM_JSON: &str = "application/stream+json";

#[derive(Debug, Default, Deserialize)]
pub struct NameQuery {
    #[serde(default)]
    pub name: String,
}

/// `GET /?name=` persons with the given name.
pub async fn flux_persons(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NameQuery>,
) -> Result<Response, AppError> {
    tracing::info!(name = %query.name, "Streaming persons by name");
    record_stream_opened("flux");

    let persons = state.repository.find_all_by_name(&query.name).await?;
    render(persons, &headers).await
}

/// `GET /rx?name=` same query, delivered through the channel adapter.
pub async fn rx_persons(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NameQuery>,
) -> Result<Response, AppError> {
    tracing::info!(name = %query.name, "Streaming persons by name (channel adapter)");
    record_stream_opened("rx");

    let persons = state.repository.find_by_name(&query.name).await?;
    render(persons.boxed(), &headers).await
}

/// `GET /stream` tails the collection as server-sent events.
pub async fn stream_persons(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, AppError>>>, AppError> {
    tracing::info!("Opening person tail");
    record_stream_opened("stream");

    let events = state.repository.tail().await?.map(|item| {
        item.and_then(|person| {
            Event::default()
                .json_data(PersonResponse::from(person))
                .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))
        })
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn render(persons: PersonStream, headers: &HeaderMap) -> Result<Response, AppError> {
    if wants_json_array(headers) {
        let all: Vec<PersonResponse> = persons.map_ok(PersonResponse::from).try_collect().await?;
        return Ok(Json(all).into_response());
    }

    let body = persons.map(|item| item.and_then(ndjson_line));
    Ok(([(header::CONTENT_TYPE, STREAM_JSON)], Body::from_stream(body)).into_response())
}

fn ndjson_line(person: Person) -> Result<Bytes, AppError> {
    let mut line = serde_json::to_vec(&PersonResponse::from(person))
        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

/// A plain `application/json` Accept, with no streaming type alongside it.
fn wants_json_array(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let media_types: Vec<&str> = accept
        .split(',')
        .map(|part| part.split(';').next().unwrap_or("").trim())
        .collect();

    let streaming = media_types.iter().any(|m| {
        m.eq_ignore_ascii_case(STREAM_JSON)
            || m.eq_ignore_ascii_case("application/x-ndjson")
            || m.eq_ignore_ascii_case("text/event-stream")
    });

    !streaming && media_types.iter().any(|m| m.eq_ignore_ascii_case("application/json"))
}
