mod common;

use common::{test_config, TestApp};
use futures::StreamExt;
use person_service::config::StorageBackend;
use person_service::handlers::STREAM_JSON;
use person_service::models::{Person, PersonResponse};
use person_service::startup::Application;
use reqwest::Client;
use std::time::Duration;

fn parse_ndjson(body: &str) -> Vec<PersonResponse> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("invalid JSON line"))
        .collect()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::spawn().await;

    let response = Client::new()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "person-service");
}

#[tokio::test]
async fn readiness_check_works() {
    let app = TestApp::spawn().await;

    let response = Client::new()
        .get(format!("{}/ready", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
}

// =============================================================================
// Query by name
// =============================================================================

#[tokio::test]
async fn save_and_find_by_name() {
    let app = TestApp::spawn().await;

    let saved = app.repository.save(Person::new("Aria")).await.unwrap();
    assert!(saved.id.is_some());

    let response = Client::new()
        .get(format!("{}/?name=Aria", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(response.headers()["content-type"], STREAM_JSON);

    let persons = parse_ndjson(&response.text().await.unwrap());
    assert_eq!(persons.len(), 1);
    assert_eq!(persons[0].name, "Aria");
    assert_eq!(persons[0].id, saved.id.map(|id| id.to_hex()));
}

#[tokio::test]
async fn query_filters_other_names() {
    let app = TestApp::spawn().await;
    for name in ["Eddard", "Jon", "Eddard", "Sansa"] {
        app.repository.save(Person::new(name)).await.unwrap();
    }

    let body = Client::new()
        .get(format!("{}/?name=Eddard", app.address))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let persons = parse_ndjson(&body);
    assert_eq!(persons.len(), 2);
    assert!(persons.iter().all(|p| p.name == "Eddard"));
}

#[tokio::test]
async fn missing_name_matches_nothing() {
    let app = TestApp::spawn().await;
    app.repository.save(Person::new("Bran")).await.unwrap();

    let body = Client::new()
        .get(format!("{}/", app.address))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(parse_ndjson(&body).is_empty());
}

#[tokio::test]
async fn accept_json_returns_array() {
    let app = TestApp::spawn().await;
    app.repository.save(Person::new("Rob")).await.unwrap();

    let response = Client::new()
        .get(format!("{}/?name=Rob", app.address))
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers()["content-type"], "application/json");
    let persons: Vec<PersonResponse> = response.json().await.unwrap();
    assert_eq!(persons.len(), 1);
    assert_eq!(persons[0].name, "Rob");
}

#[tokio::test]
async fn rx_endpoint_matches_plain_endpoint() {
    let app = TestApp::spawn().await;
    for name in ["Rickon", "Catelyn", "Rickon"] {
        app.repository.save(Person::new(name)).await.unwrap();
    }
    let client = Client::new();

    let plain = client
        .get(format!("{}/?name=Rickon", app.address))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let rx = client
        .get(format!("{}/rx?name=Rickon", app.address))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(parse_ndjson(&plain), parse_ndjson(&rx));
    assert_eq!(parse_ndjson(&rx).len(), 2);
}

// =============================================================================
// Server-sent events
// =============================================================================

#[tokio::test]
async fn stream_emits_existing_and_new_records() {
    let app = TestApp::spawn().await;
    app.repository.save(Person::new("Eddard")).await.unwrap();

    let response = Client::new()
        .get(format!("{}/stream", app.address))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let repository = app.repository.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        repository.save(Person::new("Catelyn")).await.unwrap();
    });

    let mut body = response.bytes_stream();
    let mut received = String::new();
    let collected = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = body.next().await {
            received.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            if received.matches("data:").count() >= 2 {
                break;
            }
        }
    })
    .await;
    assert!(collected.is_ok(), "timed out waiting for events: {received}");

    let names: Vec<String> = received
        .lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|d| serde_json::from_str::<PersonResponse>(d.trim()).unwrap().name)
        .collect();
    assert_eq!(names, vec!["Eddard", "Catelyn"]);
}

// =============================================================================
// Generator
// =============================================================================

#[tokio::test]
async fn generator_fills_the_store() {
    let mut config = test_config(StorageBackend::Memory);
    config.generator.enabled = true;
    config.generator.interval_ms = 20;

    let app = Application::build(config).await.unwrap();
    let repository = app.repository();
    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let mut tail = repository.tail().await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(5), tail.next())
        .await
        .expect("generator should insert a person")
        .unwrap()
        .unwrap();

    assert!(first.id.is_some());
    assert!(person_service::services::STARKS.contains(&first.name.as_str()));
}
