#![allow(dead_code)]

use person_service::config::{
    GeneratorConfig, MongoConfig, PersonConfig, StorageBackend, StorageConfig,
};
use person_service::services::PersonRepository;
use person_service::startup::Application;
use service_core::config::Config as CoreConfig;
use std::sync::Arc;

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub repository: Arc<dyn PersonRepository>,
}

pub fn test_config(backend: StorageBackend) -> PersonConfig {
    PersonConfig {
        common: CoreConfig { port: 0 },
        storage: StorageConfig {
            backend,
            collection: format!("person_{}", std::process::id()),
            max_documents: 10_000,
            size_bytes: 1_000_000,
            tail_retry_ms: 50,
        },
        mongodb: MongoConfig {
            uri: std::env::var("TEST_MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            database: "person_test".to_string(),
        },
        generator: GeneratorConfig {
            // Tests insert their own records
            enabled: false,
            interval_ms: 1_000,
        },
        otlp_endpoint: None,
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config(StorageBackend::Memory)).await
    }

    pub async fn spawn_with(config: PersonConfig) -> Self {
        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);
        let repository = app.repository();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            repository,
        }
    }
}
