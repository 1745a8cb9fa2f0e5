use super::metrics::{record_generator_failure, record_person_saved};
use super::repository::PersonRepository;
use crate::models::Person;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const STARKS: [&str; 8] = [
    "Eddard", "Catelyn", "Jon", "Rob", "Sansa", "Aria", "Bran", "Rickon",
];

pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    STARKS.choose(rng).copied().unwrap_or(STARKS[0])
}

/// Inserts one random person per tick until cancelled.
pub struct PersonGenerator {
    repository: Arc<dyn PersonRepository>,
    interval: Duration,
}

impl PersonGenerator {
    pub fn new(repository: Arc<dyn PersonRepository>, interval: Duration) -> Self {
        Self {
            repository,
            interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Winter is Coming!");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Person generator shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let name = random_name(&mut rand::thread_rng());
                    self.generate(name).await;
                }
            }
        }
    }

    async fn generate(&self, name: &str) {
        match self.repository.save(Person::new(name)).await {
            Ok(saved) => {
                record_person_saved(name);
                tracing::info!(person = %saved, "Saved person");
            }
            Err(e) => {
                record_generator_failure();
                tracing::error!(name = %name, "Failed to save generated person: {}", e);
            }
        }
    }
}
