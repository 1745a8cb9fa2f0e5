use futures::StreamExt;
use person_client::{ClientConfig, ClientError, ClientMode, PersonClient};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let config = ClientConfig::load()?;
    init_tracing("person-client", "info", config.otlp_endpoint.as_deref());

    let client = PersonClient::new(&config.base_url)?;
    tracing::info!(
        base_url = %client.base_url(),
        name = %config.name,
        mode = ?config.mode,
        "Fetching persons"
    );

    let mut persons = match config.mode {
        ClientMode::Query => client.find_by_name(&config.name).await?,
        ClientMode::Rx => client.find_by_name_rx(&config.name).await?,
        ClientMode::Follow => client.follow().await?,
    };

    let mut count = 0usize;
    while let Some(person) = persons.next().await {
        let person = person.map_err(|e| {
            tracing::error!("Person stream failed: {}", e);
            e
        })?;
        println!("{}", person);
        count += 1;
    }

    tracing::info!(count, "Person stream completed");
    Ok(())
}
