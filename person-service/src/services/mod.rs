pub mod generator;
pub mod memory;
pub mod metrics;
pub mod mongo;
pub mod repository;

pub use generator::{random_name, PersonGenerator, STARKS};
pub use memory::InMemoryPersonRepository;
pub use metrics::{get_metrics, init_metrics};
pub use mongo::MongoPersonRepository;
pub use repository::{into_receiver, PersonReceiver, PersonRepository, PersonStream};
