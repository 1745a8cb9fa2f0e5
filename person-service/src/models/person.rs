use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// A stored person. The id is assigned by the store on insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Person {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
}

impl Person {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }
}

impl std::fmt::Display for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.id {
            Some(id) => write!(f, "Person(id={}, name={})", id, self.name),
            None => write!(f, "Person(id=null, name={})", self.name),
        }
    }
}

/// JSON wire form: `{"id": "<hex>", "name": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonResponse {
    pub id: Option<String>,
    pub name: String,
}

impl From<Person> for PersonResponse {
    fn from(person: Person) -> Self {
        Self {
            id: person.id.map(|id| id.to_hex()),
            name: person.name,
        }
    }
}
