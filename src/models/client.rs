use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Client {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub bookings_count: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Client {
    pub fn new(user_id: ObjectId) -> Self {
        let now = DateTime::now();
        Client {
            id: ObjectId::new(),
            user_id,
            bookings_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    pub id: String,
    pub user_id: String,
    pub bookings_count: i32,
}

impl From<Client> for ClientResponse {
    fn from(client: Client) -> Self {
        ClientResponse {
            id: client.id.to_hex(),
            user_id: client.user_id.to_hex(),
            bookings_count: client.bookings_count,
        }
    }
}
