pub mod auth;
pub mod booking;
pub mod health;
pub mod portfolio;
pub mod review;
pub mod user;
pub mod worker;

use mongodb::bson::{doc, oid::ObjectId};
use mongodb::ClientSession;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{Actor, Client, Role, Worker};
use crate::utils::{ApiError, WorkflowError};

pub fn parse_object_id(value: &str, label: &'static str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value.trim())
        .map_err(|_| ApiError::bad_request(format!("Invalid {} ID", label)))
}

pub async fn find_worker_by_user(
    db: &DbConn,
    user_id: ObjectId,
) -> Result<Option<Worker>, ApiError> {
    Ok(db.workers().find_one(doc! { "user_id": user_id }, None).await?)
}

pub async fn find_client_by_user(
    db: &DbConn,
    user_id: ObjectId,
) -> Result<Option<Client>, ApiError> {
    Ok(db.clients().find_one(doc! { "user_id": user_id }, None).await?)
}

/// Resolves the caller to the role profile its bookings and reviews are
/// addressed by.
pub async fn resolve_actor(db: &DbConn, auth: &AuthGuard) -> Result<Actor, ApiError> {
    match auth.role {
        Role::Worker => find_worker_by_user(db, auth.user_id)
            .await?
            .map(|w| Actor::Worker(w.id))
            .ok_or_else(|| WorkflowError::NotFound("Worker profile").into()),
        Role::Client => find_client_by_user(db, auth.user_id)
            .await?
            .map(|c| Actor::Client(c.id))
            .ok_or_else(|| WorkflowError::NotFound("Client profile").into()),
    }
}

pub async fn commit(mut session: ClientSession) -> Result<(), ApiError> {
    session.commit_transaction().await?;
    Ok(())
}

/// Harness for handler tests against a real replica set. Transactions need
/// one, so every test using it is `#[ignore]`d; run them with
/// `MONGODB_URI=mongodb://localhost:27017/?replicaSet=rs0 cargo test -- --ignored`.
#[cfg(test)]
pub(crate) mod testing {
    use mongodb::bson::oid::ObjectId;
    use rocket::http::{ContentType, Header, Method, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{json, Value};

    use crate::db::{connect_to, DbConn};

    /// Local client over a throwaway database.
    pub async fn client(routes: Vec<rocket::Route>) -> Client {
        let uri = std::env::var("MONGODB_URI").expect("MONGODB_URI must name a replica set");
        let name = format!("skill-connect-test-{}", ObjectId::new().to_hex());
        let conn = connect_to(&uri, &name).await.expect("replica set reachable");

        let rocket = rocket::build()
            .manage(conn)
            .mount("/api", routes)
            .register("/", crate::catchers());
        Client::untracked(rocket).await.expect("valid rocket")
    }

    pub fn db(client: &Client) -> &DbConn {
        client.rocket().state::<DbConn>().expect("DbConn is managed")
    }

    pub async fn cleanup(client: Client) {
        db(&client).database().drop(None).await.ok();
    }

    pub async fn send(
        client: &Client,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (Status, Value) {
        let mut request = client.req(method, path);
        if let Some(token) = token {
            request.add_header(Header::new("Authorization", format!("Bearer {}", token)));
        }
        if let Some(body) = body {
            request = request.header(ContentType::JSON).body(body.to_string());
        }

        let response = request.dispatch().await;
        let status = response.status();
        let text = response.into_string().await.unwrap_or_default();
        (status, serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    /// A registered account: its token and the `user` object returned.
    pub struct Account {
        pub token: String,
        pub user: Value,
    }

    impl Account {
        pub fn user_id(&self) -> ObjectId {
            ObjectId::parse_str(self.user["id"].as_str().unwrap()).unwrap()
        }

        pub fn worker_id(&self) -> String {
            self.user["workerProfile"]["id"].as_str().unwrap().to_string()
        }
    }

    pub async fn register(client: &Client, role: &str, name: &str, email: &str) -> Account {
        let (status, body) = send(
            client,
            Method::Post,
            "/api/users/register",
            None,
            Some(json!({
                "role": role,
                "name": name,
                "email": email,
                "password": "secret1",
                "skills": ["plumbing"],
                "hourlyRate": 20
            })),
        )
        .await;
        assert_eq!(status, Status::Created, "{}", body);

        Account {
            token: body["data"]["token"].as_str().unwrap().to_string(),
            user: body["data"]["user"].clone(),
        }
    }

    /// Books `worker` for the client `by` on `date`; returns the booking id.
    pub async fn book(client: &Client, by: &Account, worker: &Account, date: &str) -> String {
        let (status, body) = send(
            client,
            Method::Post,
            "/api/bookings",
            Some(&by.token),
            Some(json!({
                "workerId": worker.worker_id(),
                "scheduledDate": date,
                "scheduledTime": "09:00",
                "description": "Kitchen sink leaks",
                "service": "Plumbing"
            })),
        )
        .await;
        assert_eq!(status, Status::Created, "{}", body);
        body["data"]["booking"]["id"].as_str().unwrap().to_string()
    }

    pub async fn set_status(
        client: &Client,
        by: &Account,
        booking_id: &str,
        status: &str,
    ) -> (Status, Value) {
        send(
            client,
            Method::Put,
            &format!("/api/bookings/{}/status", booking_id),
            Some(&by.token),
            Some(json!({ "status": status })),
        )
        .await
    }
}
