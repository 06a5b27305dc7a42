use log::{error, info};
use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use rocket::fairing::AdHoc;

use crate::config::Config;
use crate::models::{
    Booking, Client as ClientProfile, PortfolioItem, Review, User, Worker, BOOKINGS, CLIENTS,
    PORTFOLIO_ITEMS, REVIEWS, USERS, WORKERS,
};

/// Handle kept in Rocket state. Holds the client as well as the database so
/// handlers can open sessions for multi-document transactions.
pub struct DbConn {
    client: Client,
    db: Database,
}

impl DbConn {
    pub fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    pub fn workers(&self) -> Collection<Worker> {
        self.db.collection(WORKERS)
    }

    pub fn clients(&self) -> Collection<ClientProfile> {
        self.db.collection(CLIENTS)
    }

    pub fn bookings(&self) -> Collection<Booking> {
        self.db.collection(BOOKINGS)
    }

    pub fn reviews(&self) -> Collection<Review> {
        self.db.collection(REVIEWS)
    }

    pub fn portfolio_items(&self) -> Collection<PortfolioItem> {
        self.db.collection(PORTFOLIO_ITEMS)
    }

    /// Opens a session with a started transaction. Dropping the session
    /// without committing aborts it.
    pub async fn start_transaction(&self) -> mongodb::error::Result<ClientSession> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(session)
    }

    pub async fn ping(&self) -> mongodb::error::Result<()> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    #[cfg(test)]
    pub fn database(&self) -> &Database {
        &self.db
    }
}

pub fn init() -> AdHoc {
    AdHoc::try_on_ignite("MongoDB", |rocket| async {
        match connect().await {
            Ok(conn) => {
                info!("MongoDB connected ({})", Config::database_name());
                Ok(rocket.manage(conn))
            }
            Err(e) => {
                error!("Failed to connect to MongoDB: {}", e);
                Err(rocket)
            }
        }
    })
}

async fn connect() -> mongodb::error::Result<DbConn> {
    connect_to(&Config::mongodb_uri(), &Config::database_name()).await
}

/// Connects, pings and makes sure the unique indexes exist.
pub async fn connect_to(uri: &str, database: &str) -> mongodb::error::Result<DbConn> {
    let client = Client::with_uri_str(uri).await?;
    let db = client.database(database);

    let conn = DbConn { client, db };
    conn.ping().await?;
    ensure_indexes(&conn).await?;
    Ok(conn)
}

fn unique(field: &str) -> IndexModel {
    IndexModel::builder()
        .keys(doc! { field: 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn ensure_indexes(conn: &DbConn) -> mongodb::error::Result<()> {
    conn.users().create_index(unique("email"), None).await?;
    conn.workers().create_index(unique("user_id"), None).await?;
    conn.clients().create_index(unique("user_id"), None).await?;
    conn.reviews().create_index(unique("booking_id"), None).await?;

    conn.bookings()
        .create_index(IndexModel::builder().keys(doc! { "worker_id": 1, "created_at": -1 }).build(), None)
        .await?;
    conn.bookings()
        .create_index(IndexModel::builder().keys(doc! { "client_id": 1, "created_at": -1 }).build(), None)
        .await?;
    conn.reviews()
        .create_index(IndexModel::builder().keys(doc! { "reviewee_id": 1, "created_at": -1 }).build(), None)
        .await?;
    conn.portfolio_items()
        .create_index(IndexModel::builder().keys(doc! { "worker_id": 1, "created_at": -1 }).build(), None)
        .await?;
    Ok(())
}
