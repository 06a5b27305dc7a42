pub mod user;
pub mod worker;
pub mod client;
pub mod booking;
pub mod review;
pub mod portfolio;

pub use user::*;
pub use worker::*;
pub use client::*;
pub use booking::*;
pub use review::*;
pub use portfolio::*;

use mongodb::bson::{oid::ObjectId, DateTime};

pub const USERS: &str = "users";
pub const WORKERS: &str = "workers";
pub const CLIENTS: &str = "clients";
pub const BOOKINGS: &str = "bookings";
pub const REVIEWS: &str = "reviews";
pub const PORTFOLIO_ITEMS: &str = "portfolio_items";

/// The caller resolved to its role profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Worker(ObjectId),
    Client(ObjectId),
}

pub fn format_datetime(dt: DateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}
