#[macro_use]
extern crate rocket;

mod config;
mod db;
mod guards;
mod models;
mod routes;
mod services;
mod utils;

use std::sync::Arc;

use dotenvy::dotenv;
use log::{error, info};
use rocket::fairing::{AdHoc, Fairing, Info, Kind};
use rocket::fs::FileServer;
use rocket::http::Header;
use rocket::{Build, Catcher, Request, Response, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{make_swagger_ui, SwaggerUIConfig};

use crate::config::Config;
use crate::services::{LocalImageStorage, SharedStorage};
use crate::utils::ApiError;

/* ----------------------------- CORS ----------------------------- */

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin.to_string()));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));
        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));
    }
}

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

#[catch(400)]
fn bad_request() -> ApiError {
    ApiError::bad_request("Bad request")
}

#[catch(401)]
fn unauthorized() -> ApiError {
    ApiError::unauthorized("Not authorized, invalid or missing token")
}

#[catch(403)]
fn forbidden() -> ApiError {
    ApiError::forbidden("Access denied")
}

#[catch(404)]
fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

#[catch(422)]
fn unprocessable() -> ApiError {
    ApiError::bad_request("Invalid request body")
}

#[catch(500)]
fn internal_error() -> ApiError {
    ApiError::internal_error()
}

fn catchers() -> Vec<Catcher> {
    catchers![bad_request, unauthorized, forbidden, not_found, unprocessable, internal_error]
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/openapi.json".to_string(),
        ..Default::default()
    }
}

fn api_routes() -> Vec<rocket::Route> {
    let mut api = openapi_get_routes![
        // Auth
        routes::auth::register,
        routes::auth::login,
        // Users
        routes::user::get_profile,
        // Workers
        routes::worker::get_workers,
        routes::worker::get_worker_by_id,
        routes::worker::update_worker_profile,
        routes::worker::get_worker_stats,
        // Bookings
        routes::booking::create_booking,
        routes::booking::get_bookings,
        routes::booking::update_booking_status,
        routes::booking::get_available_workers,
        // Reviews
        routes::review::create_review,
        routes::review::get_worker_reviews,
        routes::review::update_review,
        routes::review::delete_review,
        // Portfolio
        routes::portfolio::add_portfolio_item,
        routes::portfolio::get_portfolio,
        routes::portfolio::update_portfolio_item,
        routes::portfolio::delete_portfolio_item,
        // Health
        routes::health::health,
    ];
    // Multipart body, mounted outside the OpenAPI document.
    api.extend(routes![routes::user::update_profile]);
    api
}

fn validate_config() -> AdHoc {
    AdHoc::try_on_ignite("Config", |rocket| async {
        match Config::validate() {
            Ok(()) => Ok(rocket),
            Err(e) => {
                error!("Refusing to start: {}", e);
                Err(rocket)
            }
        }
    })
}

/* ----------------------------- LAUNCH ----------------------------- */

#[launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    let upload_dir = Config::upload_dir();
    if let Err(e) = std::fs::create_dir_all(&upload_dir) {
        error!("Cannot create upload directory {}: {}", upload_dir, e);
    }
    let storage: SharedStorage = Arc::new(LocalImageStorage::from_config());

    info!("Skill-Connect API starting; Swagger UI at /api/docs");

    rocket::build()
        .attach(validate_config())
        .attach(db::init())
        .attach(CORS)
        .manage(storage)
        .mount("/", routes![options_handler])
        .mount("/api", api_routes())
        .mount("/uploads", FileServer::from(upload_dir))
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register("/", catchers())
}
