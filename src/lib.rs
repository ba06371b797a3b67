// Dashboard Gateway - Library root for testing

pub mod api_client;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod session;
