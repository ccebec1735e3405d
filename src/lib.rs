pub mod cache;
pub mod config;
pub mod domain;
pub mod health;
pub mod http;
pub mod ingestion;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod store;
pub mod utils;
