pub mod alerting;
pub mod client;
pub mod models;
pub mod server;
pub mod store;
pub mod version;
pub mod web;
