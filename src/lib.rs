// Library for tests to access modules

pub mod client;
pub mod config;
pub mod coordinator;
pub mod docker_repo;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod rates;
pub mod registry;
pub mod routes;
pub mod stale_filter;
pub mod worker;
