pub mod client;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod limits;
pub mod model;
pub mod monitor;
pub mod observability;
pub mod protocol;
pub mod router;
pub mod server;
pub mod wire;
