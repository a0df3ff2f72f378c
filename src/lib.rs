pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod registry;
pub mod rng;
pub mod room;
pub mod server;
pub mod server_protocol;
pub mod server_utils;
pub mod types;
