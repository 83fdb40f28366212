pub mod cache;
pub mod coinbase;
pub mod config;
pub mod error;
pub mod manager;
pub mod poller;
pub mod source;
pub mod streamer;
pub mod symbols;
pub mod types;
