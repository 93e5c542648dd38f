pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod server;
pub mod updater;
pub mod webhook;

pub use models::*;
