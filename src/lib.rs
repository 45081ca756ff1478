pub mod battle;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod metrics;
pub mod notify;
pub mod protocol;
pub mod ws;
