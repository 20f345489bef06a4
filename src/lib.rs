pub mod cache;
pub mod config;
pub mod connection_pool;
pub mod context;
pub mod error;
pub mod executor;
pub mod health;
pub mod logging;
pub mod monitor;
pub mod pool;
pub mod readers;
pub mod report;
pub mod stats;
pub mod targets;
pub mod tls;
