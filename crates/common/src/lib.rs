pub mod config;
pub mod error;
pub mod http;
pub mod redis_pool;
pub mod run_state;
pub mod types;
