pub mod core {
    pub mod config;
    pub mod error;
    pub mod startup;
    pub mod state;
    pub mod tracing_init;
}

pub mod auth;
pub mod handlers;
pub mod models;
pub mod protocol;
pub mod server;
pub mod stores;
pub mod utils;
pub mod wal;
