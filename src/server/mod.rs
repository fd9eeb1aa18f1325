pub mod config;
pub mod headers;
mod health;
mod http_layers;
pub mod metrics;
pub mod server;
pub mod state;
pub mod stdio;
pub mod stream;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use stdio::run_stdio;
