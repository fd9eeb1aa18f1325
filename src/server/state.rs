use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;
use crate::bridge::Bridge;

pub type GuardedBridge = Arc<Bridge>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub bridge: GuardedBridge,
    pub hash: String,
}

impl ServerState {
    pub fn new(config: ServerConfig, bridge: GuardedBridge) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            bridge,
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

impl FromRef<ServerState> for GuardedBridge {
    fn from_ref(input: &ServerState) -> Self {
        input.bridge.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
