use async_trait::async_trait;
use sweeper_core::{GameConfig, GameState};
use thiserror::Error;

use crate::registry::RegistryError;
use crate::session::{SessionError, Signal, Update};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no session with id {0}")]
    NotFound(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// The operations a front end may send to sessions, addressed by id.
#[async_trait]
pub trait SessionClient: Send + Sync {
    async fn start(&self, id: &str, config: GameConfig) -> Result<(), ClientError>;

    async fn signal(&self, id: &str, signal: Signal) -> Result<(), ClientError>;

    async fn update(&self, id: &str, update: Update) -> Result<GameState, ClientError>;

    async fn query(&self, id: &str) -> Result<GameState, ClientError>;
}
