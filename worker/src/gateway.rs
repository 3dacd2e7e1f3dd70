//! Front-end facing commands. Everything goes through one injected
//! [`SessionClient`]; queries retry while a freshly started session registers.

use sweeper_core::{GameConfig, GameError, GameState, MoveRequest};
use thiserror::Error;
use uuid::Uuid;

use crate::client::{ClientError, SessionClient};
use crate::session::{Signal, Update};
use crate::settings::GatewaySettings;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidConfig(#[source] GameError),
    #[error("session {id} did not answer after {attempts} attempts: {source}")]
    NotReady {
        id: String,
        attempts: u32,
        #[source]
        source: ClientError,
    },
    #[error(transparent)]
    Client(#[from] ClientError),
}

pub struct Gateway<C> {
    client: C,
    settings: GatewaySettings,
}

impl<C: SessionClient> Gateway<C> {
    pub fn new(client: C, settings: GatewaySettings) -> Self {
        Self { client, settings }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Starts a session under a fresh UUID and returns its first visible state,
    /// which may still be the placeholder.
    pub async fn create_game(&self, config: GameConfig) -> Result<GameState, GatewayError> {
        let config = config.validate().map_err(GatewayError::InvalidConfig)?;
        let id = Uuid::new_v4().to_string();
        self.client.start(&id, config).await?;
        log::info!("created game {id}");
        self.query(&id).await
    }

    pub async fn query(&self, id: &str) -> Result<GameState, GatewayError> {
        let attempts = self.settings.query_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.client.query(id).await {
                Ok(state) => return Ok(state),
                Err(source) if attempt >= attempts => {
                    return Err(GatewayError::NotReady {
                        id: id.to_owned(),
                        attempts,
                        source,
                    });
                }
                Err(err) => {
                    let delay = self.settings.backoff(attempt);
                    log::info!("query for {id} not ready ({err}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn make_move(&self, id: &str, request: MoveRequest) -> Result<GameState, GatewayError> {
        Ok(self.client.update(id, Update::MakeMove(request)).await?)
    }

    pub async fn restart(&self, id: &str, config: GameConfig) -> Result<GameState, GatewayError> {
        let config = config.validate().map_err(GatewayError::InvalidConfig)?;
        Ok(self.client.update(id, Update::Restart(config)).await?)
    }

    pub async fn close(&self, id: &str) -> Result<(), GatewayError> {
        Ok(self.client.signal(id, Signal::Close).await?)
    }
}
