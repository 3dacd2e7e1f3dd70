use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use sweeper_core::{GameConfig, GameState};
use thiserror::Error;
use tokio::sync::{RwLock, watch};

use crate::client::{ClientError, SessionClient};
use crate::clock::Clock;
use crate::session::{
    self, HistoryError, Origin, SessionHandle, SessionHistory, Signal, Update, wait_closed,
};
use crate::settings::SessionSettings;
use crate::work::WorkExecutor;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("a session with id {0} already exists")]
    AlreadyExists(String),
    #[error("cannot resume session: {0}")]
    History(#[from] HistoryError),
}

type Sessions = RwLock<HashMap<String, SessionHandle>>;

/// Owns every running session plus the executor, clock and settings they share.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Sessions>,
    executor: Arc<dyn WorkExecutor>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(
        executor: Arc<dyn WorkExecutor>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions: Arc::default(),
            executor,
            clock,
            settings,
        }
    }

    pub async fn start(
        &self,
        id: impl Into<String>,
        config: GameConfig,
    ) -> Result<SessionHandle, RegistryError> {
        let id = id.into();
        self.insert(id.clone(), || Origin::Fresh { id, config }).await
    }

    /// Restarts a session from its recorded history. No work item is run for
    /// anything already committed.
    pub async fn resume(&self, history: SessionHistory) -> Result<SessionHandle, RegistryError> {
        let replayed = history.replay()?;
        self.insert(replayed.id.clone(), || Origin::Resumed { history, replayed })
            .await
    }

    async fn insert(
        &self,
        id: String,
        origin: impl FnOnce() -> Origin,
    ) -> Result<SessionHandle, RegistryError> {
        let mut sessions = self.sessions.write().await;
        match sessions.entry(id) {
            Entry::Occupied(entry) => Err(RegistryError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                let handle = session::spawn(
                    origin(),
                    self.executor.clone(),
                    self.clock.clone(),
                    self.settings.clone(),
                );
                tokio::spawn(evict_when_closed(
                    Arc::downgrade(&self.sessions),
                    handle.key(),
                    handle.watch(),
                    self.settings.closed_retention(),
                ));
                Ok(entry.insert(handle).clone())
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Forgets a session. It closes as detached once the last outside handle drops.
    pub async fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(id)
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.sessions.read().await.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    async fn handle(&self, id: &str) -> Result<SessionHandle, ClientError> {
        self.get(id)
            .await
            .ok_or_else(|| ClientError::NotFound(id.to_owned()))
    }
}

/// Drops the registry entry once the session has been closed for `retention`.
/// Holds only the watch side so it never keeps the actor alive.
async fn evict_when_closed(
    sessions: Weak<Sessions>,
    key: Arc<str>,
    state: watch::Receiver<Arc<GameState>>,
    retention: Duration,
) {
    if wait_closed(state).await.is_some() {
        tokio::time::sleep(retention).await;
    }
    let Some(sessions) = sessions.upgrade() else {
        return;
    };
    let mut sessions = sessions.write().await;
    // the id may have been removed and reused by another session meanwhile
    if sessions.get(&*key).is_some_and(|current| Arc::ptr_eq(&current.key(), &key)) {
        sessions.remove(&*key);
        log::debug!("session {key} evicted from the registry");
    }
}

#[async_trait]
impl SessionClient for SessionRegistry {
    async fn start(&self, id: &str, config: GameConfig) -> Result<(), ClientError> {
        SessionRegistry::start(self, id, config).await?;
        Ok(())
    }

    async fn signal(&self, id: &str, signal: Signal) -> Result<(), ClientError> {
        Ok(self.handle(id).await?.signal(signal)?)
    }

    async fn update(&self, id: &str, update: Update) -> Result<GameState, ClientError> {
        Ok(self.handle(id).await?.update(update).await?)
    }

    async fn query(&self, id: &str) -> Result<GameState, ClientError> {
        Ok(self.handle(id).await?.query())
    }
}
