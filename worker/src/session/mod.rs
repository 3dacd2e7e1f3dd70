//! One actor per game session: a serialized command queue in front of a
//! watch channel that always holds the last committed snapshot.

mod actor;
pub mod history;

use std::sync::Arc;

use futures_channel::{mpsc, oneshot};
use sweeper_core::{GameConfig, GameState, GameStatus, MoveRequest};
use thiserror::Error;
use tokio::sync::watch;

use crate::work::WorkError;

pub(crate) use actor::{Origin, spawn};
pub use history::{Cause, CloseReason, HistoryError, HistoryEvent, Replayed, SessionHistory};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("session {0} has stopped")]
    Stopped(String),
    #[error("session {id} has no board yet")]
    NotInitialized { id: String },
    #[error(transparent)]
    Work(#[from] WorkError),
}

/// Fire-and-forget commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Signal {
    MakeMove(MoveRequest),
    Restart(GameConfig),
    Close,
}

/// Commands whose caller waits for the resulting state.
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    MakeMove(MoveRequest),
    Restart(GameConfig),
}

#[derive(Debug)]
pub(crate) enum Command {
    Signal(Signal),
    Update {
        update: Update,
        reply: oneshot::Sender<Result<GameState, SessionError>>,
    },
    History {
        reply: oneshot::Sender<SessionHistory>,
    },
}

/// Cheap to clone; the session closes as detached once every clone is gone.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<Arc<GameState>>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: Arc<str>,
        commands: mpsc::UnboundedSender<Command>,
        state: watch::Receiver<Arc<GameState>>,
    ) -> Self {
        Self {
            id,
            commands,
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn stopped(&self) -> SessionError {
        SessionError::Stopped(self.id.to_string())
    }

    pub fn signal(&self, signal: Signal) -> Result<(), SessionError> {
        self.commands
            .unbounded_send(Command::Signal(signal))
            .map_err(|_| self.stopped())
    }

    pub async fn update(&self, update: Update) -> Result<GameState, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .unbounded_send(Command::Update { update, reply })
            .map_err(|_| self.stopped())?;
        response.await.map_err(|_| self.stopped())?
    }

    /// The last committed state, or the placeholder while the first board is generated.
    pub fn query(&self) -> GameState {
        GameState::clone(&self.state.borrow())
    }

    pub async fn history(&self) -> Result<SessionHistory, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .unbounded_send(Command::History { reply })
            .map_err(|_| self.stopped())?;
        response.await.map_err(|_| self.stopped())
    }

    pub async fn make_move(&self, request: MoveRequest) -> Result<GameState, SessionError> {
        self.update(Update::MakeMove(request)).await
    }

    pub async fn restart(&self, config: GameConfig) -> Result<GameState, SessionError> {
        self.update(Update::Restart(config)).await
    }

    pub fn close(&self) -> Result<(), SessionError> {
        self.signal(Signal::Close)
    }

    /// Resolves with the closed state once the session reaches CLOSED. Fails
    /// with [`SessionError::Stopped`] if the actor went away without closing.
    pub async fn closed(&self) -> Result<GameState, SessionError> {
        wait_closed(self.state.clone())
            .await
            .ok_or_else(|| self.stopped())
    }

    pub(crate) fn watch(&self) -> watch::Receiver<Arc<GameState>> {
        self.state.clone()
    }

    /// Shares the id allocation; distinct per spawned session even when ids repeat.
    pub(crate) fn key(&self) -> Arc<str> {
        self.id.clone()
    }
}

/// `None` when the sender dropped before CLOSED was committed.
pub(crate) async fn wait_closed(mut state: watch::Receiver<Arc<GameState>>) -> Option<GameState> {
    let closed = state
        .wait_for(|s| s.status == GameStatus::Closed)
        .await
        .ok()?;
    Some(GameState::clone(&closed))
}
