use serde::{Deserialize, Serialize};
use sweeper_core::{GameConfig, GameState, MoveRequest};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// An explicit close signal.
    Requested,
    /// No accepted move or restart within the inactivity window.
    Inactive,
    /// Every handle to the session was dropped.
    Detached,
}

/// What produced a committed state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cause {
    Initialized,
    Move { request: MoveRequest },
    Restart { config: GameConfig },
}

impl Cause {
    /// Moves and restarts count as player activity; the first board does not.
    pub fn is_activity(&self) -> bool {
        !matches!(self, Self::Initialized)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum HistoryEvent {
    Started {
        id: String,
        config: GameConfig,
        at: OffsetDateTime,
    },
    Committed {
        cause: Cause,
        state: GameState,
        at: OffsetDateTime,
    },
    Closed {
        reason: CloseReason,
        at: OffsetDateTime,
    },
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history is empty")]
    Empty,
    #[error("history does not begin with a start record")]
    MissingStart,
    #[error("history line {line} is malformed: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of folding a history without re-running any work.
#[derive(Clone, Debug, PartialEq)]
pub struct Replayed {
    pub id: String,
    pub config: GameConfig,
    /// `None` when no board was ever committed and the session never closed.
    pub state: Option<GameState>,
    pub last_activity: OffsetDateTime,
    pub closed: Option<CloseReason>,
}

/// Ordered log of everything a session committed. Each commit stores the whole
/// state, so the log grows by one board snapshot per accepted move or restart.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionHistory {
    events: Vec<HistoryEvent>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<HistoryEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn record(&mut self, event: HistoryEvent) {
        self.events.push(event);
    }

    pub fn to_jsonl(&self) -> Result<String, HistoryError> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn from_jsonl(text: &str) -> Result<Self, HistoryError> {
        let events = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|source| HistoryError::Malformed {
                    line: index + 1,
                    source,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { events })
    }

    pub fn replay(&self) -> Result<Replayed, HistoryError> {
        let mut events = self.events.iter();
        let Some(first) = events.next() else {
            return Err(HistoryError::Empty);
        };
        let HistoryEvent::Started { id, config, at } = first else {
            return Err(HistoryError::MissingStart);
        };

        let mut replayed = Replayed {
            id: id.clone(),
            config: *config,
            state: None,
            last_activity: *at,
            closed: None,
        };
        for event in events {
            match event {
                HistoryEvent::Started { .. } => {
                    log::warn!("ignoring repeated start record for session {}", replayed.id);
                }
                HistoryEvent::Committed { cause, state, at } => {
                    if cause.is_activity() {
                        replayed.last_activity = *at;
                    }
                    replayed.state = Some(state.clone());
                }
                HistoryEvent::Closed { reason, at } => {
                    replayed
                        .state
                        .get_or_insert_with(|| GameState::placeholder(id.clone()))
                        .close(*at);
                    replayed.closed = Some(*reason);
                }
            }
        }
        Ok(replayed)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sweeper_core::{Board, GameStatus};
    use time::Duration;

    use super::*;

    fn at(minutes: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::minutes(minutes)
    }

    fn sample() -> SessionHistory {
        let board = Board::from_mine_coords((2, 2), &[(0, 0)]).unwrap();
        let initial = GameState::new("g", board);
        let mut moved = initial.clone();
        moved.begin(at(3));

        SessionHistory::from_events(vec![
            HistoryEvent::Started {
                id: "g".to_owned(),
                config: GameConfig::new(2, 2, 1),
                at: at(0),
            },
            HistoryEvent::Committed {
                cause: Cause::Initialized,
                state: initial,
                at: at(1),
            },
            HistoryEvent::Committed {
                cause: Cause::Move {
                    request: MoveRequest::flag(1, 1),
                },
                state: moved,
                at: at(3),
            },
        ])
    }

    #[test]
    fn replay_takes_latest_committed_state() {
        let replayed = sample().replay().unwrap();

        assert_eq!(replayed.id, "g");
        assert_eq!(replayed.config, GameConfig::new(2, 2, 1));
        assert_eq!(replayed.state.unwrap().status, GameStatus::InProgress);
        assert_eq!(replayed.last_activity, at(3));
        assert_eq!(replayed.closed, None);
    }

    #[test]
    fn initialization_is_not_activity() {
        let mut history = sample();
        history.events.truncate(2);

        assert_eq!(history.replay().unwrap().last_activity, at(0));
    }

    #[test]
    fn replay_notices_close() {
        let mut history = sample();
        history.record(HistoryEvent::Closed {
            reason: CloseReason::Inactive,
            at: at(90),
        });

        let replayed = history.replay().unwrap();

        assert_eq!(replayed.closed, Some(CloseReason::Inactive));
        let state = replayed.state.unwrap();
        assert_eq!(state.status, GameStatus::Closed);
        assert_eq!(state.end_time, Some(at(90)));
        assert!(state.is_initialized());
    }

    #[test]
    fn closing_before_the_first_board_replays_a_closed_placeholder() {
        let history = SessionHistory::from_events(vec![
            HistoryEvent::Started {
                id: "g".to_owned(),
                config: GameConfig::beginner(),
                at: at(0),
            },
            HistoryEvent::Closed {
                reason: CloseReason::Requested,
                at: at(1),
            },
        ]);

        let state = history.replay().unwrap().state.unwrap();

        assert_eq!(state.status, GameStatus::Closed);
        assert!(!state.is_initialized());
    }

    #[test]
    fn jsonl_round_trip_preserves_events() {
        let history = sample();
        let text = history.to_jsonl().unwrap();

        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().next().unwrap().contains("\"record_type\":\"started\""));
        assert_eq!(SessionHistory::from_jsonl(&text).unwrap(), history);
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let text = format!("{}\nnot json\n", sample().to_jsonl().unwrap().lines().next().unwrap());

        let err = SessionHistory::from_jsonl(&text).unwrap_err();

        assert!(matches!(err, HistoryError::Malformed { line: 2, .. }));
    }

    #[test]
    fn replay_requires_a_start_record() {
        assert!(matches!(SessionHistory::new().replay(), Err(HistoryError::Empty)));

        let mut history = sample();
        history.events.remove(0);
        assert!(matches!(history.replay(), Err(HistoryError::MissingStart)));
    }
}
