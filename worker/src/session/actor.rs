use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc;
use futures_util::StreamExt;
use sweeper_core::{Board, GameConfig, GameState, GameStatus, MoveRequest};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use super::{
    Cause, CloseReason, Command, HistoryEvent, Replayed, SessionError, SessionHandle,
    SessionHistory, Signal, Update,
};
use crate::clock::Clock;
use crate::settings::SessionSettings;
use crate::work::{WorkError, WorkExecutor, WorkItem, WorkOutput};

pub(crate) enum Origin {
    Fresh { id: String, config: GameConfig },
    Resumed { history: SessionHistory, replayed: Replayed },
}

struct SessionActor {
    id: String,
    state: watch::Sender<Arc<GameState>>,
    executor: Arc<dyn WorkExecutor>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    /// Inactivity deadline; pushed back by every accepted move or restart.
    deadline: Instant,
    history: SessionHistory,
}

/// Starts the actor task for one session and returns its first handle.
pub(crate) fn spawn(
    origin: Origin,
    executor: Arc<dyn WorkExecutor>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
) -> SessionHandle {
    let (id, initial, history, idle, pending) = match origin {
        Origin::Fresh { id, config } => {
            let mut history = SessionHistory::new();
            history.record(HistoryEvent::Started {
                id: id.clone(),
                config,
                at: clock.now(),
            });
            let initial = GameState::placeholder(id.clone());
            (id, initial, history, Duration::ZERO, Some(config))
        }
        Origin::Resumed { history, replayed } => {
            let idle = Duration::try_from(clock.now() - replayed.last_activity).unwrap_or_default();
            let pending = replayed.state.is_none().then_some(replayed.config);
            let initial = replayed
                .state
                .unwrap_or_else(|| GameState::placeholder(replayed.id.clone()));
            log::info!(
                "resuming session {} at {} after {idle:?} idle",
                replayed.id,
                initial.status
            );
            (replayed.id, initial, history, idle, pending)
        }
    };

    let (commands, receiver) = mpsc::unbounded();
    let (state, watcher) = watch::channel(Arc::new(initial));
    let handle = SessionHandle::new(Arc::from(id.as_str()), commands, watcher);

    let actor = SessionActor {
        id,
        state,
        executor,
        clock,
        deadline: Instant::now() + settings.inactivity_timeout().saturating_sub(idle),
        settings,
        history,
    };
    tokio::spawn(actor.run(pending, receiver));
    handle
}

impl SessionActor {
    async fn run(mut self, pending: Option<GameConfig>, mut commands: mpsc::UnboundedReceiver<Command>) {
        if let Some(config) = pending {
            self.initialize(config).await;
        }

        if self.current().status != GameStatus::Closed {
            let reason = self.serve(&mut commands).await;
            self.close(reason);
        }

        // closed: keep answering with the final state until every handle is gone
        while let Some(command) = commands.next().await {
            self.handle(command).await;
        }
        log::debug!("session {} released", self.id);
    }

    async fn serve(&mut self, commands: &mut mpsc::UnboundedReceiver<Command>) -> CloseReason {
        let period = self.settings.check_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.next() => match command {
                    Some(Command::Signal(Signal::Close)) => return CloseReason::Requested,
                    Some(command) => self.handle(command).await,
                    None => return CloseReason::Detached,
                },
                _ = ticker.tick() => {
                    if Instant::now() >= self.deadline {
                        return CloseReason::Inactive;
                    }
                }
            }
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Signal(Signal::MakeMove(request)) => {
                if let Err(err) = self.make_move(request).await {
                    log::warn!("session {}: dropped {} signal: {err}", self.id, request.action);
                }
            }
            Command::Signal(Signal::Restart(config)) => {
                if let Err(err) = self.restart(config).await {
                    log::warn!("session {}: dropped restart signal: {err}", self.id);
                }
            }
            Command::Signal(Signal::Close) => self.close(CloseReason::Requested),
            Command::Update { update, reply } => {
                let result = match update {
                    Update::MakeMove(request) => self.make_move(request).await,
                    Update::Restart(config) => self.restart(config).await,
                };
                // the caller may have stopped waiting
                let _ = reply.send(result);
            }
            Command::History { reply } => {
                let _ = reply.send(self.history.clone());
            }
        }
    }

    fn current(&self) -> Arc<GameState> {
        self.state.borrow().clone()
    }

    async fn initialize(&mut self, config: GameConfig) {
        log::info!(
            "starting session {} with {}x{} / {} mines",
            self.id,
            config.width,
            config.height,
            config.mine_count
        );
        match self.generate(config).await {
            Ok(board) => {
                self.commit(Cause::Initialized, GameState::new(self.id.clone(), board));
            }
            Err(err) => log::error!("session {}: first board was not generated: {err}", self.id),
        }
    }

    async fn make_move(&mut self, request: MoveRequest) -> Result<GameState, SessionError> {
        let current = self.current();
        if current.status.is_terminal() {
            log::debug!(
                "session {}: ignoring {} on a {} game",
                self.id,
                request.action,
                current.status
            );
            return Ok(GameState::clone(&current));
        }
        if !current.is_initialized() {
            return Err(SessionError::NotInitialized {
                id: self.id.clone(),
            });
        }

        let now = self.clock.now();
        let mut next = GameState::clone(&current);
        next.begin(now);

        let item = WorkItem::for_move(next, request, now);
        let name = item.name();
        let state = self.execute(item).await?.into_state(name)?;

        self.touch();
        Ok(self.commit(Cause::Move { request }, state))
    }

    async fn restart(&mut self, config: GameConfig) -> Result<GameState, SessionError> {
        let current = self.current();
        if current.status == GameStatus::Closed {
            log::debug!("session {}: ignoring restart of a closed game", self.id);
            return Ok(GameState::clone(&current));
        }

        let board = self.generate(config).await?;
        log::info!(
            "session {} restarted with {}x{} / {} mines",
            self.id,
            board.width(),
            board.height(),
            board.mine_count()
        );

        self.touch();
        Ok(self.commit(Cause::Restart { config }, GameState::new(self.id.clone(), board)))
    }

    fn close(&mut self, reason: CloseReason) {
        let current = self.current();
        if current.status == GameStatus::Closed {
            return;
        }

        let now = self.clock.now();
        let mut state = GameState::clone(&current);
        state.close(now);
        log::info!("session {} closed: {reason:?}", self.id);

        self.history.record(HistoryEvent::Closed { reason, at: now });
        self.state.send_replace(Arc::new(state));
    }

    async fn generate(&self, config: GameConfig) -> Result<Board, WorkError> {
        let item = WorkItem::GenerateBoard { config };
        let name = item.name();
        self.execute(item).await?.into_board(name)
    }

    async fn execute(&self, item: WorkItem) -> Result<WorkOutput, WorkError> {
        self.executor
            .execute(item)
            .await
            .inspect_err(|err| log::warn!("session {}: {err}", self.id))
    }

    fn touch(&mut self) {
        self.deadline = Instant::now() + self.settings.inactivity_timeout();
    }

    fn commit(&mut self, cause: Cause, state: GameState) -> GameState {
        self.history.record(HistoryEvent::Committed {
            cause,
            state: state.clone(),
            at: self.clock.now(),
        });
        self.state.send_replace(Arc::new(state.clone()));
        state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures_util::future::join_all;
    use pretty_assertions::assert_eq;
    use sweeper_core::{GameError, MoveAction};
    use time::OffsetDateTime;

    use super::*;
    use crate::clock::FixedClock;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Generates a fixed board (or fails everything) and counts what it ran.
    #[derive(Default)]
    struct TestExecutor {
        board: Option<Board>,
        refuse: bool,
        panic: bool,
        calls: AtomicUsize,
    }

    impl TestExecutor {
        fn with_board(board: Board) -> Self {
            Self {
                board: Some(board),
                ..Self::default()
            }
        }

        fn refusing() -> Self {
            Self {
                refuse: true,
                ..Self::default()
            }
        }

        fn panicking() -> Self {
            Self {
                panic: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WorkExecutor for TestExecutor {
        async fn execute(&self, item: WorkItem) -> Result<WorkOutput, WorkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = item.name();
            assert!(!self.panic, "executor blew up on {name}");
            if self.refuse {
                return Err(WorkError::TimedOut {
                    item: name,
                    after: Duration::from_secs(60),
                });
            }
            match (&self.board, item) {
                (Some(board), WorkItem::GenerateBoard { .. }) => Ok(WorkOutput::Board(board.clone())),
                (_, item) => item.run(7).map_err(|source| WorkError::Failed { item: name, source }),
            }
        }
    }

    fn corner_board() -> Board {
        Board::from_mine_coords((4, 4), &[(0, 0), (3, 3)]).unwrap()
    }

    fn epoch() -> Arc<dyn Clock> {
        Arc::new(FixedClock(OffsetDateTime::UNIX_EPOCH))
    }

    fn start(executor: Arc<TestExecutor>) -> SessionHandle {
        spawn(
            Origin::Fresh {
                id: "g".to_owned(),
                config: GameConfig::new(4, 4, 2),
            },
            executor,
            epoch(),
            SessionSettings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn commands_queue_behind_generation() {
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));

        let pending = handle.query();
        assert_eq!(pending, GameState::placeholder("g"));

        let state = handle.make_move(MoveRequest::flag(0, 0)).await.unwrap();

        assert_eq!(state.status, GameStatus::InProgress);
        assert_eq!(state.start_time, Some(OffsetDateTime::UNIX_EPOCH));
        assert_eq!(state.flags_used, 1);
        assert_eq!(handle.query(), state);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_updates_apply_one_at_a_time() {
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));
        let targets: Vec<_> = (0..4).flat_map(|row| (0..2).map(move |col| (row, col))).collect();

        let results = join_all(
            targets
                .iter()
                .map(|&(row, col)| handle.make_move(MoveRequest::flag(row, col))),
        )
        .await;

        let mut counts: Vec<_> = results.into_iter().map(|r| r.unwrap().flags_used).collect();
        counts.sort_unstable();
        assert_eq!(counts, (1..=8).collect::<Vec<_>>());
        assert_eq!(handle.query().flags_used, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_work_leaves_state_untouched() {
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));
        handle.make_move(MoveRequest::flag(1, 1)).await.unwrap();
        let before = handle.query();

        let err = handle.make_move(MoveRequest::reveal(9, 9)).await.unwrap_err();

        assert_eq!(
            err,
            SessionError::Work(WorkError::Failed {
                item: "apply_reveal",
                source: GameError::InvalidCoords,
            })
        );
        assert_eq!(handle.query(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn first_move_that_fails_does_not_start_the_game() {
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));

        assert!(handle.make_move(MoveRequest::chord(4, 0)).await.is_err());

        let state = handle.query();
        assert_eq!(state.status, GameStatus::NotStarted);
        assert_eq!(state.start_time, None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_generation_keeps_the_placeholder() {
        let executor = Arc::new(TestExecutor::refusing());
        let handle = start(executor.clone());

        let err = handle.make_move(MoveRequest::reveal(0, 0)).await.unwrap_err();
        assert_eq!(err, SessionError::NotInitialized { id: "g".to_owned() });

        let err = handle.restart(GameConfig::new(4, 4, 2)).await.unwrap_err();
        assert!(matches!(err, SessionError::Work(WorkError::TimedOut { .. })));

        assert_eq!(handle.query(), GameState::placeholder("g"));
        assert_eq!(executor.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn move_signals_are_applied_in_order() {
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));

        handle.signal(Signal::MakeMove(MoveRequest::flag(2, 2))).unwrap();
        handle
            .signal(Signal::MakeMove(MoveRequest::new(2, 2, MoveAction::Unflag)))
            .unwrap();
        handle.signal(Signal::MakeMove(MoveRequest::flag(1, 2))).unwrap();
        // an update queues behind the signals, so its reply observes all of them
        let state = handle.make_move(MoveRequest::flag(1, 3)).await.unwrap();

        let board = state.board().unwrap();
        assert!(!board[(2, 2)].is_flagged);
        assert!(board[(1, 2)].is_flagged);
        assert_eq!(state.flags_used, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_signals_deal_fresh_boards_until_closed() {
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));
        let fresh = GameState::new("g", corner_board());

        let won = handle.make_move(MoveRequest::reveal(0, 3)).await.unwrap();
        assert_eq!(won.status, GameStatus::Won);
        handle.signal(Signal::Restart(GameConfig::new(4, 4, 2))).unwrap();
        // a history request queues behind the signal
        handle.history().await.unwrap();
        assert_eq!(handle.query(), fresh);

        let lost = handle.make_move(MoveRequest::reveal(3, 3)).await.unwrap();
        assert_eq!(lost.status, GameStatus::Lost);
        handle.signal(Signal::Restart(GameConfig::new(4, 4, 2))).unwrap();
        handle.history().await.unwrap();
        assert_eq!(handle.query(), fresh);

        handle.close().unwrap();
        let closed = handle.closed().await.unwrap();
        handle.signal(Signal::Restart(GameConfig::new(4, 4, 2))).unwrap();
        let history = handle.history().await.unwrap();
        assert_eq!(handle.query(), closed);
        assert!(matches!(history.events().last(), Some(HistoryEvent::Closed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_deals_a_fresh_board_and_keeps_the_id() {
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));
        let lost = handle.make_move(MoveRequest::reveal(0, 0)).await.unwrap();
        assert_eq!(lost.status, GameStatus::Lost);

        let restarted = handle.restart(GameConfig::new(4, 4, 2)).await.unwrap();

        assert_eq!(restarted, GameState::new("g", corner_board()));
        assert_eq!(handle.query(), restarted);
    }

    #[tokio::test(start_paused = true)]
    async fn moves_after_a_loss_change_nothing() {
        let executor = Arc::new(TestExecutor::with_board(corner_board()));
        let handle = start(executor.clone());
        let lost = handle.make_move(MoveRequest::reveal(3, 3)).await.unwrap();
        let calls = executor.calls();

        let again = handle.make_move(MoveRequest::reveal(1, 1)).await.unwrap();

        assert_eq!(again, lost);
        assert_eq!(executor.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_terminal() {
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));
        handle.make_move(MoveRequest::flag(0, 0)).await.unwrap();

        handle.close().unwrap();
        let closed = handle.closed().await.unwrap();

        assert_eq!(closed.status, GameStatus::Closed);
        assert_eq!(closed.end_time, Some(OffsetDateTime::UNIX_EPOCH));
        assert_eq!(handle.make_move(MoveRequest::reveal(1, 1)).await.unwrap(), closed);
        assert_eq!(handle.restart(GameConfig::beginner()).await.unwrap(), closed);
        handle.signal(Signal::Close).unwrap();

        let history = handle.history().await.unwrap();
        let closes = history
            .events()
            .iter()
            .filter(|event| matches!(event, HistoryEvent::Closed { .. }))
            .count();
        assert_eq!(closes, 1);
        assert!(matches!(
            history.events().last(),
            Some(HistoryEvent::Closed {
                reason: CloseReason::Requested,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_before_the_first_board_closes_the_placeholder() {
        let handle = start(Arc::new(TestExecutor::refusing()));

        handle.close().unwrap();
        let closed = handle.closed().await.unwrap();

        assert_eq!(closed.status, GameStatus::Closed);
        assert!(!closed.is_initialized());
        assert_eq!(handle.make_move(MoveRequest::flag(0, 0)).await.unwrap(), closed);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_close_fails_when_the_actor_dies() {
        let handle = start(Arc::new(TestExecutor::panicking()));

        let err = handle.closed().await.unwrap_err();

        assert_eq!(err, SessionError::Stopped("g".to_owned()));
        assert_eq!(handle.query().status, GameStatus::NotStarted);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_close_after_the_inactivity_window() {
        let started = Instant::now();
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));

        let closed = handle.closed().await.unwrap();

        assert_eq!(closed.status, GameStatus::Closed);
        assert!(started.elapsed() >= DAY);
        assert!(started.elapsed() < DAY + Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_moves_push_the_deadline_back() {
        let started = Instant::now();
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));

        tokio::time::sleep(DAY - Duration::from_secs(3600)).await;
        handle.make_move(MoveRequest::flag(1, 1)).await.unwrap();
        tokio::time::sleep(DAY - Duration::from_secs(3600)).await;
        assert_eq!(handle.query().status, GameStatus::InProgress);

        handle.closed().await.unwrap();
        assert!(started.elapsed() >= 2 * DAY - Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn every_commit_records_its_full_state() {
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));
        let first = handle.make_move(MoveRequest::flag(1, 1)).await.unwrap();
        let second = handle.make_move(MoveRequest::flag(2, 2)).await.unwrap();

        let history = handle.history().await.unwrap();

        let committed: Vec<_> = history
            .events()
            .iter()
            .filter_map(|event| match event {
                HistoryEvent::Committed { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(history.len(), 4);
        assert_eq!(committed, [&GameState::new("g", corner_board()), &first, &second]);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_rebuilds_state_without_running_work() {
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));
        handle.make_move(MoveRequest::flag(1, 1)).await.unwrap();
        let played = handle.make_move(MoveRequest::flag(0, 0)).await.unwrap();
        let history = handle.history().await.unwrap();
        drop(handle);

        let executor = Arc::new(TestExecutor::refusing());
        let replayed = history.replay().unwrap();
        let resumed = spawn(
            Origin::Resumed {
                history: history.clone(),
                replayed,
            },
            executor.clone(),
            epoch(),
            SessionSettings::default(),
        );

        assert_eq!(resumed.query(), played);
        assert_eq!(resumed.history().await.unwrap(), history);
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_session_keeps_its_inactivity_deadline() {
        let handle = start(Arc::new(TestExecutor::with_board(corner_board())));
        handle.make_move(MoveRequest::flag(0, 0)).await.unwrap();
        let history = handle.history().await.unwrap();

        // a day and a bit has passed on the wall clock since that move
        let later = OffsetDateTime::UNIX_EPOCH + time::Duration::hours(25);
        let started = Instant::now();
        let resumed = spawn(
            Origin::Resumed {
                replayed: history.replay().unwrap(),
                history,
            },
            Arc::new(TestExecutor::refusing()),
            Arc::new(FixedClock(later)),
            SessionSettings::default(),
        );

        let closed = resumed.closed().await.unwrap();

        assert_eq!(closed.end_time, Some(later));
        assert!(started.elapsed() <= Duration::from_secs(60));
        let history = resumed.history().await.unwrap();
        assert!(matches!(
            history.events().last(),
            Some(HistoryEvent::Closed {
                reason: CloseReason::Inactive,
                ..
            })
        ));
    }
}
