//! A single game room: roster, status machine, round controller and votes.
//!
//! All mutations go through one `tokio::sync::Mutex` per room. Timer callbacks
//! and player messages take the same lock, so two events never mutate a room
//! concurrently. Calls to the song provider and the stats store happen with
//! the lock released; their results are applied only if the room is still in
//! the phase (and game generation) that issued the call.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use time::OffsetDateTime;
use tokio::{
    sync::{Mutex, broadcast},
    time::Instant,
};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::PhaseTimings,
    dao::{
        song_provider::{self, SongFilters, SongProvider, WatchListSource},
        stats_store::StatsStore,
    },
    dto::{
        phase::PhaseView,
        room::{
            GameOver, GameStarted, PauseState, PlayerResult, PlayerSummary, ResumeCountdown,
            RevealedSong, RoomCancelled, RosterUpdate, RoundReveal, RoundStart, SettingsUpdated,
            SyncState, TextMessage, VoteTally, VoteUpdate,
        },
        ws::ServerMessage,
    },
    error::ServiceError,
    services::{
        answer::{is_correct, normalize},
        game_service,
        stats_service::{self, StatsBatch},
        victory::VictoryReport,
    },
    state::{
        game::{PrecisionMode, ResponseMode, RoomSettings, RoundChoices, RoundItem},
        hub::RoomHub,
        mode::{ClassicMode, ModeStrategy},
        player::{Departure, Roster},
        state_machine::{FinishReason, PlanError, PlanId, RoomEvent, RoomStateMachine, RoomStatus},
        timer::{PhaseTimer, TimerKind},
        votes::{self, VoteKind, VoteSet},
    },
};

const HUB_CAPACITY: usize = 64;
/// Wrong answers shown next to the target in four-choice rounds.
const DECOY_COUNT: usize = 3;

/// External collaborators shared by every room.
pub struct RoomContext {
    /// Playlist and decoy source.
    pub provider: Arc<dyn SongProvider>,
    /// Per-account watched franchises.
    pub watch_lists: Arc<dyn WatchListSource>,
    /// Long-term statistics.
    pub stats: Arc<dyn StatsStore>,
    /// Phase delays.
    pub timings: PhaseTimings,
}

/// Result of [`Room::start_game`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The game is running and the intro timer is armed.
    Started,
    /// A game is already running or starting, or results are still shown.
    Ignored,
    /// No playable song matched the settings; the room stays in the lobby.
    NoContent,
    /// The game was cancelled or the room closed while the playlist was resolved.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Lobby,
    Starting {
        plan_id: PlanId,
    },
    Intro {
        started_at: Instant,
        duration: Duration,
    },
    Loading {
        round: usize,
    },
    Guess {
        round: usize,
        started_at: Instant,
        duration: Duration,
    },
    Reveal {
        round: usize,
        started_at: Instant,
        duration: Duration,
    },
    Paused {
        next_round: usize,
    },
    Resuming {
        next_round: usize,
        started_at: Instant,
        duration: Duration,
    },
    Finished,
}

/// Work that must run after the room lock is released.
enum FollowUp {
    BeginRound { round: usize, generation: u64 },
    PersistStats(StatsBatch),
}

struct RoomInner {
    machine: RoomStateMachine,
    roster: Roster,
    settings: RoomSettings,
    playlist: Vec<RoundItem>,
    round_index: Option<usize>,
    phase: Phase,
    choices: RoundChoices,
    pause_votes: VoteSet,
    skip_votes: VoteSet,
    pause_pending: bool,
    timer: PhaseTimer,
    game_id: Uuid,
    /// Bumped whenever a game starts, is cancelled or the room closes.
    game_generation: u64,
    report: Option<VictoryReport>,
}

impl RoomInner {
    fn new(settings: RoomSettings) -> Self {
        Self {
            machine: RoomStateMachine::new(),
            roster: Roster::new(),
            settings,
            playlist: Vec::new(),
            round_index: None,
            phase: Phase::Lobby,
            choices: RoundChoices::default(),
            pause_votes: VoteSet::new(),
            skip_votes: VoteSet::new(),
            pause_pending: false,
            timer: PhaseTimer::new(),
            game_id: Uuid::nil(),
            game_generation: 0,
            report: None,
        }
    }

    fn status(&self) -> RoomStatus {
        self.machine.status()
    }

    fn game_active(&self) -> bool {
        self.status() != RoomStatus::Waiting
    }

    fn is_loading(&self, round: usize, generation: u64) -> bool {
        self.game_generation == generation
            && matches!(self.phase, Phase::Loading { round: loading } if loading == round)
    }

    fn media_url(&self, index: usize) -> Option<String> {
        self.playlist.get(index).map(|item| item.media_url.clone())
    }

    fn clear_votes(&mut self) {
        self.pause_votes.clear();
        self.skip_votes.clear();
    }

    /// Drop every trace of the current game and go back to the lobby.
    fn reset_game_state(&mut self) {
        self.timer.cancel();
        self.game_generation += 1;
        self.phase = Phase::Lobby;
        self.playlist.clear();
        self.round_index = None;
        self.choices = RoundChoices::default();
        self.clear_votes();
        self.pause_pending = false;
        self.report = None;
        self.roster.reset_for_game();
        self.roster.clear_returned();
    }

    fn roster_update(&self) -> RosterUpdate {
        RosterUpdate {
            host_id: self.roster.host_id().map(str::to_string),
            players: PlayerSummary::roster(&self.roster, self.game_active()),
        }
    }

    fn vote_update(&self, kind: VoteKind) -> VoteUpdate {
        let count = match kind {
            VoteKind::Pause => self.pause_votes.count(),
            VoteKind::Skip => self.skip_votes.count(),
        };
        VoteUpdate {
            kind,
            count,
            required: votes::quorum(self.roster.len()),
            pending: self.pause_pending,
        }
    }

    fn phase_view(&self) -> PhaseView {
        match self.phase {
            Phase::Lobby => PhaseView::Lobby,
            Phase::Starting { .. } => PhaseView::Starting,
            Phase::Intro {
                started_at,
                duration,
            } => PhaseView::Intro {
                elapsed_ms: elapsed_ms(started_at, duration),
                duration_ms: millis(duration),
                first_media_url: self.media_url(0),
            },
            Phase::Loading { round } => PhaseView::Loading { round_index: round },
            Phase::Guess {
                round,
                started_at,
                duration,
            } => PhaseView::Guess {
                round_index: round,
                media_url: self.media_url(round).unwrap_or_default(),
                response_mode: self.settings.response_mode,
                choices: self.choices.clone(),
                elapsed_ms: elapsed_ms(started_at, duration),
                duration_ms: millis(duration),
            },
            Phase::Reveal {
                round,
                started_at,
                duration,
            } => match self.playlist.get(round) {
                Some(item) => PhaseView::Reveal {
                    round_index: round,
                    song: RevealedSong::from(item),
                    elapsed_ms: elapsed_ms(started_at, duration),
                    duration_ms: millis(duration),
                    next_media_url: self.media_url(round + 1),
                },
                None => PhaseView::Loading { round_index: round },
            },
            Phase::Paused { next_round } => PhaseView::Paused {
                next_round_index: next_round,
            },
            Phase::Resuming {
                next_round,
                started_at,
                duration,
            } => PhaseView::Resuming {
                next_round_index: next_round,
                elapsed_ms: elapsed_ms(started_at, duration),
                duration_ms: millis(duration),
            },
            Phase::Finished => PhaseView::Finished,
        }
    }

    fn sync_state(&self, code: &str) -> SyncState {
        SyncState {
            room: code.to_string(),
            status: self.status(),
            host_id: self.roster.host_id().map(str::to_string),
            settings: self.settings.clone(),
            players: PlayerSummary::roster(&self.roster, self.game_active()),
            total_rounds: self.playlist.len(),
            round_index: self.round_index,
            phase: self.phase_view(),
            pause_pending: self.pause_pending,
            votes: VoteTally {
                pause: self.pause_votes.count(),
                skip: self.skip_votes.count(),
                required: votes::quorum(self.roster.len()),
            },
            report: self.report.clone(),
        }
    }
}

/// A room identified by its join code, running games with the rules of `M`.
pub struct Room<M: ModeStrategy = ClassicMode> {
    code: String,
    mode: M,
    ctx: Arc<RoomContext>,
    hub: RoomHub,
    closed: AtomicBool,
    created_at: Instant,
    inner: Mutex<RoomInner>,
}

impl<M: ModeStrategy> Room<M> {
    /// Create an empty room in the lobby.
    pub fn new(code: String, mode: M, settings: RoomSettings, ctx: Arc<RoomContext>) -> Arc<Self> {
        Arc::new(Self {
            code,
            mode,
            ctx,
            hub: RoomHub::new(HUB_CAPACITY),
            closed: AtomicBool::new(false),
            created_at: Instant::now(),
            inner: Mutex::new(RoomInner::new(settings)),
        })
    }

    /// Join code of the room.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Subscribe to the room broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.hub.subscribe()
    }

    /// Whether the last player left and the room was torn down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the room when nobody joined it within `grace` of its creation.
    ///
    /// Returns whether the room is closed afterwards. A room whose lock is
    /// held by an in-flight operation is left alone until the next sweep.
    pub fn close_if_abandoned(&self, grace: Duration) -> bool {
        if self.is_closed() {
            return true;
        }
        if self.created_at.elapsed() < grace {
            return false;
        }
        let Ok(inner) = self.inner.try_lock() else {
            return false;
        };
        // Rooms that had players close on the last departure.
        if !inner.roster.is_empty() {
            return false;
        }
        self.closed.store(true, Ordering::SeqCst);
        info!(room = %self.code, "room never joined; closed");
        true
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> RoomStatus {
        self.inner.lock().await.status()
    }

    /// Full state for a client that just (re)connected.
    pub async fn sync_state(&self) -> SyncState {
        self.inner.lock().await.sync_state(&self.code)
    }

    /// Insert a player, or refresh the profile of a known connection.
    ///
    /// Players joining a room that shows results are treated as already back
    /// in the lobby.
    pub async fn add_player(
        &self,
        conn_id: &str,
        name: String,
        avatar: Option<String>,
        account_id: Option<String>,
    ) -> Result<SyncState, ServiceError> {
        let mut guard = self.inner.lock().await;
        if self.is_closed() {
            return Err(ServiceError::NotFound(format!(
                "room `{}` is closed",
                self.code
            )));
        }
        let inner = &mut *guard;

        let is_new = inner
            .roster
            .upsert(conn_id, name, avatar, account_id, false);
        if is_new {
            if inner.status() == RoomStatus::Finished {
                inner.roster.mark_returned(conn_id);
            }
            info!(
                room = %self.code,
                player = %conn_id,
                players = inner.roster.len(),
                "player joined"
            );
        }

        self.hub
            .broadcast(ServerMessage::Roster(inner.roster_update()));
        Ok(inner.sync_state(&self.code))
    }

    /// Remove a player. The last departure closes the room.
    pub async fn remove_player(self: &Arc<Self>, conn_id: &str) -> Departure {
        let (departure, follow_up) = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let departure = inner.roster.remove(conn_id);

            let follow_up = match &departure {
                Departure::Unknown => None,
                Departure::Emptied => {
                    self.teardown(inner);
                    None
                }
                Departure::Left { new_host } => {
                    info!(
                        room = %self.code,
                        player = %conn_id,
                        players = inner.roster.len(),
                        "player left"
                    );
                    if let Some(host) = new_host {
                        info!(room = %self.code, host = %host, "host handed over");
                    }
                    inner.pause_votes.remove(conn_id);
                    inner.skip_votes.remove(conn_id);

                    let follow_up = if inner.status() == RoomStatus::Finished
                        && inner.roster.all_returned()
                    {
                        self.reset_after_game(inner);
                        None
                    } else {
                        self.reevaluate_votes(inner)
                    };
                    self.hub
                        .broadcast(ServerMessage::Roster(inner.roster_update()));
                    follow_up
                }
            };
            (departure, follow_up)
        };

        if let Some(follow_up) = follow_up {
            self.run_follow_up(follow_up).await;
        }
        departure
    }

    /// Start a game from the lobby. Host only.
    pub async fn start_game(self: &Arc<Self>, conn_id: &str) -> Result<StartOutcome, ServiceError> {
        let (plan_id, generation, settings, accounts) = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            require_host(inner, conn_id, "start the game")?;

            if inner.status() != RoomStatus::Waiting {
                debug!(room = %self.code, status = ?inner.status(), "start ignored");
                return Ok(StartOutcome::Ignored);
            }
            let plan = match inner.machine.plan(RoomEvent::StartGame) {
                Ok(plan) => plan,
                Err(PlanError::AlreadyPending) => return Ok(StartOutcome::Ignored),
                Err(err) => return Err(err.into()),
            };

            inner.game_generation += 1;
            inner.phase = Phase::Starting { plan_id: plan.id };
            let accounts: Vec<String> = inner
                .roster
                .iter()
                .filter_map(|player| player.account_id.clone())
                .collect();
            (
                plan.id,
                inner.game_generation,
                inner.settings.clone(),
                accounts,
            )
        };

        let resolved = game_service::resolve_playlist(&self.ctx, &settings, &accounts).await;

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.game_generation != generation
            || !matches!(inner.phase, Phase::Starting { plan_id: current } if current == plan_id)
        {
            debug!(room = %self.code, "game start superseded");
            return Ok(StartOutcome::Superseded);
        }

        let playlist = match resolved {
            Ok(playlist) => playlist,
            Err(err) => {
                if let Err(abort_err) = inner.machine.abort(plan_id) {
                    warn!(room = %self.code, error = %abort_err, "failed to abort start plan");
                }
                inner.phase = Phase::Lobby;
                warn!(room = %self.code, error = %err, "game start aborted");
                self.hub.broadcast(ServerMessage::Error(TextMessage::new(
                    "No playable songs match the room settings",
                )));
                return Ok(StartOutcome::NoContent);
            }
        };

        if let Err(err) = inner.machine.apply(plan_id) {
            inner.phase = Phase::Lobby;
            return Err(err.into());
        }

        inner.roster.reset_for_game();
        inner.roster.clear_returned();
        inner.playlist = playlist.items;
        inner.round_index = None;
        inner.choices = RoundChoices::default();
        inner.clear_votes();
        inner.pause_pending = false;
        inner.report = None;
        inner.game_id = Uuid::new_v4();

        let intro = self.ctx.timings.intro_delay;
        inner.phase = Phase::Intro {
            started_at: Instant::now(),
            duration: intro,
        };
        self.arm(inner, TimerKind::Intro, intro);

        self.hub.broadcast(ServerMessage::GameStarted(GameStarted {
            game_id: inner.game_id,
            settings: inner.settings.clone(),
            players: PlayerSummary::roster(&inner.roster, true),
            total_rounds: inner.playlist.len(),
            first_media_url: inner.media_url(0),
            intro_delay_ms: millis(intro),
        }));
        if let Some(notice) = playlist.notice {
            self.hub
                .broadcast(ServerMessage::Notice(TextMessage::new(notice)));
        }

        info!(
            room = %self.code,
            game = %inner.game_id,
            rounds = inner.playlist.len(),
            players = inner.roster.len(),
            "game started"
        );
        Ok(StartOutcome::Started)
    }

    /// Lock in an answer for the running guess phase.
    ///
    /// Returns `false` when the answer was ignored: no guess phase is running
    /// or the player already answered this round.
    pub async fn submit_answer(
        &self,
        conn_id: &str,
        value: &str,
        mode: ResponseMode,
    ) -> Result<bool, ServiceError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !matches!(inner.phase, Phase::Guess { .. }) {
            debug!(room = %self.code, player = %conn_id, "answer outside guess phase ignored");
            return Ok(false);
        }
        let Some(player) = inner.roster.get_mut(conn_id) else {
            return Err(ServiceError::NotFound(format!(
                "player `{conn_id}` is not in room `{}`",
                self.code
            )));
        };
        if player.has_answered() {
            return Ok(false);
        }

        self.mode
            .handle_answer(&inner.settings, player, value, mode)?;
        self.hub
            .broadcast(ServerMessage::Roster(inner.roster_update()));
        Ok(true)
    }

    /// Resume a paused room, or toggle the caller's pause vote while playing.
    pub async fn toggle_pause(self: &Arc<Self>, conn_id: &str) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !inner.roster.contains(conn_id) {
            return;
        }

        match inner.status() {
            RoomStatus::Paused => self.resume(inner),
            RoomStatus::Playing => {
                inner.pause_votes.toggle(conn_id);
                inner.pause_pending = inner.pause_votes.reaches_quorum(inner.roster.len());
                self.hub
                    .broadcast(ServerMessage::VoteUpdate(inner.vote_update(VoteKind::Pause)));
            }
            status => {
                debug!(room = %self.code, player = %conn_id, status = ?status, "pause vote ignored")
            }
        }
    }

    /// Add the caller's skip vote; a quorum ends the running phase at once.
    pub async fn vote_skip(self: &Arc<Self>, conn_id: &str) {
        let follow_up = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            if !inner.roster.contains(conn_id)
                || !matches!(inner.phase, Phase::Guess { .. } | Phase::Reveal { .. })
            {
                debug!(room = %self.code, player = %conn_id, "skip vote ignored");
                return;
            }

            inner.skip_votes.add(conn_id);
            self.hub
                .broadcast(ServerMessage::VoteUpdate(inner.vote_update(VoteKind::Skip)));
            if inner.skip_votes.reaches_quorum(inner.roster.len()) {
                self.end_running_phase(inner)
            } else {
                None
            }
        };

        if let Some(follow_up) = follow_up {
            self.run_follow_up(follow_up).await;
        }
    }

    /// End the running guess or reveal phase immediately. Host only.
    pub async fn force_end_round(self: &Arc<Self>, conn_id: &str) -> Result<(), ServiceError> {
        let follow_up = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            require_host(inner, conn_id, "end the round")?;
            self.end_running_phase(inner)
        };

        if let Some(follow_up) = follow_up {
            self.run_follow_up(follow_up).await;
        }
        Ok(())
    }

    /// Abort the running (or starting) game and go back to the lobby. Host only.
    ///
    /// The room is fully reset before clients are notified.
    pub async fn cancel_game(&self, conn_id: &str) -> Result<(), ServiceError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        require_host(inner, conn_id, "cancel the game")?;

        match inner.status() {
            RoomStatus::Playing | RoomStatus::Paused => self.apply_event(inner, RoomEvent::Cancel),
            RoomStatus::Waiting if inner.machine.discard_pending() => {}
            status => {
                debug!(room = %self.code, status = ?status, "cancel ignored");
                return Ok(());
            }
        }

        inner.reset_game_state();
        self.hub
            .broadcast(ServerMessage::RoomCancelled(RoomCancelled {
                reason: "The host cancelled the game".into(),
            }));
        info!(room = %self.code, "game cancelled");
        Ok(())
    }

    /// Mark the caller as back in the lobby after a game.
    pub async fn return_to_lobby(&self, conn_id: &str) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.status() != RoomStatus::Finished || !inner.roster.mark_returned(conn_id) {
            return;
        }

        if inner.roster.all_returned() {
            self.reset_after_game(inner);
        }
        self.hub
            .broadcast(ServerMessage::Roster(inner.roster_update()));
    }

    /// Update the caller's lobby ready flag.
    pub async fn set_ready(&self, conn_id: &str, ready: bool) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.status() != RoomStatus::Waiting {
            return;
        }
        let Some(player) = inner.roster.get_mut(conn_id) else {
            return;
        };
        player.ready = ready;
        self.hub
            .broadcast(ServerMessage::Roster(inner.roster_update()));
    }

    /// Replace the room settings. Host only, lobby only.
    ///
    /// Returns `false` when ignored because a game is starting or running.
    pub async fn update_settings(
        &self,
        conn_id: &str,
        settings: RoomSettings,
    ) -> Result<bool, ServiceError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        require_host(inner, conn_id, "change the settings")?;
        settings.validate()?;

        if inner.status() != RoomStatus::Waiting || inner.machine.pending().is_some() {
            debug!(room = %self.code, "settings update outside the lobby ignored");
            return Ok(false);
        }

        inner.settings = settings;
        self.hub
            .broadcast(ServerMessage::SettingsUpdated(SettingsUpdated {
                settings: inner.settings.clone(),
            }));
        Ok(true)
    }

    fn apply_event(&self, inner: &mut RoomInner, event: RoomEvent) {
        if let Err(err) = inner.machine.transition(event) {
            warn!(room = %self.code, error = %err, "unexpected status transition");
        }
    }

    fn arm(self: &Arc<Self>, inner: &mut RoomInner, kind: TimerKind, delay: Duration) {
        let room = Arc::downgrade(self);
        inner.timer.arm(kind, delay, move |generation| async move {
            if let Some(room) = room.upgrade() {
                room.on_timer(generation).await;
            }
        });
    }

    fn on_timer(self: Arc<Self>, generation: u64) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let follow_up = {
                let mut guard = self.inner.lock().await;
                let inner = &mut *guard;
                match inner.timer.fire(generation) {
                    Some(TimerKind::Intro) => match inner.phase {
                        Phase::Intro { .. } => self.advance_to(inner, 0),
                        _ => None,
                    },
                    Some(TimerKind::Guess) => {
                        self.reveal(inner);
                        None
                    }
                    Some(TimerKind::Reveal) => self.finish_reveal(inner),
                    Some(TimerKind::Resume) => match inner.phase {
                        Phase::Resuming { next_round, .. } => self.advance_to(inner, next_round),
                        _ => None,
                    },
                    None => {
                        debug!(room = %self.code, "stale timer ignored");
                        None
                    }
                }
            };

            if let Some(follow_up) = follow_up {
                self.run_follow_up(follow_up).await;
            }
        })
    }

    async fn run_follow_up(self: &Arc<Self>, follow_up: FollowUp) {
        match follow_up {
            FollowUp::BeginRound { round, generation } => self.begin_round(round, generation).await,
            FollowUp::PersistStats(batch) => {
                stats_service::persist(self.ctx.stats.as_ref(), &self.code, batch).await
            }
        }
    }

    /// Move on to round `next`: game over past the end, pause when a pause is
    /// pending, otherwise prepare the round.
    fn advance_to(self: &Arc<Self>, inner: &mut RoomInner, next: usize) -> Option<FollowUp> {
        if next >= inner.playlist.len() {
            return self.finish_game(inner);
        }
        if inner.pause_pending {
            self.enter_pause(inner, next);
            return None;
        }

        inner.phase = Phase::Loading { round: next };
        inner.round_index = Some(next);
        inner.choices = RoundChoices::default();
        inner.clear_votes();
        for player in inner.roster.iter_mut() {
            player.reset_round();
        }
        debug!(room = %self.code, round = next, "preparing round");
        Some(FollowUp::BeginRound {
            round: next,
            generation: inner.game_generation,
        })
    }

    /// Fetch the choices of `round` without the lock, then open its guess phase.
    async fn begin_round(self: &Arc<Self>, round: usize, generation: u64) {
        let (target, precision, filters) = {
            let inner = self.inner.lock().await;
            if !inner.is_loading(round, generation) {
                return;
            }
            let Some(item) = inner.playlist.get(round) else {
                return;
            };
            let precision = inner.settings.precision;
            (
                item.correct_target(precision).to_string(),
                precision,
                SongFilters::from_settings(&inner.settings),
            )
        };

        let decoys = match self
            .ctx
            .provider
            .decoys(target.clone(), precision, filters, DECOY_COUNT)
            .await
        {
            Ok(decoys) => decoys,
            Err(err) => {
                warn!(room = %self.code, round, error = %err, "decoy generation failed");
                Vec::new()
            }
        };

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !inner.is_loading(round, generation) {
            debug!(room = %self.code, round, "round preparation superseded");
            return;
        }
        let Some(item) = inner.playlist.get(round) else {
            return;
        };
        let duration = item.guess_duration;
        let media_url = item.media_url.clone();

        let decoys = complete_decoys(decoys, &inner.playlist, &target, precision);
        inner.choices = shuffled_choices(&target, &decoys);
        inner.phase = Phase::Guess {
            round,
            started_at: Instant::now(),
            duration,
        };
        self.arm(
            inner,
            TimerKind::Guess,
            duration + self.ctx.timings.guess_buffer,
        );

        self.hub.broadcast(ServerMessage::RoundStart(RoundStart {
            round_index: round,
            total_rounds: inner.playlist.len(),
            media_url,
            guess_duration_ms: millis(duration),
            response_mode: inner.settings.response_mode,
            choices: inner.choices.clone(),
        }));
        debug!(room = %self.code, round, "guess phase opened");
    }

    /// Close the guess phase: score everyone and show the answer.
    fn reveal(self: &Arc<Self>, inner: &mut RoomInner) {
        let Phase::Guess { round, .. } = inner.phase else {
            return;
        };
        let Some(item) = inner.playlist.get(round).cloned() else {
            return;
        };
        inner.timer.cancel();

        let outcomes = self
            .mode
            .on_round_end(&inner.settings, &item, &mut inner.roster);
        inner.skip_votes.clear();

        let duration = self.ctx.timings.reveal_duration;
        inner.phase = Phase::Reveal {
            round,
            started_at: Instant::now(),
            duration,
        };
        self.arm(inner, TimerKind::Reveal, duration);

        self.hub.broadcast(ServerMessage::RoundReveal(RoundReveal {
            round_index: round,
            song: RevealedSong::from(&item),
            results: outcomes.into_iter().map(PlayerResult::from).collect(),
            players: PlayerSummary::roster(&inner.roster, true),
            reveal_duration_ms: millis(duration),
            next_media_url: inner.media_url(round + 1),
        }));
        debug!(room = %self.code, round, "round revealed");
    }

    fn finish_reveal(self: &Arc<Self>, inner: &mut RoomInner) -> Option<FollowUp> {
        let Phase::Reveal { round, .. } = inner.phase else {
            return None;
        };
        inner.timer.cancel();
        inner.skip_votes.clear();
        self.advance_to(inner, round + 1)
    }

    /// Skip quorum or host override: cut the guess or reveal phase short.
    fn end_running_phase(self: &Arc<Self>, inner: &mut RoomInner) -> Option<FollowUp> {
        match inner.phase {
            Phase::Guess { .. } => {
                self.reveal(inner);
                None
            }
            Phase::Reveal { .. } => self.finish_reveal(inner),
            _ => None,
        }
    }

    fn enter_pause(&self, inner: &mut RoomInner, next_round: usize) {
        self.apply_event(inner, RoomEvent::Pause);
        inner.phase = Phase::Paused { next_round };
        inner.pause_pending = false;
        inner.clear_votes();
        self.hub.broadcast(ServerMessage::PauseState(PauseState {
            paused: true,
            next_round_index: next_round,
        }));
        info!(room = %self.code, next_round, "room paused");
    }

    fn resume(self: &Arc<Self>, inner: &mut RoomInner) {
        let Phase::Paused { next_round } = inner.phase else {
            return;
        };
        self.apply_event(inner, RoomEvent::Resume);
        inner.pause_pending = false;
        inner.clear_votes();

        let countdown = self.ctx.timings.resume_countdown;
        inner.phase = Phase::Resuming {
            next_round,
            started_at: Instant::now(),
            duration: countdown,
        };
        self.arm(inner, TimerKind::Resume, countdown);

        self.hub.broadcast(ServerMessage::PauseState(PauseState {
            paused: false,
            next_round_index: next_round,
        }));
        self.hub
            .broadcast(ServerMessage::ResumeCountdown(ResumeCountdown {
                countdown_ms: millis(countdown),
                next_round_index: next_round,
            }));
        info!(room = %self.code, next_round, "room resumed");
    }

    fn finish_game(&self, inner: &mut RoomInner) -> Option<FollowUp> {
        inner.timer.cancel();
        let rounds = inner.playlist.len();
        let report = self
            .mode
            .check_victory(&inner.settings, &inner.roster, rounds);

        self.apply_event(inner, RoomEvent::Finish(FinishReason::PlaylistCompleted));
        inner.phase = Phase::Finished;
        inner.round_index = Some(rounds);
        inner.clear_votes();
        inner.pause_pending = false;
        inner.roster.clear_returned();
        inner.report = Some(report.clone());

        self.hub.broadcast(ServerMessage::GameOver(GameOver {
            game_id: inner.game_id,
            report: report.clone(),
            players: PlayerSummary::roster(&inner.roster, true),
        }));
        info!(room = %self.code, game = %inner.game_id, rounds, "game over");

        Some(FollowUp::PersistStats(StatsBatch::collect(
            inner.game_id,
            &inner.roster,
            &report,
            OffsetDateTime::now_utc(),
        )))
    }

    fn reset_after_game(&self, inner: &mut RoomInner) {
        self.apply_event(inner, RoomEvent::Reset);
        inner.reset_game_state();
        self.hub
            .broadcast(ServerMessage::SyncState(inner.sync_state(&self.code)));
        info!(room = %self.code, "room back in the lobby");
    }

    /// Departures shrink the quorum; re-check both vote sets.
    fn reevaluate_votes(self: &Arc<Self>, inner: &mut RoomInner) -> Option<FollowUp> {
        if inner.status() != RoomStatus::Playing {
            return None;
        }
        let live = inner.roster.len();

        let pending = inner.pause_votes.reaches_quorum(live);
        if pending != inner.pause_pending {
            inner.pause_pending = pending;
            self.hub
                .broadcast(ServerMessage::VoteUpdate(inner.vote_update(VoteKind::Pause)));
        }

        if inner.skip_votes.reaches_quorum(live) {
            return self.end_running_phase(inner);
        }
        None
    }

    fn teardown(&self, inner: &mut RoomInner) {
        self.closed.store(true, Ordering::SeqCst);
        inner.timer.cancel();
        inner.game_generation += 1;
        match inner.status() {
            RoomStatus::Playing | RoomStatus::Paused => {
                self.apply_event(inner, RoomEvent::Finish(FinishReason::RoomEmptied))
            }
            _ => inner.machine.force(RoomStatus::Finished),
        }
        inner.phase = Phase::Finished;
        inner.clear_votes();
        inner.pause_pending = false;
        info!(room = %self.code, "last player left; room closed");
    }
}

fn require_host(inner: &RoomInner, conn_id: &str, action: &str) -> Result<(), ServiceError> {
    if inner.roster.is_host(conn_id) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!("only the host can {action}")))
    }
}

/// Top up provider decoys with targets of other playlist items.
fn complete_decoys(
    mut decoys: Vec<String>,
    playlist: &[RoundItem],
    target: &str,
    precision: PrecisionMode,
) -> Vec<String> {
    decoys.retain(|decoy| !is_correct(Some(decoy.as_str()), &[target]));
    if decoys.len() >= DECOY_COUNT {
        decoys.truncate(DECOY_COUNT);
        return decoys;
    }

    let mut seen: HashSet<String> = decoys.iter().map(|decoy| normalize(decoy)).collect();
    seen.insert(normalize(target));
    for item in playlist {
        if decoys.len() >= DECOY_COUNT {
            break;
        }
        let candidate = item.correct_target(precision);
        if !is_correct(Some(candidate), &[target]) && seen.insert(normalize(candidate)) {
            decoys.push(candidate.to_string());
        }
    }
    decoys
}

/// Build both choice sets from one decoy pool so they always agree.
fn shuffled_choices(target: &str, decoys: &[String]) -> RoundChoices {
    let mut rng = rand::rng();

    let mut four = Vec::with_capacity(decoys.len() + 1);
    four.push(target.to_string());
    four.extend(decoys.iter().cloned());
    four.shuffle(&mut rng);

    let mut two = song_provider::two_choice(target, decoys);
    two.shuffle(&mut rng);

    RoundChoices { four, two }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn elapsed_ms(started_at: Instant, duration: Duration) -> u64 {
    millis(started_at.elapsed().min(duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{
            song_provider::{CatalogEntry, CatalogSongProvider},
            stats_store::MemoryStatsStore,
            watch_list::StaticWatchLists,
        },
        state::game::{Difficulty, SongType},
    };

    const GUESS: Duration = Duration::from_secs(20);
    /// Guess duration plus the server buffer.
    const GUESS_TIMER: Duration = Duration::from_secs(21);
    const REVEAL: Duration = Duration::from_secs(8);

    struct Fixture {
        room: Arc<Room>,
        rx: broadcast::Receiver<ServerMessage>,
        stats: Arc<MemoryStatsStore>,
    }

    /// Franchise names far enough apart that none passes for another.
    const FRANCHISES: [&str; 12] = [
        "Akira",
        "Berserk",
        "Claymore",
        "Durarara",
        "Eureka Seven",
        "Fullmetal Alchemist",
        "Gintama",
        "Haikyuu",
        "Inuyasha",
        "Jojo",
        "Kanon",
        "Lupin",
    ];

    fn catalog(size: u64) -> CatalogSongProvider {
        CatalogSongProvider::new(
            (1..=size)
                .map(|id| CatalogEntry {
                    id,
                    media_url: format!("https://media.example/{id}.webm"),
                    title: format!("{} opening", FRANCHISES[(id as usize - 1) % FRANCHISES.len()]),
                    aliases: Vec::new(),
                    franchise: FRANCHISES[(id as usize - 1) % FRANCHISES.len()].to_string(),
                    franchise_id: id,
                    difficulty: Difficulty::Medium,
                    song_type: SongType::Opening,
                    tags: Vec::new(),
                    year: Some(2001),
                    guess_duration: None,
                })
                .collect(),
        )
    }

    fn fixture_with(songs: u64, settings: RoomSettings) -> Fixture {
        let stats = Arc::new(MemoryStatsStore::new());
        let ctx = Arc::new(RoomContext {
            provider: Arc::new(catalog(songs)),
            watch_lists: Arc::new(StaticWatchLists::default()),
            stats: stats.clone(),
            timings: PhaseTimings::default(),
        });
        let room = Room::new("ABC234".into(), ClassicMode, settings, ctx);
        let rx = room.subscribe();
        Fixture { room, rx, stats }
    }

    fn fixture(songs: u64, rounds: usize) -> Fixture {
        fixture_with(
            songs,
            RoomSettings {
                round_count: rounds,
                guess_duration: GUESS,
                ..RoomSettings::default()
            },
        )
    }

    async fn join(room: &Arc<Room>, id: &str, account: Option<&str>) {
        room.add_player(id, format!("name-{id}"), None, account.map(str::to_string))
            .await
            .unwrap();
    }

    async fn advance(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Sleep past the intro so that round 0 is open.
    async fn start_and_open_first_round(fx: &mut Fixture) {
        assert_eq!(
            fx.room.start_game("p1").await.unwrap(),
            StartOutcome::Started
        );
        advance(Duration::from_millis(3_001)).await;
        drain(&mut fx.rx);
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn round_starts(messages: &[ServerMessage]) -> Vec<usize> {
        messages
            .iter()
            .filter_map(|message| match message {
                ServerMessage::RoundStart(start) => Some(start.round_index),
                _ => None,
            })
            .collect()
    }

    fn reveal_of(messages: Vec<ServerMessage>) -> Option<RoundReveal> {
        messages.into_iter().find_map(|message| match message {
            ServerMessage::RoundReveal(reveal) => Some(reveal),
            _ => None,
        })
    }

    async fn current_answer(room: &Room) -> String {
        let inner = room.inner.lock().await;
        let round = inner.round_index.unwrap();
        inner.playlist[round].franchise.clone()
    }

    #[tokio::test(start_paused = true)]
    async fn solo_game_runs_to_game_over_and_persists_stats() {
        let mut fx = fixture(10, 2);
        join(&fx.room, "p1", Some("acct-1")).await;

        assert_eq!(
            fx.room.start_game("p1").await.unwrap(),
            StartOutcome::Started
        );
        let started = drain(&mut fx.rx);
        assert!(started.iter().any(
            |message| matches!(message, ServerMessage::GameStarted(game) if game.total_rounds == 2 && game.first_media_url.is_some())
        ));

        advance(Duration::from_millis(3_001)).await;
        assert_eq!(round_starts(&drain(&mut fx.rx)), vec![0]);
        let answer = current_answer(&fx.room).await;
        assert!(
            fx.room
                .submit_answer("p1", &answer, ResponseMode::FreeText)
                .await
                .unwrap()
        );

        advance(GUESS_TIMER).await;
        let reveal = reveal_of(drain(&mut fx.rx)).unwrap();
        assert_eq!(reveal.round_index, 0);
        assert!(reveal.results[0].correct);
        assert_eq!(reveal.results[0].points, 5);
        assert!(reveal.next_media_url.is_some());

        advance(REVEAL).await;
        assert_eq!(round_starts(&drain(&mut fx.rx)), vec![1]);

        advance(GUESS_TIMER + REVEAL).await;
        let over = drain(&mut fx.rx)
            .into_iter()
            .find_map(|message| match message {
                ServerMessage::GameOver(over) => Some(over),
                _ => None,
            })
            .unwrap();
        let solo = over.report.solo.unwrap();
        assert_eq!(solo.max_score, 10);
        assert_eq!(solo.required_score, 6);
        assert_eq!(over.report.rankings[0].score, 5);
        assert!(!over.report.rankings[0].won);

        let state = fx.room.sync_state().await;
        assert_eq!(state.status, RoomStatus::Finished);
        assert_eq!(state.round_index, Some(2));
        assert_eq!(state.phase, PhaseView::Finished);

        let totals = fx.stats.totals("acct-1").unwrap();
        assert_eq!(totals.games_played, 1);
        assert_eq!(totals.games_won, 0);
        assert_eq!(totals.correct_guesses, 1);
        assert_eq!(fx.stats.songs_seen("acct-1").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_vote_waits_for_the_reveal_before_pausing() {
        let mut fx = fixture(10, 3);
        join(&fx.room, "p1", None).await;
        join(&fx.room, "p2", None).await;
        start_and_open_first_round(&mut fx).await;

        fx.room.toggle_pause("p2").await;
        let update = drain(&mut fx.rx)
            .into_iter()
            .find_map(|message| match message {
                ServerMessage::VoteUpdate(update) => Some(update),
                _ => None,
            })
            .unwrap();
        assert_eq!(update.kind, VoteKind::Pause);
        assert_eq!((update.count, update.required), (1, 1));
        assert!(update.pending);
        assert_eq!(fx.room.status().await, RoomStatus::Playing);

        advance(GUESS_TIMER).await;
        let messages = drain(&mut fx.rx);
        assert!(reveal_of(messages.clone()).is_some());
        assert!(
            !messages
                .iter()
                .any(|message| matches!(message, ServerMessage::PauseState(_)))
        );

        advance(REVEAL).await;
        let messages = drain(&mut fx.rx);
        assert!(messages.contains(&ServerMessage::PauseState(PauseState {
            paused: true,
            next_round_index: 1,
        })));
        assert!(round_starts(&messages).is_empty());
        assert_eq!(fx.room.status().await, RoomStatus::Paused);
        assert_eq!(
            fx.room.sync_state().await.phase,
            PhaseView::Paused {
                next_round_index: 1
            }
        );

        advance(Duration::from_secs(120)).await;
        assert!(drain(&mut fx.rx).is_empty());

        fx.room.toggle_pause("p1").await;
        let messages = drain(&mut fx.rx);
        assert!(messages.contains(&ServerMessage::ResumeCountdown(ResumeCountdown {
            countdown_ms: 3_000,
            next_round_index: 1,
        })));
        assert_eq!(fx.room.status().await, RoomStatus::Playing);

        advance(Duration::from_millis(3_001)).await;
        assert_eq!(round_starts(&drain(&mut fx.rx)), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_quorum_truncates_the_third_round() {
        let mut fx = fixture(12, 10);
        join(&fx.room, "p1", None).await;
        join(&fx.room, "p2", None).await;
        start_and_open_first_round(&mut fx).await;

        advance((GUESS_TIMER + REVEAL) * 2).await;
        assert_eq!(round_starts(&drain(&mut fx.rx)), vec![1, 2]);

        let answer = current_answer(&fx.room).await;
        fx.room
            .submit_answer("p1", &answer, ResponseMode::FreeText)
            .await
            .unwrap();
        fx.room
            .submit_answer("p2", "Totally wrong", ResponseMode::FreeText)
            .await
            .unwrap();
        advance(Duration::from_secs(5)).await;
        drain(&mut fx.rx);

        fx.room.vote_skip("p1").await;
        let reveal = reveal_of(drain(&mut fx.rx)).unwrap();
        assert_eq!(reveal.round_index, 2);
        assert!(reveal.results[0].correct);
        assert_eq!(reveal.results[0].points, 5);
        assert!(!reveal.results[1].correct);
        assert_eq!(reveal.results[1].answer.as_deref(), Some("Totally wrong"));
        assert!(matches!(
            fx.room.sync_state().await.phase,
            PhaseView::Reveal { round_index: 2, elapsed_ms: 0, .. }
        ));

        fx.room.vote_skip("p2").await;
        assert_eq!(round_starts(&drain(&mut fx.rx)), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_votes_are_ignored_outside_guess_and_reveal() {
        let mut fx = fixture(10, 3);
        join(&fx.room, "p1", None).await;
        fx.room.vote_skip("p1").await;
        assert!(drain(&mut fx.rx).is_empty());

        fx.room.start_game("p1").await.unwrap();
        drain(&mut fx.rx);
        fx.room.vote_skip("p1").await;
        assert!(drain(&mut fx.rx).is_empty());
        assert!(matches!(
            fx.room.sync_state().await.phase,
            PhaseView::Intro { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn departure_can_complete_the_skip_quorum() {
        let mut fx = fixture(10, 3);
        for id in ["p1", "p2", "p3"] {
            join(&fx.room, id, None).await;
        }
        start_and_open_first_round(&mut fx).await;

        fx.room.vote_skip("p1").await;
        assert!(reveal_of(drain(&mut fx.rx)).is_none());

        assert_eq!(
            fx.room.remove_player("p3").await,
            Departure::Left { new_host: None }
        );
        let reveal = reveal_of(drain(&mut fx.rx)).unwrap();
        assert_eq!(reveal.round_index, 0);
        assert_eq!(reveal.results.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_resets_the_room_before_notifying() {
        let mut fx = fixture(10, 5);
        join(&fx.room, "p1", None).await;
        join(&fx.room, "p2", None).await;
        start_and_open_first_round(&mut fx).await;
        let answer = current_answer(&fx.room).await;
        fx.room
            .submit_answer("p1", &answer, ResponseMode::FreeText)
            .await
            .unwrap();
        advance(GUESS_TIMER).await;
        drain(&mut fx.rx);

        let err = fx.room.cancel_game("p2").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        fx.room.cancel_game("p1").await.unwrap();
        let state = fx.room.sync_state().await;
        assert_eq!(state.status, RoomStatus::Waiting);
        assert_eq!(state.phase, PhaseView::Lobby);
        assert_eq!(state.total_rounds, 0);
        assert_eq!(state.round_index, None);
        assert!(state.players.iter().all(|player| player.score == 0));
        assert!(
            drain(&mut fx.rx)
                .iter()
                .any(|message| matches!(message, ServerMessage::RoomCancelled(_)))
        );

        advance(Duration::from_secs(60)).await;
        assert!(drain(&mut fx.rx).is_empty());

        assert_eq!(
            fx.room.start_game("p1").await.unwrap(),
            StartOutcome::Started
        );
    }

    #[tokio::test(start_paused = true)]
    async fn last_player_leaving_closes_the_room() {
        let mut fx = fixture(10, 5);
        join(&fx.room, "p1", None).await;
        start_and_open_first_round(&mut fx).await;

        assert_eq!(fx.room.remove_player("p1").await, Departure::Emptied);
        assert!(fx.room.is_closed());
        assert_eq!(fx.room.status().await, RoomStatus::Finished);

        advance(Duration::from_secs(120)).await;
        assert!(drain(&mut fx.rx).is_empty());

        assert_eq!(fx.room.remove_player("p1").await, Departure::Unknown);
        assert!(
            fx.room
                .add_player("p2", "late".into(), None, None)
                .await
                .is_err()
        );
    }

    async fn play_one_round_game(fx: &mut Fixture) {
        start_and_open_first_round(fx).await;
        fx.room.vote_skip("p1").await;
        fx.room.vote_skip("p2").await;
        assert!(
            drain(&mut fx.rx)
                .iter()
                .any(|message| matches!(message, ServerMessage::GameOver(_)))
        );
        assert_eq!(fx.room.status().await, RoomStatus::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn room_resets_once_everyone_returned() {
        let mut fx = fixture(10, 1);
        join(&fx.room, "p1", None).await;
        join(&fx.room, "p2", None).await;
        play_one_round_game(&mut fx).await;

        fx.room.return_to_lobby("p1").await;
        let state = fx.room.sync_state().await;
        assert_eq!(state.status, RoomStatus::Finished);
        assert!(state.report.is_some());
        let in_game: Vec<bool> = state.players.iter().map(|player| player.in_game).collect();
        assert_eq!(in_game, vec![false, true]);

        fx.room.return_to_lobby("p2").await;
        let state = fx.room.sync_state().await;
        assert_eq!(state.status, RoomStatus::Waiting);
        assert!(state.report.is_none());
        assert!(state.players.iter().all(|player| player.score == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn departure_of_the_last_holdout_resets_the_room() {
        let mut fx = fixture(10, 1);
        join(&fx.room, "p1", None).await;
        join(&fx.room, "p2", None).await;
        play_one_round_game(&mut fx).await;

        fx.room.return_to_lobby("p1").await;
        fx.room.remove_player("p2").await;
        assert_eq!(fx.room.status().await, RoomStatus::Waiting);
        assert!(!fx.room.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_catalog_keeps_the_room_waiting() {
        let mut fx = fixture(0, 5);
        join(&fx.room, "p1", None).await;
        drain(&mut fx.rx);

        assert_eq!(
            fx.room.start_game("p1").await.unwrap(),
            StartOutcome::NoContent
        );
        assert!(
            drain(&mut fx.rx)
                .iter()
                .any(|message| matches!(message, ServerMessage::Error(_)))
        );
        let state = fx.room.sync_state().await;
        assert_eq!(state.status, RoomStatus::Waiting);
        assert_eq!(state.phase, PhaseView::Lobby);

        assert_eq!(
            fx.room.start_game("p1").await.unwrap(),
            StartOutcome::NoContent
        );
    }

    #[tokio::test(start_paused = true)]
    async fn host_controls_follow_the_host_hand_over() {
        let fx = fixture(10, 3);
        join(&fx.room, "p1", None).await;
        join(&fx.room, "p2", None).await;

        assert!(matches!(
            fx.room.start_game("p2").await.unwrap_err(),
            ServiceError::Forbidden(_)
        ));
        assert!(matches!(
            fx.room
                .update_settings("p2", RoomSettings::default())
                .await
                .unwrap_err(),
            ServiceError::Forbidden(_)
        ));

        assert_eq!(
            fx.room.remove_player("p1").await,
            Departure::Left {
                new_host: Some("p2".into())
            }
        );
        assert_eq!(
            fx.room.start_game("p2").await.unwrap(),
            StartOutcome::Started
        );
        assert_eq!(
            fx.room.start_game("p2").await.unwrap(),
            StartOutcome::Ignored
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_answer_locks_in() {
        let mut fx = fixture(10, 3);
        join(&fx.room, "p1", None).await;

        assert_eq!(
            fx.room.start_game("p1").await.unwrap(),
            StartOutcome::Started
        );
        assert!(
            !fx.room
                .submit_answer("p1", "too early", ResponseMode::FreeText)
                .await
                .unwrap()
        );
        advance(Duration::from_millis(3_001)).await;

        assert!(
            fx.room
                .submit_answer("p1", "Totally wrong", ResponseMode::FreeText)
                .await
                .unwrap()
        );
        let answer = current_answer(&fx.room).await;
        assert!(
            !fx.room
                .submit_answer("p1", &answer, ResponseMode::FreeText)
                .await
                .unwrap()
        );
        assert!(matches!(
            fx.room
                .submit_answer("ghost", &answer, ResponseMode::FreeText)
                .await
                .unwrap_err(),
            ServiceError::NotFound(_)
        ));

        drain(&mut fx.rx);
        advance(GUESS_TIMER).await;
        let reveal = reveal_of(drain(&mut fx.rx)).unwrap();
        assert!(!reveal.results[0].correct);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_state_reports_elapsed_time() {
        let fx = fixture(10, 3);
        join(&fx.room, "p1", None).await;
        fx.room.start_game("p1").await.unwrap();

        match fx.room.sync_state().await.phase {
            PhaseView::Intro {
                duration_ms,
                first_media_url,
                ..
            } => {
                assert_eq!(duration_ms, 3_000);
                assert!(first_media_url.is_some());
            }
            other => panic!("unexpected phase {other:?}"),
        }

        advance(Duration::from_millis(3_001)).await;
        advance(Duration::from_secs(5)).await;
        let state = fx.room.sync_state().await;
        assert_eq!(state.round_index, Some(0));
        match state.phase {
            PhaseView::Guess {
                round_index,
                elapsed_ms,
                duration_ms,
                ..
            } => {
                assert_eq!(round_index, 0);
                assert!((5_000..=5_001).contains(&elapsed_ms));
                assert_eq!(duration_ms, 20_000);
            }
            other => panic!("unexpected phase {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pause_vote_toggles_back() {
        let mut fx = fixture(10, 3);
        for id in ["p1", "p2", "p3"] {
            join(&fx.room, id, None).await;
        }
        start_and_open_first_round(&mut fx).await;

        fx.room.toggle_pause("p1").await;
        fx.room.toggle_pause("p1").await;
        let state = fx.room.sync_state().await;
        assert_eq!(state.votes.pause, 0);
        assert!(!state.pause_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn choice_rounds_share_one_decoy_pool() {
        let mut fx = fixture_with(
            10,
            RoomSettings {
                round_count: 2,
                guess_duration: GUESS,
                response_mode: ResponseMode::FourChoice,
                ..RoomSettings::default()
            },
        );
        join(&fx.room, "p1", None).await;
        fx.room.start_game("p1").await.unwrap();
        advance(Duration::from_millis(3_001)).await;

        let start = drain(&mut fx.rx)
            .into_iter()
            .find_map(|message| match message {
                ServerMessage::RoundStart(start) => Some(start),
                _ => None,
            })
            .unwrap();
        let target = current_answer(&fx.room).await;
        assert_eq!(start.response_mode, ResponseMode::FourChoice);
        assert_eq!(start.choices.four.len(), 4);
        assert!(start.choices.four.contains(&target));
        assert_eq!(start.choices.two.len(), 2);
        assert!(start.choices.two.contains(&target));
        assert!(
            start
                .choices
                .two
                .iter()
                .all(|choice| start.choices.four.contains(choice))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn settings_change_only_in_the_lobby() {
        let mut fx = fixture(10, 3);
        join(&fx.room, "p1", None).await;
        drain(&mut fx.rx);

        let settings = RoomSettings {
            round_count: 2,
            ..RoomSettings::default()
        };
        assert!(
            fx.room
                .update_settings("p1", settings.clone())
                .await
                .unwrap()
        );
        assert!(
            drain(&mut fx.rx)
                .contains(&ServerMessage::SettingsUpdated(SettingsUpdated { settings }))
        );

        fx.room.start_game("p1").await.unwrap();
        assert!(
            !fx.room
                .update_settings("p1", RoomSettings::default())
                .await
                .unwrap()
        );
        assert_eq!(fx.room.sync_state().await.total_rounds, 2);
    }

    fn franchise_item(id: u64, franchise: &str) -> RoundItem {
        RoundItem {
            song_id: id,
            media_url: String::new(),
            title: format!("{franchise} opening"),
            aliases: Vec::new(),
            franchise: franchise.to_string(),
            franchise_id: id,
            song_type: SongType::Opening,
            year: None,
            guess_duration: GUESS,
        }
    }

    #[test]
    fn decoys_are_topped_up_from_the_playlist() {
        let playlist: Vec<RoundItem> = ["Akira", "Berserk", "Claymore", "Durarara"]
            .into_iter()
            .zip(1..)
            .map(|(franchise, id)| franchise_item(id, franchise))
            .collect();

        let decoys = complete_decoys(
            vec!["Berserk".into()],
            &playlist,
            "Akira",
            PrecisionMode::Franchise,
        );
        assert_eq!(decoys, vec!["Berserk", "Claymore", "Durarara"]);
    }

    #[test]
    fn decoys_matching_the_target_fuzzily_are_replaced() {
        let playlist = vec![
            franchise_item(1, "Bleach"),
            franchise_item(2, "Bleach 2"),
            franchise_item(3, "Claymore"),
            franchise_item(4, "Durarara"),
            franchise_item(5, "Monster"),
        ];

        let decoys = complete_decoys(
            vec!["Bleach!".into(), "Berserk".into()],
            &playlist,
            "Bleach",
            PrecisionMode::Franchise,
        );
        assert_eq!(decoys, vec!["Berserk", "Claymore", "Durarara"]);
        assert!(!decoys.iter().any(|decoy| is_correct(Some(decoy.as_str()), &["Bleach"])));
    }
}
