use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Lobby: players gather and the host configures the game.
    Waiting,
    /// A game is running.
    Playing,
    /// The game is suspended between two rounds.
    Paused,
    /// The playlist is exhausted (or the room was torn down); results are shown.
    Finished,
}

/// Why a game reached [`RoomStatus::Finished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Every round of the playlist was played.
    PlaylistCompleted,
    /// The last player left.
    RoomEmptied,
}

/// Events that can be applied to the room status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Host starts a game from the lobby.
    StartGame,
    /// Pause quorum honoured at a phase boundary.
    Pause,
    /// Resume after a pause.
    Resume,
    /// Stop the game and show results.
    Finish(FinishReason),
    /// Abort the game and go straight back to the lobby.
    Cancel,
    /// Every player returned to the lobby after a game.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the machine was in when the event was received.
    pub from: RoomStatus,
    /// The rejected event.
    pub event: RoomEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    #[error("a transition is already pending")]
    AlreadyPending,
    /// The requested transition is not valid from the current status.
    #[error(transparent)]
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// No transition is currently pending.
    #[error("no transition is pending")]
    NoPending,
    /// Plan ID does not match the pending plan.
    #[error("pending transition {expected} does not match {got}")]
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// The status changed since the plan was created.
    #[error("status changed during transition (expected {expected:?}, got {actual:?})")]
    StatusMismatch {
        /// Status when the plan was created.
        expected: RoomStatus,
        /// Current status.
        actual: RoomStatus,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortError {
    /// No transition is currently pending.
    #[error("no transition is pending")]
    NoPending,
    /// Plan ID does not match the pending plan.
    #[error("pending transition {expected} does not match {got}")]
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A validated transition that has not been applied yet.
///
/// Used when the work backing a transition has to await an external service
/// without holding the room lock.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Status when the plan was created.
    pub from: RoomStatus,
    /// Status after applying the plan.
    pub to: RoomStatus,
    /// Event that triggered this plan.
    pub event: RoomEvent,
    /// When the plan was created.
    pub pending_since: Instant,
}

/// Room status machine: waiting → playing ⇄ paused → finished → waiting.
#[derive(Debug, Clone)]
pub struct RoomStateMachine {
    status: RoomStatus,
    version: usize,
    pending: Option<Plan>,
}

impl Default for RoomStateMachine {
    fn default() -> Self {
        Self {
            status: RoomStatus::Waiting,
            version: 0,
            pending: None,
        }
    }
}

impl RoomStateMachine {
    /// Create a state machine in the waiting status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Target status of the pending plan, if any.
    pub fn pending(&self) -> Option<RoomStatus> {
        self.pending.as_ref().map(|plan| plan.to)
    }

    /// Validate and immediately apply an event.
    pub fn transition(&mut self, event: RoomEvent) -> Result<RoomStatus, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.status = next;
        self.version += 1;
        Ok(next)
    }

    /// Plan a transition, reserving the machine until it is applied or aborted.
    pub fn plan(&mut self, event: RoomEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.status,
            to: next,
            event,
            pending_since: Instant::now(),
        };
        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Apply a planned transition and return the new status.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<RoomStatus, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.status != plan.from {
            return Err(ApplyError::StatusMismatch {
                expected: plan.from,
                actual: self.status,
            });
        }

        self.status = plan.to;
        self.version += 1;
        Ok(self.status)
    }

    /// Drop a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Force the machine into `status`, discarding any pending plan.
    ///
    /// Used when the last player leaves and the room is torn down.
    pub fn force(&mut self, status: RoomStatus) {
        self.pending = None;
        if self.status != status {
            self.status = status;
            self.version += 1;
        }
    }

    /// Discard any pending plan; returns whether one existed.
    pub fn discard_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }

    fn compute_transition(&self, event: RoomEvent) -> Result<RoomStatus, InvalidTransition> {
        use RoomStatus::*;

        let next = match (self.status, event) {
            (Waiting, RoomEvent::StartGame) => Playing,
            (Playing, RoomEvent::Pause) => Paused,
            (Paused, RoomEvent::Resume) => Playing,
            (Playing | Paused, RoomEvent::Finish(_)) => Finished,
            (Playing | Paused, RoomEvent::Cancel) => Waiting,
            (Finished, RoomEvent::Reset) => Waiting,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut RoomStateMachine, event: RoomEvent) -> RoomStatus {
        sm.transition(event).unwrap()
    }

    #[test]
    fn initial_status_is_waiting() {
        assert_eq!(RoomStateMachine::new().status(), RoomStatus::Waiting);
    }

    #[test]
    fn full_lifecycle_returns_to_waiting() {
        let mut sm = RoomStateMachine::new();
        assert_eq!(apply(&mut sm, RoomEvent::StartGame), RoomStatus::Playing);
        assert_eq!(apply(&mut sm, RoomEvent::Pause), RoomStatus::Paused);
        assert_eq!(apply(&mut sm, RoomEvent::Resume), RoomStatus::Playing);
        assert_eq!(
            apply(
                &mut sm,
                RoomEvent::Finish(FinishReason::PlaylistCompleted)
            ),
            RoomStatus::Finished
        );
        assert_eq!(apply(&mut sm, RoomEvent::Reset), RoomStatus::Waiting);
        assert_eq!(sm.version(), 5);
    }

    #[test]
    fn cancel_goes_back_to_waiting_from_pause() {
        let mut sm = RoomStateMachine::new();
        apply(&mut sm, RoomEvent::StartGame);
        apply(&mut sm, RoomEvent::Pause);
        assert_eq!(apply(&mut sm, RoomEvent::Cancel), RoomStatus::Waiting);
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut sm = RoomStateMachine::new();
        let err = sm.transition(RoomEvent::Pause).unwrap_err();
        assert_eq!(err.from, RoomStatus::Waiting);
        assert_eq!(err.event, RoomEvent::Pause);

        apply(&mut sm, RoomEvent::StartGame);
        assert!(sm.transition(RoomEvent::StartGame).is_err());
        assert!(sm.transition(RoomEvent::Reset).is_err());
    }

    #[test]
    fn planned_start_blocks_a_second_plan() {
        let mut sm = RoomStateMachine::new();
        let plan = sm.plan(RoomEvent::StartGame).unwrap();
        assert_eq!(sm.pending(), Some(RoomStatus::Playing));
        assert_eq!(
            sm.plan(RoomEvent::StartGame).unwrap_err(),
            PlanError::AlreadyPending
        );

        assert_eq!(sm.apply(plan.id).unwrap(), RoomStatus::Playing);
        assert!(sm.pending().is_none());
    }

    #[test]
    fn abort_clears_pending_and_keeps_status() {
        let mut sm = RoomStateMachine::new();
        let plan = sm.plan(RoomEvent::StartGame).unwrap();
        sm.abort(plan.id).unwrap();
        assert!(sm.pending().is_none());
        assert_eq!(sm.status(), RoomStatus::Waiting);
        assert_eq!(sm.abort(plan.id).unwrap_err(), AbortError::NoPending);
    }

    #[test]
    fn apply_rejects_foreign_plan_id() {
        let mut sm = RoomStateMachine::new();
        let plan = sm.plan(RoomEvent::StartGame).unwrap();
        let other = Uuid::new_v4();
        assert!(matches!(
            sm.apply(other),
            Err(ApplyError::IdMismatch { .. })
        ));
        assert_eq!(sm.pending(), Some(RoomStatus::Playing));
        sm.apply(plan.id).unwrap();
    }

    #[test]
    fn force_discards_pending_plan() {
        let mut sm = RoomStateMachine::new();
        sm.plan(RoomEvent::StartGame).unwrap();
        sm.force(RoomStatus::Finished);
        assert!(sm.pending().is_none());
        assert_eq!(sm.status(), RoomStatus::Finished);
    }
}
