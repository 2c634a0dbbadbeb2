use std::collections::HashSet;

use serde::Serialize;
use utoipa::ToSchema;

/// Which vote set a tally refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    /// Soft pause at the next phase boundary.
    Pause,
    /// Hard skip of the running phase.
    Skip,
}

/// Votes needed out of `live_players`: half the roster, rounded up.
///
/// A solo room always needs exactly one vote.
pub fn quorum(live_players: usize) -> usize {
    live_players.div_ceil(2).max(1)
}

/// Set of player ids that voted. Re-adding a voter is a no-op.
#[derive(Debug, Clone, Default)]
pub struct VoteSet {
    voters: HashSet<String>,
}

impl VoteSet {
    /// Create an empty vote set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a voter. Returns `false` if they had already voted.
    pub fn add(&mut self, voter: &str) -> bool {
        self.voters.insert(voter.to_string())
    }

    /// Flip a voter's membership. Returns `true` if they are now voting.
    pub fn toggle(&mut self, voter: &str) -> bool {
        if self.voters.remove(voter) {
            false
        } else {
            self.voters.insert(voter.to_string());
            true
        }
    }

    /// Drop a voter, e.g. when they leave the room.
    pub fn remove(&mut self, voter: &str) -> bool {
        self.voters.remove(voter)
    }

    /// Number of votes cast.
    pub fn count(&self) -> usize {
        self.voters.len()
    }

    /// Whether the vote reaches quorum for the given live roster size.
    pub fn reaches_quorum(&self, live_players: usize) -> bool {
        live_players > 0 && self.count() >= quorum(live_players)
    }

    /// Forget every vote.
    pub fn clear(&mut self) {
        self.voters.clear();
    }
}
