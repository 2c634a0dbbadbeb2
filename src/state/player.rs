use std::collections::HashSet;

use indexmap::IndexMap;

use crate::state::game::ResponseMode;

/// Player info tracked for the lifetime of a connection inside a room.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Ephemeral connection identifier.
    pub id: String,
    /// Durable account identifier, if the player is signed in.
    pub account_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Avatar reference rendered by clients.
    pub avatar: Option<String>,
    /// Score for the current game; never decreases during a game.
    pub score: u32,
    /// Consecutive correct answers, reset on any miss.
    pub streak: u32,
    /// Longest streak reached during the current game.
    pub best_streak: u32,
    /// Correct answers during the current game.
    pub correct_count: u32,
    /// Answer submitted for the current round.
    pub answer: Option<String>,
    /// Response mode the current answer was scored with.
    pub answer_mode: Option<ResponseMode>,
    /// Correctness of the current round answer, known after the reveal.
    pub correct: Option<bool>,
    /// Points earned in the current round.
    pub round_points: u32,
    /// Lobby ready flag.
    pub ready: bool,
    /// Songs already served to this player in the current game.
    pub songs_seen: Vec<u64>,
}

impl Player {
    /// Build a player with zeroed game fields.
    pub fn new(
        id: String,
        name: String,
        avatar: Option<String>,
        account_id: Option<String>,
        ready: bool,
    ) -> Self {
        Self {
            id,
            account_id,
            name,
            avatar,
            score: 0,
            streak: 0,
            best_streak: 0,
            correct_count: 0,
            answer: None,
            answer_mode: None,
            correct: None,
            round_points: 0,
            ready,
            songs_seen: Vec::new(),
        }
    }

    /// Whether an answer was locked in for the current round.
    pub fn has_answered(&self) -> bool {
        self.answer.is_some()
    }

    /// Clear the per-round answer state.
    pub fn reset_round(&mut self) {
        self.answer = None;
        self.answer_mode = None;
        self.correct = None;
        self.round_points = 0;
    }

    /// Clear every transient field before a new game.
    pub fn reset_game(&mut self) {
        self.reset_round();
        self.score = 0;
        self.streak = 0;
        self.best_streak = 0;
        self.correct_count = 0;
        self.songs_seen.clear();
    }

    /// Apply the outcome of a round to score and streak.
    pub fn record_round(&mut self, correct: bool, points: u32) {
        self.correct = Some(correct);
        self.round_points = points;
        self.score += points;
        if correct {
            self.streak += 1;
            self.correct_count += 1;
            self.best_streak = self.best_streak.max(self.streak);
        } else {
            self.streak = 0;
        }
    }
}

/// Result of [`Roster::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The id was not in the roster.
    Unknown,
    /// The player left; the room still has players.
    Left {
        /// New host when the departing player was the host.
        new_host: Option<String>,
    },
    /// The last player left.
    Emptied,
}

/// Ordered player roster with host tracking and the post-game "returned" set.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: IndexMap<String, Player>,
    host_id: Option<String>,
    returned: HashSet<String>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new player or refresh the profile of an existing one.
    ///
    /// Refreshing keeps score and round state. The first player becomes host.
    /// Returns `true` when the player is new.
    pub fn upsert(
        &mut self,
        id: &str,
        name: String,
        avatar: Option<String>,
        account_id: Option<String>,
        ready: bool,
    ) -> bool {
        if self.host_id.is_none() {
            self.host_id = Some(id.to_string());
        }

        match self.players.get_mut(id) {
            Some(existing) => {
                existing.name = name;
                existing.avatar = avatar;
                existing.ready = ready;
                if account_id.is_some() {
                    existing.account_id = account_id;
                }
                false
            }
            None => {
                self.players.insert(
                    id.to_string(),
                    Player::new(id.to_string(), name, avatar, account_id, ready),
                );
                true
            }
        }
    }

    /// Remove a player, handing the host role to the earliest remaining player.
    pub fn remove(&mut self, id: &str) -> Departure {
        if self.players.shift_remove(id).is_none() {
            return Departure::Unknown;
        }
        self.returned.remove(id);

        if self.players.is_empty() {
            self.host_id = None;
            return Departure::Emptied;
        }

        let new_host = if self.host_id.as_deref() == Some(id) {
            self.host_id = self.players.keys().next().cloned();
            self.host_id.clone()
        } else {
            None
        };
        Departure::Left { new_host }
    }

    /// Current host identifier.
    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    /// Whether `id` is the host.
    pub fn is_host(&self, id: &str) -> bool {
        self.host_id.as_deref() == Some(id)
    }

    /// Look up a player.
    pub fn get(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    /// Look up a player mutably.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// Whether `id` is in the roster.
    pub fn contains(&self, id: &str) -> bool {
        self.players.contains_key(id)
    }

    /// Live roster size.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether nobody is in the room.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Players in join order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    /// Mark a player as back in the lobby after a game. Returns `false` for
    /// unknown players.
    pub fn mark_returned(&mut self, id: &str) -> bool {
        if !self.players.contains_key(id) {
            return false;
        }
        self.returned.insert(id.to_string());
        true
    }

    /// Whether the player already went back to the lobby.
    pub fn has_returned(&self, id: &str) -> bool {
        self.returned.contains(id)
    }

    /// Whether every remaining player has returned to the lobby.
    pub fn all_returned(&self) -> bool {
        !self.players.is_empty() && self.players.keys().all(|id| self.returned.contains(id))
    }

    /// Forget who returned to the lobby.
    pub fn clear_returned(&mut self) {
        self.returned.clear();
    }

    /// Reset all transient game fields.
    pub fn reset_for_game(&mut self) {
        for player in self.players.values_mut() {
            player.reset_game();
        }
    }
}
