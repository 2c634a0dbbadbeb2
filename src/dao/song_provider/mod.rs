//! Boundary with the song catalog: playlist selection and decoy generation.

mod catalog;

use std::{collections::HashSet, time::Duration};

use futures::future::BoxFuture;
use thiserror::Error;

use crate::state::game::{Difficulty, PrecisionMode, RoomSettings, RoundItem, SongType};

pub use self::catalog::{CatalogEntry, CatalogSongProvider};

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failures raised by the song provider or the watch-list source.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The catalog could not be loaded.
    #[error("failed to load catalog `{path}`")]
    Catalog {
        /// Catalog location.
        path: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Selection criteria derived from the room settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongFilters {
    /// Accepted difficulty tiers; empty accepts all.
    pub difficulties: Vec<Difficulty>,
    /// Accepted song kinds; empty accepts all.
    pub song_types: Vec<SongType>,
    /// Tag or curated playlist name.
    pub tag: Option<String>,
    /// Decade such as `1990`.
    pub decade: Option<u16>,
    /// Franchise ids the players watched, when restricted.
    pub watched_ids: Option<HashSet<u64>>,
}

impl SongFilters {
    /// Build filters from room settings, without any watch-list restriction.
    pub fn from_settings(settings: &RoomSettings) -> Self {
        Self {
            difficulties: vec![settings.difficulty],
            song_types: settings.song_types.clone(),
            tag: settings.tag.clone(),
            decade: settings.decade,
            watched_ids: None,
        }
    }

    /// Restrict the filters to the given franchise ids.
    pub fn with_watched(mut self, watched_ids: HashSet<u64>) -> Self {
        self.watched_ids = Some(watched_ids);
        self
    }
}

/// Ordered playlist returned by [`SongProvider::select`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Playlist in play order.
    pub items: Vec<RoundItem>,
    /// Whether the filtered pool was too small and broader songs were added.
    pub backfilled: bool,
}

/// External collaborator supplying playlists and wrong-answer candidates.
pub trait SongProvider: Send + Sync {
    /// Pick up to `count` songs matching `filters`, backfilling when the pool is short.
    fn select(
        &self,
        count: usize,
        filters: SongFilters,
        guess_duration: Duration,
    ) -> BoxFuture<'static, ProviderResult<Selection>>;

    /// Produce `count` distinct wrong answers for `target`.
    fn decoys(
        &self,
        target: String,
        precision: PrecisionMode,
        filters: SongFilters,
        count: usize,
    ) -> BoxFuture<'static, ProviderResult<Vec<String>>>;
}

/// Source of per-account watched franchise ids.
pub trait WatchListSource: Send + Sync {
    /// Franchise ids watched by `account_id`, or `None` when the account has no list.
    fn watched(&self, account_id: &str) -> BoxFuture<'static, ProviderResult<Option<HashSet<u64>>>>;
}

/// Derive the two-choice set from already generated four-choice decoys.
///
/// Both sets share the same decoy pool: the two-choice decoy is the first
/// four-choice decoy.
pub fn two_choice(target: &str, four_choice_decoys: &[String]) -> Vec<String> {
    let mut choices = vec![target.to_string()];
    choices.extend(four_choice_decoys.first().cloned());
    choices
}
