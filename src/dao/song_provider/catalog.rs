use std::{collections::HashSet, fs, path::Path, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};

use super::{ProviderError, ProviderResult, Selection, SongFilters, SongProvider};
use crate::{
    services::answer::{is_correct, normalize},
    state::game::{Difficulty, PrecisionMode, RoundItem, SongType},
};

/// One song of the JSON catalog.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    /// Song identifier.
    pub id: u64,
    /// Streamable media reference.
    pub media_url: String,
    /// Exact entry title.
    pub title: String,
    /// Alternative titles.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Franchise title.
    pub franchise: String,
    /// Franchise identifier, matched against watch lists.
    pub franchise_id: u64,
    /// Difficulty tier.
    pub difficulty: Difficulty,
    /// Song kind.
    pub song_type: SongType,
    /// Free-form tags and curated playlist names.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Release year.
    #[serde(default)]
    pub year: Option<u16>,
    /// Per-song guess duration overriding the room setting.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default, rename = "guess_duration_ms")]
    pub guess_duration: Option<Duration>,
}

impl CatalogEntry {
    fn matches(&self, filters: &SongFilters, with_watched: bool) -> bool {
        if !filters.difficulties.is_empty() && !filters.difficulties.contains(&self.difficulty) {
            return false;
        }
        if !filters.song_types.is_empty() && !filters.song_types.contains(&self.song_type) {
            return false;
        }
        if let Some(tag) = &filters.tag {
            if !self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        if let Some(decade) = filters.decade {
            if self.year.map(|year| year / 10 * 10) != Some(decade) {
                return false;
            }
        }
        match (&filters.watched_ids, with_watched) {
            (Some(watched), true) => watched.contains(&self.franchise_id),
            _ => true,
        }
    }

    fn to_round_item(&self, default_guess: Duration) -> RoundItem {
        RoundItem {
            song_id: self.id,
            media_url: self.media_url.clone(),
            title: self.title.clone(),
            aliases: self.aliases.clone(),
            franchise: self.franchise.clone(),
            franchise_id: self.franchise_id,
            song_type: self.song_type,
            year: self.year,
            guess_duration: self.guess_duration.unwrap_or(default_guess),
        }
    }

    fn answer_for(&self, precision: PrecisionMode) -> &str {
        match precision {
            PrecisionMode::Franchise => &self.franchise,
            PrecisionMode::ExactTitle => &self.title,
        }
    }
}

/// In-memory song provider backed by a JSON catalog file.
#[derive(Clone, Default)]
pub struct CatalogSongProvider {
    entries: Arc<Vec<CatalogEntry>>,
}

impl CatalogSongProvider {
    /// Build a provider over the given entries.
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Load a catalog from a JSON array on disk.
    pub fn load(path: &Path) -> ProviderResult<Self> {
        let catalog_err = |source: Box<dyn std::error::Error + Send + Sync>| ProviderError::Catalog {
            path: path.display().to_string(),
            source,
        };
        let contents = fs::read_to_string(path).map_err(|err| catalog_err(Box::new(err)))?;
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(&contents).map_err(|err| catalog_err(Box::new(err)))?;
        Ok(Self::new(entries))
    }

    /// Number of songs in the catalog.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn pick(&self, count: usize, filters: &SongFilters, guess_duration: Duration) -> Selection {
        let mut rng = rand::rng();
        let mut picked: Vec<&CatalogEntry> = Vec::with_capacity(count);
        let mut taken: HashSet<u64> = HashSet::new();
        let mut backfilled = false;

        // Strict pool first, then without the watch-list restriction, then anything.
        let passes: [&dyn Fn(&CatalogEntry) -> bool; 3] = [
            &|entry: &CatalogEntry| entry.matches(filters, true),
            &|entry: &CatalogEntry| entry.matches(filters, false),
            &|_: &CatalogEntry| true,
        ];

        for (pass, accept) in passes.iter().enumerate() {
            if picked.len() >= count {
                break;
            }
            let mut pool: Vec<&CatalogEntry> = self
                .entries
                .iter()
                .filter(|entry| !taken.contains(&entry.id) && accept(*entry))
                .collect();
            pool.shuffle(&mut rng);

            for entry in pool.into_iter().take(count - picked.len()) {
                taken.insert(entry.id);
                picked.push(entry);
                if pass > 0 {
                    backfilled = true;
                }
            }
        }

        Selection {
            items: picked
                .into_iter()
                .map(|entry| entry.to_round_item(guess_duration))
                .collect(),
            backfilled,
        }
    }

    fn pick_decoys(
        &self,
        target: &str,
        precision: PrecisionMode,
        filters: &SongFilters,
        count: usize,
    ) -> Vec<String> {
        let mut rng = rand::rng();
        let mut seen: HashSet<String> = HashSet::from([normalize(target)]);
        let mut decoys = Vec::with_capacity(count);

        for strict in [true, false] {
            if decoys.len() >= count {
                break;
            }
            let mut pool: Vec<&CatalogEntry> = self
                .entries
                .iter()
                .filter(|entry| {
                    !strict
                        || ((filters.difficulties.is_empty()
                            || filters.difficulties.contains(&entry.difficulty))
                            && (filters.song_types.is_empty()
                                || filters.song_types.contains(&entry.song_type)))
                })
                .collect();
            pool.shuffle(&mut rng);

            for entry in pool {
                if decoys.len() >= count {
                    break;
                }
                let candidate = entry.answer_for(precision);
                // A decoy the evaluator would accept for the target is a second right answer.
                if is_correct(Some(candidate), &[target]) {
                    continue;
                }
                let key = normalize(candidate);
                if !key.is_empty() && seen.insert(key) {
                    decoys.push(candidate.to_string());
                }
            }
        }

        decoys
    }
}

impl SongProvider for CatalogSongProvider {
    fn select(
        &self,
        count: usize,
        filters: SongFilters,
        guess_duration: Duration,
    ) -> BoxFuture<'static, ProviderResult<Selection>> {
        let selection = self.pick(count, &filters, guess_duration);
        Box::pin(async move { Ok(selection) })
    }

    fn decoys(
        &self,
        target: String,
        precision: PrecisionMode,
        filters: SongFilters,
        count: usize,
    ) -> BoxFuture<'static, ProviderResult<Vec<String>>> {
        let decoys = self.pick_decoys(&target, precision, &filters, count);
        Box::pin(async move { Ok(decoys) })
    }
}
