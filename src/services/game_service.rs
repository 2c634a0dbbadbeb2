use std::collections::HashSet;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::{
    dao::song_provider::{SongFilters, WatchListSource},
    error::ServiceError,
    state::{
        RoomContext,
        game::{RoomSettings, RoundItem, WatchedPool},
    },
};

/// Playlist fixed for one game, plus the non-fatal notice to show players.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlaylist {
    /// Rounds in play order.
    pub items: Vec<RoundItem>,
    /// Set when the selection had to fall back to a broader pool.
    pub notice: Option<String>,
}

/// Resolve the playlist of a new game from the room settings.
///
/// `account_ids` are the linked accounts of the players in the room; they
/// only matter when the settings restrict the pool to watched franchises.
pub async fn resolve_playlist(
    ctx: &RoomContext,
    settings: &RoomSettings,
    account_ids: &[String],
) -> Result<ResolvedPlaylist, ServiceError> {
    let mut filters = SongFilters::from_settings(settings);
    let mut notice = None;

    if settings.watched_only != WatchedPool::Off {
        match watched_pool(ctx.watch_lists.as_ref(), settings.watched_only, account_ids).await {
            Some(watched) => filters = filters.with_watched(watched),
            None => {
                notice = Some(
                    "No watch list is linked to this room; songs were picked from the full catalog"
                        .to_string(),
                )
            }
        }
    }

    let selection = ctx
        .provider
        .select(settings.round_count, filters, settings.guess_duration)
        .await?;

    if selection.items.is_empty() {
        return Err(ServiceError::ContentUnavailable(
            "no playable songs match the room settings".into(),
        ));
    }

    if selection.backfilled && notice.is_none() {
        notice = Some(
            "Not enough songs matched the room settings; the playlist was filled from a broader pool"
                .to_string(),
        );
    }
    if selection.items.len() < settings.round_count {
        debug!(
            requested = settings.round_count,
            selected = selection.items.len(),
            "playlist shorter than requested"
        );
        notice.get_or_insert_with(|| {
            format!(
                "Only {} songs are available; the game will have {} rounds",
                selection.items.len(),
                selection.items.len()
            )
        });
    }

    Ok(ResolvedPlaylist {
        items: selection.items,
        notice,
    })
}

/// Combine the watch lists of every linked account.
///
/// Accounts without a list, or whose list could not be fetched, are left out.
/// Returns `None` when no list at all is available.
async fn watched_pool(
    source: &dyn WatchListSource,
    pool: WatchedPool,
    account_ids: &[String],
) -> Option<HashSet<u64>> {
    let lookups = account_ids.iter().map(|id| source.watched(id));
    let results = join_all(lookups).await;

    let mut lists = Vec::with_capacity(results.len());
    for (account_id, result) in account_ids.iter().zip(results) {
        match result {
            Ok(Some(list)) => lists.push(list),
            Ok(None) => {}
            Err(err) => warn!(account = %account_id, error = %err, "failed to fetch watch list"),
        }
    }

    let mut lists = lists.into_iter();
    let first = lists.next()?;
    let combined = match pool {
        WatchedPool::Union => lists.fold(first, |mut acc, list| {
            acc.extend(list);
            acc
        }),
        WatchedPool::Intersection => lists.fold(first, |acc, list| {
            acc.intersection(&list).copied().collect()
        }),
        WatchedPool::Off => return None,
    };
    Some(combined)
}
