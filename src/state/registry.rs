use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use tracing::info;

use crate::{
    dto::validation::{ROOM_CODE_ALPHABET, ROOM_CODE_LENGTH, normalize_room_code},
    state::{
        game::RoomSettings,
        mode::{ClassicMode, ModeStrategy},
        room::{Room, RoomContext},
    },
};

/// Rooms alive in this process, keyed by join code.
///
/// Owned by [`AppState`](crate::state::AppState) and handed to whatever serves
/// inbound messages; there is no global room table.
pub struct RoomRegistry<M: ModeStrategy + Clone = ClassicMode> {
    rooms: DashMap<String, Arc<Room<M>>>,
    ctx: Arc<RoomContext>,
    mode: M,
    default_settings: RoomSettings,
}

impl<M: ModeStrategy + Clone> RoomRegistry<M> {
    /// Create an empty registry whose rooms share `ctx` and play with `mode`.
    pub fn new(ctx: Arc<RoomContext>, mode: M, default_settings: RoomSettings) -> Self {
        Self {
            rooms: DashMap::new(),
            ctx,
            mode,
            default_settings,
        }
    }

    /// Shared collaborators of every room.
    pub fn context(&self) -> &Arc<RoomContext> {
        &self.ctx
    }

    /// Look up a live room.
    pub fn get(&self, code: &str) -> Option<Arc<Room<M>>> {
        self.rooms
            .get(&normalize_room_code(code))
            .map(|entry| entry.value().clone())
    }

    /// Return the room behind `code`, creating it with the default settings
    /// when it does not exist or was closed.
    pub fn get_or_create(&self, code: &str) -> Arc<Room<M>> {
        let code = normalize_room_code(code);
        match self.rooms.entry(code.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    entry.insert(self.build(code, None));
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(self.build(code, None)).value().clone(),
        }
    }

    /// Create a room under a fresh random code.
    pub fn create(&self, settings: Option<RoomSettings>) -> Arc<Room<M>> {
        loop {
            let code = random_code();
            if let Entry::Vacant(entry) = self.rooms.entry(code.clone()) {
                return entry.insert(self.build(code, settings)).value().clone();
            }
        }
    }

    /// Close and drop every room nobody joined within `grace` of its
    /// creation. Returns how many rooms were dropped.
    pub fn reap_abandoned(&self, grace: Duration) -> usize {
        let mut reaped = 0;
        self.rooms.retain(|_, room| {
            let keep = !room.close_if_abandoned(grace);
            if !keep {
                reaped += 1;
            }
            keep
        });
        if reaped > 0 {
            info!(rooms = reaped, live = self.rooms.len(), "abandoned rooms removed");
        }
        reaped
    }

    /// Drop the room behind `code` if its last player left.
    pub fn remove_if_closed(&self, code: &str) -> bool {
        let removed = self
            .rooms
            .remove_if(&normalize_room_code(code), |_, room| room.is_closed());
        if let Some((code, _)) = &removed {
            info!(room = %code, "closed room removed");
        }
        removed.is_some()
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no room is alive.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn build(&self, code: String, settings: Option<RoomSettings>) -> Arc<Room<M>> {
        info!(room = %code, "room created");
        Room::new(
            code,
            self.mode.clone(),
            settings.unwrap_or_else(|| self.default_settings.clone()),
            self.ctx.clone(),
        )
    }
}

fn random_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PhaseTimings,
        dao::{
            song_provider::CatalogSongProvider, stats_store::MemoryStatsStore,
            watch_list::StaticWatchLists,
        },
        dto::validation::validate_room_code,
        state::player::Departure,
    };

    fn registry() -> RoomRegistry {
        let ctx = Arc::new(RoomContext {
            provider: Arc::new(CatalogSongProvider::default()),
            watch_lists: Arc::new(StaticWatchLists::default()),
            stats: Arc::new(MemoryStatsStore::new()),
            timings: PhaseTimings::default(),
        });
        RoomRegistry::new(ctx, ClassicMode, RoomSettings::default())
    }

    #[test]
    fn created_codes_are_valid_and_unique() {
        let registry = registry();
        let first = registry.create(None);
        let second = registry.create(None);
        assert!(validate_room_code(first.code()).is_ok());
        assert_ne!(first.code(), second.code());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn lookups_ignore_case() {
        let registry = registry();
        let room = registry.get_or_create("abc234");
        assert_eq!(room.code(), "ABC234");
        assert!(Arc::ptr_eq(&room, &registry.get("ABC234").unwrap()));
        assert!(Arc::ptr_eq(&room, &registry.get_or_create("Abc234")));
    }

    #[tokio::test]
    async fn closed_rooms_are_replaced_and_removable() {
        let registry = registry();
        let room = registry.get_or_create("ABC234");
        room.add_player("p1", "Misato".into(), None, None)
            .await
            .unwrap();
        assert!(!registry.remove_if_closed("ABC234"));

        assert_eq!(room.remove_player("p1").await, Departure::Emptied);
        let fresh = registry.get_or_create("ABC234");
        assert!(!Arc::ptr_eq(&room, &fresh));
        assert!(!fresh.is_closed());

        fresh
            .add_player("p2", "Kaji".into(), None, None)
            .await
            .unwrap();
        fresh.remove_player("p2").await;
        assert!(registry.remove_if_closed("ABC234"));
        assert!(registry.is_empty());
        assert!(registry.get("ABC234").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rooms_nobody_joins_are_reaped_after_the_grace_period() {
        let registry = registry();
        let grace = Duration::from_secs(300);
        let unjoined: Vec<String> = (0..50)
            .map(|_| registry.create(None).code().to_string())
            .collect();
        let joined = registry.create(None);
        joined
            .add_player("p1", "Shinji".into(), None, None)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(registry.reap_abandoned(grace), 0);
        assert_eq!(registry.len(), 51);

        tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
        assert_eq!(registry.reap_abandoned(grace), 50);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(joined.code()).is_some());
        for code in &unjoined {
            assert!(registry.get(code).is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn joining_a_reaped_room_opens_a_fresh_one() {
        let registry = registry();
        let stale = registry.get_or_create("XYZ789");
        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(registry.reap_abandoned(Duration::from_secs(300)), 1);

        assert!(stale.is_closed());
        assert!(stale.add_player("p1", "Toji".into(), None, None).await.is_err());
        let fresh = registry.get_or_create("XYZ789");
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert!(fresh.add_player("p1", "Toji".into(), None, None).await.is_ok());
    }
}
