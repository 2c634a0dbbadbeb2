/// Song catalog boundary: playlist selection and decoys.
pub mod song_provider;
/// Long-term player statistics.
pub mod stats_store;
/// Storage error types shared by stats backends.
pub mod storage;
/// Watch lists backing the "watched only" playlist mode.
pub mod watch_list;
