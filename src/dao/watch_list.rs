use std::collections::{HashMap, HashSet};

use futures::future::BoxFuture;

use crate::dao::song_provider::{ProviderResult, WatchListSource};

/// Watch lists loaded once from the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticWatchLists {
    lists: HashMap<String, HashSet<u64>>,
}

impl StaticWatchLists {
    /// Build the source from account id → franchise ids.
    pub fn new(lists: &HashMap<String, Vec<u64>>) -> Self {
        Self {
            lists: lists
                .iter()
                .map(|(account, ids)| (account.clone(), ids.iter().copied().collect()))
                .collect(),
        }
    }
}

impl WatchListSource for StaticWatchLists {
    fn watched(&self, account_id: &str) -> BoxFuture<'static, ProviderResult<Option<HashSet<u64>>>> {
        let list = self.lists.get(account_id).cloned();
        Box::pin(async move { Ok(list) })
    }
}
