use std::collections::HashMap;
use std::sync::Arc;

use pyrunner_core::config::{DatabaseConfig, DEFAULT_DB_ALIAS};
use tracing::{info, warn};

use crate::{error::Result, store::JobStore, store::SqliteStore};

/// Maps a job's `db_alias` routing hint to the store its runs belong in.
///
/// Jobs are always looked up in the default store first; the alias found on
/// the job then selects where the run-start transaction and the recorder
/// write. Unknown aliases fall back to the default store.
#[derive(Clone)]
pub struct StoreRouter {
    default: Arc<dyn JobStore>,
    aliases: HashMap<String, Arc<dyn JobStore>>,
}

impl StoreRouter {
    pub fn new(default: Arc<dyn JobStore>) -> Self {
        Self {
            default,
            aliases: HashMap::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>, store: Arc<dyn JobStore>) -> Self {
        self.aliases.insert(alias.into(), store);
        self
    }

    /// Open the default database plus every aliased database in `config`.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        info!(path = %config.path, "opening default database");
        let mut router = Self::new(Arc::new(SqliteStore::open(&config.path)?));
        for (alias, path) in &config.aliases {
            info!(%alias, %path, "opening aliased database");
            router = router.with_alias(alias.clone(), Arc::new(SqliteStore::open(path)?));
        }
        Ok(router)
    }

    pub fn default_store(&self) -> &Arc<dyn JobStore> {
        &self.default
    }

    /// The default store followed by every aliased one.
    pub fn stores(&self) -> impl Iterator<Item = &Arc<dyn JobStore>> {
        std::iter::once(&self.default).chain(self.aliases.values())
    }

    /// Store for `alias`; `None`, `"default"` and unknown aliases resolve to
    /// the default store.
    pub fn for_alias(&self, alias: Option<&str>) -> &Arc<dyn JobStore> {
        match alias {
            None | Some(DEFAULT_DB_ALIAS) => &self.default,
            Some(name) => self.aliases.get(name).unwrap_or_else(|| {
                warn!(alias = %name, "unknown database alias, using default");
                &self.default
            }),
        }
    }
}
