pub mod cache;
pub mod memory;
pub mod store;
pub mod supabase;
pub mod tables;

use std::sync::Arc;

use shared_config::AppConfig;
use tracing::info;

pub use cache::{CacheClient, CacheError};
pub use memory::MemoryStore;
pub use store::{Direction, Filter, FilterOp, Query, RecordStore, RecordStoreExt, StoreError};
pub use supabase::SupabaseClient;

/// PostgREST when configured, otherwise the in-process store.
pub fn store_from_config(config: &AppConfig) -> Arc<dyn RecordStore> {
    if config.is_store_configured() {
        info!("Using PostgREST store at {}", config.supabase_url);
        Arc::new(SupabaseClient::new(config))
    } else {
        info!("Using in-memory store");
        Arc::new(MemoryStore::new())
    }
}
