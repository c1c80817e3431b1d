pub mod db;
pub mod disk;
pub mod ids;
pub mod memory;
pub mod tables;

use crate::core::error::Result;
use async_trait::async_trait;

pub use disk::FileCursorStore;
pub use ids::SqliteIdSource;
pub use memory::MemoryCursorStore;

/// Durable home of the harvest cursor: the last id of the last batch that
/// fully completed.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>>;

    async fn save(&self, cursor: &str) -> Result<()>;

    /// Forgets the cursor so the next run starts from the beginning.
    async fn clear(&self) -> Result<()>;
}
