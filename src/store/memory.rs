use super::CursorStore;
use crate::core::error::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// Cursor store that lives for the duration of the process.
#[derive(Default)]
pub struct MemoryCursorStore {
    inner: Mutex<Option<String>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: &str) -> Self {
        Self {
            inner: Mutex::new(Some(cursor.to_string())),
        }
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.inner.lock().await.clone())
    }

    async fn save(&self, cursor: &str) -> Result<()> {
        debug!(cursor, "Cursor PUT");
        *self.inner.lock().await = Some(cursor.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        debug!("Cursor CLEAR");
        *self.inner.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cursor() {
        let store = MemoryCursorStore::new();
        assert!(store.load().await.unwrap().is_none());

        store.save("b").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("b"));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());

        let seeded = MemoryCursorStore::with_cursor("x");
        assert_eq!(seeded.load().await.unwrap().as_deref(), Some("x"));
    }
}
