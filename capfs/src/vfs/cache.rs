//! Directory handle cache keyed by normalized path.

use super::path::{is_root, is_within};
use moka::future::Cache;
use tracing::trace;

pub struct DirCache<D> {
    inner: Cache<String, D>,
}

impl<D> DirCache<D>
where
    D: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::new(capacity),
        }
    }

    pub async fn get(&self, path: &str) -> Option<D> {
        self.inner.get(path).await
    }

    pub async fn insert(&self, path: String, handle: D) {
        self.inner.insert(path, handle).await;
    }

    pub fn contains(&self, path: &str) -> bool {
        self.inner.contains_key(path)
    }

    /// Drops `path` and every cached path beneath it.
    pub async fn invalidate_subtree(&self, path: &str) {
        if is_root(path) {
            self.inner.invalidate_all();
            trace!("dir cache cleared");
            return;
        }
        let stale: Vec<String> = self
            .inner
            .iter()
            .filter(|(key, _)| is_within(key, path))
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in &stale {
            self.inner.invalidate(key).await;
        }
        trace!(path, dropped = stale.len(), "dir cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalidate_subtree_keeps_siblings() {
        let cache = DirCache::new(100);
        for p in ["/a", "/a/b", "/a/b/c", "/ab", "/z"] {
            cache.insert(p.to_string(), p.len()).await;
        }
        cache.invalidate_subtree("/a").await;

        assert!(cache.get("/a").await.is_none());
        assert!(cache.get("/a/b").await.is_none());
        assert!(cache.get("/a/b/c").await.is_none());
        assert_eq!(cache.get("/ab").await, Some(3));
        assert_eq!(cache.get("/z").await, Some(2));
    }

    #[tokio::test]
    async fn test_invalidate_root_clears_everything() {
        let cache = DirCache::new(100);
        cache.insert("/a".to_string(), 1u8).await;
        cache.insert("/b/c".to_string(), 2u8).await;
        cache.invalidate_subtree("/").await;

        assert!(cache.get("/a").await.is_none());
        assert!(cache.get("/b/c").await.is_none());
    }
}
