//! TTL+LRU session pool over [`Memory`](super::Memory) handles.
//!
//! An explicit insertion-order-tracking map guarded by a single async
//! mutex that covers both get-or-create and eviction, rather than pulling
//! in a cache crate.

use super::Memory;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One entry in the pool: a session's memory handle plus its bookkeeping.
#[derive(Clone)]
pub struct MemoryPoolEntry {
    pub session_id: String,
    pub memory: Arc<Mutex<Memory>>,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub agent_id: Option<String>,
}

struct PoolInner {
    entries: HashMap<String, MemoryPoolEntry>,
    /// Insertion/access order, oldest first, for LRU victim selection.
    order: Vec<String>,
}

/// Multi-session memory pool with TTL-then-LRU eviction.
pub struct MemoryPool {
    inner: Mutex<PoolInner>,
    ttl: Duration,
    capacity: usize,
}

impl MemoryPool {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
            ttl,
            capacity,
        }
    }

    /// Returns the session's memory handle, creating a fresh one if absent.
    /// `session_id` of `""` auto-generates a UUID v4. Updates `last_access_at`.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        agent_id: Option<String>,
    ) -> (String, Arc<Mutex<Memory>>) {
        let mut guard = self.inner.lock().await;
        let session_id = if session_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            session_id.to_string()
        };

        if let Some(entry) = guard.entries.get_mut(&session_id) {
            entry.last_access_at = Utc::now();
            let handle = entry.memory.clone();
            touch_order(&mut guard.order, &session_id);
            return (session_id, handle);
        }

        let memory = Arc::new(Mutex::new(Memory::new()));
        let now = Utc::now();
        guard.entries.insert(
            session_id.clone(),
            MemoryPoolEntry {
                session_id: session_id.clone(),
                memory: memory.clone(),
                created_at: now,
                last_access_at: now,
                agent_id,
            },
        );
        guard.order.push(session_id.clone());
        (session_id, memory)
    }

    pub async fn remove(&self, session_id: &str) {
        let mut guard = self.inner.lock().await;
        guard.entries.remove(session_id);
        guard.order.retain(|id| id != session_id);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evicts by TTL first, then by LRU if still over capacity. After this
    /// call, no remaining entry has `now - last_access_at > ttl`, and the
    /// pool holds at most `capacity` entries.
    pub async fn evict(&self) -> Vec<String> {
        let mut guard = self.inner.lock().await;
        let now = Utc::now();
        let ttl = self.ttl;

        let expired: Vec<String> = guard
            .order
            .iter()
            .filter(|id| {
                guard
                    .entries
                    .get(*id)
                    .map(|e| {
                        now.signed_duration_since(e.last_access_at).num_seconds()
                            > ttl.as_secs() as i64
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let mut evicted = Vec::new();
        for id in &expired {
            guard.entries.remove(id);
            evicted.push(id.clone());
        }
        guard.order.retain(|id| !expired.contains(id));

        while guard.entries.len() > self.capacity && !guard.order.is_empty() {
            // Smallest last_access_at is the LRU victim; `order` is kept
            // access-ordered by `touch_order`, so the front is the victim.
            let victim = guard.order.remove(0);
            guard.entries.remove(&victim);
            evicted.push(victim);
        }

        evicted
    }
}

fn touch_order(order: &mut Vec<String>, session_id: &str) {
    if let Some(pos) = order.iter().position(|id| id == session_id) {
        let id = order.remove(pos);
        order.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_auto_generates_session_id() {
        let pool = MemoryPool::new(Duration::from_secs(60), 10);
        let (id, _) = pool.get_or_create("", None).await;
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_handle() {
        let pool = MemoryPool::new(Duration::from_secs(60), 10);
        let (id, handle) = pool.get_or_create("s1", None).await;
        handle.lock().await.add_user("hi");
        let (_, handle2) = pool.get_or_create(&id, None).await;
        assert_eq!(handle2.lock().await.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_eviction_over_capacity_evicts_lru() {
        let pool = MemoryPool::new(Duration::from_secs(3600), 2);
        pool.get_or_create("a", None).await;
        pool.get_or_create("b", None).await;
        pool.get_or_create("c", None).await;
        let evicted = pool.evict().await;
        assert_eq!(evicted, vec!["a".to_string()]);
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn test_eviction_by_ttl() {
        let pool = MemoryPool::new(Duration::from_millis(1), 10);
        pool.get_or_create("a", None).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let evicted = pool.evict().await;
        assert_eq!(evicted, vec!["a".to_string()]);
        assert_eq!(pool.len().await, 0);
    }
}
