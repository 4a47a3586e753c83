//! Reference-counted room registry
//!
//! Every consumer of a room adapter goes through [`RoomManager::enter`] and
//! balances it with one [`RoomManager::exit`]. The registry constructs an
//! adapter on the first enter, hands the same instance to later enters of
//! the same room, and closes it once the last session leaves. Raw adapter
//! references are never handed out outside this protocol.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::ws::adapter::RoomAdapter;
use crate::ws::memory::MemoryAdapter;
use crate::Result;

/// Factory building the adapter for a newly opened room
pub type AdapterFactory =
    Arc<dyn Fn(&str) -> BoxFuture<'static, Result<Arc<dyn RoomAdapter>>> + Send + Sync>;

struct RoomEntry {
    adapter: Arc<dyn RoomAdapter>,
    refcount: usize,
}

/// Thread-safe registry of `{room name → (adapter, refcount)}`
pub struct RoomManager {
    new_adapter: AdapterFactory,
    rooms: Mutex<HashMap<String, RoomEntry>>,
}

impl RoomManager {
    pub fn new(new_adapter: AdapterFactory) -> Self {
        Self {
            new_adapter,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Registry backed by in-process memory adapters
    pub fn in_memory() -> Self {
        Self::new(Arc::new(|room: &str| {
            let room = room.to_string();
            Box::pin(async move { Ok(Arc::new(MemoryAdapter::new(room)) as Arc<dyn RoomAdapter>) })
                as BoxFuture<'static, Result<Arc<dyn RoomAdapter>>>
        }))
    }

    /// Return the room's adapter, constructing it on first entry. The
    /// registry lock is held across construction, so concurrent enters of a
    /// new room agree on a single adapter instance.
    pub async fn enter(&self, room: &str) -> Result<Arc<dyn RoomAdapter>> {
        let mut rooms = self.rooms.lock().await;

        if let Some(entry) = rooms.get_mut(room) {
            entry.refcount += 1;
            debug!(room = %room, refcount = entry.refcount, "Entered existing room");
            return Ok(Arc::clone(&entry.adapter));
        }

        let adapter = (self.new_adapter)(room).await?;
        rooms.insert(
            room.to_string(),
            RoomEntry {
                adapter: Arc::clone(&adapter),
                refcount: 1,
            },
        );
        debug!(room = %room, "Created room adapter");
        Ok(adapter)
    }

    /// Balance one prior [`RoomManager::enter`]. On the last exit the entry
    /// is removed and the adapter closed outside the registry lock.
    pub async fn exit(&self, room: &str) {
        let closing = {
            let mut rooms = self.rooms.lock().await;
            match rooms.get_mut(room) {
                Some(entry) => {
                    entry.refcount -= 1;
                    debug!(room = %room, refcount = entry.refcount, "Exited room");
                    if entry.refcount == 0 {
                        rooms.remove(room).map(|entry| entry.adapter)
                    } else {
                        None
                    }
                }
                None => {
                    warn!(room = %room, "Exit for unknown room");
                    None
                }
            }
        };

        if let Some(adapter) = closing {
            if let Err(e) = adapter.close().await {
                error!(room = %room, error = %e, "Error closing room adapter");
            }
        }
    }

    /// Number of rooms currently open
    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_manager() -> (RoomManager, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let built_clone = Arc::clone(&built);
        let manager = RoomManager::new(Arc::new(move |room: &str| {
            let room = room.to_string();
            let built = Arc::clone(&built_clone);
            Box::pin(async move {
                built.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MemoryAdapter::new(room)) as Arc<dyn RoomAdapter>)
            }) as BoxFuture<'static, Result<Arc<dyn RoomAdapter>>>
        }));
        (manager, built)
    }

    #[tokio::test]
    async fn test_enter_reuses_adapter() {
        let (manager, built) = counting_manager();

        let a1 = manager.enter("r").await.unwrap();
        let a2 = manager.enter("r").await.unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_adapter_released_at_zero() {
        let (manager, built) = counting_manager();

        let adapter = manager.enter("r").await.unwrap();
        let _ = manager.enter("r").await.unwrap();

        manager.exit("r").await;
        assert_eq!(manager.len().await, 1);

        manager.exit("r").await;
        assert!(manager.is_empty().await);

        // The released adapter was closed.
        assert!(adapter.clients().await.is_err());

        // A fresh enter builds a new adapter.
        let _ = manager.enter("r").await.unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rooms_are_independent() {
        let (manager, built) = counting_manager();

        let a = manager.enter("r1").await.unwrap();
        let b = manager.enter("r2").await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 2);

        manager.exit("r1").await;
        assert_eq!(manager.len().await, 1);
        assert!(b.clients().await.is_ok());
    }

    #[tokio::test]
    async fn test_exit_unknown_room_is_noop() {
        let (manager, _built) = counting_manager();
        manager.exit("ghost").await;
        assert!(manager.is_empty().await);
    }
}
