use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per story id, serializing the read-check-write of votes,
/// start and reveal for that story. Different stories never contend.
///
/// The map only holds weak references, so a story's lock is freed once no
/// one holds or waits on it.
#[derive(Default)]
pub struct StoryLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl StoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, story_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            // Held only for map bookkeeping, never across an await
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, weak| weak.strong_count() > 0);

            match locks.get(story_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(story_id.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Number of stories with a live lock.
    pub fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|weak| weak.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_story_serializes() {
        let locks = Arc::new(StoryLocks::new());
        let guard = locks.acquire("t1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("t1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_stories_do_not_contend() {
        let locks = StoryLocks::new();
        let _a = locks.acquire("t1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("t2")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn idle_locks_are_released() {
        let locks = StoryLocks::new();
        {
            let _g = locks.acquire("t1").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }
}
