//! Keyed row locks backing the repositories' `lock` capability.
//!
//! Read-modify-write sequences on a single row (role changes, token
//! issuance, check-then-insert membership) acquire the row's guard
//! first. Every repository built from the same [`RowLocks`] shares one
//! lock table, so concurrent writers on the same row serialize while
//! writers on different rows proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockKey = (&'static str, Uuid);
type LockMap = HashMap<LockKey, Arc<Mutex<()>>>;

/// Shared table of per-row async mutexes.
#[derive(Clone, Default)]
pub struct RowLocks {
    inner: Arc<StdMutex<LockMap>>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `table:id`.
    pub async fn acquire(&self, table: &'static str, id: Uuid) -> RowGuard {
        let key = (table, id);
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(key).or_default().clone()
        };
        let guard = mutex.clone().lock_owned().await;
        RowGuard {
            table: self.inner.clone(),
            key,
            mutex,
            _guard: guard,
        }
    }

    /// Number of rows currently tracked.
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Exclusive access to one row; released on drop.
pub struct RowGuard {
    table: Arc<StdMutex<LockMap>>,
    key: LockKey,
    mutex: Arc<Mutex<()>>,
    _guard: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for RowGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowGuard")
            .field("table", &self.key.0)
            .field("id", &self.key.1)
            .finish()
    }
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        let mut map = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // Map entry + this handle + the owned guard. Anything above that
        // is a waiter that still needs the entry.
        if Arc::strong_count(&self.mutex) <= 3 {
            map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_row_serializes() {
        let locks = RowLocks::new();
        let id = Uuid::new_v4();
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("user", id).await;
                let seen = counter.load(Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                counter.store(seen + 1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Lost updates would leave the counter below 8.
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn different_rows_do_not_block() {
        let locks = RowLocks::new();
        let _a = locks.acquire("user", Uuid::new_v4()).await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire("user", Uuid::new_v4()),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn tables_are_separate_namespaces() {
        let locks = RowLocks::new();
        let id = Uuid::new_v4();
        let _user = locks.acquire("user", id).await;
        let tenant =
            tokio::time::timeout(Duration::from_millis(100), locks.acquire("tenant", id)).await;
        assert!(tenant.is_ok());
    }
}
