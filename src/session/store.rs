use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::script::Part;
use crate::session::types::{EditingSession, RenderOptions, SessionLayout};

struct SessionEntry {
    session: Mutex<EditingSession>,

    /// Serializes regenerations of the same part; keyed by part id so a
    /// reorder between lookup and write still hits the right record
    part_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,

    finalize_lock: Arc<Mutex<()>>,

    /// Milliseconds since the store epoch
    touched_ms: AtomicU64,
}

/// Exclusive right to regenerate one part's media
///
/// Holds the part's lock until dropped. `part` is the state at acquisition.
pub struct PartLease {
    pub part: Part,
    pub options: RenderOptions,
    _guard: OwnedMutexGuard<()>,
}

/// Exclusive right to finalize a session, with the snapshot the run reads
pub struct FinalizeGuard {
    pub snapshot: EditingSession,
    _guard: OwnedMutexGuard<()>,
}

/// In-memory editing sessions keyed by session id
///
/// Every operation takes its own short critical section on the session
/// record, so concurrent edits to different parts never lose each other's
/// writes.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    ttl: Duration,
    epoch: Instant,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            epoch: Instant::now(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.ttl())
    }

    /// Add a session
    ///
    /// A session whose id is already stored has its record replaced in place,
    /// keeping the part locks and any finalize claim held on it.
    pub async fn insert(&self, session: EditingSession) -> String {
        let id = session.session_id.clone();
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(&id) {
            *existing.session.lock().await = session;
            existing.touched_ms.store(self.now_ms(), Ordering::Relaxed);
            debug!("Replaced session {}", id);
            return id;
        }

        let entry = Arc::new(SessionEntry {
            session: Mutex::new(session),
            part_locks: Mutex::new(HashMap::new()),
            finalize_lock: Arc::new(Mutex::new(())),
            touched_ms: AtomicU64::new(self.now_ms()),
        });

        sessions.insert(id.clone(), entry);
        debug!("Stored session {}", id);
        id
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Copy of the session's current state
    pub async fn get(&self, id: &str) -> Result<EditingSession> {
        let entry = self.entry(id).await?;
        let session = entry.session.lock().await;
        Ok(session.clone())
    }

    /// Apply `f` to the session record under its lock
    pub async fn update<T, F>(&self, id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut EditingSession) -> Result<T>,
    {
        let entry = self.entry(id).await?;
        let mut session = entry.session.lock().await;
        let value = f(&mut session)?;
        session.updated_at = Utc::now();
        Ok(value)
    }

    /// Apply `f` to a single part, found by id
    pub async fn update_part<F>(&self, id: &str, part_id: Uuid, f: F) -> Result<Part>
    where
        F: FnOnce(&mut Part),
    {
        self.update(id, |session| {
            let part = session
                .parts
                .iter_mut()
                .find(|p| p.id == part_id)
                .ok_or_else(|| SessionError::PartNotFound { part_id: part_id.to_string() })?;
            f(part);
            Ok(part.clone())
        })
        .await
    }

    /// Wait for exclusive access to the part at `index`
    pub async fn lock_part(&self, id: &str, index: usize) -> Result<PartLease> {
        let entry = self.entry(id).await?;

        let part_id = {
            let session = entry.session.lock().await;
            session
                .parts
                .get(index)
                .map(|p| p.id)
                .ok_or(SessionError::PartOutOfRange { index, count: session.parts.len() })?
        };

        let lock = entry.part_locks.lock().await.entry(part_id).or_default().clone();
        let guard = lock.lock_owned().await;

        // The part may have moved while we waited
        let session = entry.session.lock().await;
        let part = session
            .parts
            .iter()
            .find(|p| p.id == part_id)
            .cloned()
            .ok_or_else(|| SessionError::PartNotFound { part_id: part_id.to_string() })?;

        Ok(PartLease {
            part,
            options: session.options.clone(),
            _guard: guard,
        })
    }

    /// Claim the session for a finalize run
    ///
    /// Fails immediately when another run holds the claim.
    pub async fn begin_finalize(&self, id: &str) -> Result<FinalizeGuard> {
        let entry = self.entry(id).await?;
        let guard = entry
            .finalize_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| SessionError::FinalizeInProgress { id: id.to_string() })?;

        let snapshot = entry.session.lock().await.clone();
        Ok(FinalizeGuard {
            snapshot,
            _guard: guard,
        })
    }

    /// Drop a session; returns whether it existed
    pub async fn discard(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!("Discarded session {}", id);
        }
        removed
    }

    /// Remove sessions idle for longer than the TTL, skipping any being finalized
    pub async fn expire_idle(&self) -> Vec<String> {
        let now = self.now_ms();
        let ttl_ms = self.ttl.as_millis() as u64;

        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| {
                let idle = now.saturating_sub(entry.touched_ms.load(Ordering::Relaxed));
                idle > ttl_ms && entry.finalize_lock.try_lock().is_ok()
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            sessions.remove(id);
        }

        if !expired.is_empty() {
            info!("Expired {} idle sessions", expired.len());
        }
        expired
    }

    /// Write the session in its persisted layout
    pub async fn save_json<P: AsRef<Path>>(&self, id: &str, path: P) -> Result<()> {
        let layout = self.get(id).await?.to_layout();
        let json = serde_json::to_string_pretty(&layout)
            .map_err(|e| SessionError::PersistFailed { reason: e.to_string() })?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Load a persisted session layout and store it; returns the session id
    pub async fn load_json<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let json = tokio::fs::read_to_string(path).await?;
        let layout: SessionLayout = serde_json::from_str(&json)
            .map_err(|e| SessionError::PersistFailed { reason: e.to_string() })?;
        Ok(self.insert(EditingSession::from_layout(layout)).await)
    }

    async fn entry(&self, id: &str) -> Result<Arc<SessionEntry>> {
        let entry = self
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound { id: id.to_string() })?;
        entry.touched_ms.store(self.now_ms(), Ordering::Relaxed);
        Ok(entry)
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
