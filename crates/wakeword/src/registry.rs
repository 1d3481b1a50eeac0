//! Session registry.
//!
//! Maps session ids to sessions. The map itself is a `DashMap`; each entry is
//! a slot guarded by an async mutex, so chunks for one session run strictly
//! one at a time while different sessions proceed in parallel.
//!
//! Ownership of a session's teardown belongs to whoever removes its id from
//! the map. Removal happens before the slot lock is taken, so an end request
//! queues behind any chunk already being processed, and a chunk that arrives
//! after the end finds an empty slot.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::detector::{DetectorConfig, DetectorFactory, DetectorHandle, SessionOptions};
use crate::error::WakeError;
use crate::session::{Session, SessionInfo};

type SessionSlot = Arc<Mutex<Option<Session>>>;

pub struct SessionRegistry {
    sessions: DashMap<String, SessionSlot>,
    factory: Arc<dyn DetectorFactory>,
    config: DetectorConfig,
    closed: AtomicBool,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn DetectorFactory>, config: DetectorConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            factory,
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Name of the detector backend.
    pub fn backend(&self) -> &'static str {
        self.factory.name()
    }

    pub fn detector_config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Create a detector, register a new session and describe it.
    #[instrument(name = "session.start", skip(self, options))]
    pub async fn start_session(
        &self,
        options: Option<&SessionOptions>,
    ) -> Result<SessionInfo, WakeError> {
        if self.is_closed() {
            return Err(WakeError::ShuttingDown);
        }

        let config = match options {
            Some(options) => self.config.with_options(options)?,
            None => self.config.clone(),
        };
        let detector = DetectorHandle::new(self.factory.create(&config)?);

        // Lock the slot before publishing it so nobody observes it half-built.
        let slot: SessionSlot = Arc::new(Mutex::new(None));
        let mut guard = Arc::clone(&slot).lock_owned().await;
        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if let Entry::Vacant(entry) = self.sessions.entry(candidate.clone()) {
                entry.insert(Arc::clone(&slot));
                break candidate;
            }
        };

        let session = match Session::new(id.clone(), detector, config.keywords.labels()) {
            Ok(session) => session,
            Err(e) => {
                self.sessions.remove(&id);
                return Err(e.into());
            }
        };
        let info = session.info();
        *guard = Some(session);

        if self.is_closed() {
            // Shutdown raced with us. If it already removed the id it will
            // close the session once we drop the guard.
            if self.sessions.remove(&id).is_some() {
                if let Some(mut session) = guard.take() {
                    session.close();
                }
            }
            return Err(WakeError::ShuttingDown);
        }

        tracing::info!(
            session_id = %info.session_id,
            frame_length = info.frame_length,
            sample_rate = info.sample_rate,
            keywords = ?info.keywords,
            "Session started"
        );
        Ok(info)
    }

    /// Remove and release a session. Waits for any chunk in flight on it.
    ///
    /// Returns whether a live session was found.
    #[instrument(name = "session.end", skip(self))]
    pub async fn end_session(&self, id: &str) -> bool {
        let Some((_, slot)) = self.sessions.remove(id) else {
            tracing::debug!("End requested for unknown session");
            return false;
        };
        let mut guard = slot.lock().await;
        match guard.take() {
            Some(mut session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Synchronous teardown for drop paths.
    ///
    /// If a chunk is in flight the session is released when that chunk
    /// finishes and the last reference to its slot goes away.
    pub fn discard(&self, id: &str) -> bool {
        let Some((_, slot)) = self.sessions.remove(id) else {
            return false;
        };
        match slot.try_lock() {
            Ok(mut guard) => {
                if let Some(mut session) = guard.take() {
                    session.close();
                }
            }
            Err(_) => {
                tracing::debug!(session_id = %id, "Session busy, releasing after in-flight chunk");
            }
        }
        true
    }

    /// Describe a live session without touching its stream state.
    pub async fn get(&self, id: &str) -> Option<SessionInfo> {
        let slot = self.slot(id)?;
        let guard = slot.lock().await;
        guard.as_ref().map(Session::info)
    }

    /// Run `f` with exclusive access to one session.
    pub async fn with_session<R, F>(&self, id: &str, f: F) -> Result<R, WakeError>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let slot = self
            .slot(id)
            .ok_or_else(|| WakeError::SessionNotFound(id.to_string()))?;
        let mut guard = slot.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| WakeError::SessionNotFound(id.to_string()))?;
        Ok(f(session))
    }

    /// End sessions idle for longer than `max_idle`. Busy sessions are skipped.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .try_lock()
                    .map(|guard| {
                        guard
                            .as_ref()
                            .is_some_and(|s| s.idle_duration() > max_idle)
                    })
                    .unwrap_or(false)
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in stale {
            if self.end_session(&id).await {
                tracing::info!(session_id = %id, "Expired idle session");
                removed += 1;
            }
        }
        removed
    }

    /// Release every remaining session and refuse new ones. Idempotent.
    ///
    /// Returns the number of sessions this call released.
    #[instrument(name = "session.shutdown", skip(self))]
    pub async fn shutdown(&self) -> usize {
        let first = !self.closed.swap(true, Ordering::SeqCst);

        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut released = 0;
        for id in ids {
            if self.end_session(&id).await {
                released += 1;
            }
        }

        if first {
            tracing::info!(released, "Session registry shut down");
        }
        released
    }

    fn slot(&self, id: &str) -> Option<SessionSlot> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        let remaining = self.sessions.len();
        if remaining > 0 {
            tracing::debug!(remaining, "Dropping registry with open sessions");
        }
    }
}

/// A registered session tied to a scope, such as one WebSocket connection.
///
/// The session is ended when the guard is dropped, on every exit path.
pub struct ScopedSession {
    registry: Arc<SessionRegistry>,
    info: SessionInfo,
}

impl ScopedSession {
    pub async fn start(registry: Arc<SessionRegistry>) -> Result<Self, WakeError> {
        let info = registry.start_session(None).await?;
        Ok(Self { registry, info })
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.session_id
    }

    pub async fn with<R, F>(&self, f: F) -> Result<R, WakeError>
    where
        F: FnOnce(&mut Session) -> R,
    {
        self.registry.with_session(self.id(), f).await
    }

    /// End the session now, waiting for any chunk in flight.
    pub async fn end(self) -> bool {
        self.registry.end_session(self.id()).await
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        self.registry.discard(&self.info.session_id);
    }
}

/// Periodically end sessions idle for longer than `max_idle`.
pub fn spawn_idle_reaper(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    max_idle: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Idle session reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = registry.reap_idle(max_idle).await;
                    if removed > 0 {
                        tracing::info!(removed, remaining = registry.len(), "Idle session sweep completed");
                    }
                }
            }
        }
    })
}
