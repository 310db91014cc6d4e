//! Abort tokens and the registry of in-flight requests per session.
//!
//! Every dispatched request task gets its own [`AbortToken`], registered
//! under the owning session's id. Pause, cancel and fail look the session up
//! here and fire every token; the transport and the retry loop observe the
//! token and resolve the task as `abort`.
//!
//! The registry holds only ids and tokens, never the session itself, so a
//! caller dropping a session is never blocked by stale entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::session::SessionId;

/// Cooperative stop signal for one request task.
///
/// Readable from blocking code (`is_aborted`) and awaitable from async
/// code (`aborted`).
#[derive(Debug, Default)]
pub struct AbortToken {
    flag: AtomicBool,
    notify: Notify,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Resolves once `abort` has been called (immediately if it already was).
    pub async fn aborted(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// Identifier of one registered request task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

/// Session id -> tokens of its in-flight request tasks.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    next_id: AtomicU64,
    requests: Mutex<HashMap<SessionId, Vec<(RequestId, Arc<AbortToken>)>>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request for `session`; returns its id and abort token.
    pub fn register(&self, session: SessionId) -> (RequestId, Arc<AbortToken>) {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = Arc::new(AbortToken::new());
        self.requests
            .lock()
            .unwrap()
            .entry(session)
            .or_default()
            .push((id, Arc::clone(&token)));
        (id, token)
    }

    /// Remove one request (call when its task settles, whatever the outcome).
    pub fn unregister(&self, session: SessionId, request: RequestId) {
        let mut requests = self.requests.lock().unwrap();
        if let Some(list) = requests.get_mut(&session) {
            list.retain(|(id, _)| *id != request);
            if list.is_empty() {
                requests.remove(&session);
            }
        }
    }

    /// Fire and drop every token registered for `session`. Returns how many were aborted.
    pub fn abort_session(&self, session: SessionId) -> usize {
        let removed = self.requests.lock().unwrap().remove(&session);
        let list = removed.unwrap_or_default();
        for (_, token) in &list {
            token.abort();
        }
        list.len()
    }

    /// Fire every registered token (scheduler shutdown).
    pub fn abort_all(&self) {
        let drained: Vec<_> = self.requests.lock().unwrap().drain().collect();
        for (_, list) in drained {
            for (_, token) in list {
                token.abort();
            }
        }
    }

    /// Number of in-flight requests registered for `session`.
    pub fn in_flight(&self, session: SessionId) -> usize {
        self.requests
            .lock()
            .unwrap()
            .get(&session)
            .map_or(0, Vec::len)
    }
}

/// Removes a request from the registry when dropped, so a panicking task
/// does not leave a stale entry behind.
pub(crate) struct Registration {
    pub(crate) registry: Arc<RequestRegistry>,
    pub(crate) session: SessionId,
    pub(crate) request: RequestId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.session, self.request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn register_and_unregister() {
        let registry = RequestRegistry::new();
        let s = SessionId::from_raw(7);
        let (a, _) = registry.register(s);
        let (b, _) = registry.register(s);
        assert_eq!(registry.in_flight(s), 2);
        registry.unregister(s, a);
        assert_eq!(registry.in_flight(s), 1);
        registry.unregister(s, b);
        assert_eq!(registry.in_flight(s), 0);
    }

    #[test]
    fn abort_session_fires_only_that_session() {
        let registry = RequestRegistry::new();
        let s1 = SessionId::from_raw(1);
        let s2 = SessionId::from_raw(2);
        let (_, t1) = registry.register(s1);
        let (_, t2) = registry.register(s1);
        let (_, other) = registry.register(s2);
        assert_eq!(registry.abort_session(s1), 2);
        assert!(t1.is_aborted());
        assert!(t2.is_aborted());
        assert!(!other.is_aborted());
        assert_eq!(registry.in_flight(s1), 0);
        assert_eq!(registry.in_flight(s2), 1);
    }

    #[test]
    fn registration_guard_unregisters_on_drop() {
        let registry = Arc::new(RequestRegistry::new());
        let s = SessionId::from_raw(3);
        let (request, _) = registry.register(s);
        {
            let _guard = Registration {
                registry: Arc::clone(&registry),
                session: s,
                request,
            };
            assert_eq!(registry.in_flight(s), 1);
        }
        assert_eq!(registry.in_flight(s), 0);
    }

    #[tokio::test]
    async fn aborted_resolves_after_abort() {
        let token = Arc::new(AbortToken::new());
        let waiter = {
            let token = Arc::clone(&token);
            tokio::spawn(async move { token.aborted().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.abort();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("aborted() should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn aborted_resolves_immediately_when_already_fired() {
        let token = AbortToken::new();
        token.abort();
        tokio::time::timeout(Duration::from_millis(100), token.aborted())
            .await
            .expect("already aborted");
    }
}
