//! Routing of session events to their owners.
//!
//! One table is owned per coordinator (or per standalone caller) and cloned
//! into every session it launches. Ids are issued on registration and never
//! reused by the same table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::{SessionEvent, SessionId};

pub type EventSink = mpsc::UnboundedSender<SessionEvent>;

#[derive(Clone, Default)]
pub struct DispatchTable {
    inner: Arc<Mutex<DispatchInner>>,
}

#[derive(Default)]
struct DispatchInner {
    last_id: u64,
    sinks: HashMap<SessionId, EventSink>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DispatchInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, sink: EventSink) -> SessionId {
        let mut inner = self.lock();
        inner.last_id += 1;
        let id = SessionId(inner.last_id);
        inner.sinks.insert(id, sink);
        tracing::debug!("Registered session {}", id);
        id
    }

    pub fn unregister(&self, id: SessionId) -> bool {
        let removed = self.lock().sinks.remove(&id).is_some();
        if removed {
            tracing::debug!("Unregistered session {}", id);
        }
        removed
    }

    /// Delivers under the lock, so nothing reaches an id after `unregister`.
    pub fn dispatch(&self, id: SessionId, event: SessionEvent) -> bool {
        let inner = self.lock();
        match inner.sinks.get(&id) {
            Some(sink) => sink.send(event).is_ok(),
            None => {
                tracing::trace!("Dropping event for unknown session {}: {:?}", id, event);
                false
            }
        }
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().sinks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionError;

    #[test]
    fn test_ids_are_unique_and_not_reused() {
        let table = DispatchTable::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = table.register(tx.clone());
        let b = table.register(tx.clone());
        assert_ne!(a, b);
        assert!(table.unregister(a));
        let c = table.register(tx);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_dispatch_routes_to_owner_only() {
        let table = DispatchTable::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = table.register(tx_a);
        let _b = table.register(tx_b);

        assert!(table.dispatch(a, SessionEvent::Error(SessionError::ChannelClosed)));
        assert!(matches!(
            rx_a.try_recv(),
            Ok(SessionEvent::Error(SessionError::ChannelClosed))
        ));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_no_delivery_after_unregister() {
        let table = DispatchTable::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = table.register(tx);
        table.unregister(id);
        assert!(!table.unregister(id));
        assert!(!table.dispatch(id, SessionEvent::Error(SessionError::ChannelClosed)));
        assert!(rx.try_recv().is_err());
        assert!(!table.contains(id));
        assert!(table.is_empty());
    }
}
