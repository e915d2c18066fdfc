use crate::types::SessionSnapshot;
use std::sync::Arc;
use tokio::sync::watch;

/// Observable session state. Every mutation goes through `send_if_modified`
/// so check-and-set sequences are atomic with respect to other callers.
#[derive(Clone)]
pub struct SessionBus {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::uninitialized());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&SessionSnapshot) -> T) -> T {
        f(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Applies `f` and notifies subscribers only if it returns `true`.
    pub(crate) fn update_if(&self, f: impl FnOnce(&mut SessionSnapshot) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        self.tx.send_modify(f);
    }

    /// Claims the single in-flight slot. Returns `None` when another
    /// session-mutating operation already holds it.
    pub(crate) fn try_begin(&self) -> Option<InFlight> {
        let claimed = self.update_if(|s| {
            if s.is_loading {
                return false;
            }
            s.is_loading = true;
            s.error = None;
            true
        });
        claimed.then(|| InFlight { bus: self.clone() })
    }
}

/// Holds the in-flight slot; releasing happens on drop so a cancelled
/// operation cannot leave `is_loading` stuck.
pub(crate) struct InFlight {
    bus: SessionBus,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.bus.update(|s| s.is_loading = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionStatus;

    #[test]
    fn second_claim_fails_until_first_is_dropped() {
        let bus = SessionBus::new();
        let first = bus.try_begin();
        assert!(first.is_some());
        assert!(bus.snapshot().is_loading);
        assert!(bus.try_begin().is_none());

        drop(first);
        assert!(!bus.snapshot().is_loading);
        assert!(bus.try_begin().is_some());
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let bus = SessionBus::new();
        let mut rx = bus.subscribe();
        bus.update(|s| s.status = SessionStatus::Initializing);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status, SessionStatus::Initializing);
    }

    #[test]
    fn unchanged_update_does_not_notify() {
        let bus = SessionBus::new();
        let rx = bus.subscribe();
        assert!(!bus.update_if(|_| false));
        assert!(!rx.has_changed().unwrap());
    }
}
