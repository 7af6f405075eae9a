//! Maps each authenticated session's `(process_id, secret_key)` — handed
//! to the client in `BackendKeyData` — to a way to ask that session to
//! cancel its in-flight statement. A plain mutex-guarded map is all
//! `CancelRequest` needs: a lookup from key to a wakeup handle.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

#[derive(Default)]
pub struct CancelRegistry {
    handles: Mutex<HashMap<(u32, u32), UnboundedSender<()>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, process_id: u32, secret_key: u32, sender: UnboundedSender<()>) {
        self.handles.lock().unwrap().insert((process_id, secret_key), sender);
    }

    pub fn unregister(&self, process_id: u32, secret_key: u32) {
        self.handles.lock().unwrap().remove(&(process_id, secret_key));
    }

    /// Best-effort: a request naming an unknown or already-closed session
    /// is silently ignored, matching real Postgres (CancelRequest gets no
    /// response either way, so there's nothing to report failure through).
    pub fn cancel(&self, process_id: u32, secret_key: u32) {
        if let Some(sender) = self.handles.lock().unwrap().get(&(process_id, secret_key)) {
            let _ = sender.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_reaches_registered_handle() {
        let registry = CancelRegistry::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry.register(1, 42, tx);
        registry.cancel(1, 42);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn cancel_of_unknown_key_is_a_no_op() {
        let registry = CancelRegistry::new();
        registry.cancel(99, 99);
    }

    #[test]
    fn unregister_stops_further_cancellation() {
        let registry = CancelRegistry::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry.register(1, 42, tx);
        registry.unregister(1, 42);
        registry.cancel(1, 42);
        assert!(rx.try_recv().is_err());
    }
}
