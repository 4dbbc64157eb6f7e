//! Typed coordinator events and their handler table
//!
//! The handler table holds at most one handler per event kind; registering
//! again for the same kind replaces the previous handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recognized coordinator events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A task invoked its completion handle. Fired once per completion,
    /// repeats included, with that completion's arguments.
    Callback,
}

/// Handler invoked when a recognized event fires.
pub type EventHandler = Box<dyn FnMut(&[Value]) + Send>;

/// One optional handler slot per event kind.
#[derive(Default)]
pub(crate) struct HandlerTable {
    on_callback: Option<EventHandler>,
}

impl HandlerTable {
    pub(crate) fn set(&mut self, kind: EventKind, handler: EventHandler) {
        match kind {
            EventKind::Callback => self.on_callback = Some(handler),
        }
    }

    pub(crate) fn emit(&mut self, kind: EventKind, args: &[Value]) {
        let handler = match kind {
            EventKind::Callback => self.on_callback.as_mut(),
        };
        if let Some(handler) = handler {
            handler(args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_last_registration_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut table = HandlerTable::default();
        let counter = first.clone();
        table.set(
            EventKind::Callback,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let counter = second.clone();
        table.set(
            EventKind::Callback,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        table.emit(EventKind::Callback, &[json!("x")]);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_without_handler_is_noop() {
        let mut table = HandlerTable::default();
        table.emit(EventKind::Callback, &[]);
    }
}
