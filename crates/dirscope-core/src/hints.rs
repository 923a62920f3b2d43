/// Hint bus — typed invalidation events fanned out to presenters.
///
/// Publishers never call into subscribers: each subscriber owns a
/// crossbeam receiver and drains it on its own loop, so no handler can
/// mutate the tree re-entrantly. Disconnected subscribers are dropped on
/// the next publish.
use crate::model::NodeRef;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Per-subscriber buffer; a subscriber that stops draining loses hints
/// rather than blocking publishers.
const SUBSCRIBER_CAPACITY: usize = 1_024;

/// Invalidation events consumed by presenters.
#[derive(Clone, Debug)]
pub enum Hint {
    /// The tree has a new root; rebuild everything derived from it.
    NewRoot,
    SelectionChanged(Option<NodeRef>),
    SelectionStyleChanged,
    /// Highlighted extension changed (`None` clears the highlight).
    ExtensionHighlightChanged(Option<String>),
    TreemapStyleChanged,
    ZoomChanged,
    ListStyleChanged,
    /// A node left the tree; weak holders must drop their references.
    NodeRemoved(NodeRef),
    /// The scan ended abnormally (root unavailable, invariant violation).
    ScanTerminated(String),
}

/// Cloneable fan-out bus.
#[derive(Clone, Default)]
pub struct HintBus {
    subscribers: Arc<Mutex<Vec<Sender<Hint>>>>,
}

impl HintBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and get its receiving end.
    pub fn subscribe(&self) -> Receiver<Hint> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_CAPACITY);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `hint` to every live subscriber, best-effort.
    pub fn publish(&self, hint: Hint) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| {
            !matches!(tx.try_send(hint.clone()), Err(TrySendError::Disconnected(_)))
        });
    }
}
