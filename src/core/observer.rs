//! Change notifications for front ends that render controller state.

use std::collections::HashMap;

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    State,
    Document,
    Error,
    TokenCount,
    StopSequences,
    Models,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    State(crate::core::controller::ControllerState),
    /// The document now has this many chunks.
    Document { chunks: usize },
    Error(Option<String>),
    TokenCount(usize),
    /// `Some` holds the parse error for the current stop-sequence text.
    StopSequences(Option<String>),
    Models(Vec<String>),
}

impl StateChange {
    pub fn field(&self) -> StateField {
        match self {
            StateChange::State(_) => StateField::State,
            StateChange::Document { .. } => StateField::Document,
            StateChange::Error(_) => StateField::Error,
            StateChange::TokenCount(_) => StateField::TokenCount,
            StateChange::StopSequences(_) => StateField::StopSequences,
            StateChange::Models(_) => StateField::Models,
        }
    }
}

/// Per-field subscriber lists. Closed receivers are pruned on the next
/// notification.
#[derive(Debug, Default)]
pub struct Observers {
    subscribers: HashMap<StateField, Vec<mpsc::UnboundedSender<StateChange>>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, field: StateField) -> mpsc::UnboundedReceiver<StateChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(field).or_default().push(tx);
        rx
    }

    pub fn notify(&mut self, change: StateChange) {
        if let Some(senders) = self.subscribers.get_mut(&change.field()) {
            senders.retain(|tx| tx.send(change.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self, field: StateField) -> usize {
        self.subscribers.get(&field).map_or(0, Vec::len)
    }
}
