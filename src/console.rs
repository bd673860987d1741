use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub const DEFAULT_CONSOLE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleKind {
    /// Guest `print` output.
    Output,
    /// Lifecycle notices from the bridge itself.
    Log,
    /// Configuration problems the guest caused but that did not stop it.
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub kind: ConsoleKind,
    pub text: String,
}

/// Bounded log of everything the script said or had said about it.
#[derive(Debug)]
pub struct ScriptConsole {
    capacity: usize,
    entries: VecDeque<ConsoleEntry>,
    snapshot: Option<Arc<[ConsoleEntry]>>,
}

impl Default for ScriptConsole {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CAPACITY)
    }
}

impl ScriptConsole {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: VecDeque::with_capacity(capacity.min(1_024)), snapshot: None }
    }

    pub fn push(&mut self, kind: ConsoleKind, text: impl Into<String>) {
        let text = text.into();
        match kind {
            ConsoleKind::Output => info!(target: "script_bridge::guest", "{text}"),
            ConsoleKind::Log => info!("{text}"),
            ConsoleKind::Warning => warn!("{text}"),
            ConsoleKind::Error => error!("{text}"),
        }
        self.entries.push_back(ConsoleEntry { kind, text });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.snapshot = None;
    }

    /// Cached view of the buffer; rebuilt only after the console changes.
    pub fn entries(&mut self) -> Arc<[ConsoleEntry]> {
        if let Some(cache) = &self.snapshot {
            return Arc::clone(cache);
        }
        let data = self.entries.iter().cloned().collect::<Vec<_>>();
        let arc: Arc<[ConsoleEntry]> = Arc::from(data.into_boxed_slice());
        self.snapshot = Some(Arc::clone(&arc));
        arc
    }

    pub fn last(&self) -> Option<&ConsoleEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.snapshot = None;
    }
}
