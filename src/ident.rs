use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Node,
    Position,
}

impl IdKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Position => "pos",
        }
    }
}

/// Process-unique opaque ids: a monotonic sequence number plus a random
/// suffix, so ids stay unique even across rapid successive calls.
#[derive(Debug, Default)]
pub struct IdGenerator {
    sequence: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_id(&self, kind: IdKind) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}_{sequence}_{}", kind.prefix(), Uuid::new_v4().simple())
    }
}
