use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of names for temporary server-side objects (staging areas, result tables).
pub trait NameGenerator: Send + Sync {
    /// Returns `"{prefix}_{suffix}"` with a suffix unique for this generator.
    fn generate(&self, prefix: &str) -> String;
}

/// Uppercase hex suffixes taken from a v4 UUID.
#[derive(Debug, Clone)]
pub struct RandomNames {
    len: usize,
}

impl RandomNames {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { len: len.clamp(1, 32) }
    }
}

impl Default for RandomNames {
    fn default() -> Self {
        Self::new(6)
    }
}

impl NameGenerator for RandomNames {
    fn generate(&self, prefix: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string().to_uppercase();
        format!("{prefix}_{}", &suffix[..self.len])
    }
}

/// Deterministic `{prefix}_000001`, `{prefix}_000002`, ... names.
#[derive(Debug, Default)]
pub struct SequentialNames {
    next: AtomicU64,
}

impl SequentialNames {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameGenerator for SequentialNames {
    fn generate(&self, prefix: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}_{n:06}")
    }
}
