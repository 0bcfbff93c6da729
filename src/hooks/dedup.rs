//! Hook delivery deduplication window

/// Number of recent ids remembered
pub const RECENT_ID_CAPACITY: usize = 16;

/// Fixed-capacity ring of recently seen event ids
///
/// Prevents acting on the same hook notification twice when the gateway
/// retransmits it. Insertion order defines eviction: once full, each new id
/// overwrites the oldest one.
#[derive(Debug, Default)]
pub struct RecentEventIds {
    ids: [Option<String>; RECENT_ID_CAPACITY],
    next: usize,
}

impl RecentEventIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is in the window
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().flatten().any(|seen| seen == id)
    }

    /// Check `id` and record it on first sight
    ///
    /// Returns `true` if this is a duplicate. Empty ids are never recorded
    /// and never count as duplicates.
    pub fn is_duplicate(&mut self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        if self.contains(id) {
            return true;
        }

        self.ids[self.next] = Some(id.to_string());
        self.next = (self.next + 1) % RECENT_ID_CAPACITY;
        false
    }

    /// Number of ids currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.iter().flatten().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
