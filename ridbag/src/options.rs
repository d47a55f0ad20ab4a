/// Options carried by a [`crate::Session`] and applied to the bags it operates on.
#[derive(Clone, Debug)]
pub struct Options {
    /// The number of tree entries fetched per batch while iterating.
    pub(crate) prefetch_size: usize,
    /// Whether bags created through the session start with change tracking enabled.
    pub(crate) track_changes: bool,
}

impl Options {
    /// Create a new `Options` instance with the default values.
    pub fn new() -> Self {
        Self {
            prefetch_size: 1000,
            track_changes: false,
        }
    }

    /// Set the number of tree entries loaded per batch during iteration.
    ///
    /// Bounds the memory an iterator holds regardless of the size of the bag.
    ///
    /// Must be more than 0. Default: 1000.
    pub fn prefetch_size(&mut self, prefetch_size: usize) {
        assert!(prefetch_size > 0);
        self.prefetch_size = prefetch_size;
    }

    /// Set whether new bags record their additions and removals on a change timeline.
    ///
    /// Default: off.
    pub fn track_changes(&mut self, track_changes: bool) {
        self.track_changes = track_changes;
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn default_prefetch_size() {
    assert_eq!(Options::new().prefetch_size, 1000);
    assert!(!Options::default().track_changes);
}
