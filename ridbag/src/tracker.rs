//! Timelines of the additions and removals made to a bag, used to roll a transaction back.

use crate::record::RecordRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Remove,
}

/// A single addition or removal of one occurrence.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub value: RecordRef,
}

/// Events in the order they happened.
#[derive(Debug, Clone, Default)]
pub struct ChangeTimeLine {
    events: Vec<ChangeEvent>,
}

impl ChangeTimeLine {
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn push(&mut self, event: ChangeEvent) {
        self.events.push(event);
    }
}

/// Records events while enabled. The transaction timeline is reset independently at the end of
/// every transaction while the full timeline lives as long as tracking stays enabled.
#[derive(Debug, Default)]
pub(crate) struct ChangeTracker {
    enabled: bool,
    timeline: Option<ChangeTimeLine>,
    transaction_timeline: Option<ChangeTimeLine>,
}

impl ChangeTracker {
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn enable(&mut self) {
        self.enabled = true;
    }

    pub(crate) fn disable(&mut self) {
        self.enabled = false;
        self.timeline = None;
        self.transaction_timeline = None;
    }

    pub(crate) fn record(&mut self, kind: ChangeKind, value: &RecordRef) {
        if !self.enabled {
            return;
        }
        let event = ChangeEvent {
            kind,
            value: value.clone(),
        };
        self.transaction_timeline
            .get_or_insert_with(Default::default)
            .push(event.clone());
        self.timeline.get_or_insert_with(Default::default).push(event);
    }

    pub(crate) fn transaction_clear(&mut self) {
        self.transaction_timeline = None;
    }

    pub(crate) fn timeline(&self) -> Option<&ChangeTimeLine> {
        self.timeline.as_ref()
    }

    pub(crate) fn transaction_timeline(&self) -> Option<&ChangeTimeLine> {
        self.transaction_timeline.as_ref()
    }
}
