use crate::kind::DataKind;
use crate::pointers::ValueSlot;
use std::sync::atomic::{AtomicBool, Ordering};

/// An ordered sequence of reference slots, the list-shaped container value
/// kinds use to hold managed references.
///
/// The `mutating` flag is the mutator's half of the handshake with the
/// collector: a mutator raises it (through the collector's `lock_seq`) before
/// touching the slots, and the collector spins on it before scanning. Both
/// the flag and the collector's `scanning` pointer use sequentially
/// consistent ordering because each side stores its own flag and then loads
/// the other's; weaker orderings would let both sides take their fast path at
/// once.
#[derive(Debug)]
pub struct ValueSeq {
    kind: DataKind,
    mutating: AtomicBool,
    slots: Vec<ValueSlot>,
}

impl ValueSeq {
    #[must_use]
    pub fn new(kind: DataKind) -> Self {
        Self {
            kind,
            mutating: AtomicBool::new(false),
            slots: Vec::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> DataKind {
        self.kind
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn slots(&self) -> &[ValueSlot] {
        &self.slots
    }

    #[must_use]
    pub fn slots_mut(&mut self) -> &mut [ValueSlot] {
        &mut self.slots
    }

    /// Appends an empty or filled slot. Callers that store a managed
    /// reference are responsible for the accompanying `inc_ref` (normally by
    /// pushing an empty slot and assigning into it).
    pub fn push(&mut self, slot: ValueSlot) {
        self.slots.push(slot);
    }

    #[must_use]
    pub fn last_slot_mut(&mut self) -> Option<&mut ValueSlot> {
        self.slots.last_mut()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Mutation flag backing the collector handshake.
    #[must_use]
    pub fn mutation_flag(&self) -> &AtomicBool {
        &self.mutating
    }

    #[must_use]
    pub fn is_mutating(&self) -> bool {
        self.mutating.load(Ordering::SeqCst)
    }

    /// Identity used against the collector's `scanning` pointer.
    #[must_use]
    pub fn scan_tag(&self) -> *const () {
        std::ptr::from_ref(self).cast()
    }
}

/// Key of a [`ValueMap`] entry: raw text, or a managed value that the
/// collector must traverse when the map's key tag says so.
#[derive(Debug)]
pub enum MapKey {
    Text(String),
    Value(ValueSlot),
}

#[derive(Debug)]
pub struct MapEntry {
    pub key: MapKey,
    pub value: ValueSlot,
}

/// A key-to-value mapping with independently tagged key and value sides.
///
/// Namespaces map raw names to managed values; user maps hold managed values
/// on both sides. The tags tell the collector which sides are roots. The
/// `mutating` flag works exactly as on [`ValueSeq`].
#[derive(Debug)]
pub struct ValueMap {
    key_kind: DataKind,
    val_kind: DataKind,
    mutating: AtomicBool,
    entries: Vec<MapEntry>,
}

impl ValueMap {
    #[must_use]
    pub fn new(key_kind: DataKind, val_kind: DataKind) -> Self {
        Self {
            key_kind,
            val_kind,
            mutating: AtomicBool::new(false),
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn key_kind(&self) -> DataKind {
        self.key_kind
    }

    #[must_use]
    pub fn val_kind(&self) -> DataKind {
        self.val_kind
    }

    /// Whether either side of the map holds managed references.
    #[must_use]
    pub fn holds_values(&self) -> bool {
        self.key_kind == DataKind::Values || self.val_kind == DataKind::Values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    #[must_use]
    pub fn entries_mut(&mut self) -> &mut [MapEntry] {
        &mut self.entries
    }

    pub fn push(&mut self, entry: MapEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn last_entry_mut(&mut self) -> Option<&mut MapEntry> {
        self.entries.last_mut()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Retags both sides as raw. The break phase does this after nulling the
    /// slots so a later sweep never reinterprets the cleared storage.
    pub fn set_raw(&mut self) {
        self.key_kind = DataKind::Raw;
        self.val_kind = DataKind::Raw;
    }

    /// Mutation flag backing the collector handshake.
    #[must_use]
    pub fn mutation_flag(&self) -> &AtomicBool {
        &self.mutating
    }

    #[must_use]
    pub fn is_mutating(&self) -> bool {
        self.mutating.load(Ordering::SeqCst)
    }

    /// Identity used against the collector's `scanning` pointer.
    #[must_use]
    pub fn scan_tag(&self) -> *const () {
        std::ptr::from_ref(self).cast()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_starts_quiet() {
        let seq = ValueSeq::new(DataKind::Values);
        assert_eq!(seq.kind(), DataKind::Values);
        assert!(seq.is_empty());
        assert!(!seq.is_mutating());
    }

    #[test]
    fn seq_push_and_clear() {
        let mut seq = ValueSeq::new(DataKind::Values);
        seq.push(ValueSlot::EMPTY);
        seq.push(ValueSlot::EMPTY);
        assert_eq!(seq.len(), 2);
        seq.clear();
        assert!(seq.is_empty());
    }

    #[test]
    fn map_tagging() {
        let mut map = ValueMap::new(DataKind::Raw, DataKind::Values);
        assert!(map.holds_values());
        map.set_raw();
        assert!(!map.holds_values());
    }
}
