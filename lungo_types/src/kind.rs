use bitflags::bitflags;

/// Tag identifying the kind of a managed value.
///
/// Kinds up to and including `Str` are *simple*: they hold no outbound
/// references and can never participate in a reference cycle. A simple value
/// whose reference count reaches zero is freed without ever entering the
/// cyclic scan queues. Every kind from `Enum` onward is cyclic-capable and is
/// traversed by the collector's dispatch.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum ValueKind {
    None,
    Int,
    Float,
    Str,
    Enum,
    Constant,
    Variable,
    Tuple,
    List,
    Map,
    Object,
    Class,
    Interface,
    Namespace,
    Routine,
    Process,
    Type,
}

/// Number of value kinds; sizes the object logger's per-kind counters.
pub const VALUE_KIND_COUNT: usize = 17;

impl ValueKind {
    /// Whether this kind holds no outbound references.
    #[must_use]
    pub fn is_simple(self) -> bool {
        matches!(
            self,
            ValueKind::None | ValueKind::Int | ValueKind::Float | ValueKind::Str
        )
    }

    /// Whether instances of this kind may participate in cycles.
    #[must_use]
    pub fn is_cyclic(self) -> bool {
        !self.is_simple()
    }
}

bitflags! {
    /// Static per-value trait bits, fixed at construction.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ValueTraits: u8 {
        /// Long-lived value; the collector prefers deferring its scan to a
        /// full cycle.
        const DELAY_GC = 0b0000_0001;
    }
}

/// Payload tag for the GC-aware containers: whether slots hold managed
/// references (and are therefore roots for the collector to traverse) or raw
/// data the collector must ignore.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataKind {
    Raw,
    Values,
}
