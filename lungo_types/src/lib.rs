//! # Lungo Types
//!
//! The value model shared between the Lungo VM and its garbage collector.
//!
//! Every managed value starts with a [`GcHeader`] (reference count, cycle
//! scratch count, and the collector's per-cycle flag bits) followed by a
//! kind-specific payload ([`ValueData`]). The collector sees values through
//! exactly two things: the header, and the outbound-reference slots reachable
//! from the payload.
//!
//! Two GC-aware containers, [`ValueSeq`] and [`ValueMap`], are what value
//! kinds use to hold variable numbers of references. Each carries a tag
//! saying whether its slots hold managed references at all, plus a `mutating`
//! flag that forms one half of the handshake with the collector's scan of a
//! shared container (the other half is the collector's `scanning` pointer).
//!
//! The [`ModuleRegistry`] is the VM-space table of loaded namespaces. Its
//! entries are non-owning; the collector erases the entry of a namespace it
//! has proven dead before dismantling it.

mod containers;
mod header;
mod kind;
#[cfg(feature = "object-log")]
pub mod object_log;
mod pointers;
mod registry;
mod value;

pub use containers::{MapEntry, MapKey, ValueMap, ValueSeq};
pub use header::{GcFlags, GcHeader};
pub use kind::{DataKind, VALUE_KIND_COUNT, ValueKind, ValueTraits};
pub use pointers::{ValueRef, ValueSlot};
pub use registry::ModuleRegistry;
pub use value::{
    ClassData, ConstantData, EnumData, Frame, InterfaceData, ListData, MapData, NamespaceData,
    ObjectData, ProcessData, RoutineData, TupleData, TypeData, Value, ValueData, VariableData,
    destroy, noncyclic_ctype,
};
