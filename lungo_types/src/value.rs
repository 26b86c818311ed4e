use crate::containers::{ValueMap, ValueSeq};
use crate::header::GcHeader;
use crate::kind::{DataKind, ValueKind, ValueTraits};
use crate::pointers::{ValueRef, ValueSlot};
use crate::registry::ModuleRegistry;
use std::sync::Arc;

/// A managed value: the GC header followed by the kind-specific payload.
#[derive(Debug)]
pub struct Value {
    pub header: GcHeader,
    pub data: ValueData,
}

/// Kind-specific payloads. The collector's traversal dispatch enumerates the
/// slots and containers of each variant; everything else in a payload is
/// opaque to it.
#[derive(Debug)]
pub enum ValueData {
    None,
    Int(i64),
    Float(f64),
    Str(String),
    Enum(EnumData),
    Constant(ConstantData),
    Variable(VariableData),
    Tuple(TupleData),
    List(ListData),
    Map(MapData),
    Object(ObjectData),
    Class(ClassData),
    Interface(InterfaceData),
    Namespace(NamespaceData),
    Routine(RoutineData),
    Process(ProcessData),
    Type(TypeData),
}

#[derive(Debug)]
pub struct EnumData {
    pub etype: ValueSlot,
    pub symbol: String,
    pub ordinal: i32,
}

#[derive(Debug)]
pub struct ConstantData {
    pub value: ValueSlot,
}

#[derive(Debug)]
pub struct VariableData {
    pub value: ValueSlot,
    pub dtype: ValueSlot,
}

/// Fixed-arity product value. A tuple whose attached type is noncyclic gets
/// its slots released inline when its reference count reaches zero.
#[derive(Debug)]
pub struct TupleData {
    pub ctype: ValueSlot,
    pub slots: Vec<ValueSlot>,
}

#[derive(Debug)]
pub struct ListData {
    pub ctype: ValueSlot,
    pub items: ValueSeq,
}

#[derive(Debug)]
pub struct MapData {
    pub ctype: ValueSlot,
    pub entries: ValueMap,
}

/// A class instance: back-pointer to its class plus the instance fields.
#[derive(Debug)]
pub struct ObjectData {
    pub class: ValueSlot,
    pub fields: Vec<ValueSlot>,
}

#[derive(Debug)]
pub struct ClassData {
    pub name: String,
    pub cls_type: ValueSlot,
    pub ctor: ValueSlot,
    pub constants: ValueSeq,
    pub variables: ValueSeq,
    pub bases: ValueSeq,
    pub methods: ValueMap,
}

#[derive(Debug)]
pub struct InterfaceData {
    pub abtype: ValueSlot,
    pub supers: ValueSeq,
    pub methods: ValueMap,
}

/// A loaded module. Registered namespaces also appear in the VM-space
/// [`ModuleRegistry`]; the registry entry is non-owning and is erased by the
/// collector's Deregister phase once the namespace is proven dead.
#[derive(Debug)]
pub struct NamespaceData {
    pub name: String,
    pub registry: Option<Arc<ModuleRegistry>>,
    pub constants: ValueSeq,
    pub variables: ValueSeq,
    pub aux: ValueSeq,
    pub types: ValueMap,
}

#[derive(Debug)]
pub struct RoutineData {
    pub name: String,
    pub rtype: ValueSlot,
    pub host: ValueSlot,
    pub nspace: ValueSlot,
    pub consts: ValueSeq,
    pub overloads: ValueSeq,
}

/// One interpreter stack frame of a process.
#[derive(Debug)]
pub struct Frame {
    pub routine: ValueSlot,
    pub object: ValueSlot,
    pub rtype: ValueSlot,
}

#[derive(Debug)]
pub struct ProcessData {
    pub future: ValueSlot,
    pub exceptions: ValueSeq,
    pub defers: ValueSeq,
    pub stack: Vec<ValueSlot>,
    pub frames: Vec<Frame>,
}

#[derive(Debug)]
pub struct TypeData {
    pub name: String,
    pub aux: ValueSlot,
    pub value: ValueSlot,
    pub quadtype: ValueSlot,
    pub nested: ValueSeq,
    pub bases: ValueSeq,
    pub interfaces: ValueMap,
    /// Instances of this type are guaranteed cycle-free; containers typed
    /// with it take the inline-release fast path.
    pub noncyclic: bool,
}

impl ValueData {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            ValueData::None => ValueKind::None,
            ValueData::Int(_) => ValueKind::Int,
            ValueData::Float(_) => ValueKind::Float,
            ValueData::Str(_) => ValueKind::Str,
            ValueData::Enum(_) => ValueKind::Enum,
            ValueData::Constant(_) => ValueKind::Constant,
            ValueData::Variable(_) => ValueKind::Variable,
            ValueData::Tuple(_) => ValueKind::Tuple,
            ValueData::List(_) => ValueKind::List,
            ValueData::Map(_) => ValueKind::Map,
            ValueData::Object(_) => ValueKind::Object,
            ValueData::Class(_) => ValueKind::Class,
            ValueData::Interface(_) => ValueKind::Interface,
            ValueData::Namespace(_) => ValueKind::Namespace,
            ValueData::Routine(_) => ValueKind::Routine,
            ValueData::Process(_) => ValueKind::Process,
            ValueData::Type(_) => ValueKind::Type,
        }
    }
}

impl Value {
    /// Allocates a managed value with one owning reference (`rc = 1`, held by
    /// the creator).
    ///
    /// Slot arguments to the typed constructors transfer ownership: a
    /// reference placed in a payload slot becomes the new value's reference.
    /// Callers keeping their own must raise the count first.
    #[must_use]
    pub fn alloc(data: ValueData, traits: ValueTraits) -> ValueRef {
        let kind = data.kind();
        let value = ValueRef::from_box(Box::new(Value {
            header: GcHeader::new(kind, traits),
            data,
        }));
        #[cfg(feature = "object-log")]
        crate::object_log::log_new(value);
        value
    }

    #[must_use]
    pub fn new_none() -> ValueRef {
        Self::alloc(ValueData::None, ValueTraits::empty())
    }

    #[must_use]
    pub fn new_int(value: i64) -> ValueRef {
        Self::alloc(ValueData::Int(value), ValueTraits::empty())
    }

    #[must_use]
    pub fn new_float(value: f64) -> ValueRef {
        Self::alloc(ValueData::Float(value), ValueTraits::empty())
    }

    #[must_use]
    pub fn new_str(value: impl Into<String>) -> ValueRef {
        Self::alloc(ValueData::Str(value.into()), ValueTraits::empty())
    }

    #[must_use]
    pub fn new_enum(etype: ValueSlot, symbol: impl Into<String>, ordinal: i32) -> ValueRef {
        Self::alloc(
            ValueData::Enum(EnumData {
                etype,
                symbol: symbol.into(),
                ordinal,
            }),
            ValueTraits::empty(),
        )
    }

    #[must_use]
    pub fn new_constant(value: ValueSlot) -> ValueRef {
        Self::alloc(ValueData::Constant(ConstantData { value }), ValueTraits::empty())
    }

    #[must_use]
    pub fn new_variable(value: ValueSlot, dtype: ValueSlot) -> ValueRef {
        Self::alloc(
            ValueData::Variable(VariableData { value, dtype }),
            ValueTraits::empty(),
        )
    }

    /// Allocates a tuple with `arity` empty slots.
    #[must_use]
    pub fn new_tuple(ctype: ValueSlot, arity: usize) -> ValueRef {
        Self::alloc(
            ValueData::Tuple(TupleData {
                ctype,
                slots: vec![ValueSlot::EMPTY; arity],
            }),
            ValueTraits::empty(),
        )
    }

    #[must_use]
    pub fn new_list(ctype: ValueSlot) -> ValueRef {
        Self::alloc(
            ValueData::List(ListData {
                ctype,
                items: ValueSeq::new(DataKind::Values),
            }),
            ValueTraits::empty(),
        )
    }

    #[must_use]
    pub fn new_map(ctype: ValueSlot) -> ValueRef {
        Self::alloc(
            ValueData::Map(MapData {
                ctype,
                entries: ValueMap::new(DataKind::Values, DataKind::Values),
            }),
            ValueTraits::empty(),
        )
    }

    /// Allocates a class instance with `field_count` empty fields.
    #[must_use]
    pub fn new_object(class: ValueSlot, field_count: usize) -> ValueRef {
        Self::alloc(
            ValueData::Object(ObjectData {
                class,
                fields: vec![ValueSlot::EMPTY; field_count],
            }),
            ValueTraits::empty(),
        )
    }

    #[must_use]
    pub fn new_class(name: impl Into<String>) -> ValueRef {
        Self::alloc(
            ValueData::Class(ClassData {
                name: name.into(),
                cls_type: ValueSlot::EMPTY,
                ctor: ValueSlot::EMPTY,
                constants: ValueSeq::new(DataKind::Values),
                variables: ValueSeq::new(DataKind::Values),
                bases: ValueSeq::new(DataKind::Values),
                methods: ValueMap::new(DataKind::Raw, DataKind::Values),
            }),
            ValueTraits::DELAY_GC,
        )
    }

    #[must_use]
    pub fn new_interface() -> ValueRef {
        Self::alloc(
            ValueData::Interface(InterfaceData {
                abtype: ValueSlot::EMPTY,
                supers: ValueSeq::new(DataKind::Values),
                methods: ValueMap::new(DataKind::Raw, DataKind::Values),
            }),
            ValueTraits::empty(),
        )
    }

    #[must_use]
    pub fn new_namespace(
        name: impl Into<String>,
        registry: Option<Arc<ModuleRegistry>>,
    ) -> ValueRef {
        Self::alloc(
            ValueData::Namespace(NamespaceData {
                name: name.into(),
                registry,
                constants: ValueSeq::new(DataKind::Values),
                variables: ValueSeq::new(DataKind::Values),
                aux: ValueSeq::new(DataKind::Values),
                types: ValueMap::new(DataKind::Raw, DataKind::Values),
            }),
            ValueTraits::DELAY_GC,
        )
    }

    #[must_use]
    pub fn new_routine(name: impl Into<String>) -> ValueRef {
        Self::alloc(
            ValueData::Routine(RoutineData {
                name: name.into(),
                rtype: ValueSlot::EMPTY,
                host: ValueSlot::EMPTY,
                nspace: ValueSlot::EMPTY,
                consts: ValueSeq::new(DataKind::Values),
                overloads: ValueSeq::new(DataKind::Values),
            }),
            ValueTraits::empty(),
        )
    }

    #[must_use]
    pub fn new_process() -> ValueRef {
        Self::alloc(
            ValueData::Process(ProcessData {
                future: ValueSlot::EMPTY,
                exceptions: ValueSeq::new(DataKind::Values),
                defers: ValueSeq::new(DataKind::Values),
                stack: Vec::new(),
                frames: Vec::new(),
            }),
            ValueTraits::empty(),
        )
    }

    #[must_use]
    pub fn new_type(name: impl Into<String>, noncyclic: bool) -> ValueRef {
        Self::alloc(
            ValueData::Type(TypeData {
                name: name.into(),
                aux: ValueSlot::EMPTY,
                value: ValueSlot::EMPTY,
                quadtype: ValueSlot::EMPTY,
                nested: ValueSeq::new(DataKind::Values),
                bases: ValueSeq::new(DataKind::Values),
                interfaces: ValueMap::new(DataKind::Values, DataKind::Raw),
                noncyclic,
            }),
            ValueTraits::DELAY_GC,
        )
    }
}

/// Whether `ctype` names a type whose instances are guaranteed cycle-free.
#[must_use]
pub fn noncyclic_ctype(ctype: ValueSlot) -> bool {
    let Some(t) = ctype.get() else {
        return false;
    };
    // Safety: type back-pointers outlive the values carrying them (Type
    // values are destroyed last when the free queue is drained).
    match unsafe { t.data() } {
        ValueData::Type(data) => data.noncyclic,
        _ => false,
    }
}

/// Deallocates a managed value.
///
/// This is the single deallocation point for the whole system; only the
/// collector (or a test that fully owns a value) calls it.
///
/// # Safety
///
/// `value` must have been produced by [`Value::alloc`], must not have been
/// destroyed before, and no thread may touch it afterwards. The payload's
/// slots are raw pointers and are not released here; the caller must have
/// already released or broken them.
pub unsafe fn destroy(value: ValueRef) {
    #[cfg(feature = "object-log")]
    crate::object_log::log_delete(value);
    drop(unsafe { Box::from_raw(value.as_ptr()) });
}
