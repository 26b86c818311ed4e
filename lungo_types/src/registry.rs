use crate::pointers::ValueRef;
use dashmap::DashMap;

/// Registry of loaded namespace modules, owned by the VM space.
///
/// Entries are *non-owning*: registering a namespace does not raise its
/// reference count, so an abandoned module's count can still fall to zero and
/// the collector can discover it. The collector's Deregister phase erases the
/// entry of a namespace whose cycle scan has shown no remaining external
/// owner, before the namespace's references are broken; this is what keeps
/// the registry from ever handing out a dangling module.
///
/// Each entry is erased atomically (the predicate runs under the map's shard
/// lock), which stands in for the VM-space lock the erase must happen under.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: DashMap<String, ValueRef>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `namespace` under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, namespace: ValueRef) {
        self.modules.insert(name.into(), namespace);
    }

    /// Looks up a module by name. The caller owns no reference to the result
    /// until it takes one through the collector.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ValueRef> {
        self.modules.get(name).map(|entry| *entry)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Atomically erases `name` if it still maps to `namespace`. Returns
    /// whether an entry was removed.
    pub fn deregister(&self, name: &str, namespace: ValueRef) -> bool {
        self.modules
            .remove_if(name, |_, current| *current == namespace)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, destroy};

    #[test]
    fn register_and_lookup() {
        let registry = ModuleRegistry::new();
        let ns = Value::new_namespace("io", None);
        registry.register("io", ns);
        assert_eq!(registry.lookup("io"), Some(ns));
        assert!(registry.lookup("net").is_none());
        // Safety: sole owner; never touched again.
        unsafe { destroy(ns) };
    }

    #[test]
    fn deregister_checks_identity() {
        let registry = ModuleRegistry::new();
        let old = Value::new_namespace("io", None);
        let new = Value::new_namespace("io", None);
        registry.register("io", old);
        registry.register("io", new);
        // A stale pointer must not erase the replacement entry.
        assert!(!registry.deregister("io", old));
        assert!(registry.contains("io"));
        assert!(registry.deregister("io", new));
        assert!(registry.is_empty());
        unsafe {
            destroy(old);
            destroy(new);
        }
    }
}
