//! Shared, write-once registries backing the container.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::descriptor::{ComponentDescriptor, Implementation};
use crate::error::{ContainerError, ContainerResult};
use crate::instance::Instance;
use crate::key::TypeKey;

// ─── InstanceRegistry ────────────────────────────────────────────────────────

/// Finished singletons, addressed by type or by string key.
///
/// Entries are write-once: binding an occupied type or key fails with
/// [`ContainerError::DuplicateRegistration`] and leaves the first value bound.
#[derive(Default)]
pub(crate) struct InstanceRegistry {
    typed: RwLock<HashMap<TypeKey, Instance>>,
    named: RwLock<HashMap<String, Instance>>,
}

impl InstanceRegistry {
    /// Creates a registry holding one typed entry.
    pub(crate) fn seeded(key: TypeKey, instance: Instance) -> Self {
        Self {
            typed: RwLock::new(HashMap::from([(key, instance)])),
            named: RwLock::default(),
        }
    }

    pub(crate) fn get(&self, key: TypeKey) -> Option<Instance> {
        self.typed.read().get(&key).cloned()
    }

    pub(crate) fn contains(&self, key: TypeKey) -> bool {
        self.typed.read().contains_key(&key)
    }

    pub(crate) fn insert(&self, key: TypeKey, instance: Instance) -> ContainerResult<()> {
        match self.typed.write().entry(key) {
            Entry::Occupied(_) => Err(ContainerError::duplicate(key.name())),
            Entry::Vacant(slot) => {
                slot.insert(instance);
                Ok(())
            }
        }
    }

    /// Inserts every entry or none of them.
    pub(crate) fn insert_all(&self, entries: Vec<(TypeKey, Instance)>) -> ContainerResult<()> {
        let mut typed = self.typed.write();
        if let Some((key, _)) = entries.iter().find(|(key, _)| typed.contains_key(key)) {
            return Err(ContainerError::duplicate(key.name()));
        }
        typed.extend(entries);
        Ok(())
    }

    pub(crate) fn get_named(&self, key: &str) -> Option<Instance> {
        self.named.read().get(key).cloned()
    }

    pub(crate) fn insert_named(&self, key: String, instance: Instance) -> ContainerResult<()> {
        match self.named.write().entry(key) {
            Entry::Occupied(slot) => Err(ContainerError::duplicate(slot.key().as_str())),
            Entry::Vacant(slot) => {
                slot.insert(instance);
                Ok(())
            }
        }
    }

    pub(crate) fn len(&self) -> (usize, usize) {
        (self.typed.read().len(), self.named.read().len())
    }
}

// ─── ImplementationRegistry ──────────────────────────────────────────────────

/// Interface → concrete bindings.
///
/// Explicit bindings and declared defaults are kept apart so that an explicit
/// binding registered after the interface still wins over its default.
#[derive(Default)]
pub(crate) struct ImplementationRegistry {
    explicit: RwLock<HashMap<TypeKey, Implementation>>,
    defaults: RwLock<HashMap<TypeKey, Implementation>>,
}

impl ImplementationRegistry {
    pub(crate) fn bind(&self, implementation: Implementation) -> ContainerResult<()> {
        let key = implementation.interface();
        match self.explicit.write().entry(key) {
            Entry::Occupied(_) => Err(ContainerError::duplicate(format!("implementation:{key}"))),
            Entry::Vacant(slot) => {
                slot.insert(implementation);
                Ok(())
            }
        }
    }

    /// Records a declared default. A second default for the same interface is ignored.
    pub(crate) fn declare_default(&self, implementation: Implementation) -> bool {
        match self.defaults.write().entry(implementation.interface()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(implementation);
                true
            }
        }
    }

    /// Explicit binding first, declared default second.
    pub(crate) fn get(&self, interface: TypeKey) -> Option<Implementation> {
        if let Some(explicit) = self.explicit.read().get(&interface) {
            return Some(explicit.clone());
        }
        self.defaults.read().get(&interface).cloned()
    }
}

// ─── DescriptorTable ─────────────────────────────────────────────────────────

enum DescriptorSource {
    Declared(fn() -> ComponentDescriptor),
    Built(Arc<ComponentDescriptor>),
}

/// Known components and their descriptors.
///
/// Registering a component records where its descriptor comes from; the
/// descriptor itself is derived on first lookup and cached.
#[derive(Default)]
pub(crate) struct DescriptorTable {
    sources: RwLock<HashMap<TypeKey, DescriptorSource>>,
}

impl DescriptorTable {
    pub(crate) fn declare(
        &self,
        key: TypeKey,
        descriptor: fn() -> ComponentDescriptor,
    ) -> ContainerResult<()> {
        match self.sources.write().entry(key) {
            Entry::Occupied(_) => Err(ContainerError::duplicate(format!("component:{key}"))),
            Entry::Vacant(slot) => {
                slot.insert(DescriptorSource::Declared(descriptor));
                Ok(())
            }
        }
    }

    /// Like [`declare`](Self::declare) but keeps an existing entry.
    pub(crate) fn declare_if_absent(&self, key: TypeKey, descriptor: fn() -> ComponentDescriptor) {
        self.sources
            .write()
            .entry(key)
            .or_insert(DescriptorSource::Declared(descriptor));
    }

    pub(crate) fn insert(&self, descriptor: ComponentDescriptor) -> ContainerResult<()> {
        let key = descriptor.key();
        match self.sources.write().entry(key) {
            Entry::Occupied(_) => Err(ContainerError::duplicate(format!("component:{key}"))),
            Entry::Vacant(slot) => {
                slot.insert(DescriptorSource::Built(Arc::new(descriptor)));
                Ok(())
            }
        }
    }

    pub(crate) fn get(&self, key: TypeKey) -> Option<Arc<ComponentDescriptor>> {
        let declared = match self.sources.read().get(&key)? {
            DescriptorSource::Built(descriptor) => return Some(Arc::clone(descriptor)),
            DescriptorSource::Declared(declared) => *declared,
        };

        let built = Arc::new(declared());
        let mut sources = self.sources.write();
        match sources.get(&key) {
            // Another thread derived it first; keep theirs.
            Some(DescriptorSource::Built(existing)) => Some(Arc::clone(existing)),
            _ => {
                sources.insert(key, DescriptorSource::Built(Arc::clone(&built)));
                Some(built)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Component;

    #[derive(Default)]
    struct Cache;

    impl Component for Cache {
        fn descriptor() -> ComponentDescriptor {
            ComponentDescriptor::with_default::<Self>().build()
        }
    }

    #[test]
    fn test_instances_are_write_once() {
        let registry = InstanceRegistry::default();
        registry
            .insert_named("cache".into(), Instance::new(Arc::new(1u8)))
            .unwrap();
        assert!(matches!(
            registry.insert_named("cache".into(), Instance::new(Arc::new(2u8))),
            Err(ContainerError::DuplicateRegistration { key }) if key == "cache"
        ));
        let bound = registry.get_named("cache").unwrap();
        assert_eq!(*bound.downcast::<u8>().unwrap(), 1);
    }

    #[test]
    fn test_insert_all_is_atomic() {
        let registry = InstanceRegistry::default();
        registry
            .insert(TypeKey::of::<u8>(), Instance::new(Arc::new(1u8)))
            .unwrap();

        let batch = vec![
            (TypeKey::of::<u16>(), Instance::new(Arc::new(2u16))),
            (TypeKey::of::<u8>(), Instance::new(Arc::new(3u8))),
        ];
        assert!(registry.insert_all(batch).is_err());
        assert!(!registry.contains(TypeKey::of::<u16>()));
        assert_eq!(registry.len(), (1, 0));
    }

    #[test]
    fn test_descriptor_built_once_and_cached() {
        let table = DescriptorTable::default();
        table
            .declare(TypeKey::of::<Cache>(), Cache::descriptor)
            .unwrap();
        assert!(table.declare(TypeKey::of::<Cache>(), Cache::descriptor).is_err());

        let first = table.get(TypeKey::of::<Cache>()).unwrap();
        let second = table.get(TypeKey::of::<Cache>()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(table.get(TypeKey::of::<u8>()).is_none());
    }
}
