use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Identifier of the module a context element belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the enclosing module of a context element.
///
/// Returning `None` is normal (scratch files, library sources outside any
/// module) and degrades the comparator to proximity-score-only ordering.
pub trait ModuleResolver<E> {
    fn module_of(&self, element: &E) -> Option<ModuleId>;
}

/// Type-keyed scratch storage shared by weighers for the lifetime of one
/// location.
///
/// Weighers that derive expensive data from the context (say, the set of
/// imports visible at the caret) park it here once instead of recomputing it
/// per candidate. Single-threaded by design: a comparator instance is used
/// from one sort call.
#[derive(Default)]
pub struct ProcessingCache {
    slots: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl ProcessingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any>(&self) -> Option<Rc<T>> {
        let slots = self.slots.borrow();
        slots
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|slot| slot.downcast::<T>().ok())
    }

    pub fn get_or_insert_with<T: Any>(&self, init: impl FnOnce() -> T) -> Rc<T> {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }
        let value: Rc<T> = Rc::new(init());
        self.slots
            .borrow_mut()
            .insert(TypeId::of::<T>(), value.clone());
        value
    }
}

impl fmt::Debug for ProcessingCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingCache")
            .field("entries", &self.slots.borrow().len())
            .finish()
    }
}

/// The bundle weighers and serializers are keyed by: the context element, its
/// enclosing module (when resolvable), and a shared scratch cache.
pub struct ProximityLocation<E> {
    context: E,
    module: Option<ModuleId>,
    cache: ProcessingCache,
}

impl<E> ProximityLocation<E> {
    pub fn new(context: E, module: Option<ModuleId>) -> Self {
        Self {
            context,
            module,
            cache: ProcessingCache::new(),
        }
    }

    /// Builds a location by resolving the context's module through `resolver`.
    pub fn resolve(context: E, resolver: &dyn ModuleResolver<E>) -> Self {
        let module = resolver.module_of(&context);
        Self::new(context, module)
    }

    pub fn context(&self) -> &E {
        &self.context
    }

    pub fn module(&self) -> Option<&ModuleId> {
        self.module.as_ref()
    }

    pub fn cache(&self) -> &ProcessingCache {
        &self.cache
    }
}

impl<E: fmt::Debug> fmt::Debug for ProximityLocation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProximityLocation")
            .field("context", &self.context)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}
