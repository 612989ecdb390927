//! The opaque "parent action" a [`crate::builder::Builder`] may carry.
//!
//! Every body, predicate, splitter, and rejoiner receives this value
//! alongside the context, so user code has somewhere to stash its own state
//! across a run. `Action<C>` is a `TypeId`-keyed map of `Arc<dyn Any + Send +
//! Sync>` behind a small typed accessor API, cloned cheaply (it's an `Arc`
//! around a `RwLock`, plus an `Arc<AtomicBool>` one-time tag) and handed to
//! every callable. Unlike the teacher's own `extensions::Extensions` (a
//! plain, owned `HashMap` that its caller clones whole), `Action` is shared
//! and cloned routinely once attached to activities and hooks — every
//! per-activity `action.clone()` in `src/interpreter.rs` produces a handle
//! to the *same* underlying map — so the map sits behind a `RwLock` rather
//! than a bare `Arc` a caller must hold sole ownership of to mutate.
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::builder::Builder;

/// Implemented by a user's own action type to receive a one-time `setup`
/// callback when the [`Builder`] that carries it is built.
pub trait ActionLifecycle<C>: Send + Sync {
    fn setup(&self, builder: &mut Builder<C>) {
        let _ = builder;
    }
}

/// Blanket no-op so `Action::new()` (no lifecycle object) is the common case.
struct NoLifecycle;
impl<C> ActionLifecycle<C> for NoLifecycle {}

/// The opaque parent action. Cheap to clone: internally it is two `Arc`s and
/// an `Arc<AtomicBool>` one-time tag. Configuring extensions (`with_extension`)
/// after a clone has already been taken — e.g. attaching one to a nested
/// activity before finishing setup on the original — is valid and never
/// panics; every clone writes through to the same shared map.
pub struct Action<C> {
    lifecycle: Arc<dyn ActionLifecycle<C>>,
    extensions: Arc<RwLock<ExtensionMap>>,
    built: Arc<AtomicBool>,
}

impl<C> Clone for Action<C> {
    fn clone(&self) -> Self {
        Action {
            lifecycle: self.lifecycle.clone(),
            extensions: self.extensions.clone(),
            built: self.built.clone(),
        }
    }
}

impl<C> Default for Action<C> {
    fn default() -> Self {
        Action {
            lifecycle: Arc::new(NoLifecycle),
            extensions: Arc::new(RwLock::new(ExtensionMap::default())),
            built: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<C> Action<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a user lifecycle object as the parent action.
    pub fn with_lifecycle<T: ActionLifecycle<C> + 'static>(lifecycle: T) -> Self {
        Action {
            lifecycle: Arc::new(lifecycle),
            extensions: Arc::new(RwLock::new(ExtensionMap::default())),
            built: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Inserts `value` into the shared extension map, visible to this
    /// `Action` and every existing or future clone of it.
    pub fn with_extension<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.extensions
            .write()
            .expect("extension map lock poisoned")
            .insert(value);
        self
    }

    /// Returns a clone of the registered `T`, if any.
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.extensions.read().expect("extension map lock poisoned").get()
    }

    /// Runs `setup(builder)` exactly once across however many times this
    /// `Action` (and its clones) are attached to a builder being built; any
    /// later attempt is a no-op.
    pub(crate) fn run_setup_once(&self, builder: &mut Builder<C>) {
        if self
            .built
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.lifecycle.setup(builder);
        }
    }
}

#[derive(Default)]
struct ExtensionMap {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ExtensionMap {
    fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.map.get(&TypeId::of::<T>())?.downcast_ref::<T>().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    struct Foo(i32);

    #[derive(Clone, PartialEq, Debug)]
    struct Bar(&'static str);

    #[test]
    fn configuring_an_extension_after_a_clone_does_not_panic() {
        let a = Action::<()>::new().with_extension(Foo(1));
        let b = a.clone();
        // `b` still shares the underlying map with `a`; writing through it
        // after the clone must not panic.
        let b = b.with_extension(Bar("x"));
        assert_eq!(a.get::<Foo>(), Some(Foo(1)));
        assert_eq!(b.get::<Bar>(), Some(Bar("x")));
        // the write through `b` is visible from `a` too, since both share
        // the same extension map.
        assert_eq!(a.get::<Bar>(), Some(Bar("x")));
    }

    #[test]
    fn missing_extension_is_none() {
        let action = Action::<()>::new();
        assert_eq!(action.get::<Foo>(), None);
    }
}
