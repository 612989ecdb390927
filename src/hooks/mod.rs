//! Name-mangled hook dispatch.
//!
//! A hook source is a user object that may define any subset of `setup`,
//! `cleanup`, and `{event}${camelName}` methods. Rust has no runtime method
//! lookup by computed string, so the lookup is realised as a small table
//! built once per hook source, mapping mangled activity names to callables;
//! unknown names yield a no-op. [`MethodTable`] is the ergonomic on-ramp for
//! building that table without hand-rolling [`HookSource::call`] dispatch.
mod dispatcher;
mod loader;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::future::BoxFuture;

pub use dispatcher::HookDispatcher;
pub use loader::HookModuleLoader;

/// Which side of an activity's body a hook call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Before,
    After,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Before => "before",
            HookEvent::After => "after",
        }
    }
}

/// Whether a hook call found and ran a matching method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Invoked,
    NotFound,
}

/// A user-supplied object exposing `setup`, `cleanup`, and per-activity
/// `before$X`/`after$X` methods, looked up by mangled name.
///
/// `setup`/`cleanup` are special names, invoked once at pool boundaries by
/// [`crate::pool::WorkerPool`], not per activity.
#[async_trait::async_trait]
pub trait HookSource: Send + Sync {
    async fn setup(&self, _item_count: usize) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    /// Invokes the method mangled from `event`/`activity_name`, if one
    /// exists, with `ctx` as its argument. Returns `NotFound` rather than an
    /// error when no such method is defined.
    async fn call(&self, event: HookEvent, activity_name: &str, ctx: &dyn Any) -> Result<HookOutcome>;
}

/// Lower-cases `name`, splits on whitespace, strips non-word characters from
/// each word, and camel-cases the result.
pub fn camel_case(name: &str) -> String {
    let lower = name.to_lowercase();
    let words: Vec<String> = lower
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect::<String>())
        .filter(|w| !w.is_empty())
        .collect();

    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(word);
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

/// Builds the mangled hook method name `"{event}${camelName}"`.
pub fn mangle(event: HookEvent, activity_name: &str) -> String {
    format!("{}${}", event.as_str(), camel_case(activity_name))
}

type BoxHookFn = Arc<dyn Fn(&dyn Any) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A [`HookSource`] built from a plain lookup table rather than hand-rolled
/// `call` dispatch — lets callers register hooks as plain closures, keyed by
/// mangled name, without writing their own `HookSource::call` match arm.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, BoxHookFn>,
    setup: Option<Arc<dyn Fn(usize) -> BoxFuture<'static, Result<()>> + Send + Sync>>,
    cleanup: Option<Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook for `event`/`activity_name`, keyed by its mangled
    /// name so lookup at call time is a single hash-map hit.
    pub fn on<C, F, Fut>(mut self, event: HookEvent, activity_name: &str, f: F) -> Self
    where
        C: 'static,
        F: Fn(&C) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let key = mangle(event, activity_name);
        let boxed: BoxHookFn = Arc::new(move |ctx: &dyn Any| {
            let ctx = ctx.downcast_ref::<C>().expect("hook context type mismatch");
            Box::pin(f(ctx))
        });
        self.methods.insert(key, boxed);
        self
    }

    pub fn on_setup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(usize) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.setup = Some(Arc::new(move |n| Box::pin(f(n))));
        self
    }

    pub fn on_cleanup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.cleanup = Some(Arc::new(move || Box::pin(f())));
        self
    }
}

#[async_trait::async_trait]
impl HookSource for MethodTable {
    async fn setup(&self, item_count: usize) -> Result<()> {
        match &self.setup {
            Some(f) => f(item_count).await,
            None => Ok(()),
        }
    }

    async fn cleanup(&self) -> Result<()> {
        match &self.cleanup {
            Some(f) => f().await,
            None => Ok(()),
        }
    }

    async fn call(&self, event: HookEvent, activity_name: &str, ctx: &dyn Any) -> Result<HookOutcome> {
        let key = mangle(event, activity_name);
        match self.methods.get(&key) {
            Some(f) => {
                f(ctx).await?;
                Ok(HookOutcome::Invoked)
            }
            None => Ok(HookOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangles_single_word_lowercase() {
        assert_eq!(mangle(HookEvent::Before, "validate"), "before$validate");
    }

    #[test]
    fn mangles_multi_word_to_camel_case() {
        assert_eq!(mangle(HookEvent::After, "fetch user profile"), "after$fetchUserProfile");
    }

    #[test]
    fn strips_non_word_characters_per_word() {
        assert_eq!(mangle(HookEvent::Before, "load-items!! now"), "before$loaditemsNow");
    }

    #[test]
    fn collapses_repeated_whitespace() {
        assert_eq!(mangle(HookEvent::After, "  step   one  "), "after$stepOne");
    }

    #[tokio::test]
    async fn method_table_reports_not_found_for_unregistered_hook() {
        let table = MethodTable::new();
        let outcome = table.call(HookEvent::Before, "anything", &42i32).await.unwrap();
        assert_eq!(outcome, HookOutcome::NotFound);
    }

    #[tokio::test]
    async fn method_table_invokes_registered_hook_by_mangled_name() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let called = Arc::new(AtomicBool::new(false));
        let called_in_hook = called.clone();
        let table = MethodTable::new().on(HookEvent::Before, "do thing", move |ctx: &i32| {
            let called = called_in_hook.clone();
            let ctx = *ctx;
            async move {
                assert_eq!(ctx, 7);
                called.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        let outcome = table.call(HookEvent::Before, "do thing", &7i32).await.unwrap();
        assert_eq!(outcome, HookOutcome::Invoked);
        assert!(called.load(Ordering::SeqCst));
    }
}
