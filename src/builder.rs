//! Fluent registration of activities, hook source, and terminal callback.
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::action::Action;
use crate::activity::{ActivityBody, ActivityDef, ActivityKind, Predicate, Rejoiner, Splitter, Step};
use crate::error::{PipelineError, Result};
use crate::future::BoxFuture;
use crate::hooks::{HookModuleLoader, HookSource};
use crate::nested::NestedPipeline;
use crate::pipeline::{Pipeline, PipelineId};

/// The terminal `done` callback: receives `Ok(context)` on a clean run or
/// `Err(cause)` if an activity failed, and its return value becomes the
/// final result of `run`.
pub trait Terminal<C>: Send + Sync {
    fn call(&self, outcome: Result<C>) -> BoxFuture<'static, Result<C>>;
}

impl<C, F, Fut> Terminal<C> for F
where
    C: 'static,
    F: Fn(Result<C>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<C>> + Send + 'static,
{
    fn call(&self, outcome: Result<C>) -> BoxFuture<'static, Result<C>> {
        Box::pin((self)(outcome))
    }
}

pub(crate) enum PendingHookSource {
    Direct(Arc<dyn HookSource>),
    FromFile {
        path: PathBuf,
        export_name: String,
        loader: Arc<dyn HookModuleLoader>,
    },
}

/// Accumulates [`ActivityDef`]s and configuration until [`Builder::build`]
/// freezes it into an immutable [`Pipeline`].
pub struct Builder<C> {
    tag: PipelineId,
    activities: Vec<ActivityDef<C>>,
    hook_pending: Option<PendingHookSource>,
    action: Option<Action<C>>,
    terminal: Option<Arc<dyn Terminal<C>>>,
}

impl<C> Default for Builder<C> {
    fn default() -> Self {
        Builder {
            tag: PipelineId::next(),
            activities: Vec::new(),
            hook_pending: None,
            action: None,
            terminal: None,
        }
    }
}

impl<C> Builder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&self) -> PipelineId {
        self.tag
    }

    pub fn action(&self) -> Option<&Action<C>> {
        self.action.as_ref()
    }

    pub(crate) fn hook_source_pending(&self) -> Option<&PendingHookSource> {
        self.hook_pending.as_ref()
    }

    fn check_duplicate(&self, name: &str) -> Result<()> {
        if self.activities.iter().any(|a| a.name == name) {
            tracing::warn!(activity = name, "Duplicate activity name");
            Err(PipelineError::DuplicateActivity(name.to_string()))
        } else {
            Ok(())
        }
    }

    fn push(&mut self, name: impl Into<String>, kind: ActivityKind<C>, body: Option<ActivityBody<C>>) -> Result<()> {
        let name = name.into();
        self.check_duplicate(&name)?;
        tracing::debug!(activity = %name, kind = kind.label(), "Registering activity");
        self.activities.push(ActivityDef { name, kind, body });
        Ok(())
    }

    /// `do(name, op)` -> `ONCE`.
    pub fn do_once<S>(mut self, name: impl Into<String>, op: S) -> Result<Self>
    where
        C: 'static,
        S: Step<C> + 'static,
    {
        self.push(
            name,
            ActivityKind::Once,
            Some(ActivityBody::Callable(Arc::new(op))),
        )?;
        Ok(self)
    }

    /// `do(name, WHILE, pred, op)`.
    pub fn do_while<P, S>(mut self, name: impl Into<String>, pred: P, op: S) -> Result<Self>
    where
        C: 'static,
        P: Predicate<C> + 'static,
        S: Step<C> + 'static,
    {
        self.push(
            name,
            ActivityKind::While { pred: Arc::new(pred) },
            Some(ActivityBody::Callable(Arc::new(op))),
        )?;
        Ok(self)
    }

    /// `do(name, WHILE, pred, op)` where `op` is a nested, not-yet-built pipeline.
    pub fn do_while_pipeline<P>(mut self, name: impl Into<String>, pred: P, op: Builder<C>) -> Result<Self>
    where
        C: 'static,
        P: Predicate<C> + 'static,
    {
        self.push(
            name,
            ActivityKind::While { pred: Arc::new(pred) },
            Some(ActivityBody::Nested(Arc::new(NestedPipeline::new(op)))),
        )?;
        Ok(self)
    }

    /// `do(name, UNTIL, pred, op)`.
    pub fn do_until<P, S>(mut self, name: impl Into<String>, pred: P, op: S) -> Result<Self>
    where
        C: 'static,
        P: Predicate<C> + 'static,
        S: Step<C> + 'static,
    {
        self.push(
            name,
            ActivityKind::Until { pred: Arc::new(pred) },
            Some(ActivityBody::Callable(Arc::new(op))),
        )?;
        Ok(self)
    }

    pub fn do_until_pipeline<P>(mut self, name: impl Into<String>, pred: P, op: Builder<C>) -> Result<Self>
    where
        C: 'static,
        P: Predicate<C> + 'static,
    {
        self.push(
            name,
            ActivityKind::Until { pred: Arc::new(pred) },
            Some(ActivityBody::Nested(Arc::new(NestedPipeline::new(op)))),
        )?;
        Ok(self)
    }

    /// `do(name, IF, pred, op)`.
    pub fn do_if<P, S>(mut self, name: impl Into<String>, pred: P, op: S) -> Result<Self>
    where
        C: 'static,
        P: Predicate<C> + 'static,
        S: Step<C> + 'static,
    {
        self.push(
            name,
            ActivityKind::If { pred: Arc::new(pred) },
            Some(ActivityBody::Callable(Arc::new(op))),
        )?;
        Ok(self)
    }

    pub fn do_if_pipeline<P>(mut self, name: impl Into<String>, pred: P, op: Builder<C>) -> Result<Self>
    where
        C: 'static,
        P: Predicate<C> + 'static,
    {
        self.push(
            name,
            ActivityKind::If { pred: Arc::new(pred) },
            Some(ActivityBody::Nested(Arc::new(NestedPipeline::new(op)))),
        )?;
        Ok(self)
    }

    /// `do(name, BREAK, pred)` — no body.
    pub fn do_break<P>(mut self, name: impl Into<String>, pred: P) -> Result<Self>
    where
        C: 'static,
        P: Predicate<C> + 'static,
    {
        self.push(name, ActivityKind::Break { pred: Arc::new(pred) }, None)?;
        Ok(self)
    }

    /// `do(name, CONTINUE, pred)` — no body.
    pub fn do_continue<P>(mut self, name: impl Into<String>, pred: P) -> Result<Self>
    where
        C: 'static,
        P: Predicate<C> + 'static,
    {
        self.push(name, ActivityKind::Continue { pred: Arc::new(pred) }, None)?;
        Ok(self)
    }

    /// `do(name, SPLIT, splitter, rejoiner, op)`.
    pub fn do_split<SP, RJ, S>(
        mut self,
        name: impl Into<String>,
        splitter: SP,
        rejoiner: RJ,
        op: S,
    ) -> Result<Self>
    where
        C: 'static,
        SP: Splitter<C> + 'static,
        RJ: Rejoiner<C> + 'static,
        S: Step<C> + 'static,
    {
        self.push(
            name,
            ActivityKind::Split {
                splitter: Arc::new(splitter),
                rejoiner: Arc::new(rejoiner),
            },
            Some(ActivityBody::Callable(Arc::new(op))),
        )?;
        Ok(self)
    }

    pub fn do_split_pipeline<SP, RJ>(
        mut self,
        name: impl Into<String>,
        splitter: SP,
        rejoiner: RJ,
        op: Builder<C>,
    ) -> Result<Self>
    where
        C: 'static,
        SP: Splitter<C> + 'static,
        RJ: Rejoiner<C> + 'static,
    {
        self.push(
            name,
            ActivityKind::Split {
                splitter: Arc::new(splitter),
                rejoiner: Arc::new(rejoiner),
            },
            Some(ActivityBody::Nested(Arc::new(NestedPipeline::new(op)))),
        )?;
        Ok(self)
    }

    /// Configures the hook source directly. Mutually exclusive with
    /// `with_hooks_file`; calling it a second time with the *same* `Arc` is
    /// idempotent, with a different target it errors.
    pub fn with_hooks(mut self, source: Arc<dyn HookSource>) -> Result<Self> {
        match &self.hook_pending {
            None => {
                self.hook_pending = Some(PendingHookSource::Direct(source));
                Ok(self)
            }
            Some(PendingHookSource::Direct(existing)) if Arc::ptr_eq(existing, &source) => Ok(self),
            _ => Err(PipelineError::HooksAlreadyConfigured),
        }
    }

    /// Configures the hook source to be loaded from `path` at build time via
    /// `loader`, under `export_name`.
    pub fn with_hooks_file(
        mut self,
        path: impl Into<PathBuf>,
        export_name: impl Into<String>,
        loader: Arc<dyn HookModuleLoader>,
    ) -> Result<Self> {
        let path = path.into();
        let export_name = export_name.into();
        match &self.hook_pending {
            None => {
                self.hook_pending = Some(PendingHookSource::FromFile {
                    path,
                    export_name,
                    loader,
                });
                Ok(self)
            }
            Some(PendingHookSource::FromFile {
                path: existing_path,
                export_name: existing_export,
                ..
            }) if *existing_path == path && *existing_export == export_name => Ok(self),
            _ => Err(PipelineError::HooksAlreadyConfigured),
        }
    }

    /// Sets the parent action, only if unset.
    pub fn with_action(mut self, action: Action<C>) -> Self {
        if self.action.is_none() {
            self.action = Some(action);
        }
        self
    }

    /// Registers the terminal callback; the last call wins.
    pub fn done<T: Terminal<C> + 'static>(mut self, callback: T) -> Self {
        self.terminal = Some(Arc::new(callback));
        self
    }

    /// Freezes the builder into an immutable, repeatable [`Pipeline`].
    #[tracing::instrument(skip(self), fields(pipeline = %self.tag, activity_count = self.activities.len()))]
    pub fn build(mut self) -> Result<Pipeline<C>> {
        if let Some(action) = self.action.clone() {
            action.run_setup_once(&mut self);
        }

        let hook_source = match self.hook_pending.take() {
            None => None,
            Some(PendingHookSource::Direct(source)) => Some(source),
            Some(PendingHookSource::FromFile {
                path,
                export_name,
                loader,
            }) => {
                tracing::debug!(path = %path.display(), export = %export_name, "Loading hook source from module");
                Some(loader.load(&path, &export_name)?)
            }
        };

        tracing::debug!(
            pipeline = %self.tag,
            activity_count = self.activities.len(),
            has_hooks = hook_source.is_some(),
            "Pipeline built"
        );

        Ok(Pipeline {
            id: self.tag,
            activities: self.activities,
            hook_source,
            action: self.action,
            terminal: self.terminal,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::activity::StepOutcome;
    use crate::hooks::MethodTable;

    fn once(ctx: i32, _action: Action<i32>) -> impl Future<Output = Result<StepOutcome<i32>>> {
        async move { Ok(StepOutcome::Context(ctx)) }
    }

    #[test]
    fn duplicate_activity_name_is_rejected() {
        let err = Builder::<i32>::new()
            .do_once("step", once)
            .unwrap()
            .do_once("step", once)
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateActivity(name) if name == "step"));
    }

    #[test]
    fn with_hooks_same_instance_is_idempotent() {
        let source: Arc<dyn HookSource> = Arc::new(MethodTable::new());
        let builder = Builder::<i32>::new()
            .with_hooks(source.clone())
            .unwrap()
            .with_hooks(source)
            .unwrap();
        assert!(matches!(
            builder.hook_source_pending(),
            Some(PendingHookSource::Direct(_))
        ));
    }

    #[test]
    fn with_hooks_different_instance_errors() {
        let a: Arc<dyn HookSource> = Arc::new(MethodTable::new());
        let b: Arc<dyn HookSource> = Arc::new(MethodTable::new());
        let err = Builder::<i32>::new()
            .with_hooks(a)
            .unwrap()
            .with_hooks(b)
            .unwrap_err();
        assert!(matches!(err, PipelineError::HooksAlreadyConfigured));
    }

    #[test]
    fn with_action_only_sets_once() {
        struct Marker;
        impl crate::action::ActionLifecycle<i32> for Marker {}

        let first = Action::with_lifecycle(Marker);
        let second = Action::with_lifecycle(Marker);
        let builder = Builder::<i32>::new().with_action(first).with_action(second);
        // Both actions are opaque (no equality), so assert indirectly: building
        // twice from the same builder state never panics on a "set twice" path
        // because `with_action` is a pure no-op the second time.
        let _ = builder.build().unwrap();
    }

    #[test]
    fn build_freezes_an_empty_pipeline() {
        let pipeline = Builder::<i32>::new().build().unwrap();
        assert_eq!(pipeline.activity_names().count(), 0);
    }
}

