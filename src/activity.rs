//! Declarative description of a single pipeline step: its name, kind, and
//! the callables that drive it.
use std::future::Future;
use std::sync::Arc;

use crate::action::Action;
use crate::builder::Builder;
use crate::error::Result;
use crate::future::BoxFuture;
use crate::settlement::Settlement;

/// What an activity's body (or the predicate passed to a loop/conditional
/// kind) should do to the context next.
pub enum StepOutcome<C> {
    /// Replace the current context with this one.
    Context(C),
    /// Retain whatever context was current before this step ran.
    Unchanged,
    /// The body was itself a nested pipeline definition; build and run it
    /// recursively on the current context.
    Nested(Builder<C>),
}

impl<C> From<C> for StepOutcome<C> {
    fn from(ctx: C) -> Self {
        StepOutcome::Context(ctx)
    }
}

/// A single step's body, or a loop/conditional's action. Implemented for any
/// `Fn(C, Action<C>) -> impl Future<Output = Result<StepOutcome<C>>>`, so
/// ordinary async closures work directly without naming this trait.
pub trait Step<C>: Send + Sync {
    fn call(&self, ctx: C, action: Action<C>) -> BoxFuture<'static, Result<StepOutcome<C>>>;
}

impl<C, F, Fut> Step<C> for F
where
    C: 'static,
    F: Fn(C, Action<C>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutcome<C>>> + Send + 'static,
{
    fn call(&self, ctx: C, action: Action<C>) -> BoxFuture<'static, Result<StepOutcome<C>>> {
        Box::pin((self)(ctx, action))
    }
}

/// A `WHILE`/`UNTIL`/`IF`/`BREAK`/`CONTINUE` predicate. Implemented for any
/// `Fn(C, Action<C>) -> impl Future<Output = Result<bool>>`.
pub trait Predicate<C>: Send + Sync {
    fn test(&self, ctx: C, action: Action<C>) -> BoxFuture<'static, Result<bool>>;
}

impl<C, F, Fut> Predicate<C> for F
where
    C: 'static,
    F: Fn(C, Action<C>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    fn test(&self, ctx: C, action: Action<C>) -> BoxFuture<'static, Result<bool>> {
        Box::pin((self)(ctx, action))
    }
}

/// A `SPLIT` splitter: expands one context into an ordered list of
/// sub-contexts.
pub trait Splitter<C>: Send + Sync {
    fn split(&self, ctx: C, action: Action<C>) -> BoxFuture<'static, Result<Vec<C>>>;
}

impl<C, F, Fut> Splitter<C> for F
where
    C: 'static,
    F: Fn(C, Action<C>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<C>>> + Send + 'static,
{
    fn split(&self, ctx: C, action: Action<C>) -> BoxFuture<'static, Result<Vec<C>>> {
        Box::pin((self)(ctx, action))
    }
}

/// A `SPLIT` rejoiner: folds the settled per-sub-context results back into a
/// replacement context for the original.
pub trait Rejoiner<C>: Send + Sync {
    fn rejoin(
        &self,
        original: C,
        settled: Vec<Settlement<C>>,
        action: Action<C>,
    ) -> BoxFuture<'static, Result<C>>;
}

impl<C, F, Fut> Rejoiner<C> for F
where
    C: 'static,
    F: Fn(C, Vec<Settlement<C>>, Action<C>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<C>> + Send + 'static,
{
    fn rejoin(
        &self,
        original: C,
        settled: Vec<Settlement<C>>,
        action: Action<C>,
    ) -> BoxFuture<'static, Result<C>> {
        Box::pin((self)(original, settled, action))
    }
}

/// The body of an activity whose kind carries one: either a user callable or
/// a nested [`Builder`].
pub enum ActivityBody<C> {
    Callable(Arc<dyn Step<C>>),
    Nested(Arc<crate::nested::NestedPipeline<C>>),
}

/// Exactly one kind per activity. Each variant carries precisely the
/// callbacks that kind requires, so an activity can never end up with the
/// wrong combination of predicate/splitter/rejoiner for its kind.
pub enum ActivityKind<C> {
    Once,
    While {
        pred: Arc<dyn Predicate<C>>,
    },
    Until {
        pred: Arc<dyn Predicate<C>>,
    },
    If {
        pred: Arc<dyn Predicate<C>>,
    },
    Split {
        splitter: Arc<dyn Splitter<C>>,
        rejoiner: Arc<dyn Rejoiner<C>>,
    },
    Break {
        pred: Arc<dyn Predicate<C>>,
    },
    Continue {
        pred: Arc<dyn Predicate<C>>,
    },
}

impl<C> ActivityKind<C> {
    pub fn label(&self) -> &'static str {
        match self {
            ActivityKind::Once => "ONCE",
            ActivityKind::While { .. } => "WHILE",
            ActivityKind::Until { .. } => "UNTIL",
            ActivityKind::If { .. } => "IF",
            ActivityKind::Split { .. } => "SPLIT",
            ActivityKind::Break { .. } => "BREAK",
            ActivityKind::Continue { .. } => "CONTINUE",
        }
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, ActivityKind::While { .. } | ActivityKind::Until { .. })
    }

    pub fn is_control_flow(&self) -> bool {
        matches!(self, ActivityKind::Break { .. } | ActivityKind::Continue { .. })
    }
}

/// One named, kinded step in a [`crate::pipeline::Pipeline`].
pub struct ActivityDef<C> {
    pub name: String,
    pub kind: ActivityKind<C>,
    pub body: Option<ActivityBody<C>>,
}
