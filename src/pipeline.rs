//! The immutable, repeatable [`Pipeline`] value produced by
//! [`crate::builder::Builder::build`].
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::action::Action;
use crate::activity::ActivityDef;
use crate::hooks::HookSource;

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

/// A stable, process-local identifier for a built pipeline. Used to key
/// `loop.break`/`loop.continue` signals to the loop that owns them and to
/// tag `ActivityFailure`s with their origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(u64);

impl PipelineId {
    pub(crate) fn next() -> Self {
        PipelineId(NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pipeline#{}", self.0)
    }
}

/// An insertion-ordered, immutable list of [`ActivityDef`]s plus optional
/// hook source, terminal callback, and parent action. Produced once by
/// [`crate::builder::Builder::build`] and safe to run any number of times,
/// concurrently, since each run creates its own transient state.
pub struct Pipeline<C> {
    pub(crate) id: PipelineId,
    pub(crate) activities: Vec<ActivityDef<C>>,
    pub(crate) hook_source: Option<Arc<dyn HookSource>>,
    pub(crate) action: Option<Action<C>>,
    pub(crate) terminal: Option<Arc<dyn crate::builder::Terminal<C>>>,
}

impl<C> Pipeline<C> {
    pub fn tag(&self) -> PipelineId {
        self.id
    }

    pub fn activity_names(&self) -> impl Iterator<Item = &str> {
        self.activities.iter().map(|a| a.name.as_str())
    }

    pub fn hook_source(&self) -> Option<&Arc<dyn HookSource>> {
        self.hook_source.as_ref()
    }

    pub fn action(&self) -> Option<&Action<C>> {
        self.action.as_ref()
    }
}
