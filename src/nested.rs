//! A nested [`Builder`] used as an activity's body.
//!
//! Built lazily, exactly once, the first time the interpreter reaches the
//! activity that owns it, then cached and reused across every loop
//! iteration or `SPLIT` sub-context that shares this activity definition.
//! The outer hook source and parent action are attached to it, but only if
//! it has none of its own, as part of that same first build.
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::action::Action;
use crate::builder::Builder;
use crate::error::Result;
use crate::hooks::HookSource;
use crate::pipeline::Pipeline;

pub struct NestedPipeline<C> {
    pending: Mutex<Option<Builder<C>>>,
    resolved: OnceCell<Arc<Pipeline<C>>>,
}

impl<C> NestedPipeline<C> {
    pub fn new(builder: Builder<C>) -> Self {
        NestedPipeline {
            pending: Mutex::new(Some(builder)),
            resolved: OnceCell::new(),
        }
    }

    /// Returns the built, shared `Pipeline`, building it on first use and
    /// idempotently attaching `outer_hooks`/`outer_action` if this builder
    /// configured none of its own.
    pub async fn resolve(
        &self,
        outer_hooks: Option<&Arc<dyn HookSource>>,
        outer_action: Option<&Action<C>>,
    ) -> Result<Arc<Pipeline<C>>>
    where
        C: Send + 'static,
    {
        let pipeline = self
            .resolved
            .get_or_try_init(|| async {
                let mut builder = {
                    let mut guard = self.pending.lock().await;
                    guard.take().expect("nested pipeline builder consumed twice")
                };

                if builder.hook_source_pending().is_none()
                    && let Some(hooks) = outer_hooks
                {
                    builder = builder.with_hooks(hooks.clone())?;
                }
                if builder.action().is_none()
                    && let Some(action) = outer_action
                {
                    builder = builder.with_action(action.clone());
                }

                let pipeline = builder.build()?;
                Ok::<_, crate::error::PipelineError>(Arc::new(pipeline))
            })
            .await?;
        Ok(pipeline.clone())
    }
}
