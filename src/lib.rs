mod action;
mod activity;
mod builder;
mod error;
mod future;
mod hooks;
mod interpreter;
mod nested;
mod pipeline;
mod pool;
mod settlement;

// Library exports
pub mod prelude {
    // Core types
    pub use crate::action::{Action, ActionLifecycle};
    pub use crate::activity::{
        ActivityBody, ActivityDef, ActivityKind, Predicate, Rejoiner, Splitter, Step, StepOutcome,
    };
    pub use crate::builder::{Builder, Terminal};
    pub use crate::pipeline::{Pipeline, PipelineId};

    // Interpreter / worker pool
    pub use crate::interpreter::Interpreter;
    pub use crate::pool::{WorkerPool, DEFAULT_CONCURRENCY};

    // Hooks
    pub use crate::hooks::{
        camel_case, mangle, HookDispatcher, HookEvent, HookModuleLoader, HookOutcome, HookSource,
        MethodTable,
    };

    // Settlement
    pub use crate::settlement::Settlement;

    // Errors
    pub use crate::error::{PipelineError, Result};
}

// Internal imports for use within the crate
#[allow(unused_imports)]
pub(crate) mod imports {
    pub use crate::action::Action;
    pub use crate::activity::{ActivityBody, ActivityDef, ActivityKind, StepOutcome};
    pub use crate::builder::Builder;
    pub use crate::error::{PipelineError, Result};
    pub use crate::future::BoxFuture;
    pub use crate::hooks::{HookDispatcher, HookEvent, HookSource};
    pub use crate::pipeline::{Pipeline, PipelineId};
    pub use crate::settlement::Settlement;

    pub use std::sync::Arc;

    #[cfg(test)]
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    }
}
