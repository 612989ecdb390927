use thiserror::Error;

use crate::pipeline::PipelineId;

/// Crate-wide result alias. Fallible library entry points return this rather
/// than a bare `anyhow::Result` so callers can match on [`PipelineError`]'s
/// variants instead of parsing error strings.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The full error taxonomy for the pipeline runtime.
///
/// Configuration errors (`DuplicateActivity`, `InvalidSignature`,
/// `HooksAlreadyConfigured`, `SetupNotCallable`) surface from the
/// [`crate::builder::Builder`]. Structural errors (`AmbiguousKind`,
/// `ControlFlowOutsideLoop`, `SplitIncomplete`, `UnknownBodyKind`) surface the
/// first time the interpreter encounters the offending activity. The rest are
/// runtime failures from activities, hooks, and the worker pool.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("activity '{0}' is already registered in this pipeline")]
    DuplicateActivity(String),

    #[error("invalid signature for activity '{name}': {reason}")]
    InvalidSignature { name: String, reason: String },

    #[error("a hook source is already configured for this builder")]
    HooksAlreadyConfigured,

    #[error("setup could not be invoked on the parent action: {0}")]
    SetupNotCallable(String),

    #[error("activity '{0}' declares more than one kind")]
    AmbiguousKind(String),

    #[error("'{0}' was reached outside any enclosing WHILE/UNTIL loop")]
    ControlFlowOutsideLoop(String),

    #[error("SPLIT activity '{0}' is missing its splitter or rejoiner")]
    SplitIncomplete(String),

    #[error("activity '{0}' has no recognised body")]
    UnknownBodyKind(String),

    #[error("activity '{name}' failed")]
    ActivityFailure {
        name: String,
        pipeline: PipelineId,
        #[source]
        cause: Box<PipelineError>,
    },

    #[error("hook '{0}' timed out")]
    HookTimeout(String),

    #[error("hook '{hook}' failed")]
    HookFailure {
        hook: String,
        #[source]
        cause: Box<PipelineError>,
    },

    #[error("worker pool setup failed")]
    SetupFailure(#[source] Box<PipelineError>),

    #[error("worker pool cleanup failed")]
    CleanupFailure(#[source] Box<PipelineError>),

    #[error("the terminal callback failed, aggregating {} cause(s)", .0.len())]
    TerminalFailure(Vec<PipelineError>),

    #[error(transparent)]
    User(#[from] anyhow::Error),
}

impl PipelineError {
    /// Wraps `self` as the cause of an [`PipelineError::ActivityFailure`] for `name` in `pipeline`.
    pub fn into_activity_failure(self, name: impl Into<String>, pipeline: PipelineId) -> Self {
        PipelineError::ActivityFailure {
            name: name.into(),
            pipeline,
            cause: Box::new(self),
        }
    }

    /// Combines a prior activity/hook failure with a terminal-callback failure,
    /// preserving both causes in order.
    pub fn aggregate_with_terminal(prior: Option<PipelineError>, terminal: PipelineError) -> Self {
        let mut causes = Vec::with_capacity(2);
        if let Some(prior) = prior {
            causes.push(prior);
        }
        causes.push(terminal);
        PipelineError::TerminalFailure(causes)
    }
}
