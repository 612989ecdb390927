use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PipelineError, Result};

use super::{mangle, HookEvent, HookOutcome, HookSource};

/// Default wall-clock timeout for a single hook invocation.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Invokes a [`HookSource`]'s mangled methods, racing each call against a
/// bounded timeout. Exposes the underlying hook source so callers (the
/// worker pool) can schedule `setup`/`cleanup` at pipeline boundaries.
#[derive(Clone)]
pub struct HookDispatcher {
    source: Option<Arc<dyn HookSource>>,
    timeout: Duration,
}

impl HookDispatcher {
    pub fn new(source: Option<Arc<dyn HookSource>>) -> Self {
        HookDispatcher {
            source,
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    pub fn with_timeout(source: Option<Arc<dyn HookSource>>, timeout: Duration) -> Self {
        HookDispatcher { source, timeout }
    }

    pub fn source(&self) -> Option<&Arc<dyn HookSource>> {
        self.source.as_ref()
    }

    /// Calls `{event}${activityName}` with `ctx`, bounded by the configured
    /// timeout. A no-op if no hook source is configured or the mangled
    /// method is absent. If the timeout fires first, fails with
    /// `HookTimeout`; the in-flight call is not cancelled, only its result
    /// is discarded.
    pub async fn call(&self, event: HookEvent, activity_name: &str, ctx: &dyn Any) -> Result<()> {
        let Some(source) = &self.source else {
            return Ok(());
        };

        let mangled = mangle(event, activity_name);
        let call = source.call(event, activity_name, ctx);

        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| {
                tracing::warn!(hook = %mangled, error = %e, "Hook call failed");
                PipelineError::HookFailure {
                    hook: mangled.clone(),
                    cause: Box::new(e),
                }
            })?,
            Err(_elapsed) => {
                tracing::warn!(hook = %mangled, timeout_ms = self.timeout.as_millis(), "Hook call timed out");
                return Err(PipelineError::HookTimeout(mangled));
            }
        };

        match outcome {
            HookOutcome::Invoked => {
                tracing::debug!(hook = %mangled, "Hook invoked");
                Ok(())
            }
            HookOutcome::NotFound => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::MethodTable;

    #[tokio::test]
    async fn no_hook_source_is_a_no_op() {
        let dispatcher = HookDispatcher::new(None);
        dispatcher.call(HookEvent::Before, "anything", &1i32).await.unwrap();
    }

    #[tokio::test]
    async fn missing_method_is_a_no_op() {
        let source: Arc<dyn HookSource> = Arc::new(MethodTable::new());
        let dispatcher = HookDispatcher::new(Some(source));
        dispatcher.call(HookEvent::After, "untouched", &1i32).await.unwrap();
    }

    #[tokio::test]
    async fn slow_hook_fails_with_timeout() {
        let table = MethodTable::new().on(HookEvent::Before, "slow", |_ctx: &i32| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        });
        let dispatcher =
            HookDispatcher::with_timeout(Some(Arc::new(table)), Duration::from_millis(5));

        let err = dispatcher
            .call(HookEvent::Before, "slow", &1i32)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::HookTimeout(hook) if hook == "before$slow"));
    }
}
