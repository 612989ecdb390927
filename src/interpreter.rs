//! Walks a built [`Pipeline`], advancing its context through each
//! [`ActivityDef`] in order and driving the loop, branch, and split
//! control-flow.
//!
//! `BREAK`/`CONTINUE` are threaded back up the recursive `run_pipeline` call
//! chain as a plain return value. Every nested body runs as a direct
//! recursive call on the same task (never an independently scheduled one,
//! except inside `SPLIT`, which always starts its sub-runs fresh and so
//! never observes an outer loop's break), so the call stack alone gives each
//! loop exclusive ownership of the signal raised inside its own body.
use std::sync::Arc;

use futures::future::join_all;

use crate::action::Action;
use crate::activity::{ActivityBody, ActivityKind, StepOutcome, Step};
use crate::builder::Builder;
use crate::error::{PipelineError, Result};
use crate::hooks::{HookDispatcher, HookEvent, HookSource};
use crate::pipeline::{Pipeline, PipelineId};
use crate::pool::{WorkerPool, DEFAULT_CONCURRENCY};
use crate::settlement::Settlement;

/// Whether `BREAK`/`CONTINUE` are legal at this recursion depth, and if so,
/// which loop they target.
#[derive(Clone, Copy)]
enum Nesting {
    /// A genuine top-level run: a terminal callback (if any) fires here, and
    /// `BREAK`/`CONTINUE` are illegal.
    TopLevel,
    /// Running as somebody else's body. `break_target` is `Some` only when
    /// the immediate parent is a `WHILE`/`UNTIL` loop; `IF`/`ONCE` pass their
    /// own nesting through unchanged so a `BREAK` several bodies deep still
    /// reaches the loop that owns it.
    Nested { break_target: Option<PipelineId> },
}

impl Nesting {
    fn break_target(self) -> Option<PipelineId> {
        match self {
            Nesting::TopLevel => None,
            Nesting::Nested { break_target } => break_target,
        }
    }
}

/// What interrupted a normal walk through an activity list.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Signal {
    Break,
    Continue,
}

/// Entry point: runs a whole [`Pipeline`] to completion on one seed context,
/// including its terminal callback.
pub struct Interpreter<C> {
    _marker: std::marker::PhantomData<C>,
}

impl<C> Interpreter<C>
where
    C: Clone + Send + 'static,
{
    /// Runs `pipeline` on `seed`, end to end, once. `setup`/`cleanup` wiring
    /// is the worker pool's job, not this one's — a bare call just runs a
    /// single context through the activity list and terminal.
    #[tracing::instrument(skip(pipeline, seed), fields(pipeline = %pipeline.id, activity_count = pipeline.activities.len()))]
    pub async fn run(pipeline: &Pipeline<C>, seed: C) -> Result<C> {
        tracing::debug!(pipeline = %pipeline.id, "Starting pipeline run");
        let outcome = run_pipeline(pipeline, seed, Nesting::TopLevel)
            .await
            .map(|(ctx, _signal)| ctx);

        if let Err(e) = &outcome {
            tracing::warn!(pipeline = %pipeline.id, error = %e, "Pipeline run failed");
        }

        let Some(terminal) = &pipeline.terminal else {
            return outcome;
        };

        let (terminal_input, prior_error) = match outcome {
            Ok(ctx) => (Ok(ctx), None),
            Err(e) => {
                let redisplayed = PipelineError::User(anyhow::anyhow!("{e}"));
                (Err(redisplayed), Some(e))
            }
        };

        tracing::debug!(pipeline = %pipeline.id, "Invoking terminal callback");
        match terminal.call(terminal_input).await {
            Ok(final_ctx) => Ok(final_ctx),
            Err(terminal_err) => {
                tracing::warn!(pipeline = %pipeline.id, error = %terminal_err, "Terminal callback failed");
                Err(PipelineError::aggregate_with_terminal(prior_error, terminal_err))
            }
        }
    }
}

/// Walks `pipeline`'s activities in order, returning the resulting context
/// and, if a `BREAK`/`CONTINUE` interrupted the walk, which one.
async fn run_pipeline<C>(pipeline: &Pipeline<C>, seed: C, nesting: Nesting) -> Result<(C, Option<Signal>)>
where
    C: Clone + Send + 'static,
{
    let dispatcher = HookDispatcher::new(pipeline.hook_source.clone());
    let action = pipeline.action.clone().unwrap_or_default();
    let mut ctx = seed;

    for activity in &pipeline.activities {
        match &activity.kind {
            ActivityKind::Break { pred } => {
                if nesting.break_target().is_none() {
                    return Err(PipelineError::ControlFlowOutsideLoop(activity.name.clone()));
                }
                let truth = pred
                    .test(ctx.clone(), action.clone())
                    .await
                    .map_err(|e| e.into_activity_failure(&activity.name, pipeline.id))?;
                if truth {
                    tracing::debug!(activity = %activity.name, pipeline = %pipeline.id, "BREAK fired");
                    return Ok((ctx, Some(Signal::Break)));
                }
            }
            ActivityKind::Continue { pred } => {
                if nesting.break_target().is_none() {
                    return Err(PipelineError::ControlFlowOutsideLoop(activity.name.clone()));
                }
                let truth = pred
                    .test(ctx.clone(), action.clone())
                    .await
                    .map_err(|e| e.into_activity_failure(&activity.name, pipeline.id))?;
                if truth {
                    tracing::debug!(activity = %activity.name, pipeline = %pipeline.id, "CONTINUE fired");
                    return Ok((ctx, Some(Signal::Continue)));
                }
            }
            ActivityKind::If { pred } => {
                let truth = pred
                    .test(ctx.clone(), action.clone())
                    .await
                    .map_err(|e| e.into_activity_failure(&activity.name, pipeline.id))?;
                if truth {
                    let body = activity
                        .body
                        .as_ref()
                        .ok_or_else(|| PipelineError::UnknownBodyKind(activity.name.clone()))?;
                    let (new_ctx, signal) = run_body(
                        pipeline,
                        &activity.name,
                        body,
                        ctx,
                        nesting,
                        &dispatcher,
                        &action,
                    )
                    .await?;
                    ctx = new_ctx;
                    if let Some(signal) = signal {
                        return Ok((ctx, Some(signal)));
                    }
                }
            }
            ActivityKind::While { pred } => {
                let body = activity
                    .body
                    .as_ref()
                    .ok_or_else(|| PipelineError::UnknownBodyKind(activity.name.clone()))?;
                loop {
                    let truth = pred
                        .test(ctx.clone(), action.clone())
                        .await
                        .map_err(|e| e.into_activity_failure(&activity.name, pipeline.id))?;
                    if !truth {
                        break;
                    }
                    let loop_nesting = Nesting::Nested {
                        break_target: Some(pipeline.id),
                    };
                    let (new_ctx, signal) = run_body(
                        pipeline,
                        &activity.name,
                        body,
                        ctx,
                        loop_nesting,
                        &dispatcher,
                        &action,
                    )
                    .await?;
                    ctx = new_ctx;
                    if signal == Some(Signal::Break) {
                        break;
                    }
                }
            }
            ActivityKind::Until { pred } => {
                let body = activity
                    .body
                    .as_ref()
                    .ok_or_else(|| PipelineError::UnknownBodyKind(activity.name.clone()))?;
                loop {
                    let loop_nesting = Nesting::Nested {
                        break_target: Some(pipeline.id),
                    };
                    let (new_ctx, signal) = run_body(
                        pipeline,
                        &activity.name,
                        body,
                        ctx,
                        loop_nesting,
                        &dispatcher,
                        &action,
                    )
                    .await?;
                    ctx = new_ctx;
                    if signal == Some(Signal::Break) {
                        break;
                    }
                    let truth = pred
                        .test(ctx.clone(), action.clone())
                        .await
                        .map_err(|e| e.into_activity_failure(&activity.name, pipeline.id))?;
                    if truth {
                        break;
                    }
                }
            }
            ActivityKind::Split { splitter, rejoiner } => {
                let body = activity
                    .body
                    .as_ref()
                    .ok_or_else(|| PipelineError::SplitIncomplete(activity.name.clone()))?;

                dispatcher
                    .call(HookEvent::Before, &activity.name, &ctx)
                    .await
                    .map_err(|e| e.into_activity_failure(&activity.name, pipeline.id))?;

                let subs = splitter
                    .split(ctx.clone(), action.clone())
                    .await
                    .map_err(|e| e.into_activity_failure(&activity.name, pipeline.id))?;
                tracing::debug!(activity = %activity.name, pipeline = %pipeline.id, sub_count = subs.len(), "SPLIT fanning out");
                let settled = run_split_body(&activity.name, pipeline.id, body, subs, &action, &dispatcher).await?;
                tracing::debug!(
                    activity = %activity.name,
                    pipeline = %pipeline.id,
                    fulfilled = settled.iter().filter(|s| s.is_fulfilled()).count(),
                    rejected = settled.iter().filter(|s| !s.is_fulfilled()).count(),
                    "SPLIT settled, rejoining"
                );
                let new_ctx = rejoiner
                    .rejoin(ctx, settled, action.clone())
                    .await
                    .map_err(|e| e.into_activity_failure(&activity.name, pipeline.id))?;

                dispatcher
                    .call(HookEvent::After, &activity.name, &new_ctx)
                    .await
                    .map_err(|e| e.into_activity_failure(&activity.name, pipeline.id))?;

                ctx = new_ctx;
            }
            ActivityKind::Once => {
                let body = activity
                    .body
                    .as_ref()
                    .ok_or_else(|| PipelineError::UnknownBodyKind(activity.name.clone()))?;
                let (new_ctx, signal) = run_body(
                    pipeline,
                    &activity.name,
                    body,
                    ctx,
                    nesting,
                    &dispatcher,
                    &action,
                )
                .await?;
                ctx = new_ctx;
                if let Some(signal) = signal {
                    return Ok((ctx, Some(signal)));
                }
            }
        }
    }

    Ok((ctx, None))
}

/// Dispatches `before$name`/`after$name` around a single activity's body,
/// then runs that body (a user callable or a nested pipeline), following
/// through any dynamically-returned nested pipeline.
async fn run_body<C>(
    owner: &Pipeline<C>,
    activity_name: &str,
    body: &ActivityBody<C>,
    ctx: C,
    nesting: Nesting,
    dispatcher: &HookDispatcher,
    action: &Action<C>,
) -> Result<(C, Option<Signal>)>
where
    C: Clone + Send + 'static,
{
    dispatcher
        .call(HookEvent::Before, activity_name, &ctx)
        .await
        .map_err(|e| e.into_activity_failure(activity_name, owner.id))?;

    let (new_ctx, signal) = match body {
        ActivityBody::Callable(step) => run_step(step, ctx, action, dispatcher, nesting)
            .await
            .map_err(|e| e.into_activity_failure(activity_name, owner.id))?,
        ActivityBody::Nested(nested) => {
            let pipeline = nested
                .resolve(dispatcher.source(), Some(action))
                .await
                .map_err(|e| e.into_activity_failure(activity_name, owner.id))?;
            run_pipeline(&pipeline, ctx, nesting)
                .await
                .map_err(|e| e.into_activity_failure(activity_name, owner.id))?
        }
    };

    dispatcher
        .call(HookEvent::After, activity_name, &new_ctx)
        .await
        .map_err(|e| e.into_activity_failure(activity_name, owner.id))?;

    Ok((new_ctx, signal))
}

/// Invokes a `Step` body once and folds its [`StepOutcome`], following a
/// dynamically-returned nested pipeline recursively.
async fn run_step<C>(
    step: &Arc<dyn Step<C>>,
    ctx: C,
    action: &Action<C>,
    dispatcher: &HookDispatcher,
    nesting: Nesting,
) -> Result<(C, Option<Signal>)>
where
    C: Clone + Send + 'static,
{
    let outcome = step.call(ctx.clone(), action.clone()).await?;
    match outcome {
        StepOutcome::Context(new_ctx) => Ok((new_ctx, None)),
        StepOutcome::Unchanged => Ok((ctx, None)),
        StepOutcome::Nested(builder) => {
            let pipeline = attach_and_build(builder, dispatcher.source(), Some(action))?;
            run_pipeline(&pipeline, ctx, nesting).await
        }
    }
}

/// Attaches the outer hook source/action to a freshly-returned nested
/// builder only if it configured none of its own, then builds it
/// immediately — the one-shot counterpart of [`crate::nested::NestedPipeline`]
/// for dynamically-returned bodies, which have no stable identity to cache
/// against.
fn attach_and_build<C>(
    mut builder: Builder<C>,
    outer_hooks: Option<&Arc<dyn HookSource>>,
    outer_action: Option<&Action<C>>,
) -> Result<Pipeline<C>>
where
    C: 'static,
{
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
    builder.build()
}

/// Runs `body` once per sub-context produced by a `SPLIT`'s splitter,
/// returning settlement records in splitter order. A callable body fans out
/// as ordinary concurrent futures; a nested-pipeline body fans out through a
/// [`WorkerPool`] so its declared concurrency bound is honoured, with
/// lifecycle hooks skipped since they belong to the enclosing run.
async fn run_split_body<C>(
    activity_name: &str,
    owner_id: PipelineId,
    body: &ActivityBody<C>,
    subs: Vec<C>,
    action: &Action<C>,
    dispatcher: &HookDispatcher,
) -> Result<Vec<Settlement<C>>>
where
    C: Clone + Send + 'static,
{
    match body {
        ActivityBody::Callable(step) => {
            let futures = subs.into_iter().map(|sub| {
                let step = step.clone();
                let action = action.clone();
                let dispatcher = dispatcher.clone();
                async move {
                    match run_step(&step, sub, &action, &dispatcher, Nesting::TopLevel).await {
                        Ok((ctx, _signal)) => Settlement::Fulfilled(ctx),
                        Err(e) => Settlement::Rejected(e.into_activity_failure(activity_name, owner_id)),
                    }
                }
            });
            Ok(join_all(futures).await)
        }
        ActivityBody::Nested(nested) => {
            let pipeline = nested
                .resolve(dispatcher.source(), Some(action))
                .await
                .map_err(|e| e.into_activity_failure(activity_name, owner_id))?;
            WorkerPool::pipe_for_split(pipeline, subs, DEFAULT_CONCURRENCY).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn step(delta: i32) -> impl Fn(i32, Action<i32>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<StepOutcome<i32>>> + Send>> + Clone {
        move |ctx, _action| Box::pin(async move { Ok(StepOutcome::Context(ctx + delta)) })
    }

    #[tokio::test]
    async fn break_outside_a_loop_is_a_fatal_error() {
        let pipeline = Builder::<i32>::new()
            .do_break("brk", |ctx: i32, _action: Action<i32>| async move { Ok(ctx > 0) })
            .unwrap()
            .build()
            .unwrap();

        let err = Interpreter::run(&pipeline, 1).await.unwrap_err();
        assert!(matches!(err, PipelineError::ControlFlowOutsideLoop(name) if name == "brk"));
    }

    #[tokio::test]
    async fn continue_skips_the_rest_of_the_pipeline_but_not_the_next_iteration() {
        // On an odd `ctx`, "continue" fires and "double" must not run; the
        // outer while loop still advances to its next iteration either way.
        let inner = Builder::<i32>::new()
            .do_once("inc", |ctx: i32, _action: Action<i32>| async move {
                Ok(StepOutcome::Context(ctx + 1))
            })
            .unwrap()
            .do_continue("skip_odds", |ctx: i32, _action: Action<i32>| async move {
                Ok(ctx % 2 != 0)
            })
            .unwrap()
            .do_once("double", |ctx: i32, _action: Action<i32>| async move {
                Ok(StepOutcome::Context(ctx * 10))
            })
            .unwrap();

        let pipeline = Builder::<i32>::new()
            .do_while_pipeline(
                "loop",
                |ctx: i32, _action: Action<i32>| async move { Ok(ctx < 6) },
                inner,
            )
            .unwrap()
            .build()
            .unwrap();

        // iter 1: inc -> 1 (odd, continue fires, "double" skipped); 1 < 6
        // iter 2: inc -> 2 (even, "double" runs) -> 20; 20 < 6 is false, exit
        let result = Interpreter::run(&pipeline, 0).await.unwrap();
        assert_eq!(result, 20);
    }

    #[tokio::test]
    async fn if_skips_its_body_when_predicate_is_false() {
        let pipeline = Builder::<i32>::new()
            .do_if(
                "maybe",
                |ctx: i32, _action: Action<i32>| async move { Ok(ctx > 10) },
                step(100),
            )
            .unwrap()
            .build()
            .unwrap();

        let result = Interpreter::run(&pipeline, 1).await.unwrap();
        assert_eq!(result, 1);
    }

    #[tokio::test]
    async fn if_runs_its_body_when_predicate_is_true() {
        let pipeline = Builder::<i32>::new()
            .do_if(
                "maybe",
                |ctx: i32, _action: Action<i32>| async move { Ok(ctx > 0) },
                step(100),
            )
            .unwrap()
            .build()
            .unwrap();

        let result = Interpreter::run(&pipeline, 1).await.unwrap();
        assert_eq!(result, 101);
    }
}
