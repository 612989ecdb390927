//! End-to-end pipeline scenarios exercised as black-box integration tests
//! against the public `prelude` surface.

use pipeworks_core::prelude::*;

#[derive(Clone, Debug, Default, PartialEq)]
struct CountItems {
    count: i32,
    items: Vec<i32>,
}

#[derive(Clone, Debug, Default)]
struct SplitCtx {
    items: Vec<i32>,
    results: Vec<i32>,
    n: Option<i32>,
}

#[derive(Clone, Debug)]
struct Item {
    bad: bool,
    v: i32,
}

#[tokio::test]
async fn single_pipeline_once_only() {
    let pipeline = Builder::<i32>::new()
        .do_once("a", |ctx: i32, _action: Action<i32>| async move {
            Ok(StepOutcome::Context(ctx + 1))
        })
        .unwrap()
        .do_once("b", |ctx: i32, _action: Action<i32>| async move {
            Ok(StepOutcome::Context(ctx * 2))
        })
        .unwrap()
        .build()
        .unwrap();

    let result = Interpreter::run(&pipeline, 3).await.unwrap();
    assert_eq!(result, 8);
}

#[tokio::test]
async fn while_loop_counts_to_three() {
    let pipeline = Builder::<CountItems>::new()
        .do_once("init", |_ctx: CountItems, _action: Action<CountItems>| async move {
            Ok(StepOutcome::Context(CountItems::default()))
        })
        .unwrap()
        .do_while(
            "loop",
            |ctx: CountItems, _action: Action<CountItems>| async move { Ok(ctx.count < 3) },
            |ctx: CountItems, _action: Action<CountItems>| async move {
                Ok(StepOutcome::Context(CountItems {
                    count: ctx.count + 1,
                    ..ctx
                }))
            },
        )
        .unwrap()
        .build()
        .unwrap();

    let result = Interpreter::run(&pipeline, CountItems::default()).await.unwrap();
    assert_eq!(result.count, 3);
}

#[tokio::test]
async fn until_loop_runs_at_least_once() {
    let pipeline = Builder::<CountItems>::new()
        .do_once("init", |_ctx: CountItems, _action: Action<CountItems>| async move {
            Ok(StepOutcome::Context(CountItems::default()))
        })
        .unwrap()
        .do_until(
            "loop",
            |ctx: CountItems, _action: Action<CountItems>| async move { Ok(ctx.count >= 2) },
            |ctx: CountItems, _action: Action<CountItems>| async move {
                Ok(StepOutcome::Context(CountItems {
                    count: ctx.count + 1,
                    ..ctx
                }))
            },
        )
        .unwrap()
        .build()
        .unwrap();

    let result = Interpreter::run(&pipeline, CountItems::default()).await.unwrap();
    assert_eq!(result.count, 2);
}

#[tokio::test]
async fn split_rejoiner_only_sees_fulfilled_results() {
    let pipeline = Builder::<SplitCtx>::new()
        .do_once("init", |_ctx: SplitCtx, _action: Action<SplitCtx>| async move {
            Ok(StepOutcome::Context(SplitCtx {
                items: vec![1, 2, 3],
                ..SplitCtx::default()
            }))
        })
        .unwrap()
        .do_split(
            "par",
            |ctx: SplitCtx, _action: Action<SplitCtx>| async move {
                Ok(ctx
                    .items
                    .iter()
                    .map(|&n| SplitCtx {
                        n: Some(n),
                        ..SplitCtx::default()
                    })
                    .collect())
            },
            |orig: SplitCtx, settled: Vec<Settlement<SplitCtx>>, _action: Action<SplitCtx>| async move {
                assert_eq!(settled.len(), 3);
                let results = settled
                    .into_iter()
                    .filter_map(Settlement::ok)
                    .map(|c| c.n.expect("sub-context always carries n"))
                    .collect();
                Ok(SplitCtx { results, ..orig })
            },
            |ctx: SplitCtx, _action: Action<SplitCtx>| async move {
                let n = ctx.n.expect("splitter always sets n");
                if n == 2 {
                    return Err(anyhow::anyhow!("n == 2 is rejected").into());
                }
                Ok(StepOutcome::Context(SplitCtx {
                    n: Some(n * 10),
                    ..ctx
                }))
            },
        )
        .unwrap()
        .build()
        .unwrap();

    let result = Interpreter::run(&pipeline, SplitCtx::default()).await.unwrap();
    assert_eq!(result.items, vec![1, 2, 3]);
    assert_eq!(result.results, vec![10, 30]);
}

#[tokio::test]
async fn break_inside_while_stops_the_enclosing_loop() {
    let inner = Builder::<CountItems>::new()
        .do_once("inc", |ctx: CountItems, _action: Action<CountItems>| async move {
            let count = ctx.count + 1;
            let mut items = ctx.items;
            items.push(count);
            Ok(StepOutcome::Context(CountItems { count, items }))
        })
        .unwrap()
        .do_break(
            "brk",
            |ctx: CountItems, _action: Action<CountItems>| async move { Ok(ctx.count >= 3) },
        )
        .unwrap();

    let pipeline = Builder::<CountItems>::new()
        .do_while_pipeline(
            "loop",
            |ctx: CountItems, _action: Action<CountItems>| async move { Ok(ctx.count < 100) },
            inner,
        )
        .unwrap()
        .build()
        .unwrap();

    let seed = CountItems { count: 0, items: vec![] };
    let result = Interpreter::run(&pipeline, seed).await.unwrap();
    assert_eq!(result.count, 3);
    assert_eq!(result.items, vec![1, 2, 3]);
}

#[tokio::test]
async fn pipe_settles_independent_failures_in_order() {
    let pipeline = std::sync::Arc::new(
        Builder::<Item>::new()
            .do_once("do", |ctx: Item, _action: Action<Item>| async move {
                if ctx.bad {
                    return Err(anyhow::anyhow!("bad item").into());
                }
                Ok(StepOutcome::Context(ctx))
            })
            .unwrap()
            .build()
            .unwrap(),
    );

    let items = vec![
        Item { bad: false, v: 1 },
        Item { bad: true, v: 0 },
        Item { bad: false, v: 2 },
    ];

    let results = WorkerPool::pipe(pipeline, items, 4).await.unwrap();

    assert_eq!(results.len(), 3);
    match &results[0] {
        Settlement::Fulfilled(item) => assert_eq!(item.v, 1),
        Settlement::Rejected(_) => panic!("expected index 0 to succeed"),
    }
    assert!(matches!(results[1], Settlement::Rejected(_)));
    match &results[2] {
        Settlement::Fulfilled(item) => assert_eq!(item.v, 2),
        Settlement::Rejected(_) => panic!("expected index 2 to succeed"),
    }
}
