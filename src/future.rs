use std::future::Future;
use std::pin::Pin;

/// A boxed, type-erased future, used at every seam where a user callable
/// (body, predicate, splitter, rejoiner) must be stored behind a trait
/// object rather than monomorphised per activity.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
