use crate::error::PipelineError;

/// A per-item outcome, shared by [`crate::pool::WorkerPool::pipe`] and
/// `SPLIT` rejoiners so both consume the same shape.
#[derive(Debug)]
pub enum Settlement<T> {
    Fulfilled(T),
    Rejected(PipelineError),
}

impl<T> Settlement<T> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settlement::Fulfilled(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Settlement::Fulfilled(v) => Some(v),
            Settlement::Rejected(_) => None,
        }
    }
}
