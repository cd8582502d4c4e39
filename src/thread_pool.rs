//! Worker pool for batch evaluation of nuisance samples.
//!
//! Without the `parallel` feature, [`install`] runs its closure on the calling
//! thread and batches are evaluated in order.

#[cfg(feature = "parallel")]
use std::sync::OnceLock;

#[cfg(feature = "parallel")]
static SAMPLE_POOL: OnceLock<Option<rayon::ThreadPool>> = OnceLock::new();

/// Lazily built pool with one `blue-combine-N` worker per logical CPU.
///
/// `None` when the pool could not be built; sample batches then run on
/// rayon's global pool instead.
#[cfg(feature = "parallel")]
fn sample_pool() -> Option<&'static rayon::ThreadPool> {
    SAMPLE_POOL
        .get_or_init(|| {
            rayon::ThreadPoolBuilder::new()
                .thread_name(|i| format!("blue-combine-{}", i))
                .build()
                .map_err(|e| log::warn!("sample pool unavailable, using the global pool: {}", e))
                .ok()
        })
        .as_ref()
}

/// Run a batch of sample evaluations inside the sample pool.
#[cfg(feature = "parallel")]
pub(crate) fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    match sample_pool() {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

/// Run a batch of sample evaluations on the calling thread.
#[cfg(not(feature = "parallel"))]
pub(crate) fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R,
{
    op()
}
