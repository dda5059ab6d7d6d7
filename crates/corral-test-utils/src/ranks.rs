//! Run one closure per rank of an in-process group.

use std::thread;

use corral_comm::{LocalGroup, LocalGroupConfig, LocalTransport};

/// Run `f` on `size` threads, each with its own endpoint of a fresh
/// [`LocalGroup`]. Returns results in rank order and re-raises the first
/// panic.
pub fn run_ranks<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(LocalTransport) -> R + Sync,
{
    run_ranks_with(size, LocalGroupConfig::default(), f)
}

/// [`run_ranks`] with custom transport settings.
pub fn run_ranks_with<R, F>(size: usize, config: LocalGroupConfig, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(LocalTransport) -> R + Sync,
{
    let endpoints = LocalGroup::with_config(size, config);
    thread::scope(|scope| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|t| {
                let f = &f;
                scope.spawn(move || f(t))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}
