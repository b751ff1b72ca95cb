//! Parallel execution of independent inference calls.
//!
//! The core types are immutable, so callers can fan a batch of graphs
//! out across threads without any locking. These helpers wrap rayon;
//! [`Config::num_threads`] pins the pool size per call instead of
//! touching the global pool.
//!
//! [`Config::num_threads`]: crate::Config::num_threads

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::{Config, Error, Result};

/// Applies `map` to every item in parallel and folds the outputs with
/// `reduce`, starting from `identity`. `reduce` must be associative.
pub fn map_reduce<T, U, M, R>(
    items: Vec<T>,
    map: M,
    identity: U,
    reduce: R,
    config: &Config,
) -> Result<U>
where
    T: Send,
    U: Send + Sync + Clone,
    M: Fn(T) -> Result<U> + Sync + Send,
    R: Fn(U, U) -> U + Sync + Send,
{
    run_in_pool(config, move || {
        items
            .into_par_iter()
            .map(&map)
            .try_reduce(|| identity.clone(), |a, b| Ok(reduce(a, b)))
    })
}

/// Applies `map` to every item in parallel, preserving input order.
pub fn map_collect<T, U, M>(items: Vec<T>, map: M, config: &Config) -> Result<Vec<U>>
where
    T: Send,
    U: Send,
    M: Fn(T) -> Result<U> + Sync + Send,
{
    run_in_pool(config, move || items.into_par_iter().map(&map).collect())
}

fn run_in_pool<U: Send>(
    config: &Config,
    job: impl FnOnce() -> Result<U> + Send,
) -> Result<U> {
    match config.num_threads {
        None => job(),
        Some(n) => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| Error::ThreadPool(e.to_string()))?;
            pool.install(job)
        }
    }
}
