//! Bounded worker pool over independent units.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::config::Parallelism;
use crate::{Error, Result};

/// Apply `f` to every unit, on a dedicated rayon pool when threads are
/// enabled. Results keep the order of `units`.
pub(crate) fn run_units<T, R, F>(parallelism: Parallelism, units: &[T], f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    if !parallelism.use_threads || units.len() < 2 {
        return Ok(units.iter().map(f).collect());
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(parallelism.num_threads.unwrap_or(0))
        .thread_name(|i| format!("transfer-worker-{i}"))
        .build()
        .map_err(|e| Error::Other(format!("failed to start worker pool: {e}")))?;
    Ok(pool.install(|| units.par_iter().map(f).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threaded_results_keep_order() {
        let units: Vec<u32> = (0..64).collect();
        let parallelism = Parallelism {
            use_threads: true,
            num_threads: Some(4),
        };
        let out = run_units(parallelism, &units, |u| u * 2).unwrap();
        assert_eq!(out, units.iter().map(|u| u * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_serial_when_disabled() {
        let out = run_units(Parallelism::default(), &[1, 2, 3], |u| u + 1).unwrap();
        assert_eq!(out, vec![2, 3, 4]);
    }
}
