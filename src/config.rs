//! Options for operations over many evaluation points.
use serde::{Deserialize, Serialize};

/// Controls how [`crate::algorithms::multiple_evaluation::MultipleEvaluation`]
/// distributes work.
///
/// ### Default Values
/// - `parallel`: `true`
/// - `min_points_per_task`: `64`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleEvalOptions
{
    /// Evaluate data points on the rayon thread pool.
    pub parallel: bool,

    /// Smallest number of data points handed to a single rayon task. Each
    /// task of a parallel transposed evaluation owns a partial accumulator
    /// the size of the grid, so larger values trade parallelism for memory.
    pub min_points_per_task: usize,
}

impl Default for MultipleEvalOptions
{
    fn default() -> Self {
        Self { parallel: true, min_points_per_task: 64 }
    }
}

impl MultipleEvalOptions
{
    pub fn serial() -> Self
    {
        Self { parallel: false, ..Default::default() }
    }
}
