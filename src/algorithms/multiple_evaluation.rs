use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, IntoParallelRefMutIterator, ParallelIterator};
use rayon::slice::ParallelSlice;

use crate::{basis::base::Basis, config::MultipleEvalOptions, errors::SGError, storage::SparseGridData, utilities::float::Float};

use super::{basis_evaluation::BasisEvaluation, evaluation_transposed::EvaluationTransposed};

///
/// Evaluation of a grid at a fixed set of data points, stored row-major with
/// one row of `num_inputs` coordinates per point.
///
/// With `B[i][j] = phi_j(x_i)`, [`MultipleEvaluation::mult`] computes `B * alpha`
/// and [`MultipleEvaluation::mult_transpose`] accumulates `B^T * source`.
///
pub struct MultipleEvaluation<'a, BASIS: Basis + Sync>
{
    storage: &'a SparseGridData,
    basis: &'a BASIS,
    dataset: &'a [f64],
    options: MultipleEvalOptions,
}

impl<'a, BASIS: Basis + Sync> MultipleEvaluation<'a, BASIS>
{
    pub fn new(storage: &'a SparseGridData, basis: &'a BASIS, dataset: &'a [f64], options: MultipleEvalOptions) -> Result<Self, SGError>
    {
        let num_inputs = storage.num_inputs();
        if num_inputs == 0 || dataset.len() % num_inputs != 0
        {
            return Err(SGError::DimensionMismatch);
        }
        Ok(Self { storage, basis, dataset, options })
    }

    #[inline]
    pub fn num_points(&self) -> usize
    {
        self.dataset.len() / self.storage.num_inputs()
    }

    ///
    /// `result[i] = f(x_i)`. Data points outside the bounding box evaluate to zero.
    ///
    pub fn mult<T: Float>(&self, alpha: &[T], result: &mut [T]) -> Result<(), SGError>
    {
        if alpha.len() != self.storage.len() || result.len() != self.num_points()
        {
            return Err(SGError::NumberOfPointsAndValuesMismatch);
        }
        let num_inputs = self.storage.num_inputs();
        let op = BasisEvaluation(self.storage, self.basis);
        let eval = |x: &[f64]| match op.eval(x, alpha)
        {
            Ok(value) => Ok(value),
            Err(SGError::OutOfDomain) => Ok(T::zero()),
            Err(e) => Err(e),
        };
        if self.options.parallel
        {
            tracing::trace!(num_points = self.num_points(), "parallel mult");
            self.dataset.par_chunks_exact(num_inputs).zip(result.par_iter_mut())
                .with_min_len(self.options.min_points_per_task.max(1))
                .try_for_each(|(x, y)|
                {
                    *y = eval(x)?;
                    Ok(())
                })
        }
        else
        {
            for (x, y) in self.dataset.chunks_exact(num_inputs).zip(result.iter_mut())
            {
                *y = eval(x)?;
            }
            Ok(())
        }
    }

    ///
    /// `result += B^T * source`: every data point scatters `source[i]` into the
    /// basis functions active at it. Points outside the bounding box contribute nothing.
    ///
    pub fn mult_transpose<T: Float>(&self, source: &[T], result: &mut [T]) -> Result<(), SGError>
    {
        if source.len() != self.num_points() || result.len() != self.storage.len()
        {
            return Err(SGError::NumberOfPointsAndValuesMismatch);
        }
        let num_inputs = self.storage.num_inputs();
        let op = EvaluationTransposed::new(self.storage, self.basis);
        if self.options.parallel
        {
            let grid_size = self.storage.len();
            tracing::trace!(num_points = self.num_points(), grid_size, "parallel mult_transpose");
            let partial = self.dataset.par_chunks_exact(num_inputs).zip(source.par_iter())
                .with_min_len(self.options.min_points_per_task.max(1))
                .fold(|| vec![T::zero(); grid_size], |mut acc, (x, &alpha)|
                {
                    op.eval(x, alpha, &mut acc);
                    acc
                })
                .reduce_with(|mut a, b|
                {
                    for (x, y) in a.iter_mut().zip(b)
                    {
                        *x += y;
                    }
                    a
                });
            if let Some(partial) = partial
            {
                for (r, p) in result.iter_mut().zip(partial)
                {
                    *r += p;
                }
            }
        }
        else
        {
            for (x, &alpha) in self.dataset.chunks_exact(num_inputs).zip(source)
            {
                op.eval(x, alpha, result);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use crate::{basis::linear::LinearBasis, config::MultipleEvalOptions, errors::SGError, generators, storage::{BoundingBox, SparseGridData}};
    use super::MultipleEvaluation;

    fn dataset(num_points: usize, num_inputs: usize) -> Vec<f64>
    {
        // deterministic low-discrepancy-ish points in [-1, 1]
        (0..num_points * num_inputs).map(|i| ((i as f64 * 0.618_033_988_75).fract() * 2.0) - 1.0).collect()
    }

    fn grid() -> SparseGridData
    {
        let mut storage = SparseGridData::new(3);
        generators::regular(&mut storage, &[4, 4, 4]).unwrap();
        storage.set_bounding_box(BoundingBox::new(&[-1.0; 3], &[1.0; 3])).unwrap();
        storage
    }

    #[test]
    fn check_parallel_matches_serial()
    {
        let storage = grid();
        let data = dataset(500, 3);
        let source: Vec<f64> = (0..500).map(|i| (i % 7) as f64 - 3.0).collect();

        let serial = MultipleEvaluation::new(&storage, &LinearBasis, &data, MultipleEvalOptions::serial()).unwrap();
        let mut expected = vec![1.0; storage.len()];
        serial.mult_transpose(&source, &mut expected).unwrap();

        let options = MultipleEvalOptions { parallel: true, min_points_per_task: 16 };
        let parallel = MultipleEvaluation::new(&storage, &LinearBasis, &data, options).unwrap();
        let mut result = vec![1.0; storage.len()];
        parallel.mult_transpose(&source, &mut result).unwrap();

        for (r, e) in result.iter().zip(&expected)
        {
            assert!((r - e).abs() < 1e-10);
        }
    }

    #[test]
    fn check_adjoint_identity()
    {
        // <B alpha, v> == <alpha, B^T v>
        let storage = grid();
        let data = dataset(200, 3);
        let alpha: Vec<f64> = (0..storage.len()).map(|i| ((i * 31) % 11) as f64 * 0.1).collect();
        let v: Vec<f64> = (0..200).map(|i| ((i * 17) % 5) as f64 - 2.0).collect();
        for options in [MultipleEvalOptions::serial(), MultipleEvalOptions::default()]
        {
            let op = MultipleEvaluation::new(&storage, &LinearBasis, &data, options).unwrap();
            let mut b_alpha = vec![0.0; op.num_points()];
            op.mult(&alpha, &mut b_alpha).unwrap();
            let mut bt_v = vec![0.0; storage.len()];
            op.mult_transpose(&v, &mut bt_v).unwrap();
            let lhs: f64 = b_alpha.iter().zip(&v).map(|(a, b)| a * b).sum();
            let rhs: f64 = alpha.iter().zip(&bt_v).map(|(a, b)| a * b).sum();
            assert!((lhs - rhs).abs() < 1e-9, "{} != {}", lhs, rhs);
        }
    }

    #[test]
    fn check_out_of_domain_points_are_skipped()
    {
        let storage = grid();
        let data = vec![0.1, 0.2, 0.3, 5.0, 0.0, 0.0];
        let op = MultipleEvaluation::new(&storage, &LinearBasis, &data, MultipleEvalOptions::serial()).unwrap();
        let alpha = vec![1.0; storage.len()];
        let mut values = vec![-1.0; 2];
        op.mult(&alpha, &mut values).unwrap();
        assert!(values[0] > 0.0);
        assert_eq!(values[1], 0.0);

        let mut only_first = vec![0.0; storage.len()];
        op.mult_transpose(&[1.0, 0.0], &mut only_first).unwrap();
        let mut both = vec![0.0; storage.len()];
        op.mult_transpose(&[1.0, 100.0], &mut both).unwrap();
        assert_eq!(only_first, both);
    }

    #[test]
    fn check_shape_errors()
    {
        let storage = grid();
        let data = dataset(4, 3);
        assert!(MultipleEvaluation::new(&storage, &LinearBasis, &data[..7], MultipleEvalOptions::default()).is_err());
        let op = MultipleEvaluation::new(&storage, &LinearBasis, &data, MultipleEvalOptions::default()).unwrap();
        let mut result = vec![0.0; storage.len()];
        assert_eq!(op.mult_transpose(&[1.0; 3], &mut result), Err(SGError::NumberOfPointsAndValuesMismatch));
        let mut values = vec![0.0; 3];
        assert_eq!(op.mult(&vec![0.0; storage.len()], &mut values), Err(SGError::NumberOfPointsAndValuesMismatch));
    }
}
