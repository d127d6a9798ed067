use crate::{basis::base::Basis, errors::SGError, iterators::grid_iterator::{GridIteratorT, HashMapGridIterator}, storage::{SparseGridData, MAX_LEVEL}, utilities::float::Float};

use super::evaluation_transposed::source_index;

///
/// Forward evaluation `f(x) = sum_j alpha_j * phi_j(x)` of a grid without boundary points.
///
pub struct BasisEvaluation<'a, BASIS: Basis>(pub &'a SparseGridData, pub &'a BASIS);

impl<BASIS: Basis> BasisEvaluation<'_, BASIS>
{
    #[inline]
    fn recursive_eval<Iterator: GridIteratorT, T: Float>(&self, point: &[f64], current_dim: usize,
        value: T, iterator: &mut Iterator, source: &[u32], alpha: &[T]) -> T
    {
        let last_dim = self.0.num_inputs() - 1;
        let idx = source[current_dim];
        let mut level = 1;
        let mut result = T::zero();
        loop
        {
            let Some(seq) = iterator.index() else
            {
                break;
            };
            let (_, index) = iterator.level_and_index(current_dim);
            let val = T::from_f64(self.1.eval(level, index, point[current_dim])) * value;
            if current_dim == last_dim
            {
                result += alpha[seq] * val;
            }
            else
            {
                result += self.recursive_eval(point, current_dim + 1, val, iterator, source, alpha);
            }
            if iterator.is_leaf() || level >= MAX_LEVEL
            {
                break;
            }
            // this decides in which direction we should descend by evaluating
            // the corresponding bit
            // the bits are coded from left to right starting with level 1
            // being in position max_level
            let go_right = (idx & (1 << (MAX_LEVEL - level))) > 0;
            level += 1;

            if go_right
            {
                if !iterator.right_child(current_dim)
                {
                    break;
                }
            }
            else if !iterator.left_child(current_dim)
            {
                break;
            }
        }
        iterator.reset_to_level_one(current_dim);
        result
    }

    ///
    /// Evaluates the interpolant with coefficients `alpha` (one per grid point) at `point`.
    ///
    pub fn eval<T: Float>(&self, point: &[f64], alpha: &[T]) -> Result<T, SGError>
    {
        let num_inputs = self.0.num_inputs();
        if point.len() != num_inputs || alpha.len() != self.0.len()
        {
            return Err(SGError::DimensionMismatch);
        }
        if !self.0.bounding_box().contains(point)
        {
            return Err(SGError::OutOfDomain);
        }
        if num_inputs == 0
        {
            return Ok(T::zero());
        }
        let unit_coord = self.0.bounding_box().to_unit_coordinate(point);
        let source: Vec<u32> = unit_coord.iter().map(|&x| source_index(x)).collect();
        let mut iterator = HashMapGridIterator::new(self.0);
        Ok(self.recursive_eval(&unit_coord, 0, T::one(), &mut iterator, &source, alpha))
    }
}

#[test]
fn check_interpolates_bilinear_function()
{
    use crate::{basis::linear::LinearBasis, generators, storage::BoundingBox};
    let mut storage = SparseGridData::new(1);
    generators::full(&mut storage, 3).unwrap();
    storage.set_bounding_box(BoundingBox::new(&[2.0], &[4.0])).unwrap();
    // f(x) = 1 - |2u - 1| is exactly the level one hat in unit coordinates
    let mut alpha = vec![0.0_f64; storage.len()];
    let root = storage.index_of(&crate::storage::GridPoint::root(1)).unwrap();
    alpha[root] = 2.0;
    let op = BasisEvaluation(&storage, &LinearBasis);
    assert!((op.eval(&[3.0], &alpha).unwrap() - 2.0).abs() < 1e-14);
    assert!((op.eval(&[2.5], &alpha).unwrap() - 1.0).abs() < 1e-14);
    assert_eq!(op.eval(&[4.5], &alpha), Err(SGError::OutOfDomain));
    assert_eq!(op.eval(&[3.0, 1.0], &alpha), Err(SGError::DimensionMismatch));
}
