use crate::{basis::base::Basis, iterators::grid_iterator::{GridIteratorT, HashMapGridIterator}, storage::{SparseGridData, MAX_LEVEL}, utilities::float::Float};

///
/// Encodes a unit coordinate as a `u32` whose bits, read from bit
/// `MAX_LEVEL - 1` downwards, select the right (set) or left (clear) child
/// on each level below the root. The result is always odd.
///
#[inline]
pub fn source_index(x: f64) -> u32
{
    let bits = u32::BITS;
    let val = (x * (1_u64 << (bits - 2)) as f64).floor() * 2.0;
    if x == 1.0
    {
        (val - 1.0) as u32
    }
    else
    {
        (val + 1.0) as u32
    }
}

///
/// Transposed evaluation: scatters a weighted contribution into every basis
/// function that is active at a point.
///
/// Only grids without boundary points are supported; level 0 points are
/// never visited.
///
pub struct EvaluationTransposed<'a, BASIS: Basis>
{
    storage: &'a SparseGridData,
    basis: &'a BASIS,
}

impl<'a, BASIS: Basis> EvaluationTransposed<'a, BASIS>
{
    pub fn new(storage: &'a SparseGridData, basis: &'a BASIS) -> Self
    {
        Self { storage, basis }
    }

    ///
    /// Adds `alpha * phi_j(point)` to `result[j]` for every grid point `j`
    /// whose basis function is non-zero at `point`. Points outside the
    /// bounding box contribute nothing.
    ///
    /// `point` must have one coordinate per dimension and `result` one entry
    /// per grid point; neither is checked.
    ///
    pub fn eval<T: Float>(&self, point: &[f64], alpha: T, result: &mut [T])
    {
        self.traverse(point, &mut |seq, value| result[seq] += alpha * T::from_f64(value));
    }

    ///
    /// Returns `(sequence number, phi(point))` for every basis function
    /// visited at `point`.
    ///
    pub fn affected_basis_functions(&self, point: &[f64]) -> Vec<(usize, f64)>
    {
        let mut result = Vec::new();
        self.traverse(point, &mut |seq, value| result.push((seq, value)));
        result
    }

    fn traverse<F: FnMut(usize, f64)>(&self, point: &[f64], visit: &mut F)
    {
        let num_inputs = self.storage.num_inputs();
        if num_inputs == 0
        {
            return;
        }
        let bbox = self.storage.bounding_box();
        let mut unit_coord = Vec::with_capacity(num_inputs);
        for (d, &x) in point.iter().enumerate().take(num_inputs)
        {
            if !bbox.contains_coordinate(d, x)
            {
                return;
            }
            unit_coord.push(bbox.to_unit_coordinate_in_dim(d, x));
        }
        let source: Vec<u32> = unit_coord.iter().map(|&x| source_index(x)).collect();
        let mut iterator = HashMapGridIterator::new(self.storage);
        self.recursive_eval(&unit_coord, 0, 1.0, &mut iterator, &source, visit);
    }

    ///
    /// Follows the path selected by `source[current_dim]` down the tree of
    /// dimension `current_dim`, recursing into the next dimension at every
    /// node. On entry all dimensions from `current_dim` on are at level 1.
    ///
    fn recursive_eval<Iterator: GridIteratorT, F: FnMut(usize, f64)>(&self, point: &[f64], current_dim: usize,
        value: f64, iterator: &mut Iterator, source: &[u32], visit: &mut F)
    {
        let last_dim = self.storage.num_inputs() - 1;
        let src_index = source[current_dim];
        let mut work_level = 1;

        loop
        {
            let Some(seq) = iterator.index() else
            {
                iterator.reset_to_level_one(current_dim);
                break;
            };
            let (level, index) = iterator.level_and_index(current_dim);
            let hint = iterator.is_leaf();
            let new_value = self.basis.eval(level as u32, index, point[current_dim]) * value;

            if current_dim == last_dim
            {
                visit(seq, new_value);
            }
            else
            {
                self.recursive_eval(point, current_dim + 1, new_value, iterator, source, visit);
                // a deeper branch may have left the next dimension below level 1
                if !hint
                {
                    iterator.reset_to_level_one(current_dim + 1);
                }
            }

            if hint || work_level >= MAX_LEVEL
            {
                break;
            }
            // this decides in which direction we should descend by evaluating
            // the corresponding bit
            // the bits are coded from left to right starting with level 1
            // being in position max_level
            let go_right = (src_index & (1 << (MAX_LEVEL - work_level))) > 0;
            work_level += 1;

            if go_right
            {
                iterator.right_child(current_dim);
            }
            else
            {
                iterator.left_child(current_dim);
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use std::cell::Cell;
    use indexmap::IndexSet;
    use crate::{algorithms::basis_evaluation::BasisEvaluation, basis::{base::Basis, linear::{LinearBasis, ModifiedLinearBasis}}, generators, storage::{BoundingBox, GridPoint, SparseGridData}};
    use super::{source_index, EvaluationTransposed};

    fn regular_grid(num_inputs: usize, level: usize) -> SparseGridData
    {
        let mut storage = SparseGridData::new(num_inputs);
        generators::regular(&mut storage, &vec![level; num_inputs]).unwrap();
        storage
    }

    fn brute_force(storage: &SparseGridData, basis: &impl Basis, point: &[f64]) -> Vec<f64>
    {
        let unit = storage.bounding_box().to_unit_coordinate(point);
        (0..storage.len()).map(|seq|
        {
            (0..storage.num_inputs()).map(|d| basis.eval(storage.level(seq, d) as u32, storage.index(seq, d), unit[d])).product()
        }).collect()
    }

    /// Records the deepest level it is asked to evaluate.
    struct DepthRecordingBasis(Cell<u32>);

    impl Basis for DepthRecordingBasis
    {
        fn eval(&self, level: u32, index: u32, x: f64) -> f64 {
            self.0.set(self.0.get().max(level));
            LinearBasis.eval(level, index, x)
        }
    }

    #[test]
    fn check_source_index_encoding()
    {
        assert_eq!(source_index(0.0), 1);
        assert_eq!(source_index(0.5), (1 << 30) + 1);
        assert_eq!(source_index(1.0), (1_u32 << 31) - 1);
        for x in [0.0, 0.1, 0.3333, 0.5, 0.75, 0.999999, 1.0]
        {
            assert_eq!(source_index(x) % 2, 1);
        }
    }

    #[test]
    fn check_single_point_grid()
    {
        for num_inputs in 1..5
        {
            let mut storage = SparseGridData::new(num_inputs);
            storage.insert_point(GridPoint::root(num_inputs)).unwrap();
            storage.update_leaves();
            let point: Vec<f64> = (0..num_inputs).map(|d| 0.2 + 0.1 * d as f64).collect();
            let mut result = vec![0.0];
            EvaluationTransposed::new(&storage, &LinearBasis).eval(&point, 3.0, &mut result);
            let expected: f64 = 3.0 * point.iter().map(|&x| LinearBasis.eval(1, 1, x)).product::<f64>();
            assert!((result[0] - expected).abs() < 1e-14);
        }
    }

    #[test]
    fn check_matches_brute_force()
    {
        let storage = regular_grid(3, 5);
        let op = EvaluationTransposed::new(&storage, &LinearBasis);
        for point in [[0.3, 0.7, 0.1], [0.5, 0.5, 0.5], [0.0, 1.0, 0.8125], [0.123, 0.456, 0.789]]
        {
            let mut result = vec![0.0; storage.len()];
            op.eval(&point, 1.0, &mut result);
            let expected = brute_force(&storage, &LinearBasis, &point);
            for (r, e) in result.iter().zip(&expected)
            {
                assert!((r - e).abs() < 1e-12, "point {:?}: {} != {}", point, r, e);
            }
        }
    }

    #[test]
    fn check_out_of_domain_is_a_no_op()
    {
        let mut storage = regular_grid(2, 3);
        storage.set_bounding_box(BoundingBox::new(&[0.0, -1.0], &[2.0, 1.0])).unwrap();
        let op = EvaluationTransposed::new(&storage, &LinearBasis);
        let mut result = vec![7.0; storage.len()];
        op.eval(&[1.0, 1.5], 1.0, &mut result);
        op.eval(&[-0.1, 0.0], 1.0, &mut result);
        op.eval(&[f64::NAN, 0.0], 1.0, &mut result);
        assert!(result.iter().all(|&r| r == 7.0));
        assert!(op.affected_basis_functions(&[3.0, 0.0]).is_empty());
    }

    #[test]
    fn check_upper_boundary_is_in_domain()
    {
        let mut storage = regular_grid(2, 4);
        storage.set_bounding_box(BoundingBox::new(&[-2.0, 0.0], &[2.0, 3.0])).unwrap();
        let op = EvaluationTransposed::new(&storage, &ModifiedLinearBasis);
        let point = [2.0, 3.0];
        let mut result = vec![0.0; storage.len()];
        op.eval(&point, 1.0, &mut result);
        let expected = brute_force(&storage, &ModifiedLinearBasis, &point);
        assert!(expected.iter().any(|&e| e > 0.0));
        for (r, e) in result.iter().zip(&expected)
        {
            assert!((r - e).abs() < 1e-12);
        }
    }

    #[test]
    fn check_accumulates_instead_of_overwriting()
    {
        let storage = regular_grid(2, 4);
        let op = EvaluationTransposed::new(&storage, &LinearBasis);
        let point = [0.3, 0.6];
        let mut once = vec![0.0_f64; storage.len()];
        op.eval(&point, 0.5, &mut once);
        let mut twice = vec![0.0_f64; storage.len()];
        op.eval(&point, 0.5, &mut twice);
        op.eval(&point, 0.5, &mut twice);
        for (a, b) in once.iter().zip(&twice)
        {
            assert!((2.0 * a - b).abs() < 1e-14);
        }
        let mut preset = vec![1.5_f64; storage.len()];
        op.eval(&point, 0.5, &mut preset);
        for (a, b) in once.iter().zip(&preset)
        {
            assert!((a + 1.5 - b).abs() < 1e-14);
        }
    }

    #[test]
    fn check_duality_with_forward_evaluation()
    {
        let mut storage = regular_grid(3, 4);
        storage.set_bounding_box(BoundingBox::new(&[-1.0, 0.0, 10.0], &[1.0, 2.0, 12.0])).unwrap();
        let alpha: Vec<f64> = (0..storage.len()).map(|i| ((i * 7919) % 13) as f64 - 6.0).collect();
        let transposed = EvaluationTransposed::new(&storage, &LinearBasis);
        let forward = BasisEvaluation(&storage, &LinearBasis);
        for point in [[0.1, 0.2, 10.3], [-0.77, 1.9, 11.0], [1.0, 0.0, 12.0]]
        {
            let mut scattered = 0.0;
            for (j, &a) in alpha.iter().enumerate()
            {
                let mut result = vec![0.0; storage.len()];
                transposed.eval(&point, a, &mut result);
                scattered += result[j];
            }
            let gathered = forward.eval(&point, &alpha).unwrap();
            assert!((scattered - gathered).abs() < 1e-12, "{} != {}", scattered, gathered);
        }
    }

    #[test]
    fn check_descent_depth_is_bounded_by_grid_level()
    {
        let level = 5;
        let storage = regular_grid(2, level);
        let basis = DepthRecordingBasis(Cell::new(0));
        let op = EvaluationTransposed::new(&storage, &basis);
        let mut result = vec![0.0; storage.len()];
        for point in [[0.0, 0.0], [1.0, 1.0], [0.49999, 0.50001], [0.1234, 0.9876]]
        {
            op.eval(&point, 1.0, &mut result);
        }
        assert!(basis.0.get() <= level as u32);
        assert_eq!(basis.0.get(), level as u32);
    }

    #[test]
    fn check_deep_one_dimensional_path()
    {
        // a single path of the maximal depth towards x = 1
        let mut storage = SparseGridData::new(1);
        let mut point = GridPoint::root(1);
        storage.insert_point(point.clone()).unwrap();
        for _ in 1..crate::storage::MAX_LEVEL
        {
            point = point.right_child(0);
            storage.insert_point(point.clone()).unwrap();
        }
        storage.update_leaves();
        let basis = DepthRecordingBasis(Cell::new(0));
        let op = EvaluationTransposed::new(&storage, &basis);
        let visited = op.affected_basis_functions(&[1.0]);
        assert_eq!(visited.len(), crate::storage::MAX_LEVEL as usize);
        assert_eq!(basis.0.get(), crate::storage::MAX_LEVEL);
    }

    #[test]
    fn check_gaps_terminate_descent()
    {
        let mut storage = regular_grid(2, 4);
        let removed: Vec<usize> = (0..storage.len()).filter(|&seq| storage.point(seq).level[0] == 2 && storage.point(seq).index[0] == 1).collect();
        let keep: IndexSet<usize> = (0..storage.len()).filter(|seq| !removed.contains(seq)).collect();
        storage.remove(&keep).unwrap();
        let op = EvaluationTransposed::new(&storage, &LinearBasis);
        let point = [0.2, 0.3];
        let mut result = vec![0.0; storage.len()];
        op.eval(&point, 1.0, &mut result);
        // children below the gap are unreachable and receive nothing
        let unit = storage.bounding_box().to_unit_coordinate(&point);
        for seq in 0..storage.len()
        {
            let p = storage.point(seq);
            if p.level[0] >= 3 && p.index[0] < (1 << (p.level[0] - 1))
            {
                assert_eq!(result[seq], 0.0);
            }
            else
            {
                let expected: f64 = (0..2).map(|d| LinearBasis.eval(p.level[d] as u32, p.index[d], unit[d])).product();
                assert!((result[seq] - expected).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn check_affected_basis_functions_are_the_support()
    {
        let storage = regular_grid(2, 5);
        let op = EvaluationTransposed::new(&storage, &LinearBasis);
        let point = [0.3, 0.8];
        let affected = op.affected_basis_functions(&point);
        let expected = brute_force(&storage, &LinearBasis, &point);
        let nonzero: Vec<usize> = expected.iter().enumerate().filter(|(_, e)| **e > 0.0).map(|(i, _)| i).collect();
        for seq in &nonzero
        {
            assert!(affected.iter().any(|(s, _)| s == seq));
        }
        for (seq, value) in affected
        {
            assert!((expected[seq] - value).abs() < 1e-14);
        }
    }

    #[test]
    fn check_f32_accumulator()
    {
        let storage = regular_grid(2, 3);
        let op = EvaluationTransposed::new(&storage, &LinearBasis);
        let mut result = vec![0.0_f32; storage.len()];
        op.eval(&[0.25, 0.75], 2.0_f32, &mut result);
        let expected = brute_force(&storage, &LinearBasis, &[0.25, 0.75]);
        for (r, e) in result.iter().zip(&expected)
        {
            assert!((*r as f64 - 2.0 * e).abs() < 1e-6);
        }
    }
}
