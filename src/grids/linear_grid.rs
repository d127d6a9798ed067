use serde::{Deserialize, Serialize};

use crate::algorithms::{basis_evaluation::BasisEvaluation, evaluation_transposed::EvaluationTransposed, multiple_evaluation::MultipleEvaluation};
use crate::basis::linear::LinearBasis;
use crate::config::MultipleEvalOptions;
use crate::errors::SGError;
use crate::generators;
use crate::serialization;
use crate::storage::{BoundingBox, PointIterator, SparseGridData};

///
/// Sparse grid with piecewise linear basis functions and no boundary points,
/// together with one hierarchical surplus per grid point.
///
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearGrid
{
    pub(crate) storage: SparseGridData,
    pub(crate) alpha: Vec<f64>,
}

impl LinearGrid
{
    pub fn new(num_inputs: usize) -> Self
    {
        Self { storage: SparseGridData::new(num_inputs), alpha: Vec::new() }
    }

    pub fn storage(&self) -> &SparseGridData
    {
        &self.storage
    }

    pub fn num_inputs(&self) -> usize
    {
        self.storage.num_inputs()
    }

    pub fn len(&self) -> usize
    {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.storage.is_empty()
    }

    pub fn bounding_box(&self) -> &BoundingBox
    {
        self.storage.bounding_box()
    }

    pub fn set_bounding_box(&mut self, bounding_box: BoundingBox) -> Result<(), SGError>
    {
        self.storage.set_bounding_box(bounding_box)
    }

    pub fn sparse_grid(&mut self, levels: &[usize]) -> Result<(), SGError>
    {
        generators::regular(&mut self.storage, levels)?;
        self.alpha = vec![0.0; self.len()];
        Ok(())
    }

    pub fn full_grid(&mut self, level: usize) -> Result<(), SGError>
    {
        generators::full(&mut self.storage, level)?;
        self.alpha = vec![0.0; self.len()];
        Ok(())
    }

    ///
    /// Real coordinates of the grid points in sequence order.
    ///
    pub fn points(&self) -> PointIterator<'_>
    {
        self.storage.points()
    }

    pub fn alpha(&self) -> &[f64]
    {
        &self.alpha
    }

    pub fn set_alpha(&mut self, alpha: Vec<f64>) -> Result<(), SGError>
    {
        if alpha.len() != self.len()
        {
            return Err(SGError::NumberOfPointsAndValuesMismatch);
        }
        self.alpha = alpha;
        Ok(())
    }

    pub fn interpolate(&self, x: &[f64]) -> Result<f64, SGError>
    {
        BasisEvaluation(&self.storage, &LinearBasis).eval(x, &self.alpha)
    }

    ///
    /// Adds `alpha * phi_j(x)` to `result[j]` for every basis function active at `x`.
    ///
    pub fn eval_transposed(&self, x: &[f64], alpha: f64, result: &mut [f64]) -> Result<(), SGError>
    {
        if x.len() != self.num_inputs() || result.len() != self.len()
        {
            return Err(SGError::DimensionMismatch);
        }
        EvaluationTransposed::new(&self.storage, &LinearBasis).eval(x, alpha, result);
        Ok(())
    }

    ///
    /// `B^T * source` for the row-major data points in `dataset`.
    ///
    pub fn mult_transpose(&self, dataset: &[f64], source: &[f64], options: MultipleEvalOptions) -> Result<Vec<f64>, SGError>
    {
        let mut result = vec![0.0; self.len()];
        MultipleEvaluation::new(&self.storage, &LinearBasis, dataset, options)?.mult_transpose(source, &mut result)?;
        Ok(result)
    }

    pub fn interpolate_batch(&self, dataset: &[f64], options: MultipleEvalOptions) -> Result<Vec<f64>, SGError>
    {
        let op = MultipleEvaluation::new(&self.storage, &LinearBasis, dataset, options)?;
        let mut result = vec![0.0; op.num_points()];
        op.mult(&self.alpha, &mut result)?;
        Ok(result)
    }

    pub fn save(&self, path: &str) -> Result<(), SGError>
    {
        serialization::save(self, path)
    }

    pub fn write_buffer(&self) -> Result<Vec<u8>, SGError>
    {
        serialization::write_buffer(self)
    }

    pub fn read_buffer(buffer: &[u8]) -> Result<Self, SGError>
    {
        let mut grid: Self = serialization::read_buffer(buffer)?;
        grid.storage.generate_map();
        Ok(grid)
    }

    pub fn read<Reader: std::io::Read>(reader: Reader) -> Result<Self, SGError>
    {
        let mut grid: Self = serialization::read(reader)?;
        grid.storage.generate_map();
        Ok(grid)
    }
}

#[test]
fn check_round_trip_preserves_evaluation()
{
    let mut grid = LinearGrid::new(2);
    grid.set_bounding_box(BoundingBox::new(&[0.0, -1.0], &[2.0, 1.0])).unwrap();
    grid.sparse_grid(&[5, 5]).unwrap();
    let alpha: Vec<f64> = (0..grid.len()).map(|i| (i % 9) as f64 * 0.25).collect();
    grid.set_alpha(alpha).unwrap();

    let buffer = grid.write_buffer().unwrap();
    let restored = LinearGrid::read_buffer(&buffer).unwrap();
    assert!(restored.storage().map_initialized());
    assert_eq!(restored.len(), grid.len());
    assert_eq!(restored.bounding_box(), grid.bounding_box());

    let x = [1.3, -0.4];
    assert_eq!(restored.interpolate(&x).unwrap(), grid.interpolate(&x).unwrap());
    let mut a = vec![0.0; grid.len()];
    let mut b = vec![0.0; grid.len()];
    grid.eval_transposed(&x, 2.0, &mut a).unwrap();
    restored.eval_transposed(&x, 2.0, &mut b).unwrap();
    assert_eq!(a, b);

    let restored = LinearGrid::read(std::io::Cursor::new(buffer)).unwrap();
    assert_eq!(restored.alpha(), grid.alpha());
}

#[test]
fn check_interpolation_reproduces_surplus_sum()
{
    // with unit surpluses f(x) is the sum of all basis values at x
    let mut grid = LinearGrid::new(2);
    grid.full_grid(3).unwrap();
    grid.set_alpha(vec![1.0; grid.len()]).unwrap();
    let points: Vec<Vec<f64>> = grid.points().collect();
    let values = grid.interpolate_batch(&points.concat(), MultipleEvalOptions::default()).unwrap();
    for (x, value) in points.iter().zip(&values)
    {
        let mut expected = vec![0.0; grid.len()];
        grid.eval_transposed(x, 1.0, &mut expected).unwrap();
        assert!((expected.iter().sum::<f64>() - value).abs() < 1e-12);
    }
    let mut wrong = vec![0.0; 3];
    assert_eq!(grid.eval_transposed(&[0.5, 0.5], 1.0, &mut wrong), Err(SGError::DimensionMismatch));
}

#[test]
fn check_mult_transpose_of_grid_points()
{
    let mut grid = LinearGrid::new(1);
    grid.full_grid(2).unwrap();
    // each grid point activates its own hat (value 1) and its ancestors
    let dataset: Vec<f64> = grid.points().flatten().collect();
    let source = vec![1.0; dataset.len()];
    let result = grid.mult_transpose(&dataset, &source, MultipleEvalOptions::serial()).unwrap();
    let root = grid.storage().index_of(&crate::storage::GridPoint::root(1)).unwrap();
    assert!((result[root] - 2.0).abs() < 1e-14);
    for (seq, value) in result.iter().enumerate()
    {
        if seq != root
        {
            assert!((value - 1.0).abs() < 1e-14);
        }
    }
}
