use std::hash::{Hash, Hasher};
use bitfield_struct::bitfield;
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::SGError;

///
/// Deepest level that can be addressed by a `u32` index. The per-dimension
/// source index used by the tree descent reserves one bit per level below
/// the root, so this is also the bound on descent depth.
///
pub const MAX_LEVEL: u32 = u32::BITS - 1;

#[bitfield(u8)]
#[derive(Serialize, Deserialize, PartialEq, Eq)]
pub struct GridPointFlags
{
    pub is_leaf: bool,
    #[bits(7)]
    __: u8
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct GridPoint
{
    pub level: Vec<u8>,
    pub index: Vec<u32>,
    pub(crate) flags: GridPointFlags,
}

impl Hash for GridPoint
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.level.hash(state);
        self.index.hash(state);
    }
}

impl PartialEq for GridPoint
{
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.index == other.index
    }
}
impl Eq for GridPoint{}

impl GridPoint
{
    pub fn new(level: &[u8], index: &[u32], is_leaf: bool) -> Self
    {
        Self { level: level.to_vec(), index: index.to_vec(), flags: GridPointFlags::new().with_is_leaf(is_leaf) }
    }

    ///
    /// The point with level 1 and index 1 in every dimension (center of the unit cube).
    ///
    pub fn root(num_inputs: usize) -> Self
    {
        Self::new(&vec![1; num_inputs], &vec![1; num_inputs], false)
    }

    #[inline]
    pub fn num_inputs(&self) -> usize
    {
        self.level.len()
    }
    pub fn level_sum(&self) -> u32
    {
        self.level.iter().map(|&l| l as u32).sum()
    }

    pub fn left_child(&self, dim: usize) -> GridPoint
    {
        let mut r = self.clone();
        if r.index[dim] == 0
        {
            r.index[dim] = u32::MAX;
            return r;
        }
        r.index[dim] = 2*self.index[dim] - 1;
        r.level[dim] += 1;
        r
    }
    pub fn right_child(&self, dim: usize) -> GridPoint
    {
        let mut r = self.clone();
        r.index[dim] = 2*self.index[dim] + 1;
        r.level[dim] += 1;
        r
    }

    ///
    /// Checks that every (level, index) pair addresses an existing node of the
    /// hierarchical 1-D grid: odd indices below `2^level` for `level > 0`, and
    /// 0 or 1 for the boundary level.
    ///
    pub fn validate(&self) -> Result<(), SGError>
    {
        if self.level.len() != self.index.len()
        {
            return Err(SGError::DimensionMismatch);
        }
        for (&l, &i) in self.level.iter().zip(&self.index)
        {
            if l as u32 > MAX_LEVEL
            {
                return Err(SGError::InvalidLevel);
            }
            let valid = if l == 0 { i <= 1 } else { i % 2 == 1 && (i as u64) < (1_u64 << l) };
            if !valid
            {
                return Err(SGError::InvalidIndex);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox
{
    pub lower: Vec<f64>,
    pub upper: Vec<f64>
}

impl BoundingBox
{
    #[inline]
    pub fn new(lower: &[f64], upper: &[f64]) -> Self
    {
        Self { lower: lower.to_vec(), upper: upper.to_vec() }
    }
    ///
    /// Unit cube in `num_inputs` dimensions.
    ///
    pub fn with_dim(num_inputs: usize) -> Self
    {
        Self { lower: vec![0.0; num_inputs], upper: vec![1.0; num_inputs] }
    }
    #[inline]
    pub fn num_inputs(&self) -> usize
    {
        self.lower.len()
    }
    #[inline]
    pub fn width(&self, dim: usize) -> f64
    {
        self.upper[dim] - self.lower[dim]
    }

    ///
    /// Bounds are inclusive on both sides. NaN is never contained.
    ///
    #[inline]
    pub fn contains_coordinate(&self, dim: usize, x: f64) -> bool
    {
        x >= self.lower[dim] && x <= self.upper[dim]
    }
    #[inline]
    pub fn contains(&self, point: &[f64]) -> bool
    {
        point.iter().enumerate().all(|(d, &x)| self.contains_coordinate(d, x))
    }
    #[inline]
    pub fn to_unit_coordinate_in_dim(&self, dim: usize, x: f64) -> f64
    {
        (x - self.lower[dim]) / self.width(dim)
    }
    #[inline]
    pub fn to_unit_coordinate(&self, point: &[f64]) -> Vec<f64>
    {
        point.iter().enumerate().map(|(d, &x)| self.to_unit_coordinate_in_dim(d, x)).collect()
    }
    #[inline]
    pub fn to_real_coordinate_in_place(&self, point: &mut [f64])
    {
        for (d, x) in point.iter_mut().enumerate()
        {
            *x = self.lower[d] + self.width(d) * *x;
        }
    }
}

///
/// Grid storage: points are kept as flat level/index arrays ordered by
/// sequence number, with a hash map from point to sequence number. The map
/// is not serialized and must be rebuilt with [`SparseGridData::generate_map`]
/// after deserialization.
///
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SparseGridData
{
    pub(crate) bounding_box: BoundingBox,
    pub(crate) index: Vec<u32>,
    pub(crate) level: Vec<u8>,
    pub(crate) flags: Vec<GridPointFlags>,
    pub(crate) num_inputs: usize,
    #[serde(skip)]
    pub(crate) map: FxHashMap<GridPoint, u32>,
}

impl SparseGridData
{
    pub fn new(num_inputs: usize) -> Self
    {
        Self { bounding_box: BoundingBox::with_dim(num_inputs), index: Vec::new(), level: Vec::new(), flags: Vec::new(), num_inputs, map: FxHashMap::default() }
    }
    #[inline]
    pub fn num_inputs(&self) -> usize
    {
        self.num_inputs
    }
    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.flags.is_empty()
    }
    #[inline]
    pub fn len(&self) -> usize
    {
        self.flags.len()
    }

    #[inline]
    pub fn point(&self, seq: usize) -> GridPoint
    {
        let range = seq*self.num_inputs..(seq+1)*self.num_inputs;
        GridPoint { level: self.level[range.clone()].to_vec(), index: self.index[range].to_vec(), flags: self.flags[seq] }
    }
    #[inline]
    pub fn index(&self, seq: usize, dim: usize) -> u32
    {
        self.index[self.num_inputs*seq + dim]
    }
    #[inline(always)]
    pub fn level(&self, seq: usize, dim: usize) -> u8
    {
        self.level[self.num_inputs*seq + dim]
    }
    #[inline]
    pub fn is_leaf(&self, seq: usize) -> bool
    {
        self.flags[seq].is_leaf()
    }
    ///
    /// Deepest level of any point in any dimension.
    ///
    pub fn max_level(&self) -> u8
    {
        *self.level.iter().max().unwrap_or(&0)
    }

    #[inline]
    pub fn bounding_box(&self) -> &BoundingBox
    {
        &self.bounding_box
    }
    pub fn set_bounding_box(&mut self, bounding_box: BoundingBox) -> Result<(), SGError>
    {
        if bounding_box.num_inputs() != self.num_inputs || bounding_box.upper.len() != self.num_inputs
        {
            return Err(SGError::DimensionMismatch);
        }
        // every dimension needs a finite, non-empty extent
        if !bounding_box.lower.iter().zip(&bounding_box.upper).all(|(&lo, &hi)| lo.is_finite() && hi.is_finite() && lo < hi)
        {
            return Err(SGError::InvalidBoundingBox);
        }
        self.bounding_box = bounding_box;
        Ok(())
    }

    ///
    /// Appends a point and returns its sequence number. A point that is
    /// already stored keeps its sequence number. Leaf flags of neighbouring
    /// points are not touched; call [`SparseGridData::update_leaves`] after a
    /// batch of insertions.
    ///
    pub fn insert_point(&mut self, point: GridPoint) -> Result<usize, SGError>
    {
        if point.num_inputs() != self.num_inputs
        {
            return Err(SGError::DimensionMismatch);
        }
        point.validate()?;
        if let Some(seq) = self.index_of(&point)
        {
            return Ok(seq);
        }
        let seq = self.flags.len();
        self.flags.push(point.flags);
        self.index.extend_from_slice(&point.index);
        self.level.extend_from_slice(&point.level);
        self.map.insert(point, seq as u32);
        Ok(seq)
    }

    ///
    /// Overwrites the point stored at `seq`. Fails if `point` is already
    /// stored under another sequence number.
    ///
    pub fn update(&mut self, point: GridPoint, seq: usize) -> Result<(), SGError>
    {
        if seq >= self.len()
        {
            return Err(SGError::InvalidIndex);
        }
        if point.num_inputs() != self.num_inputs
        {
            return Err(SGError::DimensionMismatch);
        }
        point.validate()?;
        // a point may only be stored once
        if self.index_of(&point).is_some_and(|existing| existing != seq)
        {
            return Err(SGError::DuplicatePoint);
        }
        let old = self.point(seq);
        self.map.remove(&old);
        let range = seq*self.num_inputs..(seq+1)*self.num_inputs;
        self.index[range.clone()].copy_from_slice(&point.index);
        self.level[range].copy_from_slice(&point.level);
        self.flags[seq] = point.flags;
        self.map.insert(point, seq as u32);
        Ok(())
    }

    pub fn clear(&mut self)
    {
        self.index.clear();
        self.level.clear();
        self.flags.clear();
        self.map.clear();
    }

    ///
    /// Sequence number of `point`, or `None` if it is not part of the grid.
    ///
    #[inline]
    pub fn index_of(&self, point: &GridPoint) -> Option<usize>
    {
        self.map.get(point).map(|&v| v as usize)
    }

    pub fn generate_map(&mut self)
    {
        let mut map = FxHashMap::default();
        map.reserve(self.len());
        for seq in 0..self.len()
        {
            map.insert(self.point(seq), seq as u32);
        }
        self.map = map;
    }
    #[inline]
    pub fn map_initialized(&self) -> bool
    {
        self.len() == self.map.len()
    }

    ///
    /// Keeps only the points in `points_to_keep`, renumbered in the order of
    /// the set. Leaf flags are recomputed.
    ///
    pub fn remove(&mut self, points_to_keep: &IndexSet<usize>) -> Result<(), SGError>
    {
        let mut indices = Vec::with_capacity(points_to_keep.len()*self.num_inputs);
        let mut levels = Vec::with_capacity(points_to_keep.len()*self.num_inputs);
        let mut flags = Vec::with_capacity(points_to_keep.len());
        for &i in points_to_keep
        {
            if i >= self.len()
            {
                return Err(SGError::InvalidIndex);
            }
            indices.extend_from_slice(&self.index[i*self.num_inputs..(i+1)*self.num_inputs]);
            levels.extend_from_slice(&self.level[i*self.num_inputs..(i+1)*self.num_inputs]);
            flags.push(self.flags[i]);
        }
        tracing::debug!(removed = self.len() - points_to_keep.len(), remaining = points_to_keep.len(), "removing grid points");
        self.index = indices;
        self.level = levels;
        self.flags = flags;
        self.generate_map();
        self.update_leaves();
        Ok(())
    }

    ///
    /// A point is a leaf if it has no child in any dimension.
    ///
    pub fn update_leaves(&mut self)
    {
        for seq in 0..self.len()
        {
            let point = self.point(seq);
            let mut is_leaf = true;
            for dim in 0..self.num_inputs
            {
                let has_child = if point.level[dim] > 0
                {
                    self.map.contains_key(&point.left_child(dim)) || self.map.contains_key(&point.right_child(dim))
                }
                else
                {
                    let mut child = point.clone();
                    child.level[dim] = 1;
                    child.index[dim] = 1;
                    self.map.contains_key(&child)
                };
                if has_child
                {
                    is_leaf = false;
                    break;
                }
            }
            self.flags[seq].set_is_leaf(is_leaf);
        }
    }

    pub fn unit_coordinate(&self, seq: usize) -> Vec<f64>
    {
        (0..self.num_inputs).map(|d| self.index(seq, d) as f64 / (1_u64 << self.level(seq, d)) as f64).collect()
    }

    ///
    /// Return the nodes in the grid...
    ///
    pub fn nodes(&self) -> NodeIterator<'_>
    {
        NodeIterator { storage: self, current_seq: 0 }
    }

    ///
    /// Return the real coordinates for each node...
    ///
    pub fn points(&self) -> PointIterator<'_>
    {
        PointIterator { storage: self, current_seq: 0 }
    }
}

pub struct NodeIterator<'a> {
    storage: &'a SparseGridData,
    current_seq: usize,
}

impl Iterator for NodeIterator<'_> {
    type Item = GridPoint;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_seq < self.storage.len() {
            self.current_seq += 1;
            Some(self.storage.point(self.current_seq - 1))
        } else {
            None
        }
    }
}

pub struct PointIterator<'a> {
    storage: &'a SparseGridData,
    current_seq: usize,
}

impl Iterator for PointIterator<'_> {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_seq < self.storage.len() {
            let mut point = self.storage.unit_coordinate(self.current_seq);
            self.storage.bounding_box.to_real_coordinate_in_place(&mut point);
            self.current_seq += 1;
            Some(point)
        } else {
            None
        }
    }
}

#[test]
fn check_insert_and_lookup()
{
    let mut storage = SparseGridData::new(2);
    let root = GridPoint::root(2);
    assert_eq!(storage.insert_point(root.clone()).unwrap(), 0);
    let child = root.right_child(1);
    assert_eq!(storage.insert_point(child.clone()).unwrap(), 1);
    // inserting twice keeps the first sequence number
    assert_eq!(storage.insert_point(child.clone()).unwrap(), 1);
    assert_eq!(storage.len(), 2);
    assert_eq!(storage.index_of(&child), Some(1));
    assert_eq!(storage.index_of(&root.left_child(0)), None);
    storage.update_leaves();
    assert!(!storage.is_leaf(0));
    assert!(storage.is_leaf(1));
    assert_eq!(storage.unit_coordinate(1), vec![0.5, 0.75]);
}

#[test]
fn check_invalid_points_are_rejected()
{
    let mut storage = SparseGridData::new(1);
    assert_eq!(storage.insert_point(GridPoint::new(&[2], &[2], false)), Err(SGError::InvalidIndex));
    assert_eq!(storage.insert_point(GridPoint::new(&[1], &[3], false)), Err(SGError::InvalidIndex));
    assert_eq!(storage.insert_point(GridPoint::new(&[32], &[1], false)), Err(SGError::InvalidLevel));
    assert_eq!(storage.insert_point(GridPoint::new(&[1, 1], &[1, 1], false)), Err(SGError::DimensionMismatch));
    assert!(storage.is_empty());
}

#[test]
fn check_remove_renumbers_and_updates_leaves()
{
    let mut storage = SparseGridData::new(1);
    let root = GridPoint::root(1);
    storage.insert_point(root.clone()).unwrap();
    storage.insert_point(root.left_child(0)).unwrap();
    storage.insert_point(root.right_child(0)).unwrap();
    storage.update_leaves();
    assert!(!storage.is_leaf(0));

    let keep: IndexSet<usize> = [2, 0].into_iter().collect();
    storage.remove(&keep).unwrap();
    assert_eq!(storage.len(), 2);
    assert_eq!(storage.index_of(&root.right_child(0)), Some(0));
    assert_eq!(storage.index_of(&root), Some(1));
    assert_eq!(storage.index_of(&root.left_child(0)), None);
    assert!(storage.is_leaf(0));
    assert!(!storage.is_leaf(1));
}

#[test]
fn check_bounding_box_is_inclusive()
{
    let bbox = BoundingBox::new(&[-1.0, 2.0], &[1.0, 4.0]);
    assert!(bbox.contains(&[1.0, 4.0]));
    assert!(bbox.contains(&[-1.0, 2.0]));
    assert!(!bbox.contains(&[1.0 + 1e-12, 3.0]));
    assert!(!bbox.contains_coordinate(0, f64::NAN));
    assert_eq!(bbox.to_unit_coordinate(&[1.0, 3.0]), vec![1.0, 0.5]);
    let mut x = [0.5, 0.25];
    bbox.to_real_coordinate_in_place(&mut x);
    assert_eq!(x, [0.0, 2.5]);
}

#[test]
fn check_nodes_follow_sequence_order()
{
    let mut storage = SparseGridData::new(2);
    storage.insert_point(GridPoint::root(2)).unwrap();
    storage.insert_point(GridPoint::new(&[2, 1], &[3, 1], false)).unwrap();
    let nodes: Vec<GridPoint> = storage.nodes().collect();
    assert_eq!(nodes, vec![GridPoint::root(2), GridPoint::new(&[2, 1], &[3, 1], false)]);
    assert_eq!(nodes[1].level_sum(), 3);
    assert_eq!(storage.max_level(), 2);
}

#[test]
fn check_update_rejects_duplicate_points()
{
    let mut storage = SparseGridData::new(1);
    let root = GridPoint::root(1);
    storage.insert_point(root.clone()).unwrap();
    storage.insert_point(root.left_child(0)).unwrap();
    storage.insert_point(root.right_child(0)).unwrap();
    storage.update_leaves();

    // moving the left child onto the right child's slot would store it twice
    assert_eq!(storage.update(root.left_child(0), 2), Err(SGError::DuplicatePoint));
    assert_eq!(storage.index_of(&root.left_child(0)), Some(1));
    assert_eq!(storage.index_of(&root.right_child(0)), Some(2));
    assert!(storage.map_initialized());

    // rewriting a point in its own slot is fine
    storage.update(root.left_child(0), 1).unwrap();
    let replacement = root.left_child(0).left_child(0);
    storage.update(replacement.clone(), 1).unwrap();
    assert_eq!(storage.index_of(&replacement), Some(1));
    assert_eq!(storage.index_of(&root.left_child(0)), None);
    assert!(storage.map_initialized());

    storage.generate_map();
    storage.update_leaves();
    let visited = crate::algorithms::evaluation_transposed::EvaluationTransposed::new(&storage, &crate::basis::linear::LinearBasis)
        .affected_basis_functions(&[0.75]);
    assert_eq!(visited.iter().map(|&(seq, _)| seq).collect::<Vec<_>>(), vec![0, 2]);
}

#[test]
fn check_degenerate_bounding_boxes_are_rejected()
{
    let mut storage = SparseGridData::new(2);
    assert_eq!(storage.set_bounding_box(BoundingBox::new(&[0.0, 1.0], &[1.0, 1.0])), Err(SGError::InvalidBoundingBox));
    assert_eq!(storage.set_bounding_box(BoundingBox::new(&[0.0, 2.0], &[1.0, 1.0])), Err(SGError::InvalidBoundingBox));
    assert_eq!(storage.set_bounding_box(BoundingBox::new(&[0.0, f64::NAN], &[1.0, 1.0])), Err(SGError::InvalidBoundingBox));
    assert_eq!(storage.set_bounding_box(BoundingBox::new(&[0.0], &[1.0])), Err(SGError::DimensionMismatch));
    assert_eq!(storage.bounding_box(), &BoundingBox::with_dim(2));
    storage.set_bounding_box(BoundingBox::new(&[-1.0, 1.0], &[1.0, 1.5])).unwrap();
}
