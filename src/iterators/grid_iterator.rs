use crate::storage::{GridPoint, SparseGridData, MAX_LEVEL};

///
/// Stateful cursor over a grid storage. The cursor always sits on a
/// (level, index) position per dimension; that position may or may not be a
/// stored grid point, which is reported through `index()`.
///
pub trait GridIteratorT
{
    fn point(&self) -> &GridPoint;
    ///
    /// Sequence number of the current position, `None` if no grid point is stored there.
    ///
    fn index(&self) -> Option<usize>;
    fn level_and_index(&self, dim: usize) -> (u8, u32);
    fn reset_to_level_one(&mut self, dim: usize) -> bool;
    fn left_child(&mut self, dim: usize) -> bool;
    fn right_child(&mut self, dim: usize) -> bool;
    ///
    /// True if the current point has no children in any dimension, or if the
    /// current position is not a grid point.
    ///
    fn is_leaf(&self) -> bool;
}

pub struct HashMapGridIterator<'a>
{
    pub(crate) storage: &'a SparseGridData,
    point: GridPoint,
    seq: Option<usize>,
}

impl<'a> HashMapGridIterator<'a>
{
    ///
    /// Creates a cursor positioned at level 1 in every dimension.
    ///
    pub fn new(storage: &'a SparseGridData) -> Self
    {
        let point = GridPoint::root(storage.num_inputs());
        let seq = storage.index_of(&point);
        Self { storage, point, seq }
    }
}

impl GridIteratorT for HashMapGridIterator<'_>
{
    #[inline(always)]
    fn point(&self) -> &GridPoint
    {
        &self.point
    }

    #[inline(always)]
    fn index(&self) -> Option<usize>
    {
        self.seq
    }

    #[inline(always)]
    fn level_and_index(&self, dim: usize) -> (u8, u32)
    {
        (self.point.level[dim], self.point.index[dim])
    }

    fn reset_to_level_one(&mut self, dim: usize) -> bool
    {
        self.point.level[dim] = 1;
        self.point.index[dim] = 1;
        self.seq = self.storage.index_of(&self.point);
        self.seq.is_some()
    }

    fn left_child(&mut self, dim: usize) -> bool
    {
        let i = self.point.index[dim];
        let l = self.point.level[dim];
        if i == 0 || l as u32 >= MAX_LEVEL
        {
            self.seq = None;
            return false;
        }
        self.point.level[dim] = l + 1;
        self.point.index[dim] = 2 * i - 1;
        self.seq = self.storage.index_of(&self.point);
        self.seq.is_some()
    }

    fn right_child(&mut self, dim: usize) -> bool
    {
        let i = self.point.index[dim];
        let l = self.point.level[dim];
        if l as u32 >= MAX_LEVEL
        {
            self.seq = None;
            return false;
        }
        self.point.level[dim] = l + 1;
        self.point.index[dim] = 2 * i + 1;
        self.seq = self.storage.index_of(&self.point);
        self.seq.is_some()
    }

    fn is_leaf(&self) -> bool
    {
        match self.seq
        {
            Some(seq) => self.storage.is_leaf(seq),
            None => true,
        }
    }
}

#[test]
fn check_cursor_navigation()
{
    use crate::generators;
    let mut storage = SparseGridData::new(2);
    generators::full(&mut storage, 2).unwrap();
    let mut iterator = HashMapGridIterator::new(&storage);
    assert!(iterator.index().is_some());
    assert!(!iterator.is_leaf());

    assert!(iterator.left_child(0));
    assert_eq!(iterator.level_and_index(0), (2, 1));
    assert!(iterator.right_child(1));
    assert_eq!(iterator.point().level, vec![2, 2]);
    assert_eq!(iterator.point().index, vec![1, 3]);
    assert!(iterator.is_leaf());

    // below the finest level there is nothing stored
    assert!(!iterator.right_child(1));
    assert!(iterator.index().is_none());
    assert!(iterator.is_leaf());

    assert!(iterator.reset_to_level_one(1));
    assert!(iterator.reset_to_level_one(0));
    assert_eq!(iterator.point(), &GridPoint::root(2));
}
