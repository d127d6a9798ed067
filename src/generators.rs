use crate::{errors::SGError, storage::{GridPoint, SparseGridData, MAX_LEVEL}};

fn check_level(level: usize) -> Result<(), SGError>
{
    if level == 0 || level > MAX_LEVEL as usize
    {
        return Err(SGError::InvalidLevel);
    }
    Ok(())
}

///
/// Builds the grid dimension by dimension: first all points of the 1-D grid
/// in dimension 0, then every existing point is expanded in dimension `d`
/// over all levels `l` for which `accept(point, d, l)` holds. The first
/// expansion of each point overwrites it in place.
///
fn generate_iterative<F: Fn(&GridPoint, usize, u32) -> bool>(storage: &mut SparseGridData, first_level: u32, accept: F) -> Result<(), SGError>
{
    let num_inputs = storage.num_inputs();
    storage.clear();
    let mut point = GridPoint::root(num_inputs);
    for l in 1..=first_level
    {
        for i in (1..(1_u32 << l)).step_by(2)
        {
            point.level[0] = l as u8;
            point.index[0] = i;
            storage.insert_point(point.clone())?;
        }
    }
    // loop dim times over intermediate grid, take all grid points and
    // modify them in current dimension d
    for d in 1..num_inputs
    {
        let ngrids = storage.len();
        for g in 0..ngrids
        {
            let mut first = true;
            let base = storage.point(g);
            let mut point = base.clone();
            let mut l = 1;
            while accept(&base, d, l)
            {
                for i in (1..(1_u32 << l)).step_by(2)
                {
                    point.level[d] = l as u8;
                    point.index[d] = i;
                    if first
                    {
                        storage.update(point.clone(), g)?;
                        first = false;
                    }
                    else
                    {
                        storage.insert_point(point.clone())?;
                    }
                }
                l += 1;
            }
        }
    }
    storage.update_leaves();
    Ok(())
}

///
/// Generates a regular sparse grid without boundary points. `levels[d]` is the
/// maximum level in dimension `d` and the level sum of every point is bounded
/// by `max(levels) + num_inputs - 1`, so the result does not depend on the
/// order of the dimensions. Any previous content of `storage` is discarded.
///
pub fn regular(storage: &mut SparseGridData, levels: &[usize]) -> Result<(), SGError>
{
    let num_inputs = storage.num_inputs();
    if levels.len() != num_inputs || num_inputs == 0
    {
        return Err(SGError::DimensionMismatch);
    }
    for &level in levels
    {
        check_level(level)?;
    }
    let max_level_sum = levels.iter().max().copied().unwrap_or(1) as u32 + num_inputs as u32 - 1;
    generate_iterative(storage, levels[0] as u32, |point, d, l|
    {
        // the point still has level 1 in dimension d
        let level_sum = point.level_sum() - 1;
        l <= levels[d] as u32 && l + level_sum <= max_level_sum
    })?;
    tracing::debug!(num_inputs, ?levels, num_points = storage.len(), "generated regular sparse grid");
    Ok(())
}

///
/// Generates a full grid of level `level` in every dimension, without boundary points.
/// Any previous content of `storage` is discarded.
///
pub fn full(storage: &mut SparseGridData, level: usize) -> Result<(), SGError>
{
    if storage.num_inputs() == 0
    {
        return Err(SGError::DimensionMismatch);
    }
    check_level(level)?;
    let n = level as u32;
    generate_iterative(storage, n, |_, _, l| l <= n)?;
    tracing::debug!(num_inputs = storage.num_inputs(), level, num_points = storage.len(), "generated full grid");
    Ok(())
}

#[test]
fn check_regular_grid_size()
{
    // number of points of a regular sparse grid without boundary
    let mut storage = SparseGridData::new(2);
    regular(&mut storage, &[3, 3]).unwrap();
    assert_eq!(storage.len(), 17);
    regular(&mut storage, &[4, 4]).unwrap();
    assert_eq!(storage.len(), 49);
    let mut storage = SparseGridData::new(3);
    regular(&mut storage, &[3, 3, 3]).unwrap();
    assert_eq!(storage.len(), 31);
    for seq in 0..storage.len()
    {
        assert!(storage.point(seq).level_sum() <= 3 + 2);
    }
}

#[test]
fn check_anisotropic_grid_is_order_independent()
{
    let mut storage = SparseGridData::new(2);
    regular(&mut storage, &[5, 2]).unwrap();
    let mut first: Vec<(u8, u8)> = (0..storage.len()).map(|seq| (storage.level(seq, 0), storage.level(seq, 1))).collect();
    // 31 points at level 1 in dimension 1, 15 * 2 points at level 2
    assert_eq!(storage.len(), 61);
    regular(&mut storage, &[2, 5]).unwrap();
    assert_eq!(storage.len(), 61);
    let mut second: Vec<(u8, u8)> = (0..storage.len()).map(|seq| (storage.level(seq, 1), storage.level(seq, 0))).collect();
    first.sort();
    second.sort();
    assert_eq!(first, second);
    assert!(first.iter().all(|&(a, b)| a <= 5 && b <= 2 && a + b <= 6));
}

#[test]
fn check_full_grid_size_and_leaves()
{
    let level = 4;
    let mut storage = SparseGridData::new(2);
    full(&mut storage, level).unwrap();
    assert_eq!(storage.len(), (2_usize.pow(level as u32) - 1).pow(2));
    assert_eq!(storage.max_level(), level as u8);
    for seq in 0..storage.len()
    {
        let point = storage.point(seq);
        let finest = point.level.iter().all(|&l| l as usize == level);
        assert_eq!(storage.is_leaf(seq), finest);
    }
}

#[test]
fn check_invalid_levels()
{
    let mut storage = SparseGridData::new(2);
    assert_eq!(regular(&mut storage, &[0, 2]), Err(SGError::InvalidLevel));
    assert_eq!(regular(&mut storage, &[2]), Err(SGError::DimensionMismatch));
    assert_eq!(full(&mut storage, 32), Err(SGError::InvalidLevel));
}
