///
/// One-dimensional hierarchical basis. Evaluation must be a pure function
/// of `(level, index, x)` with `x` given in unit coordinates.
///
pub trait Basis
{
    fn eval(&self, level: u32, index: u32, x: f64) -> f64;
}
