use super::base::Basis;

///
/// Piecewise linear hat functions. Level 0 holds the two boundary functions
/// `1 - x` (index 0) and `x` (index 1).
///
#[derive(Copy, Clone, Debug, Default)]
pub struct LinearBasis;

impl Basis for LinearBasis
{
    #[inline]
    fn eval(&self, level: u32, index: u32, x: f64) -> f64 {
        if level == 0
        {
            if index == 0
            {
                1.0 - x
            }
            else
            {
                x
            }
        }
        else
        {
            0.0_f64.max(1.0-f64::abs((1_u64 << level) as f64 * x - index as f64))
        }
    }
}

///
/// Linear hat functions whose outermost functions on each level are
/// extrapolated linearly towards the boundary instead of vanishing there.
/// Level 1 is the constant function.
///
#[derive(Copy, Clone, Debug, Default)]
pub struct ModifiedLinearBasis;

impl Basis for ModifiedLinearBasis
{
    #[inline]
    fn eval(&self, level: u32, index: u32, x: f64) -> f64 {
        if level == 1
        {
            return 1.0;
        }
        let hinv = (1_u64 << level) as f64;
        if index == 1
        {
            (2.0 - hinv * x).max(0.0)
        }
        else if index as u64 == (1_u64 << level) - 1
        {
            (hinv * x - index as f64 + 1.0).max(0.0)
        }
        else
        {
            0.0_f64.max(1.0 - (hinv * x - index as f64).abs())
        }
    }
}

#[test]
fn check_linear_hat()
{
    let basis = LinearBasis;
    assert_eq!(basis.eval(1, 1, 0.5), 1.0);
    assert_eq!(basis.eval(1, 1, 0.25), 0.5);
    assert_eq!(basis.eval(1, 1, 0.0), 0.0);
    assert_eq!(basis.eval(2, 3, 0.5), 0.0);
    assert_eq!(basis.eval(2, 3, 0.875), 0.5);
    assert_eq!(basis.eval(0, 0, 0.25), 0.75);
}

#[test]
fn check_modified_linear()
{
    let basis = ModifiedLinearBasis;
    assert_eq!(basis.eval(1, 1, 0.9), 1.0);
    // outer functions reach 2 at the boundary
    assert_eq!(basis.eval(2, 1, 0.0), 2.0);
    assert_eq!(basis.eval(2, 3, 1.0), 2.0);
    assert_eq!(basis.eval(2, 1, 0.5), 0.0);
    assert_eq!(basis.eval(3, 3, 0.375), 1.0);
    assert_eq!(basis.eval(3, 3, 0.0), 0.0);
}
