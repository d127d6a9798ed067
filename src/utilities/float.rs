use std::{fmt::Debug, ops::AddAssign};

///
/// Scalar type used for coefficients and accumulators. Basis functions are
/// always evaluated in `f64`; this trait provides the (infallible) conversion
/// into the accumulator type.
///
pub trait Float : num_traits::Float + AddAssign + Debug + Send + Sync + 'static
{
    fn from_f64(value: f64) -> Self;
    fn as_f64(self) -> f64;
}

impl Float for f64
{
    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline(always)]
    fn as_f64(self) -> f64 {
        self
    }
}

impl Float for f32
{
    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline(always)]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

#[test]
fn check_f32_round_trip_precision()
{
    let x = <f32 as Float>::from_f64(0.1);
    assert!((x.as_f64() - 0.1).abs() < 1e-7);
    assert_eq!(<f64 as Float>::from_f64(0.1), 0.1);
}
