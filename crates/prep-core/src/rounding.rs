/// Default number of significant digits kept for index values and spendings.
pub const DEFAULT_SIGNIFICANT_DIGITS: u32 = 3;

/// Round `x` to `n` significant decimal digits.
///
/// Zero (and any non-finite value) is returned unchanged. Otherwise `x` is
/// rounded to `n - 1 - floor(log10 |x|)` decimal places. Rounding works on
/// the exact decimal expansion of `x`, and only exact ties go to the even
/// neighbour, so `97.45` (stored slightly above the tie) becomes `97.5`
/// while `102.5` becomes `102`.
///
/// # Examples
///
/// ```
/// use prep_core::rounding::round_to_n;
///
/// assert_eq!(round_to_n(102.5, 3), 102.0);
/// assert_eq!(round_to_n(97.45, 3), 97.5);
/// assert_eq!(round_to_n(1234.5, 3), 1230.0);
/// assert_eq!(round_to_n(0.0, 3), 0.0);
/// assert_eq!(round_to_n(-0.012345, 2), -0.012);
/// ```
pub fn round_to_n(x: f64, n: u32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let n = n.max(1) as usize;
    let magnitude = x.abs().log10().floor() as i64;
    let decimals = n as i64 - 1 - magnitude;

    // Precision formatting is exact, so the digit string is rounded once.
    let text = if decimals >= 0 {
        format!("{:.*}", decimals as usize, x)
    } else {
        format!("{:.*e}", n - 1, x)
    };
    text.parse().unwrap_or(x)
}
