//! 128-bit intermediate arithmetic for fixed-point rates.
//!
//! Path qualities are fixed-point ratios scaled by 10⁹; composing and
//! applying them multiplies values that overflow 64 bits, so every such
//! computation goes through [`big_divide`].

/// Rounding mode for division operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round toward zero (truncate).
    Down,
    /// Round away from zero (ceiling for positive results).
    Up,
}

/// Error type for math operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    /// The result overflows the target type.
    #[error("overflow in 128-bit arithmetic")]
    Overflow,
    /// Division by zero was attempted.
    #[error("division by zero")]
    DivisionByZero,
    /// An input was negative where non-negative was required.
    #[error("negative input where non-negative required")]
    NegativeInput,
}

/// Calculates `a * b / c` when `a * b` might overflow 64 bits.
///
/// Uses 128-bit intermediate arithmetic. All inputs must be non-negative
/// and `c` must be positive.
pub fn big_divide(a: i64, b: i64, c: i64, rounding: Rounding) -> Result<i64, MathError> {
    if a < 0 || b < 0 {
        return Err(MathError::NegativeInput);
    }
    if c <= 0 {
        return Err(MathError::DivisionByZero);
    }

    let result = big_divide_unsigned(a as u64, b as u64, c as u64, rounding)?;

    if result > i64::MAX as u64 {
        return Err(MathError::Overflow);
    }

    Ok(result as i64)
}

/// Unsigned variant of [`big_divide`].
pub fn big_divide_unsigned(a: u64, b: u64, c: u64, rounding: Rounding) -> Result<u64, MathError> {
    if c == 0 {
        return Err(MathError::DivisionByZero);
    }

    let product = a as u128 * b as u128;
    let c128 = c as u128;

    let result = match rounding {
        Rounding::Down => product / c128,
        Rounding::Up => {
            let adjusted = product.checked_add(c128 - 1).ok_or(MathError::Overflow)?;
            adjusted / c128
        }
    };

    if result > u64::MAX as u128 {
        return Err(MathError::Overflow);
    }

    Ok(result as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_divide_basic() {
        assert_eq!(
            big_divide(1_000_000_000, 1_000_000, 1000, Rounding::Down),
            Ok(1_000_000_000_000)
        );
    }

    #[test]
    fn test_big_divide_rounding() {
        assert_eq!(big_divide(10, 10, 3, Rounding::Down), Ok(33));
        assert_eq!(big_divide(10, 10, 3, Rounding::Up), Ok(34));
        // Exact division is unaffected by mode.
        assert_eq!(big_divide(10, 9, 3, Rounding::Up), Ok(30));
    }

    #[test]
    fn test_big_divide_rejects_bad_inputs() {
        assert_eq!(
            big_divide(-1, 1, 1, Rounding::Down),
            Err(MathError::NegativeInput)
        );
        assert_eq!(
            big_divide(1, 1, 0, Rounding::Down),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn test_big_divide_overflow() {
        assert_eq!(
            big_divide(i64::MAX, i64::MAX, 1, Rounding::Down),
            Err(MathError::Overflow)
        );
        // Large intermediates that divide back into range are fine.
        assert_eq!(
            big_divide(i64::MAX, 1_000, 1_000, Rounding::Down),
            Ok(i64::MAX)
        );
    }
}
