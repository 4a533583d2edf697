//! Arithmetic and conversion kernels shared by the opcode handlers.
//!
//! Integer arithmetic wraps; division and trapping truncations surface
//! the canonical trap messages. Saturating truncations lean on Rust's
//! saturating float-to-int casts, which already implement the required
//! NaN-to-zero and clamp-to-domain behavior.

use crate::error::*;

const F32_SIGN: u32 = 0x8000_0000;
const F64_SIGN: u64 = 0x8000_0000_0000_0000;

macro_rules! impl_div {
    ($div_s:ident, $div_u:ident, $rem_s:ident, $rem_u:ident, $signed:ty, $unsigned:ty) => {
        pub fn $div_s(a: $signed, b: $signed) -> Result<$signed, Error> {
            if b == 0 {
                return trap(DIVIDE_BY_ZERO);
            }
            if a == <$signed>::MIN && b == -1 {
                return trap(INTEGER_OVERFLOW);
            }
            Ok(a.wrapping_div(b))
        }
        pub fn $div_u(a: $unsigned, b: $unsigned) -> Result<$unsigned, Error> {
            if b == 0 {
                return trap(DIVIDE_BY_ZERO);
            }
            Ok(a / b)
        }
        pub fn $rem_s(a: $signed, b: $signed) -> Result<$signed, Error> {
            if b == 0 {
                return trap(DIVIDE_BY_ZERO);
            }
            Ok(a.wrapping_rem(b))
        }
        pub fn $rem_u(a: $unsigned, b: $unsigned) -> Result<$unsigned, Error> {
            if b == 0 {
                return trap(DIVIDE_BY_ZERO);
            }
            Ok(a % b)
        }
    };
}

impl_div!(i32_div_s, u32_div_u, i32_rem_s, u32_rem_u, i32, u32);
impl_div!(i64_div_s, u64_div_u, i64_rem_s, u64_rem_u, i64, u64);

/// Trapping float-to-integer truncation: NaN is an invalid conversion,
/// anything whose truncation falls outside the target domain overflows.
/// The bound compares are on the truncated value, so fractional values
/// just inside the domain edge (for example -0.9 to unsigned) pass.
macro_rules! impl_trunc {
    ($name:ident, $float:ty, $int:ty) => {
        pub fn $name(v: $float) -> Result<$int, Error> {
            if v.is_nan() {
                return trap(INVALID_CONV_TO_INT);
            }
            let t = v.trunc();
            if t < <$int>::MIN as $float || t >= <$int>::MAX as $float + 1.0 {
                return trap(INTEGER_OVERFLOW);
            }
            Ok(t as $int)
        }
    };
}

impl_trunc!(i32_trunc_f32, f32, i32);
impl_trunc!(u32_trunc_f32, f32, u32);
impl_trunc!(i32_trunc_f64, f64, i32);
impl_trunc!(u32_trunc_f64, f64, u32);
impl_trunc!(i64_trunc_f64, f64, i64);
impl_trunc!(u64_trunc_f64, f64, u64);

// f32 cannot represent i64/u64 bounds exactly; the MAX+1 form used above
// would be computed in f32 and misclassify the edge, so these two spell
// the power-of-two bounds out.
pub fn i64_trunc_f32(v: f32) -> Result<i64, Error> {
    if v.is_nan() {
        return trap(INVALID_CONV_TO_INT);
    }
    let t = v.trunc();
    if t < -9_223_372_036_854_775_808.0_f32 || t >= 9_223_372_036_854_775_808.0_f32 {
        return trap(INTEGER_OVERFLOW);
    }
    Ok(t as i64)
}

pub fn u64_trunc_f32(v: f32) -> Result<u64, Error> {
    if v.is_nan() {
        return trap(INVALID_CONV_TO_INT);
    }
    let t = v.trunc();
    if t < 0.0 || t >= 18_446_744_073_709_551_616.0_f32 {
        return trap(INTEGER_OVERFLOW);
    }
    Ok(t as u64)
}

/// Sign-bit flip; NaN payloads pass through untouched.
#[inline]
pub fn f32_neg(v: f32) -> f32 {
    f32::from_bits(v.to_bits() ^ F32_SIGN)
}

#[inline]
pub fn f64_neg(v: f64) -> f64 {
    f64::from_bits(v.to_bits() ^ F64_SIGN)
}

#[inline]
pub fn f32_abs(v: f32) -> f32 {
    f32::from_bits(v.to_bits() & !F32_SIGN)
}

#[inline]
pub fn f64_abs(v: f64) -> f64 {
    f64::from_bits(v.to_bits() & !F64_SIGN)
}

/// Magnitude of `mag`, sign bit of `sign` — taken from the raw pattern,
/// so a NaN `sign` operand contributes its actual sign bit.
#[inline]
pub fn f32_copysign(mag: f32, sign: f32) -> f32 {
    f32::from_bits((mag.to_bits() & !F32_SIGN) | (sign.to_bits() & F32_SIGN))
}

#[inline]
pub fn f64_copysign(mag: f64, sign: f64) -> f64 {
    f64::from_bits((mag.to_bits() & !F64_SIGN) | (sign.to_bits() & F64_SIGN))
}

macro_rules! impl_minmax {
    ($min:ident, $max:ident, $float:ty) => {
        /// IEEE minimum: NaN propagates, -0 orders below +0.
        pub fn $min(a: $float, b: $float) -> $float {
            if a.is_nan() {
                return a;
            }
            if b.is_nan() {
                return b;
            }
            if a == b {
                if a.is_sign_negative() { a } else { b }
            } else if a < b {
                a
            } else {
                b
            }
        }

        /// IEEE maximum: NaN propagates, +0 orders above -0.
        pub fn $max(a: $float, b: $float) -> $float {
            if a.is_nan() {
                return a;
            }
            if b.is_nan() {
                return b;
            }
            if a == b {
                if a.is_sign_positive() { a } else { b }
            } else if a > b {
                a
            } else {
                b
            }
        }
    };
}

impl_minmax!(f32_min, f32_max, f32);
impl_minmax!(f64_min, f64_max, f64);
