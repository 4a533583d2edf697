use crate::error::*;

/// Value types carried on the operand stack.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValType {
    I32 = 0x7f,
    I64 = 0x7e,
    F32 = 0x7d,
    F64 = 0x7c,
    FuncRef = 0x70,
    ExternRef = 0x6f,
}

impl ValType {
    pub fn from_code(byte: u64) -> Option<ValType> {
        match byte {
            0x7f => Some(ValType::I32),
            0x7e => Some(ValType::I64),
            0x7d => Some(ValType::F32),
            0x7c => Some(ValType::F64),
            0x70 => Some(ValType::FuncRef),
            0x6f => Some(ValType::ExternRef),
            _ => None,
        }
    }

    pub fn is_ref(self) -> bool {
        matches!(self, ValType::FuncRef | ValType::ExternRef)
    }
}

/// Bit pattern of a null reference. All ones, so a zero funcref index
/// stays a valid table entry.
pub const REF_NULL_BITS: u64 = u64::MAX;

/// A tagged 64-bit stack cell. Floats are stored as their bit pattern,
/// `f32` in the low 32 bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Value {
    ty: ValType,
    bits: u64,
}

impl Value {
    pub const TRUE: Value = Value { ty: ValType::I32, bits: 1 };
    pub const FALSE: Value = Value { ty: ValType::I32, bits: 0 };
    pub const FUNCREF_NULL: Value = Value { ty: ValType::FuncRef, bits: REF_NULL_BITS };
    pub const EXTERNREF_NULL: Value = Value { ty: ValType::ExternRef, bits: REF_NULL_BITS };

    #[inline] pub fn ty(self) -> ValType { self.ty }
    #[inline] pub fn bits(self) -> u64 { self.bits }

    #[inline] pub fn from_i32(v: i32) -> Self { Self { ty: ValType::I32, bits: v as u32 as u64 } }
    #[inline] pub fn from_u32(v: u32) -> Self { Self { ty: ValType::I32, bits: v as u64 } }
    #[inline] pub fn from_i64(v: i64) -> Self { Self { ty: ValType::I64, bits: v as u64 } }
    #[inline] pub fn from_u64(v: u64) -> Self { Self { ty: ValType::I64, bits: v } }
    #[inline] pub fn from_f32(v: f32) -> Self { Self::from_f32_bits(v.to_bits()) }
    #[inline] pub fn from_f64(v: f64) -> Self { Self::from_f64_bits(v.to_bits()) }
    #[inline] pub fn from_f32_bits(bits: u32) -> Self { Self { ty: ValType::F32, bits: bits as u64 } }
    #[inline] pub fn from_f64_bits(bits: u64) -> Self { Self { ty: ValType::F64, bits } }
    #[inline] pub fn from_bool(v: bool) -> Self { if v { Self::TRUE } else { Self::FALSE } }

    #[inline]
    pub fn func_ref(idx: u32) -> Self {
        Self { ty: ValType::FuncRef, bits: idx as u64 }
    }

    #[inline]
    pub fn extern_ref(handle: u64) -> Self {
        Self { ty: ValType::ExternRef, bits: handle }
    }

    /// The default cell for a declared local: numeric zero, or null for
    /// reference types.
    pub fn zero(ty: ValType) -> Self {
        let bits = if ty.is_ref() { REF_NULL_BITS } else { 0 };
        Self { ty, bits }
    }

    /// Null of the given reference type.
    pub fn null_ref(ty: ValType) -> Result<Self, Error> {
        match ty {
            ValType::FuncRef => Ok(Self::FUNCREF_NULL),
            ValType::ExternRef => Ok(Self::EXTERNREF_NULL),
            _ => fatal("ref.null requires a reference type"),
        }
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.ty.is_ref() && self.bits == REF_NULL_BITS
    }

    #[inline]
    pub fn as_i32(self) -> i32 {
        debug_assert_eq!(self.ty, ValType::I32);
        self.bits as u32 as i32
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        debug_assert_eq!(self.ty, ValType::I32);
        self.bits as u32
    }

    #[inline]
    pub fn as_i64(self) -> i64 {
        debug_assert_eq!(self.ty, ValType::I64);
        self.bits as i64
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        debug_assert_eq!(self.ty, ValType::I64);
        self.bits
    }

    #[inline]
    pub fn as_f32(self) -> f32 {
        debug_assert_eq!(self.ty, ValType::F32);
        f32::from_bits(self.bits as u32)
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        debug_assert_eq!(self.ty, ValType::F64);
        f64::from_bits(self.bits)
    }

    #[inline] pub fn as_f32_bits(self) -> u32 { self.bits as u32 }
    #[inline] pub fn as_f64_bits(self) -> u64 { self.bits }

    /// Raw funcref index; callers check `is_null` first.
    #[inline]
    pub fn as_func_ref(self) -> u32 {
        debug_assert_eq!(self.ty, ValType::FuncRef);
        self.bits as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_bits_round_trip() {
        let v = Value::from_f32(1.5);
        assert_eq!(v.as_f32(), 1.5);
        assert_eq!(v.as_f32_bits(), 1.5f32.to_bits());
        let v = Value::from_f64(-0.0);
        assert_eq!(v.as_f64_bits(), (-0.0f64).to_bits());
    }

    #[test]
    fn ref_defaults_are_null() {
        assert!(Value::zero(ValType::FuncRef).is_null());
        assert!(Value::zero(ValType::ExternRef).is_null());
        assert!(!Value::func_ref(0).is_null());
        assert_eq!(Value::zero(ValType::I64).as_i64(), 0);
    }

    #[test]
    fn truth_constants() {
        assert_eq!(Value::TRUE.as_i32(), 1);
        assert_eq!(Value::FALSE.as_i32(), 0);
        assert_eq!(Value::from_bool(true), Value::TRUE);
    }
}
