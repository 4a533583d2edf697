use crate::error::*;
use crate::value::{ValType, Value};

/// A resizable table of references of one type, null-filled on
/// allocation.
pub struct WasmTable {
    ty: ValType,
    elements: Vec<Value>,
    maximum: u32,
}

impl WasmTable {
    pub fn new(ty: ValType, initial: u32, maximum: u32) -> Self {
        let null = Value::zero(ty);
        Self { ty, elements: vec![null; initial as usize], maximum }
    }

    pub fn ty(&self) -> ValType {
        self.ty
    }

    pub fn size(&self) -> u32 {
        self.elements.len() as u32
    }

    pub fn max(&self) -> u32 {
        self.maximum
    }

    /// Indexed read; a miss here surfaces as the generic bounds trap,
    /// the explicit table ops do their own range checks first.
    pub fn get(&self, idx: u32) -> Result<Value, Error> {
        match self.elements.get(idx as usize) {
            Some(v) => Ok(*v),
            None => trap(UNDEF_ELEM),
        }
    }

    pub fn set(&mut self, idx: u32, value: Value) -> Result<(), Error> {
        match self.elements.get_mut(idx as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => trap(OOB_TABLE_ACCESS),
        }
    }

    /// Grow by `delta` slots filled with `init`; returns the previous
    /// size, or `u32::MAX` when the maximum would be exceeded.
    pub fn grow(&mut self, delta: u32, init: Value) -> u32 {
        let current = self.size();
        if delta == 0 {
            return current;
        }
        if delta > self.maximum.saturating_sub(current) {
            return u32::MAX;
        }
        self.elements.resize((current + delta) as usize, init);
        current
    }
}
