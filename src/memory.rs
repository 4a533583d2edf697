use crate::error::*;

macro_rules! impl_unsigned {
    ($type:ty, $size:literal, $load_name:ident, $store_name:ident) => {
        #[inline]
        pub fn $load_name(&self, ptr: u32, offset: u32) -> Result<$type, Error> {
            let addr = (ptr as usize).checked_add(offset as usize).ok_or_else(|| Error::Trap(OOB_MEMORY_ACCESS.into()))?;
            let end = addr.saturating_add($size);
            if end > self.data.len() {
                return trap(OOB_MEMORY_ACCESS);
            }
            Ok(<$type>::from_le_bytes(self.data[addr..end].try_into().unwrap()))
        }
        #[inline]
        pub fn $store_name(&mut self, ptr: u32, offset: u32, v: $type) -> Result<(), Error> {
            let addr = (ptr as usize).checked_add(offset as usize).ok_or_else(|| Error::Trap(OOB_MEMORY_ACCESS.into()))?;
            let end = addr.saturating_add($size);
            if end > self.data.len() {
                return trap(OOB_MEMORY_ACCESS);
            }
            self.data[addr..end].copy_from_slice(&v.to_le_bytes());
            Ok(())
        }
    };
}

macro_rules! impl_signed_load {
    ($name:ident, $target:ty, $source:ident) => {
        #[inline]
        pub fn $name(&self, ptr: u32, offset: u32) -> Result<$target, Error> {
            Ok(self.$source(ptr, offset)? as $target)
        }
    };
}

/// Linear memory: a page-granular byte buffer plus the passive data
/// segments that `memory.init` copies from.
pub struct WasmMemory {
    data: Vec<u8>,
    current: u32,
    maximum: u32,
    segments: Vec<Option<Vec<u8>>>,
}

impl WasmMemory {
    pub const MAX_PAGES: u32 = 65536;
    pub const PAGE_SIZE: u32 = 65536;

    pub fn new(initial: u32, maximum: u32) -> Self {
        let maximum = maximum.min(Self::MAX_PAGES);
        let data = vec![0; (initial as usize) * (Self::PAGE_SIZE as usize)];
        Self { data, current: initial, maximum, segments: Vec::new() }
    }

    pub fn with_segments(initial: u32, maximum: u32, segments: Vec<Vec<u8>>) -> Self {
        let mut mem = Self::new(initial, maximum);
        mem.segments = segments.into_iter().map(Some).collect();
        mem
    }

    /// Current size in pages.
    pub fn size(&self) -> u32 {
        self.current
    }

    pub fn max(&self) -> u32 {
        self.maximum
    }

    /// Grow by `delta` pages; returns the previous page count, or
    /// `u32::MAX` when the maximum would be exceeded.
    pub fn grow(&mut self, delta: u32) -> u32 {
        if delta == 0 {
            return self.current;
        }
        if delta > self.maximum.saturating_sub(self.current) {
            return u32::MAX;
        }
        let old = self.current;
        self.current += delta;
        self.data.resize((self.current as usize) * (Self::PAGE_SIZE as usize), 0);
        old
    }

    impl_unsigned!(u8,  1, load_u8, store_u8);
    impl_unsigned!(u16, 2, load_u16, store_u16);
    impl_unsigned!(u32, 4, load_u32, store_u32);
    impl_unsigned!(u64, 8, load_u64, store_u64);
    impl_signed_load!(load_i8,  i8,  load_u8);
    impl_signed_load!(load_i16, i16, load_u16);
    impl_signed_load!(load_i32, i32, load_u32);
    impl_signed_load!(load_i64, i64, load_u64);

    #[inline]
    pub fn load_f32(&self, ptr: u32, offset: u32) -> Result<f32, Error> {
        Ok(f32::from_bits(self.load_u32(ptr, offset)?))
    }
    #[inline]
    pub fn store_f32(&mut self, ptr: u32, offset: u32, v: f32) -> Result<(), Error> {
        self.store_u32(ptr, offset, v.to_bits())
    }
    #[inline]
    pub fn load_f64(&self, ptr: u32, offset: u32) -> Result<f64, Error> {
        Ok(f64::from_bits(self.load_u64(ptr, offset)?))
    }
    #[inline]
    pub fn store_f64(&mut self, ptr: u32, offset: u32, v: f64) -> Result<(), Error> {
        self.store_u64(ptr, offset, v.to_bits())
    }

    fn checked_range(&self, offset: u32, len: u32) -> Result<(usize, usize), Error> {
        let start = offset as usize;
        let end = start
            .checked_add(len as usize)
            .ok_or_else(|| Error::Trap(OOB_MEMORY_ACCESS.into()))?;
        if end > self.data.len() {
            return trap(OOB_MEMORY_ACCESS);
        }
        Ok((start, end))
    }

    /// Write `byte` over `[offset, offset + size)`.
    pub fn fill(&mut self, byte: u8, offset: u32, size: u32) -> Result<(), Error> {
        let (start, end) = self.checked_range(offset, size)?;
        self.data[start..end].fill(byte);
        Ok(())
    }

    /// Overlap-safe copy within the memory.
    pub fn copy(&mut self, dst: u32, src: u32, size: u32) -> Result<(), Error> {
        let (src_start, _) = self.checked_range(src, size)?;
        let (dst_start, _) = self.checked_range(dst, size)?;
        self.data.copy_within(src_start..src_start + size as usize, dst_start);
        Ok(())
    }

    /// Copy `size` bytes of passive segment `seg_id`, starting at
    /// `src_off`, into memory at `dst`.
    pub fn init_passive_segment(
        &mut self,
        seg_id: u32,
        dst: u32,
        src_off: u32,
        size: u32,
    ) -> Result<(), Error> {
        let seg = match self.segments.get(seg_id as usize) {
            Some(Some(bytes)) => bytes,
            Some(None) => return trap(OOB_MEMORY_ACCESS),
            None => return fatal(UNKNOWN_ELEM),
        };
        let src_start = src_off as usize;
        let src_end = src_start + size as usize;
        if src_end > seg.len() {
            return trap(OOB_MEMORY_ACCESS);
        }
        let (dst_start, dst_end) = self.checked_range(dst, size)?;
        let bytes = self.segments[seg_id as usize].as_ref().unwrap()[src_start..src_end].to_vec();
        self.data[dst_start..dst_end].copy_from_slice(&bytes);
        Ok(())
    }

    /// Mark passive segment `seg_id` unavailable to later `init`s.
    pub fn drop_segment(&mut self, seg_id: u32) -> Result<(), Error> {
        match self.segments.get_mut(seg_id as usize) {
            Some(slot) => {
                *slot = None;
                Ok(())
            }
            None => fatal(UNKNOWN_ELEM),
        }
    }

    pub fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Error> {
        let (start, end) = self.checked_range(offset, bytes.len() as u32)?;
        self.data[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subword_loads_extend() {
        let mut mem = WasmMemory::new(1, 1);
        mem.store_u8(0, 0, 0xff).unwrap();
        assert_eq!(mem.load_u8(0, 0).unwrap(), 0xff);
        assert_eq!(mem.load_i8(0, 0).unwrap(), -1);
        mem.store_u16(4, 0, 0x8000).unwrap();
        assert_eq!(mem.load_i16(4, 0).unwrap(), i16::MIN);
    }

    #[test]
    fn static_offset_participates_in_bounds() {
        let mem = WasmMemory::new(1, 1);
        let last = WasmMemory::PAGE_SIZE - 4;
        assert!(mem.load_u32(last, 0).is_ok());
        assert_eq!(mem.load_u32(last, 1), trap(OOB_MEMORY_ACCESS));
        assert_eq!(mem.load_u32(0, WasmMemory::PAGE_SIZE), trap(OOB_MEMORY_ACCESS));
    }

    #[test]
    fn grow_reports_previous_pages() {
        let mut mem = WasmMemory::new(1, 2);
        assert_eq!(mem.grow(1), 1);
        assert_eq!(mem.size(), 2);
        assert_eq!(mem.grow(1), u32::MAX);
        assert_eq!(mem.size(), 2);
    }

    #[test]
    fn copy_handles_overlap() {
        let mut mem = WasmMemory::new(1, 1);
        mem.write_bytes(0, &[1, 2, 3, 4]).unwrap();
        mem.copy(1, 0, 3).unwrap();
        assert_eq!(mem.load_u8(1, 0).unwrap(), 1);
        assert_eq!(mem.load_u8(2, 0).unwrap(), 2);
        assert_eq!(mem.load_u8(3, 0).unwrap(), 3);
    }

    #[test]
    fn dropped_segment_rejects_init() {
        let mut mem = WasmMemory::with_segments(1, 1, vec![vec![9, 8, 7]]);
        mem.init_passive_segment(0, 0, 0, 3).unwrap();
        assert_eq!(mem.load_u8(2, 0).unwrap(), 7);
        mem.drop_segment(0).unwrap();
        assert_eq!(mem.init_passive_segment(0, 0, 0, 1), trap(OOB_MEMORY_ACCESS));
    }

    #[test]
    fn segment_init_bounds() {
        let mut mem = WasmMemory::with_segments(1, 1, vec![vec![1, 2]]);
        assert_eq!(mem.init_passive_segment(0, 0, 0, 3), trap(OOB_MEMORY_ACCESS));
        assert_eq!(mem.init_passive_segment(0, 0, 1, 2), trap(OOB_MEMORY_ACCESS));
    }
}
