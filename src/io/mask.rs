use ndarray::Array2;

/// Per-pixel validity of the source latitude/longitude samples.
///
/// Pixel indices are row-major: `index = y * width + x`.
pub trait ValidityMask: Send + Sync {
    fn is_valid(&self, index: usize) -> bool;

    /// Number of pixels the mask covers
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(height, width)` for masks that carry a 2-D shape
    fn shape(&self) -> Option<(usize, usize)> {
        None
    }
}

/// Packed bit-per-pixel validity mask
#[derive(Debug, Clone, PartialEq)]
pub struct BitMask {
    len: usize,
    bits: Vec<u64>,
}

impl BitMask {
    /// Mask of `len` pixels, all valid
    pub fn all_valid(len: usize) -> Self {
        let mut bits = vec![u64::MAX; (len + 63) / 64];
        // Keep bits past `len` cleared so counting stays exact
        if len % 64 != 0 {
            if let Some(last) = bits.last_mut() {
                *last = (1u64 << (len % 64)) - 1;
            }
        }
        Self { len, bits }
    }

    /// Mask of `len` pixels, all invalid
    pub fn all_invalid(len: usize) -> Self {
        Self { len, bits: vec![0; (len + 63) / 64] }
    }

    /// Build a mask by evaluating `valid` for every index
    pub fn from_fn<F: Fn(usize) -> bool>(len: usize, valid: F) -> Self {
        let mut mask = Self::all_invalid(len);
        for index in 0..len {
            if valid(index) {
                mask.set(index, true);
            }
        }
        mask
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set(&mut self, index: usize, valid: bool) {
        assert!(index < self.len, "mask index {} out of range {}", index, self.len);
        let bit = 1u64 << (index % 64);
        if valid {
            self.bits[index / 64] |= bit;
        } else {
            self.bits[index / 64] &= !bit;
        }
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.bits[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Number of valid pixels
    pub fn count_valid(&self) -> usize {
        self.bits.iter().map(|word| word.count_ones() as usize).sum()
    }
}

impl ValidityMask for BitMask {
    fn is_valid(&self, index: usize) -> bool {
        self.get(index)
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl ValidityMask for Array2<bool> {
    fn is_valid(&self, index: usize) -> bool {
        let width = self.ncols();
        if width == 0 {
            return false;
        }
        self.get((index / width, index % width)).copied().unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.nrows() * self.ncols()
    }

    fn shape(&self) -> Option<(usize, usize)> {
        Some(self.dim())
    }
}
