//! Element types a scatter plan can move, and their combine arithmetic.

/// A value type that can be packed, shipped, and combined.
///
/// Wire encoding is always little-endian and alignment-free, so payloads can
/// be decoded from any byte offset inside a received buffer.
pub trait Scalar: Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Short type name used in error messages.
    const NAME: &'static str;
    /// Encoded size in bytes.
    const SIZE: usize;
    /// Whether `max_of` is meaningful. `CombineMode::Max` is rejected otherwise.
    const ORDERED: bool;

    fn add(self, other: Self) -> Self;
    fn max_of(self, other: Self) -> Self;

    /// Decode from the first `SIZE` bytes of `bytes`.
    fn read_le(bytes: &[u8]) -> Self;
    /// Encode into the first `SIZE` bytes of `bytes`.
    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_scalar {
    (int: $($ty:ty => $name:literal),*) => {
        $(
            impl Scalar for $ty {
                const NAME: &'static str = $name;
                const SIZE: usize = std::mem::size_of::<$ty>();
                const ORDERED: bool = true;

                #[inline]
                fn add(self, other: Self) -> Self {
                    self.wrapping_add(other)
                }
                #[inline]
                fn max_of(self, other: Self) -> Self {
                    Ord::max(self, other)
                }
                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    Self::from_le_bytes(raw)
                }
                #[inline]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
    (float: $($ty:ty => $name:literal),*) => {
        $(
            impl Scalar for $ty {
                const NAME: &'static str = $name;
                const SIZE: usize = std::mem::size_of::<$ty>();
                const ORDERED: bool = true;

                #[inline]
                fn add(self, other: Self) -> Self {
                    self + other
                }
                #[inline]
                fn max_of(self, other: Self) -> Self {
                    self.max(other)
                }
                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    Self::from_le_bytes(raw)
                }
                #[inline]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_scalar!(int: i32 => "i32", i64 => "i64", u32 => "u32", u64 => "u64");
impl_scalar!(float: f32 => "f32", f64 => "f64");

/// Double-precision complex number.
///
/// Complex values have no total order, so `CombineMode::Max` is a
/// configuration error on arrays of this type.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

impl Complex64 {
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

impl Scalar for Complex64 {
    const NAME: &'static str = "complex64";
    const SIZE: usize = 16;
    const ORDERED: bool = false;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.re + other.re, self.im + other.im)
    }

    /// Never reached through a scatter plan: `Max` is rejected up front.
    #[inline]
    fn max_of(self, _other: Self) -> Self {
        self
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        Self::new(f64::read_le(&bytes[..8]), f64::read_le(&bytes[8..16]))
    }

    #[inline]
    fn write_le(self, bytes: &mut [u8]) {
        self.re.write_le(&mut bytes[..8]);
        self.im.write_le(&mut bytes[8..16]);
    }
}
