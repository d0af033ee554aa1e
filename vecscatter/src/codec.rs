//! Packed-buffer codec: moves `bs`-scalar blocks between a natural array
//! layout (addressed by local offset) and a tightly packed buffer (addressed
//! by position), combining values under a [`CombineMode`].
//!
//! Block sizes 1 through 12 get const-generic kernels so the inner loops are
//! fully unrolled; anything larger goes through a runtime loop. The choice is
//! made once with [`BlockKernel::select`] and frozen into a [`Kernels`] table
//! of plain function pointers.

use crate::error::{Result, ScatterError};
use crate::scalar::Scalar;
use crate::types::CombineMode;

/// Largest block size with a dedicated kernel.
pub const MAX_SPECIALIZED_BS: usize = 12;

type PackFn<S> = fn(&[usize], &[S], &mut [S], usize);
type UnpackFn<S> = fn(&[S], &[usize], &mut [S], CombineMode, usize);
type ScatterFn<S> = fn(&[usize], &[S], &[usize], &mut [S], CombineMode, usize);

/// Block-size specialisation chosen at plan build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKernel {
    Bs1,
    Bs2,
    Bs3,
    Bs4,
    Bs5,
    Bs6,
    Bs7,
    Bs8,
    Bs9,
    Bs10,
    Bs11,
    Bs12,
    Generic(usize),
}

impl BlockKernel {
    pub fn select(bs: usize) -> Result<Self> {
        Ok(match bs {
            0 => return Err(ScatterError::InvalidBlockSize { bs }),
            1 => Self::Bs1,
            2 => Self::Bs2,
            3 => Self::Bs3,
            4 => Self::Bs4,
            5 => Self::Bs5,
            6 => Self::Bs6,
            7 => Self::Bs7,
            8 => Self::Bs8,
            9 => Self::Bs9,
            10 => Self::Bs10,
            11 => Self::Bs11,
            12 => Self::Bs12,
            n => Self::Generic(n),
        })
    }

    pub fn block_size(self) -> usize {
        match self {
            Self::Bs1 => 1,
            Self::Bs2 => 2,
            Self::Bs3 => 3,
            Self::Bs4 => 4,
            Self::Bs5 => 5,
            Self::Bs6 => 6,
            Self::Bs7 => 7,
            Self::Bs8 => 8,
            Self::Bs9 => 9,
            Self::Bs10 => 10,
            Self::Bs11 => 11,
            Self::Bs12 => 12,
            Self::Generic(n) => n,
        }
    }

    pub fn is_specialized(self) -> bool {
        !matches!(self, Self::Generic(_))
    }

    /// Bind the kernels for scalar type `S`.
    pub fn kernels<S: Scalar>(self) -> Kernels<S> {
        match self {
            Self::Bs1 => Kernels::fixed::<1>(),
            Self::Bs2 => Kernels::fixed::<2>(),
            Self::Bs3 => Kernels::fixed::<3>(),
            Self::Bs4 => Kernels::fixed::<4>(),
            Self::Bs5 => Kernels::fixed::<5>(),
            Self::Bs6 => Kernels::fixed::<6>(),
            Self::Bs7 => Kernels::fixed::<7>(),
            Self::Bs8 => Kernels::fixed::<8>(),
            Self::Bs9 => Kernels::fixed::<9>(),
            Self::Bs10 => Kernels::fixed::<10>(),
            Self::Bs11 => Kernels::fixed::<11>(),
            Self::Bs12 => Kernels::fixed::<12>(),
            Self::Generic(bs) => Kernels {
                bs,
                kernel: self,
                pack_fn: pack_blocks::<S>,
                unpack_fn: unpack_blocks::<S>,
                scatter_fn: scatter_blocks::<S>,
            },
        }
    }
}

/// Bound pack/unpack/scatter routines for one block size and scalar type.
pub struct Kernels<S> {
    bs: usize,
    kernel: BlockKernel,
    pack_fn: PackFn<S>,
    unpack_fn: UnpackFn<S>,
    scatter_fn: ScatterFn<S>,
}

impl<S> Clone for Kernels<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Kernels<S> {}

impl<S> std::fmt::Debug for Kernels<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernels")
            .field("bs", &self.bs)
            .field("kernel", &self.kernel)
            .finish()
    }
}

impl<S: Scalar> Kernels<S> {
    fn fixed<const BS: usize>() -> Self {
        Self {
            bs: BS,
            kernel: BlockKernel::select(BS).unwrap_or(BlockKernel::Generic(BS)),
            pack_fn: pack_fixed::<S, BS>,
            unpack_fn: unpack_fixed::<S, BS>,
            scatter_fn: scatter_fixed::<S, BS>,
        }
    }

    pub fn block_size(&self) -> usize {
        self.bs
    }

    pub fn kernel(&self) -> BlockKernel {
        self.kernel
    }

    /// Gather `offsets.len()` blocks from `source` into the front of `dest`.
    ///
    /// Panics if an offset block falls outside `source` or `dest` is shorter
    /// than `offsets.len() * bs`.
    #[inline]
    pub fn pack(&self, offsets: &[usize], source: &[S], dest: &mut [S]) {
        (self.pack_fn)(offsets, source, dest, self.bs)
    }

    /// Combine consecutive blocks of `src` into `dest` at `offsets`.
    #[inline]
    pub fn unpack_combine(&self, src: &[S], offsets: &[usize], dest: &mut [S], mode: CombineMode) {
        (self.unpack_fn)(src, offsets, dest, mode, self.bs)
    }

    /// Fused gather and combine: block `source[src_offsets[i]..]` goes into
    /// `dest[dst_offsets[i]..]`. Both offset lists must have the same length.
    #[inline]
    pub fn scatter_combine(
        &self,
        src_offsets: &[usize],
        source: &[S],
        dst_offsets: &[usize],
        dest: &mut [S],
        mode: CombineMode,
    ) {
        (self.scatter_fn)(src_offsets, source, dst_offsets, dest, mode, self.bs)
    }
}

// ── Free-function entry points ──────────────────────────────────────────
//
// These re-select the kernel on every call. The executor holds a `Kernels`
// instead.

pub fn pack<S: Scalar>(offsets: &[usize], source: &[S], dest: &mut [S], bs: usize) -> Result<()> {
    BlockKernel::select(bs)?
        .kernels::<S>()
        .pack(offsets, source, dest);
    Ok(())
}

pub fn unpack_combine<S: Scalar>(
    src: &[S],
    offsets: &[usize],
    dest: &mut [S],
    mode: CombineMode,
    bs: usize,
) -> Result<()> {
    check_mode::<S>(mode)?;
    BlockKernel::select(bs)?
        .kernels::<S>()
        .unpack_combine(src, offsets, dest, mode);
    Ok(())
}

pub fn scatter_combine<S: Scalar>(
    src_offsets: &[usize],
    source: &[S],
    dst_offsets: &[usize],
    dest: &mut [S],
    mode: CombineMode,
    bs: usize,
) -> Result<()> {
    check_mode::<S>(mode)?;
    if src_offsets.len() != dst_offsets.len() {
        return Err(ScatterError::PairCountMismatch {
            from: src_offsets.len(),
            to: dst_offsets.len(),
        });
    }
    BlockKernel::select(bs)?
        .kernels::<S>()
        .scatter_combine(src_offsets, source, dst_offsets, dest, mode);
    Ok(())
}

/// Reject combine modes the scalar type cannot express.
pub fn check_mode<S: Scalar>(mode: CombineMode) -> Result<()> {
    if mode == CombineMode::Max && !S::ORDERED {
        return Err(ScatterError::UnsupportedCombineMode {
            mode,
            scalar: S::NAME,
        });
    }
    Ok(())
}

/// Encode `values` little-endian into `out`, which must be exactly
/// `values.len() * S::SIZE` bytes.
pub fn encode_into<S: Scalar>(values: &[S], out: &mut [u8]) -> Result<()> {
    let expected = values.len() * S::SIZE;
    if out.len() != expected {
        return Err(ScatterError::BufferSizeMismatch {
            expected,
            actual: out.len(),
        });
    }
    for (v, chunk) in values.iter().zip(out.chunks_exact_mut(S::SIZE)) {
        v.write_le(chunk);
    }
    Ok(())
}

/// Decode little-endian `bytes` into `out`. Sizes must match exactly.
pub fn decode_from<S: Scalar>(bytes: &[u8], out: &mut [S]) -> Result<()> {
    let expected = out.len() * S::SIZE;
    if bytes.len() != expected {
        return Err(ScatterError::BufferSizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    for (v, chunk) in out.iter_mut().zip(bytes.chunks_exact(S::SIZE)) {
        *v = S::read_le(chunk);
    }
    Ok(())
}

// ── Kernels ─────────────────────────────────────────────────────────────
//
// The `*_blocks` routines take `bs` at runtime. The `*_fixed` wrappers call
// them with a const `BS`; `#[inline(always)]` lets each instantiation see a
// constant block length.

#[inline(always)]
fn pack_blocks<S: Scalar>(offsets: &[usize], source: &[S], dest: &mut [S], bs: usize) {
    for (chunk, &off) in dest.chunks_exact_mut(bs).zip(offsets) {
        chunk.copy_from_slice(&source[off..off + bs]);
    }
}

#[inline(always)]
fn combine_block<S: Scalar>(dst: &mut [S], src: &[S], mode: CombineMode) {
    match mode {
        CombineMode::Overwrite => dst.copy_from_slice(src),
        CombineMode::Add => {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = d.add(s);
            }
        }
        CombineMode::Max => {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = d.max_of(s);
            }
        }
        CombineMode::Ignore => {}
    }
}

#[inline(always)]
fn unpack_blocks<S: Scalar>(
    src: &[S],
    offsets: &[usize],
    dest: &mut [S],
    mode: CombineMode,
    bs: usize,
) {
    if mode == CombineMode::Ignore {
        return;
    }
    for (chunk, &off) in src.chunks_exact(bs).zip(offsets) {
        combine_block(&mut dest[off..off + bs], chunk, mode);
    }
}

#[inline(always)]
fn scatter_blocks<S: Scalar>(
    src_offsets: &[usize],
    source: &[S],
    dst_offsets: &[usize],
    dest: &mut [S],
    mode: CombineMode,
    bs: usize,
) {
    if mode == CombineMode::Ignore {
        return;
    }
    for (&s, &d) in src_offsets.iter().zip(dst_offsets) {
        combine_block(&mut dest[d..d + bs], &source[s..s + bs], mode);
    }
}

fn pack_fixed<S: Scalar, const BS: usize>(
    offsets: &[usize],
    source: &[S],
    dest: &mut [S],
    _bs: usize,
) {
    pack_blocks(offsets, source, dest, BS)
}

fn unpack_fixed<S: Scalar, const BS: usize>(
    src: &[S],
    offsets: &[usize],
    dest: &mut [S],
    mode: CombineMode,
    _bs: usize,
) {
    unpack_blocks(src, offsets, dest, mode, BS)
}

fn scatter_fixed<S: Scalar, const BS: usize>(
    src_offsets: &[usize],
    source: &[S],
    dst_offsets: &[usize],
    dest: &mut [S],
    mode: CombineMode,
    _bs: usize,
) {
    scatter_blocks(src_offsets, source, dst_offsets, dest, mode, BS)
}
