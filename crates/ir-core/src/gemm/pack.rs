//! Packed-B (panel-major) layout for weight reuse.

use crate::capability::{capability, Isa};
use crate::error::{CoreError, Result};

/// `B`, pre-transformed into column panels of width `nr`; within each panel
/// all `K` rows are stored contiguously. Immutable after construction and
/// safe to share across threads — `matmul_packed` never mutates it.
#[derive(Debug, Clone)]
pub struct PackedB {
    data: Vec<f32>,
    k: usize,
    n: usize,
    nr: usize,
    padded_cols: usize,
}

impl PackedB {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn nr(&self) -> usize {
        self.nr
    }

    /// `panel_stride`: number of rows stored per panel, i.e. `K`
    /// (invariant: `packed.panel_stride == K`).
    pub fn panel_stride(&self) -> usize {
        self.k
    }

    pub fn padded_cols(&self) -> usize {
        self.padded_cols
    }

    fn n_panels(&self) -> usize {
        self.padded_cols / self.nr
    }

    /// The `k x nr` contiguous slab for panel `p`, row-major within the
    /// panel (row stride `nr`).
    pub(crate) fn panel(&self, p: usize) -> &[f32] {
        let panel_len = self.k * self.nr;
        &self.data[p * panel_len..(p + 1) * panel_len]
    }
}

/// Column-panel width: 16 for AVX2/AVX-512, 8 for NEON and the portable
/// fallback.
pub(crate) fn nr_for_host() -> usize {
    match capability().best_isa {
        Isa::Avx512 | Isa::Avx2Fma => 16,
        Isa::Neon | Isa::Portable => 8,
    }
}

/// Converts row-major `B[K x N]` into panel-major layout. Remaining columns
/// of the last panel are zero-padded.
pub fn pack_b(b: &[f32], k: usize, n: usize) -> Result<PackedB> {
    if b.len() != k * n {
        return Err(CoreError::DimensionMismatch {
            m: 0,
            k,
            k2: k,
            n,
        });
    }
    let nr = nr_for_host();
    let n_panels = n.div_ceil(nr);
    let padded_cols = n_panels * nr;
    let mut data = vec![0.0f32; n_panels * k * nr];

    for panel in 0..n_panels {
        let col_base = panel * nr;
        let valid_cols = nr.min(n.saturating_sub(col_base));
        for row in 0..k {
            let dst = &mut data[panel * k * nr + row * nr..panel * k * nr + row * nr + nr];
            let src = &b[row * n + col_base..row * n + col_base + valid_cols];
            dst[..valid_cols].copy_from_slice(src);
            // Remaining `nr - valid_cols` entries stay zero-padded.
        }
    }

    Ok(PackedB {
        data,
        k,
        n,
        nr,
        padded_cols,
    })
}
