//! L2 GEMM engine: row-major `C = A . B`, a packed-B variant for
//! repeated-weight inference, and a transpose-B variant for attention
//! scoring.

mod microkernel;
pub mod pack;

pub use pack::{pack_b, PackedB};

use crate::capability::available_cores;
use crate::error::{CoreError, Result};
use microkernel::{accumulate_block, axpy_row};

pub mod tuning {
    /// L3 cache tile width of `B` (columns).
    pub const NC: usize = 4096;
    /// L2 cache tile depth of `B`/`A` (the `K` dimension).
    pub const KC: usize = 512;
    /// L2 cache tile height of `A` (rows).
    pub const MC: usize = 256;

    /// Below this element count (`M*N`), use the direct SIMD path with no
    /// tiling — tiling overhead exceeds the cache benefit at this size.
    pub const SMALL_MATMUL_ELEMENTS: usize = 65_000;
    /// Tiling requires `M*N >= SMALL_MATMUL_ELEMENTS` *and* `M` at least
    /// this large.
    pub const TILED_MIN_M: usize = 192;
    /// Row-tile parallelism requires `M >= PARALLEL_MIN_M` and `cores >= 2`.
    pub const PARALLEL_MIN_M: usize = 128;
    /// ...and at least this many row tiles, so thread overhead is amortised.
    pub const PARALLEL_MIN_TILES: usize = 4;

    /// `matmul_transpose_b` parallelizes across output rows when
    /// `M >= TRANSPOSE_PARALLEL_MIN_M && K >= TRANSPOSE_PARALLEL_MIN_K`.
    pub const TRANSPOSE_PARALLEL_MIN_M: usize = 64;
    pub const TRANSPOSE_PARALLEL_MIN_K: usize = 64;
}

fn validate_dims(a_len: usize, b_len: usize, c_len: usize, m: usize, k: usize, n: usize) -> Result<()> {
    if a_len != m * k || b_len != k * n || c_len != m * n {
        return Err(CoreError::DimensionMismatch {
            m,
            k,
            k2: if b_len % n.max(1) == 0 { b_len / n.max(1) } else { k },
            n,
        });
    }
    Ok(())
}

/// `C = A @ B` (row-major, `A: [M,K]`, `B: [K,N]`, `C: [M,N]`).
///
/// If `accumulate` is false, `C` is zeroed before the product is added
/// (store-once semantics); if true, the product is added to
/// whatever `C` already holds and the caller is responsible for having
/// zeroed it on a prior occasion if that is what they intend.
pub fn matmul(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize, accumulate: bool) -> Result<()> {
    validate_dims(a.len(), b.len(), c.len(), m, k, n)?;
    if !accumulate {
        c.fill(0.0);
    }
    if m == 0 || n == 0 || k == 0 {
        return Ok(());
    }

    let elements = m.saturating_mul(n);
    if elements < tuning::SMALL_MATMUL_ELEMENTS || m < tuning::TILED_MIN_M {
        accumulate_block(a, k, b, n, c, n, m, k, n);
        return Ok(());
    }

    let row_tile = tuning::MC.min(m);
    let n_tiles = m.div_ceil(row_tile);
    let parallel = m >= tuning::PARALLEL_MIN_M && available_cores() >= 2 && n_tiles >= tuning::PARALLEL_MIN_TILES;

    if parallel {
        use rayon::prelude::*;
        c.par_chunks_mut(row_tile * n)
            .enumerate()
            .for_each(|(tile_idx, c_tile)| {
                let row0 = tile_idx * row_tile;
                let mc = c_tile.len() / n;
                matmul_blocked_tile(&a[row0 * k..(row0 + mc) * k], k, b, n, c_tile, n, mc, k, n);
            });
    } else {
        for row0 in (0..m).step_by(row_tile) {
            let mc = row_tile.min(m - row0);
            let a_tile = &a[row0 * k..(row0 + mc) * k];
            let c_tile = &mut c[row0 * n..(row0 + mc) * n];
            matmul_blocked_tile(a_tile, k, b, n, c_tile, n, mc, k, n);
        }
    }
    Ok(())
}

/// One `MC`-row stripe's worth of the `nc -> kc -> mc` macroblock loop nest:
/// `B`'s panel stays resident across the `mc` sub-loop while `A` streams
/// through it.
fn matmul_blocked_tile(a: &[f32], lda: usize, b: &[f32], ldb: usize, c: &mut [f32], ldc: usize, mc: usize, k: usize, n: usize) {
    for col0 in (0..n).step_by(tuning::NC) {
        let nc = tuning::NC.min(n - col0);
        for k0 in (0..k).step_by(tuning::KC) {
            let kc = tuning::KC.min(k - k0);
            // Offsetting the flat slices by `k0`/`col0` and leaving the row
            // strides (`lda`/`ldb`/`ldc`) unchanged is equivalent to indexing
            // every row at its true `i*lda + k0` (etc.) position, since the
            // stride itself does not change within a macroblock.
            let a_blk = &a[k0..];
            let b_blk = &b[k0 * ldb + col0..];
            accumulate_block(a_blk, lda, b_blk, ldb, &mut c[col0..], ldc, mc, kc, nc);
        }
    }
}

/// `C = A @ unpack(packed)` using the packed-B panel layout.
/// Reads `B` sequentially from the panel instead of with strided loads.
pub fn matmul_packed(a: &[f32], packed: &PackedB, c: &mut [f32], m: usize, k: usize, n: usize, accumulate: bool) -> Result<()> {
    if k != packed.k() || n != packed.n() {
        return Err(CoreError::DimensionMismatch {
            m,
            k,
            k2: packed.k(),
            n,
        });
    }
    if a.len() != m * k || c.len() != m * n {
        return Err(CoreError::DimensionMismatch { m, k, k2: k, n });
    }
    if !accumulate {
        c.fill(0.0);
    }
    if m == 0 || n == 0 || k == 0 {
        return Ok(());
    }

    let nr = packed.nr();
    let n_panels = packed.padded_cols() / nr;
    let mut scratch = vec![0.0f32; nr];

    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        for panel_idx in 0..n_panels {
            let panel = packed.panel(panel_idx);
            scratch.iter_mut().for_each(|v| *v = 0.0);
            for p in 0..k {
                let b_row = &panel[p * nr..(p + 1) * nr];
                axpy_row(a_row[p], b_row, &mut scratch);
            }
            let col0 = panel_idx * nr;
            let valid = nr.min(n - col0);
            let c_row = &mut c[i * n + col0..i * n + col0 + valid];
            for (cv, sv) in c_row.iter_mut().zip(&scratch[..valid]) {
                *cv += sv;
            }
        }
    }
    Ok(())
}

/// `C = A @ B^T` without materialising the transpose:
/// `A: [M,K]`, `B: [N,K]`, `C: [M,N]`. Used for `Q . K^T` attention scoring.
pub fn matmul_transpose_b(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) -> Result<()> {
    if a.len() != m * k || b.len() != n * k || c.len() != m * n {
        return Err(CoreError::DimensionMismatch { m, k, k2: k, n });
    }

    let parallel = m >= tuning::TRANSPOSE_PARALLEL_MIN_M && k >= tuning::TRANSPOSE_PARALLEL_MIN_K && available_cores() >= 2;

    let compute_row = |i: usize, c_row: &mut [f32]| {
        let a_row = &a[i * k..(i + 1) * k];
        for j in 0..n {
            let b_row = &b[j * k..(j + 1) * k];
            c_row[j] = crate::simd::dot_product(a_row, b_row).unwrap_or(0.0);
        }
    };

    if parallel {
        use rayon::prelude::*;
        let rows_per_chunk = (m / (2 * available_cores().max(1))).max(4).min(m).max(1);
        c.par_chunks_mut(n * rows_per_chunk)
            .enumerate()
            .for_each(|(chunk_idx, rows)| {
                let row0 = chunk_idx * rows_per_chunk;
                let n_rows = rows.len() / n;
                for r in 0..n_rows {
                    compute_row(row0 + r, &mut rows[r * n..(r + 1) * n]);
                }
            });
    } else {
        for i in 0..m {
            compute_row(i, &mut c[i * n..(i + 1) * n]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn matmul_small_known_values() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let mut c = [0.0; 4];
        matmul(&a, &b, &mut c, 2, 2, 2, false).unwrap();
        assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn matmul_accumulate_adds_to_existing_c() {
        let a = [1.0, 0.0, 0.0, 1.0];
        let b = [1.0, 2.0, 3.0, 4.0];
        let mut c = [10.0, 10.0, 10.0, 10.0];
        matmul(&a, &b, &mut c, 2, 2, 2, true).unwrap();
        assert_eq!(c, [11.0, 12.0, 13.0, 14.0]);
    }

    #[test]
    fn matmul_overwrite_ignores_stale_c() {
        let a = [1.0, 0.0, 0.0, 1.0];
        let b = [1.0, 2.0, 3.0, 4.0];
        let mut c = [999.0, 999.0, 999.0, 999.0];
        matmul(&a, &b, &mut c, 2, 2, 2, false).unwrap();
        assert_eq!(c, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn matmul_dimension_mismatch_is_an_error() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 2.0, 3.0, 4.0];
        let mut c = [0.0; 1];
        assert!(matmul(&a, &b, &mut c, 1, 3, 1, false).is_err());
    }

    #[test]
    fn matmul_packed_matches_unpacked_for_repeated_calls() {
        let k = 33;
        let n = 20; // not a multiple of NR
        let m = 5;
        let a: Vec<f32> = (0..m * k).map(|i| (i % 7) as f32 * 0.5 - 1.0).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i % 5) as f32 * 0.3 + 0.1).collect();

        let mut expected = vec![0.0; m * n];
        matmul(&a, &b, &mut expected, m, k, n, false).unwrap();

        let packed = pack_b(&b, k, n).unwrap();
        for trial in 0..3 {
            let a2: Vec<f32> = a.iter().map(|v| v + trial as f32).collect();
            let mut exp2 = vec![0.0; m * n];
            matmul(&a2, &b, &mut exp2, m, k, n, false).unwrap();

            let mut got = vec![0.0; m * n];
            matmul_packed(&a2, &packed, &mut got, m, k, n, false).unwrap();
            for i in 0..m * n {
                assert_relative_eq!(got[i], exp2[i], epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn transpose_b_matches_explicit_transpose() {
        let m = 4;
        let k = 6;
        let n = 5;
        let a: Vec<f32> = (0..m * k).map(|i| (i % 9) as f32 * 0.2).collect();
        let b: Vec<f32> = (0..n * k).map(|i| (i % 4) as f32 * 0.7 - 1.0).collect(); // [N,K]

        // Materialize B^T as [K,N] for the reference path.
        let mut b_t = vec![0.0; k * n];
        for row in 0..n {
            for col in 0..k {
                b_t[col * n + row] = b[row * k + col];
            }
        }
        let mut expected = vec![0.0; m * n];
        matmul(&a, &b_t, &mut expected, m, k, n, false).unwrap();

        let mut got = vec![0.0; m * n];
        matmul_transpose_b(&a, &b, &mut got, m, k, n).unwrap();

        for i in 0..m * n {
            assert_relative_eq!(got[i], expected[i], epsilon = 1e-4);
        }
    }

    #[test]
    fn large_tiled_matmul_matches_small_path_reference() {
        // Forces the tiled/parallel path (M*N well above the threshold, M
        // above TILED_MIN_M) and checks it against a direct accumulation.
        let m = 256;
        let k = 40;
        let n = 260;
        let a: Vec<f32> = (0..m * k).map(|i| ((i * 37) % 11) as f32 * 0.1 - 0.5).collect();
        let b: Vec<f32> = (0..k * n).map(|i| ((i * 13) % 7) as f32 * 0.2 - 0.6).collect();

        let mut got = vec![0.0; m * n];
        matmul(&a, &b, &mut got, m, k, n, false).unwrap();

        let mut expected = vec![0.0; m * n];
        accumulate_block(&a, k, &b, n, &mut expected, n, m, k, n);

        for i in 0..m * n {
            assert_relative_eq!(got[i], expected[i], epsilon = 1e-2);
        }
    }
}
