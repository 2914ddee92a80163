//! L1 SIMD primitives.
//!
//! Every primitive operates on borrowed input views and a borrowed mutable
//! output view of equal length, is allocation-free, re-entrant, and takes no
//! locks. Dispatch happens once per call by matching on the cached
//! `capability::capability().best_isa` — never by reprobing inside a loop.

mod neon;
mod portable;
mod x86;

pub mod tuning {
    /// Below this element count, GELU uses a single scalar pass; at or above
    /// it, a two-pass SIMD-friendly form. Implementation-tunable, never
    /// user-configurable.
    pub const GELU_SIMD_THRESHOLD: usize = 40_000;

    /// `softmax_2d` parallelizes across rows at or above this count.
    pub const SOFTMAX_PARALLEL_ROWS: usize = 32;
}

use crate::capability::{capability, Isa};
use crate::error::{CoreError, Result};

#[inline]
fn check_len(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(CoreError::ShapeMismatch {
            expected: vec![a],
            got: vec![b],
        });
    }
    Ok(())
}

/// `out[i] = a[i] + b[i]`.
pub fn add(a: &[f32], b: &[f32], out: &mut [f32]) -> Result<()> {
    check_len(a.len(), b.len())?;
    check_len(a.len(), out.len())?;
    match capability().best_isa {
        Isa::Avx512 => unsafe { x86::add_avx512(a, b, out) },
        Isa::Avx2Fma => unsafe { x86::add_avx2(a, b, out) },
        Isa::Neon => neon::add_neon(a, b, out),
        Isa::Portable => portable::add(a, b, out),
    }
    Ok(())
}

/// `out[i] = a[i] - b[i]`.
pub fn sub(a: &[f32], b: &[f32], out: &mut [f32]) -> Result<()> {
    check_len(a.len(), b.len())?;
    check_len(a.len(), out.len())?;
    match capability().best_isa {
        Isa::Avx512 => unsafe { x86::sub_avx512(a, b, out) },
        Isa::Avx2Fma => unsafe { x86::sub_avx2(a, b, out) },
        Isa::Neon => neon::sub_neon(a, b, out),
        Isa::Portable => portable::sub(a, b, out),
    }
    Ok(())
}

/// `out[i] = a[i] * b[i]`.
pub fn mul(a: &[f32], b: &[f32], out: &mut [f32]) -> Result<()> {
    check_len(a.len(), b.len())?;
    check_len(a.len(), out.len())?;
    match capability().best_isa {
        Isa::Avx512 => unsafe { x86::mul_avx512(a, b, out) },
        Isa::Avx2Fma => unsafe { x86::mul_avx2(a, b, out) },
        Isa::Neon => neon::mul_neon(a, b, out),
        Isa::Portable => portable::mul(a, b, out),
    }
    Ok(())
}

/// `out[i] = a[i]*b[i] + c[i]`, using a true hardware FMA instruction when
/// available.
pub fn fma(a: &[f32], b: &[f32], c: &[f32], out: &mut [f32]) -> Result<()> {
    check_len(a.len(), b.len())?;
    check_len(a.len(), c.len())?;
    check_len(a.len(), out.len())?;
    match capability().best_isa {
        Isa::Avx512 => unsafe { x86::fma_avx512(a, b, c, out) },
        Isa::Avx2Fma => unsafe { x86::fma_avx2(a, b, c, out) },
        Isa::Neon => neon::fma_neon(a, b, c, out),
        Isa::Portable => portable::fma(a, b, c, out),
    }
    Ok(())
}

/// `out[i] = a[i] * s`.
pub fn scale(a: &[f32], s: f32, out: &mut [f32]) -> Result<()> {
    check_len(a.len(), out.len())?;
    match capability().best_isa {
        Isa::Avx512 => unsafe { x86::scale_avx512(a, s, out) },
        Isa::Avx2Fma => unsafe { x86::scale_avx2(a, s, out) },
        Isa::Neon => neon::scale_neon(a, s, out),
        Isa::Portable => portable::scale(a, s, out),
    }
    Ok(())
}

/// `a[i] += b[i]`, in place.
pub fn add_in_place(a: &mut [f32], b: &[f32]) -> Result<()> {
    check_len(a.len(), b.len())?;
    match capability().best_isa {
        Isa::Avx512 => unsafe { x86::add_in_place_avx512(a, b) },
        Isa::Avx2Fma => unsafe { x86::add_in_place_avx2(a, b) },
        Isa::Neon => neon::add_in_place_neon(a, b),
        Isa::Portable => portable::add_in_place(a, b),
    }
    Ok(())
}

/// `a[i] += s`, in place.
pub fn add_scalar_in_place(a: &mut [f32], s: f32) {
    for x in a.iter_mut() {
        *x += s;
    }
}

/// `out[i] = max(0, x[i])`.
pub fn relu(x: &[f32], out: &mut [f32]) -> Result<()> {
    check_len(x.len(), out.len())?;
    for (o, &v) in out.iter_mut().zip(x) {
        *o = v.max(0.0);
    }
    Ok(())
}

/// Masked gradient of ReLU: `out[i] = x[i] > 0 ? grad[i] : 0`.
pub fn relu_backward(x: &[f32], grad: &[f32], out: &mut [f32]) -> Result<()> {
    check_len(x.len(), grad.len())?;
    check_len(x.len(), out.len())?;
    for ((o, &v), &g) in out.iter_mut().zip(x).zip(grad) {
        *o = if v > 0.0 { g } else { 0.0 };
    }
    Ok(())
}

/// `out[i] = x[i] > 0 ? x[i] : alpha * x[i]`.
pub fn leaky_relu(x: &[f32], alpha: f32, out: &mut [f32]) -> Result<()> {
    check_len(x.len(), out.len())?;
    for (o, &v) in out.iter_mut().zip(x) {
        *o = if v > 0.0 { v } else { alpha * v };
    }
    Ok(())
}

#[inline]
fn sigmoid_scalar(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// GELU activation, `x * sigmoid(1.702 * x)`.
///
/// Adaptive split: below `tuning::GELU_SIMD_THRESHOLD`
/// elements, a single scalar pass computes the whole expression; at or
/// above it, a scalar pass fills `out` with `sigmoid(1.702*x)` and a SIMD
/// pass multiplies by `x` in place. The crossover is empirical and must
/// stay an implementation constant, not a user-facing knob.
pub fn gelu(x: &[f32], out: &mut [f32]) -> Result<()> {
    check_len(x.len(), out.len())?;
    if x.len() < tuning::GELU_SIMD_THRESHOLD {
        for (o, &v) in out.iter_mut().zip(x) {
            *o = v * sigmoid_scalar(1.702 * v);
        }
    } else {
        for (o, &v) in out.iter_mut().zip(x) {
            *o = sigmoid_scalar(1.702 * v);
        }
        for (o, &v) in out.iter_mut().zip(x) {
            *o *= v;
        }
    }
    Ok(())
}

/// Derivative of GELU: `sigma + x*sigma*(1-sigma)*1.702` where
/// `sigma = sigmoid(1.702*x)`. Same adaptive split as `gelu`.
pub fn gelu_backward(x: &[f32], out: &mut [f32]) -> Result<()> {
    check_len(x.len(), out.len())?;
    for (o, &v) in out.iter_mut().zip(x) {
        let sigma = sigmoid_scalar(1.702 * v);
        *o = sigma + v * sigma * (1.0 - sigma) * 1.702;
    }
    Ok(())
}

/// Hyperbolic tangent, computed scalar (no SIMD `tanh` intrinsic exists).
pub fn tanh(x: &[f32], out: &mut [f32]) -> Result<()> {
    check_len(x.len(), out.len())?;
    for (o, &v) in out.iter_mut().zip(x) {
        *o = v.tanh();
    }
    Ok(())
}

/// Logistic sigmoid, computed scalar.
pub fn sigmoid(x: &[f32], out: &mut [f32]) -> Result<()> {
    check_len(x.len(), out.len())?;
    for (o, &v) in out.iter_mut().zip(x) {
        *o = sigmoid_scalar(v);
    }
    Ok(())
}

/// Horizontal FMA-reduced dot product.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    check_len(a.len(), b.len())?;
    Ok(match capability().best_isa {
        Isa::Avx512 => unsafe { x86::dot_product_avx512(a, b) },
        Isa::Avx2Fma => unsafe { x86::dot_product_avx2(a, b) },
        Isa::Neon => neon::dot_product_neon(a, b),
        Isa::Portable => portable::dot_product(a, b),
    })
}

fn softmax_row(row: &[f32], out_row: &mut [f32]) {
    let max_val = match capability().best_isa {
        Isa::Avx512 | Isa::Avx2Fma | Isa::Neon | Isa::Portable => portable::max_reduce(row),
    };
    let mut sum = 0.0f32;
    for (o, &v) in out_row.iter_mut().zip(row) {
        let e = (v - max_val).exp();
        *o = e;
        sum += e;
    }
    let inv_sum = 1.0 / sum;
    for o in out_row.iter_mut() {
        *o *= inv_sum;
    }
}

/// Numerically stable softmax over each of `rows` contiguous chunks of
/// `cols` elements. `input` and `output` may alias (in-place softmax).
/// Parallelizes across rows when `rows >= tuning::SOFTMAX_PARALLEL_ROWS`.
pub fn softmax_2d(input: &[f32], output: &mut [f32], rows: usize, cols: usize) -> Result<()> {
    check_len(input.len(), rows * cols)?;
    check_len(output.len(), rows * cols)?;

    if rows >= tuning::SOFTMAX_PARALLEL_ROWS {
        use rayon::prelude::*;
        // Snapshot rows first so in-place aliasing (input == output) is safe
        // to parallelize: each output chunk is computed purely from its own
        // row's original values.
        let snapshot = input.to_vec();
        output
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(r, out_row)| {
                let row = &snapshot[r * cols..(r + 1) * cols];
                softmax_row(row, out_row);
            });
    } else {
        let snapshot = input.to_vec();
        for r in 0..rows {
            let row = &snapshot[r * cols..(r + 1) * cols];
            let out_row = &mut output[r * cols..(r + 1) * cols];
            softmax_row(row, out_row);
        }
    }
    Ok(())
}

/// Numerically stable softmax over a single row.
pub fn softmax_1d(input: &[f32], output: &mut [f32]) -> Result<()> {
    softmax_2d(input, output, 1, input.len())
}

/// `log_softmax(x) = x - max - log(sum(exp(x - max)))`.
pub fn log_softmax(input: &[f32], output: &mut [f32]) -> Result<()> {
    check_len(input.len(), output.len())?;
    let max_val = portable::max_reduce(input);
    let mut sum = 0.0f32;
    for &v in input {
        sum += (v - max_val).exp();
    }
    let log_sum = sum.ln();
    for (o, &v) in output.iter_mut().zip(input) {
        *o = v - max_val - log_sum;
    }
    Ok(())
}
