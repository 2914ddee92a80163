//! AVX2+FMA and AVX-512F kernels for `x86_64`.
//!
//! Each function processes as many full vectors as fit, then hands the
//! remainder to `super::portable`. Callers must have already checked the
//! relevant feature is present (via `capability::capability()`); the
//! `#[target_feature]` functions themselves are still `unsafe` per Rust's
//! rules for unconditionally-enabled intrinsics.

#![cfg(target_arch = "x86_64")]

use super::portable;
use std::arch::x86_64::*;

#[target_feature(enable = "avx2,fma")]
pub unsafe fn add_avx2(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 8 * 8;
    let mut i = 0;
    while i < lanes {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        _mm256_storeu_ps(out.as_mut_ptr().add(i), _mm256_add_ps(va, vb));
        i += 8;
    }
    portable::add(&a[lanes..], &b[lanes..], &mut out[lanes..]);
}

#[target_feature(enable = "avx2,fma")]
pub unsafe fn sub_avx2(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 8 * 8;
    let mut i = 0;
    while i < lanes {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        _mm256_storeu_ps(out.as_mut_ptr().add(i), _mm256_sub_ps(va, vb));
        i += 8;
    }
    portable::sub(&a[lanes..], &b[lanes..], &mut out[lanes..]);
}

#[target_feature(enable = "avx2,fma")]
pub unsafe fn mul_avx2(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 8 * 8;
    let mut i = 0;
    while i < lanes {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        _mm256_storeu_ps(out.as_mut_ptr().add(i), _mm256_mul_ps(va, vb));
        i += 8;
    }
    portable::mul(&a[lanes..], &b[lanes..], &mut out[lanes..]);
}

#[target_feature(enable = "avx2,fma")]
pub unsafe fn add_in_place_avx2(a: &mut [f32], b: &[f32]) {
    let n = a.len();
    let lanes = n / 8 * 8;
    let mut i = 0;
    while i < lanes {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        _mm256_storeu_ps(a.as_mut_ptr().add(i), _mm256_add_ps(va, vb));
        i += 8;
    }
    portable::add_in_place(&mut a[lanes..], &b[lanes..]);
}

#[target_feature(enable = "avx2,fma")]
pub unsafe fn fma_avx2(a: &[f32], b: &[f32], c: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 8 * 8;
    let mut i = 0;
    while i < lanes {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        let vc = _mm256_loadu_ps(c.as_ptr().add(i));
        _mm256_storeu_ps(out.as_mut_ptr().add(i), _mm256_fmadd_ps(va, vb, vc));
        i += 8;
    }
    portable::fma(&a[lanes..], &b[lanes..], &c[lanes..], &mut out[lanes..]);
}

#[target_feature(enable = "avx2,fma")]
pub unsafe fn scale_avx2(a: &[f32], s: f32, out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 8 * 8;
    let vs = _mm256_set1_ps(s);
    let mut i = 0;
    while i < lanes {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        _mm256_storeu_ps(out.as_mut_ptr().add(i), _mm256_mul_ps(va, vs));
        i += 8;
    }
    portable::scale(&a[lanes..], s, &mut out[lanes..]);
}

#[target_feature(enable = "avx2,fma")]
pub unsafe fn dot_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let lanes = n / 8 * 8;
    let mut acc = _mm256_setzero_ps();
    let mut i = 0;
    while i < lanes {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        acc = _mm256_fmadd_ps(va, vb, acc);
        i += 8;
    }
    // Horizontal sum of the 8-wide accumulator.
    let hi = _mm256_extractf128_ps(acc, 1);
    let lo = _mm256_castps256_ps128(acc);
    let sum128 = _mm_add_ps(hi, lo);
    let shuf = _mm_movehdup_ps(sum128);
    let sums = _mm_add_ps(sum128, shuf);
    let shuf2 = _mm_movehl_ps(shuf, sums);
    let sums2 = _mm_add_ss(sums, shuf2);
    let mut total = _mm_cvtss_f32(sums2);
    total += portable::dot_product(&a[lanes..], &b[lanes..]);
    total
}

#[target_feature(enable = "avx512f")]
pub unsafe fn add_avx512(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 16 * 16;
    let mut i = 0;
    while i < lanes {
        let va = _mm512_loadu_ps(a.as_ptr().add(i));
        let vb = _mm512_loadu_ps(b.as_ptr().add(i));
        _mm512_storeu_ps(out.as_mut_ptr().add(i), _mm512_add_ps(va, vb));
        i += 16;
    }
    portable::add(&a[lanes..], &b[lanes..], &mut out[lanes..]);
}

#[target_feature(enable = "avx512f")]
pub unsafe fn sub_avx512(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 16 * 16;
    let mut i = 0;
    while i < lanes {
        let va = _mm512_loadu_ps(a.as_ptr().add(i));
        let vb = _mm512_loadu_ps(b.as_ptr().add(i));
        _mm512_storeu_ps(out.as_mut_ptr().add(i), _mm512_sub_ps(va, vb));
        i += 16;
    }
    portable::sub(&a[lanes..], &b[lanes..], &mut out[lanes..]);
}

#[target_feature(enable = "avx512f")]
pub unsafe fn mul_avx512(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 16 * 16;
    let mut i = 0;
    while i < lanes {
        let va = _mm512_loadu_ps(a.as_ptr().add(i));
        let vb = _mm512_loadu_ps(b.as_ptr().add(i));
        _mm512_storeu_ps(out.as_mut_ptr().add(i), _mm512_mul_ps(va, vb));
        i += 16;
    }
    portable::mul(&a[lanes..], &b[lanes..], &mut out[lanes..]);
}

#[target_feature(enable = "avx512f")]
pub unsafe fn add_in_place_avx512(a: &mut [f32], b: &[f32]) {
    let n = a.len();
    let lanes = n / 16 * 16;
    let mut i = 0;
    while i < lanes {
        let va = _mm512_loadu_ps(a.as_ptr().add(i));
        let vb = _mm512_loadu_ps(b.as_ptr().add(i));
        _mm512_storeu_ps(a.as_mut_ptr().add(i), _mm512_add_ps(va, vb));
        i += 16;
    }
    portable::add_in_place(&mut a[lanes..], &b[lanes..]);
}

#[target_feature(enable = "avx512f")]
pub unsafe fn fma_avx512(a: &[f32], b: &[f32], c: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 16 * 16;
    let mut i = 0;
    while i < lanes {
        let va = _mm512_loadu_ps(a.as_ptr().add(i));
        let vb = _mm512_loadu_ps(b.as_ptr().add(i));
        let vc = _mm512_loadu_ps(c.as_ptr().add(i));
        _mm512_storeu_ps(out.as_mut_ptr().add(i), _mm512_fmadd_ps(va, vb, vc));
        i += 16;
    }
    portable::fma(&a[lanes..], &b[lanes..], &c[lanes..], &mut out[lanes..]);
}

#[target_feature(enable = "avx512f")]
pub unsafe fn scale_avx512(a: &[f32], s: f32, out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 16 * 16;
    let vs = _mm512_set1_ps(s);
    let mut i = 0;
    while i < lanes {
        let va = _mm512_loadu_ps(a.as_ptr().add(i));
        _mm512_storeu_ps(out.as_mut_ptr().add(i), _mm512_mul_ps(va, vs));
        i += 16;
    }
    portable::scale(&a[lanes..], s, &mut out[lanes..]);
}

#[target_feature(enable = "avx512f")]
pub unsafe fn dot_product_avx512(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let lanes = n / 16 * 16;
    let mut acc = _mm512_setzero_ps();
    let mut i = 0;
    while i < lanes {
        let va = _mm512_loadu_ps(a.as_ptr().add(i));
        let vb = _mm512_loadu_ps(b.as_ptr().add(i));
        acc = _mm512_fmadd_ps(va, vb, acc);
        i += 16;
    }
    let mut total = _mm512_reduce_add_ps(acc);
    total += portable::dot_product(&a[lanes..], &b[lanes..]);
    total
}
