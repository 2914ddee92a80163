//! NEON/AdvSIMD kernels for `aarch64`. NEON is always present on this
//! target so these functions need no runtime feature check, only the
//! `cfg(target_arch)` gate below.

#![cfg(target_arch = "aarch64")]

use super::portable;
use std::arch::aarch64::*;

pub fn add_neon(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 4 * 4;
    unsafe {
        let mut i = 0;
        while i < lanes {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            vst1q_f32(out.as_mut_ptr().add(i), vaddq_f32(va, vb));
            i += 4;
        }
    }
    portable::add(&a[lanes..], &b[lanes..], &mut out[lanes..]);
}

pub fn sub_neon(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 4 * 4;
    unsafe {
        let mut i = 0;
        while i < lanes {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            vst1q_f32(out.as_mut_ptr().add(i), vsubq_f32(va, vb));
            i += 4;
        }
    }
    portable::sub(&a[lanes..], &b[lanes..], &mut out[lanes..]);
}

pub fn mul_neon(a: &[f32], b: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 4 * 4;
    unsafe {
        let mut i = 0;
        while i < lanes {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            vst1q_f32(out.as_mut_ptr().add(i), vmulq_f32(va, vb));
            i += 4;
        }
    }
    portable::mul(&a[lanes..], &b[lanes..], &mut out[lanes..]);
}

pub fn add_in_place_neon(a: &mut [f32], b: &[f32]) {
    let n = a.len();
    let lanes = n / 4 * 4;
    unsafe {
        let mut i = 0;
        while i < lanes {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            vst1q_f32(a.as_mut_ptr().add(i), vaddq_f32(va, vb));
            i += 4;
        }
    }
    portable::add_in_place(&mut a[lanes..], &b[lanes..]);
}

pub fn fma_neon(a: &[f32], b: &[f32], c: &[f32], out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 4 * 4;
    unsafe {
        let mut i = 0;
        while i < lanes {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            let vc = vld1q_f32(c.as_ptr().add(i));
            vst1q_f32(out.as_mut_ptr().add(i), vfmaq_f32(vc, va, vb));
            i += 4;
        }
    }
    portable::fma(&a[lanes..], &b[lanes..], &c[lanes..], &mut out[lanes..]);
}

pub fn scale_neon(a: &[f32], s: f32, out: &mut [f32]) {
    let n = a.len();
    let lanes = n / 4 * 4;
    unsafe {
        let vs = vdupq_n_f32(s);
        let mut i = 0;
        while i < lanes {
            let va = vld1q_f32(a.as_ptr().add(i));
            vst1q_f32(out.as_mut_ptr().add(i), vmulq_f32(va, vs));
            i += 4;
        }
    }
    portable::scale(&a[lanes..], s, &mut out[lanes..]);
}

pub fn dot_product_neon(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let lanes = n / 4 * 4;
    let mut total = unsafe {
        let mut acc = vdupq_n_f32(0.0);
        let mut i = 0;
        while i < lanes {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            acc = vfmaq_f32(acc, va, vb);
            i += 4;
        }
        vaddvq_f32(acc)
    };
    total += portable::dot_product(&a[lanes..], &b[lanes..]);
    total
}
