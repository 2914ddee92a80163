//! Startup-time SIMD capability detection (layer L0).
//!
//! Detection runs once and is cached; hot paths never reprobe. Kernels select
//! their code path from the published constants instead of branching on
//! `is_x86_feature_detected!` inline.

use std::fmt;
use std::sync::OnceLock;

/// Instruction-set tier selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isa {
    /// AVX-512 foundation available (`x86_64` only).
    Avx512,
    /// AVX2 + FMA available (`x86_64` only).
    Avx2Fma,
    /// NEON/AdvSIMD available (`aarch64`, always present on that arch).
    Neon,
    /// No usable SIMD extension detected; portable/scalar fallback.
    Portable,
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Isa::Avx512 => "avx512",
            Isa::Avx2Fma => "avx2+fma",
            Isa::Neon => "neon",
            Isa::Portable => "portable",
        };
        write!(f, "{s}")
    }
}

/// Immutable snapshot of the host's numeric capability, published once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub best_isa: Isa,
    pub vec_width_bits: u32,
    pub floats_per_vec: usize,
}

impl Capability {
    fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx512f") {
                return Capability {
                    best_isa: Isa::Avx512,
                    vec_width_bits: 512,
                    floats_per_vec: 16,
                };
            }
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                return Capability {
                    best_isa: Isa::Avx2Fma,
                    vec_width_bits: 256,
                    floats_per_vec: 8,
                };
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            return Capability {
                best_isa: Isa::Neon,
                vec_width_bits: 128,
                floats_per_vec: 4,
            };
        }
        #[allow(unreachable_code)]
        Capability {
            best_isa: Isa::Portable,
            vec_width_bits: 128,
            floats_per_vec: 4,
        }
    }

    /// Short human-readable summary for diagnostics (`KernelDispatchInfo`).
    pub fn summary(&self) -> String {
        format!(
            "{} ({}-bit, {} f32/vec)",
            self.best_isa, self.vec_width_bits, self.floats_per_vec
        )
    }
}

static CAPABILITY: OnceLock<Capability> = OnceLock::new();

/// Returns the cached, process-wide capability snapshot.
#[inline]
pub fn capability() -> Capability {
    *CAPABILITY.get_or_init(Capability::detect)
}

/// Number of logical cores visible to the process, used by the parallelism
/// thresholds in `gemm::tuning` and `simd::tuning`. Cached like `capability`
/// since the host's core count does not change at runtime.
#[inline]
pub fn available_cores() -> usize {
    static CORES: OnceLock<usize> = OnceLock::new();
    *CORES.get_or_init(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_is_stable_across_calls() {
        assert_eq!(capability(), capability());
    }

    #[test]
    fn vec_width_matches_isa() {
        let cap = capability();
        match cap.best_isa {
            Isa::Avx512 => assert_eq!(cap.vec_width_bits, 512),
            Isa::Avx2Fma => assert_eq!(cap.vec_width_bits, 256),
            Isa::Neon | Isa::Portable => assert_eq!(cap.vec_width_bits, 128),
        }
    }

    #[test]
    fn summary_mentions_isa() {
        let cap = capability();
        assert!(cap.summary().contains(&cap.best_isa.to_string()));
    }
}
