//! `ir-core` - CPU dense-linear-algebra and fused transformer kernels for
//! inference-runtime.
//!
//! This crate provides:
//! - Startup-time SIMD capability detection (`capability`)
//! - SIMD elementwise primitives dispatched per-ISA (`simd`)
//! - A cache-blocked GEMM engine with packed-weight and transpose-B variants
//!   (`gemm`)
//! - Fused transformer kernels: residual+LayerNorm and scaled dot-product
//!   attention (`fused`)
//! - An allocation-free, shape-keyed workspace for hot-loop reuse
//!   (`workspace`)
//! - Per-session KV cache and position tracking (`session`)
//! - Read-only dispatch diagnostics and an optional telemetry hook
//!   (`dispatch`)
//! - `Tensor`, `Shape`, and `CpuStorage` value types tying the above
//!   together.

pub mod capability;
pub mod dispatch;
pub mod dtype;
pub mod error;
pub mod fused;
pub mod gemm;
pub mod session;
pub mod shape;
pub mod simd;
pub mod storage;
pub mod tensor;
pub mod workspace;

// Re-export primary types at the crate root for convenience.
pub use capability::{capability, Capability, Isa};
pub use dispatch::{print_kernel_info, KernelDispatchInfo, LogLevel, LogSink, NullSink};
pub use dtype::DType;
pub use error::{CoreError, Result};
pub use fused::{fused_sdpa, layernorm_residual};
pub use gemm::{matmul, matmul_packed, matmul_transpose_b, pack_b, PackedB};
pub use session::{InferenceSession, SessionState};
pub use shape::Shape;
pub use storage::CpuStorage;
pub use tensor::Tensor;
pub use workspace::WorkspaceMap;
