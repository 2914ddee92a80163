//! L6 kernel dispatch info and optional telemetry.
//!
//! This crate never depends on a logging crate — there is no ambient
//! tracing subscriber to hook into here. Callers who want visibility into
//! which ISA path a kernel took can supply a `LogSink` implementation of
//! their own (e.g. one backed by `tracing` or `log` in the binary that
//! embeds this crate).

use crate::capability::{available_cores, capability, Isa};

/// Severity passed to `LogSink::log`, modeled loosely after the common
/// `log`/`tracing` level set so a host crate can map it onto whichever
/// logging facade it already uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Minimal telemetry sink. Implement this in the embedding
/// application to route kernel-dispatch messages into whatever logging
/// facade it already uses; the default is to log nothing.
pub trait LogSink {
    fn log(&self, level: LogLevel, message: &str);
}

/// A `LogSink` that discards everything; the default when no sink is
/// configured.
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Read-only snapshot of what this process would dispatch to, for
/// diagnostics and bug reports.
#[derive(Debug, Clone)]
pub struct KernelDispatchInfo {
    pub platform: &'static str,
    pub best_isa: Isa,
    pub vec_width_bits: u32,
    pub available_cores: usize,
    pub gemm_kernel: &'static str,
    pub simd_kernel: &'static str,
}

impl KernelDispatchInfo {
    pub fn current() -> Self {
        let cap = capability();
        let kernel_name = match cap.best_isa {
            Isa::Avx512 => "avx512",
            Isa::Avx2Fma => "avx2+fma",
            Isa::Neon => "neon",
            Isa::Portable => "portable",
        };
        KernelDispatchInfo {
            platform: std::env::consts::ARCH,
            best_isa: cap.best_isa,
            vec_width_bits: cap.vec_width_bits,
            available_cores: available_cores(),
            gemm_kernel: kernel_name,
            simd_kernel: kernel_name,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "platform={} isa={} vec_width={}bits cores={} gemm_kernel={}",
            self.platform, self.best_isa, self.vec_width_bits, self.available_cores, self.gemm_kernel
        )
    }
}

/// Emits a single human-readable dispatch summary through `sink`, at
/// `LogLevel::Info`.
pub fn print_kernel_info(sink: &dyn LogSink) {
    let info = KernelDispatchInfo::current();
    sink.log(LogLevel::Info, &info.describe());
}
