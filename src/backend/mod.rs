//! Kernel compilation and the emulated device
//!
//! - [`KernelCompiler`] type-checks a [`SourceFunction`](crate::ast::SourceFunction)
//!   against concrete [`TypeSignature`](crate::signature::TypeSignature)s and
//!   lowers it to a register [`Program`] with one of four entry points.
//! - [`CompilationCache`] keeps one artifact per function and signature list,
//!   compiling each at most once even under concurrent requests.
//! - [`EmulatedDevice`] owns accounted device memory and ordered streams.
//! - [`Dispatcher`] ties them together: it marshals host arguments, launches
//!   and copies results back.

mod artifact;
mod buffer;
pub mod cache;
mod compiler;
mod device;
mod dispatch;
mod executor;
mod kernel;
mod lane;
mod launch;
mod program;
mod renderer;
mod stream;

pub use artifact::CompiledArtifact;
pub use buffer::{DeviceArray, DeviceBuffer};
pub use cache::{
    CacheKey, CacheStats, CompilationCache, DiskCache, DiskCacheMetadata, default_cache_dir,
};
pub use compiler::{Compiler, KernelCompiler, MAX_RANK};
pub use device::{DeviceProfile, EmulatedDevice};
pub use dispatch::{DispatchWarning, Dispatcher, LaunchReport, launch_for, resolve_output_kind};
pub use kernel::{ConfiguredKernel, Kernel};
pub use launch::{Dim3, LaunchConfiguration};
pub use program::{Addressing, ArithOp, EntryPoint, Instr, ParamSpec, Program, Reg};
pub use stream::Stream;
