//! Kernjit: just-in-time kernels for elementwise math
//!
//! Kernjit compiles small elementwise kernels (the transcendental ufunc
//! family: trigonometric, hyperbolic, their inverses, `arctan2`, `hypot` and
//! angle conversions) for concrete argument signatures, caches the compiled
//! artifacts and launches them on an emulated GPU device.
//!
//! # Architecture
//!
//! - **ast**: source functions, element kinds and the math function family
//! - **dsl**: textual kernel definitions
//! - **signature**: argument type signatures (kind, rank, C/F layout)
//! - **host**: host scalars and arrays, and dispatch arguments
//! - **backend**: compiler, compilation cache, emulated device and dispatcher
//! - **config**: explicit runtime configuration
//!
//! # Example
//!
//! ```ignore
//! use kernjit::prelude::*;
//!
//! let dispatcher = Dispatcher::new(Config::from_env()?)?;
//! let x = HostArray::from_ndarray(&ndarray::Array2::<f64>::ones((5, 10)));
//! let y = dispatcher.apply(MathFn::Deg2rad, &[x.into()])?;
//! ```

// ============================================================================
// Core Modules
// ============================================================================

pub mod ast;
pub mod backend;
pub mod config;
pub mod dsl;
pub mod error;
pub mod host;
pub mod signature;

// ============================================================================
// Re-exports
// ============================================================================

pub use ast::{ElementKind, MathFn, SourceFunction};
pub use backend::{Dispatcher, EmulatedDevice, LaunchConfiguration};
pub use config::Config;
pub use error::{CacheCompileError, CompilationError, DispatchError, LaunchError, TypeError};

// ============================================================================
// Prelude
// ============================================================================

/// Prelude module with commonly used types and traits
pub mod prelude {
    // Source functions
    pub use crate::ast::{ElementKind, Expr, MathFn, SourceFunction, call, constant, param};

    // Arguments
    pub use crate::host::{Element, HostArray, KernelArg, Scalar};
    pub use crate::signature::{Layout, TypeSignature};

    // Backend
    pub use crate::backend::{
        CompilationCache, CompiledArtifact, Compiler, DeviceArray, DeviceProfile, Dim3,
        Dispatcher, EmulatedDevice, Kernel, KernelCompiler, LaunchConfiguration, LaunchReport,
        Stream,
    };

    pub use crate::config::Config;
    pub use crate::error::{CompilationError, DispatchError, LaunchError};
}
