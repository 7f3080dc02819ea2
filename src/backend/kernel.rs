//! Compiled kernel handles
//!
//! ```ignore
//! let kernel = dispatcher.jit(&source, &signatures)?;
//! kernel.configure(4, 256).call(&mut args)?;
//! ```

use super::artifact::CompiledArtifact;
use super::dispatch::{Dispatcher, LaunchReport};
use super::launch::{Dim3, LaunchConfiguration};
use super::stream::Stream;
use crate::error::LaunchError;
use crate::host::KernelArg;
use crate::signature::TypeSignature;
use std::sync::Arc;

/// A compiled artifact bound to the dispatcher that launches it
#[derive(Debug, Clone)]
pub struct Kernel {
    dispatcher: Dispatcher,
    artifact: Arc<CompiledArtifact>,
}

impl Kernel {
    pub(crate) fn new(dispatcher: Dispatcher, artifact: Arc<CompiledArtifact>) -> Self {
        Self {
            dispatcher,
            artifact,
        }
    }

    pub fn artifact(&self) -> &Arc<CompiledArtifact> {
        &self.artifact
    }

    pub fn signatures(&self) -> &[TypeSignature] {
        self.artifact.signatures()
    }

    /// Fix the grid and block dimensions for subsequent calls
    pub fn configure(&self, grid: impl Into<Dim3>, block: impl Into<Dim3>) -> ConfiguredKernel {
        ConfiguredKernel {
            kernel: self.clone(),
            launch: LaunchConfiguration::new(grid, block),
        }
    }
}

/// A kernel with a launch configuration, ready to be called
#[derive(Debug, Clone)]
pub struct ConfiguredKernel {
    kernel: Kernel,
    launch: LaunchConfiguration,
}

impl ConfiguredKernel {
    /// Run on `stream` instead of the device's default stream
    pub fn on_stream(mut self, stream: Stream) -> Self {
        self.launch = self.launch.with_stream(stream);
        self
    }

    pub fn launch(&self) -> &LaunchConfiguration {
        &self.launch
    }

    pub fn call(&self, args: &mut [KernelArg]) -> Result<LaunchReport, LaunchError> {
        self.kernel
            .dispatcher
            .dispatch(&self.kernel.artifact, &self.launch, args)
    }
}
