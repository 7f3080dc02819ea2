//! Argument marshaling and kernel launch

use super::artifact::CompiledArtifact;
use super::buffer::DeviceBuffer;
use super::cache::{CacheKey, CompilationCache};
use super::compiler::{Compiler, KernelCompiler};
use super::device::{DeviceProfile, EmulatedDevice};
use super::executor::KernelIo;
use super::kernel::Kernel;
use super::launch::LaunchConfiguration;
use crate::ast::{ElementKind, MathFn, SourceFunction};
use crate::config::{Config, DispatchConfig};
use crate::error::{CacheCompileError, DispatchError, LaunchError, TypeError};
use crate::host::{HostArray, KernelArg};
use crate::signature::{Layout, TypeSignature};
use std::fmt;
use std::sync::{Arc, RwLockReadGuard};

/// Non-fatal condition noticed while dispatching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchWarning {
    /// A host array was copied to the device for this dispatch only
    ImplicitCopy { index: usize, bytes: usize },
    /// The grid has too few blocks to occupy every multiprocessor twice
    LowOccupancy { blocks: u64, multiprocessors: u32 },
}

impl fmt::Display for DispatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchWarning::ImplicitCopy { index, bytes } => write!(
                f,
                "host array argument {} ({} bytes) implicitly copied to the device",
                index, bytes
            ),
            DispatchWarning::LowOccupancy {
                blocks,
                multiprocessors,
            } => write!(
                f,
                "grid size {} will likely result in GPU under-utilization ({} multiprocessors)",
                blocks, multiprocessors
            ),
        }
    }
}

/// What a dispatch did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchReport {
    pub kernel: String,
    /// Host arrays staged through temporary device buffers
    pub implicit_copies: usize,
    pub staged_bytes: usize,
    pub threads_launched: u64,
    pub elements: usize,
    pub warnings: Vec<DispatchWarning>,
}

/// Input bytes for the executor
enum Operand {
    Bytes(Vec<u8>),
    Buffer(DeviceBuffer),
}

/// Compiles through the cache and launches on a device.
///
/// Cloning is cheap: the device, compiler and cache are shared.
#[derive(Clone)]
pub struct Dispatcher {
    device: Arc<EmulatedDevice>,
    compiler: Arc<dyn Compiler>,
    cache: Arc<CompilationCache>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// A dispatcher on a fresh default device
    pub fn new(config: Config) -> Result<Self, LaunchError> {
        let device = Arc::new(EmulatedDevice::new(DeviceProfile::default())?);
        Ok(Self::with_device(device, config))
    }

    pub fn with_device(device: Arc<EmulatedDevice>, config: Config) -> Self {
        Self {
            device,
            compiler: Arc::new(KernelCompiler::new()),
            cache: Arc::new(CompilationCache::from_config(&config.cache)),
            config: config.dispatch,
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Share a cache between dispatchers
    pub fn with_cache(mut self, cache: Arc<CompilationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn device(&self) -> &Arc<EmulatedDevice> {
        &self.device
    }

    pub fn cache(&self) -> &Arc<CompilationCache> {
        &self.cache
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Signatures of an argument list, in order
    pub fn signatures_of(args: &[KernelArg]) -> Vec<TypeSignature> {
        args.iter().map(|a| a.signature()).collect()
    }

    /// Look up or compile `source` for `signatures`
    pub fn get_or_compile(
        &self,
        source: &SourceFunction,
        signatures: &[TypeSignature],
    ) -> Result<Arc<CompiledArtifact>, CacheCompileError> {
        let key = CacheKey::new(source, signatures.to_vec());
        self.cache
            .get_or_compile(&key, || self.compiler.compile(source, signatures))
    }

    /// Compile eagerly for an explicit signature list
    pub fn jit(
        &self,
        source: &SourceFunction,
        signatures: &[TypeSignature],
    ) -> Result<Kernel, CacheCompileError> {
        let artifact = self.get_or_compile(source, signatures)?;
        Ok(Kernel::new(self.clone(), artifact))
    }

    /// Launch `artifact` over `args` (inputs first, output last).
    ///
    /// Blocks until the kernel has finished. A host-resident output is
    /// updated in place.
    pub fn dispatch(
        &self,
        artifact: &Arc<CompiledArtifact>,
        launch: &LaunchConfiguration,
        args: &mut [KernelArg],
    ) -> Result<LaunchReport, LaunchError> {
        let expected = artifact.signatures();
        if args.len() != expected.len() {
            return Err(LaunchError::ArgumentCount {
                kernel: artifact.name().to_string(),
                expected: expected.len(),
                actual: args.len(),
            });
        }
        for (index, (arg, sig)) in args.iter().zip(expected).enumerate() {
            let actual = arg.signature();
            if actual != *sig {
                return Err(LaunchError::SignatureMismatch {
                    kernel: artifact.name().to_string(),
                    index,
                    expected: *sig,
                    actual,
                });
            }
        }
        launch.validate(self.device.profile())?;

        let Some((output_arg, input_args)) = args.split_last() else {
            return Err(LaunchError::ArgumentCount {
                kernel: artifact.name().to_string(),
                expected: expected.len(),
                actual: 0,
            });
        };
        let shape = output_arg.shape().to_vec();
        for (index, arg) in input_args.iter().enumerate() {
            if arg.signature().is_array() && arg.shape() != shape.as_slice() {
                return Err(LaunchError::ShapeMismatch {
                    index,
                    expected: shape.clone(),
                    actual: arg.shape().to_vec(),
                });
            }
        }

        let mut report = LaunchReport {
            kernel: artifact.name().to_string(),
            threads_launched: launch.total_threads(),
            ..LaunchReport::default()
        };

        // Output first, so inputs can detect aliasing.
        let output = match output_arg {
            KernelArg::Device(array) => array.buffer().clone(),
            KernelArg::Host(host) => {
                let buffer = self.device.allocate(host.bytes().len())?;
                self.note_copy(&mut report, input_args.len(), host.bytes().len());
                buffer
            }
            KernelArg::Scalar(_) => {
                return Err(LaunchError::InvalidConfiguration(
                    "output argument must be an array".to_string(),
                ));
            }
        };

        let mut operands = Vec::with_capacity(input_args.len());
        for (index, arg) in input_args.iter().enumerate() {
            let operand = match arg {
                KernelArg::Scalar(s) => Operand::Bytes(s.to_bytes()),
                KernelArg::Host(host) if host.signature().is_scalar() => {
                    Operand::Bytes(host.bytes().to_vec())
                }
                KernelArg::Host(host) => {
                    let buffer = self.device.allocate(host.bytes().len())?;
                    buffer.write_from_host(host.bytes())?;
                    self.note_copy(&mut report, index, host.bytes().len());
                    Operand::Buffer(buffer)
                }
                KernelArg::Device(array) if array.buffer().same_allocation(&output) => {
                    log::debug!("argument {} aliases the output; reading a snapshot", index);
                    Operand::Bytes(array.buffer().read_to_host())
                }
                KernelArg::Device(array) => Operand::Buffer(array.buffer().clone()),
            };
            operands.push(operand);
        }

        self.check_occupancy(&mut report, launch);

        let stream = launch
            .stream
            .clone()
            .unwrap_or_else(|| self.device.default_stream().clone());
        let job_artifact = Arc::clone(artifact);
        let job_output = output.clone();
        let job_shape = shape.clone();
        let threads = launch.total_threads();
        log::debug!(
            "launching {} on stream {} (grid {}, block {})",
            artifact,
            stream.id(),
            launch.grid,
            launch.block
        );
        let result = stream.run(move || {
            // Lock in allocation order, output included.
            let mut inputs: Vec<&DeviceBuffer> = operands
                .iter()
                .filter_map(|op| match op {
                    Operand::Buffer(buffer) => Some(buffer),
                    Operand::Bytes(_) => None,
                })
                .collect();
            inputs.sort_by_key(|b| b.id());
            inputs.dedup_by_key(|b| b.id());
            let split = inputs.partition_point(|b| b.id() < job_output.id());
            let mut guards: Vec<(u64, RwLockReadGuard<'_, Vec<u8>>)> =
                inputs[..split].iter().map(|b| (b.id(), b.read())).collect();
            let mut out = job_output.write();
            guards.extend(inputs[split..].iter().map(|b| (b.id(), b.read())));

            let io = KernelIo {
                shape: &job_shape,
                inputs: operands
                    .iter()
                    .map(|op| match op {
                        Operand::Bytes(bytes) => bytes.as_slice(),
                        Operand::Buffer(buffer) => guards
                            .iter()
                            .find(|(id, _)| *id == buffer.id())
                            .map(|(_, guard)| guard.as_slice())
                            .unwrap_or_default(),
                    })
                    .collect(),
                threads,
            };
            let execute = job_artifact.entry_point().executor();
            execute(job_artifact.program(), &io, out.as_mut_slice())
        })?;
        report.elements = result.map_err(|fault| LaunchError::KernelFault {
            kernel: artifact.name().to_string(),
            element: fault.element,
            reason: fault.reason,
        })?;

        if let Some(KernelArg::Host(host)) = args.last_mut() {
            host.bytes_mut().copy_from_slice(&output.read());
        }
        Ok(report)
    }

    fn note_copy(&self, report: &mut LaunchReport, index: usize, bytes: usize) {
        report.implicit_copies += 1;
        report.staged_bytes += bytes;
        if self.config.warn_on_implicit_copy {
            let warning = DispatchWarning::ImplicitCopy { index, bytes };
            log::warn!("{}: {}", report.kernel, warning);
            report.warnings.push(warning);
        }
    }

    fn check_occupancy(&self, report: &mut LaunchReport, launch: &LaunchConfiguration) {
        let multiprocessors = self.device.profile().multiprocessor_count;
        let blocks = launch.grid.volume();
        if self.config.low_occupancy_warnings && blocks < 2 * multiprocessors as u64 {
            let warning = DispatchWarning::LowOccupancy {
                blocks,
                multiprocessors,
            };
            log::warn!("{}: {}", report.kernel, warning);
            report.warnings.push(warning);
        }
    }

    /// Derive signatures from `args`, compile through the cache and dispatch
    pub fn call(
        &self,
        source: &SourceFunction,
        launch: &LaunchConfiguration,
        args: &mut [KernelArg],
    ) -> Result<LaunchReport, DispatchError> {
        let signatures = Self::signatures_of(args);
        let artifact = self.get_or_compile(source, &signatures)?;
        Ok(self.dispatch(&artifact, launch, args)?)
    }

    /// Apply `func` elementwise and return a new host array.
    ///
    /// Array inputs must share one shape; the result takes that shape and the
    /// layout of the first array input. All-scalar inputs give a
    /// one-element array.
    pub fn apply(&self, func: MathFn, inputs: &[KernelArg]) -> Result<HostArray, DispatchError> {
        let source = SourceFunction::ufunc(func);
        if inputs.len() != func.arity() {
            return Err(LaunchError::ArgumentCount {
                kernel: source.name().to_string(),
                expected: func.arity() + 1,
                actual: inputs.len() + 1,
            }
            .into());
        }
        let kinds: Vec<ElementKind> = inputs.iter().map(|a| a.kind()).collect();
        let kind = resolve_output_kind(func, &kinds)?;
        let (shape, layout) = inputs
            .iter()
            .find(|a| a.signature().is_array())
            .map(|a| {
                (
                    a.shape().to_vec(),
                    a.signature().layout().unwrap_or(Layout::RowMajor),
                )
            })
            .unwrap_or((vec![1], Layout::RowMajor));

        let launch = launch_for(shape.iter().product(), self.device.profile());
        let mut args: Vec<KernelArg> = inputs.to_vec();
        args.push(KernelArg::Host(HostArray::zeros(kind, &shape, layout)));
        self.call(&source, &launch, &mut args)?;
        match args.pop() {
            Some(KernelArg::Host(result)) => Ok(result),
            _ => Err(LaunchError::HostTransfer("output argument lost".to_string()).into()),
        }
    }
}

/// Output kind for `func` over `inputs`: integers compute as `float64`,
/// complex beats real and 64-bit beats 32-bit.
pub fn resolve_output_kind(func: MathFn, inputs: &[ElementKind]) -> Result<ElementKind, TypeError> {
    let complex = inputs.iter().any(|k| k.is_complex());
    if complex && !func.supports_complex() {
        let names: Vec<&str> = inputs.iter().map(|k| k.name()).collect();
        return Err(TypeError::NoLoop {
            function: func,
            inputs: names.join(", "),
        });
    }
    let single = !inputs.is_empty() && inputs.iter().all(|k| k.is_single_precision());
    Ok(match (complex, single) {
        (true, true) => ElementKind::C64,
        (true, false) => ElementKind::C128,
        (false, true) => ElementKind::F32,
        (false, false) => ElementKind::F64,
    })
}

/// A one-dimensional launch covering `elements` with up to 256 threads per block
pub fn launch_for(elements: usize, profile: &DeviceProfile) -> LaunchConfiguration {
    let block = (elements.max(1) as u64).min(256).min(profile.max_threads_per_block as u64);
    let grid = (elements.max(1) as u64).div_ceil(block);
    let grid = grid.min(profile.max_grid_dims[0] as u64);
    LaunchConfiguration::new(grid as u32, block as u32)
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("device", &self.device)
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Scalar;
    use ndarray::Array1;
    use num_complex::Complex;

    fn dispatcher() -> Dispatcher {
        let _ = env_logger::builder().is_test(true).try_init();
        Dispatcher::new(Config::default()).unwrap()
    }

    #[test]
    fn test_resolve_output_kind() {
        use ElementKind::*;
        assert_eq!(resolve_output_kind(MathFn::Sin, &[I32]).unwrap(), F64);
        assert_eq!(resolve_output_kind(MathFn::Sin, &[F32]).unwrap(), F32);
        assert_eq!(resolve_output_kind(MathFn::Sin, &[C64]).unwrap(), C64);
        assert_eq!(resolve_output_kind(MathFn::Hypot, &[F32, F64]).unwrap(), F64);
        assert_eq!(resolve_output_kind(MathFn::Arctan, &[C64]).unwrap(), C64);
        assert!(matches!(
            resolve_output_kind(MathFn::Hypot, &[C64, F32]),
            Err(TypeError::NoLoop { .. })
        ));
    }

    #[test]
    fn test_launch_for() {
        let profile = DeviceProfile::default();
        let launch = launch_for(1000, &profile);
        assert_eq!(launch.block.x, 256);
        assert_eq!(launch.grid.x, 4);
        assert_eq!(launch_for(0, &profile).total_threads(), 1);
    }

    #[test]
    fn test_dispatch_updates_host_output() {
        let d = dispatcher();
        let source = SourceFunction::ufunc(MathFn::Sin);
        let x = Array1::<f64>::linspace(-1.0, 1.0, 9);
        let mut args = vec![
            KernelArg::Host(HostArray::from_ndarray(&x)),
            KernelArg::Host(HostArray::zeros(ElementKind::F64, &[9], Layout::RowMajor)),
        ];
        let report = d
            .call(&source, &LaunchConfiguration::from((1, 1)), &mut args)
            .unwrap();
        assert_eq!(report.elements, 9);
        assert_eq!(report.implicit_copies, 2);
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, DispatchWarning::LowOccupancy { blocks: 1, .. })));
        let out = args[1].as_host().unwrap().values::<f64>().unwrap();
        for (o, v) in out.iter().zip(x.iter()) {
            assert!((o - v.sin()).abs() < 1e-12);
        }
        assert_eq!(d.device().memory_in_use(), 0);
    }

    #[test]
    fn test_signature_mismatch_is_exact() {
        let d = dispatcher();
        let source = SourceFunction::ufunc(MathFn::Cos);
        let f64_sig = TypeSignature::array(ElementKind::F64, 1, Layout::RowMajor);
        let kernel = d.jit(&source, &[f64_sig, f64_sig]).unwrap();
        let mut args = vec![
            KernelArg::Host(HostArray::zeros(ElementKind::F32, &[4], Layout::RowMajor)),
            KernelArg::Host(HostArray::zeros(ElementKind::F64, &[4], Layout::RowMajor)),
        ];
        let err = d
            .dispatch(kernel.artifact(), &LaunchConfiguration::from((1, 1)), &mut args)
            .unwrap_err();
        assert!(matches!(err, LaunchError::SignatureMismatch { index: 0, .. }));
        assert_eq!(d.device().memory_in_use(), 0);
    }

    #[test]
    fn test_shape_mismatch() {
        let d = dispatcher();
        let source = SourceFunction::ufunc(MathFn::Hypot);
        let mut args = vec![
            KernelArg::Host(HostArray::zeros(ElementKind::F64, &[3], Layout::RowMajor)),
            KernelArg::Host(HostArray::zeros(ElementKind::F64, &[4], Layout::RowMajor)),
            KernelArg::Host(HostArray::zeros(ElementKind::F64, &[4], Layout::RowMajor)),
        ];
        let err = d
            .call(&source, &LaunchConfiguration::from((1, 1)), &mut args)
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Launch(LaunchError::ShapeMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn test_scalar_output_argument_fails_to_compile() {
        let d = dispatcher();
        let source = SourceFunction::ufunc(MathFn::Tanh);
        let mut args = vec![KernelArg::from(0.5f64), KernelArg::from(0.0f64)];
        let err = d
            .call(&source, &LaunchConfiguration::from((1, 1)), &mut args)
            .unwrap_err();
        assert!(matches!(
            err.compilation_error(),
            Some(crate::error::CompilationError::ScalarOutput { .. })
        ));
    }

    #[test]
    fn test_quiet_config_emits_no_warnings() {
        let d = Dispatcher::new(Config::quiet()).unwrap();
        let source = SourceFunction::ufunc(MathFn::Rad2deg);
        let mut args = vec![
            KernelArg::Scalar(Scalar::F64(std::f64::consts::PI)),
            KernelArg::Host(HostArray::zeros(ElementKind::F64, &[2], Layout::RowMajor)),
        ];
        let report = d
            .call(&source, &LaunchConfiguration::from((1, 1)), &mut args)
            .unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.implicit_copies, 1);
        let out = args[1].as_host().unwrap().values::<f64>().unwrap();
        assert!(out.iter().all(|v| (v - 180.0).abs() < 1e-9));
    }

    #[test]
    fn test_apply_complex() {
        let d = dispatcher();
        let z = Complex::new(-0.5f32, -0.5);
        let result = d.apply(MathFn::Sin, &[KernelArg::from(z)]).unwrap();
        assert_eq!(result.kind(), ElementKind::C64);
        let value = result.values::<Complex<f32>>().unwrap()[0];
        assert!((value - z.sin()).norm() < 1e-6);
    }

    #[test]
    fn test_apply_rejects_complex_hypot() {
        let d = dispatcher();
        let z = KernelArg::from(Complex::new(1.0f64, 1.0));
        let err = d.apply(MathFn::Hypot, &[z.clone(), z]).unwrap_err();
        assert!(matches!(err, DispatchError::Type(TypeError::NoLoop { .. })));
    }
}
