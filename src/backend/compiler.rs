//! Type checking and lowering of source functions

use super::artifact::CompiledArtifact;
use super::program::{Addressing, ArithOp, EntryPoint, Instr, ParamSpec, Program, Reg};
use super::renderer::KernelRenderer;
use crate::ast::{ElementKind, Expr, MathFn, SourceFunction};
use crate::error::CompilationError;
use crate::signature::{Layout, TypeSignature, format_signatures};
use rustc_hash::FxHashMap;

/// Highest supported array rank
pub const MAX_RANK: usize = 8;

/// Turns a source function plus concrete argument signatures into a
/// compiled artifact
pub trait Compiler: Send + Sync {
    fn compile(
        &self,
        source: &SourceFunction,
        signatures: &[TypeSignature],
    ) -> Result<CompiledArtifact, CompilationError>;
}

/// The built-in compiler.
///
/// Checks run in a fixed order, so a signature list with several problems
/// always reports the same one:
///
/// 1. one signature per parameter
/// 2. array output
/// 3. rank limits and rank agreement
/// 4. body references and call arity
/// 5. real-only functions in a complex kernel
/// 6. complex results stored to a real output
/// 7. `arctanh` over integer kinds
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelCompiler;

impl KernelCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for KernelCompiler {
    fn compile(
        &self,
        source: &SourceFunction,
        signatures: &[TypeSignature],
    ) -> Result<CompiledArtifact, CompilationError> {
        log::debug!(
            "compiling {}{}",
            source.name(),
            format_signatures(signatures)
        );

        let (inputs, output) = check_signatures(source, signatures)?;
        validate_body(source)?;

        let entry = select_entry_point(inputs, output);
        check_domain(source, inputs, output, entry)?;

        let program = lower(source, inputs, output, entry)?;
        let mut renderer = KernelRenderer::new(entry);
        let listing = renderer.render(
            source.name(),
            &program,
            signatures,
            source.inputs(),
            source.output(),
        );
        log::debug!("rendered kernel:\n{}", listing);
        log::info!(
            "compiled {}{} -> {}",
            source.name(),
            format_signatures(signatures),
            entry.symbol()
        );

        CompiledArtifact::new(
            source.name().to_string(),
            source.id(),
            signatures.to_vec(),
            program,
            listing,
        )
    }
}

fn check_signatures<'a>(
    source: &SourceFunction,
    signatures: &'a [TypeSignature],
) -> Result<(&'a [TypeSignature], &'a TypeSignature), CompilationError> {
    let Some((output, inputs)) = signatures.split_last() else {
        return Err(CompilationError::ArityMismatch {
            function: source.name().to_string(),
            expected: source.num_params(),
            actual: 0,
        });
    };
    if signatures.len() != source.num_params() {
        return Err(CompilationError::ArityMismatch {
            function: source.name().to_string(),
            expected: source.num_params(),
            actual: signatures.len(),
        });
    }
    if output.is_scalar() {
        return Err(CompilationError::ScalarOutput {
            function: source.name().to_string(),
            signature: *output,
        });
    }
    for sig in signatures {
        if sig.rank() > MAX_RANK {
            return Err(CompilationError::UnsupportedRank {
                function: source.name().to_string(),
                rank: sig.rank(),
                max: MAX_RANK,
            });
        }
    }
    for (index, sig) in inputs.iter().enumerate() {
        if sig.is_array() && sig.rank() != output.rank() {
            return Err(CompilationError::RankMismatch {
                function: source.name().to_string(),
                index,
                rank: sig.rank(),
                output_rank: output.rank(),
            });
        }
    }
    Ok((inputs, output))
}

fn validate_body(source: &SourceFunction) -> Result<(), CompilationError> {
    let mut problem = None;
    source.body().visit(&mut |node| {
        if problem.is_some() {
            return;
        }
        match node {
            Expr::Param(i) if *i >= source.num_inputs() => {
                problem = Some(format!(
                    "{}: parameter index {} out of range ({} inputs)",
                    source.name(),
                    i,
                    source.num_inputs()
                ));
            }
            Expr::Call(func, args) if args.len() != func.arity() => {
                problem = Some(format!(
                    "{}: {} takes {} argument(s), got {}",
                    source.name(),
                    func,
                    func.arity(),
                    args.len()
                ));
            }
            _ => {}
        }
    });
    match problem {
        Some(msg) => Err(CompilationError::MalformedSource(msg)),
        None => Ok(()),
    }
}

/// Complex when any input is complex; single precision when every input is
/// `float32`/`complex64`. A kernel without inputs follows its output kind.
fn select_entry_point(inputs: &[TypeSignature], output: &TypeSignature) -> EntryPoint {
    let kinds: Vec<ElementKind> = if inputs.is_empty() {
        vec![output.kind()]
    } else {
        inputs.iter().map(|s| s.kind()).collect()
    };
    let complex = kinds.iter().any(|k| k.is_complex());
    let single = kinds.iter().all(|k| k.is_single_precision());
    EntryPoint::select(complex, single)
}

fn check_domain(
    source: &SourceFunction,
    inputs: &[TypeSignature],
    output: &TypeSignature,
    entry: EntryPoint,
) -> Result<(), CompilationError> {
    if entry.is_complex() {
        let mut rejected = None;
        source.body().visit(&mut |node| {
            if let Expr::Call(func, _) = node
                && !func.supports_complex()
                && rejected.is_none()
            {
                rejected = Some(*func);
            }
        });
        if let Some(function) = rejected {
            return Err(CompilationError::UnsupportedOperation {
                function,
                kind: entry.lane_kind().to_string(),
            });
        }
        if !output.kind().is_complex() {
            return Err(CompilationError::UnsafeCast {
                from: entry.lane_kind().to_string(),
                to: output.kind(),
            });
        }
    }

    let integer_kind = inputs
        .iter()
        .chain(std::iter::once(output))
        .map(|s| s.kind())
        .find(|k| k.is_integer());
    if let Some(kind) = integer_kind {
        for func in MathFn::ALL {
            if func.unbounded_on_integers() && source.body().calls(func) {
                return Err(CompilationError::UndefinedIntegerNarrowing {
                    function: func,
                    kind,
                });
            }
        }
    }
    Ok(())
}

struct Lowering<'a> {
    instrs: Vec<Instr>,
    loaded: FxHashMap<usize, Reg>,
    next: usize,
    name: &'a str,
}

impl Lowering<'_> {
    fn alloc(&mut self) -> Result<Reg, CompilationError> {
        let reg = Reg::try_from(self.next).map_err(|_| {
            CompilationError::MalformedSource(format!("{}: expression too large", self.name))
        })?;
        self.next += 1;
        Ok(reg)
    }

    fn lower(&mut self, expr: &Expr) -> Result<Reg, CompilationError> {
        let instr = match expr {
            Expr::Param(i) => {
                if let Some(reg) = self.loaded.get(i) {
                    return Ok(*reg);
                }
                let dst = self.alloc()?;
                self.loaded.insert(*i, dst);
                Instr::Load {
                    dst,
                    param: *i as u16,
                }
            }
            Expr::Const(value) => Instr::Const {
                dst: self.alloc()?,
                value: *value,
            },
            Expr::Neg(x) => {
                let src = self.lower(x)?;
                Instr::Neg {
                    dst: self.alloc()?,
                    src,
                }
            }
            Expr::Add(a, b) => self.arith(ArithOp::Add, a, b)?,
            Expr::Sub(a, b) => self.arith(ArithOp::Sub, a, b)?,
            Expr::Mul(a, b) => self.arith(ArithOp::Mul, a, b)?,
            Expr::Div(a, b) => self.arith(ArithOp::Div, a, b)?,
            Expr::Call(func, args) => match args.as_slice() {
                [arg] => {
                    let arg = self.lower(arg)?;
                    Instr::Call1 {
                        dst: self.alloc()?,
                        func: *func,
                        arg,
                    }
                }
                [lhs, rhs] => {
                    let lhs = self.lower(lhs)?;
                    let rhs = self.lower(rhs)?;
                    Instr::Call2 {
                        dst: self.alloc()?,
                        func: *func,
                        lhs,
                        rhs,
                    }
                }
                _ => {
                    return Err(CompilationError::MalformedSource(format!(
                        "{}: {} called with {} arguments",
                        self.name,
                        func,
                        args.len()
                    )));
                }
            },
        };
        let dst = instr.dst();
        self.instrs.push(instr);
        Ok(dst)
    }

    fn arith(&mut self, op: ArithOp, a: &Expr, b: &Expr) -> Result<Instr, CompilationError> {
        let lhs = self.lower(a)?;
        let rhs = self.lower(b)?;
        Ok(Instr::Arith {
            dst: self.alloc()?,
            op,
            lhs,
            rhs,
        })
    }
}

fn lower(
    source: &SourceFunction,
    inputs: &[TypeSignature],
    output: &TypeSignature,
    entry: EntryPoint,
) -> Result<Program, CompilationError> {
    let output_layout = output.layout().unwrap_or(Layout::RowMajor);
    let params = inputs
        .iter()
        .map(|sig| {
            let addressing = match sig.layout() {
                None => Addressing::Broadcast,
                Some(layout) if layout == output_layout || sig.rank() <= 1 => Addressing::Linear,
                Some(_) => Addressing::Remapped,
            };
            ParamSpec {
                kind: sig.kind(),
                addressing,
                layout: sig.layout(),
            }
        })
        .collect();

    let mut lowering = Lowering {
        instrs: Vec::new(),
        loaded: FxHashMap::default(),
        next: 0,
        name: source.name(),
    };
    let result = lowering.lower(source.body())?;
    log::debug!(
        "lowered {} to {} instructions, {} registers",
        source.name(),
        lowering.instrs.len(),
        lowering.next
    );

    Ok(Program {
        entry,
        rank: output.rank(),
        output_layout,
        inputs: params,
        output: output.kind(),
        instrs: lowering.instrs,
        result,
        registers: lowering.next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{call, param};
    use rstest::rstest;

    fn arr(kind: ElementKind, rank: usize, layout: Layout) -> TypeSignature {
        TypeSignature::array(kind, rank, layout)
    }

    fn compile(
        source: &SourceFunction,
        signatures: &[TypeSignature],
    ) -> Result<CompiledArtifact, CompilationError> {
        let _ = env_logger::builder().is_test(true).try_init();
        KernelCompiler::new().compile(source, signatures)
    }

    #[test]
    fn test_arity_mismatch() {
        let f = SourceFunction::ufunc(MathFn::Sin);
        let err = compile(&f, &[arr(ElementKind::F64, 1, Layout::RowMajor)]).unwrap_err();
        assert_eq!(
            err,
            CompilationError::ArityMismatch {
                function: "sin_usecase".into(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_scalar_output_rejected() {
        let f = SourceFunction::ufunc(MathFn::Cos);
        let sigs = [
            TypeSignature::scalar(ElementKind::F64),
            TypeSignature::scalar(ElementKind::F64),
        ];
        assert!(matches!(
            compile(&f, &sigs),
            Err(CompilationError::ScalarOutput { .. })
        ));
    }

    #[test]
    fn test_rank_checks() {
        let f = SourceFunction::ufunc(MathFn::Tan);
        let too_deep = arr(ElementKind::F64, 9, Layout::RowMajor);
        assert!(matches!(
            compile(&f, &[too_deep, too_deep]),
            Err(CompilationError::UnsupportedRank { rank: 9, max: 8, .. })
        ));
        let sigs = [
            arr(ElementKind::F64, 2, Layout::RowMajor),
            arr(ElementKind::F64, 3, Layout::RowMajor),
        ];
        assert!(matches!(
            compile(&f, &sigs),
            Err(CompilationError::RankMismatch { index: 0, rank: 2, output_rank: 3, .. })
        ));
    }

    #[test]
    fn test_malformed_body() {
        let f = SourceFunction::new(
            "bad",
            vec!["x".into()],
            "out",
            call(MathFn::Sin, vec![param(3)]),
        );
        let sigs = [
            arr(ElementKind::F64, 1, Layout::RowMajor),
            arr(ElementKind::F64, 1, Layout::RowMajor),
        ];
        assert!(matches!(compile(&f, &sigs), Err(CompilationError::MalformedSource(_))));

        let f = SourceFunction::new(
            "bad_arity",
            vec!["x".into()],
            "out",
            call(MathFn::Hypot, vec![param(0)]),
        );
        assert!(matches!(compile(&f, &sigs), Err(CompilationError::MalformedSource(_))));
    }

    #[rstest]
    #[case(MathFn::Arctan2)]
    #[case(MathFn::Hypot)]
    fn test_binary_real_rejects_complex(#[case] func: MathFn) {
        let f = SourceFunction::ufunc(func);
        let c = TypeSignature::scalar(ElementKind::C128);
        let sigs = [c, c, arr(ElementKind::C128, 1, Layout::RowMajor)];
        assert_eq!(
            compile(&f, &sigs).unwrap_err(),
            CompilationError::UnsupportedOperation {
                function: func,
                kind: "complex128".into()
            }
        );
    }

    #[rstest]
    #[case(MathFn::Deg2rad)]
    #[case(MathFn::Rad2deg)]
    #[case(MathFn::Degrees)]
    #[case(MathFn::Radians)]
    fn test_angle_conversion_rejects_complex(#[case] func: MathFn) {
        let f = SourceFunction::ufunc(func);
        let sigs = [
            arr(ElementKind::C64, 2, Layout::RowMajor),
            arr(ElementKind::C64, 2, Layout::RowMajor),
        ];
        assert!(matches!(
            compile(&f, &sigs),
            Err(CompilationError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_complex_into_real_output_is_unsafe() {
        let f = SourceFunction::ufunc(MathFn::Sin);
        let sigs = [
            TypeSignature::scalar(ElementKind::C64),
            arr(ElementKind::F32, 1, Layout::RowMajor),
        ];
        assert_eq!(
            compile(&f, &sigs).unwrap_err(),
            CompilationError::UnsafeCast {
                from: "complex64".into(),
                to: ElementKind::F32
            }
        );
    }

    #[rstest]
    #[case(ElementKind::I32, ElementKind::F64)]
    #[case(ElementKind::U32, ElementKind::F64)]
    #[case(ElementKind::I64, ElementKind::F64)]
    #[case(ElementKind::U64, ElementKind::F64)]
    #[case(ElementKind::F64, ElementKind::I16)]
    fn test_arctanh_on_integers(#[case] input: ElementKind, #[case] output: ElementKind) {
        let f = SourceFunction::ufunc(MathFn::Arctanh);
        let sigs = [
            arr(input, 1, Layout::RowMajor),
            arr(output, 1, Layout::RowMajor),
        ];
        let err = compile(&f, &sigs).unwrap_err();
        let expected_kind = if input.is_integer() { input } else { output };
        assert_eq!(
            err,
            CompilationError::UndefinedIntegerNarrowing {
                function: MathFn::Arctanh,
                kind: expected_kind
            }
        );
    }

    #[test]
    fn test_check_order_is_stable() {
        // Both a rank mismatch and a complex domain violation: rank wins.
        let f = SourceFunction::ufunc(MathFn::Hypot);
        let sigs = [
            arr(ElementKind::C128, 1, Layout::RowMajor),
            arr(ElementKind::C128, 2, Layout::RowMajor),
            arr(ElementKind::C128, 2, Layout::RowMajor),
        ];
        assert!(matches!(
            compile(&f, &sigs),
            Err(CompilationError::RankMismatch { .. })
        ));
    }

    #[rstest]
    #[case(ElementKind::F32, EntryPoint::RealF32)]
    #[case(ElementKind::F64, EntryPoint::RealF64)]
    #[case(ElementKind::I16, EntryPoint::RealF64)]
    #[case(ElementKind::C64, EntryPoint::ComplexF32)]
    #[case(ElementKind::C128, EntryPoint::ComplexF64)]
    fn test_entry_point(#[case] kind: ElementKind, #[case] expected: EntryPoint) {
        let f = SourceFunction::ufunc(MathFn::Cosh);
        let out = if kind.is_complex() { kind } else { ElementKind::F64 };
        let sigs = [arr(kind, 1, Layout::RowMajor), arr(out, 1, Layout::RowMajor)];
        assert_eq!(compile(&f, &sigs).unwrap().entry_point(), expected);
    }

    #[test]
    fn test_addressing_follows_layouts() {
        let f = SourceFunction::ufunc(MathFn::Arctan2);
        let sigs = [
            arr(ElementKind::F64, 2, Layout::ColumnMajor),
            TypeSignature::scalar(ElementKind::F64),
            arr(ElementKind::F64, 2, Layout::RowMajor),
        ];
        let artifact = compile(&f, &sigs).unwrap();
        let program = artifact.program();
        assert_eq!(program.inputs[0].addressing, Addressing::Remapped);
        assert_eq!(program.inputs[1].addressing, Addressing::Broadcast);
        assert!(artifact.listing().contains("a0[remap(i, shape)]"));
    }

    #[test]
    fn test_repeated_params_load_once() {
        let f = SourceFunction::new(
            "sq",
            vec!["x".into()],
            "out",
            param(0) * param(0) + call(MathFn::Sin, vec![param(0)]),
        );
        let sigs = [
            arr(ElementKind::F64, 1, Layout::RowMajor),
            arr(ElementKind::F64, 1, Layout::RowMajor),
        ];
        let artifact = compile(&f, &sigs).unwrap();
        let loads = artifact
            .program()
            .instrs
            .iter()
            .filter(|i| matches!(i, Instr::Load { .. }))
            .count();
        assert_eq!(loads, 1);
    }

    #[test]
    fn test_deterministic_blob() {
        let f = SourceFunction::ufunc(MathFn::Arcsinh);
        let sigs = [
            arr(ElementKind::F32, 3, Layout::ColumnMajor),
            arr(ElementKind::F32, 3, Layout::ColumnMajor),
        ];
        let a = compile(&f, &sigs).unwrap();
        let b = compile(&f, &sigs).unwrap();
        assert_eq!(a.blob(), b.blob());
        assert_eq!(a.listing(), b.listing());
    }
}
