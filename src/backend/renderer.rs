//! C-like kernel listings
//!
//! The listing is for inspection and logging only; execution always goes
//! through the program's entry point.

use super::lane::Lane;
use super::program::{Addressing, EntryPoint, Instr, Program};
use crate::ast::{MathFn, render_float};
use crate::signature::{TypeSignature, format_signatures};
use num_complex::Complex;

pub(crate) struct KernelRenderer {
    indent_level: usize,
    lane: &'static str,
    single: bool,
    complex: bool,
}

impl KernelRenderer {
    pub(crate) fn new(entry: EntryPoint) -> Self {
        let lane = match entry {
            EntryPoint::RealF32 => f32::C_TYPE,
            EntryPoint::RealF64 => f64::C_TYPE,
            EntryPoint::ComplexF32 => Complex::<f32>::C_TYPE,
            EntryPoint::ComplexF64 => Complex::<f64>::C_TYPE,
        };
        Self {
            indent_level: 0,
            lane,
            single: matches!(entry, EntryPoint::RealF32 | EntryPoint::ComplexF32),
            complex: entry.is_complex(),
        }
    }

    fn indent(&self) -> String {
        " ".repeat(self.indent_level * 4)
    }

    fn inc_indent(&mut self) {
        self.indent_level += 1;
    }

    fn dec_indent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    fn line(&self, out: &mut String, text: &str) {
        out.push_str(&self.indent());
        out.push_str(text);
        out.push('\n');
    }

    /// `sinf`, `sin`, `csinf`, `csin`, ...
    fn render_math_func(&self, func: MathFn, args: &[String]) -> String {
        let base = match func {
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Arcsin => "asin",
            MathFn::Arccos => "acos",
            MathFn::Arctan => "atan",
            MathFn::Arctan2 => "atan2",
            MathFn::Hypot => "hypot",
            MathFn::Sinh => "sinh",
            MathFn::Cosh => "cosh",
            MathFn::Tanh => "tanh",
            MathFn::Arcsinh => "asinh",
            MathFn::Arccosh => "acosh",
            MathFn::Arctanh => "atanh",
            MathFn::Deg2rad | MathFn::Radians => {
                let factor = self.render_literal(std::f64::consts::PI / 180.0);
                return format!("({} * {})", args[0], factor);
            }
            MathFn::Rad2deg | MathFn::Degrees => {
                let factor = self.render_literal(180.0 / std::f64::consts::PI);
                return format!("({} * {})", args[0], factor);
            }
        };
        let prefix = if self.complex { "c" } else { "" };
        let suffix = if self.single { "f" } else { "" };
        format!("{}{}{}({})", prefix, base, suffix, args.join(", "))
    }

    fn render_literal(&self, value: f64) -> String {
        let s = render_float(value);
        if self.single { format!("{}f", s) } else { s }
    }

    fn render_load(&self, program: &Program, names: &[String], param: usize) -> String {
        let name = names
            .get(param)
            .cloned()
            .unwrap_or_else(|| format!("in{}", param));
        let Some(spec) = program.inputs.get(param) else {
            return name;
        };
        match spec.addressing {
            Addressing::Broadcast => name,
            Addressing::Linear => format!("{}[i]", name),
            Addressing::Remapped => format!("{}[remap(i, shape)]", name),
        }
    }

    fn render_params(&self, program: &Program, names: &[String], output: &str) -> String {
        let mut params: Vec<String> = program
            .inputs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let name = names.get(i).cloned().unwrap_or_else(|| format!("in{}", i));
                match spec.addressing {
                    Addressing::Broadcast => format!("const {} {}", spec.kind.c_type(), name),
                    _ => format!("const {}* {}", spec.kind.c_type(), name),
                }
            })
            .collect();
        params.push(format!("{}* {}", program.output.c_type(), output));
        params.push("const size_t* shape".to_string());
        params.join(", ")
    }

    pub(crate) fn render(
        &mut self,
        name: &str,
        program: &Program,
        signatures: &[TypeSignature],
        names: &[String],
        output: &str,
    ) -> String {
        let mut out = String::new();
        self.line(
            &mut out,
            &format!("// {}{}", name, format_signatures(signatures)),
        );
        self.line(
            &mut out,
            &format!(
                "__global__ void {}({}) {{",
                program.entry.symbol(),
                self.render_params(program, names, output)
            ),
        );
        self.inc_indent();
        let extent: Vec<String> = (0..program.rank).map(|d| format!("shape[{}]", d)).collect();
        let extent = if extent.is_empty() {
            "1".to_string()
        } else {
            extent.join(" * ")
        };
        self.line(&mut out, &format!("const size_t n = {};", extent));
        self.line(
            &mut out,
            "for (size_t i = blockIdx.x * blockDim.x + threadIdx.x; i < n; i += blockDim.x * gridDim.x) {",
        );
        self.inc_indent();
        for instr in &program.instrs {
            let value = match instr {
                Instr::Load { param, .. } => self.render_load(program, names, *param as usize),
                Instr::Const { value, .. } => self.render_literal(*value),
                Instr::Neg { src, .. } => format!("-r{}", src),
                Instr::Arith { op, lhs, rhs, .. } => {
                    format!("r{} {} r{}", lhs, op.symbol(), rhs)
                }
                Instr::Call1 { func, arg, .. } => {
                    self.render_math_func(*func, &[format!("r{}", arg)])
                }
                Instr::Call2 { func, lhs, rhs, .. } => {
                    self.render_math_func(*func, &[format!("r{}", lhs), format!("r{}", rhs)])
                }
            };
            self.line(
                &mut out,
                &format!("{} r{} = {};", self.lane, instr.dst(), value),
            );
        }
        self.line(
            &mut out,
            &format!(
                "{}[i] = ({})r{};",
                output,
                program.output.c_type(),
                program.result
            ),
        );
        self.dec_indent();
        self.line(&mut out, "}");
        self.dec_indent();
        self.line(&mut out, "}");
        out
    }
}

/// Render with generic parameter names (`in0`, `in1`, ..., `out`)
pub(crate) fn render_program(
    name: &str,
    program: &Program,
    signatures: &[TypeSignature],
) -> String {
    let names: Vec<String> = (0..program.inputs.len()).map(|i| format!("in{}", i)).collect();
    KernelRenderer::new(program.entry).render(name, program, signatures, &names, "out")
}
