//! Per-lane kernel executors
//!
//! Each [`EntryPoint`] resolves to `execute::<L>` for its lane. The executor
//! walks the output in grid-stride order: emulated thread `t` handles
//! elements `t, t + T, t + 2T, ...` for `T` launched threads.

use super::lane::Lane;
use super::program::{Addressing, ArithOp, EntryPoint, Instr, Program};
use num_complex::Complex;

/// Memory a single launch reads and writes
pub(crate) struct KernelIo<'a> {
    /// Output shape; array inputs share it
    pub shape: &'a [usize],
    /// One byte slice per input, in parameter order
    pub inputs: Vec<&'a [u8]>,
    pub threads: u64,
}

/// First element whose store failed
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ElementFault {
    pub element: usize,
    pub reason: String,
}

pub(crate) type ExecuteFn = fn(&Program, &KernelIo<'_>, &mut [u8]) -> Result<usize, ElementFault>;

impl EntryPoint {
    pub(crate) fn executor(&self) -> ExecuteFn {
        match self {
            EntryPoint::RealF32 => execute::<f32>,
            EntryPoint::RealF64 => execute::<f64>,
            EntryPoint::ComplexF32 => execute::<Complex<f32>>,
            EntryPoint::ComplexF64 => execute::<Complex<f64>>,
        }
    }
}

/// Run `program` over every output element. Returns the element count.
fn execute<L: Lane>(
    program: &Program,
    io: &KernelIo<'_>,
    out: &mut [u8],
) -> Result<usize, ElementFault> {
    let n: usize = io.shape.iter().product();
    if n == 0 {
        return Ok(0);
    }

    let out_strides = program.output_layout.strides(io.shape);
    let input_strides: Vec<Option<Vec<usize>>> = program
        .inputs
        .iter()
        .map(|p| match (p.addressing, p.layout) {
            (Addressing::Remapped, Some(layout)) => Some(layout.strides(io.shape)),
            _ => None,
        })
        .collect();
    let out_size = program.output.size_in_bytes();
    let threads = (io.threads.max(1) as usize).min(n);
    let mut regs = vec![L::from_f64(0.0); program.registers];

    for thread in 0..threads {
        let mut i = thread;
        while i < n {
            for instr in &program.instrs {
                match *instr {
                    Instr::Load { dst, param } => {
                        let param = param as usize;
                        let spec = &program.inputs[param];
                        let offset = match (spec.addressing, &input_strides[param]) {
                            (Addressing::Broadcast, _) => 0,
                            (Addressing::Remapped, Some(strides)) => {
                                remap(i, io.shape, &out_strides, strides)
                            }
                            _ => i,
                        };
                        let size = spec.kind.size_in_bytes();
                        let start = offset * size;
                        regs[dst as usize] =
                            L::load(spec.kind, &io.inputs[param][start..start + size]);
                    }
                    Instr::Const { dst, value } => regs[dst as usize] = L::from_f64(value),
                    Instr::Neg { dst, src } => regs[dst as usize] = regs[src as usize].neg(),
                    Instr::Arith { dst, op, lhs, rhs } => {
                        let (a, b) = (regs[lhs as usize], regs[rhs as usize]);
                        regs[dst as usize] = match op {
                            ArithOp::Add => a.add(b),
                            ArithOp::Sub => a.sub(b),
                            ArithOp::Mul => a.mul(b),
                            ArithOp::Div => a.div(b),
                        };
                    }
                    Instr::Call1 { dst, func, arg } => {
                        regs[dst as usize] = regs[arg as usize].unary(func)
                    }
                    Instr::Call2 {
                        dst,
                        func,
                        lhs,
                        rhs,
                    } => regs[dst as usize] = regs[lhs as usize].binary(func, regs[rhs as usize]),
                }
            }
            let start = i * out_size;
            regs[program.result as usize]
                .store(program.output, &mut out[start..start + out_size])
                .map_err(|reason| ElementFault { element: i, reason })?;
            i += threads;
        }
    }
    Ok(n)
}

/// Map a linear index in output order to the linear index of the same
/// multi-index in another memory order
fn remap(index: usize, shape: &[usize], from: &[usize], to: &[usize]) -> usize {
    shape
        .iter()
        .zip(from.iter().zip(to))
        .map(|(&dim, (&f, &t))| (index / f) % dim * t)
        .sum()
}
