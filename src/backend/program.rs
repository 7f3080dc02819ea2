//! Compiled kernel program
//!
//! A program is a flat, register-based instruction list evaluated once per
//! output element. It serializes to the artifact blob with `serde_json`.

use crate::ast::{ElementKind, MathFn};
use crate::error::CompilationError;
use crate::signature::Layout;
use serde::{Deserialize, Serialize};

/// Register index
pub type Reg = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    /// Load the current element of input parameter `param`
    Load { dst: Reg, param: u16 },
    Const { dst: Reg, value: f64 },
    Neg { dst: Reg, src: Reg },
    Arith {
        dst: Reg,
        op: ArithOp,
        lhs: Reg,
        rhs: Reg,
    },
    Call1 { dst: Reg, func: MathFn, arg: Reg },
    Call2 {
        dst: Reg,
        func: MathFn,
        lhs: Reg,
        rhs: Reg,
    },
}

impl Instr {
    pub fn dst(&self) -> Reg {
        match self {
            Instr::Load { dst, .. }
            | Instr::Const { dst, .. }
            | Instr::Neg { dst, .. }
            | Instr::Arith { dst, .. }
            | Instr::Call1 { dst, .. }
            | Instr::Call2 { dst, .. } => *dst,
        }
    }
}

/// Which monomorphized executor runs the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryPoint {
    RealF32,
    RealF64,
    ComplexF32,
    ComplexF64,
}

impl EntryPoint {
    pub fn select(complex: bool, single_precision: bool) -> Self {
        match (complex, single_precision) {
            (false, true) => EntryPoint::RealF32,
            (false, false) => EntryPoint::RealF64,
            (true, true) => EntryPoint::ComplexF32,
            (true, false) => EntryPoint::ComplexF64,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, EntryPoint::ComplexF32 | EntryPoint::ComplexF64)
    }

    /// Element kind of the lane's values
    pub fn lane_kind(&self) -> ElementKind {
        match self {
            EntryPoint::RealF32 => ElementKind::F32,
            EntryPoint::RealF64 => ElementKind::F64,
            EntryPoint::ComplexF32 => ElementKind::C64,
            EntryPoint::ComplexF64 => ElementKind::C128,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            EntryPoint::RealF32 => "kernel_real_f32",
            EntryPoint::RealF64 => "kernel_real_f64",
            EntryPoint::ComplexF32 => "kernel_complex_f32",
            EntryPoint::ComplexF64 => "kernel_complex_f64",
        }
    }
}

/// How an array input is indexed from the output's linear element index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Addressing {
    /// Scalar: every element reads offset 0
    Broadcast,
    /// Same memory order as the output
    Linear,
    /// Opposite memory order; indices are converted through the shape
    Remapped,
}

/// One kernel parameter as the program sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub kind: ElementKind,
    pub addressing: Addressing,
    /// Memory order of array parameters
    pub layout: Option<Layout>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub entry: EntryPoint,
    pub rank: usize,
    pub output_layout: Layout,
    pub inputs: Vec<ParamSpec>,
    pub output: ElementKind,
    pub instrs: Vec<Instr>,
    pub result: Reg,
    pub registers: usize,
}

impl Program {
    pub fn to_blob(&self) -> Result<Vec<u8>, CompilationError> {
        serde_json::to_vec(self).map_err(|e| CompilationError::Aborted(e.to_string()))
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self, CompilationError> {
        serde_json::from_slice(blob)
            .map_err(|e| CompilationError::Aborted(format!("corrupt program blob: {}", e)))
    }

    /// Whether any input is read with remapped addressing
    pub fn has_remapped_inputs(&self) -> bool {
        self.inputs
            .iter()
            .any(|p| p.addressing == Addressing::Remapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_selection() {
        assert_eq!(EntryPoint::select(false, true), EntryPoint::RealF32);
        assert_eq!(EntryPoint::select(true, false), EntryPoint::ComplexF64);
        assert_eq!(EntryPoint::ComplexF32.lane_kind(), ElementKind::C64);
    }

    #[test]
    fn test_blob_is_deterministic() {
        let program = Program {
            entry: EntryPoint::RealF64,
            rank: 2,
            output_layout: Layout::RowMajor,
            inputs: vec![ParamSpec {
                kind: ElementKind::F64,
                addressing: Addressing::Linear,
                layout: Some(Layout::RowMajor),
            }],
            output: ElementKind::F64,
            instrs: vec![
                Instr::Load { dst: 0, param: 0 },
                Instr::Call1 {
                    dst: 1,
                    func: MathFn::Cos,
                    arg: 0,
                },
            ],
            result: 1,
            registers: 2,
        };
        let blob = program.to_blob().unwrap();
        assert_eq!(blob, program.to_blob().unwrap());
        assert_eq!(Program::from_blob(&blob).unwrap(), program);
        assert!(Program::from_blob(b"not json").is_err());
    }
}
