use super::{Expr, MathFn};
use crate::error::CompilationError;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a source function, derived from its full definition.
///
/// Two functions with the same name, parameters and body share an identity,
/// so they also share cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(u64);

impl FunctionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A kernel in source form: `name(inputs..., output) { output = body }`
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFunction {
    name: String,
    inputs: Vec<String>,
    output: String,
    body: Expr,
    id: FunctionId,
}

impl SourceFunction {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<String>,
        output: impl Into<String>,
        body: Expr,
    ) -> Self {
        let name = name.into();
        let output = output.into();
        let id = Self::compute_id(&name, &inputs, &output, &body);
        Self {
            name,
            inputs,
            output,
            body,
            id,
        }
    }

    /// The `<func>_usecase(a0, ..., out) { out = func(a0, ...) }` wrapper
    /// around a single math function.
    pub fn ufunc(func: MathFn) -> Self {
        let inputs: Vec<String> = (0..func.arity()).map(|i| format!("a{}", i)).collect();
        let args = (0..func.arity()).map(Expr::Param).collect();
        Self::new(
            format!("{}_usecase", func.name()),
            inputs,
            "out",
            Expr::Call(func, args),
        )
    }

    /// Parse kernel-language text, e.g. `kernel f(a0, out) { out = sin(a0); }`
    pub fn parse(text: &str) -> Result<Self, CompilationError> {
        crate::dsl::parse_kernel(text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Number of kernel parameters including the output
    pub fn num_params(&self) -> usize {
        self.inputs.len() + 1
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn id(&self) -> FunctionId {
        self.id
    }

    fn compute_id(name: &str, inputs: &[String], output: &str, body: &Expr) -> FunctionId {
        let mut hasher = FxHasher::default();
        name.hash(&mut hasher);
        inputs.hash(&mut hasher);
        output.hash(&mut hasher);
        body.hash_into(&mut hasher);
        FunctionId(hasher.finish())
    }
}

impl fmt::Display for SourceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params = self.inputs.clone();
        params.push(self.output.clone());
        write!(
            f,
            "kernel {}({}) {{ {} = {}; }}",
            self.name,
            params.join(", "),
            self.output,
            self.body.render(&self.inputs)
        )
    }
}
