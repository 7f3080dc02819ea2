use super::program::{EntryPoint, Program};
use crate::ast::FunctionId;
use crate::error::CompilationError;
use crate::signature::{TypeSignature, format_signatures};
use std::fmt;

/// A kernel compiled for one concrete signature list.
///
/// Immutable once built and shared through `Arc` by every dispatch whose
/// arguments match [`CompiledArtifact::signatures`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArtifact {
    name: String,
    function: FunctionId,
    signatures: Vec<TypeSignature>,
    program: Program,
    blob: Vec<u8>,
    listing: String,
}

impl CompiledArtifact {
    pub(crate) fn new(
        name: String,
        function: FunctionId,
        signatures: Vec<TypeSignature>,
        program: Program,
        listing: String,
    ) -> Result<Self, CompilationError> {
        let blob = program.to_blob()?;
        Ok(Self {
            name,
            function,
            signatures,
            program,
            blob,
            listing,
        })
    }

    /// Rebuild from a serialized program blob
    pub(crate) fn from_blob(
        name: String,
        function: FunctionId,
        signatures: Vec<TypeSignature>,
        blob: Vec<u8>,
    ) -> Result<Self, CompilationError> {
        let program = Program::from_blob(&blob)?;
        let listing = super::renderer::render_program(&name, &program, &signatures);
        Ok(Self {
            name,
            function,
            signatures,
            program,
            blob,
            listing,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function_id(&self) -> FunctionId {
        self.function
    }

    /// Parameter signatures, inputs first and the output last
    pub fn signatures(&self) -> &[TypeSignature] {
        &self.signatures
    }

    pub fn num_params(&self) -> usize {
        self.signatures.len()
    }

    pub fn output_signature(&self) -> Option<&TypeSignature> {
        self.signatures.last()
    }

    pub fn entry_point(&self) -> EntryPoint {
        self.program.entry
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Serialized program
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// C-like rendering of the kernel, for inspection
    pub fn listing(&self) -> &str {
        &self.listing
    }
}

impl fmt::Display for CompiledArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} [{}]",
            self.name,
            format_signatures(&self.signatures),
            self.program.entry.symbol()
        )
    }
}
