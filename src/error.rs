//! Error types for compilation, caching and dispatch

use crate::ast::{ElementKind, MathFn};
use crate::signature::TypeSignature;
use thiserror::Error;

/// The source function cannot be compiled for the requested signatures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    #[error("{function}: expected {expected} argument signatures (inputs + output), got {actual}")]
    ArityMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("{function}: output parameter must be an array, got {signature}")]
    ScalarOutput {
        function: String,
        signature: TypeSignature,
    },

    #[error("{function}: rank {rank} exceeds the supported maximum of {max}")]
    UnsupportedRank {
        function: String,
        rank: usize,
        max: usize,
    },

    #[error("{function}: argument {index} has rank {rank} but the output has rank {output_rank}")]
    RankMismatch {
        function: String,
        index: usize,
        rank: usize,
        output_rank: usize,
    },

    #[error("malformed source: {0}")]
    MalformedSource(String),

    #[error("{function} is not supported for {kind} values")]
    UnsupportedOperation { function: MathFn, kind: String },

    #[error("cannot store a {from} result into a {to} output")]
    UnsafeCast { from: String, to: ElementKind },

    #[error(
        "{function} with element kind {kind} is undefined: infinite results cannot be narrowed to an integer"
    )]
    UndefinedIntegerNarrowing { function: MathFn, kind: ElementKind },

    #[error("compilation aborted: {0}")]
    Aborted(String),
}

/// A compilation failure observed through the cache.
///
/// Every caller waiting on the same key receives a clone of the same error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to compile {key}: {source}")]
pub struct CacheCompileError {
    pub key: String,
    pub source: CompilationError,
}

/// A dispatch could not be carried out
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LaunchError {
    #[error("kernel {kernel} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        kernel: String,
        expected: usize,
        actual: usize,
    },

    #[error("argument {index} of {kernel}: expected {expected}, got {actual}")]
    SignatureMismatch {
        kernel: String,
        index: usize,
        expected: TypeSignature,
        actual: TypeSignature,
    },

    #[error("argument {index}: shape {actual:?} does not match output shape {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("invalid launch configuration: {0}")]
    InvalidConfiguration(String),

    #[error("device allocation of {requested} bytes failed ({in_use} of {capacity} bytes in use)")]
    Allocation {
        requested: usize,
        in_use: usize,
        capacity: usize,
    },

    #[error("kernel fault in {kernel} at element {element}: {reason}")]
    KernelFault {
        kernel: String,
        element: usize,
        reason: String,
    },

    #[error("stream {0} is closed")]
    StreamClosed(u64),

    #[error("host transfer failed: {0}")]
    HostTransfer(String),
}

/// Failure describing or converting a host value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("element kind mismatch: value holds {actual}, requested {requested}")]
    KindMismatch {
        requested: ElementKind,
        actual: ElementKind,
    },

    #[error("byte length {actual} does not match {expected} expected for shape {shape:?}")]
    ByteLength {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("invalid shape {shape:?}: {reason}")]
    InvalidShape { shape: Vec<usize>, reason: String },

    #[error("no output kind for {function} over {inputs}")]
    NoLoop { function: MathFn, inputs: String },
}

/// Error from the combined compile-and-launch entry points
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Compile(#[from] CacheCompileError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl DispatchError {
    /// The underlying compilation error, if this dispatch failed to compile
    pub fn compilation_error(&self) -> Option<&CompilationError> {
        match self {
            DispatchError::Compile(e) => Some(&e.source),
            _ => None,
        }
    }
}
