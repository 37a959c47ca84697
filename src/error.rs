use thiserror::Error;

use crate::ir::Ty;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Only conditions that are fatal to the calling pass are errors. Recoverable conditions -
/// an address where no global may be synthesized, an initializer that cannot be read - are
/// reported as `None` returns by the operations that can encounter them, so that callers can
/// continue without unwinding.
///
/// # Error Categories
///
/// ## Conversion Errors
/// - [`Error::UnsupportedConversion`] - The type converter reached a pair of types it has no
///   rule for
///
/// ## Rewrite Errors
/// - [`Error::UnsupportedObjectKind`] - An object mutation was requested on a value that is
///   not an alloca, global, or argument
/// - [`Error::UnhandledUse`] - A user of a re-typed object has a shape the rewriter cannot
///   re-type (indicates a lifter producing an unexpected pattern)
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O while mapping the object-file image
/// - [`Error::ConfigFormat`] - The configuration database document could not be parsed
///
/// # Examples
///
/// ```rust
/// use liftir::{Error, ir::Ty};
///
/// fn report(e: &Error) {
///     match e {
///         Error::UnsupportedConversion { from, to } => {
///             eprintln!("no conversion rule for {from} -> {to}");
///         }
///         e => eprintln!("{e}"),
///     }
/// }
/// # report(&Error::UnsupportedConversion { from: Ty::Void, to: Ty::Int(32) });
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The type converter has no rule bridging the two types.
    ///
    /// Both types are attached so the diagnostic can name the exact pair. This is fatal to
    /// the calling pass: conversion requests are commanded by analysis passes that are
    /// expected to ask only for bridgeable pairs.
    #[error("unsupported type conversion: {from} -> {to}")]
    UnsupportedConversion {
        /// Type of the value that was to be converted.
        from: Ty,
        /// Requested target type.
        to: Ty,
    },

    /// An object mutation was requested on something other than an alloca, a global
    /// variable, or a function argument.
    ///
    /// Only those three kinds have a declaration that can be rebuilt. Anything else is a
    /// programmer error in the calling pass.
    #[error("only globals, allocas and arguments can be re-typed, got {value}")]
    UnsupportedObjectKind {
        /// Description of the offending value.
        value: String,
    },

    /// A user of a re-typed object could not be re-typed.
    ///
    /// The rewriter visits every user of a mutated object and patches it by kind. A user
    /// kind with no patch rule means the lifter produced a pattern this core does not
    /// expect; continuing would leave the program graph ill-typed.
    #[error("unhandled use while re-typing: {user} -> {ty}")]
    UnhandledUse {
        /// Description of the user that could not be patched.
        user: String,
        /// The type the object was being changed to.
        ty: Ty,
    },

    /// A constant-expression conversion was requested for a non-constant value.
    #[error("constant conversion requested for non-constant value: {value}")]
    NotAConstant {
        /// Description of the offending value.
        value: String,
    },

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while mapping the object-file image
    /// from disk.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The configuration database document is malformed.
    #[error("config document: {0}")]
    ConfigFormat(#[from] serde_json::Error),
}
