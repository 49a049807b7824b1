//! Error types for mpish.
//!
//! Every failure a script can trigger becomes a catchable interpreter error
//! with a message that names the offending command, mirroring how MPI error
//! classes are stringified and appended to the command result.

use thiserror::Error;

/// Result type for interpreter and backend operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for interpreter and backend operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A command was called with the wrong number of arguments.
    #[error("wrong # args: should be \"{usage}\"")]
    WrongArgs {
        /// Full usage string including the command name.
        usage: String,
    },

    /// The command name is not known to the interpreter.
    #[error("invalid command name \"{0}\"")]
    UnknownCommand(String),

    /// An argument that must be an integer did not parse as one.
    #[error("expected integer but got \"{0}\"")]
    ExpectedInteger(String),

    /// A communicator label is not present in the registry.
    #[error("{cmd}: unknown communicator: {label}")]
    UnknownCommunicator {
        /// Command that performed the lookup.
        cmd: String,
        /// The label that failed to resolve.
        label: String,
    },

    /// The null communicator was passed where a real one is required.
    #[error("{cmd}: invalid communicator: {label}")]
    InvalidCommunicator {
        /// Command that rejected the communicator.
        cmd: String,
        /// The offending label.
        label: String,
    },

    /// A data type string did not name any known type.
    #[error("{cmd}: invalid data type: {dtype}")]
    InvalidDatatype {
        /// Command that parsed the type.
        cmd: String,
        /// The offending type string.
        dtype: String,
    },

    /// The data type is recognized but this operation cannot use it
    /// (e.g. `mpi::auto` in a reduction).
    #[error("{cmd}: does not support data type {dtype}")]
    TypeNotAllowed {
        /// Command that rejected the type.
        cmd: String,
        /// The offending type string.
        dtype: String,
    },

    /// The data type is recognized but transfers for it are not implemented.
    #[error("{cmd}: support for data type {dtype} is not yet implemented.")]
    TypeNotImplemented {
        /// Command that rejected the type.
        cmd: String,
        /// The offending type string.
        dtype: String,
    },

    /// A reduction operator string did not name any known operator.
    #[error("{cmd}: unknown reduction operator: {op}")]
    UnknownReduceOp {
        /// Command that parsed the operator.
        cmd: String,
        /// The offending operator string.
        op: String,
    },

    /// `mpi::comm_split` was given a negative color.
    #[error("{cmd}: invalid color argument")]
    InvalidColor {
        /// The splitting command.
        cmd: String,
    },

    /// Scatter requires the element count to divide evenly.
    #[error("{cmd}: number of data items must be divisible by the number of processes")]
    NotDivisible {
        /// The scattering command.
        cmd: String,
    },

    /// Gather requires the same element count on every rank.
    #[error("{cmd}: number of data items must be the same on all processes")]
    CountMismatch {
        /// The gathering command.
        cmd: String,
    },

    /// `mpi::init` was called a second time.
    #[error("Calling {cmd} multiple times is erroneous.")]
    AlreadyInitialized {
        /// The init command as invoked.
        cmd: String,
    },

    /// `mpi::finalize` was called a second time.
    #[error("Calling {cmd} twice is erroneous.")]
    AlreadyFinalized {
        /// The finalize command as invoked.
        cmd: String,
    },

    /// `mpi::finalize` was called before `mpi::init`.
    #[error("Calling {cmd} before mpi::init is erroneous.")]
    NotInitialized {
        /// The finalize command as invoked.
        cmd: String,
    },

    /// A blocking receive or probe has no matching message and no other
    /// rank exists to produce one. Only the single-process backend can
    /// detect this; real MPI would deadlock instead.
    #[error("no pending message matching source {src}, tag {tag}")]
    NoPendingMessage {
        /// Requested source rank (-1 for any).
        src: i32,
        /// Requested message tag (-1 for any).
        tag: i32,
    },

    /// An MPI call failed. The message comes from `MPI_Error_string` for
    /// the native backend, or a synthetic class name for the local one.
    #[error("MPI error {code}: {message}")]
    Mpi {
        /// The MPI error code.
        code: i32,
        /// Stringified error class.
        message: String,
    },

    /// An MPI failure attributed to the command that triggered it.
    #[error("{cmd}: {message}")]
    Command {
        /// The failing command as invoked.
        cmd: String,
        /// Stringified error class.
        message: String,
    },

    /// Malformed script syntax (unbalanced braces, brackets, or quotes).
    #[error("script error: {0}")]
    Script(String),

    /// I/O failure while reading a script.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Attribute a raw MPI failure to the command that triggered it.
    ///
    /// The interpreter applies this to every backend call so scripts see
    /// `"<command>: <error string>"`, the same shape as its own errors.
    pub(crate) fn with_cmd(self, cmd: &str) -> Error {
        match self {
            Error::Mpi { message, .. } => Error::Command {
                cmd: cmd.to_string(),
                message,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_command() {
        let err = Error::UnknownCommunicator {
            cmd: "mpi::comm_size".into(),
            label: "comm5".into(),
        };
        assert_eq!(
            err.to_string(),
            "mpi::comm_size: unknown communicator: comm5"
        );
    }

    #[test]
    fn wrong_args_uses_tcl_phrasing() {
        let err = Error::WrongArgs {
            usage: "mpi::bcast <data> <type> <root> <comm>".into(),
        };
        assert_eq!(
            err.to_string(),
            "wrong # args: should be \"mpi::bcast <data> <type> <root> <comm>\""
        );
    }

    #[test]
    fn no_pending_message_carries_no_error_source() {
        use std::error::Error as _;
        let err = Error::NoPendingMessage { src: -1, tag: 5 };
        assert_eq!(err.to_string(), "no pending message matching source -1, tag 5");
        // The rank field is plain data, not a wrapped cause.
        assert!(err.source().is_none());
    }

    #[test]
    fn with_cmd_rewrites_mpi_errors_only() {
        let err = Error::Mpi {
            code: 5,
            message: "MPI_ERR_COMM: invalid communicator".into(),
        }
        .with_cmd("mpi::barrier");
        assert_eq!(
            err.to_string(),
            "mpi::barrier: MPI_ERR_COMM: invalid communicator"
        );

        let err = Error::InvalidColor {
            cmd: "mpi::comm_split".into(),
        }
        .with_cmd("mpi::comm_split");
        assert_eq!(err.to_string(), "mpi::comm_split: invalid color argument");
    }
}
