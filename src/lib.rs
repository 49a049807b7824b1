//! # mpish
//!
//! MPI message passing for scripts. mpish exposes the core MPI
//! primitives (point-to-point, collectives, communicator management,
//! nonblocking requests) as commands of a small Tcl-like shell, so
//! parallel plumbing can be scripted instead of compiled.
//!
//! Scripts never touch MPI objects directly. Communicators and
//! requests are referred to by string labels (`mpi::comm0`,
//! `mpi::req0`), data types and reduction operators by `mpi::`-prefixed
//! names, and every failure surfaces as a catchable error whose message
//! names the failing command.
//!
//! ## Backends
//!
//! The interpreter drives a transport through the [`MpiBackend`] trait:
//!
//! - [`LocalBackend`] (default): a single-process world, rank 0 of
//!   size 1, with eager self-delivery of messages. The whole command
//!   surface works without an MPI installation.
//! - `NativeBackend` (cargo feature `mpi`): a real MPI library, linked
//!   through a small C shim discovered via `pkg-config` or `mpicc`.
//!
//! ## Example
//!
//! ```no_run
//! use mpish::{Interp, LocalBackend, Shell};
//!
//! let interp = Interp::new(Box::new(LocalBackend::new()));
//! let mut shell = Shell::new(interp);
//! shell.eval_script("mpi::init").unwrap();
//! let rank = shell.eval_script("mpi::comm_rank mpi::comm_world").unwrap();
//! assert_eq!(rank, "0");
//! shell.eval_script("mpi::finalize").unwrap();
//! ```

pub mod backend;
pub mod comm;
pub mod datatype;
pub mod error;
pub mod interp;
pub mod request;
pub mod script;
pub mod status;
pub mod value;

#[cfg(feature = "mpi")]
mod ffi;

#[cfg(feature = "mpi")]
pub mod backend_mpi;

pub use backend::{BackendRequest, CommHandle, LocalBackend, MpiBackend};
#[cfg(feature = "mpi")]
pub use backend_mpi::NativeBackend;
pub use datatype::{DataType, ReduceOp};
pub use error::{Error, Result};
pub use interp::Interp;
pub use script::Shell;
pub use status::Status;
pub use value::Payload;

/// The default transport for this build: native MPI when the `mpi`
/// feature is enabled, the single-process backend otherwise.
pub fn default_backend() -> Box<dyn MpiBackend> {
    #[cfg(feature = "mpi")]
    {
        Box::new(NativeBackend::new())
    }
    #[cfg(not(feature = "mpi"))]
    {
        Box::new(LocalBackend::new())
    }
}
