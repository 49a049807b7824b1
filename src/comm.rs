//! Communicator label registry.
//!
//! Scripts never see backend handles; they see string labels like
//! `mpi::comm0`. The registry maps labels to handles and back, keeps the
//! three built-in communicators registered under fixed names, and
//! deduplicates handles so repeated splits that produce the same backend
//! handle reuse the existing label.

use std::collections::HashMap;

use crate::backend::{CommHandle, COMM_NULL, COMM_SELF, COMM_WORLD};
use crate::error::{Error, Result};

/// Label for the world communicator.
pub const LABEL_WORLD: &str = "mpi::comm_world";
/// Label for the self communicator.
pub const LABEL_SELF: &str = "mpi::comm_self";
/// Label for the null communicator.
pub const LABEL_NULL: &str = "mpi::comm_null";

/// Bidirectional map between script labels and backend handles.
#[derive(Debug)]
pub struct CommRegistry {
    by_label: HashMap<String, CommHandle>,
    by_handle: HashMap<CommHandle, String>,
    next_id: u32,
}

impl Default for CommRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommRegistry {
    /// Registry with the built-in communicators pre-registered.
    pub fn new() -> Self {
        let mut reg = CommRegistry {
            by_label: HashMap::new(),
            by_handle: HashMap::new(),
            next_id: 0,
        };
        reg.register(LABEL_WORLD.to_string(), COMM_WORLD);
        reg.register(LABEL_SELF.to_string(), COMM_SELF);
        reg.register(LABEL_NULL.to_string(), COMM_NULL);
        reg
    }

    fn register(&mut self, label: String, handle: CommHandle) {
        self.by_handle.insert(handle, label.clone());
        self.by_label.insert(label, handle);
    }

    /// Label a handle, reusing the existing label if the handle is
    /// already registered.
    pub fn add(&mut self, handle: CommHandle) -> String {
        if let Some(label) = self.by_handle.get(&handle) {
            return label.clone();
        }
        let label = format!("mpi::comm{}", self.next_id);
        self.next_id += 1;
        self.register(label.clone(), handle);
        label
    }

    /// Resolve a label to its handle, attributing failure to `cmd`.
    pub fn lookup(&self, cmd: &str, label: &str) -> Result<CommHandle> {
        self.by_label
            .get(label)
            .copied()
            .ok_or_else(|| Error::UnknownCommunicator {
                cmd: cmd.to_string(),
                label: label.to_string(),
            })
    }

    /// Resolve a label and reject the null communicator.
    ///
    /// Commands that transfer data cannot operate on `mpi::comm_null`.
    pub fn lookup_valid(&self, cmd: &str, label: &str) -> Result<CommHandle> {
        let handle = self.lookup(cmd, label)?;
        if handle == COMM_NULL {
            return Err(Error::InvalidCommunicator {
                cmd: cmd.to_string(),
                label: label.to_string(),
            });
        }
        Ok(handle)
    }

    /// The label for a handle, if registered.
    pub fn label_of(&self, handle: CommHandle) -> Option<&str> {
        self.by_handle.get(&handle).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve() {
        let reg = CommRegistry::new();
        assert_eq!(reg.lookup("mpi::comm_size", LABEL_WORLD).unwrap(), COMM_WORLD);
        assert_eq!(reg.lookup("mpi::comm_size", LABEL_SELF).unwrap(), COMM_SELF);
        assert_eq!(reg.lookup("mpi::comm_size", LABEL_NULL).unwrap(), COMM_NULL);
    }

    #[test]
    fn unknown_label_is_an_error() {
        let reg = CommRegistry::new();
        let err = reg.lookup("mpi::comm_size", "mpi::comm9").unwrap_err();
        assert_eq!(
            err.to_string(),
            "mpi::comm_size: unknown communicator: mpi::comm9"
        );
    }

    #[test]
    fn null_comm_is_rejected_where_invalid() {
        let reg = CommRegistry::new();
        let err = reg.lookup_valid("mpi::probe", LABEL_NULL).unwrap_err();
        assert_eq!(
            err.to_string(),
            "mpi::probe: invalid communicator: mpi::comm_null"
        );
        // But a plain lookup still resolves it.
        reg.lookup("mpi::comm_rank", LABEL_NULL).unwrap();
    }

    #[test]
    fn labels_count_up_and_deduplicate() {
        let mut reg = CommRegistry::new();
        let a = reg.add(10);
        let b = reg.add(11);
        assert_eq!(a, "mpi::comm0");
        assert_eq!(b, "mpi::comm1");
        // Same handle again reuses the label.
        assert_eq!(reg.add(10), "mpi::comm0");
        assert_eq!(reg.lookup("mpi::barrier", &b).unwrap(), 11);
    }

    #[test]
    fn adding_a_builtin_handle_reuses_its_name() {
        let mut reg = CommRegistry::new();
        assert_eq!(reg.add(COMM_NULL), LABEL_NULL);
    }
}
