//! Nonblocking request registry.
//!
//! Each nonblocking operation returns a label like `mpi::req0` that a
//! script later passes to `mpi::wait`. Labels are never reused. A
//! receive whose message had not arrived when it was posted carries its
//! parameters instead of a backend request; the wait performs the
//! probe and receive at that point.

use std::collections::HashMap;

use crate::backend::{BackendRequest, CommHandle};
use crate::datatype::DataType;

/// State a request label resolves to.
#[derive(Debug)]
pub enum RequestState {
    /// A posted nonblocking send.
    Send {
        /// The backend request to wait on.
        req: BackendRequest,
    },
    /// A nonblocking receive whose message had already arrived, so the
    /// backend receive is posted.
    RecvPosted {
        /// The backend request to wait on.
        req: BackendRequest,
        /// Requested data type, for rendering the result.
        dtype: DataType,
        /// Element count from the sizing probe.
        len: usize,
    },
    /// A nonblocking receive with no matching message yet. The wait
    /// will probe and receive with these parameters.
    RecvDeferred {
        /// Requested data type.
        dtype: DataType,
        /// Requested source rank.
        source: i32,
        /// Requested message tag.
        tag: i32,
        /// Communicator handle.
        comm: CommHandle,
    },
}

/// Maps request labels to their state.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    requests: HashMap<String, RequestState>,
    next_id: u32,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and return its fresh label.
    pub fn add(&mut self, state: RequestState) -> String {
        let label = format!("mpi::req{}", self.next_id);
        self.next_id += 1;
        self.requests.insert(label.clone(), state);
        label
    }

    /// Remove and return the state for a label. `None` for labels that
    /// were never issued or were already waited on; waiting on those is
    /// a no-op, matching `MPI_Wait` on `MPI_REQUEST_NULL`.
    pub fn take(&mut self, label: &str) -> Option<RequestState> {
        self.requests.remove(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_count_up_and_are_not_reused() {
        let mut reg = RequestRegistry::new();
        let a = reg.add(RequestState::Send {
            req: BackendRequest(0),
        });
        let b = reg.add(RequestState::Send {
            req: BackendRequest(1),
        });
        assert_eq!(a, "mpi::req0");
        assert_eq!(b, "mpi::req1");

        assert!(reg.take(&a).is_some());
        assert!(reg.take(&a).is_none());

        // The freed label's number is not handed out again.
        let c = reg.add(RequestState::Send {
            req: BackendRequest(2),
        });
        assert_eq!(c, "mpi::req2");
    }

    #[test]
    fn unknown_label_takes_nothing() {
        let mut reg = RequestRegistry::new();
        assert!(reg.take("mpi::req7").is_none());
        assert!(reg.take("bogus").is_none());
    }
}
