//! Transport backend abstraction.
//!
//! The interpreter talks to MPI through the [`MpiBackend`] trait so the
//! whole command surface can run and be tested without an MPI
//! installation. Two implementations exist: [`LocalBackend`] here (a
//! single-process world with eager self-delivery) and `NativeBackend`
//! in `backend_mpi` (FFI to a real MPI library, behind the `mpi`
//! feature).

use std::collections::{HashMap, VecDeque};

use log::{debug, trace};

use crate::datatype::ReduceOp;
use crate::error::{Error, Result};
use crate::status::Status;
use crate::value::{Payload, WireKind};

/// Backend-scoped communicator handle.
///
/// Handles are small integers managed by the backend; the string labels
/// scripts see are managed by the communicator registry on top.
pub type CommHandle = i32;

/// Handle for `MPI_COMM_WORLD`.
pub const COMM_WORLD: CommHandle = 0;
/// Handle for `MPI_COMM_SELF`.
pub const COMM_SELF: CommHandle = 1;
/// Handle for `MPI_COMM_NULL`.
pub const COMM_NULL: CommHandle = 2;

/// Wildcard source rank (`MPI_ANY_SOURCE`).
pub const ANY_SOURCE: i32 = -1;
/// Wildcard message tag (`MPI_ANY_TAG`).
pub const ANY_TAG: i32 = -1;

/// Opaque handle to an in-flight backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendRequest(pub i64);

/// Transport operations the interpreter needs from an MPI implementation.
///
/// All buffers cross this boundary as [`Payload`] values; the two-phase
/// length exchange used by `mpi::bcast` and the deferred-receive protocol
/// live above the trait, in the interpreter.
pub trait MpiBackend {
    /// Initialize the transport. May consume launcher arguments from `argv`.
    fn init(&mut self, argv: &mut Vec<String>) -> Result<()>;

    /// Shut the transport down.
    fn finalize(&mut self) -> Result<()>;

    /// Abort all processes on the communicator with the given exit code.
    fn abort(&mut self, comm: CommHandle, code: i32) -> Result<()>;

    /// Number of processes in the communicator.
    fn comm_size(&mut self, comm: CommHandle) -> Result<i32>;

    /// Rank of the calling process in the communicator.
    fn comm_rank(&mut self, comm: CommHandle) -> Result<i32>;

    /// Split the communicator by color/key. `None` color means this rank
    /// does not join any new communicator and gets the null handle back.
    fn comm_split(&mut self, comm: CommHandle, color: Option<i32>, key: i32)
        -> Result<CommHandle>;

    /// Barrier synchronization.
    fn barrier(&mut self, comm: CommHandle) -> Result<()>;

    /// Broadcast a single element count from root; returns the root's value.
    fn bcast_len(&mut self, len: i32, root: i32, comm: CommHandle) -> Result<i32>;

    /// Broadcast a payload from root, in place. Non-root callers pass a
    /// buffer already sized by [`bcast_len`](Self::bcast_len).
    fn bcast(&mut self, data: &mut Payload, root: i32, comm: CommHandle) -> Result<()>;

    /// Reduce elementwise. `root` of `None` is an allreduce; with a root,
    /// non-root ranks receive an empty payload. `pairwise` reduces
    /// (value, index) pairs for maxloc/minloc.
    fn reduce(
        &mut self,
        send: &Payload,
        op: ReduceOp,
        pairwise: bool,
        root: Option<i32>,
        comm: CommHandle,
    ) -> Result<Payload>;

    /// Scatter equal chunks from root; every rank receives `recv_len`
    /// elements. Only the root's `send` payload is significant.
    fn scatter(
        &mut self,
        send: &Payload,
        recv_len: usize,
        root: i32,
        comm: CommHandle,
    ) -> Result<Payload>;

    /// Gather equal chunks to root; root receives the concatenation,
    /// other ranks an empty payload.
    fn gather(&mut self, send: &Payload, root: i32, comm: CommHandle) -> Result<Payload>;

    /// Blocking send.
    fn send(&mut self, data: &Payload, dest: i32, tag: i32, comm: CommHandle) -> Result<()>;

    /// Blocking receive of a message already sized by a probe.
    fn recv(
        &mut self,
        kind: WireKind,
        len: usize,
        source: i32,
        tag: i32,
        comm: CommHandle,
    ) -> Result<(Payload, Status)>;

    /// Blocking probe for a matching message.
    fn probe(&mut self, source: i32, tag: i32, comm: CommHandle) -> Result<Status>;

    /// Nonblocking probe; `None` when no matching message is pending.
    fn iprobe(&mut self, source: i32, tag: i32, comm: CommHandle) -> Result<Option<Status>>;

    /// Nonblocking send. The backend owns the data until the request
    /// completes.
    fn isend(
        &mut self,
        data: &Payload,
        dest: i32,
        tag: i32,
        comm: CommHandle,
    ) -> Result<BackendRequest>;

    /// Post a nonblocking receive for a message already sized by a probe.
    fn irecv(
        &mut self,
        kind: WireKind,
        len: usize,
        source: i32,
        tag: i32,
        comm: CommHandle,
    ) -> Result<BackendRequest>;

    /// Complete a request. Receive requests yield their payload.
    fn wait(&mut self, req: BackendRequest) -> Result<(Option<Payload>, Status)>;
}

fn err_comm() -> Error {
    Error::Mpi {
        code: 5,
        message: "MPI_ERR_COMM: invalid communicator".into(),
    }
}

fn err_rank() -> Error {
    Error::Mpi {
        code: 6,
        message: "MPI_ERR_RANK: invalid rank".into(),
    }
}

fn err_root() -> Error {
    Error::Mpi {
        code: 7,
        message: "MPI_ERR_ROOT: invalid root".into(),
    }
}

/// A queued self-delivery message.
#[derive(Debug)]
struct Message {
    tag: i32,
    payload: Payload,
}

/// Single-process transport: world size 1, rank 0, eager self-delivery.
///
/// Sends enqueue a copy of the payload on the communicator's queue and
/// complete immediately; receives match queued messages by source and
/// tag, with wildcard support. Collectives are identities. Blocking
/// calls that could never complete (no message queued, no other rank to
/// produce one) fail with [`Error::NoPendingMessage`] instead of
/// hanging.
#[derive(Debug, Default)]
pub struct LocalBackend {
    /// Index = communicator handle; `true` while the handle is usable.
    comms: Vec<bool>,
    /// Per-communicator message queues.
    queues: HashMap<CommHandle, VecDeque<Message>>,
    /// Completed-at-post requests awaiting their `wait`.
    finished: HashMap<i64, (Option<Payload>, Status)>,
    next_req: i64,
}

impl LocalBackend {
    /// Create a backend with the three built-in communicators.
    pub fn new() -> Self {
        let mut backend = LocalBackend {
            comms: vec![true, true, true],
            queues: HashMap::new(),
            finished: HashMap::new(),
            next_req: 0,
        };
        backend.queues.insert(COMM_WORLD, VecDeque::new());
        backend.queues.insert(COMM_SELF, VecDeque::new());
        backend
    }

    /// A handle is usable if it was allocated and is not the null handle.
    fn check_comm(&self, comm: CommHandle) -> Result<()> {
        let known = self
            .comms
            .get(comm as usize)
            .copied()
            .unwrap_or(false);
        if !known || comm == COMM_NULL {
            return Err(err_comm());
        }
        Ok(())
    }

    fn check_root(&self, root: i32) -> Result<()> {
        if root == 0 {
            Ok(())
        } else {
            Err(err_root())
        }
    }

    /// Position of the first queued message matching source and tag.
    fn find_match(&self, comm: CommHandle, source: i32, tag: i32) -> Option<usize> {
        if source != ANY_SOURCE && source != 0 {
            return None;
        }
        self.queues
            .get(&comm)?
            .iter()
            .position(|m| tag == ANY_TAG || m.tag == tag)
    }

    fn status_for(msg: &Message) -> Status {
        Status {
            source: 0,
            tag: msg.tag,
            error: 0,
            count_bytes: msg.payload.byte_len(),
        }
    }

    fn take_match(
        &mut self,
        comm: CommHandle,
        source: i32,
        tag: i32,
        kind: WireKind,
    ) -> Result<(Payload, Status)> {
        let pos = self
            .find_match(comm, source, tag)
            .ok_or(Error::NoPendingMessage { src: source, tag })?;
        let msg = self
            .queues
            .get_mut(&comm)
            .and_then(|q| q.remove(pos))
            .ok_or_else(|| Error::Internal("message queue desync".into()))?;
        let status = Self::status_for(&msg);
        let payload = if msg.payload.kind() == kind {
            msg.payload
        } else {
            // Typed receive of a differently-typed message: reinterpret
            // the bytes, as a real MPI transfer would.
            Payload::from_bytes(kind, &msg.payload.to_bytes())
        };
        Ok((payload, status))
    }

    fn new_request(&mut self, result: (Option<Payload>, Status)) -> BackendRequest {
        let id = self.next_req;
        self.next_req += 1;
        self.finished.insert(id, result);
        BackendRequest(id)
    }
}

impl MpiBackend for LocalBackend {
    fn init(&mut self, _argv: &mut Vec<String>) -> Result<()> {
        debug!("local backend initialized (world size 1)");
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.queues.values_mut().for_each(VecDeque::clear);
        Ok(())
    }

    fn abort(&mut self, comm: CommHandle, code: i32) -> Result<()> {
        self.check_comm(comm)?;
        log::error!("abort requested with code {code}");
        std::process::exit(code);
    }

    fn comm_size(&mut self, comm: CommHandle) -> Result<i32> {
        self.check_comm(comm)?;
        Ok(1)
    }

    fn comm_rank(&mut self, comm: CommHandle) -> Result<i32> {
        self.check_comm(comm)?;
        Ok(0)
    }

    fn comm_split(
        &mut self,
        comm: CommHandle,
        color: Option<i32>,
        _key: i32,
    ) -> Result<CommHandle> {
        self.check_comm(comm)?;
        match color {
            None => Ok(COMM_NULL),
            Some(_) => {
                let handle = self.comms.len() as CommHandle;
                self.comms.push(true);
                self.queues.insert(handle, VecDeque::new());
                trace!("split comm {comm} -> new comm {handle}");
                Ok(handle)
            }
        }
    }

    fn barrier(&mut self, comm: CommHandle) -> Result<()> {
        self.check_comm(comm)
    }

    fn bcast_len(&mut self, len: i32, root: i32, comm: CommHandle) -> Result<i32> {
        self.check_comm(comm)?;
        self.check_root(root)?;
        Ok(len)
    }

    fn bcast(&mut self, _data: &mut Payload, root: i32, comm: CommHandle) -> Result<()> {
        self.check_comm(comm)?;
        self.check_root(root)
    }

    fn reduce(
        &mut self,
        send: &Payload,
        _op: ReduceOp,
        _pairwise: bool,
        root: Option<i32>,
        comm: CommHandle,
    ) -> Result<Payload> {
        self.check_comm(comm)?;
        if let Some(root) = root {
            self.check_root(root)?;
        }
        // One rank: every reduction is the identity, including maxloc.
        Ok(send.clone())
    }

    fn scatter(
        &mut self,
        send: &Payload,
        _recv_len: usize,
        root: i32,
        comm: CommHandle,
    ) -> Result<Payload> {
        self.check_comm(comm)?;
        self.check_root(root)?;
        Ok(send.clone())
    }

    fn gather(&mut self, send: &Payload, root: i32, comm: CommHandle) -> Result<Payload> {
        self.check_comm(comm)?;
        self.check_root(root)?;
        Ok(send.clone())
    }

    fn send(&mut self, data: &Payload, dest: i32, tag: i32, comm: CommHandle) -> Result<()> {
        self.check_comm(comm)?;
        if dest != 0 {
            return Err(err_rank());
        }
        trace!("queue message tag {tag} ({} bytes)", data.byte_len());
        self.queues
            .entry(comm)
            .or_default()
            .push_back(Message {
                tag,
                payload: data.clone(),
            });
        Ok(())
    }

    fn recv(
        &mut self,
        kind: WireKind,
        _len: usize,
        source: i32,
        tag: i32,
        comm: CommHandle,
    ) -> Result<(Payload, Status)> {
        self.check_comm(comm)?;
        self.take_match(comm, source, tag, kind)
    }

    fn probe(&mut self, source: i32, tag: i32, comm: CommHandle) -> Result<Status> {
        self.check_comm(comm)?;
        self.iprobe(source, tag, comm)?
            .ok_or(Error::NoPendingMessage { src: source, tag })
    }

    fn iprobe(&mut self, source: i32, tag: i32, comm: CommHandle) -> Result<Option<Status>> {
        self.check_comm(comm)?;
        Ok(self
            .find_match(comm, source, tag)
            .map(|pos| Self::status_for(&self.queues[&comm][pos])))
    }

    fn isend(
        &mut self,
        data: &Payload,
        dest: i32,
        tag: i32,
        comm: CommHandle,
    ) -> Result<BackendRequest> {
        self.send(data, dest, tag, comm)?;
        let status = Status {
            source: 0,
            tag,
            error: 0,
            count_bytes: data.byte_len(),
        };
        Ok(self.new_request((None, status)))
    }

    fn irecv(
        &mut self,
        kind: WireKind,
        _len: usize,
        source: i32,
        tag: i32,
        comm: CommHandle,
    ) -> Result<BackendRequest> {
        self.check_comm(comm)?;
        let (payload, status) = self.take_match(comm, source, tag, kind)?;
        Ok(self.new_request((Some(payload), status)))
    }

    fn wait(&mut self, req: BackendRequest) -> Result<(Option<Payload>, Status)> {
        self.finished
            .remove(&req.0)
            .ok_or_else(|| Error::Internal(format!("unknown backend request {}", req.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> LocalBackend {
        let mut b = LocalBackend::new();
        b.init(&mut vec![]).unwrap();
        b
    }

    #[test]
    fn world_is_one_rank() {
        let mut b = backend();
        assert_eq!(b.comm_size(COMM_WORLD).unwrap(), 1);
        assert_eq!(b.comm_rank(COMM_WORLD).unwrap(), 0);
        b.barrier(COMM_WORLD).unwrap();
    }

    #[test]
    fn null_comm_is_rejected() {
        let mut b = backend();
        let err = b.comm_size(COMM_NULL).unwrap_err();
        assert!(err.to_string().contains("MPI_ERR_COMM"));
    }

    #[test]
    fn send_then_recv_round_trips() {
        let mut b = backend();
        let sent = Payload::Int(vec![1, 2, 3]);
        b.send(&sent, 0, 5, COMM_WORLD).unwrap();
        let (got, status) = b.recv(WireKind::Int, 3, 0, 5, COMM_WORLD).unwrap();
        assert_eq!(got, sent);
        assert_eq!(status.source, 0);
        assert_eq!(status.tag, 5);
        assert_eq!(status.count_bytes, 12);
    }

    #[test]
    fn recv_matches_wildcards() {
        let mut b = backend();
        b.send(&Payload::Text("hi".into()), 0, 9, COMM_WORLD).unwrap();
        let (got, status) = b
            .recv(WireKind::Text, 0, ANY_SOURCE, ANY_TAG, COMM_WORLD)
            .unwrap();
        assert_eq!(got, Payload::Text("hi".into()));
        assert_eq!(status.tag, 9);
    }

    #[test]
    fn recv_skips_nonmatching_tags() {
        let mut b = backend();
        b.send(&Payload::Int(vec![1]), 0, 1, COMM_WORLD).unwrap();
        b.send(&Payload::Int(vec![2]), 0, 2, COMM_WORLD).unwrap();
        let (got, _) = b.recv(WireKind::Int, 1, 0, 2, COMM_WORLD).unwrap();
        assert_eq!(got, Payload::Int(vec![2]));
        // The tag-1 message is still queued.
        assert!(b.iprobe(0, 1, COMM_WORLD).unwrap().is_some());
    }

    #[test]
    fn blocking_recv_without_message_fails_instead_of_hanging() {
        let mut b = backend();
        let err = b.recv(WireKind::Int, 0, 0, 3, COMM_WORLD).unwrap_err();
        assert!(matches!(err, Error::NoPendingMessage { tag: 3, .. }));
    }

    #[test]
    fn send_to_nonzero_rank_is_invalid() {
        let mut b = backend();
        let err = b.send(&Payload::Int(vec![1]), 1, 0, COMM_WORLD).unwrap_err();
        assert!(err.to_string().contains("MPI_ERR_RANK"));
    }

    #[test]
    fn iprobe_reports_pending_and_absent() {
        let mut b = backend();
        assert!(b.iprobe(ANY_SOURCE, ANY_TAG, COMM_WORLD).unwrap().is_none());
        b.send(&Payload::Double(vec![1.5]), 0, 4, COMM_WORLD).unwrap();
        let status = b.iprobe(ANY_SOURCE, ANY_TAG, COMM_WORLD).unwrap().unwrap();
        assert_eq!(status.tag, 4);
        assert_eq!(status.count_bytes, 8);
        // Probe does not consume.
        assert!(b.iprobe(ANY_SOURCE, ANY_TAG, COMM_WORLD).unwrap().is_some());
    }

    #[test]
    fn isend_and_irecv_complete_via_wait() {
        let mut b = backend();
        let req = b
            .isend(&Payload::Int(vec![7]), 0, 0, COMM_SELF)
            .unwrap();
        let (data, _) = b.wait(req).unwrap();
        assert!(data.is_none());

        let req = b.irecv(WireKind::Int, 1, 0, 0, COMM_SELF).unwrap();
        let (data, status) = b.wait(req).unwrap();
        assert_eq!(data, Some(Payload::Int(vec![7])));
        assert_eq!(status.count_bytes, 4);
    }

    #[test]
    fn wait_twice_is_an_error() {
        let mut b = backend();
        let req = b.isend(&Payload::Int(vec![1]), 0, 0, COMM_WORLD).unwrap();
        b.wait(req).unwrap();
        assert!(b.wait(req).is_err());
    }

    #[test]
    fn split_allocates_fresh_comm() {
        let mut b = backend();
        let sub = b.comm_split(COMM_WORLD, Some(0), 0).unwrap();
        assert_ne!(sub, COMM_WORLD);
        assert_eq!(b.comm_size(sub).unwrap(), 1);

        // Messages on the new comm do not leak into world.
        b.send(&Payload::Int(vec![1]), 0, 0, sub).unwrap();
        assert!(b.iprobe(ANY_SOURCE, ANY_TAG, COMM_WORLD).unwrap().is_none());
    }

    #[test]
    fn split_with_undefined_color_yields_null() {
        let mut b = backend();
        assert_eq!(b.comm_split(COMM_WORLD, None, 0).unwrap(), COMM_NULL);
    }

    #[test]
    fn collectives_are_identities() {
        let mut b = backend();
        assert_eq!(b.bcast_len(5, 0, COMM_WORLD).unwrap(), 5);

        let data = Payload::Double(vec![1.0, 2.0]);
        let out = b
            .reduce(&data, ReduceOp::Sum, false, None, COMM_WORLD)
            .unwrap();
        assert_eq!(out, data);

        let out = b.scatter(&data, 2, 0, COMM_WORLD).unwrap();
        assert_eq!(out, data);

        let out = b.gather(&data, 0, COMM_WORLD).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn collectives_validate_root() {
        let mut b = backend();
        let err = b.bcast_len(1, 3, COMM_WORLD).unwrap_err();
        assert!(err.to_string().contains("MPI_ERR_ROOT"));
    }

    #[test]
    fn typed_recv_reinterprets_bytes() {
        let mut b = backend();
        b.send(&Payload::Int(vec![42]), 0, 0, COMM_WORLD).unwrap();
        let (got, status) = b.recv(WireKind::Text, 4, 0, 0, COMM_WORLD).unwrap();
        assert_eq!(status.count_bytes, 4);
        assert!(matches!(got, Payload::Text(_)));
    }
}
