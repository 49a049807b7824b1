//! Native MPI transport (cargo feature `mpi`).
//!
//! Thin safe wrapper over the C shim in `csrc/`. All handle and buffer
//! conventions live in the shim; this module converts [`Payload`]
//! buffers to raw pointers, turns nonzero return codes into
//! [`Error::Mpi`] with the stringified error class, and keeps the
//! bookkeeping for posted receives (the shim owns the bytes until the
//! wait, but the wire kind and size are known only here).

use std::collections::HashMap;
use std::os::raw::{c_char, c_int, c_void};

use log::debug;

use crate::backend::{BackendRequest, CommHandle, MpiBackend};
use crate::datatype::ReduceOp;
use crate::error::{Error, Result};
use crate::ffi;
use crate::status::Status;
use crate::value::{Payload, WireKind};

const UNDEFINED_COLOR: i32 = -1;

/// Convert an MPI return code into a `Result`.
fn check(code: c_int) -> Result<()> {
    if code == 0 {
        return Ok(());
    }
    let mut class = 0i32;
    let mut len = 0i32;
    let mut buf = [0 as c_char; 512];
    unsafe {
        ffi::mpish_error_info(code, &mut class, buf.as_mut_ptr(), &mut len);
    }
    let bytes: Vec<u8> = buf[..len.max(0) as usize]
        .iter()
        .map(|&c| c as u8)
        .collect();
    Err(Error::Mpi {
        code: class,
        message: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// The datatype tag for a wire kind.
fn type_tag(kind: WireKind) -> i32 {
    match kind {
        WireKind::Text => ffi::TYPE_BYTE,
        WireKind::Int => ffi::TYPE_INT,
        WireKind::Double => ffi::TYPE_DOUBLE,
    }
}

/// Element size in bytes for a wire kind.
fn elem_size(kind: WireKind) -> usize {
    match kind {
        WireKind::Text => 1,
        WireKind::Int => std::mem::size_of::<i32>(),
        WireKind::Double => std::mem::size_of::<f64>(),
    }
}

/// Pointer, element count, and datatype tag for a send buffer.
///
/// `pairwise` sends integer payloads as (value, index) pairs.
fn send_parts(data: &Payload, pairwise: bool) -> (*const c_void, i64, i32) {
    match data {
        Payload::Text(s) => (s.as_ptr().cast(), s.len() as i64, ffi::TYPE_BYTE),
        Payload::Int(v) if pairwise => (
            v.as_ptr().cast(),
            (v.len() / 2) as i64,
            ffi::TYPE_INT_PAIR,
        ),
        Payload::Int(v) => (v.as_ptr().cast(), v.len() as i64, ffi::TYPE_INT),
        Payload::Double(v) => (v.as_ptr().cast(), v.len() as i64, ffi::TYPE_DOUBLE),
    }
}

/// A typed receive buffer MPI can write into. Text data arrives as raw
/// bytes and becomes a string only after the transfer, so a partial or
/// non-UTF-8 message can never corrupt a `String`.
enum RecvBuf {
    Text(Vec<u8>),
    Int(Vec<i32>),
    Double(Vec<f64>),
}

impl RecvBuf {
    fn new(kind: WireKind, len: usize) -> Self {
        match kind {
            WireKind::Text => RecvBuf::Text(vec![0; len]),
            WireKind::Int => RecvBuf::Int(vec![0; len]),
            WireKind::Double => RecvBuf::Double(vec![0.0; len]),
        }
    }

    fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            RecvBuf::Text(v) => v.as_mut_ptr().cast(),
            RecvBuf::Int(v) => v.as_mut_ptr().cast(),
            RecvBuf::Double(v) => v.as_mut_ptr().cast(),
        }
    }

    /// Convert to a payload; `bytes` is the actual transferred size,
    /// which trims text buffers sized from an upper bound.
    fn into_payload(self, bytes: usize) -> Payload {
        match self {
            RecvBuf::Text(mut v) => {
                v.truncate(bytes);
                Payload::Text(String::from_utf8_lossy(&v).into_owned())
            }
            RecvBuf::Int(v) => Payload::Int(v),
            RecvBuf::Double(v) => Payload::Double(v),
        }
    }
}

/// Transport over a real MPI library.
#[derive(Debug, Default)]
pub struct NativeBackend {
    /// Wire kind and element count of posted receives, keyed by the
    /// shim's request handle.
    posted: HashMap<i64, (WireKind, usize)>,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MpiBackend for NativeBackend {
    fn init(&mut self, _argv: &mut Vec<String>) -> Result<()> {
        // MPI-2 permits initializing without the command line; launcher
        // arguments are consumed by mpiexec before we ever run.
        check(unsafe { ffi::mpish_init() })?;
        debug!("native MPI backend initialized");
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.posted.clear();
        check(unsafe { ffi::mpish_finalize() })
    }

    fn abort(&mut self, comm: CommHandle, code: i32) -> Result<()> {
        check(unsafe { ffi::mpish_abort(comm, code) })
    }

    fn comm_size(&mut self, comm: CommHandle) -> Result<i32> {
        let mut size = 0;
        check(unsafe { ffi::mpish_comm_size(comm, &mut size) })?;
        Ok(size)
    }

    fn comm_rank(&mut self, comm: CommHandle) -> Result<i32> {
        let mut rank = 0;
        check(unsafe { ffi::mpish_comm_rank(comm, &mut rank) })?;
        Ok(rank)
    }

    fn comm_split(
        &mut self,
        comm: CommHandle,
        color: Option<i32>,
        key: i32,
    ) -> Result<CommHandle> {
        let color = color.unwrap_or(UNDEFINED_COLOR);
        let mut newcomm = 0;
        check(unsafe { ffi::mpish_comm_split(comm, color, key, &mut newcomm) })?;
        Ok(newcomm)
    }

    fn barrier(&mut self, comm: CommHandle) -> Result<()> {
        check(unsafe { ffi::mpish_barrier(comm) })
    }

    fn bcast_len(&mut self, len: i32, root: i32, comm: CommHandle) -> Result<i32> {
        let mut buf = [len];
        check(unsafe {
            ffi::mpish_bcast(buf.as_mut_ptr().cast(), 1, ffi::TYPE_INT, root, comm)
        })?;
        Ok(buf[0])
    }

    fn bcast(&mut self, data: &mut Payload, root: i32, comm: CommHandle) -> Result<()> {
        let count = data.len() as i64;
        match data {
            Payload::Text(s) => {
                let mut bytes = std::mem::take(s).into_bytes();
                check(unsafe {
                    ffi::mpish_bcast(
                        bytes.as_mut_ptr().cast(),
                        count,
                        ffi::TYPE_BYTE,
                        root,
                        comm,
                    )
                })?;
                *s = String::from_utf8_lossy(&bytes).into_owned();
            }
            Payload::Int(v) => check(unsafe {
                ffi::mpish_bcast(v.as_mut_ptr().cast(), count, ffi::TYPE_INT, root, comm)
            })?,
            Payload::Double(v) => check(unsafe {
                ffi::mpish_bcast(v.as_mut_ptr().cast(), count, ffi::TYPE_DOUBLE, root, comm)
            })?,
        }
        Ok(())
    }

    fn reduce(
        &mut self,
        send: &Payload,
        op: ReduceOp,
        pairwise: bool,
        root: Option<i32>,
        comm: CommHandle,
    ) -> Result<Payload> {
        let op = op as i32;
        let (sendptr, count, tag) = send_parts(send, pairwise);
        let mut recv = RecvBuf::new(send.kind(), send.len());
        match root {
            None => {
                check(unsafe {
                    ffi::mpish_allreduce(sendptr, recv.as_mut_ptr(), count, tag, op, comm)
                })?;
                Ok(recv.into_payload(send.byte_len()))
            }
            Some(root) => {
                check(unsafe {
                    ffi::mpish_reduce(sendptr, recv.as_mut_ptr(), count, tag, op, root, comm)
                })?;
                if self.comm_rank(comm)? == root {
                    Ok(recv.into_payload(send.byte_len()))
                } else {
                    Ok(Payload::empty(send.kind()))
                }
            }
        }
    }

    fn scatter(
        &mut self,
        send: &Payload,
        recv_len: usize,
        root: i32,
        comm: CommHandle,
    ) -> Result<Payload> {
        let (sendptr, _, tag) = send_parts(send, false);
        let kind = send.kind();
        let mut recv = RecvBuf::new(kind, recv_len);
        check(unsafe {
            ffi::mpish_scatter(sendptr, recv.as_mut_ptr(), recv_len as i64, tag, root, comm)
        })?;
        Ok(recv.into_payload(recv_len * elem_size(kind)))
    }

    fn gather(&mut self, send: &Payload, root: i32, comm: CommHandle) -> Result<Payload> {
        let size = self.comm_size(comm)? as usize;
        let rank = self.comm_rank(comm)?;
        let kind = send.kind();
        let (sendptr, count, tag) = send_parts(send, false);
        let total = send.len() * size;
        // MPI ignores the receive buffer on non-root ranks.
        let mut recv = if rank == root {
            RecvBuf::new(kind, total)
        } else {
            RecvBuf::new(kind, 0)
        };
        check(unsafe {
            ffi::mpish_gather(sendptr, count, recv.as_mut_ptr(), tag, root, comm)
        })?;
        if rank == root {
            Ok(recv.into_payload(total * elem_size(kind)))
        } else {
            Ok(Payload::empty(kind))
        }
    }

    fn send(&mut self, data: &Payload, dest: i32, tag: i32, comm: CommHandle) -> Result<()> {
        let (ptr, count, dtag) = send_parts(data, false);
        check(unsafe { ffi::mpish_send(ptr, count, dtag, dest, tag, comm) })
    }

    fn recv(
        &mut self,
        kind: WireKind,
        len: usize,
        source: i32,
        tag: i32,
        comm: CommHandle,
    ) -> Result<(Payload, Status)> {
        let mut recv = RecvBuf::new(kind, len);
        let mut src = 0;
        let mut tg = 0;
        let mut bytes = 0i64;
        check(unsafe {
            ffi::mpish_recv(
                recv.as_mut_ptr(),
                len as i64,
                type_tag(kind),
                source,
                tag,
                comm,
                &mut src,
                &mut tg,
                &mut bytes,
            )
        })?;
        let status = Status {
            source: src,
            tag: tg,
            error: 0,
            count_bytes: bytes as usize,
        };
        Ok((recv.into_payload(bytes as usize), status))
    }

    fn probe(&mut self, source: i32, tag: i32, comm: CommHandle) -> Result<Status> {
        let mut src = 0;
        let mut tg = 0;
        let mut bytes = 0i64;
        check(unsafe { ffi::mpish_probe(source, tag, comm, &mut src, &mut tg, &mut bytes) })?;
        Ok(Status {
            source: src,
            tag: tg,
            error: 0,
            count_bytes: bytes as usize,
        })
    }

    fn iprobe(&mut self, source: i32, tag: i32, comm: CommHandle) -> Result<Option<Status>> {
        let mut pending = 0;
        let mut src = 0;
        let mut tg = 0;
        let mut bytes = 0i64;
        check(unsafe {
            ffi::mpish_iprobe(
                source,
                tag,
                comm,
                &mut pending,
                &mut src,
                &mut tg,
                &mut bytes,
            )
        })?;
        if pending == 0 {
            return Ok(None);
        }
        Ok(Some(Status {
            source: src,
            tag: tg,
            error: 0,
            count_bytes: bytes as usize,
        }))
    }

    fn isend(
        &mut self,
        data: &Payload,
        dest: i32,
        tag: i32,
        comm: CommHandle,
    ) -> Result<BackendRequest> {
        let (ptr, count, dtag) = send_parts(data, false);
        let mut request = 0i64;
        check(unsafe { ffi::mpish_isend(ptr, count, dtag, dest, tag, comm, &mut request) })?;
        Ok(BackendRequest(request))
    }

    fn irecv(
        &mut self,
        kind: WireKind,
        len: usize,
        source: i32,
        tag: i32,
        comm: CommHandle,
    ) -> Result<BackendRequest> {
        let mut request = 0i64;
        check(unsafe {
            ffi::mpish_irecv(len as i64, type_tag(kind), source, tag, comm, &mut request)
        })?;
        self.posted.insert(request, (kind, len));
        Ok(BackendRequest(request))
    }

    fn wait(&mut self, req: BackendRequest) -> Result<(Option<Payload>, Status)> {
        let mut src = 0;
        let mut tg = 0;
        let mut bytes = 0i64;
        match self.posted.remove(&req.0) {
            Some((kind, len)) => {
                let mut recv = RecvBuf::new(kind, len);
                let bufsize = (len * elem_size(kind)) as i64;
                check(unsafe {
                    ffi::mpish_wait(
                        req.0,
                        recv.as_mut_ptr(),
                        bufsize,
                        &mut src,
                        &mut tg,
                        &mut bytes,
                    )
                })?;
                let status = Status {
                    source: src,
                    tag: tg,
                    error: 0,
                    count_bytes: bytes as usize,
                };
                Ok((Some(recv.into_payload(bytes as usize)), status))
            }
            None => {
                check(unsafe {
                    ffi::mpish_wait(
                        req.0,
                        std::ptr::null_mut(),
                        0,
                        &mut src,
                        &mut tg,
                        &mut bytes,
                    )
                })?;
                let status = Status {
                    source: src,
                    tag: tg,
                    error: 0,
                    count_bytes: bytes as usize,
                };
                Ok((None, status))
            }
        }
    }
}
