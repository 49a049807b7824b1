//! Raw FFI bindings to the C wrapper layer.
//!
//! These are low-level unsafe functions. Use [`crate::backend_mpi::NativeBackend`].

#![allow(dead_code)]

use std::os::raw::{c_char, c_int, c_void};

// Datatype tags matching csrc/mpish.h
pub const TYPE_BYTE: i32 = 0;
pub const TYPE_INT: i32 = 1;
pub const TYPE_DOUBLE: i32 = 2;
pub const TYPE_INT_PAIR: i32 = 3;

extern "C" {
    // ============================================================
    // Initialization and Finalization
    // ============================================================

    pub fn mpish_init() -> c_int;
    pub fn mpish_finalize() -> c_int;
    pub fn mpish_abort(comm: i32, errorcode: i32) -> c_int;

    // ============================================================
    // Communicator Operations
    // ============================================================

    pub fn mpish_comm_size(comm: i32, size: *mut i32) -> c_int;
    pub fn mpish_comm_rank(comm: i32, rank: *mut i32) -> c_int;
    pub fn mpish_comm_split(comm: i32, color: i32, key: i32, newcomm: *mut i32) -> c_int;
    pub fn mpish_barrier(comm: i32) -> c_int;

    // ============================================================
    // Collective Operations
    // ============================================================

    pub fn mpish_bcast(
        buf: *mut c_void,
        count: i64,
        datatype_tag: i32,
        root: i32,
        comm: i32,
    ) -> c_int;

    pub fn mpish_reduce(
        sendbuf: *const c_void,
        recvbuf: *mut c_void,
        count: i64,
        datatype_tag: i32,
        op: i32,
        root: i32,
        comm: i32,
    ) -> c_int;

    pub fn mpish_allreduce(
        sendbuf: *const c_void,
        recvbuf: *mut c_void,
        count: i64,
        datatype_tag: i32,
        op: i32,
        comm: i32,
    ) -> c_int;

    pub fn mpish_scatter(
        sendbuf: *const c_void,
        recvbuf: *mut c_void,
        recvcount: i64,
        datatype_tag: i32,
        root: i32,
        comm: i32,
    ) -> c_int;

    pub fn mpish_gather(
        sendbuf: *const c_void,
        sendcount: i64,
        recvbuf: *mut c_void,
        datatype_tag: i32,
        root: i32,
        comm: i32,
    ) -> c_int;

    // ============================================================
    // Point-to-Point Communication
    // ============================================================

    pub fn mpish_send(
        buf: *const c_void,
        count: i64,
        datatype_tag: i32,
        dest: i32,
        tag: i32,
        comm: i32,
    ) -> c_int;

    pub fn mpish_recv(
        buf: *mut c_void,
        count: i64,
        datatype_tag: i32,
        source: i32,
        tag: i32,
        comm: i32,
        actual_source: *mut i32,
        actual_tag: *mut i32,
        actual_bytes: *mut i64,
    ) -> c_int;

    pub fn mpish_probe(
        source: i32,
        tag: i32,
        comm: i32,
        actual_source: *mut i32,
        actual_tag: *mut i32,
        actual_bytes: *mut i64,
    ) -> c_int;

    pub fn mpish_iprobe(
        source: i32,
        tag: i32,
        comm: i32,
        pending: *mut i32,
        actual_source: *mut i32,
        actual_tag: *mut i32,
        actual_bytes: *mut i64,
    ) -> c_int;

    // ============================================================
    // Request Management
    // ============================================================

    pub fn mpish_isend(
        buf: *const c_void,
        count: i64,
        datatype_tag: i32,
        dest: i32,
        tag: i32,
        comm: i32,
        request: *mut i64,
    ) -> c_int;

    pub fn mpish_irecv(
        count: i64,
        datatype_tag: i32,
        source: i32,
        tag: i32,
        comm: i32,
        request: *mut i64,
    ) -> c_int;

    pub fn mpish_wait(
        request: i64,
        buf: *mut c_void,
        bufsize: i64,
        actual_source: *mut i32,
        actual_tag: *mut i32,
        actual_bytes: *mut i64,
    ) -> c_int;

    // ============================================================
    // Error Information
    // ============================================================

    pub fn mpish_error_info(
        code: c_int,
        error_class: *mut i32,
        message: *mut c_char,
        msg_len: *mut i32,
    ) -> c_int;
}
