//! The command interpreter.
//!
//! [`Interp`] owns a transport backend, the communicator and request
//! registries, and the script variable table, and evaluates one command
//! at a time. Every `mpi::` command of the binding is dispatched here;
//! the script shell on top only adds tokenization and a handful of
//! shell builtins.
//!
//! Error attribution follows one rule: whatever fails, the script sees
//! `"<command>: <reason>"` with the command named as it was invoked, so
//! a `catch` around any command gets a self-describing message.

use std::collections::HashMap;

use log::debug;

use crate::backend::{MpiBackend, ANY_SOURCE, ANY_TAG};
use crate::comm::CommRegistry;
use crate::datatype::{DataType, ReduceOp};
use crate::error::{Error, Result};
use crate::request::{RequestRegistry, RequestState};
use crate::status::Status;
use crate::value::{Payload, WireKind};

/// Progress of the init/finalize state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    NotCalled,
    Initialized,
    Finalized,
}

/// An interpreter session: backend, registries, and script variables.
pub struct Interp {
    backend: Box<dyn MpiBackend>,
    comms: CommRegistry,
    reqs: RequestRegistry,
    vars: HashMap<String, String>,
    init_state: InitState,
    argv: Vec<String>,
}

fn parse_int(word: &str) -> Result<i32> {
    word.parse::<i32>()
        .map_err(|_| Error::ExpectedInteger(word.to_string()))
}

/// Parse a source rank, accepting the wildcard name.
fn parse_source(word: &str) -> Result<i32> {
    if word == "mpi::any_source" {
        Ok(ANY_SOURCE)
    } else {
        parse_int(word)
    }
}

/// Parse a message tag, accepting the wildcard name.
fn parse_tag(word: &str) -> Result<i32> {
    if word == "mpi::any_tag" {
        Ok(ANY_TAG)
    } else {
        parse_int(word)
    }
}

/// Element count of a probed message for the given wire kind.
fn probed_len(status: &Status, kind: WireKind) -> usize {
    match kind {
        WireKind::Text => status.count_char() as usize,
        WireKind::Int => status.count_int() as usize,
        WireKind::Double => status.count_double() as usize,
    }
}

/// Reject type/operator combinations a reduction cannot perform.
fn check_reduce_type(cmd: &str, dtype: DataType, op: ReduceOp) -> Result<()> {
    let type_err = |variant: fn(String, String) -> Error| {
        Err(variant(cmd.to_string(), dtype.name().to_string()))
    };
    match dtype {
        DataType::Auto => {
            type_err(|cmd, dtype| Error::TypeNotAllowed { cmd, dtype })
        }
        DataType::DoubleInt => {
            type_err(|cmd, dtype| Error::TypeNotImplemented { cmd, dtype })
        }
        DataType::IntInt if !op.is_location_op() => {
            type_err(|cmd, dtype| Error::TypeNotAllowed { cmd, dtype })
        }
        DataType::Int | DataType::Double if op.is_location_op() => {
            type_err(|cmd, dtype| Error::TypeNotAllowed { cmd, dtype })
        }
        _ => Ok(()),
    }
}

impl Interp {
    /// Create an interpreter over the given backend.
    pub fn new(backend: Box<dyn MpiBackend>) -> Self {
        Interp {
            backend,
            comms: CommRegistry::new(),
            reqs: RequestRegistry::new(),
            vars: HashMap::new(),
            init_state: InitState::NotCalled,
            argv: Vec::new(),
        }
    }

    /// Set the argument list `mpi::init` may filter launcher options from.
    pub fn set_argv(&mut self, argv: Vec<String>) {
        self.argv = argv;
    }

    /// Read a script variable (plain or array-element name).
    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Set a script variable.
    pub fn set_var(&mut self, name: &str, value: String) {
        self.vars.insert(name.to_string(), value);
    }

    /// Whether `mpi::init` has run and `mpi::finalize` has not.
    pub fn initialized(&self) -> bool {
        self.init_state == InitState::Initialized
    }

    /// Evaluate one command given as pre-substituted words.
    pub fn eval(&mut self, words: &[String]) -> Result<String> {
        let Some(first) = words.first() else {
            return Ok(String::new());
        };
        // Accept the fully qualified form.
        let cmd = first.strip_prefix("::").unwrap_or(first).to_string();
        let args = &words[1..];
        debug!("eval {cmd} ({} args)", args.len());

        match cmd.as_str() {
            "mpi::init" => self.cmd_init(&cmd, args),
            "mpi::finalize" => self.cmd_finalize(&cmd, args),
            "mpi::abort" => self.cmd_abort(&cmd, args),
            "mpi::comm_size" => self.cmd_comm_size(&cmd, args),
            "mpi::comm_rank" => self.cmd_comm_rank(&cmd, args),
            "mpi::comm_split" => self.cmd_comm_split(&cmd, args),
            "mpi::barrier" => self.cmd_barrier(&cmd, args),
            "mpi::bcast" => self.cmd_bcast(&cmd, args),
            "mpi::scatter" => self.cmd_scatter(&cmd, args),
            "mpi::gather" => self.cmd_gather(&cmd, args),
            "mpi::allreduce" => self.cmd_reduce(&cmd, args, false),
            "mpi::reduce" => self.cmd_reduce(&cmd, args, true),
            "mpi::send" => self.cmd_send(&cmd, args, false),
            "mpi::isend" => self.cmd_send(&cmd, args, true),
            "mpi::recv" => self.cmd_recv(&cmd, args),
            "mpi::irecv" => self.cmd_irecv(&cmd, args),
            "mpi::probe" => self.cmd_probe(&cmd, args, true),
            "mpi::iprobe" => self.cmd_probe(&cmd, args, false),
            "mpi::wait" => self.cmd_wait(&cmd, args),
            _ => Err(Error::UnknownCommand(cmd)),
        }
    }

    fn usage(cmd: &str, rest: &str) -> Error {
        let usage = if rest.is_empty() {
            cmd.to_string()
        } else {
            format!("{cmd} {rest}")
        };
        Error::WrongArgs { usage }
    }

    /// Write a status array: one variable per entry, named
    /// `<array>(<field>)`. Stale entries from a previous use of the
    /// array are cleared first.
    fn set_status(&mut self, array: &str, status: &Status) {
        let prefix = format!("{array}(");
        self.vars.retain(|k, _| !k.starts_with(&prefix));
        for (field, value) in status.entries() {
            self.vars.insert(format!("{array}({field})"), value.to_string());
        }
    }

    fn cmd_init(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        if !args.is_empty() {
            return Err(Self::usage(cmd, ""));
        }
        match self.init_state {
            InitState::NotCalled => {
                let mut argv = std::mem::take(&mut self.argv);
                self.backend.init(&mut argv).map_err(|e| e.with_cmd(cmd))?;
                self.argv = argv;
                self.init_state = InitState::Initialized;
                Ok(String::new())
            }
            _ => Err(Error::AlreadyInitialized {
                cmd: cmd.to_string(),
            }),
        }
    }

    fn cmd_finalize(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        if !args.is_empty() {
            return Err(Self::usage(cmd, ""));
        }
        match self.init_state {
            InitState::Initialized => {
                self.backend.finalize().map_err(|e| e.with_cmd(cmd))?;
                self.init_state = InitState::Finalized;
                Ok(String::new())
            }
            InitState::Finalized => Err(Error::AlreadyFinalized {
                cmd: cmd.to_string(),
            }),
            InitState::NotCalled => Err(Error::NotInitialized {
                cmd: cmd.to_string(),
            }),
        }
    }

    fn cmd_abort(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        let [comm, code] = args else {
            return Err(Self::usage(cmd, "<comm> <errorcode>"));
        };
        let comm = self.comms.lookup(cmd, comm)?;
        let code = parse_int(code)?;
        self.backend.abort(comm, code).map_err(|e| e.with_cmd(cmd))?;
        Ok(String::new())
    }

    fn cmd_comm_size(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        let [comm] = args else {
            return Err(Self::usage(cmd, "<comm>"));
        };
        let comm = self.comms.lookup(cmd, comm)?;
        let size = self.backend.comm_size(comm).map_err(|e| e.with_cmd(cmd))?;
        Ok(size.to_string())
    }

    fn cmd_comm_rank(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        let [comm] = args else {
            return Err(Self::usage(cmd, "<comm>"));
        };
        let comm = self.comms.lookup(cmd, comm)?;
        let rank = self.backend.comm_rank(comm).map_err(|e| e.with_cmd(cmd))?;
        Ok(rank.to_string())
    }

    fn cmd_comm_split(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        let [comm, color, key] = args else {
            return Err(Self::usage(cmd, "<comm> <color> <key>"));
        };
        let comm = self.comms.lookup(cmd, comm)?;
        let color = if color == "mpi::undefined" {
            None
        } else {
            let c = parse_int(color)?;
            if c < 0 {
                return Err(Error::InvalidColor {
                    cmd: cmd.to_string(),
                });
            }
            Some(c)
        };
        let key = parse_int(key)?;
        let new = self
            .backend
            .comm_split(comm, color, key)
            .map_err(|e| e.with_cmd(cmd))?;
        Ok(self.comms.add(new))
    }

    fn cmd_barrier(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        let [comm] = args else {
            return Err(Self::usage(cmd, "<comm>"));
        };
        let comm = self.comms.lookup_valid(cmd, comm)?;
        self.backend.barrier(comm).map_err(|e| e.with_cmd(cmd))?;
        Ok(String::new())
    }

    fn cmd_bcast(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        let [data, dtype, root, comm] = args else {
            return Err(Self::usage(cmd, "<data> <type> <root> <comm>"));
        };
        let dtype = DataType::parse(cmd, dtype)?;
        let root = parse_int(root)?;
        let comm = self.comms.lookup_valid(cmd, comm)?;

        let rank = self.backend.comm_rank(comm).map_err(|e| e.with_cmd(cmd))?;
        let mut payload = Payload::from_word(cmd, dtype, data)?;
        let kind = payload.kind();

        // Two phases: the root announces the element count, then the
        // payload itself follows.
        let my_len = if rank == root { payload.len() as i32 } else { 0 };
        let len = self
            .backend
            .bcast_len(my_len, root, comm)
            .map_err(|e| e.with_cmd(cmd))?;
        if rank != root {
            payload = Payload::zeroed(kind, len as usize);
        }
        self.backend
            .bcast(&mut payload, root, comm)
            .map_err(|e| e.with_cmd(cmd))?;
        Ok(payload.to_result())
    }

    fn cmd_scatter(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        let [data, dtype, root, comm] = args else {
            return Err(Self::usage(cmd, "<data> <type> <root> <comm>"));
        };
        let dtype = DataType::parse(cmd, dtype)?;
        if dtype == DataType::Auto {
            return Err(Error::TypeNotAllowed {
                cmd: cmd.to_string(),
                dtype: dtype.name().to_string(),
            });
        }
        let root = parse_int(root)?;
        let comm = self.comms.lookup_valid(cmd, comm)?;

        let payload = Payload::from_word(cmd, dtype, data)?;
        let size = self.backend.comm_size(comm).map_err(|e| e.with_cmd(cmd))?;
        // Only the root's count matters; everyone learns it here.
        let len = self
            .backend
            .bcast_len(payload.len() as i32, root, comm)
            .map_err(|e| e.with_cmd(cmd))?;
        if len % size != 0 {
            return Err(Error::NotDivisible {
                cmd: cmd.to_string(),
            });
        }
        let out = self
            .backend
            .scatter(&payload, (len / size) as usize, root, comm)
            .map_err(|e| e.with_cmd(cmd))?;
        Ok(out.to_result())
    }

    fn cmd_gather(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        let [data, dtype, root, comm] = args else {
            return Err(Self::usage(cmd, "<data> <type> <root> <comm>"));
        };
        let dtype = DataType::parse(cmd, dtype)?;
        if dtype == DataType::Auto {
            return Err(Error::TypeNotAllowed {
                cmd: cmd.to_string(),
                dtype: dtype.name().to_string(),
            });
        }
        let root = parse_int(root)?;
        let comm = self.comms.lookup_valid(cmd, comm)?;

        let payload = Payload::from_word(cmd, dtype, data)?;
        // Gather needs equal counts everywhere; compare the global
        // extremes of the local count.
        let len = Payload::Int(vec![payload.len() as i32]);
        let max = self
            .backend
            .reduce(&len, ReduceOp::Max, false, None, comm)
            .map_err(|e| e.with_cmd(cmd))?;
        let min = self
            .backend
            .reduce(&len, ReduceOp::Min, false, None, comm)
            .map_err(|e| e.with_cmd(cmd))?;
        if max != min {
            return Err(Error::CountMismatch {
                cmd: cmd.to_string(),
            });
        }
        let out = self
            .backend
            .gather(&payload, root, comm)
            .map_err(|e| e.with_cmd(cmd))?;
        Ok(out.to_result())
    }

    fn cmd_reduce(&mut self, cmd: &str, args: &[String], rooted: bool) -> Result<String> {
        let (data, dtype, op, root, comm) = if rooted {
            let [data, dtype, op, root, comm] = args else {
                return Err(Self::usage(cmd, "<data> <type> <op> <root> <comm>"));
            };
            (data, dtype, op, Some(root), comm)
        } else {
            let [data, dtype, op, comm] = args else {
                return Err(Self::usage(cmd, "<data> <type> <op> <comm>"));
            };
            (data, dtype, op, None, comm)
        };
        let dtype = DataType::parse(cmd, dtype)?;
        let op = ReduceOp::parse(cmd, op)?;
        check_reduce_type(cmd, dtype, op)?;
        let root = root.map(|r| parse_int(r)).transpose()?;
        let comm = self.comms.lookup_valid(cmd, comm)?;

        // Pair data only exists inside reductions; everywhere else the
        // pair types are unimplemented transfers.
        let payload = if dtype == DataType::IntInt {
            Payload::int_pairs(data)
        } else {
            Payload::from_word(cmd, dtype, data)?
        };
        let out = self
            .backend
            .reduce(&payload, op, op.is_location_op(), root, comm)
            .map_err(|e| e.with_cmd(cmd))?;
        Ok(out.to_result())
    }

    fn cmd_send(&mut self, cmd: &str, args: &[String], nonblocking: bool) -> Result<String> {
        let [data, dtype, dest, tag, comm] = args else {
            return Err(Self::usage(cmd, "<data> <type> <dest> <tag> <comm>"));
        };
        let dtype = DataType::parse(cmd, dtype)?;
        let dest = parse_int(dest)?;
        let tag = parse_int(tag)?;
        let comm = self.comms.lookup_valid(cmd, comm)?;

        let payload = Payload::from_word(cmd, dtype, data)?;
        if nonblocking {
            let req = self
                .backend
                .isend(&payload, dest, tag, comm)
                .map_err(|e| e.with_cmd(cmd))?;
            Ok(self.reqs.add(RequestState::Send { req }))
        } else {
            self.backend
                .send(&payload, dest, tag, comm)
                .map_err(|e| e.with_cmd(cmd))?;
            Ok(String::new())
        }
    }

    fn cmd_recv(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        let (dtype, source, tag, comm, status_var) = match args {
            [dtype, source, tag, comm] => (dtype, source, tag, comm, None),
            [dtype, source, tag, comm, status] => (dtype, source, tag, comm, Some(status)),
            _ => return Err(Self::usage(cmd, "<type> <source> <tag> <comm> ?status?")),
        };
        let dtype = DataType::parse(cmd, dtype)?;
        let kind = dtype.wire_kind().ok_or_else(|| Error::TypeNotImplemented {
            cmd: cmd.to_string(),
            dtype: dtype.name().to_string(),
        })?;
        let source = parse_source(source)?;
        let tag = parse_tag(tag)?;
        let comm = self.comms.lookup_valid(cmd, comm)?;

        // Size the receive with a probe, then receive exactly the probed
        // message by re-targeting its actual source and tag. With
        // wildcards this avoids racing against a different message.
        let probed = self
            .backend
            .probe(source, tag, comm)
            .map_err(|e| e.with_cmd(cmd))?;
        let (payload, status) = self
            .backend
            .recv(kind, probed_len(&probed, kind), probed.source, probed.tag, comm)
            .map_err(|e| e.with_cmd(cmd))?;
        if let Some(var) = status_var {
            self.set_status(var, &status);
        }
        Ok(payload.to_result())
    }

    fn cmd_irecv(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        let [dtype, source, tag, comm] = args else {
            return Err(Self::usage(cmd, "<type> <source> <tag> <comm>"));
        };
        let dtype = DataType::parse(cmd, dtype)?;
        let kind = dtype.wire_kind().ok_or_else(|| Error::TypeNotImplemented {
            cmd: cmd.to_string(),
            dtype: dtype.name().to_string(),
        })?;
        let source = parse_source(source)?;
        let tag = parse_tag(tag)?;
        let comm_handle = self.comms.lookup_valid(cmd, comm)?;

        // Post the receive only if a matching message is already
        // pending; otherwise defer it to the wait, which then knows the
        // message size from its own probe.
        let state = match self
            .backend
            .iprobe(source, tag, comm_handle)
            .map_err(|e| e.with_cmd(cmd))?
        {
            Some(probed) => {
                let len = probed_len(&probed, kind);
                let req = self
                    .backend
                    .irecv(kind, len, probed.source, probed.tag, comm_handle)
                    .map_err(|e| e.with_cmd(cmd))?;
                RequestState::RecvPosted { req, dtype, len }
            }
            None => RequestState::RecvDeferred {
                dtype,
                source,
                tag,
                comm: comm_handle,
            },
        };
        Ok(self.reqs.add(state))
    }

    fn cmd_probe(&mut self, cmd: &str, args: &[String], blocking: bool) -> Result<String> {
        let (source, tag, comm, status_var) = match args {
            [source, tag, comm] => (source, tag, comm, None),
            [source, tag, comm, status] => (source, tag, comm, Some(status)),
            _ => return Err(Self::usage(cmd, "<source> <tag> <comm> ?status?")),
        };
        let source = parse_source(source)?;
        let tag = parse_tag(tag)?;
        let comm = self.comms.lookup_valid(cmd, comm)?;

        if blocking {
            let status = self
                .backend
                .probe(source, tag, comm)
                .map_err(|e| e.with_cmd(cmd))?;
            if let Some(var) = status_var {
                self.set_status(var, &status);
            }
            Ok(String::new())
        } else {
            match self
                .backend
                .iprobe(source, tag, comm)
                .map_err(|e| e.with_cmd(cmd))?
            {
                Some(status) => {
                    if let Some(var) = status_var {
                        self.set_status(var, &status);
                    }
                    Ok("1".to_string())
                }
                None => Ok("0".to_string()),
            }
        }
    }

    fn cmd_wait(&mut self, cmd: &str, args: &[String]) -> Result<String> {
        let (label, status_var) = match args {
            [label] => (label, None),
            [label, status] => (label, Some(status)),
            _ => return Err(Self::usage(cmd, "<request> ?status?")),
        };
        // Unknown or already-completed labels are a no-op, like waiting
        // on MPI_REQUEST_NULL.
        let Some(state) = self.reqs.take(label) else {
            return Ok(String::new());
        };

        let (result, status) = match state {
            RequestState::Send { req } => {
                let (_, status) = self.backend.wait(req).map_err(|e| e.with_cmd(cmd))?;
                (String::new(), status)
            }
            RequestState::RecvPosted { req, .. } => {
                let (payload, status) =
                    self.backend.wait(req).map_err(|e| e.with_cmd(cmd))?;
                let text = payload.map(|p| p.to_result()).unwrap_or_default();
                (text, status)
            }
            RequestState::RecvDeferred {
                dtype,
                source,
                tag,
                comm,
            } => {
                // The message had not arrived when the receive was
                // posted; complete it as a blocking probe and receive.
                let kind = dtype.wire_kind().ok_or_else(|| Error::TypeNotImplemented {
                    cmd: cmd.to_string(),
                    dtype: dtype.name().to_string(),
                })?;
                let probed = self
                    .backend
                    .probe(source, tag, comm)
                    .map_err(|e| e.with_cmd(cmd))?;
                let (payload, status) = self
                    .backend
                    .recv(kind, probed_len(&probed, kind), probed.source, probed.tag, comm)
                    .map_err(|e| e.with_cmd(cmd))?;
                (payload.to_result(), status)
            }
        };
        if let Some(var) = status_var {
            self.set_status(var, &status);
        }
        Ok(result)
    }
}
