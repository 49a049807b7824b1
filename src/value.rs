//! Conversion between script words and typed message payloads.
//!
//! Scripts pass data as a single list-valued word; communication commands
//! convert it to a typed buffer and convert received buffers back. Element
//! conversion is deliberately forgiving: a word that does not parse as the
//! requested type becomes `0` / `0.0` instead of failing the command, so a
//! stray string in a numeric list cannot abort a collective that the other
//! ranks have already entered.

use crate::datatype::DataType;
use crate::error::{Error, Result};

/// The wire representation of a payload, without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    /// Raw bytes.
    Text,
    /// 32-bit integers.
    Int,
    /// 64-bit floats.
    Double,
}

impl DataType {
    /// The wire representation used to transfer this data type, if any.
    ///
    /// The pair types exist only for location reductions; they have no
    /// point-to-point or broadcast representation.
    pub fn wire_kind(&self) -> Option<WireKind> {
        match self {
            DataType::Auto => Some(WireKind::Text),
            DataType::Int => Some(WireKind::Int),
            DataType::Double => Some(WireKind::Double),
            DataType::IntInt | DataType::DoubleInt => None,
        }
    }
}

/// A typed message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw string data (`mpi::auto`).
    Text(String),
    /// 32-bit integers (`mpi::int`, `mpi::intint`).
    Int(Vec<i32>),
    /// 64-bit floats (`mpi::double`).
    Double(Vec<f64>),
}

impl Payload {
    /// Number of elements (bytes for text).
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Int(v) => v.len(),
            Payload::Double(v) => v.len(),
        }
    }

    /// Whether the payload holds no data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the payload in bytes, as `MPI_Get_count(MPI_CHAR)` would
    /// report it.
    pub fn byte_len(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Int(v) => v.len() * std::mem::size_of::<i32>(),
            Payload::Double(v) => v.len() * std::mem::size_of::<f64>(),
        }
    }

    /// Build a payload from a script word according to `dtype`.
    ///
    /// `cmd` is used to attribute errors for types without a transfer
    /// representation.
    pub fn from_word(cmd: &str, dtype: DataType, word: &str) -> Result<Self> {
        match dtype {
            DataType::Auto => Ok(Payload::Text(word.to_string())),
            DataType::Int => Ok(Payload::Int(words_to_ints(&split_list(word)))),
            DataType::Double => Ok(Payload::Double(words_to_doubles(&split_list(word)))),
            DataType::IntInt | DataType::DoubleInt => Err(Error::TypeNotImplemented {
                cmd: cmd.to_string(),
                dtype: dtype.name().to_string(),
            }),
        }
    }

    /// Integer (value, index) pairs for location reductions. This is
    /// the only way `mpi::intint` data enters a transfer.
    pub fn int_pairs(word: &str) -> Self {
        Payload::Int(words_to_ints(&split_list(word)))
    }

    /// Render the payload as a script result string.
    pub fn to_result(&self) -> String {
        match self {
            Payload::Text(s) => s.clone(),
            Payload::Int(v) => join_ints(v),
            Payload::Double(v) => join_doubles(v),
        }
    }

    /// The wire representation of this payload.
    pub fn kind(&self) -> WireKind {
        match self {
            Payload::Text(_) => WireKind::Text,
            Payload::Int(_) => WireKind::Int,
            Payload::Double(_) => WireKind::Double,
        }
    }

    /// An empty payload of the given wire kind.
    pub fn empty(kind: WireKind) -> Self {
        match kind {
            WireKind::Text => Payload::Text(String::new()),
            WireKind::Int => Payload::Int(Vec::new()),
            WireKind::Double => Payload::Double(Vec::new()),
        }
    }

    /// A zero-filled payload of `len` elements, used as the receive
    /// buffer on non-root ranks of a broadcast.
    pub fn zeroed(kind: WireKind, len: usize) -> Self {
        match kind {
            WireKind::Text => Payload::Text("\0".repeat(len)),
            WireKind::Int => Payload::Int(vec![0; len]),
            WireKind::Double => Payload::Double(vec![0.0; len]),
        }
    }

    /// Serialize to the native byte representation used on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Text(s) => s.as_bytes().to_vec(),
            Payload::Int(v) => v.iter().flat_map(|x| x.to_ne_bytes()).collect(),
            Payload::Double(v) => v.iter().flat_map(|x| x.to_ne_bytes()).collect(),
        }
    }

    /// Reinterpret raw message bytes as the requested wire kind.
    ///
    /// A trailing fragment smaller than one element is dropped, which is
    /// what a typed `MPI_Recv` of a shorter count would deliver.
    pub fn from_bytes(kind: WireKind, bytes: &[u8]) -> Self {
        match kind {
            WireKind::Text => Payload::Text(String::from_utf8_lossy(bytes).into_owned()),
            WireKind::Int => Payload::Int(
                bytes
                    .chunks_exact(std::mem::size_of::<i32>())
                    .map(|c| i32::from_ne_bytes(c.try_into().unwrap()))
                    .collect(),
            ),
            WireKind::Double => Payload::Double(
                bytes
                    .chunks_exact(std::mem::size_of::<f64>())
                    .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
                    .collect(),
            ),
        }
    }
}

/// Split a list-valued word into its elements.
///
/// Elements are separated by whitespace; `{...}` groups an element that
/// itself contains whitespace (one level of braces is stripped, nested
/// braces are preserved).
pub fn split_list(word: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = word.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '{' {
            chars.next();
            let mut depth = 1usize;
            let mut elem = String::new();
            for c in chars.by_ref() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                if depth > 0 {
                    elem.push(c);
                }
            }
            out.push(elem);
        } else {
            let mut elem = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                elem.push(c);
                chars.next();
            }
            out.push(elem);
        }
    }
    out
}

/// Convert list elements to integers; unparsable elements become 0.
pub fn words_to_ints(words: &[String]) -> Vec<i32> {
    words.iter().map(|w| w.parse::<i32>().unwrap_or(0)).collect()
}

/// Convert list elements to doubles; unparsable elements become 0.0.
pub fn words_to_doubles(words: &[String]) -> Vec<f64> {
    words
        .iter()
        .map(|w| w.parse::<f64>().unwrap_or(0.0))
        .collect()
}

/// Join integers into a result list.
pub fn join_ints(values: &[i32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join doubles into a result list.
///
/// Whole values keep a trailing `.0` so the element still reads as a
/// float when fed back into another command.
pub fn join_doubles(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format_double(*v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format a single double for script output.
pub fn format_double(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}
