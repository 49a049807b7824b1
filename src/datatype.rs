//! Data type and reduction operator names.
//!
//! Scripts name data types and reduction operators with `mpi::`-prefixed
//! strings. This module maps those strings to the enums the rest of the
//! crate dispatches on.
//!
//! | Script name   | Meaning                                    |
//! |---------------|--------------------------------------------|
//! | `mpi::auto`   | opaque string, transferred as bytes        |
//! | `mpi::int`    | list of 32-bit integers                    |
//! | `mpi::double` | list of 64-bit floats                      |
//! | `mpi::intint` | integer pairs (for maxloc/minloc)          |
//! | `mpi::dblint` | double/integer pairs (recognized, not yet  |
//! |               | transferable)                              |

use crate::error::{Error, Result};

/// Data types a script can name in a communication command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// The interpreter-native string representation, sent as raw bytes.
    Auto,
    /// 32-bit signed integers.
    Int,
    /// Pairs of 32-bit integers, reduced as `MPI_2INT`.
    IntInt,
    /// 64-bit floats.
    Double,
    /// Double/integer pairs. Parsed for compatibility; every transfer
    /// path reports it as not yet implemented.
    DoubleInt,
}

impl DataType {
    /// Parse a script type string, attributing failure to `cmd`.
    pub fn parse(cmd: &str, name: &str) -> Result<Self> {
        match name {
            "mpi::auto" => Ok(DataType::Auto),
            "mpi::int" => Ok(DataType::Int),
            "mpi::intint" => Ok(DataType::IntInt),
            "mpi::double" => Ok(DataType::Double),
            "mpi::dblint" => Ok(DataType::DoubleInt),
            _ => Err(Error::InvalidDatatype {
                cmd: cmd.to_string(),
                dtype: name.to_string(),
            }),
        }
    }

    /// The script name for this type.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Auto => "mpi::auto",
            DataType::Int => "mpi::int",
            DataType::IntInt => "mpi::intint",
            DataType::Double => "mpi::double",
            DataType::DoubleInt => "mpi::dblint",
        }
    }
}

/// Reduction operations for `mpi::reduce` and `mpi::allreduce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ReduceOp {
    /// Maximum value.
    Max = 0,
    /// Minimum value.
    Min = 1,
    /// Sum of values.
    Sum = 2,
    /// Product of values.
    Prod = 3,
    /// Logical and.
    Land = 4,
    /// Bitwise and.
    Band = 5,
    /// Logical or.
    Lor = 6,
    /// Bitwise or.
    Bor = 7,
    /// Logical xor.
    Lxor = 8,
    /// Bitwise xor.
    Bxor = 9,
    /// Maximum and its location (operates on pairs).
    Maxloc = 10,
    /// Minimum and its location (operates on pairs).
    Minloc = 11,
}

impl ReduceOp {
    /// Parse a script operator string, attributing failure to `cmd`.
    pub fn parse(cmd: &str, name: &str) -> Result<Self> {
        match name {
            "mpi::max" => Ok(ReduceOp::Max),
            "mpi::min" => Ok(ReduceOp::Min),
            "mpi::sum" => Ok(ReduceOp::Sum),
            "mpi::prod" => Ok(ReduceOp::Prod),
            "mpi::land" => Ok(ReduceOp::Land),
            "mpi::band" => Ok(ReduceOp::Band),
            "mpi::lor" => Ok(ReduceOp::Lor),
            "mpi::bor" => Ok(ReduceOp::Bor),
            "mpi::lxor" => Ok(ReduceOp::Lxor),
            "mpi::bxor" => Ok(ReduceOp::Bxor),
            "mpi::maxloc" => Ok(ReduceOp::Maxloc),
            "mpi::minloc" => Ok(ReduceOp::Minloc),
            _ => Err(Error::UnknownReduceOp {
                cmd: cmd.to_string(),
                op: name.to_string(),
            }),
        }
    }

    /// Whether this operator reduces (value, index) pairs.
    pub fn is_location_op(&self) -> bool {
        matches!(self, ReduceOp::Maxloc | ReduceOp::Minloc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_type_name() {
        let cases = [
            ("mpi::auto", DataType::Auto),
            ("mpi::int", DataType::Int),
            ("mpi::intint", DataType::IntInt),
            ("mpi::double", DataType::Double),
            ("mpi::dblint", DataType::DoubleInt),
        ];
        for (name, expected) in cases {
            assert_eq!(DataType::parse("mpi::send", name).unwrap(), expected);
            assert_eq!(expected.name(), name);
        }
    }

    #[test]
    fn rejects_unknown_type_names() {
        let err = DataType::parse("mpi::send", "mpi::float").unwrap_err();
        assert_eq!(err.to_string(), "mpi::send: invalid data type: mpi::float");
    }

    #[test]
    fn parses_every_reduce_op() {
        let names = [
            "mpi::max",
            "mpi::min",
            "mpi::sum",
            "mpi::prod",
            "mpi::land",
            "mpi::band",
            "mpi::lor",
            "mpi::bor",
            "mpi::lxor",
            "mpi::bxor",
            "mpi::maxloc",
            "mpi::minloc",
        ];
        for name in names {
            ReduceOp::parse("mpi::allreduce", name).unwrap();
        }
    }

    #[test]
    fn rejects_unknown_reduce_op() {
        let err = ReduceOp::parse("mpi::allreduce", "mpi::avg").unwrap_err();
        assert_eq!(
            err.to_string(),
            "mpi::allreduce: unknown reduction operator: mpi::avg"
        );
    }

    #[test]
    fn location_ops_are_pairwise() {
        assert!(ReduceOp::Maxloc.is_location_op());
        assert!(ReduceOp::Minloc.is_location_op());
        assert!(!ReduceOp::Sum.is_location_op());
    }
}
