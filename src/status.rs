//! Message status information.
//!
//! Receive, probe, and wait commands can populate a script-side status
//! array describing the message: source rank, tag, error code, and the
//! message size interpreted as characters, integers, and doubles.

/// Information about a probed, received, or completed message.
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    /// Source rank of the message.
    pub source: i32,
    /// Tag of the message.
    pub tag: i32,
    /// Error code associated with the message (0 for success).
    pub error: i32,
    /// Message size in bytes.
    pub count_bytes: usize,
}

impl Status {
    /// Message size as a character count.
    pub fn count_char(&self) -> i64 {
        self.count_bytes as i64
    }

    /// Message size as a count of 32-bit integers.
    pub fn count_int(&self) -> i64 {
        (self.count_bytes / std::mem::size_of::<i32>()) as i64
    }

    /// Message size as a count of 64-bit doubles.
    pub fn count_double(&self) -> i64 {
        (self.count_bytes / std::mem::size_of::<f64>()) as i64
    }

    /// The entries written into a script status array, in order.
    pub fn entries(&self) -> [(&'static str, i64); 6] {
        [
            ("MPI_SOURCE", i64::from(self.source)),
            ("MPI_TAG", i64::from(self.tag)),
            ("MPI_ERROR", i64::from(self.error)),
            ("COUNT_CHAR", self.count_char()),
            ("COUNT_INT", self.count_int()),
            ("COUNT_DOUBLE", self.count_double()),
        ]
    }
}
