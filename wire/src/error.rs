//! Errors produced while packing or unpacking wire types.

/// Failure packing or unpacking a value to/from its wire representation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WireError {
    /// The destination buffer was too short to hold the packed representation.
    WriteBufferTooShort {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        got: usize,
    },
    /// The source buffer was too short to contain a full representation of the type.
    ReadBufferTooShort {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        got: usize,
    },
    /// A raw discriminant did not match any known enum variant or `#[wire(alternatives = ..)]`.
    InvalidDiscriminant {
        /// The raw value that failed to decode.
        value: u32,
    },
}

impl core::fmt::Display for WireError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::WriteBufferTooShort { expected, got } => write!(
                f,
                "write buffer too short: need {expected} bytes, got {got}"
            ),
            Self::ReadBufferTooShort { expected, got } => write!(
                f,
                "read buffer too short: need {expected} bytes, got {got}"
            ),
            Self::InvalidDiscriminant { value } => {
                write!(f, "invalid discriminant {value:#x}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for WireError {}
