//! Error Types

use thiserror::Error;

/// Errors surfaced by the on-disk codec.
///
/// Everything else in the table is policy, expressed through return values;
/// only the serialization boundary can genuinely fail.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The stream announces a format newer than anything we can parse.
    #[error(
        "unsupported format of address database: {format}; it is compatible with \
         formats >= {lowest_compatible}, but the maximum supported is {max_supported}"
    )]
    UnsupportedFormat {
        format: u8,
        lowest_compatible: u8,
        max_supported: u8,
    },

    /// Structurally invalid data (bad counts, unknown network tag, ...).
    #[error("malformed address database: {0}")]
    Malformed(String),

    /// The stream parsed, but the reconstructed table violates an
    /// invariant.
    #[error("corrupt address database: consistency check failed with code {0}")]
    Corrupt(i32),

    /// Underlying stream failure; truncation surfaces as `UnexpectedEof`.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
