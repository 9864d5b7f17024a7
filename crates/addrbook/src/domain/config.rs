//! Address Book Configuration

/// Construction-time configuration for the address book.
#[derive(Debug, Clone, Default)]
pub struct AddrBookConfig {
    /// Compressed IP-to-AS mapping, opaque to the table itself. Consumed by
    /// the caller's network-group adapter and persisted alongside the table
    /// so a changed mapping can trigger rebucketing on load.
    pub asmap: Vec<bool>,
    /// Fix the secret bucket key and the RNG seed. Test-only: placements
    /// become predictable.
    pub deterministic: bool,
    /// Run the full consistency check with probability `1/ratio` before and
    /// after every public operation. `0` disables checking.
    pub consistency_check_ratio: i32,
}

impl AddrBookConfig {
    /// Deterministic configuration with checks on every operation.
    pub fn for_testing() -> Self {
        Self {
            asmap: Vec::new(),
            deterministic: true,
            consistency_check_ratio: 1,
        }
    }
}
