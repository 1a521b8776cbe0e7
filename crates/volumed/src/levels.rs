//! Logarithmic level-to-wiper mapping.
//!
//! The MCP42010 is a linear potentiometer while volume pots are normally
//! logarithmic (perceived loudness is roughly log of signal level), so the
//! 0–99 protocol levels map through a log curve to the 0–255 wiper range.
//! The curve costs some precision: adjacent levels near the top collapse to
//! the same wiper byte, which is accepted rather than worked around.

pub use amp_volume_proto::MAX_LEVEL;

/// Immutable level→wiper lookup, built once at startup.
pub struct LevelMap {
    table: [u8; MAX_LEVEL as usize + 1],
}

impl LevelMap {
    pub fn new() -> Self {
        let mut table = [0u8; MAX_LEVEL as usize + 1];
        for (i, slot) in table.iter_mut().enumerate().skip(1) {
            let curve = 255.0 * ((i as f64).ln() / 100f64.ln());
            *slot = (curve.round() + 1.0).clamp(0.0, 255.0) as u8;
        }
        Self { table }
    }

    /// Wiper byte for `level` scaled by `master`.
    ///
    /// The master scale truncates (`level * master / 99`), matching the wire
    /// contract: scaling down then back up need not restore the exact wiper.
    pub fn wiper(&self, level: u8, master: u8) -> u8 {
        let index = level as usize * master as usize / MAX_LEVEL as usize;
        self.table[index.min(MAX_LEVEL as usize)]
    }
}

impl Default for LevelMap {
    fn default() -> Self {
        Self::new()
    }
}
