//! Display colors for room members.

use rand::seq::SliceRandom;
use rand::Rng;

/// Fixed member palette.
pub const PALETTE: [&str; 8] = [
    "#1abc9c", "#2ecc71", "#3498db", "#9b59b6", "#f39c12", "#e67e22", "#e74c3c", "#34495e",
];

/// Picks a member color uniformly from [`PALETTE`].
///
/// Colors already in use are not avoided; two members may share one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorAssigner;

impl ColorAssigner {
    pub fn new() -> Self {
        Self
    }

    pub fn pick(&self) -> String {
        self.pick_with(&mut rand::thread_rng())
    }

    /// Pick using the caller's RNG.
    pub fn pick_with<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        PALETTE.choose(rng).copied().unwrap_or(PALETTE[0]).to_string()
    }

    pub fn palette(&self) -> &'static [&'static str] {
        &PALETTE
    }
}
