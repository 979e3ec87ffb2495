//! Remap curves for shake progress.
//!
//! Each curve maps normalized progress in `[0.0, 1.0]` to a normalized output,
//! which the shaker then scales into its `remap` range.

use serde::{Deserialize, Serialize};

/// Shape of a shake over its duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Curve {
    Linear,
    Log,
    Exp,
    Smoothstep,
    /// Rises to 1 at the midpoint and falls back to 0.
    #[default]
    Bell,
}

/// Evaluate a curve at `t`, clamped to `[0.0, 1.0]` first.
pub fn apply_curve(kind: Curve, t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    match kind {
        Curve::Linear => t,
        Curve::Log => (1.0 + 9.0 * t).log10(),
        Curve::Exp => t * t,
        Curve::Smoothstep => t * t * (3.0 - 2.0 * t),
        Curve::Bell => (std::f64::consts::PI * t).sin(),
    }
}

/// Evaluate a curve and scale it into `range`.
pub fn remap(kind: Curve, t: f64, range: (f64, f64)) -> f64 {
    range.0 + apply_curve(kind, t) * (range.1 - range.0)
}
