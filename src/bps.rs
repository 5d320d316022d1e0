//! Basis-point conversion helpers shared by every component that expresses
//! a tolerance or offset in bps (spread width, drift bands, FX buffers,
//! slippage): one `* 1e-4` / `* 10_000.0` idiom instead of each call site
//! repeating the magic constant.

/// Convert a basis-point value (e.g. `50.0` for 50bps) to a fraction.
pub fn to_fraction(bps: f64) -> f64 {
    bps * 1e-4
}

/// Convert a fraction (e.g. `0.005`) to basis points.
pub fn from_fraction(fraction: f64) -> f64 {
    fraction * 10_000.0
}
