//! Widget geometry in PDF points and millimetres

use serde::{Deserialize, Serialize};

/// Millimetres per PDF point (1/72 inch)
pub const PT_TO_MM: f64 = 0.352777778;

/// Round to 2 decimal places, half away from zero
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // Avoid emitting -0.0 in the catalog
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Convert points to millimetres, rounded to 2 decimals
pub fn pt_to_mm(pt: f64) -> f64 {
    round2(pt * PT_TO_MM)
}

/// Bounding box of a widget as stored in the catalog.
///
/// All values are rounded to 2 decimals. Millimetre values are derived from
/// the unrounded point values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub rect_pt: [f64; 4],
    pub x_pt: f64,
    pub y_pt: f64,
    pub w_pt: f64,
    pub h_pt: f64,
    pub x_mm: f64,
    pub y_mm: f64,
    pub w_mm: f64,
    pub h_mm: f64,
}

impl Geometry {
    /// Build from a `/Rect` array `[x0, y0, x1, y1]` in any corner order
    pub fn from_rect(rect: [f64; 4]) -> Self {
        let [x0, y0, x1, y1] = normalize_rect(rect);
        let width = x1 - x0;
        let height = y1 - y0;

        Self {
            rect_pt: [round2(x0), round2(y0), round2(x1), round2(y1)],
            x_pt: round2(x0),
            y_pt: round2(y0),
            w_pt: round2(width),
            h_pt: round2(height),
            x_mm: pt_to_mm(x0),
            y_mm: pt_to_mm(y0),
            w_mm: pt_to_mm(width),
            h_mm: pt_to_mm(height),
        }
    }
}

/// Reorder corners so that `x0 <= x1` and `y0 <= y1`
pub fn normalize_rect(rect: [f64; 4]) -> [f64; 4] {
    let [a, b, c, d] = rect;
    [a.min(c), b.min(d), a.max(c), b.max(d)]
}
