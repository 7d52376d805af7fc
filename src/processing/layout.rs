use serde::Deserialize;

/// Fixed display box frames are fit into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self {
            width: 600,
            height: 400,
        }
    }
}

/// Largest size with the source aspect ratio that fits inside the canvas.
///
/// Small sources are scaled up. Dimensions are truncated and never drop
/// below one pixel.
pub fn fit_within(canvas: CanvasSize, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f64;
    let ih = src_h.max(1) as f64;
    let cw = canvas.width.max(1) as f64;
    let ch = canvas.height.max(1) as f64;
    let scale = (cw / iw).min(ch / ih);
    let scale = if scale.is_finite() { scale } else { 1.0 };
    let w = (iw * scale).floor().clamp(1.0, cw);
    let h = (ih * scale).floor().clamp(1.0, ch);
    (w as u32, h as u32)
}

/// Top-left offset that centers an `inner` box inside an `outer` one.
pub fn center_offset(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = outer_w.saturating_sub(inner_w) / 2;
    let oy = outer_h.saturating_sub(inner_h) / 2;
    (ox, oy)
}
