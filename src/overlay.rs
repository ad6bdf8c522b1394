use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{ImageBuffer, Rgba};
use imageproc::{
    drawing::{
        draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
        draw_text_mut,
    },
    rect::Rect,
};

use crate::types::Frame;

pub const CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

pub const RED: [u8; 4] = [255, 0, 0, 255];
pub const GREEN: [u8; 4] = [0, 255, 0, 255];
pub const WHITE: [u8; 4] = [255, 255, 255, 255];
pub const MAGENTA: [u8; 4] = [255, 0, 255, 255];

const SKELETON_LINE_THICKNESS: i32 = 3;
const LINE_COLOR: [u8; 4] = [224, 224, 224, 255];
const POINT_COLOR: [u8; 4] = [255, 48, 48, 255];
const POINT_RADIUS: i32 = 4;

/// Pixel height of text drawn at scale 1.0.
const BASE_TEXT_PX: f32 = 30.0;

static EMBEDDED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

type FrameCanvas<'a> = ImageBuffer<Rgba<u8>, &'a mut [u8]>;

fn canvas(frame: &mut Frame) -> Option<FrameCanvas<'_>> {
    let (width, height) = (frame.width, frame.height);
    ImageBuffer::from_raw(width, height, frame.rgba.as_mut_slice())
}

pub fn draw_skeleton(frame: &mut Frame, points: &[(f32, f32)]) {
    if points.len() < 2 {
        return;
    }
    let Some(mut canvas) = canvas(frame) else {
        return;
    };

    for &(a, b) in CONNECTIONS {
        if let (Some(&pa), Some(&pb)) = (points.get(a), points.get(b)) {
            thick_line(&mut canvas, pa, pb, Rgba(LINE_COLOR), SKELETON_LINE_THICKNESS);
        }
    }

    for &(x, y) in points {
        draw_filled_circle_mut(
            &mut canvas,
            (x as i32, y as i32),
            POINT_RADIUS,
            Rgba(POINT_COLOR),
        );
    }
}

/// Rectangle outline between two corners, clipped to the frame. Extra
/// thickness grows inwards.
pub fn draw_rect(
    frame: &mut Frame,
    p0: (i32, i32),
    p1: (i32, i32),
    color: [u8; 4],
    thickness: i32,
) {
    let Some(mut canvas) = canvas(frame) else {
        return;
    };
    let (x1, y1) = (p0.0.min(p1.0), p0.1.min(p1.1));
    let w = (p0.0 - p1.0).unsigned_abs() + 1;
    let h = (p0.1 - p1.1).unsigned_abs() + 1;
    for inset in 0..thickness.max(1) {
        let shrink = 2 * inset.unsigned_abs();
        if w <= shrink || h <= shrink {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(w - shrink, h - shrink);
        draw_hollow_rect_mut(&mut canvas, rect, Rgba(color));
    }
}

/// Filled rectangle between two corners, clipped to the frame.
pub fn fill_rect(frame: &mut Frame, p0: (i32, i32), p1: (i32, i32), color: [u8; 4]) {
    let x1 = p0.0.min(p1.0);
    let y1 = p0.1.min(p1.1);
    let w = (p0.0 - p1.0).unsigned_abs();
    let h = (p0.1 - p1.1).unsigned_abs();
    if w == 0 || h == 0 {
        return;
    }
    let Some(mut canvas) = canvas(frame) else {
        return;
    };
    draw_filled_rect_mut(&mut canvas, Rect::at(x1, y1).of_size(w, h), Rgba(color));
}

/// Line widened by stamping offset copies inside a diamond of the given
/// thickness.
fn thick_line(
    canvas: &mut FrameCanvas<'_>,
    start: (f32, f32),
    end: (f32, f32),
    color: Rgba<u8>,
    thickness: i32,
) {
    let radius = (thickness.max(1) - 1) / 2;
    for ox in -radius..=radius {
        for oy in -radius..=radius {
            if ox.abs() + oy.abs() > radius {
                continue;
            }
            let (dx, dy) = (ox as f32, oy as f32);
            draw_line_segment_mut(
                canvas,
                (start.0 + dx, start.1 + dy),
                (end.0 + dx, end.1 + dy),
                color,
            );
        }
    }
}

/// Draws label text with the bundled font unless a font file overrides it.
/// If no font can be parsed the label degrades to a solid bar of roughly the
/// text's width so that the marker stays visible.
#[derive(Clone)]
pub struct LabelPainter {
    font: Option<FontArc>,
}

impl Default for LabelPainter {
    fn default() -> Self {
        let font = match FontArc::try_from_slice(EMBEDDED_FONT) {
            Ok(font) => Some(font),
            Err(err) => {
                log::error!("bundled font unusable, labels drawn as bars: {err}");
                None
            }
        };
        Self { font }
    }
}

impl LabelPainter {
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("font {} unavailable, using bundled font: {err}", path.display());
                return Self::default();
            }
        };
        match FontArc::try_from_vec(bytes) {
            Ok(font) => Self { font: Some(font) },
            Err(err) => {
                log::warn!("invalid font {}, using bundled font: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// `origin` is the bottom-left corner of the text, `scale` multiplies a
    /// 30 px base height.
    pub fn draw_text(
        &self,
        frame: &mut Frame,
        text: &str,
        origin: (i32, i32),
        scale: f32,
        color: [u8; 4],
    ) {
        if text.is_empty() {
            return;
        }
        let px = BASE_TEXT_PX * scale;
        let top = origin.1 - px.round() as i32;

        match &self.font {
            Some(font) => {
                let Some(mut canvas) = canvas(frame) else {
                    return;
                };
                draw_text_mut(
                    &mut canvas,
                    Rgba(color),
                    origin.0,
                    top,
                    PxScale::from(px),
                    font,
                    text,
                );
            }
            None => {
                let bar_w = (text.chars().count() as f32 * px * 0.6).ceil() as i32;
                let bar_h = (px * 0.3).ceil().max(2.0) as i32;
                fill_rect(
                    frame,
                    (origin.0, origin.1 - bar_h),
                    (origin.0 + bar_w, origin.1),
                    color,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [u8; 4] = [0, 0, 0, 255];

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * frame.width + x) * 4) as usize;
        frame.rgba[idx..idx + 4].try_into().unwrap()
    }

    #[test]
    fn fill_rect_clips_at_frame_edges() {
        let mut frame = Frame::filled(20, 10, BLACK);
        fill_rect(&mut frame, (-5, -5), (4, 3), MAGENTA);
        assert_eq!(pixel(&frame, 0, 0), MAGENTA);
        assert_eq!(pixel(&frame, 3, 2), MAGENTA);
        assert_eq!(pixel(&frame, 5, 5), BLACK);

        fill_rect(&mut frame, (15, 8), (40, 40), GREEN);
        assert_eq!(pixel(&frame, 19, 9), GREEN);
    }

    #[test]
    fn rect_outline_leaves_interior_untouched() {
        let mut frame = Frame::filled(30, 30, BLACK);
        draw_rect(&mut frame, (5, 5), (25, 25), MAGENTA, 1);
        assert_eq!(pixel(&frame, 5, 5), MAGENTA);
        assert_eq!(pixel(&frame, 25, 15), MAGENTA);
        assert_eq!(pixel(&frame, 15, 15), BLACK);
    }

    #[test]
    fn skeleton_off_frame_does_not_panic() {
        let mut frame = Frame::filled(16, 16, BLACK);
        let points: Vec<(f32, f32)> = (0..21).map(|i| (i as f32 * 10.0 - 50.0, 8.0)).collect();
        draw_skeleton(&mut frame, &points);
        assert!(frame.rgba.chunks(4).any(|px| px != BLACK));
    }

    #[test]
    fn rect_outline_grows_inwards() {
        let mut frame = Frame::filled(30, 30, BLACK);
        draw_rect(&mut frame, (5, 5), (25, 25), MAGENTA, 4);
        assert_eq!(pixel(&frame, 5, 5), MAGENTA);
        assert_eq!(pixel(&frame, 8, 15), MAGENTA);
        assert_eq!(pixel(&frame, 9, 15), BLACK);
        assert_eq!(pixel(&frame, 4, 15), BLACK);
    }

    #[test]
    fn default_painter_renders_glyphs() {
        let painter = LabelPainter::default();
        assert!(painter.has_font());

        let mut frame = Frame::filled(200, 100, BLACK);
        painter.draw_text(&mut frame, "ERR", (10, 50), 1.0, RED);
        // Cap height reaches well above the band a fallback bar would cover.
        let painted_rows: Vec<u32> = (0..frame.height)
            .filter(|&y| (0..frame.width).any(|x| pixel(&frame, x, y) != BLACK))
            .collect();
        assert!(painted_rows.iter().any(|&y| y < 35));
        assert!(painted_rows.iter().all(|&y| (20..=50).contains(&y)));
    }

    #[test]
    fn text_without_font_still_marks_the_frame() {
        let painter = LabelPainter { font: None };
        let mut frame = Frame::filled(200, 100, BLACK);
        painter.draw_text(&mut frame, "ERR", (10, 50), 1.0, RED);
        assert_eq!(pixel(&frame, 12, 48), RED);

        let untouched = Frame::filled(200, 100, BLACK);
        let mut copy = untouched.clone();
        LabelPainter::default().draw_text(&mut copy, "", (10, 50), 1.0, RED);
        assert_eq!(copy.rgba, untouched.rgba);
    }

    #[test]
    fn missing_font_file_falls_back_to_bundled_font() {
        let painter = LabelPainter::load(Some(Path::new("/nonexistent/font.ttf")));
        assert!(painter.has_font());
    }
}
