//! Skeleton and HUD overlays drawn straight into the frame buffer.

use anyhow::{Result, anyhow};
use image::{ImageBuffer, Rgb};
use ml_core::{HAND_CONNECTIONS, HandDetection, Handedness, NormalizedLandmark};
use video_ingest::{Frame, FrameFormat};

type Canvas<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

const BONE_COLOR: [u8; 3] = [224, 224, 224];
const JOINT_COLOR: [u8; 3] = [255, 0, 0];
const JOINT_RADIUS: i32 = 2;
const TAG_COLOR: [u8; 3] = [0, 255, 0];
const TEXT_COLOR: [u8; 3] = [255, 255, 255];
const PANEL_COLOR: [u8; 3] = [0, 0, 0];

/// Draw the bones and joints of one hand plus an `L`/`R` tag at the wrist.
///
/// The tag shows the detector's own label, before any handedness policy.
pub(crate) fn draw_hand_skeleton(frame: &mut Frame, detection: &HandDetection) -> Result<()> {
    let (width, height, format) = (frame.width, frame.height, frame.format);
    let mut canvas = canvas(frame)?;
    let to_px = |lm: &NormalizedLandmark| {
        (
            f64::from(lm.x) * f64::from(width),
            f64::from(lm.y) * f64::from(height),
        )
    };
    let (max_x, max_y) = (f64::from(width - 1), f64::from(height - 1));

    let bone = paint(format, BONE_COLOR);
    for (from, to) in HAND_CONNECTIONS {
        let start = to_px(&detection.landmarks[from.index()]);
        let end = to_px(&detection.landmarks[to.index()]);
        if let Some(((x0, y0), (x1, y1))) = clip_segment(start, end, max_x, max_y) {
            draw_line(&mut canvas, x0, y0, x1, y1, bone);
        }
    }

    let joint = paint(format, JOINT_COLOR);
    for landmark in &detection.landmarks {
        if let Some((x, y)) = near_frame(to_px(landmark), max_x, max_y) {
            fill_circle(&mut canvas, x, y, JOINT_RADIUS, joint);
        }
    }

    if let Some((wrist_x, wrist_y)) = near_frame(to_px(&detection.landmarks[0]), max_x, max_y) {
        let tag = match detection.handedness.label {
            Handedness::Left => "L",
            Handedness::Right => "R",
        };
        draw_label(
            &mut canvas,
            wrist_x + 6,
            wrist_y - 3,
            tag,
            paint(format, TAG_COLOR),
        );
    }
    Ok(())
}

/// Frame counter, smoothed FPS and hand count in the bottom-right corner.
pub(crate) fn draw_hud(
    frame: &mut Frame,
    frame_number: u64,
    fps: f32,
    hands: usize,
) -> Result<()> {
    let format = frame.format;
    let mut canvas = canvas(frame)?;
    let width = canvas.width() as i32;
    let height = canvas.height() as i32;

    let info = format!("FRAME {frame_number:06}  FPS {fps:4.1}  HANDS {hands}");
    let info_width = (info.chars().count() as i32 * 6).min(width);
    let info_x = (width - info_width - 4).max(0);
    let info_y = (height - 12).max(0);
    fill_rect(
        &mut canvas,
        info_x,
        info_y,
        info_x + info_width + 4,
        info_y + 8,
        paint(format, PANEL_COLOR),
    );
    draw_label(
        &mut canvas,
        info_x + 2,
        info_y,
        &info,
        paint(format, TEXT_COLOR),
    );
    Ok(())
}

fn canvas(frame: &mut Frame) -> Result<Canvas<'_>> {
    let (width, height) = (frame.width.max(0) as u32, frame.height.max(0) as u32);
    ImageBuffer::from_raw(width, height, frame.data.as_mut_slice())
        .ok_or_else(|| anyhow!("frame buffer does not match {width}x{height}"))
}

/// Pixel for an RGB color in the frame's channel order.
fn paint(format: FrameFormat, [r, g, b]: [u8; 3]) -> Rgb<u8> {
    match format {
        FrameFormat::Rgb8 => Rgb([r, g, b]),
        FrameFormat::Bgr8 => Rgb([b, g, r]),
    }
}

fn put_pixel(image: &mut Canvas<'_>, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < image.width() as i32 && y < image.height() as i32 {
        *image.get_pixel_mut(x as u32, y as u32) = color;
    }
}

/// Pixels further than this outside the frame are not drawn as joints or tags.
const OFF_FRAME_MARGIN: f64 = 16.0;

/// Integer pixel for a point within [`OFF_FRAME_MARGIN`] of the frame.
fn near_frame((x, y): (f64, f64), max_x: f64, max_y: f64) -> Option<(i32, i32)> {
    let inside = |v: f64, max: f64| (-OFF_FRAME_MARGIN..=max + OFF_FRAME_MARGIN).contains(&v);
    (inside(x, max_x) && inside(y, max_y)).then(|| (x as i32, y as i32))
}

/// Liang-Barsky clip of a segment to `[0, max_x] x [0, max_y]`, returning
/// integer endpoints inside the frame. Non-finite points are dropped.
fn clip_segment(
    (x0, y0): (f64, f64),
    (x1, y1): (f64, f64),
    max_x: f64,
    max_y: f64,
) -> Option<((i32, i32), (i32, i32))> {
    if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) || max_x < 0.0 || max_y < 0.0 {
        return None;
    }
    let (dx, dy) = (x1 - x0, y1 - y0);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [(-dx, x0), (dx, max_x - x0), (-dy, y0), (dy, max_y - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            if t > t1 {
                return None;
            }
            t0 = t0.max(t);
        } else {
            if t < t0 {
                return None;
            }
            t1 = t1.min(t);
        }
    }
    let px = |t: f64| {
        (
            (x0 + t * dx).clamp(0.0, max_x) as i32,
            (y0 + t * dy).clamp(0.0, max_y) as i32,
        )
    };
    Some((px(t0), px(t1)))
}

fn draw_line(image: &mut Canvas<'_>, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    let (x0, y0, x1, y1) = (i64::from(x0), i64::from(y0), i64::from(x1), i64::from(y1));
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let (mut x, mut y) = (x0, y0);
    let mut err = dx + dy;
    loop {
        put_pixel(image, x as i32, y as i32, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn fill_circle(image: &mut Canvas<'_>, cx: i32, cy: i32, radius: i32, color: Rgb<u8>) {
    for y in -radius..=radius {
        for x in -radius..=radius {
            if x * x + y * y <= radius * radius {
                put_pixel(image, cx + x, cy + y, color);
            }
        }
    }
}

fn fill_rect(
    image: &mut Canvas<'_>,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width == 0 || height == 0 {
        return;
    }
    let left = left.clamp(0, width - 1);
    let right = right.clamp(0, width - 1);
    let top = top.clamp(0, height - 1);
    let bottom = bottom.clamp(0, height - 1);

    for y in top..=bottom {
        for x in left..=right {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

fn draw_label(image: &mut Canvas<'_>, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        put_pixel(image, x + col, y + row as i32, color);
                    }
                }
            }
        }
        x += 6;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'A' => Some([
            0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'D' => Some([
            0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110,
        ]),
        'E' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'F' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000,
        ]),
        'H' => Some([
            0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'L' => Some([
            0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'M' => Some([
            0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001,
        ]),
        'N' => Some([
            0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001,
        ]),
        'P' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000,
        ]),
        'R' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001,
        ]),
        'S' => Some([
            0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '0' => Some([
            0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110,
        ]),
        '1' => Some([
            0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        '2' => Some([
            0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111,
        ]),
        '3' => Some([
            0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110,
        ]),
        '4' => Some([
            0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010,
        ]),
        '5' => Some([
            0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '6' => Some([
            0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110,
        ]),
        '7' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000,
        ]),
        '8' => Some([
            0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110,
        ]),
        '9' => Some([
            0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100,
        ]),
        '.' => Some([0, 0, 0, 0, 0, 0b00110, 0b00110]),
        ' ' => Some([0, 0, 0, 0, 0, 0, 0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use ml_core::{Classification, HAND_LANDMARK_COUNT};

    use super::*;

    fn pixel(frame: &Frame, x: i32, y: i32) -> [u8; 3] {
        let idx = ((y * frame.width + x) * 3) as usize;
        [frame.data[idx], frame.data[idx + 1], frame.data[idx + 2]]
    }

    fn hand_at(x: f32, y: f32, label: Handedness) -> HandDetection {
        HandDetection::new(
            [NormalizedLandmark::new(x, y, 0.0); HAND_LANDMARK_COUNT],
            Classification { label, score: 0.9 },
        )
    }

    #[test]
    fn joints_are_red_in_either_channel_order() {
        let mut bgr = Frame::blank(64, 48, FrameFormat::Bgr8);
        draw_hand_skeleton(&mut bgr, &hand_at(0.5, 0.5, Handedness::Left)).unwrap();
        assert_eq!(pixel(&bgr, 32, 24), [0, 0, 255]);

        let mut rgb = Frame::blank(64, 48, FrameFormat::Rgb8);
        draw_hand_skeleton(&mut rgb, &hand_at(0.5, 0.5, Handedness::Left)).unwrap();
        assert_eq!(pixel(&rgb, 32, 24), [255, 0, 0]);
    }

    #[test]
    fn bones_connect_landmarks() {
        let mut frame = Frame::blank(100, 100, FrameFormat::Rgb8);
        let mut detection = hand_at(0.1, 0.1, Handedness::Right);
        detection.landmarks[1] = NormalizedLandmark::new(0.9, 0.1, 0.0);
        draw_hand_skeleton(&mut frame, &detection).unwrap();
        assert_eq!(pixel(&frame, 50, 10), BONE_COLOR);
    }

    #[test]
    fn landmarks_outside_the_frame_are_clipped() {
        let mut frame = Frame::blank(32, 32, FrameFormat::Bgr8);
        let mut detection = hand_at(-0.5, 1.5, Handedness::Right);
        detection.landmarks[4] = NormalizedLandmark::new(2.0, -1.0, 0.0);
        draw_hand_skeleton(&mut frame, &detection).unwrap();
    }

    #[test]
    fn far_out_landmarks_are_clipped_to_the_frame_edge() {
        let mut frame = Frame::blank(640, 480, FrameFormat::Rgb8);
        let mut detection = hand_at(0.5, 0.5, Handedness::Left);
        detection.landmarks[1] = NormalizedLandmark::new(5.0e6, 0.5, 0.0);
        draw_hand_skeleton(&mut frame, &detection).unwrap();

        // Wrist to thumb CMC runs along row 240 up to the right edge.
        assert_eq!(pixel(&frame, 639, 240), BONE_COLOR);
        assert_eq!(pixel(&frame, 500, 240), BONE_COLOR);
    }

    #[test]
    fn non_finite_landmarks_are_skipped() {
        let mut frame = Frame::blank(64, 48, FrameFormat::Rgb8);
        let mut detection = hand_at(0.5, 0.5, Handedness::Right);
        detection.landmarks[0] = NormalizedLandmark::new(f32::NAN, f32::INFINITY, 0.0);
        detection.landmarks[8] = NormalizedLandmark::new(-f32::INFINITY, 0.5, 0.0);
        draw_hand_skeleton(&mut frame, &detection).unwrap();
        assert_eq!(pixel(&frame, 32, 24), JOINT_COLOR);
    }

    #[test]
    fn clipping_keeps_inside_segments_and_drops_outside_ones() {
        assert_eq!(
            clip_segment((10.0, 10.0), (90.0, 10.0), 99.0, 99.0),
            Some(((10, 10), (90, 10)))
        );
        assert_eq!(
            clip_segment((-50.0, 50.0), (150.0, 50.0), 99.0, 99.0),
            Some(((0, 50), (99, 50)))
        );
        assert_eq!(clip_segment((-5.0, -5.0), (-1.0, 200.0), 99.0, 99.0), None);
    }

    #[test]
    fn hud_paints_the_bottom_right_corner() {
        let mut frame = Frame::blank(320, 240, FrameFormat::Bgr8);
        draw_hud(&mut frame, 42, 29.7, 1).unwrap();

        let bottom: Vec<u8> = frame.data[(228 * 320 * 3)..].to_vec();
        assert!(bottom.iter().any(|&v| v == 255));
        let top_left = &frame.data[..(100 * 3)];
        assert!(top_left.iter().all(|&v| v == 0));
    }

    #[test]
    fn hud_tolerates_tiny_frames() {
        let mut frame = Frame::blank(4, 4, FrameFormat::Rgb8);
        draw_hud(&mut frame, 1, 0.0, 0).unwrap();
    }

    #[test]
    fn every_hud_character_has_a_glyph() {
        for ch in "FRAME 0123456789  FPS .  HANDS LR".chars() {
            assert!(glyph_bits(ch).is_some(), "missing glyph for {ch:?}");
        }
    }

    #[test]
    fn mismatched_buffers_are_rejected() {
        let mut frame = Frame::blank(8, 8, FrameFormat::Rgb8);
        frame.data.truncate(10);
        assert!(draw_hud(&mut frame, 1, 30.0, 0).is_err());
    }
}
