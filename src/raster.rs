use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageBuffer, ImageEncoder, Rgba};

use crate::error::{Result, SignError};

const INK: Rgba<u8> = Rgba([20, 24, 46, 255]);
const PEN_RADIUS: i64 = 1;

/// Decoded signature pixels, split the way the page embedding consumes
/// them: an RGB plane plus a separate alpha plane.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub alpha: Vec<u8>,
}

impl RasterImage {
    /// Decode a capture surface's exported transport form: either a
    /// `data:image/png;base64,...` URL or bare base64 over PNG bytes.
    pub fn decode_transport(encoded: &str) -> Result<Self> {
        let b64_part = match encoded.split_once(',') {
            Some((head, tail)) if head.starts_with("data:") => tail,
            _ => encoded,
        };
        let png = B64
            .decode(b64_part.trim().as_bytes())
            .map_err(|e| SignError::Decode(format!("base64:{e}")))?;
        Self::decode_png(&png)
    }

    /// Decode raw PNG bytes into RGB + alpha planes.
    pub fn decode_png(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| SignError::Decode(format!("image:{e}")))?
            .to_rgba8();
        let (width, height) = img.dimensions();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in img.pixels() {
            rgb.push(pixel[0]);
            rgb.push(pixel[1]);
            rgb.push(pixel[2]);
            alpha.push(pixel[3]);
        }
        Ok(Self {
            width,
            height,
            rgb,
            alpha,
        })
    }

    /// True when the buffer carries no ink at all (fully transparent).
    pub fn is_blank(&self) -> bool {
        self.alpha.iter().all(|a| *a == 0)
    }
}

/// Seam to the external drawing component. The embedding caller sizes the
/// surface from the session's reference dimensions after `begin`.
pub trait CaptureSurface {
    fn width(&self) -> f64;
    fn height(&self) -> f64;
    fn set_size(&mut self, width: f64, height: f64);
    fn clear(&mut self);
    fn is_empty(&self) -> bool;
    fn export_encoded(&self) -> String;
}

/// Read the current contents of a drawing surface. An untouched surface is
/// rejected here so a blank "signature" never reaches the compositor.
pub fn encode(surface: &dyn CaptureSurface) -> Result<RasterImage> {
    if surface.is_empty() {
        return Err(SignError::EmptyCapture);
    }
    RasterImage::decode_transport(&surface.export_encoded())
}

/// Minimal polyline capture surface: dark ink on a transparent background,
/// exported as a PNG data URL. Stands in for an interactive pad in tests
/// and headless callers; UIs supply their own implementation.
pub struct StrokePad {
    width: f64,
    height: f64,
    strokes: Vec<Vec<(f64, f64)>>,
}

impl StrokePad {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            strokes: Vec::new(),
        }
    }

    /// One stroke as a polyline in surface coordinates (origin top-left).
    /// Fewer than two points carries no ink and is dropped.
    pub fn add_stroke(&mut self, points: &[(f64, f64)]) {
        if points.len() >= 2 {
            self.strokes.push(points.to_vec());
        }
    }

    fn rasterize(&self) -> ImageBuffer<Rgba<u8>, Vec<u8>> {
        let w = self.width.max(1.0).round() as u32;
        let h = self.height.max(1.0).round() as u32;
        let mut img = ImageBuffer::from_pixel(w, h, Rgba([0u8, 0, 0, 0]));
        for stroke in &self.strokes {
            for pair in stroke.windows(2) {
                draw_segment(&mut img, pair[0], pair[1]);
            }
        }
        img
    }
}

impl CaptureSurface for StrokePad {
    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn set_size(&mut self, width: f64, height: f64) {
        // Resizing restarts the drawing; strokes do not rescale.
        self.width = width;
        self.height = height;
        self.strokes.clear();
    }

    fn clear(&mut self) {
        self.strokes.clear();
    }

    fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    fn export_encoded(&self) -> String {
        let img = self.rasterize();
        let mut buf = Vec::new();
        let encoder = PngEncoder::new(&mut buf);
        encoder
            .write_image(&img, img.width(), img.height(), ColorType::Rgba8)
            .expect("png_encode");
        format!("data:image/png;base64,{}", B64.encode(buf))
    }
}

fn draw_segment(img: &mut ImageBuffer<Rgba<u8>, Vec<u8>>, from: (f64, f64), to: (f64, f64)) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as u32;
    for i in 0..=steps {
        let t = f64::from(i) / f64::from(steps);
        stamp(img, from.0 + dx * t, from.1 + dy * t);
    }
}

fn stamp(img: &mut ImageBuffer<Rgba<u8>, Vec<u8>>, x: f64, y: f64) {
    let (w, h) = (i64::from(img.width()), i64::from(img.height()));
    let cx = x.round() as i64;
    let cy = y.round() as i64;
    for py in (cy - PEN_RADIUS)..=(cy + PEN_RADIUS) {
        for px in (cx - PEN_RADIUS)..=(cx + PEN_RADIUS) {
            if px >= 0 && py >= 0 && px < w && py < h {
                img.put_pixel(px as u32, py as u32, INK);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stroke_pad_round_trips_through_transport_encoding() {
        let mut pad = StrokePad::new(300.0, 150.0);
        pad.add_stroke(&[(20.0, 75.0), (150.0, 40.0), (280.0, 90.0)]);
        let raster = encode(&pad).unwrap();
        assert_eq!(raster.width, 300);
        assert_eq!(raster.height, 150);
        assert!(!raster.is_blank());
    }

    #[test]
    fn empty_pad_is_rejected() {
        let pad = StrokePad::new(300.0, 150.0);
        assert!(matches!(encode(&pad), Err(SignError::EmptyCapture)));
    }

    #[test]
    fn clear_empties_the_pad() {
        let mut pad = StrokePad::new(300.0, 150.0);
        pad.add_stroke(&[(0.0, 0.0), (10.0, 10.0)]);
        assert!(!pad.is_empty());
        pad.clear();
        assert!(pad.is_empty());
    }

    #[test]
    fn resize_adopts_the_new_dimensions_and_drops_strokes() {
        let mut pad = StrokePad::new(100.0, 100.0);
        pad.add_stroke(&[(0.0, 0.0), (10.0, 10.0)]);
        pad.set_size(612.0, 792.0);
        assert_eq!((pad.width(), pad.height()), (612.0, 792.0));
        assert!(pad.is_empty());
    }

    #[test]
    fn single_point_stroke_carries_no_ink() {
        let mut pad = StrokePad::new(100.0, 100.0);
        pad.add_stroke(&[(50.0, 50.0)]);
        assert!(pad.is_empty());
    }

    #[test]
    fn transport_accepts_bare_base64_too() {
        let mut pad = StrokePad::new(60.0, 40.0);
        pad.add_stroke(&[(5.0, 5.0), (50.0, 30.0)]);
        let url = pad.export_encoded();
        let bare = url.split_once(',').unwrap().1;
        let raster = RasterImage::decode_transport(bare).unwrap();
        assert_eq!((raster.width, raster.height), (60, 40));
    }

    #[test]
    fn malformed_base64_is_a_decode_error() {
        let err = RasterImage::decode_transport("data:image/png;base64,@@not base64@@");
        assert!(matches!(err, Err(SignError::Decode(_))));
    }

    #[test]
    fn malformed_png_is_a_decode_error() {
        let err = RasterImage::decode_png(b"definitely not a png");
        assert!(matches!(err, Err(SignError::Decode(_))));
    }

    #[test]
    fn blank_raster_is_detected() {
        let raster = RasterImage {
            width: 4,
            height: 4,
            rgb: vec![0; 48],
            alpha: vec![0; 16],
        };
        assert!(raster.is_blank());
    }
}
