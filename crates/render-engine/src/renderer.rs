//! Frame overlays: tracking region and classified subjects.

use hotzone_common::error::{HotzoneError, HotzoneResult};
use hotzone_model::{ClassifiedBox, Placement, TrackingRegion};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

/// Draws presentation overlays onto a frame in place.
///
/// Rendering never feeds back into detection or classification.
pub trait FrameRenderer: Send + Sync {
    fn render(
        &self,
        frame: &mut RgbImage,
        region: &TrackingRegion,
        subjects: &[ClassifiedBox],
    ) -> HotzoneResult<()>;
}

/// Colors and stroke width for [`OverlayRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStyle {
    pub region_color: Rgb<u8>,
    pub in_color: Rgb<u8>,
    pub out_color: Rgb<u8>,
    /// Border thickness in pixels.
    pub thickness: u32,
    /// Draw a dot at each subject's center.
    pub center_markers: bool,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            region_color: Rgb([255, 215, 0]),
            in_color: Rgb([0, 200, 0]),
            out_color: Rgb([220, 0, 0]),
            thickness: 3,
            center_markers: true,
        }
    }
}

/// Outlines the tracking region and every subject, green when IN and red
/// when OUT.
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    fn color_for(&self, placement: Placement) -> Rgb<u8> {
        match placement {
            Placement::In => self.style.in_color,
            Placement::Out => self.style.out_color,
        }
    }
}

impl FrameRenderer for OverlayRenderer {
    fn render(
        &self,
        frame: &mut RgbImage,
        region: &TrackingRegion,
        subjects: &[ClassifiedBox],
    ) -> HotzoneResult<()> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(HotzoneError::render("Cannot draw on an empty frame"));
        }

        let region_rect = PixelRect::from_normalized(
            region.min_x(),
            region.min_y(),
            region.max_x(),
            region.max_y(),
            width,
            height,
        );
        draw_thick_rect(frame, region_rect, self.style.region_color, self.style.thickness);

        for subject in subjects {
            let bbox = &subject.bbox;
            if !bbox.is_finite() {
                continue;
            }
            let color = self.color_for(subject.placement);
            let rect = PixelRect::from_normalized(
                bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y, width, height,
            );
            draw_thick_rect(frame, rect, color, self.style.thickness);

            if self.style.center_markers {
                let (cx, cy) = bbox.center();
                let px = (cx.clamp(0.0, 1.0) * width as f64) as i32;
                let py = ((1.0 - cy.clamp(0.0, 1.0)) * height as f64) as i32;
                let radius = (self.style.thickness as i32).max(1);
                draw_filled_circle_mut(frame, (px, py), radius, color);
            }
        }
        Ok(())
    }
}

/// Pixel rectangle with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    left: i32,
    top: i32,
    width: u32,
    height: u32,
}

impl PixelRect {
    /// Convert a normalized bottom-left-origin box into pixels, clamped to
    /// the frame and at least one pixel on each side.
    fn from_normalized(
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        let w = frame_width as f64;
        let h = frame_height as f64;
        let left = (min_x.clamp(0.0, 1.0) * w).floor();
        let right = (max_x.clamp(0.0, 1.0) * w).ceil();
        let top = ((1.0 - max_y.clamp(0.0, 1.0)) * h).floor();
        let bottom = ((1.0 - min_y.clamp(0.0, 1.0)) * h).ceil();

        let left = (left as u32).min(frame_width - 1);
        let top = (top as u32).min(frame_height - 1);
        let width = ((right as u32).saturating_sub(left)).clamp(1, frame_width - left);
        let height = ((bottom as u32).saturating_sub(top)).clamp(1, frame_height - top);

        Self {
            left: left as i32,
            top: top as i32,
            width,
            height,
        }
    }
}

/// Draw a border `thickness` pixels wide growing inward from `rect`.
fn draw_thick_rect(img: &mut RgbImage, rect: PixelRect, color: Rgb<u8>, thickness: u32) {
    for offset in 0..thickness.max(1) {
        let inset_w = rect.width.saturating_sub(offset * 2);
        let inset_h = rect.height.saturating_sub(offset * 2);
        if inset_w == 0 || inset_h == 0 {
            break;
        }
        let inner = Rect::at(rect.left + offset as i32, rect.top + offset as i32)
            .of_size(inset_w, inset_h);
        draw_hollow_rect_mut(img, inner, color);
    }
}
