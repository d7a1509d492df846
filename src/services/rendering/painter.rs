use crate::services::font_manager::FontFace;
use cosmic_text::{Attrs, Buffer, Color as CosmicColor, Family, FontSystem, Metrics, Shaping, SwashCache, Wrap};
use image::{Rgb, RgbImage};

/// Line height as a multiple of the font size
pub const LINE_SPACING: f32 = 1.2;

/// Measures and draws single lines of text.
///
/// Layout (wrapping, size search, centering) is built on top of this so it
/// can be exercised without a real font.
pub trait TextPainter: Send {
    /// Advance width of `text` on one line at `size` px
    fn line_width(&mut self, text: &str, size: f32) -> f32;

    fn line_height(&self, size: f32) -> f32 {
        size * LINE_SPACING
    }

    /// Draw `text` with its line box's top-left corner at (x, y)
    fn draw_line(&mut self, canvas: &mut RgbImage, text: &str, size: f32, x: i32, y: i32, color: Rgb<u8>);
}

/// cosmic-text painter over a single loaded font
pub struct CosmicTextPainter {
    font_system: FontSystem,
    swash_cache: SwashCache,
    family: String,
}

impl CosmicTextPainter {
    pub fn new(face: FontFace) -> Self {
        let (font_system, family) = face.into_font_system();
        Self {
            font_system,
            swash_cache: SwashCache::new(),
            family,
        }
    }

    fn shape(&mut self, text: &str, size: f32) -> Buffer {
        let metrics = Metrics::new(size, self.line_height(size));
        let mut buffer = Buffer::new(&mut self.font_system, metrics);

        // Wrapping is done by the layout code, one buffer per line
        buffer.set_wrap(&mut self.font_system, Wrap::None);

        let attrs = Attrs::new().family(Family::Name(&self.family));
        buffer.set_text(&mut self.font_system, text, &attrs, Shaping::Advanced);
        buffer.shape_until_scroll(&mut self.font_system, false);
        buffer
    }
}

impl TextPainter for CosmicTextPainter {
    fn line_width(&mut self, text: &str, size: f32) -> f32 {
        if text.is_empty() {
            return 0.0;
        }
        self.shape(text, size)
            .layout_runs()
            .map(|run| run.line_w)
            .fold(0.0f32, f32::max)
    }

    fn draw_line(&mut self, canvas: &mut RgbImage, text: &str, size: f32, x: i32, y: i32, color: Rgb<u8>) {
        let buffer = self.shape(text, size);
        let text_color = CosmicColor::rgb(color[0], color[1], color[2]);
        let (width, height) = (canvas.width() as i32, canvas.height() as i32);

        buffer.draw(
            &mut self.font_system,
            &mut self.swash_cache,
            text_color,
            |px_x, px_y, _w, _h, pixel_color| {
                let img_x = x + px_x;
                let img_y = y + px_y;
                if img_x < 0 || img_y < 0 || img_x >= width || img_y >= height {
                    return;
                }

                let existing = canvas.get_pixel(img_x as u32, img_y as u32);

                // Alpha blend
                let alpha = pixel_color.a() as f32 / 255.0;
                let inv_alpha = 1.0 - alpha;
                let blended = Rgb([
                    (pixel_color.r() as f32 * alpha + existing[0] as f32 * inv_alpha) as u8,
                    (pixel_color.g() as f32 * alpha + existing[1] as f32 * inv_alpha) as u8,
                    (pixel_color.b() as f32 * alpha + existing[2] as f32 * inv_alpha) as u8,
                ]);
                canvas.put_pixel(img_x as u32, img_y as u32, blended);
            },
        );
    }
}
