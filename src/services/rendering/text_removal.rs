// Text removal: Otsu mask per bubble, dilated, then one Navier-Stokes inpaint
// over the whole page so no seams appear at bubble edges

use crate::core::errors::RenderingResult;
use crate::core::types::BBox;
use crate::utils::image_ops::{gray_to_mat, mat_to_gray, mat_to_rgb, rgb_to_mat};
use image::{imageops, GrayImage, RgbImage};
use opencv::core::{Mat, Point, Size, BORDER_CONSTANT};
use opencv::imgproc::{self, MORPH_RECT, THRESH_BINARY_INV, THRESH_OTSU};
use opencv::photo;
use tracing::{debug, trace};

const DILATE_KERNEL: i32 = 3;
const DILATE_ITERATIONS: i32 = 2;

/// Foreground (text) mask for one grayscale bubble crop
fn bubble_mask(gray: &GrayImage) -> RenderingResult<GrayImage> {
    let src = gray_to_mat(gray)?;

    let mut binary = Mat::default();
    let threshold = imgproc::threshold(
        &src,
        &mut binary,
        0.0,
        255.0,
        THRESH_BINARY_INV | THRESH_OTSU,
    )?;
    trace!("Otsu threshold: {}", threshold);

    let kernel = imgproc::get_structuring_element(
        MORPH_RECT,
        Size::new(DILATE_KERNEL, DILATE_KERNEL),
        Point::new(-1, -1),
    )?;

    let mut dilated = Mat::default();
    imgproc::dilate(
        &binary,
        &mut dilated,
        &kernel,
        Point::new(-1, -1),
        DILATE_ITERATIONS,
        BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;

    Ok(mat_to_gray(&dilated)?)
}

/// Full-page mask: union of every bubble's text mask
pub fn build_text_mask(page: &RgbImage, bubbles: &[BBox]) -> RenderingResult<GrayImage> {
    let mut full_mask = GrayImage::new(page.width(), page.height());

    for bbox in bubbles {
        let clipped = bbox.clamp_to(page.width(), page.height());
        if clipped.is_empty() {
            continue;
        }

        let (x, y) = (clipped.x1 as u32, clipped.y1 as u32);
        let crop = imageops::crop_imm(page, x, y, clipped.width() as u32, clipped.height() as u32).to_image();
        let mask = bubble_mask(&imageops::grayscale(&crop))?;

        for (mx, my, value) in mask.enumerate_pixels() {
            let target = full_mask.get_pixel_mut(x + mx, y + my);
            target[0] = target[0].max(value[0]);
        }
    }

    Ok(full_mask)
}

/// Erase the original lettering inside `bubbles`.
///
/// Pixels outside the mask are left untouched; with nothing to mask the page
/// comes back unchanged.
pub fn remove_text(page: &RgbImage, bubbles: &[BBox], radius: f64) -> RenderingResult<RgbImage> {
    let mask = build_text_mask(page, bubbles)?;

    let masked = mask.pixels().filter(|p| p[0] > 0).count();
    if masked == 0 {
        debug!("Text mask is empty, skipping inpaint");
        return Ok(page.clone());
    }
    debug!("Inpainting {} masked pixels (radius {})", masked, radius);

    let src = rgb_to_mat(page)?;
    let mask_mat = gray_to_mat(&mask)?;
    let mut dst = Mat::default();
    photo::inpaint(&src, &mask_mat, &mut dst, radius, photo::INPAINT_NS)?;

    Ok(mat_to_rgb(&dst)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn page_with_square() -> RgbImage {
        let mut page = RgbImage::from_pixel(120, 100, Rgb([255, 255, 255]));
        for y in 40..50 {
            for x in 50..62 {
                page.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        // Outside any bubble
        page.put_pixel(5, 5, Rgb([10, 20, 30]));
        page
    }

    #[test]
    fn test_mask_covers_dark_strokes_with_margin() {
        let page = page_with_square();
        let mask = build_text_mask(&page, &[BBox::new(30, 20, 90, 80)]).unwrap();

        assert_eq!(mask.get_pixel(55, 45)[0], 255);
        // Dilated two pixels past the stroke
        assert_eq!(mask.get_pixel(48, 45)[0], 255);
        assert_eq!(mask.get_pixel(35, 25)[0], 0);
        assert_eq!(mask.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn test_remove_text_erases_only_inside_bubbles() {
        let page = page_with_square();
        let cleaned = remove_text(&page, &[BBox::new(30, 20, 90, 80)], 5.0).unwrap();

        let centre = cleaned.get_pixel(55, 45);
        assert!(centre.0.iter().all(|&c| c > 200), "text left behind: {:?}", centre);
        assert_eq!(cleaned.get_pixel(5, 5), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_blank_bubble_leaves_page_unchanged() {
        let page = RgbImage::from_pixel(50, 50, Rgb([255, 255, 255]));
        let cleaned = remove_text(&page, &[BBox::new(10, 10, 40, 40)], 5.0).unwrap();
        assert_eq!(cleaned, page);
    }

    #[test]
    fn test_no_bubbles_leaves_page_unchanged() {
        let page = page_with_square();
        assert_eq!(remove_text(&page, &[], 5.0).unwrap(), page);
    }
}
