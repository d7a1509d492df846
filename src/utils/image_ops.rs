use crate::core::types::BBox;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use opencv::core::{Mat, Scalar, Vec3b, VecN, CV_8UC1, CV_8UC3};
use opencv::prelude::*;

/// Crop a page to `bbox` after clipping it to the page.
///
/// Returns `None` when nothing of the box lies inside the image.
pub fn crop_to_bbox(img: &DynamicImage, bbox: BBox) -> Option<DynamicImage> {
    let clipped = bbox.clamp_to(img.width(), img.height());
    if clipped.is_empty() {
        return None;
    }
    Some(img.crop_imm(
        clipped.x1 as u32,
        clipped.y1 as u32,
        clipped.width() as u32,
        clipped.height() as u32,
    ))
}

/// Copy an RGB image into a BGR `CV_8UC3` Mat
pub fn rgb_to_mat(img: &RgbImage) -> opencv::Result<Mat> {
    let (width, height) = img.dimensions();
    let mut mat = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;

    for (x, y, pixel) in img.enumerate_pixels() {
        *mat.at_2d_mut::<Vec3b>(y as i32, x as i32)? = VecN([pixel[2], pixel[1], pixel[0]]);
    }

    Ok(mat)
}

/// Inverse of [`rgb_to_mat`]
pub fn mat_to_rgb(mat: &Mat) -> opencv::Result<RgbImage> {
    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let mut img = RgbImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let bgr = *mat.at_2d::<Vec3b>(y as i32, x as i32)?;
            img.put_pixel(x, y, Rgb([bgr[2], bgr[1], bgr[0]]));
        }
    }

    Ok(img)
}

/// Copy a single-channel image into a `CV_8UC1` Mat
pub fn gray_to_mat(img: &GrayImage) -> opencv::Result<Mat> {
    let (width, height) = img.dimensions();
    let mut mat = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        CV_8UC1,
        Scalar::all(0.0),
    )?;

    for (x, y, pixel) in img.enumerate_pixels() {
        *mat.at_2d_mut::<u8>(y as i32, x as i32)? = pixel[0];
    }

    Ok(mat)
}

pub fn mat_to_gray(mat: &Mat) -> opencv::Result<GrayImage> {
    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let mut img = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let value = *mat.at_2d::<u8>(y as i32, x as i32)?;
            img.put_pixel(x, y, Luma([value]));
        }
    }

    Ok(img)
}
