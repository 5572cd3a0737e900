//! Clean-up applied to captcha images before they are submitted.
//!
//! Grayscale, contrast stretched around the mean, then thresholded to pure
//! black and white. This strips the background noise portal captchas use.

use image::{GrayImage, ImageFormat, ImageResult};
use std::io::Cursor;

const CONTRAST: f64 = 2.0;
const THRESHOLD: f64 = 150.0;

/// Decode `png`, binarise it and re-encode as PNG.
pub fn binarize(png: &[u8]) -> ImageResult<Vec<u8>> {
    let mut gray = image::load_from_memory(png)?.into_luma8();
    stretch_and_threshold(&mut gray);
    let mut out = Vec::new();
    gray.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

fn stretch_and_threshold(gray: &mut GrayImage) {
    let count = f64::from(gray.width()) * f64::from(gray.height());
    if count == 0.0 {
        return;
    }
    let mean = gray.pixels().map(|p| f64::from(p.0[0])).sum::<f64>() / count;
    let mean = mean.round();
    for pixel in gray.pixels_mut() {
        let stretched = (mean + (f64::from(pixel.0[0]) - mean) * CONTRAST).clamp(0.0, 255.0);
        pixel.0[0] = if stretched > THRESHOLD { 255 } else { 0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn encode(img: &RgbImage) -> Vec<u8> {
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn pixels_become_black_or_white() {
        // mean 150: 100 stretches to 50, 200 to 250
        let img = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 { Rgb([100, 100, 100]) } else { Rgb([200, 200, 200]) }
        });
        let out = binarize(&encode(&img)).unwrap();
        let gray = image::load_from_memory(&out).unwrap().into_luma8();
        assert_eq!(gray.get_pixel(0, 0), &Luma([0]));
        assert_eq!(gray.get_pixel(1, 0), &Luma([255]));
    }

    #[test]
    fn uniform_light_image_turns_white() {
        let img = RgbImage::from_pixel(3, 3, Rgb([180, 180, 180]));
        let out = binarize(&encode(&img)).unwrap();
        let gray = image::load_from_memory(&out).unwrap().into_luma8();
        assert!(gray.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(binarize(b"\x89PNG not really").is_err());
    }
}
