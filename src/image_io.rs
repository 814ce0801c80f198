// PNG files of single digits.
//
// MNIST stores ink as 255 on a background of 0. PNGs are written the other way round, as a dark
// digit on white paper, and inverted back when read.

use crate::error::{NetworkError, Result};
use image::GrayImage;
use std::path::Path;

// Side length of an MNIST digit.
pub const DIGIT_SIDE: u32 = 28;

// Writes raw MNIST pixel bytes (row by row) as an 8-bit grayscale PNG.
pub fn write_digit_png(
    pixels: &[u8],
    width: u32,
    height: u32,
    path: impl AsRef<Path>,
) -> Result<()> {
    let mismatch = || {
        NetworkError::Dimension(format!(
            "{} pixels do not make a {width} x {height} image",
            pixels.len()
        ))
    };
    if pixels.len() as u64 != width as u64 * height as u64 {
        return Err(mismatch());
    }

    let inverted = pixels.iter().map(|&value| 255 - value).collect();
    let image = GrayImage::from_raw(width, height, inverted).ok_or_else(mismatch)?;
    image.save(path)?;
    Ok(())
}

// Reads a `width` x `height` PNG into a network input vector with values in [0, 1], 1 being ink.
// Colour images are converted to grayscale first.
pub fn read_digit_png(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Vec<f64>> {
    let image = image::open(path)?.to_luma8();
    if image.dimensions() != (width, height) {
        return Err(NetworkError::Dimension(format!(
            "image is {} x {}, expected {width} x {height}",
            image.width(),
            image.height()
        )));
    }

    Ok(image
        .pixels()
        .map(|pixel| (255 - pixel.0[0]) as f64 / 255.0)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn written_digit_reads_back_as_normalised_input() {
        let directory = tempdir().unwrap();
        let path = directory.path().join("digit.png");
        let pixels = [0, 255, 51, 102, 0, 0];

        write_digit_png(&pixels, 3, 2, &path).unwrap();
        let input = read_digit_png(&path, 3, 2).unwrap();

        assert_eq!(input, vec![0.0, 1.0, 0.2, 0.4, 0.0, 0.0]);
    }

    #[test]
    fn stored_png_has_dark_ink_on_white() {
        let directory = tempdir().unwrap();
        let path = directory.path().join("digit.png");
        write_digit_png(&[255, 0], 2, 1, &path).unwrap();

        let image = image::open(&path).unwrap().to_luma8();
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(1, 0).0, [255]);
    }

    #[test]
    fn wrong_image_size_is_rejected() {
        let directory = tempdir().unwrap();
        let path = directory.path().join("digit.png");
        write_digit_png(&[0; 4], 2, 2, &path).unwrap();

        assert!(matches!(
            read_digit_png(&path, DIGIT_SIDE, DIGIT_SIDE),
            Err(NetworkError::Dimension(_))
        ));
    }

    #[test]
    fn pixel_count_must_match_dimensions() {
        let directory = tempdir().unwrap();
        assert!(matches!(
            write_digit_png(&[0; 3], 2, 2, directory.path().join("digit.png")),
            Err(NetworkError::Dimension(_))
        ));
    }
}
