//! `lightweight`: resizing without any built-in surface scaling.
//!
//! Decode and encode are the same as `canvas`. Resizing reads the full RGBA
//! buffer back and fills a new one by nearest-neighbour sampling, and only
//! happens when the target size differs from the natural size.

use super::{CompressionError, PipelineError, Strategy};
use crate::imaging::{compute_target_size, raster, resample, source};
use crate::naming::derive_filename;
use crate::types::{CompressionRequest, CompressionResult, Method};

#[derive(Debug, Default)]
pub struct DependencyFree;

impl DependencyFree {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, request: &CompressionRequest) -> Result<CompressionResult, PipelineError> {
        let options = &request.options;
        let mut img = source::decode_source(&request.source)?;
        let (natural_width, natural_height) = (img.width(), img.height());
        let (width, height) = compute_target_size(
            natural_width,
            natural_height,
            options.max_width,
            options.max_height,
        );

        if (width, height) != (natural_width, natural_height) {
            let (pixels, _, _) = raster::read_pixels(&img);
            let resized =
                resample::nearest_neighbor(&pixels, natural_width, natural_height, width, height);
            img = raster::from_pixels(resized, width, height)?;
        }

        let encoded = raster::encode(&img, options.format, options.quality)?;
        Ok(CompressionResult::new(
            encoded,
            derive_filename(&request.source, options.format),
        ))
    }
}

impl Strategy for DependencyFree {
    fn method(&self) -> Method {
        Method::Lightweight
    }

    fn compress(
        &self,
        request: &CompressionRequest,
    ) -> Result<CompressionResult, CompressionError> {
        self.run(request)
            .map_err(|cause| CompressionError::new(self.method(), cause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{gradient_image, png_bytes, request};
    use crate::types::{ImageSource, OutputFormat};
    use image::{DynamicImage, Rgba, RgbaImage};

    #[test]
    fn png_output_preserves_nearest_neighbour_pixels() {
        let mut src = RgbaImage::new(2, 2);
        src.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        src.put_pixel(1, 0, Rgba([0, 255, 0, 255]));
        src.put_pixel(0, 1, Rgba([0, 0, 255, 255]));
        src.put_pixel(1, 1, Rgba([255, 255, 255, 255]));
        let req = request(
            ImageSource::Decoded(DynamicImage::ImageRgba8(src.clone())),
            OutputFormat::Png,
            Some(1),
            None,
        );

        let out = DependencyFree::new().compress(&req).unwrap();
        let decoded = raster::decode(&out.encoded).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (1, 1));
        assert_eq!(decoded.get_pixel(0, 0), src.get_pixel(0, 0));
    }

    #[test]
    fn respects_both_bounds() {
        let req = request(
            ImageSource::bytes(png_bytes(100, 80)),
            OutputFormat::Jpg,
            Some(50),
            Some(20),
        );
        let out = DependencyFree::new().compress(&req).unwrap();
        let img = raster::decode(&out.encoded).unwrap();
        assert_eq!((img.width(), img.height()), (25, 20));
        assert_eq!(out.filename, "compressed-image.jpg");
    }

    #[test]
    fn natural_size_skips_resampling() {
        let req = request(
            ImageSource::Decoded(gradient_image(8, 8)),
            OutputFormat::Png,
            Some(100),
            None,
        );
        let out = DependencyFree::new().compress(&req).unwrap();
        let img = raster::decode(&out.encoded).unwrap();
        assert_eq!(img.to_rgba8(), gradient_image(8, 8).to_rgba8());
    }

    #[test]
    fn errors_are_tagged_lightweight() {
        let req = request(
            ImageSource::Reference("ftp://host/cat.png".into()),
            OutputFormat::Png,
            None,
            None,
        );
        let err = DependencyFree::new().compress(&req).unwrap_err();
        assert_eq!(err.method, Method::Lightweight);
        assert!(matches!(err.cause, PipelineError::UnsupportedInput(_)));
    }
}
