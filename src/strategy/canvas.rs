//! `canvas`: the whole pipeline on the calling thread.

use super::{CompressionError, PipelineError, Strategy};
use crate::imaging::{compute_target_size, raster, source};
use crate::naming::derive_filename;
use crate::types::{CompressionRequest, CompressionResult, Method};

/// Decode, draw into a surface of the target size with the surface's own
/// bilinear scaling, encode.
#[derive(Debug, Default)]
pub struct MainThreadRaster;

impl MainThreadRaster {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, request: &CompressionRequest) -> Result<CompressionResult, PipelineError> {
        let options = &request.options;
        let img = source::decode_source(&request.source)?;
        let (width, height) =
            compute_target_size(img.width(), img.height(), options.max_width, options.max_height);
        let surface = raster::draw_scaled(img, width, height);
        let encoded = raster::encode(&surface, options.format, options.quality)?;
        Ok(CompressionResult::new(
            encoded,
            derive_filename(&request.source, options.format),
        ))
    }
}

impl Strategy for MainThreadRaster {
    fn method(&self) -> Method {
        Method::Canvas
    }

    fn compress(
        &self,
        request: &CompressionRequest,
    ) -> Result<CompressionResult, CompressionError> {
        self.run(request)
            .map_err(|cause| CompressionError::new(self.method(), cause))
    }
}
