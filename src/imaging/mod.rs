//! Image primitives shared by every strategy. Pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Target size** | [`compute_target_size`] |
//! | **Decode / scaled draw / encode** | `image` crate via [`raster`] |
//! | **Nearest-neighbour resize** | [`resample::nearest_neighbor`] |
//! | **Source resolution** | `base64` data URLs, filesystem paths via [`source`] |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Raster**: The in-memory surface every strategy draws into
//! - **Resample**: Manual pixel resampling for the dependency-free strategy
//! - **Source**: Materialising the four source shapes

mod calculations;
pub mod raster;
pub mod resample;
pub mod source;

pub use calculations::compute_target_size;
