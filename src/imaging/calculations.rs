//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Compute the output dimensions for an image bounded by optional limits.
///
/// The image is scaled uniformly by the largest factor (never above 1) that
/// keeps each bounded axis within its limit. With no limits the natural size
/// is returned unchanged.
///
/// Every strategy, including the background worker, goes through this
/// function so a batch comes out dimensionally consistent whichever strategy
/// handled each item.
///
/// # Arguments
/// * `natural_width`, `natural_height` - Decoded image size
/// * `max_width`, `max_height` - Optional bounds (positive)
///
/// # Returns
/// * `(width, height)` - Target size; an axis that would round to zero is kept at 1
///
/// # Examples
/// ```
/// # use pixpress::imaging::compute_target_size;
/// assert_eq!(compute_target_size(1000, 500, Some(400), None), (400, 200));
/// assert_eq!(compute_target_size(300, 200, Some(400), Some(400)), (300, 200));
/// ```
pub fn compute_target_size(
    natural_width: u32,
    natural_height: u32,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> (u32, u32) {
    if max_width.is_none() && max_height.is_none() {
        return (natural_width, natural_height);
    }

    let mut scale: f64 = 1.0;
    if let Some(max_w) = max_width {
        scale = scale.min(max_w as f64 / natural_width as f64);
    }
    if let Some(max_h) = max_height {
        scale = scale.min(max_h as f64 / natural_height as f64);
    }

    (scale_axis(natural_width, scale), scale_axis(natural_height, scale))
}

fn scale_axis(natural: u32, scale: f64) -> u32 {
    if natural == 0 {
        return 0;
    }
    ((natural as f64 * scale).round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_bounds_is_identity() {
        assert_eq!(compute_target_size(1234, 567, None, None), (1234, 567));
    }

    #[test]
    fn identity_is_idempotent() {
        let once = compute_target_size(800, 600, None, None);
        let twice = compute_target_size(once.0, once.1, None, None);
        assert_eq!(once, twice);
    }

    #[test]
    fn width_bound_scales_both_axes() {
        assert_eq!(compute_target_size(1000, 500, Some(400), None), (400, 200));
    }

    #[test]
    fn height_bound_scales_both_axes() {
        assert_eq!(compute_target_size(1000, 500, None, Some(100)), (200, 100));
    }

    #[test]
    fn tighter_bound_wins() {
        // width allows 0.8, height allows 0.5
        assert_eq!(compute_target_size(1000, 800, Some(800), Some(400)), (500, 400));
    }

    #[test]
    fn never_upscales() {
        assert_eq!(compute_target_size(300, 200, Some(4000), Some(4000)), (300, 200));
    }

    #[test]
    fn rounds_to_nearest() {
        // 333 * 0.5 = 166.5 -> 167
        assert_eq!(compute_target_size(200, 333, Some(100), None), (100, 167));
    }

    #[test]
    fn extreme_aspect_keeps_one_pixel() {
        assert_eq!(compute_target_size(1000, 1, Some(400), None), (400, 1));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn bound_strategy() -> impl Strategy<Value = Option<u32>> {
        prop::option::of(1u32..=5000)
    }

    proptest! {
        /// Property: a bounded axis never exceeds its bound.
        #[test]
        fn prop_never_exceeds_bounds(
            width in 1u32..=10_000,
            height in 1u32..=10_000,
            max_width in bound_strategy(),
            max_height in bound_strategy(),
        ) {
            let (w, h) = compute_target_size(width, height, max_width, max_height);
            if let Some(max_w) = max_width {
                prop_assert!(w <= max_w, "{} > {}", w, max_w);
            }
            if let Some(max_h) = max_height {
                prop_assert!(h <= max_h, "{} > {}", h, max_h);
            }
        }

        /// Property: output is never larger than the input on either axis.
        #[test]
        fn prop_never_upscales(
            width in 1u32..=10_000,
            height in 1u32..=10_000,
            max_width in bound_strategy(),
            max_height in bound_strategy(),
        ) {
            let (w, h) = compute_target_size(width, height, max_width, max_height);
            prop_assert!(w <= width);
            prop_assert!(h <= height);
            prop_assert!(w >= 1 && h >= 1);
        }
    }
}
