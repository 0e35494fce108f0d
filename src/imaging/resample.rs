//! Manual nearest-neighbour resampling over raw RGBA buffers.
//!
//! Used by the dependency-free strategy, which must not rely on any built-in
//! surface scaling. Each destination pixel copies exactly one source pixel;
//! there is no blending.

/// Bytes per RGBA pixel.
const CHANNELS: usize = 4;

/// Resample an RGBA buffer from `old_width`×`old_height` to `new_width`×`new_height`.
///
/// Destination pixel `(x, y)` takes source pixel
/// `(⌊x·old_width/new_width⌋, ⌊y·old_height/new_height⌋)`, all four channels
/// copied verbatim.
///
/// # Panics
/// Panics if `pixels` is shorter than `old_width * old_height * 4`.
pub fn nearest_neighbor(
    pixels: &[u8],
    old_width: u32,
    old_height: u32,
    new_width: u32,
    new_height: u32,
) -> Vec<u8> {
    let (old_w, old_h) = (old_width as usize, old_height as usize);
    let (new_w, new_h) = (new_width as usize, new_height as usize);
    assert!(
        pixels.len() >= old_w * old_h * CHANNELS,
        "pixel buffer too short for {old_width}x{old_height}"
    );

    let mut out = vec![0u8; new_w * new_h * CHANNELS];
    if old_w == 0 || old_h == 0 {
        return out;
    }

    for y in 0..new_h {
        let source_y = y * old_h / new_h;
        for x in 0..new_w {
            let source_x = x * old_w / new_w;
            let src = (source_y * old_w + source_x) * CHANNELS;
            let dst = (y * new_w + x) * CHANNELS;
            out[dst..dst + CHANNELS].copy_from_slice(&pixels[src..src + CHANNELS]);
        }
    }

    out
}
