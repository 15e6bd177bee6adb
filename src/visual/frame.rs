use std::path::Path;

use crate::assets::decode::load_premul_rgba;
use crate::foundation::core::Canvas;
use crate::foundation::error::{FactoryError, FactoryResult};
use crate::visual::plan::VisualSlice;

/// Premultiplied RGBA8 pixel.
pub type PremulRgba8 = [u8; 4];

/// Decode, crop and stretch one slice's image to the target frame.
///
/// Returns premultiplied RGBA8 of exactly `target.rgba_len()` bytes.
pub fn render_slice_frame(slice: &VisualSlice) -> FactoryResult<Vec<u8>> {
    crop_and_resize(&slice.image.path, slice, slice.target)
}

fn crop_and_resize(path: &Path, slice: &VisualSlice, target: Canvas) -> FactoryResult<Vec<u8>> {
    let buf = load_premul_rgba(path)?;
    let (x, y, w, h) = slice.crop.to_pixels(buf.width(), buf.height());
    let cropped = image::imageops::crop_imm(&buf, x, y, w, h).to_image();
    let resized = image::imageops::resize(
        &cropped,
        target.width,
        target.height,
        image::imageops::FilterType::CatmullRom,
    );
    Ok(resized.into_raw())
}

/// Opaque black frame used when a planned slice can no longer be decoded.
pub fn black_frame(target: Canvas) -> Vec<u8> {
    let mut out = vec![0u8; target.rgba_len()];
    for px in out.chunks_exact_mut(4) {
        px[3] = 255;
    }
    out
}

pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

/// Composite premultiplied `src` over `dst` in place.
pub fn over_in_place(dst: &mut [u8], src: &[u8]) -> FactoryResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(FactoryError::validation(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}
