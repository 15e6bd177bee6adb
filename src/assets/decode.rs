use std::path::Path;

use crate::foundation::error::{FactoryError, FactoryResult};

/// Decode a file into an owned premultiplied RGBA8 buffer, ready for `imageops`.
pub fn load_premul_rgba(path: &Path) -> FactoryResult<image::RgbaImage> {
    let bytes = std::fs::read(path)
        .map_err(|e| FactoryError::media(format!("read image '{}': {e}", path.display())))?;
    let mut rgba = image::load_from_memory(&bytes)
        .map_err(|e| FactoryError::media(format!("decode image '{}': {e}", path.display())))?
        .into_rgba8();
    premultiply_rgba8_in_place(&mut rgba);
    Ok(rgba)
}

/// Native dimensions without decoding the pixel data.
pub fn image_dimensions(path: &Path) -> FactoryResult<(u32, u32)> {
    let (w, h) = image::image_dimensions(path)
        .map_err(|e| FactoryError::media(format!("measure image '{}': {e}", path.display())))?;
    if w == 0 || h == 0 {
        return Err(FactoryError::media(format!(
            "image '{}' has zero dimensions",
            path.display()
        )));
    }
    Ok((w, h))
}

pub(crate) fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}
