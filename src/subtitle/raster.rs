use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{SubtitleConfig, parse_hex_color};
use crate::foundation::core::Canvas;
use crate::foundation::error::{FactoryError, FactoryResult};

/// Brush carried through parley layouts. Paint is chosen per pass, so this only satisfies the
/// layout's brush bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubtitleBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// First candidate font file that exists, if any.
pub fn locate_font(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// Rasterizes subtitle chunks into frame-sized premultiplied RGBA8 overlays.
///
/// Text is wrapped to a fraction of the frame width, every line is centered horizontally and the
/// whole block is centered vertically. The outline is drawn as filled offset copies of the glyphs
/// within the stroke radius, then the fill is drawn on top.
pub struct SubtitleRenderer {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<SubtitleBrush>,
    font: vello_cpu::peniko::FontData,
    family_name: String,
    canvas: Canvas,
    size_px: f32,
    max_width_px: f32,
    fill: [u8; 4],
    stroke: [u8; 4],
    stroke_offsets: Vec<(f64, f64)>,
}

impl std::fmt::Debug for SubtitleRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubtitleRenderer")
            .field("family_name", &self.family_name)
            .field("canvas", &self.canvas)
            .field("size_px", &self.size_px)
            .finish_non_exhaustive()
    }
}

impl SubtitleRenderer {
    /// Load the first available candidate font. Fails when none exists.
    pub fn from_config(cfg: &SubtitleConfig, canvas: Canvas) -> FactoryResult<Self> {
        let path = locate_font(&cfg.font_candidates).ok_or_else(|| {
            FactoryError::asset_not_found(format!(
                "no subtitle font found among {} candidates",
                cfg.font_candidates.len()
            ))
        })?;
        Self::from_font_file(&path, cfg, canvas)
    }

    pub fn from_font_file(path: &Path, cfg: &SubtitleConfig, canvas: Canvas) -> FactoryResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            FactoryError::media(format!("read font '{}': {e}", path.display()))
        })?;
        Self::from_font_bytes(bytes, cfg, canvas)
    }

    pub fn from_font_bytes(bytes: Vec<u8>, cfg: &SubtitleConfig, canvas: Canvas) -> FactoryResult<Self> {
        if !cfg.font_size_px.is_finite() || cfg.font_size_px <= 0.0 {
            return Err(FactoryError::validation(
                "subtitle font_size_px must be finite and > 0",
            ));
        }
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            FactoryError::validation("no font families registered from subtitle font")
        })?;
        let family_name = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| FactoryError::validation("subtitle font family has no name"))?
            .to_string();
        debug!(%family_name, "subtitle font registered");

        let r = cfg.stroke_width_px as i32;
        let mut stroke_offsets = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                if (dx != 0 || dy != 0) && dx * dx + dy * dy <= r * r {
                    stroke_offsets.push((f64::from(dx), f64::from(dy)));
                }
            }
        }

        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            font: vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes), 0),
            family_name,
            canvas,
            size_px: cfg.font_size_px,
            max_width_px: (f64::from(canvas.width) * cfg.max_width_ratio) as f32,
            fill: parse_hex_color(&cfg.fill_color)?,
            stroke: parse_hex_color(&cfg.stroke_color)?,
            stroke_offsets,
        })
    }

    fn layout(&mut self, text: &str) -> parley::Layout<SubtitleBrush> {
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family_name.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(self.size_px));
        builder.push_default(parley::style::StyleProperty::Brush(SubtitleBrush::default()));

        let mut layout: parley::Layout<SubtitleBrush> = builder.build(text);
        layout.break_all_lines(Some(self.max_width_px));
        layout.align(
            Some(self.max_width_px),
            parley::Alignment::Start,
            parley::AlignmentOptions::default(),
        );
        layout
    }

    /// Render `text` into a frame-sized premultiplied RGBA8 buffer (transparent elsewhere).
    pub fn render(&mut self, text: &str) -> FactoryResult<Vec<u8>> {
        let w16: u16 = self
            .canvas
            .width
            .try_into()
            .map_err(|_| FactoryError::validation("subtitle canvas width exceeds u16"))?;
        let h16: u16 = self
            .canvas
            .height
            .try_into()
            .map_err(|_| FactoryError::validation("subtitle canvas height exceeds u16"))?;

        let layout = self.layout(text);
        let block_x = (f64::from(self.canvas.width) - f64::from(self.max_width_px)) / 2.0;
        let block_y = (f64::from(self.canvas.height) - f64::from(layout.height())) / 2.0;

        // Glyph runs with their per-line centering shift, collected once for every pass.
        let mut runs: Vec<(f64, f32, Vec<vello_cpu::Glyph>)> = Vec::new();
        for line in layout.lines() {
            let shift = f64::from((self.max_width_px - line.metrics().advance).max(0.0)) / 2.0;
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let glyphs = run
                    .glyphs()
                    .map(|g| vello_cpu::Glyph {
                        id: g.id,
                        x: g.x,
                        y: g.y,
                    })
                    .collect();
                runs.push((shift, run.run().font_size(), glyphs));
            }
        }

        let mut ctx = vello_cpu::RenderContext::new(w16, h16);
        let passes = self
            .stroke_offsets
            .iter()
            .map(|&(dx, dy)| (dx, dy, self.stroke))
            .chain(std::iter::once((0.0, 0.0, self.fill)));
        for (dx, dy, [r, g, b, a]) in passes {
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
            for (shift, font_size, glyphs) in &runs {
                ctx.set_transform(vello_cpu::kurbo::Affine::translate((
                    block_x + shift + dx,
                    block_y + dy,
                )));
                ctx.glyph_run(&self.font)
                    .font_size(*font_size)
                    .fill_glyphs(glyphs.iter().copied());
            }
        }
        ctx.flush();

        let mut pixmap = vello_cpu::Pixmap::new(w16, h16);
        ctx.render_to_pixmap(&mut pixmap);
        Ok(pixmap.data_as_u8_slice().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_font_picks_first_existing() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.ttf");
        let b = dir.path().join("b.ttf");
        std::fs::write(&b, b"font").unwrap();
        assert_eq!(locate_font(&[a.clone(), b.clone()]), Some(b.clone()));
        std::fs::write(&a, b"font").unwrap();
        assert_eq!(locate_font(&[a.clone(), b]), Some(a));
        assert_eq!(locate_font(&[]), None);
    }

    #[test]
    fn missing_fonts_are_reported() {
        let cfg = SubtitleConfig {
            font_candidates: vec![PathBuf::from("/nonexistent/font.ttf")],
            ..SubtitleConfig::default()
        };
        let err = SubtitleRenderer::from_config(
            &cfg,
            Canvas {
                width: 64,
                height: 96,
            },
        )
        .unwrap_err();
        assert!(matches!(err, FactoryError::AssetNotFound(_)));
    }

    #[test]
    fn garbage_font_bytes_are_rejected() {
        let err = SubtitleRenderer::from_font_bytes(
            b"not a font".to_vec(),
            &SubtitleConfig::default(),
            Canvas {
                width: 64,
                height: 96,
            },
        )
        .unwrap_err();
        assert!(matches!(err, FactoryError::Validation(_)));
    }

    #[test]
    fn renders_visible_centered_text_when_a_font_is_installed() {
        let Some(font) = locate_font(&SubtitleConfig::default().font_candidates) else {
            return;
        };
        let canvas = Canvas {
            width: 320,
            height: 320,
        };
        let cfg = SubtitleConfig {
            font_size_px: 40.0,
            ..SubtitleConfig::default()
        };
        let mut r = SubtitleRenderer::from_font_file(&font, &cfg, canvas).unwrap();
        let px = r.render("Hi").unwrap();
        assert_eq!(px.len(), canvas.rgba_len());
        let covered = px.chunks_exact(4).filter(|p| p[3] > 0).count();
        assert!(covered > 0);
        // Top rows stay clear for a single centered line.
        assert!(px[..320 * 4 * 40].chunks_exact(4).all(|p| p[3] == 0));
    }
}
