//! QR adapter: Implementation of BarcodeRenderer using the `qrcode` crate.
//!
//! Modules are drawn onto an RGBA canvas with the requested quiet zone and
//! colors, then PNG-encoded into a `data:` URL. The module size is the
//! largest integer scale that fits the requested width, so the image may be
//! slightly narrower than asked (never wider, unless the code itself has more
//! modules than pixels requested).

use std::io::Cursor;

use base64::engine::general_purpose;
use base64::Engine;
use image::{ImageFormat, Rgba, RgbaImage};
use qrcode::{Color, EcLevel, QrCode};

use crate::domain::{CodecError, ErrorCorrection, QrOptions};
use crate::ports::BarcodeRenderer;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Largest image side, in pixels, the renderer will allocate.
pub const MAX_IMAGE_SIZE: u32 = 4096;

/// QR code renderer producing PNG data URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrCodeRenderer;

impl QrCodeRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn ec_level(level: ErrorCorrection) -> EcLevel {
        match level {
            ErrorCorrection::Low => EcLevel::L,
            ErrorCorrection::Medium => EcLevel::M,
            ErrorCorrection::Quartile => EcLevel::Q,
            ErrorCorrection::High => EcLevel::H,
        }
    }
}

/// Parse `#RRGGBB` or `#RRGGBBAA` into a pixel.
fn parse_hex_color(input: &str) -> Result<Rgba<u8>, CodecError> {
    let hex = input.trim().trim_start_matches('#');
    let invalid = || CodecError::Encoding(format!("invalid color '{input}'"));

    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(invalid());
    }

    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    let alpha = if hex.len() == 8 { channel(6)? } else { 0xff };

    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

impl BarcodeRenderer for QrCodeRenderer {
    fn render(&self, text: &str, options: &QrOptions) -> Result<String, CodecError> {
        let code = QrCode::with_error_correction_level(
            text.as_bytes(),
            Self::ec_level(options.error_correction),
        )
        .map_err(|e| CodecError::Encoding(format!("QR generation failed: {e}")))?;

        let dark = parse_hex_color(&options.dark_color)?;
        let light = parse_hex_color(&options.light_color)?;

        let modules = u32::try_from(code.width())
            .map_err(|_| CodecError::Encoding("QR code too large".to_string()))?;
        let margin = options.margin;
        let span = margin
            .checked_mul(2)
            .and_then(|quiet| quiet.checked_add(modules))
            .ok_or_else(|| CodecError::Encoding(format!("margin {margin} is too large")))?;
        let scale = (options.width / span).max(1);
        let size = span
            .checked_mul(scale)
            .filter(|&size| size <= MAX_IMAGE_SIZE)
            .ok_or_else(|| {
                CodecError::Encoding(format!(
                    "image would exceed {MAX_IMAGE_SIZE}px (width {}, margin {margin})",
                    options.width
                ))
            })?;
        let colors = code.to_colors();

        let canvas = RgbaImage::from_fn(size, size, |x, y| {
            let (mx, my) = (x / scale, y / scale);
            let inside = (margin..margin + modules).contains(&mx)
                && (margin..margin + modules).contains(&my);
            if inside {
                let idx = ((my - margin) * modules + (mx - margin)) as usize;
                if colors[idx] == Color::Dark {
                    return dark;
                }
            }
            light
        });

        let mut png = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| CodecError::Encoding(format!("PNG encoding failed: {e}")))?;

        tracing::debug!(
            "Rendered QR code: {} modules, {}px, {} bytes PNG",
            modules,
            size,
            png.len()
        );

        Ok(format!(
            "{DATA_URL_PREFIX}{}",
            general_purpose::STANDARD.encode(png)
        ))
    }
}
