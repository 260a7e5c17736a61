//! PNG certificate rendering.
//!
//! Draws onto a fixed 1600x1131 canvas (A4 landscape proportions) in a fixed
//! order: background, border, logo, title, accent bar, award caption,
//! recipient, email, wrapped description, issue date, QR code and the
//! right-aligned certificate ID footer.

mod logo;
mod wrap;

use ab_glyph::{FontVec, PxScale};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Luma, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;

use crate::artifact::{ArtifactFormat, RenderError, RenderedArtifact};
use crate::fonts::Fonts;

pub use logo::{LogoError, LogoLoader};
pub use wrap::{clip_lines, wrap_text};

pub const CANVAS_WIDTH: u32 = 1600;
pub const CANVAS_HEIGHT: u32 = 1131;
pub const DESCRIPTION_WIDTH: u32 = 1100;
pub const MIN_FONT_SIZE: f32 = 12.0;
pub const MAX_FONT_SIZE: f32 = 64.0;

const LOGO_MAX_HEIGHT: u32 = 140;
const LOGO_MAX_WIDTH: u32 = 360;
const BORDER_INSET: u32 = 30;
const BORDER_WIDTH: u32 = 8;
const FOOTER_MARGIN: i32 = 70;
const QR_SIZE: u32 = 150;
/// Text above the footer row ends where the QR code starts.
const CONTENT_BOTTOM: i32 = CANVAS_HEIGHT as i32 - FOOTER_MARGIN - QR_SIZE as i32;

/// Visual options for image certificates. Colors are `#rgb` or `#rrggbb`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateDesign {
    pub background_color: String,
    pub text_color: String,
    pub accent_color: String,
    pub font_size: f32,
    pub show_border: bool,
    pub border_color: String,
    pub font_family: String,
    pub show_logo: bool,
    pub logo_url: Option<String>,
}

impl Default for CertificateDesign {
    fn default() -> Self {
        Self {
            background_color: "#ffffff".to_string(),
            text_color: "#1f2937".to_string(),
            accent_color: "#2563eb".to_string(),
            font_size: 28.0,
            show_border: true,
            border_color: "#1e40af".to_string(),
            font_family: "sans-serif".to_string(),
            show_logo: false,
            logo_url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageCertificate {
    pub title: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub description: Option<String>,
    pub issued_date: NaiveDate,
    pub certificate_id: String,
    pub verification_url: Option<String>,
    pub design: CertificateDesign,
}

pub fn parse_hex_color(value: &str) -> Option<Rgba<u8>> {
    let hex = value.trim().strip_prefix('#')?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = channel(&c.to_string())?;
                rgb[i] = v * 16 + v;
            }
            Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
        }
        6 => Some(Rgba([
            channel(hex.get(0..2)?)?,
            channel(hex.get(2..4)?)?,
            channel(hex.get(4..6)?)?,
            255,
        ])),
        _ => None,
    }
}

#[derive(Clone)]
pub struct ImageRenderer {
    fonts: Arc<Fonts>,
}

impl ImageRenderer {
    pub fn new(fonts: Arc<Fonts>) -> Self {
        Self { fonts }
    }

    /// Render to PNG. `logo` is only drawn when the design asks for it.
    pub fn render(
        &self,
        cert: &ImageCertificate,
        logo: Option<&DynamicImage>,
    ) -> Result<RenderedArtifact, RenderError> {
        let design = &cert.design;
        let face = self.fonts.face(&design.font_family);
        let color = |value: &str, fallback: Rgba<u8>| parse_hex_color(value).unwrap_or(fallback);
        let background = color(&design.background_color, Rgba([255, 255, 255, 255]));
        let ink = color(&design.text_color, Rgba([31, 41, 55, 255]));
        let accent = color(&design.accent_color, Rgba([37, 99, 235, 255]));
        let base = design.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);

        let mut canvas = RgbaImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, background);

        if design.show_border {
            let border = color(&design.border_color, accent);
            for i in 0..BORDER_WIDTH {
                let inset = BORDER_INSET + i;
                let rect = Rect::at(inset as i32, inset as i32)
                    .of_size(CANVAS_WIDTH - 2 * inset, CANVAS_HEIGHT - 2 * inset);
                draw_hollow_rect_mut(&mut canvas, rect, border);
            }
        }

        let mut y: i32 = 90;

        if let Some(logo) = logo.filter(|_| design.show_logo) {
            let logo = fit_logo(logo);
            let x = (CANVAS_WIDTH.saturating_sub(logo.width()) / 2) as i64;
            imageops::overlay(&mut canvas, &logo, x, y as i64);
            y += logo.height() as i32 + 30;
        }

        y += draw_centered(&mut canvas, &face.bold, base * 2.0, accent, &cert.title, y);
        y += 20;

        let bar_width = 240;
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(((CANVAS_WIDTH - bar_width) / 2) as i32, y).of_size(bar_width, 6),
            accent,
        );
        y += 50;

        y += draw_centered(
            &mut canvas,
            &face.regular,
            base * 0.9,
            ink,
            "This certificate is awarded to",
            y,
        );
        y += 20;
        y += draw_centered(&mut canvas, &face.bold, base * 1.6, ink, &cert.recipient_name, y);
        y += 10;
        y += draw_centered(&mut canvas, &face.regular, base * 0.75, ink, &cert.recipient_email, y);
        y += 30;

        // The description gets whatever room is left above the issue date.
        let body_size = base * 0.8;
        let date_top = CONTENT_BOTTOM - line_height(body_size);
        let measure = |s: &str| text_size(PxScale::from(body_size), &face.regular, s).0;
        let description = cert.description.as_deref().unwrap_or_default();
        let room = date_top - y - 22;
        let max_lines = if room > 0 {
            (room / (line_height(body_size) + 8)) as usize
        } else {
            0
        };
        let lines = clip_lines(
            wrap_text(description, DESCRIPTION_WIDTH, measure),
            max_lines,
            DESCRIPTION_WIDTH,
            measure,
        );
        if !lines.is_empty() {
            for line in &lines {
                y += draw_centered(&mut canvas, &face.regular, body_size, ink, line, y);
                y += 8;
            }
            y += 22;
        }

        draw_centered(
            &mut canvas,
            &face.regular,
            body_size,
            ink,
            &format!("Issued on {}", cert.issued_date.format("%B %d, %Y")),
            y.min(date_top),
        );

        if let Some(url) = &cert.verification_url {
            match qr_tile(url) {
                Some(qr) => {
                    let top = CANVAS_HEIGHT as i64 - FOOTER_MARGIN as i64 - QR_SIZE as i64;
                    imageops::overlay(&mut canvas, &qr, 70, top);
                }
                None => tracing::warn!(
                    "QR code unavailable for certificate {}, rendering without it",
                    cert.certificate_id
                ),
            }
        }

        let footer = format!("Certificate ID: {}", cert.certificate_id);
        let footer_scale = PxScale::from(base * 0.6);
        let (w, h) = text_size(footer_scale, &face.regular, &footer);
        draw_text_mut(
            &mut canvas,
            ink,
            CANVAS_WIDTH as i32 - FOOTER_MARGIN - w as i32,
            CANVAS_HEIGHT as i32 - FOOTER_MARGIN - h as i32,
            footer_scale,
            &face.regular,
            &footer,
        );

        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(canvas).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;

        let mut artifact = RenderedArtifact::new(bytes, ArtifactFormat::Png.content_type());
        artifact.data_url = Some(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(&artifact.bytes)
        ));
        Ok(artifact)
    }
}

/// Draw `text` horizontally centered at `y`, returning the vertical space used.
fn draw_centered(
    canvas: &mut RgbaImage,
    font: &FontVec,
    size: f32,
    color: Rgba<u8>,
    text: &str,
    y: i32,
) -> i32 {
    let scale = PxScale::from(size);
    let (w, _) = text_size(scale, font, text);
    let x = (CANVAS_WIDTH as i32 - w as i32) / 2;
    draw_text_mut(canvas, color, x, y, scale, font, text);
    line_height(size)
}

fn line_height(size: f32) -> i32 {
    (size * 1.25).round() as i32
}

/// Shrink the logo to fit the logo box, keeping its aspect ratio. Smaller
/// logos are left alone.
fn fit_logo(logo: &DynamicImage) -> RgbaImage {
    if logo.height() > LOGO_MAX_HEIGHT || logo.width() > LOGO_MAX_WIDTH {
        logo.resize(LOGO_MAX_WIDTH, LOGO_MAX_HEIGHT, FilterType::Lanczos3)
            .to_rgba8()
    } else {
        logo.to_rgba8()
    }
}

fn qr_tile(url: &str) -> Option<RgbaImage> {
    let code = QrCode::new(url.as_bytes()).ok()?;
    let matrix = code
        .render::<Luma<u8>>()
        .max_dimensions(QR_SIZE, QR_SIZE)
        .build();
    Some(DynamicImage::ImageLuma8(matrix).to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::sha256_hex;
    use image::GenericImageView;

    fn renderer() -> Option<ImageRenderer> {
        crate::fonts::test_fonts().map(|fonts| ImageRenderer::new(Arc::new(fonts)))
    }

    fn certificate() -> ImageCertificate {
        ImageCertificate {
            title: "Certificate of Completion".to_string(),
            recipient_name: "Jane Doe".to_string(),
            recipient_email: "jane@example.org".to_string(),
            description: Some(
                "For completing the forty hour workshop on applied cryptography, \
                 including the capstone project on certificate transparency logs \
                 and a written examination graded with distinction."
                    .to_string(),
            ),
            issued_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            certificate_id: "abc123".to_string(),
            verification_url: Some("http://localhost:5001/verify/0123456789abcdef".to_string()),
            design: CertificateDesign::default(),
        }
    }

    #[test]
    fn renders_png_and_data_url() {
        let Some(renderer) = renderer() else { return };
        let artifact = renderer.render(&certificate(), None).unwrap();

        assert_eq!(artifact.content_type, "image/png");
        assert_eq!(artifact.content_hash, sha256_hex(&artifact.bytes));
        let data_url = artifact.data_url.as_deref().unwrap();
        assert!(data_url.starts_with("data:image/png;base64,"));
        let decoded = STANDARD
            .decode(data_url.trim_start_matches("data:image/png;base64,"))
            .unwrap();
        assert_eq!(decoded, artifact.bytes);

        let img = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!(img.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
    }

    #[test]
    fn background_and_border_colors_are_applied() {
        let Some(renderer) = renderer() else { return };
        let mut cert = certificate();
        cert.design.background_color = "#102030".to_string();
        cert.design.border_color = "#f00".to_string();
        let artifact = renderer.render(&cert, None).unwrap();
        let img = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();

        assert_eq!(img.get_pixel(5, 5), &Rgba([16, 32, 48, 255]));
        assert_eq!(img.get_pixel(BORDER_INSET + 2, 400), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn logo_is_scaled_into_box() {
        let wide = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1200, 300, Rgba([0, 0, 0, 255])));
        let fitted = fit_logo(&wide);
        assert!(fitted.width() <= LOGO_MAX_WIDTH);
        assert!(fitted.height() <= LOGO_MAX_HEIGHT);
        assert_eq!(fitted.width() / fitted.height(), 4);

        let small = DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 40, Rgba([0, 0, 0, 255])));
        assert_eq!(fit_logo(&small).dimensions(), (50, 40));
    }

    #[test]
    fn renders_with_logo_and_without_description() {
        let Some(renderer) = renderer() else { return };
        let mut cert = certificate();
        cert.description = Some(String::new());
        cert.design.show_logo = true;
        let logo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(400, 400, Rgba([9, 9, 9, 255])));

        let artifact = renderer.render(&cert, Some(&logo)).unwrap();
        let img = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();
        // logo box starts at y = 90, centered
        assert_eq!(img.get_pixel(CANVAS_WIDTH / 2, 100), &Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn issue_date_stays_above_qr_at_largest_inputs() {
        let Some(renderer) = renderer() else { return };
        let mut cert = certificate();
        cert.description = Some("distinction ".repeat(166));
        cert.design.font_size = MAX_FONT_SIZE;
        cert.design.show_logo = true;
        let logo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(400, 400, Rgba([9, 9, 9, 255])));

        let render = |date: NaiveDate| {
            let mut cert = cert.clone();
            cert.issued_date = date;
            let artifact = renderer.render(&cert, Some(&logo)).unwrap();
            image::load_from_memory(&artifact.bytes).unwrap().to_rgba8()
        };
        let first = render(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let second = render(NaiveDate::from_ymd_opt(2025, 9, 30).unwrap());

        let changed_rows: Vec<u32> = (0..CANVAS_HEIGHT)
            .filter(|&row| {
                (0..CANVAS_WIDTH).any(|x| first.get_pixel(x, row) != second.get_pixel(x, row))
            })
            .collect();
        assert!(!changed_rows.is_empty(), "issue date was not drawn");
        assert!(changed_rows.iter().all(|&row| (row as i32) < CONTENT_BOTTOM));
    }

    #[test]
    fn description_lines_fit_budget_with_real_font() {
        let Some(fonts) = crate::fonts::test_fonts() else { return };
        let face = fonts.face("sans-serif");
        let scale = PxScale::from(22.0);
        let text = "word ".repeat(400);
        let lines = wrap_text(&text, DESCRIPTION_WIDTH, |s| text_size(scale, &face.regular, s).0);
        assert!(lines.len() > 1);
        for line in lines {
            assert!(text_size(scale, &face.regular, &line).0 <= DESCRIPTION_WIDTH);
        }
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#ffffff"), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_hex_color("#0a0"), Some(Rgba([0, 170, 0, 255])));
        assert_eq!(parse_hex_color("ffffff"), None);
        assert_eq!(parse_hex_color("#gggggg"), None);
        assert_eq!(parse_hex_color("#12345"), None);
    }
}
