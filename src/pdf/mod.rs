// Certificate PDF generation
// Landscape A4 page drawn with genpdf. Fonts come from the shared `Fonts`
// registry loaded at startup.
mod frame;

use chrono::NaiveDate;
use genpdf::elements::{Break, Image, Paragraph};
use genpdf::style::{Color, Style};
use genpdf::{Alignment, Element, Scale, Size};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;
use std::sync::Arc;

use crate::artifact::{ArtifactFormat, RenderError, RenderedArtifact};
use crate::fonts::Fonts;

pub use frame::CertificateFrame;

pub const PAGE_WIDTH_MM: f64 = 297.0;
pub const PAGE_HEIGHT_MM: f64 = 210.0;

const QR_MIN_PX: u32 = 240;

/// Everything printed on the PDF certificate.
#[derive(Debug, Clone)]
pub struct PdfCertificate {
    pub title: String,
    pub recipient_name: String,
    pub issue_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub institution_name: String,
    pub certificate_id: String,
    pub verification_url: String,
}

#[derive(Clone)]
pub struct PdfRenderer {
    fonts: Arc<Fonts>,
}

impl PdfRenderer {
    pub fn new(fonts: Arc<Fonts>) -> Self {
        Self { fonts }
    }

    pub fn render(&self, cert: &PdfCertificate) -> Result<RenderedArtifact, RenderError> {
        let mut doc = genpdf::Document::new(self.fonts.pdf_family());
        doc.set_title(cert.title.clone());
        doc.set_paper_size(Size::new(PAGE_WIDTH_MM, PAGE_HEIGHT_MM));
        doc.set_page_decorator(CertificateFrame::default());

        let ink = Color::Rgb(31, 41, 55);
        let accent = Color::Rgb(30, 64, 175);

        doc.push(
            Paragraph::new(truncate(&cert.title, 80))
                .aligned(Alignment::Center)
                .styled(Style::new().bold().with_font_size(30).with_color(accent)),
        );
        doc.push(Break::new(1.5));
        doc.push(centered("This is to certify that", Style::new().with_font_size(14).with_color(ink)));
        doc.push(Break::new(0.5));
        doc.push(
            Paragraph::new(truncate(&cert.recipient_name, 60))
                .aligned(Alignment::Center)
                .styled(Style::new().bold().with_font_size(26).with_color(ink)),
        );
        doc.push(Break::new(0.5));
        doc.push(centered(
            format!(
                "has been awarded this certificate by {}",
                truncate(&cert.institution_name, 80)
            ),
            Style::new().with_font_size(14).with_color(ink),
        ));
        doc.push(Break::new(1.0));
        doc.push(centered(
            format!("Issued on {}", cert.issue_date.format("%B %d, %Y")),
            Style::new().with_font_size(12).with_color(ink),
        ));
        if let Some(expiry) = cert.expiry_date {
            doc.push(centered(
                format!("Valid until {}", expiry.format("%B %d, %Y")),
                Style::new().with_font_size(12).with_color(ink),
            ));
        }
        doc.push(Break::new(1.0));

        let small = || Style::new().with_font_size(9).with_color(ink);
        match qr_image(&cert.verification_url) {
            Ok(qr) => {
                doc.push(qr);
                doc.push(centered("Scan to verify", small()));
                doc.push(centered(cert.verification_url.clone(), small()));
            }
            Err(e) => {
                tracing::warn!(
                    "QR code unavailable for certificate {}, printing URL only: {}",
                    cert.certificate_id,
                    e
                );
                doc.push(centered(
                    format!("Verify at: {}", cert.verification_url),
                    Style::new().with_font_size(11).with_color(ink),
                ));
            }
        }

        doc.push(Break::new(1.0));
        doc.push(centered(format!("Certificate ID: {}", cert.certificate_id), small()));

        let mut bytes = Vec::new();
        doc.render(&mut bytes)?;
        Ok(RenderedArtifact::new(bytes, ArtifactFormat::Pdf.content_type()))
    }
}

fn centered(text: impl Into<String>, style: Style) -> impl Element {
    Paragraph::new(text.into())
        .aligned(Alignment::Center)
        .styled(style)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
enum QrError {
    #[error("encoding: {0}")]
    Encode(#[from] qrcode::types::QrError),
    #[error("png: {0}")]
    Png(#[from] image::ImageError),
    #[error("embedding: {0}")]
    Embed(#[from] genpdf::error::Error),
}

/// QR code of `url` as a centered genpdf image. Greyscale only, printpdf does
/// not embed alpha channels.
fn qr_image(url: &str) -> Result<Image, QrError> {
    let code = QrCode::new(url.as_bytes())?;
    let matrix = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_PX, QR_MIN_PX)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(matrix).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    let image = Image::from_reader(Cursor::new(png))?
        .with_alignment(Alignment::Center)
        .with_scale(Scale::new(0.8, 0.8));
    Ok(image)
}
