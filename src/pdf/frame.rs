use genpdf::elements::Image;
use genpdf::error::{Error, ErrorKind};
use genpdf::render::Area;
use genpdf::style::{Color, Style};
use genpdf::{Context, Element, Margins, PageDecorator, Position};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use super::{PAGE_HEIGHT_MM, PAGE_WIDTH_MM};

/// Each background pixel covers this many millimetres. The fill is a single
/// color, so the coarse raster is stretched over the page.
const BACKGROUND_MM_PER_PX: f64 = 10.0;

/// Outer border band: hairlines this far apart, starting at the inset.
const OUTER_INSET_MM: f64 = 10.0;
const OUTER_STROKES: usize = 5;
const STROKE_SPACING_MM: f64 = 0.3;
const INNER_INSET_MM: f64 = 14.0;

/// Page decorator painting the certificate background and a double border,
/// then handing the inner area to the content elements.
pub struct CertificateFrame {
    background: Rgb<u8>,
    border: Color,
}

impl Default for CertificateFrame {
    fn default() -> Self {
        Self {
            background: Rgb([253, 251, 244]),
            border: Color::Rgb(30, 64, 175),
        }
    }
}

impl CertificateFrame {
    /// Solid RGB fill slightly larger than the page. printpdf does not embed
    /// alpha channels, so no RGBA here.
    fn background_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let width = (PAGE_WIDTH_MM / BACKGROUND_MM_PER_PX).ceil() as u32 + 1;
        let height = (PAGE_HEIGHT_MM / BACKGROUND_MM_PER_PX).ceil() as u32 + 1;
        let fill = RgbImage::from_pixel(width, height, self.background);

        let mut png = Vec::new();
        DynamicImage::ImageRgb8(fill).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(png)
    }

    fn outline(&self, area: &Area<'_>, inset: f64) {
        let (left, top) = (inset, inset);
        let (right, bottom) = (PAGE_WIDTH_MM - inset, PAGE_HEIGHT_MM - inset);
        area.draw_line(
            vec![
                Position::new(left, top),
                Position::new(right, top),
                Position::new(right, bottom),
                Position::new(left, bottom),
                Position::new(left, top),
            ],
            Style::new().with_color(self.border),
        );
    }
}

impl PageDecorator for CertificateFrame {
    fn decorate_page<'a>(
        &mut self,
        context: &Context,
        mut area: Area<'a>,
        style: Style,
    ) -> Result<Area<'a>, Error> {
        let png = self.background_png().map_err(|e| {
            Error::new(
                format!("could not encode page background: {}", e),
                ErrorKind::Internal,
            )
        })?;
        // dpi chosen so one pixel spans BACKGROUND_MM_PER_PX on the page
        Image::from_reader(Cursor::new(png))?
            .with_dpi(25.4 / BACKGROUND_MM_PER_PX)
            .render(context, area.clone(), style)?;

        for i in 0..OUTER_STROKES {
            self.outline(&area, OUTER_INSET_MM + i as f64 * STROKE_SPACING_MM);
        }
        self.outline(&area, INNER_INSET_MM);

        area.add_margins(Margins::trbl(24, 30, 20, 30));
        Ok(area)
    }
}
