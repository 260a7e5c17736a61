// Font discovery, done once at startup and shared by both renderers.
// genpdf needs real font files for metrics, the raster renderer needs the same
// faces as ab_glyph fonts.
use ab_glyph::FontVec;
use genpdf::fonts::{FontData, FontFamily};
use std::path::{Path, PathBuf};

use crate::artifact::RenderError;

const FONT_DIRS: &[&str] = &[
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/liberation",
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/dejavu",
    "/usr/share/fonts/TTF",
    "/System/Library/Fonts/Supplemental",
    "/Library/Fonts",
];

/// File names of one family: regular, bold, italic, bold italic.
type FaceFiles = [&'static str; 4];

const SANS_FACES: &[FaceFiles] = &[
    [
        "LiberationSans-Regular.ttf",
        "LiberationSans-Bold.ttf",
        "LiberationSans-Italic.ttf",
        "LiberationSans-BoldItalic.ttf",
    ],
    [
        "DejaVuSans.ttf",
        "DejaVuSans-Bold.ttf",
        "DejaVuSans-Oblique.ttf",
        "DejaVuSans-BoldOblique.ttf",
    ],
    ["Arial.ttf", "Arial Bold.ttf", "Arial Italic.ttf", "Arial Bold Italic.ttf"],
];

const SERIF_FACES: &[FaceFiles] = &[
    [
        "LiberationSerif-Regular.ttf",
        "LiberationSerif-Bold.ttf",
        "LiberationSerif-Italic.ttf",
        "LiberationSerif-BoldItalic.ttf",
    ],
    [
        "DejaVuSerif.ttf",
        "DejaVuSerif-Bold.ttf",
        "DejaVuSerif-Italic.ttf",
        "DejaVuSerif-BoldItalic.ttf",
    ],
];

struct FontFiles {
    regular: Vec<u8>,
    bold: Vec<u8>,
    italic: Vec<u8>,
    bold_italic: Vec<u8>,
}

pub struct FontFace {
    pub regular: FontVec,
    pub bold: FontVec,
}

impl FontFace {
    fn from_files(files: &FontFiles) -> Result<Self, RenderError> {
        let load = |bytes: &Vec<u8>| {
            FontVec::try_from_vec(bytes.clone()).map_err(|e| RenderError::Fonts(e.to_string()))
        };
        Ok(Self {
            regular: load(&files.regular)?,
            bold: load(&files.bold)?,
        })
    }
}

pub struct Fonts {
    pdf: FontFamily<FontData>,
    sans: FontFace,
    serif: Option<FontFace>,
}

impl Fonts {
    /// Look for a sans family (required) and a serif family (optional),
    /// checking `preferred` before the standard system locations.
    pub fn discover(preferred: Option<&Path>) -> Result<Self, RenderError> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        if let Some(dir) = preferred {
            dirs.push(dir.to_path_buf());
        }
        dirs.extend(FONT_DIRS.iter().map(PathBuf::from));

        let sans = find_family(&dirs, SANS_FACES).ok_or_else(|| {
            RenderError::Fonts(
                "no sans-serif family found. Install: apt install fonts-liberation".to_string(),
            )
        })?;
        let serif = find_family(&dirs, SERIF_FACES);

        let pdf_font = |bytes: &Vec<u8>| FontData::new(bytes.clone(), None);
        let pdf = FontFamily {
            regular: pdf_font(&sans.regular)?,
            bold: pdf_font(&sans.bold)?,
            italic: pdf_font(&sans.italic)?,
            bold_italic: pdf_font(&sans.bold_italic)?,
        };

        let serif = match serif {
            Some(files) => Some(FontFace::from_files(&files)?),
            None => None,
        };

        Ok(Self {
            pdf,
            sans: FontFace::from_files(&sans)?,
            serif,
        })
    }

    pub fn pdf_family(&self) -> FontFamily<FontData> {
        self.pdf.clone()
    }

    /// Pick a raster face for a CSS-style family name; serif falls back to sans.
    pub fn face(&self, family: &str) -> &FontFace {
        let family = family.to_ascii_lowercase();
        let wants_serif = family.contains("serif") && !family.contains("sans");
        match (&self.serif, wants_serif) {
            (Some(serif), true) => serif,
            _ => &self.sans,
        }
    }
}

/// System fonts for render tests. A missing font skips the test locally and
/// fails it under CI.
#[cfg(test)]
pub(crate) fn test_fonts() -> Option<Fonts> {
    match Fonts::discover(None) {
        Ok(fonts) => Some(fonts),
        Err(e) if std::env::var_os("CI").is_some() => panic!("fonts required under CI: {}", e),
        Err(e) => {
            eprintln!("skipping: {}", e);
            None
        }
    }
}

fn find_family(dirs: &[PathBuf], candidates: &[FaceFiles]) -> Option<FontFiles> {
    dirs.iter()
        .filter(|dir| dir.exists())
        .find_map(|dir| candidates.iter().find_map(|files| read_family(dir, files)))
}

fn read_family(dir: &Path, files: &FaceFiles) -> Option<FontFiles> {
    let read = |name: &str| std::fs::read(dir.join(name)).ok();
    Some(FontFiles {
        regular: read(files[0])?,
        bold: read(files[1])?,
        italic: read(files[2])?,
        bold_italic: read(files[3])?,
    })
}
