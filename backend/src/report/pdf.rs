use std::borrow::Cow;
use std::io::BufWriter;

use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};
use shared::{Advisory, ReportLabels};

use super::RenderError;
use super::layout::{ReportLine, layout_report};
use crate::analysis::model::Diagnosis;
use crate::locale::Locale;

// US Letter
const PAGE_WIDTH: f32 = 215.9;
const PAGE_HEIGHT: f32 = 279.4;
const LEFT_MARGIN: f32 = 14.0;
const TOP_MARGIN: f32 = 18.0;
const BOTTOM_MARGIN: f32 = 18.0;

const TITLE_SIZE: f32 = 20.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 12.0;
const LINE_HEIGHT: f32 = 6.35;
const SPACER_HEIGHT: f32 = 4.0;

struct Fonts {
    regular: IndirectFontRef,
    heading: IndirectFontRef,
    bullet: &'static str,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference, locale: &Locale) -> Result<Self, RenderError> {
        match &locale.font_data {
            Some(font) => {
                let face = doc
                    .add_external_font(font.as_bytes())
                    .map_err(|e| RenderError::Font(format!("{}: {e}", locale.font)))?;
                Ok(Self {
                    regular: face.clone(),
                    heading: face,
                    bullet: "•",
                })
            }
            None => Ok(Self {
                regular: doc
                    .add_builtin_font(BuiltinFont::Helvetica)
                    .map_err(|e| RenderError::Font(e.to_string()))?,
                heading: doc
                    .add_builtin_font(BuiltinFont::HelveticaBold)
                    .map_err(|e| RenderError::Font(e.to_string()))?,
                bullet: "-",
            }),
        }
    }
}

/// Built-in PDF faces only cover Latin-1.
fn builtin_face_can_draw(text: &str) -> bool {
    text.chars().all(|c| u32::from(c) < 0x100)
}

fn labels_text(labels: &ReportLabels) -> [&str; 7] {
    [
        &labels.report_title,
        &labels.disease_predicted,
        &labels.confidence,
        &labels.severity,
        &labels.root_cause,
        &labels.pesticides,
        &labels.precautions,
    ]
}

/// Without the locale's font, labels the built-in face cannot draw are replaced by the
/// English set so the report stays readable.
fn drawable_advisory<'a>(advisory: &'a Advisory, locale: &Locale) -> Cow<'a, Advisory> {
    if locale.font_data.is_some() {
        return Cow::Borrowed(advisory);
    }

    let analysis = &advisory.analysis;
    let body_drawable = builtin_face_can_draw(&analysis.root_cause)
        && builtin_face_can_draw(&analysis.precautions)
        && analysis.pesticides.iter().all(|p| builtin_face_can_draw(p));
    if !body_drawable {
        log::warn!(
            "Font {} for locale {} is not loaded; report body text will be incomplete",
            locale.font,
            locale.code
        );
    }

    if labels_text(&advisory.labels)
        .iter()
        .all(|label| builtin_face_can_draw(label))
    {
        return Cow::Borrowed(advisory);
    }
    log::warn!(
        "Font {} for locale {} is not loaded; using English report labels",
        locale.font,
        locale.code
    );
    Cow::Owned(Advisory {
        labels: ReportLabels::default(),
        analysis: advisory.analysis.clone(),
    })
}

/// Tracks the write position and starts a new page when the current one is full.
struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl<'a> PageWriter<'a> {
    fn new(doc: &'a PdfDocumentReference, layer: PdfLayerReference) -> Self {
        Self {
            doc,
            layer,
            y: PAGE_HEIGHT - TOP_MARGIN,
        }
    }

    fn text(&mut self, text: &str, size: f32, indent: f32, font: &IndirectFontRef) {
        if self.y - LINE_HEIGHT < BOTTOM_MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - TOP_MARGIN;
        }
        self.layer
            .use_text(text, size, Mm(LEFT_MARGIN + indent), Mm(self.y), font);
        self.y -= LINE_HEIGHT;
    }

    fn space(&mut self, height: f32) {
        self.y -= height;
    }
}

/// Renders the report entirely in memory. Returns the finished PDF bytes.
pub fn render_report(
    diagnosis: Option<&Diagnosis>,
    advisory: &Advisory,
    locale: &Locale,
) -> Result<Vec<u8>, RenderError> {
    let advisory = drawable_advisory(advisory, locale);
    let lines = layout_report(diagnosis, &advisory);
    let (doc, page1, layer1) = PdfDocument::new(
        &advisory.labels.report_title,
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let fonts = Fonts::load(&doc, locale)?;

    {
        let mut writer = PageWriter::new(&doc, doc.get_page(page1).get_layer(layer1));
        for line in &lines {
            match line {
                ReportLine::Title(text) => {
                    writer.text(text, TITLE_SIZE, 0.0, &fonts.heading);
                    writer.space(2.0);
                }
                ReportLine::Heading(text) => writer.text(text, HEADING_SIZE, 0.0, &fonts.heading),
                ReportLine::Body(text) => writer.text(text, BODY_SIZE, 0.0, &fonts.regular),
                ReportLine::Bullet(text) => {
                    let item = format!("  {} {}", fonts.bullet, text);
                    writer.text(&item, BODY_SIZE, 0.0, &fonts.regular);
                }
                ReportLine::Spacer => writer.space(SPACER_HEIGHT),
            }
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| RenderError::Save(e.to_string()))?;
    buf.into_inner()
        .map_err(|e| RenderError::Save(e.to_string()))
}
