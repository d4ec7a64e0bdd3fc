//! A4 PDF rendering of a `ReportPayload`.
//!
//! Slogan header and disclaimer/address footer repeat on every page. Hangul
//! needs an embedded TTF; without one the text falls back to Helvetica with
//! non-ASCII characters replaced.

use super::{or_dash, ReportError, ReportPayload, DISCLAIMER, FOOTER, SLOGAN, TITLE};
use printpdf::{
    BuiltinFont, Color, Greyscale, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN_X: f32 = 20.0;
const MARGIN_TOP: f32 = 20.0;
const MARGIN_BOTTOM: f32 = 30.0;
const USABLE_W: f32 = PAGE_W - 2.0 * MARGIN_X;
const LABEL_W: f32 = 42.0;
const SURVEY_LABEL_W: f32 = 22.0;

const BODY_PT: f32 = 10.0;
const TITLE_PT: f32 = 14.0;
const SMALL_PT: f32 = 7.0;
const PT_TO_MM: f32 = 25.4 / 72.0;

const FONT_CANDIDATES: [&str; 9] = [
    r"C:\Windows\Fonts\malgun.ttf",
    r"C:\Windows\Fonts\malgunbd.ttf",
    r"C:\Windows\Fonts\NanumGothic.ttf",
    r"C:\Windows\Fonts\NotoSansKR-Regular.ttf",
    "/usr/share/fonts/truetype/nanum/NanumGothic.ttf",
    "/usr/share/fonts/truetype/nanum/NanumGothicBold.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansKR-Regular.ttf",
    "/Library/Fonts/AppleGothic.ttf",
    "/Library/Fonts/NanumGothic.ttf",
];

/// First existing font: `preferred`, then the usual system locations.
pub fn find_korean_font(preferred: Option<&Path>) -> Option<PathBuf> {
    preferred
        .map(Path::to_path_buf)
        .into_iter()
        .chain(FONT_CANDIDATES.iter().map(PathBuf::from))
        .find(|p| p.is_file())
}

fn pdf_error(e: printpdf::Error) -> ReportError {
    ReportError::Pdf(format!("{:?}", e))
}

struct ReportFont {
    font: IndirectFontRef,
    unicode: bool,
}

fn load_font(doc: &PdfDocumentReference, preferred: Option<&Path>) -> Result<ReportFont, ReportError> {
    match find_korean_font(preferred) {
        Some(path) => {
            let embedded = File::open(&path)
                .map_err(|e| e.to_string())
                .and_then(|file| doc.add_external_font(file).map_err(|e| format!("{:?}", e)));
            match embedded {
                Ok(font) => {
                    debug!("Report font {:?}", path);
                    return Ok(ReportFont { font, unicode: true });
                }
                Err(e) => warn!("Font {:?} not usable ({}), falling back to Helvetica", path, e),
            }
        }
        None => warn!("No Korean font found, Hangul will not render (set report.font_path)"),
    }
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    Ok(ReportFont { font, unicode: false })
}

/// Approximate advance width: full-width for Hangul, about half for ASCII.
fn text_width_mm(text: &str, size_pt: f32) -> f32 {
    let ems: f32 = text.chars().map(|c| if c.is_ascii() { 0.55 } else { 1.0 }).sum();
    ems * size_pt * PT_TO_MM
}

/// One line that fits `max_mm`, cut with an ellipsis when needed.
fn fit_one_line(text: &str, max_mm: f32, size_pt: f32) -> String {
    let mut t = text.replace('\n', " ").trim().to_string();
    if text_width_mm(&t, size_pt) <= max_mm {
        return t;
    }
    const ELLIPSIS: &str = " …";
    while !t.is_empty() && text_width_mm(&format!("{}{}", t, ELLIPSIS), size_pt) > max_mm {
        t.pop();
    }
    if t.is_empty() { t } else { format!("{}{}", t.trim_end(), ELLIPSIS) }
}

/// Greedy wrap on characters so Hangul without spaces still breaks.
fn wrap(text: &str, max_mm: f32, size_pt: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for para in text.lines() {
        let mut line = String::new();
        for c in para.chars() {
            line.push(c);
            if text_width_mm(&line, size_pt) > max_mm {
                line.pop();
                lines.push(std::mem::take(&mut line));
                line.push(c);
            }
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

struct Canvas<'a> {
    doc: &'a PdfDocumentReference,
    font: ReportFont,
    layer: PdfLayerReference,
    /// Baseline cursor, mm from the page bottom.
    y: f32,
    pages: usize,
}

impl<'a> Canvas<'a> {
    fn new(doc: &'a PdfDocumentReference, font: ReportFont, layer: PdfLayerReference) -> Self {
        let canvas = Self {
            doc,
            font,
            layer,
            y: PAGE_H - MARGIN_TOP - 4.0,
            pages: 1,
        };
        canvas.decorate();
        canvas
    }

    fn decorate(&self) {
        self.layer.set_outline_color(Color::Greyscale(Greyscale::new(0.5, None)));
        self.layer.set_outline_thickness(0.6);

        self.centered(SLOGAN, SMALL_PT, PAGE_H - MARGIN_TOP + 1.4);
        self.rule(PAGE_H - MARGIN_TOP - 0.7);

        let address_y = 8.0;
        let line_y = address_y + 5.0;
        self.centered(FOOTER, SMALL_PT, address_y);
        self.rule(line_y);
        self.centered(DISCLAIMER[1], SMALL_PT, line_y + 6.0);
        self.centered(DISCLAIMER[0], SMALL_PT, line_y + 10.2);
    }

    fn printable(&self, text: &str) -> String {
        if self.font.unicode {
            text.to_string()
        } else {
            text.chars().map(|c| if c.is_ascii() { c } else { '?' }).collect()
        }
    }

    fn text_at(&self, text: &str, size_pt: f32, x: f32, y: f32) {
        self.layer
            .use_text(self.printable(text), size_pt, Mm(x), Mm(y), &self.font.font);
    }

    fn centered(&self, text: &str, size_pt: f32, y: f32) {
        let x = ((PAGE_W - text_width_mm(text, size_pt)) / 2.0).max(MARGIN_X / 2.0);
        self.text_at(text, size_pt, x, y);
    }

    fn rule(&self, y: f32) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN_X), Mm(y)), false),
                (Point::new(Mm(PAGE_W - MARGIN_X), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    fn advance(&mut self, height: f32) {
        if self.y - height < MARGIN_BOTTOM {
            self.pages += 1;
            let (page, layer) =
                self.doc
                    .add_page(Mm(PAGE_W), Mm(PAGE_H), format!("Page {}", self.pages));
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.decorate();
            self.y = PAGE_H - MARGIN_TOP - 4.0;
        }
        self.y -= height;
    }

    fn line_height(size_pt: f32) -> f32 {
        (size_pt + 2.0) * PT_TO_MM
    }

    fn gap(&mut self, pt: f32) {
        self.y -= pt * PT_TO_MM;
    }

    fn paragraph(&mut self, text: &str) {
        for line in wrap(text, USABLE_W, BODY_PT) {
            self.advance(Self::line_height(BODY_PT));
            self.text_at(&line, BODY_PT, MARGIN_X, self.y);
        }
    }

    fn title(&mut self, text: &str) {
        self.advance(Self::line_height(TITLE_PT));
        self.centered(text, TITLE_PT, self.y);
    }

    /// Judgement table row, ruled below.
    fn table_row(&mut self, label: &str, text: &str) {
        let cell_w = USABLE_W - LABEL_W - 2.0;
        self.advance(Self::line_height(BODY_PT) + 3.0);
        self.text_at(label, BODY_PT, MARGIN_X + 1.5, self.y);
        self.text_at(
            &fit_one_line(text, cell_w, BODY_PT),
            BODY_PT,
            MARGIN_X + LABEL_W + 1.5,
            self.y,
        );
        self.rule(self.y - 2.0);
    }

    fn survey_row(&mut self, label: &str, value: &str) {
        let value_w = USABLE_W - SURVEY_LABEL_W - 2.0;
        let lines = wrap(value.trim(), value_w, BODY_PT);
        for (i, line) in lines.iter().enumerate() {
            self.advance(Self::line_height(BODY_PT) + 1.0);
            if i == 0 {
                let x = MARGIN_X + SURVEY_LABEL_W - text_width_mm(label, BODY_PT);
                self.text_at(label, BODY_PT, x.max(MARGIN_X), self.y);
            }
            self.text_at(line, BODY_PT, MARGIN_X + SURVEY_LABEL_W + 2.0, self.y);
        }
    }
}

fn compose(
    payload: &ReportPayload,
    font: Option<&Path>,
) -> Result<(PdfDocumentReference, usize), ReportError> {
    let (doc, page, layer) = PdfDocument::new(TITLE, Mm(PAGE_W), Mm(PAGE_H), "Page 1");
    let pages = {
        let font = load_font(&doc, font)?;
        let layer = doc.get_page(page).get_layer(layer);
        let mut canvas = Canvas::new(&doc, font, layer);

        canvas.title(TITLE);
        canvas.gap(12.0);
        canvas.paragraph(&format!("물건명: {}", or_dash(&payload.property_name)));
        canvas.paragraph(&format!("주소: {}", or_dash(&payload.property_address)));
        canvas.gap(8.0);

        canvas.rule(canvas.y - 2.0);
        canvas.table_row("판단 항목", "판단 근거");
        for (label, text) in super::judgement_rows(payload) {
            canvas.table_row(label, text);
        }
        canvas.gap(10.0);

        canvas.survey_row("조사 담당자", &payload.investigator);
        canvas.survey_row(
            "조사 일자",
            &format!("{} 월 {} 일", payload.date_month.trim(), payload.date_day.trim()),
        );
        canvas.survey_row("확인한 시설", &payload.confirm_facilities.join(", "));
        canvas.survey_row("확인자", &payload.confirmer);
        canvas.gap(6.0);
        canvas.survey_row("검토 의견", &payload.opinion);
        canvas.pages
    };
    debug!("Report laid out on {} page(s)", pages);
    Ok((doc, pages))
}

/// PDF bytes for `payload`, embedding the first Korean font found.
pub fn render_pdf(payload: &ReportPayload, font: Option<&Path>) -> Result<Vec<u8>, ReportError> {
    let (doc, _) = compose(payload, font)?;
    doc.save_to_bytes().map_err(pdf_error)
}
