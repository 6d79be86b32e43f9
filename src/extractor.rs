//! Character position extraction from PDF using lopdf
//!
//! Each page's content stream is interpreted and every shown glyph becomes
//! a [`CharPosition`], in content-stream order, with a bounding box in
//! top-left origin page coordinates.

use crate::SegmentError;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::Path;

/// Ascent used when a font carries no descriptor (glyph space units)
const DEFAULT_ASCENT: f32 = 750.0;
/// Descent used when a font carries no descriptor (glyph space units)
const DEFAULT_DESCENT: f32 = -250.0;
/// Glyph width used when a font has no usable `/Widths` entry
const DEFAULT_GLYPH_WIDTH: f32 = 500.0;

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Nesting limit for form XObjects drawn inside each other
const MAX_FORM_DEPTH: usize = 16;

/// One glyph with its bounding box
#[derive(Debug, Clone, PartialEq)]
pub struct CharPosition {
    /// Decoded text of the glyph
    pub text: String,
    /// Left edge
    pub x0: f32,
    /// Right edge
    pub x1: f32,
    /// Top edge, measured down from the top of the page
    pub top: f32,
    /// Bottom edge, measured down from the top of the page
    pub bottom: f32,
    /// Rendered font size
    pub size: f32,
}

/// The characters of one page, in extraction order
#[derive(Debug, Clone)]
pub struct PageRecord {
    /// Page index (0-based)
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub chars: Vec<CharPosition>,
}

/// Extract per-page character positions from a PDF file
pub fn extract_positions<P: AsRef<Path>>(path: P) -> Result<Vec<PageRecord>, SegmentError> {
    let doc = Document::load(path)?;
    extract_positions_from_doc(&doc)
}

/// Extract per-page character positions from a memory buffer
pub fn extract_positions_mem(buffer: &[u8]) -> Result<Vec<PageRecord>, SegmentError> {
    let doc = Document::load_mem(buffer)?;
    extract_positions_from_doc(&doc)
}

/// Extract per-page character positions from a loaded document
pub fn extract_positions_from_doc(doc: &Document) -> Result<Vec<PageRecord>, SegmentError> {
    doc.get_pages()
        .values()
        .enumerate()
        .map(|(index, &page_id)| extract_page(doc, page_id, index))
        .collect()
}

/// Multiply two 2D transformation matrices
/// Matrix format: [a, b, c, d, e, f] representing:
/// | a  b  0 |
/// | c  d  0 |
/// | e  f  1 |
fn multiply_matrices(m1: &[f32; 6], m2: &[f32; 6]) -> [f32; 6] {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

fn transform_point(m: &[f32; 6], x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

/// Page bounds in PDF user space
#[derive(Debug, Clone, Copy)]
struct MediaBox {
    llx: f32,
    lly: f32,
    urx: f32,
    ury: f32,
}

/// Look up `/MediaBox` on the page or the nearest ancestor that sets it
fn page_media_box(
    doc: &Document,
    page_id: ObjectId,
    index: usize,
) -> Result<MediaBox, SegmentError> {
    let shape_err = |reason: &str| SegmentError::DataShape {
        page: index,
        reason: reason.to_string(),
    };

    let mut dict = doc.get_dictionary(page_id)?;
    // Page trees are shallow; the bound only guards against Parent cycles
    for _ in 0..64 {
        if let Ok(obj) = dict.get(b"MediaBox") {
            let values = resolve(doc, obj)
                .as_array()
                .map_err(|_| shape_err("MediaBox is not an array"))?;
            let numbers: Vec<f32> = values
                .iter()
                .filter_map(|v| get_number(resolve(doc, v)))
                .collect();
            if numbers.len() != 4 {
                return Err(shape_err("MediaBox must hold four numbers"));
            }
            return Ok(MediaBox {
                llx: numbers[0].min(numbers[2]),
                lly: numbers[1].min(numbers[3]),
                urx: numbers[0].max(numbers[2]),
                ury: numbers[1].max(numbers[3]),
            });
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent_id) => dict = doc.get_dictionary(parent_id)?,
            Err(_) => break,
        }
    }

    Err(shape_err("page has no MediaBox"))
}

/// Metrics needed to place glyphs of one font
#[derive(Debug, Clone)]
struct FontMetrics {
    /// Type0 fonts use two-byte codes
    two_byte: bool,
    first_char: i64,
    widths: Vec<f32>,
    default_width: f32,
    ascent: f32,
    descent: f32,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            two_byte: false,
            first_char: 0,
            widths: Vec::new(),
            default_width: DEFAULT_GLYPH_WIDTH,
            ascent: DEFAULT_ASCENT,
            descent: DEFAULT_DESCENT,
        }
    }
}

impl FontMetrics {
    fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let mut metrics = FontMetrics::default();

        let is_type0 = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|name| name == b"Type0")
            .unwrap_or(false);

        // Type0 metrics live on the descendant CIDFont
        let metrics_dict = if is_type0 {
            metrics.two_byte = true;
            metrics.default_width = 1000.0;
            font.get(b"DescendantFonts")
                .ok()
                .and_then(|obj| resolve(doc, obj).as_array().ok())
                .and_then(|fonts| fonts.first())
                .and_then(|obj| resolve(doc, obj).as_dict().ok())
                .unwrap_or(font)
        } else {
            font
        };

        if is_type0 {
            if let Some(dw) = metrics_dict
                .get(b"DW")
                .ok()
                .and_then(|obj| get_number(resolve(doc, obj)))
            {
                metrics.default_width = dw;
            }
        } else {
            metrics.first_char = font
                .get(b"FirstChar")
                .ok()
                .and_then(|obj| resolve(doc, obj).as_i64().ok())
                .unwrap_or(0);
            metrics.widths = font
                .get(b"Widths")
                .ok()
                .and_then(|obj| resolve(doc, obj).as_array().ok())
                .map(|values| {
                    values
                        .iter()
                        .map(|v| get_number(resolve(doc, v)).unwrap_or(0.0))
                        .collect()
                })
                .unwrap_or_default();
        }

        let descriptor = metrics_dict
            .get(b"FontDescriptor")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_dict().ok());

        if let Some(descriptor) = descriptor {
            let ascent = descriptor
                .get(b"Ascent")
                .ok()
                .and_then(|obj| get_number(resolve(doc, obj)));
            let descent = descriptor
                .get(b"Descent")
                .ok()
                .and_then(|obj| get_number(resolve(doc, obj)));
            if let (Some(ascent), Some(descent)) = (ascent, descent) {
                if ascent != 0.0 || descent != 0.0 {
                    metrics.ascent = ascent;
                    // Some producers write a positive descent
                    metrics.descent = if descent > 0.0 { -descent } else { descent };
                }
            }
        }

        metrics
    }

    /// Glyph width in thousandths of an em
    fn width(&self, code: u32) -> f32 {
        let slot = code as i64 - self.first_char;
        if slot >= 0 {
            if let Some(&w) = self.widths.get(slot as usize) {
                if w > 0.0 {
                    return w;
                }
            }
        }
        self.default_width
    }
}

/// Text state parameters (PDF 32000-1, 9.3)
#[derive(Debug, Clone)]
struct TextState {
    font: String,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    h_scaling: f32,
    leading: Option<f32>,
    rise: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: String::new(),
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scaling: 1.0,
            leading: None,
            rise: 0.0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply_matrices(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        // Without an explicit TL, approximate the line height from the font size
        let leading = self.leading.unwrap_or(self.font_size * 1.2);
        self.move_line(0.0, -leading);
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = multiply_matrices(&[1.0, 0.0, 0.0, 1.0, tx, 0.0], &self.text_matrix);
    }
}

/// Fonts and XObjects a content stream can refer to by name
#[derive(Debug, Clone, Default)]
struct ResourceScope<'a> {
    fonts: BTreeMap<Vec<u8>, &'a Dictionary>,
    metrics: BTreeMap<Vec<u8>, FontMetrics>,
    xobjects: BTreeMap<Vec<u8>, ObjectId>,
}

impl<'a> ResourceScope<'a> {
    fn for_page(doc: &'a Document, page_id: ObjectId) -> Result<Self, SegmentError> {
        let mut scope = ResourceScope::default();
        for (name, font) in doc.get_page_fonts(page_id).unwrap_or_default() {
            scope.add_font(doc, name, font);
        }

        // Resources are inheritable; the nearest definition of a name wins
        let mut dict = doc.get_dictionary(page_id)?;
        for _ in 0..64 {
            let resources = dict.get(b"Resources").ok();
            if let Some(resources) = resources.and_then(|obj| as_dict(doc, obj)) {
                scope.add_xobjects(doc, resources, false);
            }
            match dict.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent_id) => dict = doc.get_dictionary(parent_id)?,
                Err(_) => break,
            }
        }

        Ok(scope)
    }

    /// Scope of a form XObject: its own resources layered over the caller's
    fn with_resources(&self, doc: &'a Document, resources: &'a Dictionary) -> Self {
        let mut scope = self.clone();
        if let Some(fonts) = resources.get(b"Font").ok().and_then(|obj| as_dict(doc, obj)) {
            for (name, value) in fonts.iter() {
                if let Some(font) = as_dict(doc, value) {
                    scope.add_font(doc, name.clone(), font);
                }
            }
        }
        scope.add_xobjects(doc, resources, true);
        scope
    }

    fn add_font(&mut self, doc: &'a Document, name: Vec<u8>, font: &'a Dictionary) {
        self.metrics.insert(name.clone(), FontMetrics::from_dict(doc, font));
        self.fonts.insert(name, font);
    }

    fn add_xobjects(&mut self, doc: &Document, resources: &Dictionary, replace: bool) {
        let xobjects = resources.get(b"XObject").ok();
        let Some(xobjects) = xobjects.and_then(|obj| as_dict(doc, obj)) else {
            return;
        };
        for (name, value) in xobjects.iter() {
            if let Ok(id) = value.as_reference() {
                if replace || !self.xobjects.contains_key(name) {
                    self.xobjects.insert(name.clone(), id);
                }
            }
        }
    }
}

/// Interpreter for a single page's content stream
struct PageInterpreter<'a> {
    doc: &'a Document,
    index: usize,
    media_box: MediaBox,
    scope: ResourceScope<'a>,
    /// Form XObjects currently being drawn, innermost last
    forms: Vec<ObjectId>,
    ctm: [f32; 6],
    ctm_stack: Vec<[f32; 6]>,
    text: TextState,
    in_text_block: bool,
    chars: Vec<CharPosition>,
}

/// Extract the characters of a single page
fn extract_page(
    doc: &Document,
    page_id: ObjectId,
    index: usize,
) -> Result<PageRecord, SegmentError> {
    let media_box = page_media_box(doc, page_id, index)?;

    let content_data = doc.get_page_content(page_id)?;
    let content = Content::decode(&content_data)?;

    let mut interpreter = PageInterpreter {
        doc,
        index,
        media_box,
        scope: ResourceScope::for_page(doc, page_id)?,
        forms: Vec::new(),
        ctm: IDENTITY,
        ctm_stack: Vec::new(),
        text: TextState::default(),
        in_text_block: false,
        chars: Vec::new(),
    };

    for op in &content.operations {
        interpreter.apply(op)?;
    }

    log::debug!("page {}: extracted {} chars", index, interpreter.chars.len());

    Ok(PageRecord {
        index,
        width: media_box.urx - media_box.llx,
        height: media_box.ury - media_box.lly,
        chars: interpreter.chars,
    })
}

impl<'a> PageInterpreter<'a> {
    fn apply(&mut self, op: &Operation) -> Result<(), SegmentError> {
        match op.operator.as_str() {
            "q" => {
                // Save graphics state
                self.ctm_stack.push(self.ctm);
            }
            "Q" => {
                // Restore graphics state
                if let Some(saved) = self.ctm_stack.pop() {
                    self.ctm = saved;
                }
            }
            "cm" => {
                let m = self.numbers(op, 6)?;
                self.ctm = multiply_matrices(&[m[0], m[1], m[2], m[3], m[4], m[5]], &self.ctm);
            }
            "BT" => {
                self.in_text_block = true;
                self.text.text_matrix = IDENTITY;
                self.text.line_matrix = IDENTITY;
            }
            "ET" => {
                self.in_text_block = false;
            }
            "Tf" => {
                if op.operands.len() < 2 {
                    return Err(self.shape_error(op, "expected font name and size"));
                }
                if let Ok(name) = op.operands[0].as_name() {
                    self.text.font = String::from_utf8_lossy(name).to_string();
                }
                self.text.font_size = get_number(&op.operands[1])
                    .ok_or_else(|| self.shape_error(op, "font size is not a number"))?;
            }
            "Tc" => self.text.char_spacing = self.numbers(op, 1)?[0],
            "Tw" => self.text.word_spacing = self.numbers(op, 1)?[0],
            "Tz" => self.text.h_scaling = self.numbers(op, 1)?[0] / 100.0,
            "TL" => self.text.leading = Some(self.numbers(op, 1)?[0]),
            "Ts" => self.text.rise = self.numbers(op, 1)?[0],
            "Td" => {
                let t = self.numbers(op, 2)?;
                self.text.move_line(t[0], t[1]);
            }
            "TD" => {
                let t = self.numbers(op, 2)?;
                self.text.leading = Some(-t[1]);
                self.text.move_line(t[0], t[1]);
            }
            "Tm" => {
                let m = self.numbers(op, 6)?;
                self.text.text_matrix = [m[0], m[1], m[2], m[3], m[4], m[5]];
                self.text.line_matrix = self.text.text_matrix;
            }
            "T*" => self.text.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    self.show_bytes(bytes);
                }
            }
            "TJ" => {
                if let Some(Ok(array)) = op.operands.first().map(Object::as_array) {
                    for element in array {
                        match element {
                            Object::String(bytes, _) => self.show_bytes(bytes),
                            other => {
                                if let Some(adjust) = get_number(other) {
                                    let tx = -adjust / 1000.0
                                        * self.text.font_size
                                        * self.text.h_scaling;
                                    self.text.advance(tx);
                                }
                            }
                        }
                    }
                }
            }
            "'" => {
                self.text.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    self.show_bytes(bytes);
                }
            }
            "\"" => {
                let spacing = self.numbers(op, 2)?;
                self.text.word_spacing = spacing[0];
                self.text.char_spacing = spacing[1];
                self.text.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    self.show_bytes(bytes);
                }
            }
            "Do" => {
                if let Some(Ok(name)) = op.operands.first().map(Object::as_name) {
                    self.draw_xobject(name)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Interpret a form XObject in place; images and other XObjects draw no text
    fn draw_xobject(&mut self, name: &[u8]) -> Result<(), SegmentError> {
        let doc = self.doc;
        let Some(&id) = self.scope.xobjects.get(name) else {
            log::debug!(
                "page {}: XObject /{} not in resources",
                self.index,
                String::from_utf8_lossy(name)
            );
            return Ok(());
        };
        let Ok(stream) = doc.get_object(id).and_then(Object::as_stream) else {
            return Ok(());
        };
        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|subtype| subtype == b"Form")
            .unwrap_or(false);
        if !is_form {
            return Ok(());
        }
        if self.forms.contains(&id) || self.forms.len() >= MAX_FORM_DEPTH {
            log::warn!(
                "page {}: skipping form /{} (nested too deep or recursive)",
                self.index,
                String::from_utf8_lossy(name)
            );
            return Ok(());
        }

        let data = if stream.dict.has(b"Filter") {
            stream.decompressed_content()?
        } else {
            stream.content.clone()
        };
        let content = Content::decode(&data)?;

        let matrix = match stream.dict.get(b"Matrix") {
            Ok(obj) => {
                let values: Vec<f32> = resolve(doc, obj)
                    .as_array()
                    .map(|values| values.iter().filter_map(get_number).collect())
                    .unwrap_or_default();
                if values.len() != 6 {
                    return Err(SegmentError::DataShape {
                        page: self.index,
                        reason: format!(
                            "form /{} Matrix must hold six numbers",
                            String::from_utf8_lossy(name)
                        ),
                    });
                }
                [values[0], values[1], values[2], values[3], values[4], values[5]]
            }
            Err(_) => IDENTITY,
        };

        let resources = stream.dict.get(b"Resources").ok();
        let scope = match resources.and_then(|obj| as_dict(doc, obj)) {
            Some(resources) => self.scope.with_resources(doc, resources),
            None => self.scope.clone(),
        };

        // Do saves and restores the whole graphics state around the form
        let outer_scope = std::mem::replace(&mut self.scope, scope);
        let outer_ctm = self.ctm;
        let outer_depth = self.ctm_stack.len();
        let outer_text = self.text.clone();
        let outer_in_text = self.in_text_block;

        self.forms.push(id);
        self.ctm = multiply_matrices(&matrix, &self.ctm);
        self.in_text_block = false;

        let result = content.operations.iter().try_for_each(|op| self.apply(op));

        self.forms.pop();
        self.scope = outer_scope;
        self.ctm = outer_ctm;
        self.ctm_stack.truncate(outer_depth);
        self.text = outer_text;
        self.in_text_block = outer_in_text;

        result
    }

    /// Read the first `count` operands as numbers
    fn numbers(&self, op: &Operation, count: usize) -> Result<Vec<f32>, SegmentError> {
        if op.operands.len() < count {
            return Err(self.shape_error(op, &format!("expected {} operands", count)));
        }
        op.operands
            .iter()
            .take(count)
            .map(|operand| {
                get_number(operand)
                    .ok_or_else(|| self.shape_error(op, "operand is not a number"))
            })
            .collect()
    }

    fn shape_error(&self, op: &Operation, reason: &str) -> SegmentError {
        SegmentError::DataShape {
            page: self.index,
            reason: format!("{} operator: {}", op.operator, reason),
        }
    }

    /// Emit one character per glyph code and advance the text matrix
    fn show_bytes(&mut self, bytes: &[u8]) {
        if !self.in_text_block {
            return;
        }

        let metrics = self
            .scope
            .metrics
            .get(self.text.font.as_bytes())
            .cloned()
            .unwrap_or_default();
        let code_len = if metrics.two_byte { 2 } else { 1 };

        for code_bytes in bytes.chunks(code_len) {
            let code = code_bytes
                .iter()
                .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
            let text = self.decode(code_bytes);
            let w0 = metrics.width(code) / 1000.0;

            let state = &self.text;
            let font_matrix = [
                state.font_size * state.h_scaling,
                0.0,
                0.0,
                state.font_size,
                0.0,
                state.rise,
            ];
            let trm = multiply_matrices(
                &multiply_matrices(&font_matrix, &state.text_matrix),
                &self.ctm,
            );

            let ascent = metrics.ascent / 1000.0;
            let descent = metrics.descent / 1000.0;
            let corners = [
                transform_point(&trm, 0.0, descent),
                transform_point(&trm, w0, descent),
                transform_point(&trm, w0, ascent),
                transform_point(&trm, 0.0, ascent),
            ];
            let min_x = corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
            let max_x = corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
            let min_y = corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
            let max_y = corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

            let rendered_size = effective_font_size(state.font_size, &state.text_matrix, &self.ctm);

            self.chars.push(CharPosition {
                text,
                x0: min_x - self.media_box.llx,
                x1: max_x - self.media_box.llx,
                top: self.media_box.ury - max_y,
                bottom: self.media_box.ury - min_y,
                size: rendered_size,
            });

            let word_spacing = if code_len == 1 && code == 32 {
                state.word_spacing
            } else {
                0.0
            };
            let tx = (w0 * state.font_size + state.char_spacing + word_spacing) * state.h_scaling;
            self.text.advance(tx);
        }
    }

    /// Decode a glyph code with the current font's encoding
    fn decode(&self, code_bytes: &[u8]) -> String {
        if let Some(font_dict) = self.scope.fonts.get(self.text.font.as_bytes()) {
            if let Ok(encoding) = font_dict.get_font_encoding(self.doc) {
                if let Ok(text) = Document::decode_text(&encoding, code_bytes) {
                    return text;
                }
            }
        }

        if code_bytes.len() == 2 {
            let unit = u16::from_be_bytes([code_bytes[0], code_bytes[1]]);
            return String::from_utf16_lossy(&[unit]);
        }

        // Latin-1 fallback
        code_bytes.iter().map(|&b| b as char).collect()
    }
}

/// Follow a single indirect reference
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Resolve `obj` to a dictionary, inline or by reference
fn as_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj).as_dict().ok()
}

/// Helper to get f32 from Object
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Compute effective font size from base size, text matrix and CTM
fn effective_font_size(base_size: f32, text_matrix: &[f32; 6], ctm: &[f32; 6]) -> f32 {
    let m = multiply_matrices(text_matrix, ctm);
    let scale_x = (m[0].powi(2) + m[1].powi(2)).sqrt();
    let scale_y = (m[2].powi(2) + m[3].powi(2)).sqrt();
    base_size * scale_x.max(scale_y)
}
