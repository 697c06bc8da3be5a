//! Text block extraction from PDF using lopdf
//!
//! This module interprets page content streams into positioned text items,
//! groups them into lines and lines into blocks, and reports every page's
//! geometry alongside its blocks.

use crate::fonts::{get_number, resolve, split_codes, FontResource, PageFonts};
use crate::PdfError;
use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fraction of the font size above the baseline covered by glyphs
const ASCENT: f32 = 0.8;
/// Fraction of the font size below the baseline covered by glyphs
const DESCENT: f32 = 0.2;
/// Page size used when no MediaBox can be found (US Letter)
const DEFAULT_PAGE_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];
/// TJ adjustments beyond this many thousandths of an em read as a word break
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// A text item with position information
#[derive(Debug, Clone)]
pub struct TextItem {
    /// The text content
    pub text: String,
    /// X position of the start of the baseline, relative to the visible page origin
    pub x: f32,
    /// Y position of the baseline (PDF coordinates, origin at bottom-left)
    pub y: f32,
    /// Advance width of the shown text
    pub width: f32,
    /// Rendered font size
    pub font_size: f32,
    /// Page number (1-indexed)
    pub page: u32,
}

/// A line of text (grouped text items)
#[derive(Debug, Clone)]
pub struct TextLine {
    pub items: Vec<TextItem>,
    pub y: f32,
    pub page: u32,
}

impl TextLine {
    /// Join items, inserting a space only where the gap between them is
    /// wider than `space_ratio` of the font size
    pub fn text_with_spacing(&self, space_ratio: f32) -> String {
        let mut text = String::new();
        let mut prev_end: Option<f32> = None;
        for item in &self.items {
            if let Some(end) = prev_end {
                let gap = item.x - end;
                let needs_space = gap > item.font_size * space_ratio
                    && !text.ends_with(' ')
                    && !item.text.starts_with(' ');
                if needs_space {
                    text.push(' ');
                }
            }
            text.push_str(&item.text);
            prev_end = Some(item.x + item.width);
        }
        text
    }

    pub fn x_min(&self) -> f32 {
        self.items.iter().map(|i| i.x).fold(f32::INFINITY, f32::min)
    }

    pub fn x_max(&self) -> f32 {
        self.items
            .iter()
            .map(|i| i.x + i.width)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn font_size(&self) -> f32 {
        self.items.iter().map(|i| i.font_size).fold(0.0, f32::max)
    }
}

/// Axis-aligned rectangle in top-left-origin page space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// A block of text lines with its enclosing rectangle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub rect: Rect,
    /// Lines joined with `'\n'`
    pub text: String,
}

/// Page dimensions used to clamp highlight boxes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

/// One page of extracted blocks, in content stream order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub geometry: PageGeometry,
    pub blocks: Vec<TextBlock>,
}

/// Options for grouping items into lines and blocks
#[derive(Debug, Clone)]
pub struct BlockConfig {
    /// Baselines closer than this (in points) belong to the same line
    pub line_tolerance: f32,
    /// Maximum baseline distance between consecutive lines of one block,
    /// as a multiple of the font size
    pub max_line_gap: f32,
    /// Horizontal gap, as a fraction of the font size, that separates words
    pub space_ratio: f32,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            line_tolerance: 3.0,
            max_line_gap: 1.6,
            space_ratio: 0.15,
        }
    }
}

/// Extract pages of text blocks from a PDF file
pub fn extract_pages<P: AsRef<Path>>(path: P) -> Result<Vec<Page>, PdfError> {
    let buffer = std::fs::read(path)?;
    extract_pages_mem(&buffer)
}

/// Extract pages of text blocks from a memory buffer
pub fn extract_pages_mem(buffer: &[u8]) -> Result<Vec<Page>, PdfError> {
    extract_pages_mem_with_config(buffer, &BlockConfig::default())
}

/// Extract pages of text blocks from a memory buffer with custom grouping
pub fn extract_pages_mem_with_config(
    buffer: &[u8],
    config: &BlockConfig,
) -> Result<Vec<Page>, PdfError> {
    let doc = Document::load_mem(buffer)?;
    Ok(extract_pages_from_doc(&doc, config))
}

/// Extract every page of a loaded document
fn extract_pages_from_doc(doc: &Document, config: &BlockConfig) -> Vec<Page> {
    doc.get_pages()
        .into_iter()
        .map(|(page_num, page_id)| {
            let page_box = visible_page_box(doc, page_id);
            let geometry = PageGeometry {
                width: page_box[2] - page_box[0],
                height: page_box[3] - page_box[1],
            };

            let items = match extract_page_text_items(doc, page_id, page_num, &page_box) {
                Ok(items) => items,
                Err(e) => {
                    log::warn!("page {}: skipping unreadable content: {}", page_num, e);
                    Vec::new()
                }
            };

            let lines = group_into_lines(items, config);
            let blocks = group_into_blocks(&lines, geometry, config);
            log::debug!(
                "page {}: {}x{} with {} lines in {} blocks",
                page_num,
                geometry.width,
                geometry.height,
                lines.len(),
                blocks.len()
            );

            Page { geometry, blocks }
        })
        .collect()
}

/// The region a viewer shows: the CropBox clipped to the MediaBox
///
/// Falls back to the MediaBox when there is no CropBox or the two do not
/// overlap.
fn visible_page_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let media_box = inherited_box(doc, page_id, b"MediaBox").unwrap_or(DEFAULT_PAGE_BOX);
    inherited_box(doc, page_id, b"CropBox")
        .and_then(|crop_box| intersect_boxes(&crop_box, &media_box))
        .unwrap_or(media_box)
}

/// Look up a page box, walking up the page tree for inherited values
fn inherited_box(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<[f32; 4]> {
    let mut node = doc.get_dictionary(page_id).ok();
    // Bounded walk in case of a cyclic Parent chain
    for _ in 0..32 {
        let dict = node?;
        if let Some(page_box) = dict
            .get(key)
            .ok()
            .and_then(|obj| resolve(doc, obj).as_array().ok())
            .and_then(|arr| parse_box(doc, arr))
        {
            return Some(page_box);
        }
        node = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    None
}

fn intersect_boxes(a: &[f32; 4], b: &[f32; 4]) -> Option<[f32; 4]> {
    let clipped = [a[0].max(b[0]), a[1].max(b[1]), a[2].min(b[2]), a[3].min(b[3])];
    (clipped[0] < clipped[2] && clipped[1] < clipped[3]).then_some(clipped)
}

fn parse_box(doc: &Document, arr: &[Object]) -> Option<[f32; 4]> {
    if arr.len() != 4 {
        return None;
    }
    let mut values = [0.0f32; 4];
    for (slot, obj) in values.iter_mut().zip(arr) {
        *slot = get_number(resolve(doc, obj))?;
    }
    Some([
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    ])
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

fn translate(m: &[f32; 6], tx: f32, ty: f32) -> [f32; 6] {
    multiply_matrices(&[1.0, 0.0, 0.0, 1.0, tx, ty], m)
}

/// Graphics state saved and restored by q/Q, including text state parameters
#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: [f32; 6],
    font: Vec<u8>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: Option<f32>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            font: Vec::new(),
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: None,
        }
    }
}

impl GraphicsState {
    fn line_advance(&self) -> f32 {
        // Approximate line height when TL was never set
        self.leading.unwrap_or(self.font_size * 1.2)
    }
}

/// Interpreter state for one page's content stream
struct PageReader<'a> {
    doc: &'a Document,
    fonts: PageFonts<'a>,
    gs: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    in_text_block: bool,
    page_num: u32,
    origin: (f32, f32),
    items: Vec<TextItem>,
}

impl<'a> PageReader<'a> {
    fn new_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = translate(&self.line_matrix, tx, ty);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.gs.line_advance();
        self.new_line(0.0, -leading);
    }

    /// Decode one string operand and compute its advance in text space
    fn decode_string(&self, bytes: &[u8]) -> (String, f32) {
        let font = self.fonts.get(&self.gs.font);
        let text = decode_text_operand(self.doc, font, bytes);

        let (code_len, resource) = match font {
            Some((_, res)) => (res.code_len(), Some(res)),
            None => (1, None),
        };
        let gs = &self.gs;
        let advance: f32 = split_codes(bytes, code_len)
            .map(|code| {
                let glyph = resource
                    .map(|r| r.widths.width(code))
                    .unwrap_or(crate::fonts::DEFAULT_GLYPH_WIDTH);
                let mut w = glyph / 1000.0 * gs.font_size + gs.char_spacing;
                if code_len == 1 && code == 32 {
                    w += gs.word_spacing;
                }
                w
            })
            .sum();

        (text, advance * gs.horizontal_scale)
    }

    /// Emit a text item at the current text position and advance past it
    fn push_item(&mut self, text: String, advance: f32) {
        let start = multiply_matrices(&self.text_matrix, &self.gs.ctm);
        self.text_matrix = translate(&self.text_matrix, advance, 0.0);

        if text.trim().is_empty() {
            return;
        }

        let scale_x = (start[0].powi(2) + start[1].powi(2)).sqrt();
        let font_size = effective_font_size(self.gs.font_size, &start);
        self.items.push(TextItem {
            text,
            x: start[4] - self.origin.0,
            y: start[5] - self.origin.1,
            width: advance * scale_x,
            font_size,
            page: self.page_num,
        });
    }

    fn show_text(&mut self, operand: &Object) {
        if let Object::String(bytes, _) = operand {
            let (text, advance) = self.decode_string(bytes);
            self.push_item(text, advance);
        }
    }

    fn show_positioned_text(&mut self, array: &[Object]) {
        let mut combined = String::new();
        let mut advance = 0.0;
        for element in array {
            match element {
                Object::String(bytes, _) => {
                    let (text, width) = self.decode_string(bytes);
                    combined.push_str(&text);
                    advance += width;
                }
                other => {
                    if let Some(adjust) = get_number(other) {
                        if adjust < -TJ_SPACE_THRESHOLD && !combined.ends_with(' ') {
                            combined.push(' ');
                        }
                        advance -= adjust / 1000.0 * self.gs.font_size * self.gs.horizontal_scale;
                    }
                }
            }
        }
        self.push_item(combined, advance);
    }
}

/// Extract text items from a single page
fn extract_page_text_items(
    doc: &Document,
    page_id: ObjectId,
    page_num: u32,
    page_box: &[f32; 4],
) -> Result<Vec<TextItem>, PdfError> {
    use lopdf::content::Content;

    let fonts = PageFonts::load(doc, doc.get_page_fonts(page_id).unwrap_or_default());

    let content_data = doc
        .get_page_content(page_id)
        .map_err(|e| PdfError::Parse(e.to_string()))?;

    let content = Content::decode(&content_data).map_err(|e| PdfError::Parse(e.to_string()))?;

    let identity = [1.0f32, 0.0, 0.0, 1.0, 0.0, 0.0];
    let mut reader = PageReader {
        doc,
        fonts,
        gs: GraphicsState::default(),
        stack: Vec::new(),
        text_matrix: identity,
        line_matrix: identity,
        in_text_block: false,
        page_num,
        origin: (page_box[0], page_box[1]),
        items: Vec::new(),
    };

    for op in &content.operations {
        let operands = &op.operands;
        let num = |i: usize| operands.get(i).and_then(get_number);

        match op.operator.as_str() {
            "q" => reader.stack.push(reader.gs.clone()),
            "Q" => {
                if let Some(saved) = reader.stack.pop() {
                    reader.gs = saved;
                }
            }
            "cm" => {
                if operands.len() >= 6 {
                    let m = [
                        num(0).unwrap_or(1.0),
                        num(1).unwrap_or(0.0),
                        num(2).unwrap_or(0.0),
                        num(3).unwrap_or(1.0),
                        num(4).unwrap_or(0.0),
                        num(5).unwrap_or(0.0),
                    ];
                    reader.gs.ctm = multiply_matrices(&m, &reader.gs.ctm);
                }
            }
            "BT" => {
                reader.in_text_block = true;
                reader.text_matrix = identity;
                reader.line_matrix = identity;
            }
            "ET" => reader.in_text_block = false,
            "Tf" => {
                if let Some(Ok(name)) = operands.first().map(Object::as_name) {
                    reader.gs.font = name.to_vec();
                }
                if let Some(size) = num(1) {
                    reader.gs.font_size = size;
                }
            }
            "Tc" => reader.gs.char_spacing = num(0).unwrap_or(0.0),
            "Tw" => reader.gs.word_spacing = num(0).unwrap_or(0.0),
            "Tz" => reader.gs.horizontal_scale = num(0).unwrap_or(100.0) / 100.0,
            "TL" => reader.gs.leading = num(0),
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    if op.operator == "TD" {
                        reader.gs.leading = Some(-ty);
                    }
                    reader.new_line(tx, ty);
                }
            }
            "Tm" => {
                if operands.len() >= 6 {
                    for (i, slot) in reader.text_matrix.iter_mut().enumerate() {
                        *slot = num(i).unwrap_or(if i == 0 || i == 3 { 1.0 } else { 0.0 });
                    }
                    reader.line_matrix = reader.text_matrix;
                }
            }
            "T*" => reader.next_line(),
            "Tj" if reader.in_text_block => {
                if let Some(operand) = operands.first() {
                    reader.show_text(operand);
                }
            }
            "TJ" if reader.in_text_block => {
                if let Some(Ok(array)) = operands.first().map(Object::as_array) {
                    reader.show_positioned_text(array);
                }
            }
            "'" if reader.in_text_block => {
                reader.next_line();
                if let Some(operand) = operands.first() {
                    reader.show_text(operand);
                }
            }
            "\"" if reader.in_text_block => {
                if operands.len() >= 3 {
                    reader.gs.word_spacing = num(0).unwrap_or(0.0);
                    reader.gs.char_spacing = num(1).unwrap_or(0.0);
                    reader.next_line();
                    reader.show_text(&operands[2]);
                }
            }
            _ => {}
        }
    }

    Ok(reader.items)
}

/// Compute effective font size from base size and the text rendering matrix
fn effective_font_size(base_size: f32, matrix: &[f32; 6]) -> f32 {
    let scale_x = (matrix[0].powi(2) + matrix[1].powi(2)).sqrt();
    let scale_y = (matrix[2].powi(2) + matrix[3].powi(2)).sqrt();
    base_size * scale_x.max(scale_y)
}

/// Decode a string operand: ToUnicode CMap first, then the font encoding,
/// then UTF-16BE with BOM, then Latin-1
fn decode_text_operand(
    doc: &Document,
    font: Option<(&lopdf::Dictionary, &FontResource)>,
    bytes: &[u8],
) -> String {
    if let Some((font_dict, resource)) = font {
        if let Some(cmap) = &resource.cmap {
            return cmap.decode(bytes, resource.code_len());
        }
        if let Ok(encoding) = font_dict.get_font_encoding(doc) {
            if let Ok(text) = Document::decode_text(&encoding, bytes) {
                return text;
            }
        }
    }

    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    bytes.iter().map(|&b| b as char).collect()
}

/// Group items into lines, preserving content stream order
///
/// Only consecutive items on the same baseline are merged; items within a
/// line are then ordered left to right.
pub fn group_into_lines(items: Vec<TextItem>, config: &BlockConfig) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();

    for item in items {
        // Only the most recent line is a merge candidate, to keep stream order
        let should_merge = lines.last().is_some_and(|last| {
            last.page == item.page && (last.y - item.y).abs() < config.line_tolerance
        });

        if should_merge {
            if let Some(last) = lines.last_mut() {
                last.items.push(item);
                continue;
            }
        }

        let (y, page) = (item.y, item.page);
        lines.push(TextLine {
            items: vec![item],
            y,
            page,
        });
    }

    for line in &mut lines {
        line.items
            .sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
    }

    lines
}

/// Group consecutive lines into blocks and convert them to top-left-origin
/// rectangles on a page of the given geometry
pub fn group_into_blocks(
    lines: &[TextLine],
    geometry: PageGeometry,
    config: &BlockConfig,
) -> Vec<TextBlock> {
    let mut groups: Vec<Vec<&TextLine>> = Vec::new();

    for line in lines {
        let joins_previous = groups.last().and_then(|g| g.last()).is_some_and(|prev| {
            let font_size = prev.font_size().max(line.font_size()).max(1.0);
            let drop = prev.y - line.y;
            let overlaps = line.x_min() <= prev.x_max() && line.x_max() >= prev.x_min();
            prev.page == line.page
                && drop > -config.line_tolerance
                && drop <= font_size * config.max_line_gap
                && overlaps
        });

        match groups.last_mut() {
            Some(group) if joins_previous => group.push(line),
            _ => groups.push(vec![line]),
        }
    }

    groups
        .into_iter()
        .map(|group| {
            let mut rect = Rect {
                x0: f32::INFINITY,
                y0: f32::INFINITY,
                x1: f32::NEG_INFINITY,
                y1: f32::NEG_INFINITY,
            };
            for line in &group {
                for item in &line.items {
                    let top = geometry.height - (item.y + item.font_size * ASCENT);
                    let bottom = geometry.height - (item.y - item.font_size * DESCENT);
                    rect.x0 = rect.x0.min(item.x);
                    rect.x1 = rect.x1.max(item.x + item.width);
                    rect.y0 = rect.y0.min(top);
                    rect.y1 = rect.y1.max(bottom);
                }
            }
            let text = group
                .iter()
                .map(|line| line.text_with_spacing(config.space_ratio))
                .collect::<Vec<_>>()
                .join("\n");
            TextBlock { rect, text }
        })
        .collect()
}
