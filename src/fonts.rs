//! Font resources for text extraction
//!
//! This module resolves what the extractor needs from a page's font
//! dictionaries: ToUnicode CMaps for code-to-text decoding and glyph
//! advance widths for sizing text items.

use lopdf::{Dictionary, Document, Object};
use std::collections::{BTreeMap, HashMap};

/// Glyph width used when a font carries no width information, in
/// thousandths of an em.
pub const DEFAULT_GLYPH_WIDTH: f32 = 500.0;

/// A parsed ToUnicode CMap mapping character codes to Unicode strings
#[derive(Debug, Default, Clone)]
pub struct ToUnicodeCMap {
    /// Direct mappings from `bfchar` sections and array-form `bfrange` entries
    pub char_map: HashMap<u32, String>,
    /// Incrementing range mappings: (start_code, end_code, base_codepoint)
    pub ranges: Vec<(u32, u32, u32)>,
}

impl ToUnicodeCMap {
    /// Parse a ToUnicode CMap from its decompressed content
    pub fn parse(content: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(content);
        let mut cmap = ToUnicodeCMap::default();

        for section in sections(&text, "beginbfchar", "endbfchar") {
            let tokens = tokenize(section);
            for pair in tokens.chunks_exact(2) {
                if let (Token::Hex(src), Token::Hex(dst)) = (&pair[0], &pair[1]) {
                    if let (Some(code), Some(unicode)) = (parse_hex(src), utf16_hex_to_string(dst)) {
                        cmap.char_map.insert(code, unicode);
                    }
                }
            }
        }

        for section in sections(&text, "beginbfrange", "endbfrange") {
            cmap.parse_bfrange_section(section);
        }

        if cmap.char_map.is_empty() && cmap.ranges.is_empty() {
            None
        } else {
            Some(cmap)
        }
    }

    /// Parse `<start> <end> <base>` and `<start> <end> [<dst> ...]` entries
    fn parse_bfrange_section(&mut self, section: &str) {
        let tokens = tokenize(section);
        let mut i = 0;
        while i + 2 < tokens.len() {
            let (Token::Hex(start), Token::Hex(end)) = (&tokens[i], &tokens[i + 1]) else {
                i += 1;
                continue;
            };
            let (Some(start), Some(end)) = (parse_hex(start), parse_hex(end)) else {
                i += 3;
                continue;
            };
            match &tokens[i + 2] {
                Token::Hex(base) => {
                    if let Some(base) = parse_hex(base) {
                        self.ranges.push((start, end, base));
                    }
                    i += 3;
                }
                Token::Array(items) => {
                    for (offset, dst) in items.iter().enumerate() {
                        let code = start + offset as u32;
                        if code > end {
                            break;
                        }
                        if let Some(unicode) = utf16_hex_to_string(dst) {
                            self.char_map.insert(code, unicode);
                        }
                    }
                    i += 3;
                }
            }
        }
    }

    /// Look up a character code
    pub fn lookup(&self, code: u32) -> Option<String> {
        if let Some(s) = self.char_map.get(&code) {
            return Some(s.clone());
        }

        self.ranges
            .iter()
            .find(|&&(start, end, _)| code >= start && code <= end)
            .and_then(|&(start, _, base)| char::from_u32(base + (code - start)))
            .map(|c| c.to_string())
    }

    /// Decode a show-text operand using fixed-width codes of `code_len` bytes
    pub fn decode(&self, bytes: &[u8], code_len: usize) -> String {
        let mut result = String::new();
        for code in split_codes(bytes, code_len) {
            match self.lookup(code) {
                Some(s) => result.push_str(&s),
                None => {
                    if let Some(c) = char::from_u32(code) {
                        result.push(c);
                    }
                }
            }
        }
        result
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Hex(&'a str),
    Array(Vec<&'a str>),
}

/// Yield the bodies between each `begin` / `end` keyword pair
fn sections<'a>(text: &'a str, begin: &'a str, end: &'a str) -> impl Iterator<Item = &'a str> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        let start = pos + text[pos..].find(begin)? + begin.len();
        let stop = start + text[start..].find(end)?;
        pos = stop + end.len();
        Some(&text[start..stop])
    })
}

/// Split a CMap section into `<hex>` strings and `[<hex> ...]` arrays
fn tokenize(section: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut array: Option<Vec<&str>> = None;
    let mut rest = section;

    while let Some(idx) = rest.find(['<', '[', ']']) {
        match rest.as_bytes()[idx] {
            b'[' => {
                array = Some(Vec::new());
                rest = &rest[idx + 1..];
            }
            b']' => {
                if let Some(items) = array.take() {
                    tokens.push(Token::Array(items));
                }
                rest = &rest[idx + 1..];
            }
            _ => {
                let body = &rest[idx + 1..];
                let Some(close) = body.find('>') else { break };
                let hex = body[..close].trim();
                match array.as_mut() {
                    Some(items) => items.push(hex),
                    None => tokens.push(Token::Hex(hex)),
                }
                rest = &body[close + 1..];
            }
        }
    }

    tokens
}

fn parse_hex(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex.trim(), 16).ok()
}

/// Decode a UTF-16BE hex string such as `00660069` or a surrogate pair
fn utf16_hex_to_string(hex: &str) -> Option<String> {
    let hex: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    let units: Vec<u16> = hex
        .as_bytes()
        .chunks(4)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .filter_map(|chunk| u16::from_str_radix(chunk, 16).ok())
        .collect();
    let decoded = String::from_utf16_lossy(&units);
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}

/// Split operand bytes into big-endian character codes
pub fn split_codes(bytes: &[u8], code_len: usize) -> impl Iterator<Item = u32> + '_ {
    bytes
        .chunks(code_len.max(1))
        .filter(move |chunk| chunk.len() == code_len.max(1))
        .map(|chunk| chunk.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

/// Glyph advance widths in thousandths of an em
#[derive(Debug, Clone)]
pub enum WidthTable {
    /// `/FirstChar` + `/Widths` of a simple font
    Simple {
        first_char: u32,
        widths: Vec<f32>,
        missing: f32,
    },
    /// `/W` ranges + `/DW` of a CIDFont
    Composite {
        ranges: Vec<(u32, u32, f32)>,
        default: f32,
    },
    /// No usable width data
    Unknown,
}

impl WidthTable {
    pub fn width(&self, code: u32) -> f32 {
        match self {
            WidthTable::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|idx| widths.get(idx as usize))
                .copied()
                .unwrap_or(*missing),
            WidthTable::Composite { ranges, default } => ranges
                .iter()
                .find(|&&(first, last, _)| code >= first && code <= last)
                .map(|&(_, _, w)| w)
                .unwrap_or(*default),
            WidthTable::Unknown => DEFAULT_GLYPH_WIDTH,
        }
    }
}

/// What the extractor needs from one font resource
#[derive(Debug, Clone)]
pub struct FontResource {
    /// Type0 fonts use two-byte codes
    pub composite: bool,
    pub cmap: Option<ToUnicodeCMap>,
    pub widths: WidthTable,
}

impl FontResource {
    /// Build from a font dictionary
    pub fn from_dict(doc: &Document, dict: &Dictionary) -> Self {
        let composite = matches!(dict.get(b"Subtype").and_then(|s| s.as_name()), Ok(b"Type0"));

        let cmap = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_stream().ok())
            .and_then(|stream| {
                let content = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                ToUnicodeCMap::parse(&content)
            });

        let widths = if composite {
            descendant_font(doc, dict)
                .map(|cid_font| composite_widths(doc, cid_font))
                .unwrap_or(WidthTable::Unknown)
        } else {
            simple_widths(doc, dict)
        };

        FontResource {
            composite,
            cmap,
            widths,
        }
    }

    pub fn code_len(&self) -> usize {
        if self.composite {
            2
        } else {
            1
        }
    }
}

/// Font dictionary + derived resource, keyed by resource name (e.g. `F1`)
pub struct PageFonts<'a> {
    fonts: BTreeMap<Vec<u8>, (&'a Dictionary, FontResource)>,
}

impl<'a> PageFonts<'a> {
    pub fn load(doc: &'a Document, fonts: BTreeMap<Vec<u8>, &'a Dictionary>) -> Self {
        let fonts = fonts
            .into_iter()
            .map(|(name, dict)| {
                let resource = FontResource::from_dict(doc, dict);
                (name, (dict, resource))
            })
            .collect();
        PageFonts { fonts }
    }

    pub fn get(&self, name: &[u8]) -> Option<(&'a Dictionary, &FontResource)> {
        self.fonts.get(name).map(|(dict, res)| (*dict, res))
    }
}

/// Follow a reference to the object it points at
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Read a number from an Object
pub fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn descendant_font<'a>(doc: &'a Document, dict: &'a Dictionary) -> Option<&'a Dictionary> {
    let descendants = resolve(doc, dict.get(b"DescendantFonts").ok()?).as_array().ok()?;
    resolve(doc, descendants.first()?).as_dict().ok()
}

fn simple_widths(doc: &Document, dict: &Dictionary) -> WidthTable {
    let first_char = dict
        .get(b"FirstChar")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_i64().ok());
    let widths = dict
        .get(b"Widths")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_array().ok());

    match (first_char, widths) {
        (Some(first_char), Some(widths)) if first_char >= 0 => {
            let missing = dict
                .get(b"FontDescriptor")
                .ok()
                .and_then(|obj| resolve(doc, obj).as_dict().ok())
                .and_then(|desc| desc.get(b"MissingWidth").ok())
                .and_then(|obj| get_number(resolve(doc, obj)))
                .unwrap_or(DEFAULT_GLYPH_WIDTH);
            WidthTable::Simple {
                first_char: first_char as u32,
                widths: widths
                    .iter()
                    .map(|w| get_number(resolve(doc, w)).unwrap_or(missing))
                    .collect(),
                missing,
            }
        }
        _ => WidthTable::Unknown,
    }
}

fn composite_widths(doc: &Document, cid_font: &Dictionary) -> WidthTable {
    let default = cid_font
        .get(b"DW")
        .ok()
        .and_then(|obj| get_number(resolve(doc, obj)))
        .unwrap_or(1000.0);

    let mut ranges = Vec::new();
    if let Some(w) = cid_font
        .get(b"W")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_array().ok())
    {
        // Entries are either `c [w1 w2 ...]` or `c_first c_last w`
        let mut i = 0;
        while i < w.len() {
            let Some(first) = get_number(resolve(doc, &w[i])) else {
                i += 1;
                continue;
            };
            let first = first as u32;
            match w.get(i + 1).map(|obj| resolve(doc, obj)) {
                Some(Object::Array(list)) => {
                    for (offset, width) in list.iter().enumerate() {
                        if let Some(width) = get_number(resolve(doc, width)) {
                            let code = first + offset as u32;
                            ranges.push((code, code, width));
                        }
                    }
                    i += 2;
                }
                Some(last) => {
                    let last = get_number(last).map(|l| l as u32);
                    let width = w.get(i + 2).and_then(|obj| get_number(resolve(doc, obj)));
                    if let (Some(last), Some(width)) = (last, width) {
                        ranges.push((first, last, width));
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    WidthTable::Composite { ranges, default }
}
