//! Integration tests for pdf-locator

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdf_locator::extractor::{extract_pages_mem_with_config, BlockConfig};
use pdf_locator::{
    collate_answers_mem, extract_pages, extract_pages_mem, find_text_in_pdf, find_text_in_pdf_mem,
    find_text_in_pdf_mem_with_config, AnswerSheet, LocatorConfig, MatchResult, PdfError, Question,
    SelectionPolicy,
};
use std::io::Write;

// A line of text: (x, baseline y, font size, text)
type Line<'a> = (f32, f32, f32, &'a str);

fn show_line(ops: &mut Vec<Operation>, (x, y, size, text): Line) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(b"F1".to_vec()), Object::Real(size)],
    ));
    ops.push(Operation::new("Td", vec![Object::Real(x), Object::Real(y)]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(text)]));
    ops.push(Operation::new("ET", vec![]));
}

// One page: the object its /Contents points at, and an optional /CropBox
type RawPage = (Object, Option<[i64; 4]>);

fn int_array(values: [i64; 4]) -> Vec<Object> {
    values.iter().map(|&v| Object::Integer(v)).collect()
}

// Build a PDF from raw page contents, on a MediaBox set at the page tree root
fn build_pdf_from_raw(pages: Vec<RawPage>, media_box: [i64; 4]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for (contents, crop_box) in pages {
        let content_id = doc.add_object(contents);
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        };
        if let Some(crop_box) = crop_box {
            page.set("CropBox", int_array(crop_box));
        }
        let page_id = doc.add_object(page);
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "MediaBox" => int_array(media_box),
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

fn content_stream(operations: Vec<Operation>) -> Object {
    let content = Content { operations };
    Object::Stream(Stream::new(dictionary! {}, content.encode().unwrap()))
}

fn build_pdf_from_ops(pages: Vec<Vec<Operation>>, media_box: [i64; 4]) -> Vec<u8> {
    let pages = pages
        .into_iter()
        .map(|operations| (content_stream(operations), None))
        .collect();
    build_pdf_from_raw(pages, media_box)
}

fn build_pdf(pages: &[Vec<Line>]) -> Vec<u8> {
    let ops = pages
        .iter()
        .map(|lines| {
            let mut ops = Vec::new();
            for &line in lines {
                show_line(&mut ops, line);
            }
            ops
        })
        .collect();
    build_pdf_from_ops(ops, [0, 0, 612, 792])
}

// ============================================================================
// Extraction Tests
// ============================================================================

#[test]
fn test_extract_single_block() {
    let pdf = build_pdf(&[vec![(100.0, 700.0, 12.0, "the quick brown fox")]]);
    let pages = extract_pages_mem(&pdf).unwrap();

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].geometry.width, 612.0);
    assert_eq!(pages[0].geometry.height, 792.0);
    assert_eq!(pages[0].blocks.len(), 1);

    let block = &pages[0].blocks[0];
    assert_eq!(block.text, "the quick brown fox");
    assert!((block.rect.x0 - 100.0).abs() < 0.01);
    // 19 glyphs at half an em of 12pt
    assert!((block.rect.x1 - 214.0).abs() < 0.01);
    assert!((block.rect.y0 - 82.4).abs() < 0.01);
    assert!((block.rect.y1 - 94.4).abs() < 0.01);
    assert!(block.rect.x1 >= block.rect.x0 && block.rect.y1 >= block.rect.y0);
}

#[test]
fn test_extract_groups_paragraph_lines() {
    let pdf = build_pdf(&[vec![
        (72.0, 700.0, 12.0, "The Tenant shall pay the"),
        (72.0, 686.0, 12.0, "Rent on the first day of each month."),
        (72.0, 600.0, 12.0, "Parking is not included."),
    ]]);
    let pages = extract_pages_mem(&pdf).unwrap();

    assert_eq!(pages[0].blocks.len(), 2);
    assert_eq!(
        pages[0].blocks[0].text,
        "The Tenant shall pay the\nRent on the first day of each month."
    );
    assert_eq!(pages[0].blocks[1].text, "Parking is not included.");
}

#[test]
fn test_extract_preserves_page_and_block_order() {
    let pdf = build_pdf(&[
        vec![(72.0, 700.0, 12.0, "first"), (72.0, 500.0, 12.0, "second")],
        vec![],
        vec![(72.0, 700.0, 12.0, "third")],
    ]);
    let pages = extract_pages_mem(&pdf).unwrap();

    assert_eq!(pages.len(), 3);
    let texts: Vec<Vec<&str>> = pages
        .iter()
        .map(|p| p.blocks.iter().map(|b| b.text.as_str()).collect())
        .collect();
    assert_eq!(texts, vec![vec!["first", "second"], vec![], vec!["third"]]);
}

#[test]
fn test_extract_tj_kerning_word_breaks() {
    let ops = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
        Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
        Operation::new(
            "TJ",
            vec![Object::Array(vec![
                Object::string_literal("Hel"),
                Object::Integer(-20),
                Object::string_literal("lo"),
                Object::Integer(-400),
                Object::string_literal("world"),
            ])],
        ),
        Operation::new("ET", vec![]),
    ];
    let pdf = build_pdf_from_ops(vec![ops], [0, 0, 612, 792]);
    let pages = extract_pages_mem(&pdf).unwrap();

    assert_eq!(pages[0].blocks.len(), 1);
    assert_eq!(pages[0].blocks[0].text, "Hello world");
}

#[test]
fn test_extract_inherited_media_box() {
    let mut ops = Vec::new();
    show_line(&mut ops, (50.0, 300.0, 10.0, "small page"));
    let pdf = build_pdf_from_ops(vec![ops], [0, 0, 300, 400]);
    let pages = extract_pages_mem(&pdf).unwrap();

    assert_eq!(pages[0].geometry.width, 300.0);
    assert_eq!(pages[0].geometry.height, 400.0);
    assert!((pages[0].blocks[0].rect.y0 - 92.0).abs() < 0.01);
}

#[test]
fn test_extract_uses_crop_box() {
    let mut ops = Vec::new();
    show_line(&mut ops, (100.0, 700.0, 12.0, "cropped page"));
    let pdf = build_pdf_from_raw(
        vec![(content_stream(ops), Some([50, 50, 562, 742]))],
        [0, 0, 612, 792],
    );
    let pages = extract_pages_mem(&pdf).unwrap();

    assert_eq!(pages[0].geometry.width, 512.0);
    assert_eq!(pages[0].geometry.height, 692.0);
    // Baseline 650 above the crop origin, glyphs 9.6 above and 2.4 below it
    let rect = pages[0].blocks[0].rect;
    assert!((rect.x0 - 50.0).abs() < 0.01);
    assert!((rect.y0 - 32.4).abs() < 0.01);
    assert!((rect.y1 - 44.4).abs() < 0.01);

    let result = find_text_in_pdf_mem(&pdf, "cropped page").unwrap();
    assert!((result.coordinates.x0 - 30.0).abs() < 0.01);
    assert!((result.coordinates.y0 - 12.4).abs() < 0.01);
}

#[test]
fn test_unreadable_pages_are_skipped() {
    let mut ops = Vec::new();
    show_line(&mut ops, (72.0, 700.0, 12.0, "the deposit is held in escrow"));
    let pdf = build_pdf_from_raw(
        vec![
            // /Contents pointing at a plain dictionary instead of a stream
            (Object::Dictionary(dictionary! { "Type" => "Metadata" }), None),
            (
                Object::Stream(Stream::new(
                    dictionary! {},
                    b"BT /F1 12 Tf 72 700 Td (unterminated Tj ET".to_vec(),
                )),
                None,
            ),
            (content_stream(ops), None),
        ],
        [0, 0, 612, 792],
    );

    let pages = extract_pages_mem(&pdf).unwrap();
    assert_eq!(pages.len(), 3);
    assert!(pages[0].blocks.is_empty());
    assert!(pages[1].blocks.is_empty());
    assert_eq!(pages[2].blocks.len(), 1);

    let result = find_text_in_pdf_mem(&pdf, "deposit is held in escrow").unwrap();
    assert!(!result.is_fallback());
    assert_eq!(result.page, 3);
}

#[test]
fn test_extract_custom_block_config() {
    let pdf = build_pdf(&[vec![
        (72.0, 700.0, 12.0, "line one"),
        (72.0, 686.0, 12.0, "line two"),
    ]]);
    let config = BlockConfig {
        max_line_gap: 1.0,
        ..Default::default()
    };
    let pages = extract_pages_mem_with_config(&pdf, &config).unwrap();
    assert_eq!(pages[0].blocks.len(), 2);
}

// ============================================================================
// Locate Tests
// ============================================================================

#[test]
fn test_locate_quick_brown_fox() {
    let pdf = build_pdf(&[vec![(100.0, 700.0, 12.0, "the quick brown fox")]]);
    let result = find_text_in_pdf_mem(&pdf, "quick brown").unwrap();

    assert_eq!(result.page, 1);
    assert!(result.similarity >= 70.0);
    assert_eq!(result.matched_text, "the quick brown fox");
    assert!(!result.is_fallback());

    // Block [100, 82.4, 214, 94.4] padded by 20
    assert!((result.coordinates.x0 - 80.0).abs() < 0.01);
    assert!((result.coordinates.y0 - 62.4).abs() < 0.01);
    assert!((result.coordinates.width - 154.0).abs() < 0.01);
    assert!((result.coordinates.height - 52.0).abs() < 0.01);
}

#[test]
fn test_locate_is_case_insensitive() {
    let pdf = build_pdf(&[vec![(72.0, 700.0, 12.0, "The Lease Commences On 1st June 2024")]]);
    let result = find_text_in_pdf_mem(&pdf, "LEASE COMMENCES ON 1ST JUNE 2024").unwrap();
    assert_eq!(result.similarity, 100.0);
}

#[test]
fn test_locate_later_page_wins() {
    let pdf = build_pdf(&[
        vec![(72.0, 700.0, 12.0, "the rent is payable monthly")],
        vec![(72.0, 500.0, 12.0, "rent is payable monthly in advance")],
    ]);
    let result = find_text_in_pdf_mem(&pdf, "rent is payable monthly").unwrap();
    assert_eq!(result.page, 2);
    assert_eq!(result.matched_text, "rent is payable monthly in advance");
}

#[test]
fn test_locate_later_block_on_same_page_wins() {
    let pdf = build_pdf(&[vec![
        (72.0, 700.0, 12.0, "rent is payable monthly"),
        (72.0, 400.0, 12.0, "rent is payable monthy"),
    ]]);
    let result = find_text_in_pdf_mem(&pdf, "rent is payable monthly").unwrap();
    assert_eq!(result.matched_text, "rent is payable monthy");
    assert!(result.similarity < 100.0);

    let config = LocatorConfig {
        selection: SelectionPolicy::HighestScore,
        ..Default::default()
    };
    let result = find_text_in_pdf_mem_with_config(&pdf, "rent is payable monthly", &config).unwrap();
    assert_eq!(result.matched_text, "rent is payable monthly");
}

#[test]
fn test_locate_clamps_to_page_margin() {
    let pdf = build_pdf(&[vec![(5.0, 780.0, 12.0, "corner text at the very edge of the page")]]);
    let result = find_text_in_pdf_mem(&pdf, "corner text").unwrap();

    let c = result.coordinates;
    assert!(c.x0 >= 10.0);
    assert!(c.y0 >= 10.0);
    assert!(c.width >= 0.0 && c.height >= 0.0);
    assert!(c.x0 + c.width <= 612.0 - 10.0);
    assert!(c.y0 + c.height <= 792.0 - 10.0);
}

#[test]
fn test_locate_empty_document_returns_fallback() {
    let pdf = build_pdf(&[vec![]]);
    let result = find_text_in_pdf_mem(&pdf, "anything at all").unwrap();

    assert_eq!(result, MatchResult::fallback());
    assert_eq!(result.page, 2);
    assert_eq!(result.coordinates.x0, 50.0);
    assert_eq!(result.coordinates.y0, 100.0);
    assert_eq!(result.coordinates.width, 150.0);
    assert_eq!(result.coordinates.height, 50.0);
    assert_eq!(result.similarity, 85.0);
}

#[test]
fn test_locate_no_match_returns_fallback() {
    let pdf = build_pdf(&[vec![(72.0, 700.0, 12.0, "nothing relevant lives here")]]);
    let result = find_text_in_pdf_mem(&pdf, "termination clause of the agreement").unwrap();
    assert!(result.is_fallback());
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[test]
fn test_truncated_pdf_is_parse_error() {
    let pdf = build_pdf(&[vec![(72.0, 700.0, 12.0, "text")]]);
    let truncated = &pdf[..8];
    assert!(matches!(
        find_text_in_pdf_mem(truncated, "text"),
        Err(PdfError::Parse(_))
    ));
}

#[test]
fn test_garbage_bytes_are_parse_error() {
    assert!(matches!(
        find_text_in_pdf_mem(b"this is not a pdf", "text"),
        Err(PdfError::Parse(_))
    ));
    assert!(matches!(extract_pages_mem(b""), Err(PdfError::Parse(_))));
}

#[test]
fn test_nonexistent_file() {
    assert!(matches!(
        find_text_in_pdf("/nonexistent/file.pdf", "text"),
        Err(PdfError::Io(_))
    ));
    assert!(extract_pages("/nonexistent/file.pdf").is_err());
}

// ============================================================================
// File and Citation Tests
// ============================================================================

#[test]
fn test_find_text_in_pdf_file() {
    let pdf = build_pdf(&[vec![(100.0, 700.0, 12.0, "the quick brown fox")]]);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&pdf).unwrap();

    let result = find_text_in_pdf(file.path(), "quick brown").unwrap();
    assert_eq!(result.page, 1);
    assert_eq!(result, find_text_in_pdf_mem(&pdf, "quick brown").unwrap());
}

#[test]
fn test_collate_answers_from_pdf() {
    let pdf = build_pdf(&[
        vec![(72.0, 700.0, 12.0, "The term commences on 1st June 2024.")],
        vec![(72.0, 700.0, 12.0, "Monthly rent of 2500 dollars is payable in advance.")],
    ]);
    let questions = vec![
        Question::new("q_1", "What is the lease start date?"),
        Question::new("q_2", "What is the rent amount?"),
        Question::new("q_3", "What are the renewal options?"),
    ];
    let sheet = AnswerSheet::from_json(
        r#"{
            "q_1": {"answer": "1st June 2024", "line": "commences on 1st June 2024"},
            "q_2": {"answer": "2500 dollars", "line": "rent of 2500 dollars is payable"},
            "q_3": {"answer": "None stated", "line": "option to renew for five years"}
        }"#,
    )
    .unwrap();

    let cited = collate_answers_mem(&pdf, &questions, &sheet, &LocatorConfig::default()).unwrap();

    assert_eq!(cited.len(), 3);
    assert_eq!(cited[0].pdf_highlight.page, 1);
    assert_eq!(cited[1].pdf_highlight.page, 2);
    assert!(cited[2].pdf_highlight.is_fallback());
    assert_eq!(cited[2].question, "What are the renewal options?");
}

#[test]
fn test_collate_answers_propagates_parse_error() {
    let questions = vec![Question::new("q_1", "What is the lease start date?")];
    let result = collate_answers_mem(
        b"%PDF-1",
        &questions,
        &AnswerSheet::default(),
        &LocatorConfig::default(),
    );
    assert!(matches!(result, Err(PdfError::Parse(_))));
}
