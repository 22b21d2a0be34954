use super::content::{Matrix, decode_pdf_string, interpret};
use super::fixtures::{SAMPLE_PIXELS, SamplePage, build_pdf, image, text};
use super::raster::{cmyk_to_rgb, decode_image};
use super::*;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Stream, dictionary};
use tempfile::TempDir;

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 0.01,
        "expected {expected}, got {actual}"
    );
}

fn assert_rect(actual: &Rect, expected: [f32; 4]) {
    assert_close(actual.x0, expected[0]);
    assert_close(actual.y0, expected[1]);
    assert_close(actual.x1, expected[2]);
    assert_close(actual.y1, expected[3]);
}

fn open(pages: &[SamplePage]) -> PdfDocument {
    PdfDocument::from_bytes(&build_pdf(pages)).expect("sample PDF should load")
}

#[test]
fn pages_are_numbered_from_one() {
    let doc = open(&[SamplePage::default(), SamplePage::default()]);
    assert_eq!(doc.page_count(), 2);
    assert_eq!(doc.page_numbers(), vec![1, 2]);
}

#[test]
fn missing_page_is_an_error() {
    let doc = open(&[SamplePage::default()]);
    assert!(matches!(
        doc.page_layout(3, &LayoutConfig::default()),
        Err(PdfError::PageNotFound(3))
    ));
    assert!(matches!(doc.page_text(0), Err(PdfError::PageNotFound(0))));
}

#[test]
fn garbage_bytes_fail_to_load() {
    let result = PdfDocument::from_bytes(b"definitely not a pdf");
    assert!(matches!(result, Err(PdfError::Load { .. })));
}

#[test]
fn open_missing_file_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = PdfDocument::open(temp_dir.path().join("missing.pdf"));
    assert!(matches!(result, Err(PdfError::Load { .. })));
}

#[test]
fn text_block_uses_top_left_coordinates() {
    let doc = open(&[SamplePage {
        texts: vec![text(72.0, 700.0, 12.0, "Hello World")],
        ..SamplePage::default()
    }]);

    let layout = doc
        .page_layout(1, &LayoutConfig::default())
        .expect("layout should build");
    assert_close(layout.width, 612.0);
    assert_close(layout.height, 792.0);
    assert_eq!(layout.text_blocks.len(), 1);

    let block = &layout.text_blocks[0];
    assert_eq!(block.text, "Hello World");
    // 11 glyphs at half an em, 0.8 em above and 0.2 em below the baseline
    assert_rect(&block.rect, [72.0, 82.4, 138.0, 94.4]);
}

#[test]
fn close_lines_form_one_block() {
    let doc = open(&[SamplePage {
        texts: vec![
            text(72.0, 700.0, 12.0, "First line"),
            text(72.0, 686.0, 12.0, "Second line"),
        ],
        ..SamplePage::default()
    }]);

    let layout = doc
        .page_layout(1, &LayoutConfig::default())
        .expect("layout should build");
    assert_eq!(layout.text_blocks.len(), 1);
    assert_eq!(layout.text_blocks[0].text, "First line\nSecond line");
    assert_rect(&layout.text_blocks[0].rect, [72.0, 82.4, 138.0, 108.4]);
}

#[test]
fn distant_text_forms_separate_blocks() {
    let doc = open(&[SamplePage {
        // Listed bottom first; blocks still come out top to bottom
        texts: vec![
            text(72.0, 400.0, 12.0, "Lower paragraph"),
            text(72.0, 700.0, 12.0, "Upper paragraph"),
            text(400.0, 700.0, 12.0, "Side note"),
        ],
        ..SamplePage::default()
    }]);

    let layout = doc
        .page_layout(1, &LayoutConfig::default())
        .expect("layout should build");
    let texts: Vec<&str> = layout
        .text_blocks
        .iter()
        .map(|block| block.text.as_str())
        .collect();
    assert_eq!(texts, vec!["Upper paragraph", "Side note", "Lower paragraph"]);
}

#[test]
fn runs_on_one_line_are_joined_with_spaces() {
    let doc = open(&[SamplePage {
        texts: vec![
            text(72.0, 700.0, 10.0, "Total:"),
            text(110.0, 700.0, 10.0, "42"),
        ],
        ..SamplePage::default()
    }]);

    let layout = doc
        .page_layout(1, &LayoutConfig::default())
        .expect("layout should build");
    assert_eq!(layout.text_blocks.len(), 1);
    assert_eq!(layout.text_blocks[0].text, "Total: 42");
}

#[test]
fn images_are_numbered_in_first_draw_order() {
    let doc = open(&[SamplePage {
        texts: vec![text(72.0, 700.0, 12.0, "Caption")],
        images: vec![
            image("ImB", 72.0, 600.0, 100.0, 50.0),
            image("ImA", 300.0, 600.0, 100.0, 50.0),
            image("ImB", 72.0, 300.0, 100.0, 50.0),
        ],
    }]);

    let layout = doc
        .page_layout(1, &LayoutConfig::default())
        .expect("layout should build");
    assert_eq!(layout.images.len(), 2);
    assert_eq!(layout.images[0].name, "ImB");
    assert_eq!(layout.images[0].index, 1);
    assert_eq!(layout.images[1].name, "ImA");
    assert_eq!(layout.images[1].relative_path(), "images/page1_img2.png");

    assert_eq!(layout.placements.len(), 3);
    assert_eq!(layout.placements[0].image, 0);
    assert_eq!(layout.placements[1].image, 1);
    assert_eq!(layout.placements[2].image, 0);
    assert_rect(&layout.placements[0].rect, [72.0, 142.0, 172.0, 192.0]);
    assert_rect(&layout.placements[2].rect, [72.0, 442.0, 172.0, 492.0]);

    let images = doc.page_images(1).expect("images should list");
    assert_eq!(images, layout.images);
}

#[test]
fn save_image_writes_png() {
    let doc = open(&[SamplePage {
        images: vec![image("Im1", 0.0, 0.0, 10.0, 10.0)],
        ..SamplePage::default()
    }]);
    let images = doc.page_images(1).expect("images should list");
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("images").join(images[0].file_name());

    doc.save_image(&images[0], &path).expect("image should save");

    let saved = ::image::open(&path).expect("saved PNG should open").to_rgb8();
    assert_eq!(saved.dimensions(), (2, 2));
    assert_eq!(saved.as_raw().as_slice(), SAMPLE_PIXELS.as_slice());
}

#[test]
fn page_text_contains_shown_strings() {
    let doc = open(&[SamplePage {
        texts: vec![text(72.0, 700.0, 12.0, "Donation guidelines")],
        ..SamplePage::default()
    }]);
    let page_text = doc.page_text(1).expect("text should extract");
    assert!(page_text.contains("Donation"), "got {page_text:?}");
}

#[test]
fn image_names() {
    assert_eq!(image_file_name(3, 2), "page3_img2.png");
    assert_eq!(relative_image_path(1, 1), "images/page1_img1.png");
}

#[test]
fn matrix_composition_applies_left_first() {
    let scale = Matrix {
        a: 2.0,
        d: 2.0,
        ..Matrix::IDENTITY
    };
    let moved = scale.then(&Matrix::translate(10.0, 5.0));
    assert_eq!(moved.apply(1.0, 1.0), (12.0, 7.0));

    let scaled_after = Matrix::translate(10.0, 5.0).then(&scale);
    assert_eq!(scaled_after.apply(1.0, 1.0), (22.0, 12.0));
}

#[test]
fn interpret_tracks_leading_and_tj_spacing() {
    let operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), Object::Integer(10)]),
        Operation::new("TL", vec![Object::Integer(14)]),
        Operation::new("Td", vec![Object::Integer(50), Object::Integer(500)]),
        Operation::new(
            "TJ",
            vec![Object::Array(vec![
                Object::string_literal("Hello"),
                Object::Integer(-300),
                Object::string_literal("World"),
            ])],
        ),
        Operation::new("'", vec![Object::string_literal("Next")]),
        Operation::new("ET", vec![]),
    ];

    let content = interpret(&operations);
    assert_eq!(content.runs.len(), 2);
    assert_eq!(content.runs[0].text, "Hello World");
    assert_close(content.runs[0].baseline, 500.0);
    assert_eq!(content.runs[1].text, "Next");
    assert_close(content.runs[1].baseline, 486.0);
    assert_close(content.runs[1].rect.x0, 50.0);
}

#[test]
fn interpret_restores_graphics_state() {
    let operations = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Integer(20),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(30),
                Object::Integer(5),
                Object::Integer(6),
            ],
        ),
        Operation::new("Do", vec!["Im1".into()]),
        Operation::new("Q", vec![]),
        Operation::new("Do", vec!["Im2".into()]),
    ];

    let content = interpret(&operations);
    assert_eq!(content.draws.len(), 2);
    assert_eq!(content.draws[0].name, b"Im1".to_vec());
    assert_eq!(content.draws[0].rect, Rect::new(5.0, 6.0, 25.0, 36.0));
    assert_eq!(content.draws[1].rect, Rect::new(0.0, 0.0, 1.0, 1.0));
}

#[test]
fn pdf_strings_decode_utf16_and_latin1() {
    assert_eq!(
        decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x48, 0x00, 0xE9]),
        "Hé"
    );
    assert_eq!(decode_pdf_string(&[0x43, 0x61, 0x66, 0xE9]), "Café");
    assert_eq!(decode_pdf_string(b"a\tb"), "a b");
}

#[test]
fn cmyk_converts_to_rgb() {
    assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0]), vec![255, 255, 255]);
    assert_eq!(cmyk_to_rgb(&[0, 0, 0, 255]), vec![0, 0, 0]);
    assert_eq!(cmyk_to_rgb(&[255, 0, 0, 0]), vec![0, 255, 255]);
}

#[test]
fn gray_image_decodes() {
    let stream = Stream::new(
        dictionary! {
            "Subtype" => "Image",
            "Width" => Object::Integer(2),
            "Height" => Object::Integer(1),
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => Object::Integer(8),
        },
        vec![0, 255],
    );
    let decoded = decode_image(&stream).expect("gray image should decode");
    assert_eq!(decoded.to_luma8().as_raw().as_slice(), &[0, 255]);
}

#[test]
fn unsupported_filter_is_rejected() {
    let stream = Stream::new(
        dictionary! {
            "Subtype" => "Image",
            "Width" => Object::Integer(1),
            "Height" => Object::Integer(1),
            "Filter" => "JPXDecode",
        },
        vec![0, 0, 0],
    );
    assert!(matches!(
        decode_image(&stream),
        Err(PdfError::UnsupportedImage(_))
    ));
}

#[test]
fn truncated_samples_are_rejected() {
    let stream = Stream::new(
        dictionary! {
            "Subtype" => "Image",
            "Width" => Object::Integer(4),
            "Height" => Object::Integer(4),
            "ColorSpace" => "DeviceRGB",
        },
        vec![0; 10],
    );
    assert!(matches!(
        decode_image(&stream),
        Err(PdfError::ImageDecode(_))
    ));
}

fn sample_image_stream() -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(2),
            "Height" => Object::Integer(2),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => Object::Integer(8),
        },
        SAMPLE_PIXELS.to_vec(),
    )
}

fn encode(operations: Vec<Operation>) -> Vec<u8> {
    Content { operations }
        .encode()
        .expect("content should encode")
}

fn integers(values: &[i64]) -> Object {
    Object::Array(values.iter().copied().map(Object::Integer).collect())
}

fn place(a: i64, d: i64, e: i64, f: i64, name: &str) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Integer(a),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(d),
                Object::Integer(e),
                Object::Integer(f),
            ],
        ),
        Operation::new("Do", vec![name.into()]),
        Operation::new("Q", vec![]),
    ]
}

/// One US Letter page that paints form `/Fm1` scaled by 2, then image `/Im9`
/// directly. The form is translated to (100, 200), shows a caption at its
/// origin and paints `/Im0` at 50x40. With `recursive`, the form also paints
/// itself.
fn form_pdf(recursive: bool) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let form_id = doc.new_object_id();
    let nested_image_id = doc.add_object(sample_image_stream());
    let direct_image_id = doc.add_object(sample_image_stream());

    let mut form_operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), Object::Integer(12)]),
        Operation::new("Tj", vec![Object::string_literal("Caption")]),
        Operation::new("ET", vec![]),
    ];
    form_operations.extend(place(50, 40, 0, 0, "Im0"));
    if recursive {
        form_operations.extend(place(1, 1, 0, 0, "Fm1"));
    }

    let mut form_xobjects = dictionary! { "Im0" => nested_image_id };
    if recursive {
        form_xobjects.set("Fm1", form_id);
    }
    doc.objects.insert(
        form_id,
        Object::Stream(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => integers(&[0, 0, 100, 100]),
                "Matrix" => integers(&[1, 0, 0, 1, 100, 200]),
                "Resources" => dictionary! { "XObject" => form_xobjects },
            },
            encode(form_operations),
        )),
    );

    let mut page_operations = place(2, 2, 0, 0, "Fm1");
    page_operations.extend(place(10, 10, 20, 30, "Im9"));
    let content_id = doc.add_object(Stream::new(dictionary! {}, encode(page_operations)));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Fm1" => form_id,
                "Im9" => direct_image_id,
            },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
            "MediaBox" => integers(&[0, 0, 612, 792]),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("document should save");
    bytes
}

#[test]
fn images_inside_forms_are_found() {
    let doc = PdfDocument::from_bytes(&form_pdf(false)).expect("PDF should load");
    let layout = doc
        .page_layout(1, &LayoutConfig::default())
        .expect("layout should succeed");

    let names: Vec<&str> = layout.images.iter().map(|image| image.name.as_str()).collect();
    assert_eq!(names, vec!["Im0", "Im9"]);
    assert_eq!(layout.images[0].index, 1);
    assert_eq!(layout.images[1].index, 2);

    // Unit square -> 50x40 -> form matrix (+100, +200) -> page CTM (x2)
    assert_eq!(layout.placements.len(), 2);
    assert_eq!(layout.placements[0].image, 0);
    assert_rect(&layout.placements[0].rect, [200.0, 312.0, 300.0, 392.0]);
    assert_rect(&layout.placements[1].rect, [20.0, 752.0, 30.0, 762.0]);

    assert!(
        layout
            .text_blocks
            .iter()
            .any(|block| block.text == "Caption"),
        "text shown inside the form should be laid out"
    );

    let temp_dir = TempDir::new().expect("should create temp dir");
    let target = temp_dir.path().join(layout.images[0].file_name());
    doc.save_image(&layout.images[0], &target)
        .expect("nested image should save");
    assert_eq!(layout.images[0].file_name(), "page1_img1.png");
    assert!(target.exists());
}

#[test]
fn self_painting_form_terminates() {
    let doc = PdfDocument::from_bytes(&form_pdf(true)).expect("PDF should load");
    let images = doc.page_images(1).expect("images should be listed");

    let names: Vec<&str> = images.iter().map(|image| image.name.as_str()).collect();
    assert_eq!(names, vec!["Im0", "Im9"]);
}

#[test]
fn tj_word_gaps_do_not_widen_runs() {
    let operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), Object::Integer(10)]),
        Operation::new("Td", vec![Object::Integer(50), Object::Integer(500)]),
        Operation::new(
            "TJ",
            vec![Object::Array(vec![
                Object::string_literal("Hello"),
                Object::Integer(-300),
                Object::string_literal("World"),
            ])],
        ),
        Operation::new("ET", vec![]),
    ];

    let content = interpret(&operations);
    assert_eq!(content.runs[0].text, "Hello World");
    // 10 glyphs at 5pt plus the 3pt gap
    assert_close(content.runs[0].rect.x0, 50.0);
    assert_close(content.runs[0].rect.x1, 103.0);
}
