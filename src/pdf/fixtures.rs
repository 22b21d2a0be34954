//! Small in-memory PDFs for tests.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};

/// Text shown with `Td` at `(x, y)` in user space (y up)
pub(crate) struct SampleText {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub text: &'static str,
}

/// An image painted at `(x, y)` with the given size in user space.
/// Draws sharing a `name` paint the same XObject.
pub(crate) struct SampleImage {
    pub name: &'static str,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Default)]
pub(crate) struct SamplePage {
    pub texts: Vec<SampleText>,
    pub images: Vec<SampleImage>,
}

pub(crate) fn text(x: f32, y: f32, size: f32, text: &'static str) -> SampleText {
    SampleText { x, y, size, text }
}

pub(crate) fn image(name: &'static str, x: f32, y: f32, width: f32, height: f32) -> SampleImage {
    SampleImage {
        name,
        x,
        y,
        width,
        height,
    }
}

/// 2x2 RGB image: red, green, blue, white
pub(crate) const SAMPLE_PIXELS: [u8; 12] = [255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];

/// Build a US Letter PDF with one page per entry
pub(crate) fn build_pdf(pages: &[SamplePage]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let mut xobjects = Dictionary::new();
        let mut operations = Vec::new();

        for sample in &page.texts {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec!["F1".into(), Object::Real(sample.size)],
            ));
            operations.push(Operation::new(
                "Td",
                vec![Object::Real(sample.x), Object::Real(sample.y)],
            ));
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(sample.text)],
            ));
            operations.push(Operation::new("ET", vec![]));
        }

        for sample in &page.images {
            if !xobjects.has(sample.name.as_bytes()) {
                let image_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => Object::Integer(2),
                        "Height" => Object::Integer(2),
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => Object::Integer(8),
                    },
                    SAMPLE_PIXELS.to_vec(),
                ));
                xobjects.set(sample.name, image_id);
            }
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![
                    Object::Real(sample.width),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(sample.height),
                    Object::Real(sample.x),
                    Object::Real(sample.y),
                ],
            ));
            operations.push(Operation::new("Do", vec![sample.name.into()]));
            operations.push(Operation::new("Q", vec![]));
        }

        let content = Content { operations }
            .encode()
            .expect("content should encode");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => xobjects,
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = i64::try_from(kids.len()).expect("page count fits");
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
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
