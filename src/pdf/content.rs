//! Page content stream interpretation.
//!
//! Tracks just enough graphics and text state to position text runs and image
//! draws on the page. There are no font metrics here: glyphs are assumed to be
//! half an em wide, with 0.2 em below the baseline and 0.8 em above it.

use lopdf::Object;
use lopdf::content::Operation;
use tracing::trace;

use crate::layout::Rect;

const GLYPH_WIDTH_EM: f32 = 0.5;
const DESCENT_EM: f32 = 0.2;
const ASCENT_EM: f32 = 0.8;
/// `TJ` adjustments (thousandths of an em) more negative than this read as a word gap
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// 2D affine transform `[a b c d e f]` in PDF row-vector convention
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    #[inline]
    pub const fn translate(tx: f32, ty: f32) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    /// `self × other`: apply `self` first, then `other`
    #[inline]
    #[must_use]
    pub fn then(&self, other: &Self) -> Self {
        Self {
            a: self.a.mul_add(other.a, self.b * other.c),
            b: self.a.mul_add(other.b, self.b * other.d),
            c: self.c.mul_add(other.a, self.d * other.c),
            d: self.c.mul_add(other.b, self.d * other.d),
            e: self.e.mul_add(other.a, self.f.mul_add(other.c, other.e)),
            f: self.e.mul_add(other.b, self.f.mul_add(other.d, other.f)),
        }
    }

    #[inline]
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a.mul_add(x, self.c.mul_add(y, self.e)),
            self.b.mul_add(x, self.d.mul_add(y, self.f)),
        )
    }

    /// Length of the transformed unit y vector
    #[inline]
    pub fn vertical_scale(&self) -> f32 {
        self.c.hypot(self.d)
    }

    /// Bounding box of a rectangle after transformation
    #[inline]
    pub fn transform_rect(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> Rect {
        let corners = [
            self.apply(x0, y0),
            self.apply(x1, y0),
            self.apply(x0, y1),
            self.apply(x1, y1),
        ];
        let mut rect = Rect::new(corners[0].0, corners[0].1, corners[0].0, corners[0].1);
        for (x, y) in &corners[1..] {
            rect = rect.union(&Rect::new(*x, *y, *x, *y));
        }
        rect
    }

    pub(crate) fn from_operands(operands: &[Object]) -> Option<Self> {
        let values: Vec<f32> = operands.iter().map(number).collect::<Option<_>>()?;
        match values.as_slice() {
            [a, b, c, d, e, f] => Some(Self {
                a: *a,
                b: *b,
                c: *c,
                d: *d,
                e: *e,
                f: *f,
            }),
            _ => None,
        }
    }
}

/// A string shown by a text operator, in PDF user space (y up)
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub rect: Rect,
    pub baseline: f32,
    pub font_size: f32,
}

/// An XObject painted with `Do`, in PDF user space (y up)
#[derive(Debug, Clone, PartialEq)]
pub struct XObjectDraw {
    pub name: Vec<u8>,
    pub rect: Rect,
    /// CTM in effect at the `Do`, needed to place the contents of forms
    pub ctm: Matrix,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    pub runs: Vec<TextRun>,
    pub draws: Vec<XObjectDraw>,
}

#[derive(Debug)]
struct TextState {
    matrix: Matrix,
    line_matrix: Matrix,
    font_size: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font_size: 12.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }
}

/// Walk a page's operations and collect positioned text runs and XObject draws
#[inline]
pub fn interpret(operations: &[Operation]) -> PageContent {
    interpret_at(operations, Matrix::IDENTITY)
}

/// Like [`interpret`], starting from `initial_ctm` (a form painted inside a page)
#[inline]
pub fn interpret_at(operations: &[Operation], initial_ctm: Matrix) -> PageContent {
    let mut content = PageContent::default();
    let mut ctm = initial_ctm;
    let mut ctm_stack: Vec<Matrix> = Vec::new();
    let mut text = TextState::default();

    for operation in operations {
        let operands = operation.operands.as_slice();
        match operation.operator.as_str() {
            "q" => ctm_stack.push(ctm),
            "Q" => {
                if let Some(saved) = ctm_stack.pop() {
                    ctm = saved;
                }
            }
            "cm" => {
                if let Some(matrix) = Matrix::from_operands(operands) {
                    ctm = matrix.then(&ctm);
                }
            }
            "BT" => {
                text.matrix = Matrix::IDENTITY;
                text.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(size) = operands.get(1).and_then(number) {
                    text.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    text.leading = leading;
                }
            }
            "Td" | "TD" => {
                if let [tx, ty] = operands {
                    if let (Some(tx), Some(ty)) = (number(tx), number(ty)) {
                        if operation.operator == "TD" {
                            text.leading = -ty;
                        }
                        text.move_line(tx, ty);
                    }
                }
            }
            "Tm" => {
                if let Some(matrix) = Matrix::from_operands(operands) {
                    text.matrix = matrix;
                    text.line_matrix = matrix;
                }
            }
            "T*" => text.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    let shown = decode_pdf_string(bytes);
                    let glyphs = shown.chars().count();
                    show_text(&mut content, &mut text, &ctm, &shown, glyphs, 0.0);
                }
            }
            "'" => {
                text.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    let shown = decode_pdf_string(bytes);
                    let glyphs = shown.chars().count();
                    show_text(&mut content, &mut text, &ctm, &shown, glyphs, 0.0);
                }
            }
            "\"" => {
                text.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    let shown = decode_pdf_string(bytes);
                    let glyphs = shown.chars().count();
                    show_text(&mut content, &mut text, &ctm, &shown, glyphs, 0.0);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let shown = collect_tj(items);
                    show_text(
                        &mut content,
                        &mut text,
                        &ctm,
                        &shown.text,
                        shown.glyphs,
                        shown.adjustment,
                    );
                }
            }
            "Do" => {
                if let Some(Object::Name(name)) = operands.first() {
                    content.draws.push(XObjectDraw {
                        name: name.clone(),
                        rect: ctm.transform_rect(0.0, 0.0, 1.0, 1.0),
                        ctm,
                    });
                }
            }
            other => trace!("Ignoring content operator {}", other),
        }
    }

    content
}

/// Text of a `TJ` array
struct TjText {
    text: String,
    /// Glyphs actually painted; word gaps inserted for large adjustments are not counted
    glyphs: usize,
    /// Sum of the adjustments in thousandths of an em
    adjustment: f32,
}

fn collect_tj(items: &[Object]) -> TjText {
    let mut shown = TjText {
        text: String::new(),
        glyphs: 0,
        adjustment: 0.0,
    };

    for item in items {
        match item {
            Object::String(bytes, _) => {
                let decoded = decode_pdf_string(bytes);
                shown.glyphs += decoded.chars().count();
                shown.text.push_str(&decoded);
            }
            other => {
                if let Some(value) = number(other) {
                    shown.adjustment += value;
                    if value < TJ_SPACE_THRESHOLD && !shown.text.ends_with(' ') {
                        shown.text.push(' ');
                    }
                }
            }
        }
    }

    shown
}

fn show_text(
    content: &mut PageContent,
    text: &mut TextState,
    ctm: &Matrix,
    shown: &str,
    glyphs: usize,
    adjustment: f32,
) {
    let font_size = text.font_size;
    let glyphs = glyphs as f32;
    let width = (glyphs * GLYPH_WIDTH_EM).mul_add(font_size, -adjustment / 1000.0 * font_size);

    let rendering = text.matrix.then(ctm);
    if !shown.is_empty() {
        let rect = rendering.transform_rect(
            0.0,
            -DESCENT_EM * font_size,
            width.max(0.0),
            ASCENT_EM * font_size,
        );
        let (_, baseline) = rendering.apply(0.0, 0.0);
        content.runs.push(TextRun {
            text: shown.to_string(),
            rect,
            baseline,
            font_size: font_size * rendering.vertical_scale(),
        });
    }

    text.matrix = Matrix::translate(width, 0.0).then(&text.matrix);
}

/// Decode a PDF string operand: UTF-16BE when it carries a byte order mark,
/// Latin-1 otherwise. Control characters become spaces.
#[inline]
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    let decoded = if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&byte| char::from(byte)).collect()
    };

    decoded
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect()
}

/// Numeric value of an integer or real operand
#[inline]
pub fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}
