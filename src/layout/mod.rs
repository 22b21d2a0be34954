//! Page geometry and the image-to-text association heuristic.
//!
//! Images carry no text of their own, so in layout mode each image is attached
//! to the text block(s) it sits next to. An image goes to every text block
//! whose margin-expanded rectangle overlaps it; an image overlapping nothing
//! goes to the single nearest block, measured between centers with vertical
//! distance weighted fully and horizontal distance weighted by
//! [`AssociationConfig::horizontal_weight`].


use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MARGIN: f32 = 12.0;
pub const DEFAULT_HORIZONTAL_WEIGHT: f32 = 0.25;

/// Axis-aligned rectangle in PDF points, `(x0, y0)` is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f32; 4]", from = "[f32; 4]")]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Build a rectangle from two opposite corners in any order
    #[inline]
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (
            self.x0.midpoint(self.x1),
            self.y0.midpoint(self.y1),
        )
    }

    /// Grow the rectangle by `margin` on every side
    #[inline]
    #[must_use]
    pub fn expand(&self, margin: f32) -> Self {
        Self {
            x0: self.x0 - margin,
            y0: self.y0 - margin,
            x1: self.x1 + margin,
            y1: self.y1 + margin,
        }
    }

    /// Rectangles intersect unless they are separated along x or y.
    /// Touching edges count as an intersection.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        !(self.x1 < other.x0 || other.x1 < self.x0 || self.y1 < other.y0 || other.y1 < self.y0)
    }

    /// Smallest rectangle containing both
    #[inline]
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Whether the x-ranges of the two rectangles overlap
    #[inline]
    pub fn overlaps_horizontally(&self, other: &Self) -> bool {
        !(self.x1 < other.x0 || other.x1 < self.x0)
    }
}

impl From<Rect> for [f32; 4] {
    #[inline]
    fn from(rect: Rect) -> Self {
        [rect.x0, rect.y0, rect.x1, rect.y1]
    }
}

impl From<[f32; 4]> for Rect {
    #[inline]
    fn from([x0, y0, x1, y1]: [f32; 4]) -> Self {
        Self::new(x0, y0, x1, y1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssociationConfig {
    pub margin: f32,
    pub horizontal_weight: f32,
}

impl Default for AssociationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            horizontal_weight: DEFAULT_HORIZONTAL_WEIGHT,
        }
    }
}

/// A text region of a page
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub rect: Rect,
    pub text: String,
}

/// An image region of a page, referenced by its stored path
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    pub rect: Rect,
    pub path: String,
}

/// A non-empty text block with the images attached to it
#[derive(Debug, Clone, PartialEq)]
pub struct AssociatedBlock {
    pub rect: Rect,
    pub text: String,
    pub images: Vec<String>,
}

/// Center distance used by the nearest-block fallback: `|dy| + weight * |dx|`
#[inline]
pub fn weighted_center_distance(a: &Rect, b: &Rect, horizontal_weight: f32) -> f32 {
    let (ax, ay) = a.center();
    let (bx, by) = b.center();
    horizontal_weight.mul_add((ax - bx).abs(), (ay - by).abs())
}

/// Assign every image to text blocks.
///
/// Returns one entry per text rectangle holding the indices of the images
/// assigned to it, in image order. Each image lands in every text block whose
/// expanded rectangle it intersects, or else in the nearest block. With no
/// text blocks every image stays unassigned.
#[inline]
pub fn assign_images(
    text_rects: &[Rect],
    image_rects: &[Rect],
    config: &AssociationConfig,
) -> Vec<Vec<usize>> {
    let mut assignments = vec![Vec::new(); text_rects.len()];
    if text_rects.is_empty() {
        return assignments;
    }

    let expanded: Vec<Rect> = text_rects
        .iter()
        .map(|rect| rect.expand(config.margin))
        .collect();

    for (image_index, image_rect) in image_rects.iter().enumerate() {
        let mut attached = false;
        for (text_index, text_rect) in expanded.iter().enumerate() {
            if text_rect.intersects(image_rect) {
                assignments[text_index].push(image_index);
                attached = true;
            }
        }

        if attached {
            continue;
        }

        let nearest = text_rects
            .iter()
            .enumerate()
            .map(|(text_index, text_rect)| {
                (
                    text_index,
                    weighted_center_distance(text_rect, image_rect, config.horizontal_weight),
                )
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((text_index, _)) = nearest {
            assignments[text_index].push(image_index);
        }
    }

    assignments
}

/// Attach images to text blocks and drop blocks without text.
///
/// Blocks keep their layout order. Image paths are de-duplicated per block in
/// first-seen order. Blocks whose text is empty or whitespace are removed
/// after association, together with anything attached only to them.
#[inline]
pub fn associate_images(
    text_blocks: &[TextBlock],
    image_blocks: &[ImageBlock],
    config: &AssociationConfig,
) -> Vec<AssociatedBlock> {
    let text_rects: Vec<Rect> = text_blocks.iter().map(|block| block.rect).collect();
    let image_rects: Vec<Rect> = image_blocks.iter().map(|block| block.rect).collect();

    let assignments = assign_images(&text_rects, &image_rects, config);

    text_blocks
        .iter()
        .zip(assignments)
        .filter(|(block, _)| !block.text.trim().is_empty())
        .map(|(block, image_indices)| AssociatedBlock {
            rect: block.rect,
            text: block.text.trim().to_string(),
            images: image_indices
                .into_iter()
                .map(|index| image_blocks[index].path.clone())
                .unique()
                .collect(),
        })
        .collect()
}
