//! Grouping of positioned text runs into lines and blocks.

use super::content::TextRun;
use crate::config::LayoutConfig;
use crate::layout::{Rect, TextBlock};

/// Runs further apart than this (in ems) on one baseline belong to different lines
const COLUMN_GAP_EM: f32 = 3.0;
/// Horizontal gap (in ems) between runs that reads as a word break
const WORD_GAP_EM: f32 = 0.25;

/// Page box used to move user-space coordinates to a top-left origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFrame {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl PageFrame {
    pub const US_LETTER: Self = Self {
        left: 0.0,
        bottom: 0.0,
        right: 612.0,
        top: 792.0,
    };

    #[inline]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    /// Convert a y-up user-space rectangle to y-down page coordinates
    #[inline]
    pub fn to_top_left(&self, rect: &Rect) -> Rect {
        Rect::new(
            rect.x0 - self.left,
            self.top - rect.y1,
            rect.x1 - self.left,
            self.top - rect.y0,
        )
    }
}

struct Line {
    rect: Rect,
    baseline: f32,
    font_size: f32,
    runs: Vec<(Rect, String)>,
}

impl Line {
    fn text(&self) -> String {
        let mut runs: Vec<&(Rect, String)> = self.runs.iter().collect();
        runs.sort_by(|a, b| a.0.x0.total_cmp(&b.0.x0));

        let mut text = String::new();
        let mut previous: Option<&Rect> = None;
        for (rect, run_text) in runs {
            if let Some(previous) = previous {
                let gap = rect.x0 - previous.x1;
                let spaced = text.ends_with(char::is_whitespace)
                    || run_text.starts_with(char::is_whitespace);
                if !spaced && gap > WORD_GAP_EM * self.font_size {
                    text.push(' ');
                }
            }
            text.push_str(run_text);
            previous = Some(rect);
        }
        text
    }
}

struct Block {
    rect: Rect,
    lines: Vec<String>,
}

/// Group text runs into blocks, top to bottom.
///
/// Runs whose baselines are within `line_tolerance` and that sit close
/// horizontally form a line. A line joins the most recent block whose bottom
/// is at most `block_gap` above it and which overlaps it horizontally;
/// otherwise it starts a new block. Output rectangles use a top-left origin.
#[inline]
pub fn group_runs(runs: &[TextRun], frame: &PageFrame, config: &LayoutConfig) -> Vec<TextBlock> {
    let mut placed: Vec<(Rect, f32, f32, &str)> = runs
        .iter()
        .map(|run| {
            (
                frame.to_top_left(&run.rect),
                frame.top - run.baseline,
                run.font_size.max(1.0),
                run.text.as_str(),
            )
        })
        .collect();
    placed.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.x0.total_cmp(&b.0.x0)));

    let mut lines: Vec<Line> = Vec::new();
    for (rect, baseline, font_size, text) in placed {
        let max_gap = COLUMN_GAP_EM * font_size;
        let existing = lines.iter_mut().rev().find(|line| {
            (line.baseline - baseline).abs() <= config.line_tolerance
                && rect.x0 - line.rect.x1 <= max_gap
                && line.rect.x0 - rect.x1 <= max_gap
        });

        match existing {
            Some(line) => {
                line.rect = line.rect.union(&rect);
                line.font_size = line.font_size.max(font_size);
                line.runs.push((rect, text.to_string()));
            }
            None => lines.push(Line {
                rect,
                baseline,
                font_size,
                runs: vec![(rect, text.to_string())],
            }),
        }
    }

    lines.sort_by(|a, b| {
        a.rect
            .y0
            .total_cmp(&b.rect.y0)
            .then(a.rect.x0.total_cmp(&b.rect.x0))
    });

    let mut blocks: Vec<Block> = Vec::new();
    for line in lines {
        let text = line.text();
        let existing = blocks.iter_mut().rev().find(|block| {
            line.rect.y0 - block.rect.y1 <= config.block_gap
                && block.rect.overlaps_horizontally(&line.rect)
        });

        match existing {
            Some(block) => {
                block.rect = block.rect.union(&line.rect);
                block.lines.push(text);
            }
            None => blocks.push(Block {
                rect: line.rect,
                lines: vec![text],
            }),
        }
    }

    blocks
        .into_iter()
        .map(|block| TextBlock {
            rect: block.rect,
            text: block.lines.join("\n"),
        })
        .collect()
}
