use criterion::{Criterion, criterion_group, criterion_main};
use pdf_rag::layout::{AssociationConfig, ImageBlock, Rect, TextBlock, associate_images};
use std::hint::black_box;

/// A two-column page of paragraphs with figures scattered between them
fn sample_page() -> (Vec<TextBlock>, Vec<ImageBlock>) {
    let text_blocks = (0..60u16)
        .map(|i| {
            let column = f32::from(i % 2);
            let row = f32::from(i / 2);
            let x0 = column.mul_add(260.0, 40.0);
            let y0 = row.mul_add(24.0, 40.0);
            TextBlock {
                rect: Rect::new(x0, y0, x0 + 240.0, y0 + 18.0),
                text: format!("Paragraph {i} describing the donation process."),
            }
        })
        .collect();

    let image_blocks = (0..12u16)
        .map(|i| {
            let x0 = f32::from(i % 3).mul_add(170.0, 50.0);
            let y0 = f32::from(i / 3).mul_add(180.0, 60.0);
            ImageBlock {
                rect: Rect::new(x0, y0, x0 + 120.0, y0 + 90.0),
                path: format!("images/page1_img{}.png", i + 1),
            }
        })
        .collect();

    (text_blocks, image_blocks)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let (text_blocks, image_blocks) = sample_page();
    let config = AssociationConfig::default();
    c.bench_function("associate_images", |b| {
        b.iter(|| {
            associate_images(
                black_box(&text_blocks),
                black_box(&image_blocks),
                black_box(&config),
            )
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
