//! Decoding of image XObjects into raster images.

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Object, Stream};
use tracing::debug;

use super::PdfError;

/// Names of the filters applied to a stream, outermost first
#[inline]
pub fn stream_filters(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Whether a stream dictionary describes an image XObject
#[inline]
pub fn is_image_xobject(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name.as_slice() == b"Image")
}

/// Decode an image XObject stream.
///
/// JPEG (`DCTDecode`) data is handed to the `image` crate as-is. Flate
/// compressed or unfiltered samples are supported for 8-bit gray, RGB and
/// CMYK color spaces.
#[inline]
pub fn decode_image(stream: &Stream) -> Result<DynamicImage, PdfError> {
    let filters = stream_filters(&stream.dict);

    if filters.iter().any(|filter| filter.as_slice() == b"DCTDecode") {
        return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
            .map_err(|e| PdfError::ImageDecode(format!("JPEG decoding failed: {e}")));
    }

    if let Some(filter) = filters
        .iter()
        .find(|filter| filter.as_slice() != b"FlateDecode")
    {
        return Err(PdfError::UnsupportedImage(
            String::from_utf8_lossy(filter).into_owned(),
        ));
    }

    let width = dimension(&stream.dict, b"Width")?;
    let height = dimension(&stream.dict, b"Height")?;

    let bits = match stream.dict.get(b"BitsPerComponent") {
        Ok(Object::Integer(bits)) => *bits,
        _ => 8,
    };
    if bits != 8 {
        return Err(PdfError::UnsupportedImage(format!(
            "{bits} bits per component"
        )));
    }

    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|e| PdfError::ImageDecode(format!("Flate decompression failed: {e}")))?
    };

    let pixels = width as usize * height as usize;
    if pixels == 0 {
        return Err(PdfError::ImageDecode("Image has no pixels".to_string()));
    }

    let components = color_components(&stream.dict).unwrap_or(samples.len() / pixels);
    debug!(
        "Decoding {}x{} image with {} components",
        width, height, components
    );

    let expected = pixels * components;
    if samples.len() < expected {
        return Err(PdfError::ImageDecode(format!(
            "Expected {} bytes of samples, found {}",
            expected,
            samples.len()
        )));
    }
    let mut samples = samples;
    samples.truncate(expected);

    let image = match components {
        1 => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
        4 => RgbImage::from_raw(width, height, cmyk_to_rgb(&samples))
            .map(DynamicImage::ImageRgb8),
        other => {
            return Err(PdfError::UnsupportedImage(format!(
                "{other} color components"
            )));
        }
    };

    image.ok_or_else(|| PdfError::ImageDecode("Sample buffer does not match size".to_string()))
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Result<u32, PdfError> {
    match dict.get(key) {
        Ok(Object::Integer(value)) => u32::try_from(*value).map_err(|_| {
            PdfError::Malformed(format!(
                "Invalid image {}: {}",
                String::from_utf8_lossy(key),
                value
            ))
        }),
        _ => Err(PdfError::Malformed(format!(
            "Image is missing {}",
            String::from_utf8_lossy(key)
        ))),
    }
}

/// Component count for device color spaces; `None` means infer from the data
fn color_components(dict: &Dictionary) -> Option<usize> {
    match dict.get(b"ColorSpace") {
        Ok(Object::Name(name)) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Some(1),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(3),
            b"DeviceCMYK" | b"CMYK" => Some(4),
            _ => None,
        },
        _ => None,
    }
}

/// Naive CMYK to RGB conversion, one byte per channel
#[inline]
pub fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((cmyk.len() / 4) * 3);
    for pixel in cmyk.chunks_exact(4) {
        let k = 255 - u16::from(pixel[3]);
        for &channel in &pixel[..3] {
            let value = (255 - u16::from(channel)) * k / 255;
            rgb.push(u8::try_from(value).unwrap_or(u8::MAX));
        }
    }
    rgb
}
