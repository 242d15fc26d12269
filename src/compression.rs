use std::io::Cursor;
use std::time::Instant;

use bytes::Bytes;
use image::DynamicImage;
use log::{debug, info, warn};
use mime::Mime;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::CompressorError;

/// An image the user selected, immutable once created. Replaced wholesale
/// when a new file is picked; the `id` ties in-flight compression requests
/// back to the selection they were issued against.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub id: Uuid,
    pub bytes: Bytes,
    pub mime_type: Mime,
    pub display_name: String,
}

impl SourceImage {
    pub fn new(bytes: impl Into<Bytes>, mime_type: Mime, display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bytes: bytes.into(),
            mime_type,
            display_name: display_name.into(),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

/// Lossy-encoder quality on the 10-100 integer scale exposed to the user.
/// Encoders that want a 0.0-1.0 parameter get it via [`Self::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityFactor(u8);

impl QualityFactor {
    pub const MIN: u8 = 10;
    pub const MAX: u8 = 100;
    pub const STEP: u8 = 5;
    pub const DEFAULT: u8 = 80;

    pub fn new(value: u8) -> Result<Self, CompressorError> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(CompressorError::InvalidQuality(value));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// The 0.0-1.0 form consumed by encoders that take a fractional quality.
    pub fn normalized(&self) -> f32 {
        self.0 as f32 / 100.0
    }
}

impl Default for QualityFactor {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Output of one successful compression. Never mutated, only replaced;
/// dropping the last `Bytes` handle releases the buffer.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub bytes: Bytes,
    pub mime_type: Mime,
    pub width: u32,
    pub height: u32,
}

impl CompressionResult {
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

/// Re-encodes `source` at the given quality under its own MIME type.
///
/// The pixel surface is kept at its native dimensions; no resizing and no
/// color-space work beyond what decoding itself performs. Output is a valid
/// image of the same MIME type and the same dimensions, but it is not
/// guaranteed to be smaller than the input. Lossless formats (GIF, BMP,
/// TIFF) accept the quality argument without a size effect; that is an
/// encoder limitation, not an error.
pub fn compress(
    source: &SourceImage,
    quality: QualityFactor,
) -> Result<CompressionResult, CompressorError> {
    compress_with(source, quality, &Config::default())
}

/// [`compress`] with explicit configuration: PNG dithering level and
/// whether to log the per-request size/timing summary.
pub fn compress_with(
    source: &SourceImage,
    quality: QualityFactor,
    config: &Config,
) -> Result<CompressionResult, CompressorError> {
    let total_start = Instant::now();
    info!(
        "compressing {} ({} bytes, {}) at quality {}",
        source.display_name,
        source.byte_len(),
        source.mime_type,
        quality.get()
    );

    let load_start = Instant::now();
    let img = image::load_from_memory(&source.bytes)
        .map_err(|e| CompressorError::Decode(e.to_string()))?;
    let (width, height) = (img.width(), img.height());
    debug!(
        "decoded {}x{} in {:.2}ms",
        width,
        height,
        load_start.elapsed().as_secs_f64() * 1000.0
    );

    if source.mime_type.type_() != mime::IMAGE {
        return Err(CompressorError::encode(
            &source.mime_type,
            "not an image MIME type",
        ));
    }

    let encode_start = Instant::now();
    let data = match source.mime_type.subtype().as_str() {
        "jpeg" | "jpg" => encode_jpeg(&img, quality)?,
        "png" => encode_png(&img, quality, config.compression.png_dithering)?,
        "webp" => encode_webp(&img, quality),
        "gif" => encode_lossless(&img, image::ImageOutputFormat::Gif, &source.mime_type)?,
        "bmp" => encode_lossless(&img, image::ImageOutputFormat::Bmp, &source.mime_type)?,
        "tiff" => encode_lossless(&img, image::ImageOutputFormat::Tiff, &source.mime_type)?,
        other => {
            return Err(CompressorError::encode(
                &source.mime_type,
                format!("no encoder for image/{}", other),
            ));
        }
    };

    if config.logging.log_compression_stats {
        info!(
            "compressed {} -> {} bytes ({}x{}) in {:.2}ms (encode {:.2}ms)",
            source.byte_len(),
            data.len(),
            width,
            height,
            total_start.elapsed().as_secs_f64() * 1000.0,
            encode_start.elapsed().as_secs_f64() * 1000.0
        );
    }

    Ok(CompressionResult {
        bytes: Bytes::from(data),
        mime_type: source.mime_type.clone(),
        width,
        height,
    })
}

fn encode_jpeg(img: &DynamicImage, quality: QualityFactor) -> Result<Vec<u8>, CompressorError> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let raw = rgb.into_raw();

    match encode_mozjpeg(&raw, width, height, quality.get()) {
        Ok(data) => Ok(data),
        Err(reason) => {
            warn!("mozjpeg failed ({}), falling back to jpeg-encoder", reason);
            encode_jpeg_fallback(&raw, width, height, quality.get())
        }
    }
}

fn encode_mozjpeg(raw: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, String> {
    // mozjpeg aborts via panic on invalid input; contain that and let the
    // caller fall back to the pure-Rust encoder.
    std::panic::catch_unwind(|| {
        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_quality(quality as f32);
        let mut started = comp.start_compress(Vec::new())?;

        let line_size = width as usize * 3;
        for y in 0..height as usize {
            let offset = y * line_size;
            started.write_scanlines(&raw[offset..offset + line_size])?;
        }

        started.finish()
    })
    .map_err(|_| "encoder panicked".to_string())?
    .map_err(|e| e.to_string())
}

fn encode_jpeg_fallback(
    raw: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, CompressorError> {
    use jpeg_encoder::{ColorType, Encoder};

    let dimension_err = || CompressorError::Encode {
        mime: mime::IMAGE_JPEG.to_string(),
        reason: format!("dimensions {}x{} exceed the JPEG encoder limit", width, height),
    };
    let enc_width = u16::try_from(width).map_err(|_| dimension_err())?;
    let enc_height = u16::try_from(height).map_err(|_| dimension_err())?;

    let mut output = Vec::new();
    let encoder = Encoder::new(&mut output, quality);
    encoder
        .encode(raw, enc_width, enc_height, ColorType::Rgb)
        .map_err(|e| CompressorError::Encode {
            mime: mime::IMAGE_JPEG.to_string(),
            reason: format!("{:?}", e),
        })?;
    Ok(output)
}

fn encode_png(
    img: &DynamicImage,
    quality: QualityFactor,
    dithering: f32,
) -> Result<Vec<u8>, CompressorError> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let rgba_data = rgba.into_raw();

    let as_encode_err = |reason: String| CompressorError::Encode {
        mime: mime::IMAGE_PNG.to_string(),
        reason,
    };

    let mut liq = imagequant::new();
    liq.set_quality(0, quality.get())
        .map_err(|e| as_encode_err(format!("failed to set quality: {:?}", e)))?;

    let mut rgba_pixels = Vec::with_capacity(rgba_data.len() / 4);
    for chunk in rgba_data.chunks_exact(4) {
        rgba_pixels.push(imagequant::RGBA {
            r: chunk[0],
            g: chunk[1],
            b: chunk[2],
            a: chunk[3],
        });
    }

    let mut liq_image = liq
        .new_image(&rgba_pixels[..], width as usize, height as usize, 0.0)
        .map_err(|e| as_encode_err(format!("failed to build quantizer image: {:?}", e)))?;

    let mut quantized = liq
        .quantize(&mut liq_image)
        .map_err(|e| as_encode_err(format!("quantization failed: {:?}", e)))?;

    quantized
        .set_dithering_level(dithering)
        .map_err(|e| as_encode_err(format!("failed to set dithering: {:?}", e)))?;

    let (palette, pixels) = quantized
        .remapped(&mut liq_image)
        .map_err(|e| as_encode_err(format!("palette remap failed: {:?}", e)))?;

    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(Cursor::new(&mut png_data), width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Best);

        let png_palette: Vec<u8> = palette
            .iter()
            .flat_map(|color| [color.r, color.g, color.b])
            .collect();

        // tRNS carries alpha for the first N palette entries; trailing
        // fully-opaque entries can be omitted.
        let mut trns: Vec<u8> = palette.iter().map(|c| c.a).collect();
        while trns.last().copied() == Some(255) {
            trns.pop();
        }

        encoder.set_palette(png_palette);
        if !trns.is_empty() {
            encoder.set_trns(trns);
        }

        let mut writer = encoder
            .write_header()
            .map_err(|e| as_encode_err(format!("failed to write header: {}", e)))?;
        writer
            .write_image_data(&pixels)
            .map_err(|e| as_encode_err(format!("failed to write image data: {}", e)))?;
    }

    Ok(png_data)
}

fn encode_webp(img: &DynamicImage, quality: QualityFactor) -> Vec<u8> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
    encoder.encode(quality.get() as f32).to_vec()
}

fn encode_lossless(
    img: &DynamicImage,
    format: image::ImageOutputFormat,
    mime_type: &Mime,
) -> Result<Vec<u8>, CompressorError> {
    let mut output = Vec::new();
    img.write_to(&mut Cursor::new(&mut output), format)
        .map_err(|e| CompressorError::encode(mime_type, e.to_string()))?;
    Ok(output)
}
