//! Image optimization with a content-addressed cache.
//!
//! PNG and JPEG files are re-encoded with `image`, SVG markup is stripped of
//! comments, metadata, and inter-tag whitespace, and GIFs pass through
//! unchanged. The smaller of the original and optimized bytes is kept, so
//! optimizing never grows a file.
//!
//! Optimized bytes are cached under the SHA-256 of the input, plus the
//! quality setting for JPEGs, which makes repeated builds of unchanged images
//! cheap. The cache lives outside the output root and is never read by
//! anything but this transform.

use super::{Asset, Transform};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static SVG_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static SVG_METADATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<metadata\b.*?</metadata>").expect("valid regex"));
static SVG_BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("valid regex"));

/// Optimize images, consulting the cache first.
pub struct Optimize {
    cache_dir: Option<PathBuf>,
    jpeg_quality: u8,
}

impl Optimize {
    pub fn new(cache_dir: Option<PathBuf>, jpeg_quality: u8) -> Self {
        Self { cache_dir, jpeg_quality: jpeg_quality.clamp(1, 100) }
    }

    /// Cache entry for `contents`. JPEG entries also key on the encoder quality.
    fn cache_path(&self, contents: &[u8], extension: &str) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        let name = match extension {
            "jpg" | "jpeg" => format!("{}-q{}.{}", sha256_hex(contents), self.jpeg_quality, extension),
            _ => format!("{}.{}", sha256_hex(contents), extension),
        };
        Some(dir.join(name))
    }

    fn optimize(&self, contents: &[u8], extension: &str) -> Result<Vec<u8>, String> {
        match extension {
            "png" => optimize_png(contents),
            "jpg" | "jpeg" => optimize_jpeg(contents, self.jpeg_quality),
            "svg" => optimize_svg(contents),
            _ => Ok(contents.to_vec()),
        }
    }
}

impl Transform for Optimize {
    fn name(&self) -> &'static str {
        "imagemin"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, String> {
        let extension = asset
            .source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let cache_path = self.cache_path(&asset.contents, &extension);
        if let Some(cached) = cache_path.as_ref().and_then(|p| fs::read(p).ok()) {
            tracing::debug!(file = %asset.source.display(), "image cache hit");
            asset.contents = cached;
            return Ok(asset);
        }

        let optimized = self.optimize(&asset.contents, &extension)?;
        if optimized.len() < asset.contents.len() {
            asset.contents = optimized;
        }

        if let Some(path) = cache_path {
            if let Err(e) = write_cache(&path, &asset.contents) {
                tracing::warn!(path = %path.display(), "failed to write image cache: {}", e);
            }
        }

        Ok(asset)
    }
}

/// Hex-encoded SHA-256 of bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn write_cache(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

fn optimize_png(contents: &[u8]) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory(contents).map_err(|e| format!("invalid PNG: {}", e))?;
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive)
        .write_image(img.as_bytes(), img.width(), img.height(), img.color())
        .map_err(|e| format!("PNG encoding failed: {}", e))?;
    Ok(out)
}

fn optimize_jpeg(contents: &[u8], quality: u8) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory(contents).map_err(|e| format!("invalid JPEG: {}", e))?;
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| format!("JPEG encoding failed: {}", e))?;
    Ok(out)
}

fn optimize_svg(contents: &[u8]) -> Result<Vec<u8>, String> {
    let svg = std::str::from_utf8(contents).map_err(|e| format!("invalid SVG: {}", e))?;
    let svg = SVG_COMMENT.replace_all(svg, "");
    let svg = SVG_METADATA.replace_all(&svg, "");
    let svg = SVG_BETWEEN_TAGS.replace_all(&svg, "><");
    Ok(svg.trim().as_bytes().to_vec())
}
