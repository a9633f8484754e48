//! Turning input files into page images
//!
//! Raster files are a single page. PDF pages are represented by the largest
//! raster image embedded in each page. A page requested at a resolution other
//! than the base resolution is resampled by `dpi / base_dpi`.

use crate::error::OcrError;
use image::{imageops::FilterType, DynamicImage};
use lopdf::{Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Longest side a resampled page may have
const MAX_DIMENSION: u32 = 12_000;
/// Parent links followed when looking up inherited page resources
const MAX_INHERITANCE_DEPTH: usize = 16;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Pdf,
}

impl FileKind {
    /// Detect by extension, falling back to the `%PDF-` signature
    pub fn detect(path: &Path) -> Result<Self, OcrError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if extension == "pdf" {
            return Ok(FileKind::Pdf);
        }
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Ok(FileKind::Image);
        }

        let mut magic = [0u8; 5];
        let is_pdf = File::open(path)
            .and_then(|mut f| f.read_exact(&mut magic))
            .map(|_| &magic == b"%PDF-")
            .unwrap_or(false);
        if is_pdf {
            return Ok(FileKind::Pdf);
        }

        Err(OcrError::UnsupportedFormat(format!(
            "{} (extension '{}')",
            path.display(),
            extension
        )))
    }
}

/// A page image with its 1-based page number
#[derive(Debug, Clone)]
pub struct LoadedPage {
    pub number: usize,
    pub image: DynamicImage,
}

#[derive(Debug, Clone)]
pub struct DocumentLoader {
    base_dpi: u32,
}

impl DocumentLoader {
    pub fn new(base_dpi: u32) -> Self {
        Self {
            base_dpi: base_dpi.max(1),
        }
    }

    /// Every page of the document at `dpi` (base resolution by default)
    pub fn load_pages(&self, path: &Path, dpi: Option<u32>) -> Result<Vec<LoadedPage>, OcrError> {
        Ok(decode_pages(path)?
            .into_iter()
            .map(|page| LoadedPage {
                number: page.number,
                image: self.resample(page.image, dpi),
            })
            .collect())
    }

    /// A single page (1-based) at `dpi`; other pages are decoded but never resampled
    pub fn load_page(
        &self,
        path: &Path,
        page: usize,
        dpi: Option<u32>,
    ) -> Result<LoadedPage, OcrError> {
        let found = decode_pages(path)?
            .into_iter()
            .find(|p| p.number == page)
            .ok_or_else(|| {
                OcrError::InvalidRequest(format!("Page {} not found in {}", page, path.display()))
            })?;

        Ok(LoadedPage {
            number: found.number,
            image: self.resample(found.image, dpi),
        })
    }

    fn resample(&self, image: DynamicImage, dpi: Option<u32>) -> DynamicImage {
        let Some(dpi) = dpi.filter(|d| *d != self.base_dpi && *d > 0) else {
            return image;
        };

        let scale = dpi as f32 / self.base_dpi as f32;
        let mut width = (image.width() as f32 * scale).round().max(1.0);
        let mut height = (image.height() as f32 * scale).round().max(1.0);

        let longest = width.max(height);
        if longest > MAX_DIMENSION as f32 {
            let shrink = MAX_DIMENSION as f32 / longest;
            width = (width * shrink).round().max(1.0);
            height = (height * shrink).round().max(1.0);
            tracing::warn!(
                "Page at {} dpi exceeds {} px, capped to {}x{}",
                dpi,
                MAX_DIMENSION,
                width,
                height
            );
        }

        image.resize_exact(width as u32, height as u32, FilterType::CatmullRom)
    }
}

/// Every page at its native resolution
fn decode_pages(path: &Path) -> Result<Vec<LoadedPage>, OcrError> {
    if !path.exists() {
        return Err(OcrError::InvalidRequest(format!(
            "File not found: {}",
            path.display()
        )));
    }

    match FileKind::detect(path)? {
        FileKind::Image => Ok(vec![LoadedPage {
            number: 1,
            image: open_raster(path)?,
        }]),
        FileKind::Pdf => pdf_page_images(path),
    }
}

fn open_raster(path: &Path) -> Result<DynamicImage, OcrError> {
    image::open(path).map_err(|e| {
        OcrError::UnsupportedFormat(format!("Failed to decode {}: {}", path.display(), e))
    })
}

fn pdf_page_images(path: &Path) -> Result<Vec<LoadedPage>, OcrError> {
    let doc = Document::load(path)
        .map_err(|e| OcrError::UnsupportedFormat(format!("Failed to load PDF: {}", e)))?;

    let mut pages = Vec::new();
    for (number, page_id) in doc.get_pages() {
        let largest = page_image_streams(&doc, page_id)
            .into_iter()
            .filter_map(|(id, stream)| match decode_image(&doc, stream) {
                Ok(image) => Some(image),
                Err(e) => {
                    tracing::warn!("Skipping image {:?} on page {}: {}", id, number, e);
                    None
                }
            })
            .max_by_key(|image| u64::from(image.width()) * u64::from(image.height()));

        match largest {
            Some(image) => pages.push(LoadedPage {
                number: number as usize,
                image,
            }),
            None => tracing::warn!("Page {} of {} has no raster image", number, path.display()),
        }
    }

    if pages.is_empty() {
        return Err(OcrError::UnsupportedFormat(format!(
            "PDF {} contains no page images",
            path.display()
        )));
    }

    Ok(pages)
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object.as_reference() {
        Ok(id) => doc.get_object(id).ok(),
        Err(_) => Some(object),
    }
}

/// Image XObjects reachable from a page's (possibly inherited) resources
fn page_image_streams(doc: &Document, page_id: ObjectId) -> Vec<(ObjectId, &Stream)> {
    let mut node = doc.get_dictionary(page_id).ok();
    let mut resources = None;

    for _ in 0..MAX_INHERITANCE_DEPTH {
        let Some(dict) = node else { break };
        if let Some(found) = dict
            .get(b"Resources")
            .ok()
            .and_then(|r| resolve(doc, r))
            .and_then(|r| r.as_dict().ok())
        {
            resources = Some(found);
            break;
        }
        node = dict
            .get(b"Parent")
            .ok()
            .and_then(|p| p.as_reference().ok())
            .and_then(|id| doc.get_dictionary(id).ok());
    }

    let Some(xobjects) = resources
        .and_then(|r| r.get(b"XObject").ok())
        .and_then(|x| resolve(doc, x))
        .and_then(|x| x.as_dict().ok())
    else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(_, value)| {
            let id = value.as_reference().ok()?;
            let stream = doc.get_object(id).ok()?.as_stream().ok()?;
            let is_image = stream
                .dict
                .get(b"Subtype")
                .and_then(|s| s.as_name())
                .map(|name| name == b"Image")
                .unwrap_or(false);
            is_image.then_some((id, stream))
        })
        .collect()
}

fn has_filter(stream: &Stream, filter: &[u8]) -> bool {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => name.as_slice() == filter,
        Ok(Object::Array(filters)) => filters
            .iter()
            .any(|f| f.as_name().map(|n| n == filter).unwrap_or(false)),
        _ => false,
    }
}

fn dimension(stream: &Stream, key: &[u8]) -> Result<u32, OcrError> {
    stream
        .dict
        .get(key)
        .ok()
        .and_then(|v| v.as_i64().ok())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| {
            OcrError::ProcessingError(format!(
                "Missing image {}",
                String::from_utf8_lossy(key)
            ))
        })
}

fn decode_image(doc: &Document, stream: &Stream) -> Result<DynamicImage, OcrError> {
    // JPEG streams are complete image files
    if has_filter(stream, b"DCTDecode") {
        return image::load_from_memory(&stream.content)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to decode JPEG image: {}", e)));
    }

    let width = dimension(stream, b"Width")?;
    let height = dimension(stream, b"Height")?;
    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|b| b.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return Err(OcrError::ProcessingError(format!(
            "Unsupported bits per component: {}",
            bits
        )));
    }

    let data = if stream.dict.has(b"Filter") {
        stream
            .decompressed_content()
            .map_err(|e| OcrError::ProcessingError(format!("Failed to decompress image: {}", e)))?
    } else {
        stream.content.clone()
    };

    let pixels = width as usize * height as usize;
    let space = color_space(doc, stream);
    let invalid = || OcrError::ProcessingError(format!("Invalid {} image data", space));

    match space.as_str() {
        "DeviceGray" | "CalGray" => {
            image::GrayImage::from_raw(width, height, truncate(data, pixels))
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(invalid)
        }
        "DeviceRGB" | "CalRGB" | "ICCBased" => {
            image::RgbImage::from_raw(width, height, truncate(data, pixels * 3))
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(invalid)
        }
        "DeviceCMYK" => {
            let rgb: Vec<u8> = data
                .chunks_exact(4)
                .take(pixels)
                .flat_map(|cmyk| {
                    let k = 1.0 - f32::from(cmyk[3]) / 255.0;
                    [0, 1, 2].map(|i| ((1.0 - f32::from(cmyk[i]) / 255.0) * k * 255.0) as u8)
                })
                .collect();
            image::RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(invalid)
        }
        other => Err(OcrError::ProcessingError(format!(
            "Unsupported color space: {}",
            other
        ))),
    }
}

fn truncate(mut data: Vec<u8>, len: usize) -> Vec<u8> {
    data.truncate(len);
    data
}

/// Name of the stream's color space; arrays like `[/ICCBased ref]` yield their first name
fn color_space(doc: &Document, stream: &Stream) -> String {
    let Some(object) = stream
        .dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|cs| resolve(doc, cs))
    else {
        return "DeviceRGB".to_string();
    };

    let name = match object {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(items) => items.first().and_then(|first| first.as_name().ok()),
        _ => None,
    };

    name.map(|n| String::from_utf8_lossy(n).into_owned())
        .unwrap_or_else(|| "DeviceRGB".to_string())
}
