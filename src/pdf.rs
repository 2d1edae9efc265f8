use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use jpeg_to_pdf::JpegToPdf;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};

/// Writes one PDF page per image, in the given order.
#[instrument(skip_all, fields(pages = images.len(), output = %output.display()))]
pub fn compose(images: &[PathBuf], output: &Path) -> Result<()> {
    let assembly_error = |reason: String| Error::Assembly {
        path: output.to_path_buf(),
        reason,
    };
    if images.is_empty() {
        return Err(assembly_error("no pages to compose".into()));
    }

    let mut pdf = JpegToPdf::new();
    for image_path in images {
        pdf = pdf.add_image(to_jpeg(image_path).map_err(|e| {
            assembly_error(format!("{}: {}", image_path.display(), e))
        })?);
    }

    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    pdf.create_pdf(&mut writer)
        .map_err(|e| assembly_error(e.to_string()))?;
    writer.flush()?;

    info!("PDF written with {} pages", images.len());
    Ok(())
}

/// Re-encodes any supported image as a baseline RGB JPEG.
fn to_jpeg(path: &Path) -> image::ImageResult<Vec<u8>> {
    let decoded = image::open(path)?;
    debug!(
        "decoded {} ({}x{})",
        path.display(),
        decoded.width(),
        decoded.height()
    );
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) fn page_count(pdf: &[u8]) -> usize {
    let re = regex::bytes::Regex::new(r"/Type\s*/Page\b").unwrap();
    re.find_iter(pdf).count()
}

/// Widths of the embedded page images, in document order.
#[cfg(test)]
pub(crate) fn image_widths(pdf: &[u8]) -> Vec<u32> {
    let re = regex::bytes::Regex::new(r"/Width\s+(\d+)").unwrap();
    re.captures_iter(pdf)
        .map(|caps| std::str::from_utf8(&caps[1]).unwrap().parse().unwrap())
        .collect()
}
