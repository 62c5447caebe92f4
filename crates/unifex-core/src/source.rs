//! Source file-type detection, run once when a backend opens.

use std::io::Read;
use std::path::Path;

use crate::error::ExtractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Image(ImageFormat),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Tiff,
    Bmp,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Tiff => "image/tiff",
            Self::Bmp => "image/bmp",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}

impl SourceFormat {
    pub fn is_pdf(&self) -> bool {
        matches!(self, Self::Pdf)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Image(img) => img.mime_type(),
        }
    }
}

/// Sniff the leading bytes of a file.
pub fn sniff(header: &[u8]) -> Option<SourceFormat> {
    // PDF allows up to 1 KiB of junk before the header.
    let window = &header[..header.len().min(1024)];
    if window.windows(5).any(|w| w == b"%PDF-") {
        return Some(SourceFormat::Pdf);
    }
    let image = if header.starts_with(b"\x89PNG\r\n\x1a\n") {
        ImageFormat::Png
    } else if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ImageFormat::Jpeg
    } else if header.starts_with(b"II*\0") || header.starts_with(b"MM\0*") {
        ImageFormat::Tiff
    } else if header.starts_with(b"BM") {
        ImageFormat::Bmp
    } else if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
        ImageFormat::Gif
    } else if header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"WEBP" {
        ImageFormat::Webp
    } else {
        return None;
    };
    Some(SourceFormat::Image(image))
}

fn from_extension(path: &Path) -> Option<SourceFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let format = match ext.as_str() {
        "pdf" => SourceFormat::Pdf,
        "png" => SourceFormat::Image(ImageFormat::Png),
        "jpg" | "jpeg" => SourceFormat::Image(ImageFormat::Jpeg),
        "tif" | "tiff" => SourceFormat::Image(ImageFormat::Tiff),
        "bmp" => SourceFormat::Image(ImageFormat::Bmp),
        "gif" => SourceFormat::Image(ImageFormat::Gif),
        "webp" => SourceFormat::Image(ImageFormat::Webp),
        _ => return None,
    };
    Some(format)
}

/// Detect a source's format from its content, falling back to the extension.
///
/// An unreadable file is a [`ExtractError::BackendInit`]; a readable file of
/// no known format is [`ExtractError::UnsupportedSource`].
pub fn detect(path: &Path) -> Result<SourceFormat, ExtractError> {
    let mut file = std::fs::File::open(path).map_err(|e| {
        ExtractError::BackendInit(format!("cannot open {}: {e}", path.display()))
    })?;
    let mut header = Vec::with_capacity(1024);
    file.by_ref()
        .take(1024)
        .read_to_end(&mut header)
        .map_err(|e| ExtractError::BackendInit(format!("cannot read {}: {e}", path.display())))?;

    sniff(&header)
        .or_else(|| from_extension(path))
        .ok_or_else(|| ExtractError::UnsupportedSource {
            path: path.to_path_buf(),
            reason: "not a PDF or a supported image format".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_pdf_and_images() {
        assert_eq!(sniff(b"%PDF-1.7\n..."), Some(SourceFormat::Pdf));
        assert_eq!(sniff(b"\n\n%PDF-1.4"), Some(SourceFormat::Pdf));
        assert_eq!(
            sniff(b"\x89PNG\r\n\x1a\n\0\0"),
            Some(SourceFormat::Image(ImageFormat::Png))
        );
        assert_eq!(
            sniff(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(SourceFormat::Image(ImageFormat::Jpeg))
        );
        assert_eq!(
            sniff(b"RIFF\0\0\0\0WEBPVP8 "),
            Some(SourceFormat::Image(ImageFormat::Webp))
        );
        assert_eq!(sniff(b"hello world"), None);
    }

    #[test]
    fn test_detect_falls_back_to_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.TIFF");
        std::fs::write(&path, b"not really sniffable").unwrap();
        assert_eq!(detect(&path).unwrap(), SourceFormat::Image(ImageFormat::Tiff));
    }

    #[test]
    fn test_detect_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(matches!(detect(&path), Err(ExtractError::UnsupportedSource { .. })));
    }

    #[test]
    fn test_detect_missing_file_is_init_error() {
        let err = detect(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::BackendInit(_)));
    }
}
