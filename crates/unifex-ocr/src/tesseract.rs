use std::path::PathBuf;
use std::process::Command;

use image::RgbImage;

use unifex_core::{ExtractorKind, ExtractorOptions};

use crate::engine::{Detection, OcrEngine, OcrError};
use crate::languages;

/// Credential key overriding the tesseract binary.
pub const TESSERACT_CMD_ENV: &str = "TESSERACT_CMD";

/// Word-level rows in Tesseract's TSV output.
const WORD_LEVEL: u32 = 5;

/// Local Tesseract, driven through its command-line interface.
///
/// Every call runs its own process, so the engine is safe to share across
/// worker threads.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: PathBuf,
    languages: Vec<String>,
}

impl TesseractEngine {
    /// Locate the binary and check that it runs.
    pub fn new(options: &ExtractorOptions) -> Result<Self, OcrError> {
        let command = PathBuf::from(
            options
                .credential(TESSERACT_CMD_ENV)
                .unwrap_or_else(|| "tesseract".to_string()),
        );
        let check = Command::new(&command).arg("--version").output().map_err(|e| {
            OcrError::Unavailable(format!("cannot run {}: {e}", command.display()))
        })?;
        if !check.status.success() {
            return Err(OcrError::Unavailable(format!(
                "{} --version exited with {}",
                command.display(),
                check.status
            )));
        }
        let version = String::from_utf8_lossy(&check.stdout);
        tracing::debug!(
            command = %command.display(),
            version = version.lines().next().unwrap_or("").trim(),
            "tesseract available"
        );

        let languages = languages::tesseract_arg(&options.languages)
            .split('+')
            .map(str::to_string)
            .collect();
        Ok(Self { command, languages })
    }
}

impl OcrEngine for TesseractEngine {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Tesseract
    }

    fn name(&self) -> &str {
        "tesseract"
    }

    fn languages(&self) -> Vec<String> {
        self.languages.clone()
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, OcrError> {
        let input = tempfile::Builder::new()
            .prefix("unifex-ocr-")
            .suffix(".png")
            .tempfile()?;
        image.save_with_format(input.path(), image::ImageFormat::Png)?;

        let output = Command::new(&self.command)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(self.languages.join("+"))
            .arg("tsv")
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        parse_tsv(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `tesseract ... tsv` output into word detections.
///
/// Only word rows with text and a non-negative confidence are kept.
fn parse_tsv(tsv: &str) -> Result<Vec<Detection>, OcrError> {
    let mut detections = Vec::new();
    for (line_no, line) in tsv.lines().enumerate() {
        if line_no == 0 && line.starts_with("level") {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.splitn(12, '\t').collect();
        if fields.len() < 11 {
            return Err(OcrError::Parse(format!(
                "line {}: expected 12 columns, found {}",
                line_no + 1,
                fields.len()
            )));
        }
        let number = |i: usize| -> Result<f64, OcrError> {
            fields[i].trim().parse::<f64>().map_err(|_| {
                OcrError::Parse(format!("line {}: bad number {:?}", line_no + 1, fields[i]))
            })
        };

        if number(0)? as u32 != WORD_LEVEL {
            continue;
        }
        let confidence = number(10)?;
        let text = fields.get(11).map(|t| t.trim()).unwrap_or("");
        if confidence < 0.0 || text.is_empty() {
            continue;
        }
        let (left, top, width, height) = (number(6)?, number(7)?, number(8)?, number(9)?);
        detections.push(Detection::rect(
            text,
            left,
            top,
            left + width,
            top + height,
            (confidence / 100.0).clamp(0.0, 1.0),
        ));
    }
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t1700\t2200\t-1\t
2\t1\t1\t0\t0\t0\t200\t190\t420\t60\t-1\t
4\t1\t1\t1\t1\t0\t200\t190\t420\t60\t-1\t
5\t1\t1\t1\t1\t1\t200\t190\t180\t60\t96.5\tHello
5\t1\t1\t1\t1\t2\t400\t192\t220\t58\t91\tWorld
5\t1\t1\t1\t1\t3\t640\t192\t10\t58\t95\t
5\t1\t1\t1\t1\t4\t660\t192\t10\t58\t-1\tnoise
";

    #[test]
    fn keeps_scored_words_only() {
        let detections = parse_tsv(SAMPLE).unwrap();
        let texts: Vec<_> = detections.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, ["Hello", "World"]);
    }

    #[test]
    fn converts_geometry_and_confidence() {
        let detections = parse_tsv(SAMPLE).unwrap();
        let hello = &detections[0];
        assert_eq!(hello.polygon[0], [200.0, 190.0]);
        assert_eq!(hello.polygon[2], [380.0, 250.0]);
        assert!((hello.confidence - 0.965).abs() < 1e-9);
    }

    #[test]
    fn empty_output_has_no_detections() {
        assert!(parse_tsv("").unwrap().is_empty());
    }

    #[test]
    fn malformed_row_is_a_parse_error() {
        let err = parse_tsv("5\t1\t1\n").unwrap_err();
        assert!(matches!(err, OcrError::Parse(_)));
    }
}
