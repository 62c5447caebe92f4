//! ISO 639-1 to Tesseract language code translation.

use std::collections::HashMap;

use once_cell::sync::Lazy;

static TESSERACT_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("ar", "ara"),
        ("cs", "ces"),
        ("da", "dan"),
        ("de", "deu"),
        ("el", "ell"),
        ("en", "eng"),
        ("es", "spa"),
        ("fi", "fin"),
        ("fr", "fra"),
        ("he", "heb"),
        ("hi", "hin"),
        ("hu", "hun"),
        ("it", "ita"),
        ("ja", "jpn"),
        ("ko", "kor"),
        ("nl", "nld"),
        ("no", "nor"),
        ("pl", "pol"),
        ("pt", "por"),
        ("ro", "ron"),
        ("ru", "rus"),
        ("sv", "swe"),
        ("th", "tha"),
        ("tr", "tur"),
        ("uk", "ukr"),
        ("vi", "vie"),
        ("zh", "chi_sim"),
    ])
});

/// Translate one ISO 639-1 code. Unknown codes pass through unchanged, so
/// callers may also give Tesseract codes directly.
pub fn to_tesseract(code: &str) -> String {
    let lower = code.trim().to_ascii_lowercase();
    match TESSERACT_CODES.get(lower.as_str()) {
        Some(mapped) => (*mapped).to_string(),
        None => lower,
    }
}

/// The `-l` argument for a language list: `eng+fra`.
pub fn tesseract_arg(codes: &[String]) -> String {
    let mut seen = Vec::new();
    for code in codes.iter().map(|c| to_tesseract(c)).filter(|c| !c.is_empty()) {
        if !seen.contains(&code) {
            seen.push(code);
        }
    }
    if seen.is_empty() {
        "eng".to_string()
    } else {
        seen.join("+")
    }
}
