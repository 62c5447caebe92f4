//! Process-pool worker: serves one extraction unit over stdin/stdout.

use std::io::{BufRead, Write};

use unifex_core::{ExtractError, ExtractionUnit, process};

use crate::Extractor;

/// Serve the worker protocol, opening the unit with [`Extractor::open`].
pub fn serve<R: BufRead, W: Write>(input: R, output: W) -> Result<(), ExtractError> {
    process::serve(input, output, |spec| {
        tracing::debug!(path = %spec.source.display(), kind = %spec.kind, "worker opening unit");
        Ok(Box::new(Extractor::open(spec)?) as Box<dyn ExtractionUnit>)
    })
}

/// Serve the worker protocol on the process's own stdin and stdout.
pub fn serve_stdio() -> Result<(), ExtractError> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(stdin.lock(), stdout.lock())
}
