//! Wire protocol between the dispatcher and process-pool workers.
//!
//! Newline-delimited JSON. The parent writes [`Request`]s to the worker's
//! stdin and reads [`Response`]s from its stdout:
//!
//! ```text
//! parent -> worker   {"type":"open","spec":{...}}
//! worker -> parent   {"type":"ready","page_count":5} | {"type":"fatal",...}
//! parent -> worker   {"type":"page","index":3}
//! worker -> parent   {"type":"result","result":{...}}
//! ```
//!
//! Closing the worker's stdin asks it to close its unit and exit.

use std::io::{self, BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::models::PageExtractionResult;
use crate::options::ExtractorSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Open { spec: ExtractorSpec },
    Page { index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ready { page_count: usize },
    Fatal { kind: ErrorKind, message: String },
    Result { result: PageExtractionResult },
}

pub fn write_message<W: Write, T: Serialize>(out: &mut W, message: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *out, message)?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Read the next message; `None` at end of stream. Blank lines are skipped.
pub fn read_message<R: BufRead, T: DeserializeOwned>(input: &mut R) -> io::Result<Option<T>> {
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            break;
        }
    }
    serde_json::from_str(&line)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
