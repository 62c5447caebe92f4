//! Core of unified document-text extraction: one data model, one backend
//! contract, and a page-parallel dispatcher shared by every backend.

pub mod aggregate;
pub mod bridge;
pub mod config_file;
pub mod coordinates;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod models;
pub mod options;
pub mod process;
pub mod protocol;
pub mod search;
pub mod source;
pub mod unit;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export for convenience
pub use aggregate::Aggregator;
pub use bridge::{PageStream, extract_async, stream_pages};
pub use coordinates::{
    CoordinateConverter, CoordinateError, POINTS_PER_INCH, PageContext, convert, convert_page,
};
pub use dispatch::{ExecutorKind, ExtractOptions, ProgressEvent, ProgressFn, extract};
pub use error::{ErrorKind, ExtractError, PageError};
pub use geometry::{flat_to_points, polygon_to_bbox_and_rotation};
pub use models::{
    BBox, CoordinateInfo, CoordinateUnit, Document, ExtractionResult, ExtractorKind,
    ExtractorMetadata, FontInfo, Page, PageExtractionResult, Table, TableCell, TableError,
    TextBlock,
};
pub use options::{CharacterMerger, DEFAULT_DPI, ExtractorOptions, ExtractorSpec};
pub use process::{WORKER_BIN_ENV, WorkerCommand};
pub use search::{Pattern, SearchOptions, SearchResult};
pub use source::{ImageFormat, SourceFormat};
pub use unit::{Concurrency, ExtractionUnit, Resource, ScopedUnit};
