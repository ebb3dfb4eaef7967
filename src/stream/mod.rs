pub mod classify;
pub mod decoder;
pub mod ingest;
pub mod types;
pub mod utils;

pub use classify::{DEFAULT_ERROR_MESSAGE, classify, detect_kind};
pub use decoder::FrameDecoder;
pub use ingest::{Ingest, Terminal};
pub use types::{ClassifiedEvent, EventKind, Frame, ProgressEvent, ScreenshotEvent, StreamError, StreamResult};
pub use utils::{normalize_image_source, sniff_image_mime, to_data_uri};
