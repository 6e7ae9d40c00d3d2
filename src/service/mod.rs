pub mod consumer;
pub mod detector;
pub mod ingest;
pub mod processor;
pub mod watcher;

pub use consumer::{ConsumeError, Consumer, SessionOutcome};
pub use detector::ChangeDetector;
pub use ingest::{IngestError, IngestPipeline, IngestReport};
pub use processor::{process_message, square, FileProcessor, ProcessError, ProcessedFile};
pub use watcher::{PollReport, SharedStatus, WatchError, WatchStatus, Watcher};
