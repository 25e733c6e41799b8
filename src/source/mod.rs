//! File tailing: line extraction, per-file reader tasks, the reader pool,
//! and the glob scanner that discovers files and opens them at their
//! checkpointed positions.

mod line_reader;
mod pool;
mod reader;
mod scanner;

pub use line_reader::{Line, LineReader};
pub use pool::ReaderPool;
pub use reader::{FileReader, ReaderHandle, ReaderOptions, DEFAULT_CHUNK_SIZE};
pub use scanner::Scanner;
