pub mod block;
pub mod codec;
pub mod components;
pub mod config;
pub mod error;
pub mod filter;
pub mod io;
pub mod macros;
pub mod model;
pub mod predictor;
pub mod sha1;
pub mod state_table;
pub mod tables;
pub mod vm;

mod coder;

pub use block::{Compressor, Decompresser, SegmentCheck, SegmentInfo};
pub use codec::{compress, compress_parallel, decompress, CompressOptions, ExecMode, Method};
pub use error::{Error, Result};
pub use filter::Filter;
pub use model::{Level, Model};
