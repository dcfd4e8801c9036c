//! Media port: thin `ffmpeg`/`ffprobe` subprocess wrappers for probing a
//! video and cutting it into time-range chunks. No media decoding happens
//! in-process; everything shells out.

pub mod cut;
pub mod error;
pub mod probe;

pub use cut::cut;
pub use error::{MediaError, MediaResult};
pub use probe::{probe, VideoInfo};
