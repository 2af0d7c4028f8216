//! Playlist generation module
//!
//! This module renders the HLS media playlist served for a session:
//! - Fixed target duration equal to the segment length
//! - One `#EXTINF` entry per planned segment, the last one possibly shorter
//! - `#EXT-X-MAP` for fragmented MP4 output

pub mod variant;

pub use variant::build_playlist;
