//! Segment module
//!
//! This module handles segment bookkeeping for HLS output:
//! - Segment count / duration planning from the source runtime
//! - Mapping playback positions and encoder progress to segment indices
//! - Recovering already written segments from an output directory

pub mod planner;
pub mod probe;

pub use planner::{plan_segments, start_segment_for, SegmentPlan};
pub use probe::{DiskSegmentProbe, SegmentProbe};

use serde::{Deserialize, Serialize};

/// Container the HLS muxer writes segments in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentContainer {
    /// MPEG transport stream (`.ts`)
    MpegTs,
    /// Fragmented MP4 with an init segment (`.mp4`)
    Fmp4,
}

impl SegmentContainer {
    /// File extension used for segments
    pub fn extension(&self) -> &'static str {
        match self {
            SegmentContainer::MpegTs => "ts",
            SegmentContainer::Fmp4 => "mp4",
        }
    }

    /// Value for the muxer's `hls_segment_type` option
    pub fn muxer_segment_type(&self) -> &'static str {
        match self {
            SegmentContainer::MpegTs => "mpegts",
            SegmentContainer::Fmp4 => "fmp4",
        }
    }

    /// HLS protocol version the playlist must declare
    pub fn hls_version(&self) -> u8 {
        match self {
            SegmentContainer::MpegTs => 3,
            SegmentContainer::Fmp4 => 7,
        }
    }

    /// MIME type of a media segment
    pub fn mime_type(&self) -> &'static str {
        match self {
            SegmentContainer::MpegTs => "video/mp2t",
            SegmentContainer::Fmp4 => "video/mp4",
        }
    }

    pub fn has_init_segment(&self) -> bool {
        matches!(self, SegmentContainer::Fmp4)
    }
}

/// File name of segment `index` for a name stem
pub fn segment_file_name(stem: &str, index: u32, container: SegmentContainer) -> String {
    format!("{}{}.{}", stem, index, container.extension())
}

/// File name of the fMP4 initialization segment for a name stem
pub fn init_file_name(stem: &str, container: SegmentContainer) -> String {
    format!("{}-1.{}", stem, container.extension())
}
