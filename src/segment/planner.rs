//! Segment planner - pure arithmetic over runtime and segment length
//!
//! The playlist generator and the progress tracker both derive their segment
//! boundaries from [`plan_segments`], so the two can never disagree on how
//! many segments exist or how long the last one is.

/// Segment layout of one source file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPlan {
    /// Source runtime in seconds
    pub runtime_secs: f64,
    /// Fixed segment length in seconds
    pub segment_length_secs: u32,
    /// Number of segments, including a trailing partial one
    pub segment_count: u32,
    /// Duration of the last segment in seconds
    pub final_segment_duration: f64,
}

/// Compute segment count and final segment duration.
///
/// `segment_count = floor(runtime / length)`, plus one when a remainder is
/// left over; the final duration is that remainder, or the full length when
/// the runtime divides evenly.
///
/// # Panics
///
/// Panics if `runtime_secs` is not a positive finite number or
/// `segment_length_secs` is zero.
pub fn plan_segments(runtime_secs: f64, segment_length_secs: u32) -> SegmentPlan {
    assert!(
        runtime_secs.is_finite() && runtime_secs > 0.0,
        "runtime must be positive, got {}",
        runtime_secs
    );
    assert!(segment_length_secs > 0, "segment length must be positive");

    let length = segment_length_secs as f64;
    let full_segments = (runtime_secs / length).floor();
    let remainder = runtime_secs - full_segments * length;

    let (segment_count, final_segment_duration) = if remainder > 0.0 {
        (full_segments as u32 + 1, remainder)
    } else {
        (full_segments as u32, length)
    };

    SegmentPlan {
        runtime_secs,
        segment_length_secs,
        segment_count,
        final_segment_duration,
    }
}

/// Segment an encode should start at so that `requested_secs` is covered.
///
/// The requested time is backed off by one full segment (clamped at zero)
/// because the encoder cannot cut precisely on arbitrary timestamps.
pub fn start_segment_for(requested_secs: f64, segment_length_secs: u32) -> u32 {
    assert!(segment_length_secs > 0, "segment length must be positive");
    let length = segment_length_secs as f64;
    let backed_off = (requested_secs - length).max(0.0);
    (backed_off / length).floor().max(0.0) as u32
}

impl SegmentPlan {
    /// Duration of segment `index`
    pub fn segment_duration(&self, index: u32) -> f64 {
        if index + 1 == self.segment_count {
            self.final_segment_duration
        } else {
            self.segment_length_secs as f64
        }
    }

    /// Source timestamp at which segment `index` begins, never past the
    /// start of the final segment
    pub fn start_time_of(&self, index: u32) -> f64 {
        let last = self.segment_count.saturating_sub(1);
        (index.min(last) as f64) * self.segment_length_secs as f64
    }

    /// Exclusive end of the completed segment range at source position
    /// `position_secs`.
    ///
    /// Returns `floor(position / length)`, clamped to `segment_count`; at or
    /// past the runtime every segment is complete.
    pub fn completed_segment_for(&self, position_secs: f64) -> u32 {
        if position_secs >= self.runtime_secs {
            return self.segment_count;
        }
        let index = (position_secs / self.segment_length_secs as f64).floor();
        if index <= 0.0 {
            0
        } else {
            (index as u32).min(self.segment_count)
        }
    }

    /// Clamp a segment index into the playlist
    pub fn clamp_index(&self, index: u32) -> u32 {
        index.min(self.segment_count.saturating_sub(1))
    }

    /// Iterate `(index, duration)` over every segment
    pub fn durations(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        (0..self.segment_count).map(move |i| (i, self.segment_duration(i)))
    }
}
