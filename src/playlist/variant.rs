//! Variant playlist generator
//!
//! Renders the VOD media playlist for one transcode session. The text only
//! depends on the segment plan, so it can be served before the encoder has
//! caught up.

use crate::segment::{init_file_name, segment_file_name, SegmentContainer, SegmentPlan};

/// Build the media playlist for `name_stem`.
///
/// Every segment URI carries `?token=<token>` so segment requests can be
/// routed back to the session.
pub fn build_playlist(
    name_stem: &str,
    plan: &SegmentPlan,
    token: &str,
    container: SegmentContainer,
) -> String {
    let mut output = String::new();

    // Header
    output.push_str("#EXTM3U\n");
    output.push_str(&format!("#EXT-X-VERSION:{}\n", container.hls_version()));
    output.push_str(&format!(
        "#EXT-X-TARGETDURATION:{}\n",
        plan.segment_length_secs
    ));
    output.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");

    if container.has_init_segment() {
        output.push_str(&format!(
            "#EXT-X-MAP:URI=\"{}?token={}\"\n",
            init_file_name(name_stem, container),
            token
        ));
    }

    for (index, duration) in plan.durations() {
        output.push_str(&format!("#EXTINF:{:.4}, nodesc\n", duration));
        output.push_str(&format!(
            "{}?token={}\n",
            segment_file_name(name_stem, index, container),
            token
        ));
    }

    output.push_str("#EXT-X-ENDLIST\n");

    output
}
