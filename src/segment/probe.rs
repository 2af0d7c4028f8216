//! Disk segment probe - recovers already written segments from a directory

use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;

use super::SegmentContainer;
use crate::error::{HlsError, Result};

/// Reports which segment indices already exist in an output directory.
///
/// Kept behind a trait so the orchestrator does not depend on the file
/// naming convention.
pub trait SegmentProbe: Send + Sync {
    fn existing_segments(
        &self,
        output_dir: &Path,
        name_stem: &str,
        container: SegmentContainer,
    ) -> Result<BTreeSet<u32>>;
}

/// Probe for files named `<stem><index>.<ext>`
#[derive(Debug, Default, Clone)]
pub struct DiskSegmentProbe;

impl DiskSegmentProbe {
    pub fn new() -> Self {
        Self
    }

    fn pattern(name_stem: &str, container: SegmentContainer) -> Result<Regex> {
        let pattern = format!(
            r"^{}(\d+)\.{}$",
            regex::escape(name_stem),
            regex::escape(container.extension())
        );
        Regex::new(&pattern).map_err(|e| HlsError::Probe(format!("bad segment pattern: {}", e)))
    }
}

impl SegmentProbe for DiskSegmentProbe {
    fn existing_segments(
        &self,
        output_dir: &Path,
        name_stem: &str,
        container: SegmentContainer,
    ) -> Result<BTreeSet<u32>> {
        let mut found = BTreeSet::new();

        let entries = match std::fs::read_dir(output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };

        let re = Self::pattern(name_stem, container)?;

        for entry in entries {
            let entry = entry?;
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !metadata.is_file() || metadata.len() == 0 {
                continue;
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };

            if let Some(index) = re
                .captures(name)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
            {
                found.insert(index);
            }
        }

        tracing::debug!(
            "Probed {:?} for '{}': {} segment(s) on disk",
            output_dir,
            name_stem,
            found.len()
        );

        Ok(found)
    }
}
