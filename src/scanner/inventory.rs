use lofty::prelude::*;
use serde::Serialize;
use std::path::Path;

use super::{LabelMode, ScanError};

/// Per-class track counts for one dataset root.
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    pub mode: LabelMode,
    pub classes: Vec<ClassInventory>,
    /// Files at track level skipped for their extension.
    pub unsupported: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassInventory {
    pub label: usize,
    pub name: String,
    pub tracks: usize,
    /// Sum of the durations that could be read from the files' properties.
    pub total_secs: f64,
    /// Tracks shorter than the configured track duration; their late
    /// segments will not survive extraction.
    pub short_tracks: usize,
    /// Tracks whose duration could not be read.
    pub unknown_duration: usize,
}

impl Inventory {
    pub fn total_tracks(&self) -> usize {
        self.classes.iter().map(|c| c.tracks).sum()
    }
}

/// List classes and their tracks without decoding any audio.
///
/// Walks the root the same way extraction does, so labels line up with the
/// indices an extraction run would assign.
pub fn take_inventory(
    root: &Path,
    mode: LabelMode,
    track_duration: f64,
) -> Result<Inventory, ScanError> {
    let traversal = super::walk(root, mode)?;

    let mut classes: Vec<ClassInventory> = traversal
        .mapping
        .names()
        .iter()
        .enumerate()
        .map(|(label, name)| ClassInventory {
            label,
            name: name.clone(),
            tracks: 0,
            total_secs: 0.0,
            short_tracks: 0,
            unknown_duration: 0,
        })
        .collect();

    for track in &traversal.tracks {
        let class = &mut classes[track.label];
        class.tracks += 1;
        match read_duration(&track.path) {
            Some(secs) => {
                class.total_secs += secs;
                if secs < track_duration {
                    class.short_tracks += 1;
                }
            }
            None => class.unknown_duration += 1,
        }
    }

    Ok(Inventory {
        mode,
        classes,
        unsupported: traversal.unsupported,
    })
}

/// Duration in seconds from the file's audio properties. `None` if the file
/// cannot be parsed or reports no duration.
pub fn read_duration(path: &Path) -> Option<f64> {
    let tagged_file = match lofty::read_from_path(path) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("Could not read properties from {}: {}", path.display(), e);
            return None;
        }
    };

    let secs = tagged_file.properties().duration().as_secs_f64();
    if secs > 0.0 { Some(secs) } else { None }
}
