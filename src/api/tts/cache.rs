use std::fs;
use std::path::{Path, PathBuf};

use super::types::AudioItem;
use crate::error::SpeakerError;

/// Characters of the source text kept in a cached file name
const NAME_TEXT_CHARS: usize = 24;

/// Writes every fetched clip to disk, named by fetch time and text
pub struct AudioCache {
    dir: PathBuf,
}

impl AudioCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store(&self, item: &AudioItem) -> Result<PathBuf, SpeakerError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name(item));
        fs::write(&path, &item.data)?;
        tracing::debug!(id = item.id, path = %path.display(), "clip cached");
        Ok(path)
    }
}

fn file_name(item: &AudioItem) -> String {
    let stamp = chrono::Local::now().format("%Y_%m_%d_%H_%M_%S");
    let text: String = item
        .text
        .chars()
        .take(NAME_TEXT_CHARS)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}_{}.{}", stamp, item.id, text, item.format.extension())
}
