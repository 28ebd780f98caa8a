use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::constants::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS, VOICE_EXTENSIONS};

/// Kind of media file handled by the upload and output directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Voice,
    Video,
}

impl MediaKind {
    /// Subdirectory name under the upload and output roots.
    pub fn dir_name(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Voice => "voice",
            MediaKind::Video => "video",
        }
    }

    /// Extension (with leading dot) used when an upload has none.
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => ".png",
            MediaKind::Voice => ".mp3",
            MediaKind::Video => ".mp4",
        }
    }

    /// Accepted extensions, lowercase and without the dot.
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => IMAGE_EXTENSIONS,
            MediaKind::Voice => VOICE_EXTENSIONS,
            MediaKind::Video => VIDEO_EXTENSIONS,
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.dir_name())
    }
}
