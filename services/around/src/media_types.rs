use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Coarse classification of attached media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Image,
    Video,
    Unknown,
}

impl MediaCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unrecognized media category: {other}")),
        }
    }
}

/// Suffix to category mapping.
///
/// Matching is exact and case-sensitive: `cat.PNG` is `unknown` with the
/// default table. The table is built once and injected into the ingestion
/// coordinator.
#[derive(Debug, Clone)]
pub struct MediaCategoryTable {
    entries: HashMap<String, MediaCategory>,
}

impl MediaCategoryTable {
    /// Build a table from `(suffix, category)` pairs. Suffixes include the dot.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, MediaCategory)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(s, c)| (s.into(), c)).collect(),
        }
    }

    /// Category for a filename, `Unknown` when the suffix is absent or unmapped
    pub fn categorize(&self, filename: &str) -> MediaCategory {
        file_suffix(filename)
            .and_then(|suffix| self.entries.get(suffix).copied())
            .unwrap_or(MediaCategory::Unknown)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MediaCategoryTable {
    fn default() -> Self {
        use MediaCategory::{Image, Video};

        Self::new([
            (".jpeg", Image),
            (".jpg", Image),
            (".gif", Image),
            (".png", Image),
            (".mov", Video),
            (".mp4", Video),
            (".avi", Video),
            (".flv", Video),
            (".wmv", Video),
        ])
    }
}

/// Suffix of the final path component, starting at its last dot.
///
/// `photos/cat.png` -> `.png`, `archive.tar.gz` -> `.gz`, `README` -> none.
pub fn file_suffix(filename: &str) -> Option<&str> {
    let name = filename.rsplit(&['/', '\\'][..]).next().unwrap_or(filename);
    name.rfind('.').map(|idx| &name[idx..])
}

/// Content type stored alongside the object so public reads render inline
pub fn content_type_for(filename: &str) -> &'static str {
    match file_suffix(filename).map(str::to_ascii_lowercase).as_deref() {
        Some(".jpeg") | Some(".jpg") => "image/jpeg",
        Some(".png") => "image/png",
        Some(".gif") => "image/gif",
        Some(".mov") => "video/quicktime",
        Some(".mp4") => "video/mp4",
        Some(".avi") => "video/x-msvideo",
        Some(".flv") => "video/x-flv",
        Some(".wmv") => "video/x-ms-wmv",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_maps_every_listed_suffix() {
        let table = MediaCategoryTable::default();

        for name in ["a.jpeg", "a.jpg", "a.gif", "a.png"] {
            assert_eq!(table.categorize(name), MediaCategory::Image, "{name}");
        }
        for name in ["a.mov", "a.mp4", "a.avi", "a.flv", "a.wmv"] {
            assert_eq!(table.categorize(name), MediaCategory::Video, "{name}");
        }
        assert_eq!(table.len(), 9);
    }

    #[test]
    fn test_unmapped_and_missing_suffix_is_unknown() {
        let table = MediaCategoryTable::default();
        assert_eq!(table.categorize("notes.txt"), MediaCategory::Unknown);
        assert_eq!(table.categorize("README"), MediaCategory::Unknown);
        assert_eq!(table.categorize(""), MediaCategory::Unknown);
        assert_eq!(table.categorize("dir.png/file"), MediaCategory::Unknown);
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let table = MediaCategoryTable::default();
        assert_eq!(table.categorize("cat.PNG"), MediaCategory::Unknown);
        assert_eq!(table.categorize("clip.Mp4"), MediaCategory::Unknown);
    }

    #[test]
    fn test_injected_table() {
        let table = MediaCategoryTable::new([(".webp", MediaCategory::Image)]);
        assert_eq!(table.categorize("x.webp"), MediaCategory::Image);
        assert_eq!(table.categorize("x.png"), MediaCategory::Unknown);
    }

    #[test]
    fn test_file_suffix() {
        assert_eq!(file_suffix("cat.png"), Some(".png"));
        assert_eq!(file_suffix("photos/cat.png"), Some(".png"));
        assert_eq!(file_suffix("archive.tar.gz"), Some(".gz"));
        assert_eq!(file_suffix(".hidden"), Some(".hidden"));
        assert_eq!(file_suffix("trailing."), Some("."));
        assert_eq!(file_suffix("noext"), None);
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("cat.png"), "image/png");
        assert_eq!(content_type_for("CAT.JPG"), "image/jpeg");
        assert_eq!(content_type_for("clip.mp4"), "video/mp4");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
    }

    #[test]
    fn test_category_round_trips_through_str() {
        for category in [MediaCategory::Image, MediaCategory::Video, MediaCategory::Unknown] {
            assert_eq!(category.as_str().parse::<MediaCategory>(), Ok(category));
        }
        assert!("audio".parse::<MediaCategory>().is_err());
    }
}
