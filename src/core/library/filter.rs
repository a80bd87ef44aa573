//! Decides which files in a library folder take part in dedup.

use std::collections::HashSet;
use std::path::Path;

/// Name of the per-library thumbnail, never hashed or deduplicated
pub const THUMBNAIL_NAME: &str = "folder.jpg";

/// Filters library files down to hashable images
#[derive(Debug, Clone)]
pub struct LibraryFilter {
    /// Lowercase extensions to include
    extensions: HashSet<String>,
    /// Lowercase thumbnail file name to skip
    thumbnail: String,
    /// Whether to include hidden files (temp downloads are hidden)
    include_hidden: bool,
}

impl LibraryFilter {
    pub fn new() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png"].iter().map(|e| e.to_string()).collect(),
            thumbnail: THUMBNAIL_NAME.to_string(),
            include_hidden: false,
        }
    }

    /// Override the list of extensions to accept
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Use a different thumbnail file name
    pub fn with_thumbnail(mut self, name: &str) -> Self {
        self.thumbnail = name.to_lowercase();
        self
    }

    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    pub fn is_thumbnail(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_lowercase() == self.thumbnail)
            .unwrap_or(false)
    }

    /// Check if a file should take part in hashing and dedup
    pub fn should_include(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        if !self.include_hidden && name.starts_with('.') {
            return false;
        }

        if self.is_thumbnail(path) {
            return false;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }
}

impl Default for LibraryFilter {
    fn default() -> Self {
        Self::new()
    }
}
