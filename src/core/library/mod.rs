//! # Library Module
//!
//! A library is one folder of images plus its persisted content index.
//!
//! Only files directly inside the folder count; the thumbnail
//! (`folder.jpg`) and the index tables are never part of the collection.
//! Scan and ingest both take `&mut Library`, which keeps one writer per
//! library inside a process. Running two processes on the same folder at
//! once is not supported.

mod filter;

pub use filter::{LibraryFilter, THUMBNAIL_NAME};

use crate::core::index::ContentIndex;
use crate::error::{IndexError, LibraryError};
use crate::events::{null_sender, Event, EventSender, IndexEvent};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub struct Library {
    root: PathBuf,
    index: ContentIndex,
    filter: LibraryFilter,
}

impl Library {
    /// Open a library folder and load its index
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, LibraryError> {
        Self::open_with_events(root, &null_sender())
    }

    /// Open a library folder, reporting index recovery through `events`
    pub fn open_with_events(
        root: impl Into<PathBuf>,
        events: &EventSender,
    ) -> Result<Self, LibraryError> {
        let root = root.into();

        if !root.exists() {
            return Err(LibraryError::NotFound { path: root });
        }
        if !root.is_dir() {
            return Err(LibraryError::NotADirectory { path: root });
        }

        let index = ContentIndex::load(&root);
        if let Some(reason) = index.recovery_reason() {
            events.send(Event::Index(IndexEvent::Recovered {
                path: root.clone(),
                message: reason.to_string(),
            }));
        }

        Ok(Self {
            root,
            index,
            filter: LibraryFilter::default(),
        })
    }

    pub fn with_filter(mut self, filter: LibraryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filter(&self) -> &LibraryFilter {
        &self.filter
    }

    pub fn index(&self) -> &ContentIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut ContentIndex {
        &mut self.index
    }

    /// Absolute path of a library-relative one
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Eligible image files, relative to the root and ordered by name
    pub fn list_files(&self) -> Result<Vec<PathBuf>, LibraryError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| LibraryError::ReadDirectory {
                path: self.root.clone(),
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            })?;

            if !entry.file_type().is_file() || !self.filter.should_include(entry.path()) {
                continue;
            }

            files.push(PathBuf::from(entry.file_name()));
        }

        files.sort();
        Ok(files)
    }

    /// Persist the index and announce it
    pub fn save_index(&mut self, events: &EventSender) -> Result<(), IndexError> {
        self.index.save(&self.root)?;
        events.send(Event::Index(IndexEvent::Saved {
            library: self.root.clone(),
            entries: self.index.len(),
            known_paths: self.index.known_len(),
        }));
        Ok(())
    }
}
