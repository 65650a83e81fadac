//! Structural editor for slides outline artifacts.
//!
//! DESIGN
//! ======
//! The editor owns a working copy of the outline and the artifact version it
//! was loaded at. Every structural edit renumbers the outline, so slide
//! numbers always run `1..=slidesCount` across chapters and `slidesCount`
//! equals the slide total. Deleting the last slide of a chapter removes the
//! chapter.
//!
//! Dirty markers are kept by stable per-item keys that move with their
//! chapter or slide, so reordering keeps markers on the right items.
//! `save()` sends the whole document with the loaded version as
//! `expectedVersion` and adopts the server's normalized copy. Loaded content
//! is normalized too, so stale or missing slide numbers never reach an edit.

use std::collections::HashSet;
use std::sync::Arc;

use lume_protocol::{Artifact, ArtifactKind, SaveArtifactRequest, Slide, SlidesOutline};
use tracing::{info, warn};
use uuid::Uuid;

use crate::net::api::{ApiError, ArtifactApi};

#[cfg(test)]
#[path = "outline_editor_test.rs"]
mod outline_editor_test;

pub const NEW_SLIDE_TITLE: &str = "New Slide";
pub const NEW_SLIDE_TYPE: &str = "content";

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("{what} index {index} out of range (len {len})")]
    OutOfRange { what: &'static str, index: usize, len: usize },
    #[error("artifact {id} is {kind:?}, not a slides outline")]
    WrongKind { id: Uuid, kind: ArtifactKind },
    #[error("invalid outline content: {0}")]
    InvalidContent(#[from] serde_json::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Fields to overwrite on one slide; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidePatch {
    pub slide_title: Option<String>,
    pub slide_content: Option<String>,
    pub slide_type: Option<String>,
}

pub struct OutlineEditor {
    api: Arc<dyn ArtifactApi>,
    artifact_id: Uuid,
    version: String,
    outline: SlidesOutline,
    chapter_keys: Vec<u64>,
    slide_keys: Vec<Vec<u64>>,
    next_key: u64,
    dirty: HashSet<u64>,
    header_dirty: bool,
    structure_dirty: bool,
}

impl OutlineEditor {
    /// Load an artifact and open it for editing.
    ///
    /// # Errors
    ///
    /// Fails if the fetch fails or the artifact is not a slides outline.
    pub async fn open(api: Arc<dyn ArtifactApi>, artifact_id: Uuid) -> Result<Self, EditorError> {
        let artifact = api.get_artifact(artifact_id).await?;
        Self::from_artifact(api, artifact)
    }

    /// # Errors
    ///
    /// Fails if the artifact is not a slides outline or its content does
    /// not match the schema.
    pub fn from_artifact(api: Arc<dyn ArtifactApi>, artifact: Artifact) -> Result<Self, EditorError> {
        if artifact.kind != ArtifactKind::SlidesOutline {
            return Err(EditorError::WrongKind { id: artifact.id, kind: artifact.kind });
        }
        let mut outline: SlidesOutline = serde_json::from_value(artifact.content)?;
        outline.normalize();
        let mut editor = Self {
            api,
            artifact_id: artifact.id,
            version: artifact.version,
            outline,
            chapter_keys: Vec::new(),
            slide_keys: Vec::new(),
            next_key: 0,
            dirty: HashSet::new(),
            header_dirty: false,
            structure_dirty: false,
        };
        editor.rekey();
        Ok(editor)
    }

    #[must_use]
    pub fn artifact_id(&self) -> Uuid {
        self.artifact_id
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn outline(&self) -> &SlidesOutline {
        &self.outline
    }

    /// True while there are edits the server has not stored.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.header_dirty || self.structure_dirty || !self.dirty.is_empty()
    }

    #[must_use]
    pub fn is_chapter_dirty(&self, chapter: usize) -> bool {
        self.chapter_keys.get(chapter).is_some_and(|key| self.dirty.contains(key))
    }

    #[must_use]
    pub fn is_slide_dirty(&self, chapter: usize, slide: usize) -> bool {
        self.slide_keys
            .get(chapter)
            .and_then(|keys| keys.get(slide))
            .is_some_and(|key| self.dirty.contains(key))
    }

    // =========================================================================
    // TEXT EDITS
    // =========================================================================

    pub fn update_title(&mut self, title: impl Into<String>) {
        self.outline.outline.ppt_title = title.into();
        self.header_dirty = true;
    }

    /// # Errors
    ///
    /// `OutOfRange` if `chapter` does not exist.
    pub fn update_chapter_title(&mut self, chapter: usize, title: impl Into<String>) -> Result<(), EditorError> {
        self.check_chapter(chapter)?;
        self.outline.chapters[chapter].chapter_title = title.into();
        self.dirty.insert(self.chapter_keys[chapter]);
        Ok(())
    }

    /// # Errors
    ///
    /// `OutOfRange` if the chapter or slide does not exist.
    pub fn update_slide(&mut self, chapter: usize, slide: usize, patch: SlidePatch) -> Result<(), EditorError> {
        self.check_slide(chapter, slide)?;
        let target = &mut self.outline.chapters[chapter].slides[slide];
        if let Some(title) = patch.slide_title {
            target.slide_title = title;
        }
        if let Some(content) = patch.slide_content {
            target.slide_content = content;
        }
        if let Some(kind) = patch.slide_type {
            target.slide_type = kind;
        }
        self.dirty.insert(self.slide_keys[chapter][slide]);
        Ok(())
    }

    // =========================================================================
    // STRUCTURAL EDITS
    // =========================================================================

    /// Insert a blank slide after `after`, or at the end of the chapter.
    /// Returns the new slide's index within the chapter.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if the chapter or `after` slide does not exist.
    pub fn add_slide(&mut self, chapter: usize, after: Option<usize>) -> Result<usize, EditorError> {
        self.check_chapter(chapter)?;
        let position = match after {
            Some(slide) => {
                self.check_slide(chapter, slide)?;
                slide + 1
            }
            None => self.outline.chapters[chapter].slides.len(),
        };
        let slide = Slide {
            slide_number: 0,
            slide_title: NEW_SLIDE_TITLE.to_owned(),
            slide_content: String::new(),
            slide_type: NEW_SLIDE_TYPE.to_owned(),
        };
        self.outline.chapters[chapter].slides.insert(position, slide);
        let key = self.mint_key();
        self.slide_keys[chapter].insert(position, key);
        self.dirty.insert(key);
        self.structural_edit();
        Ok(position)
    }

    /// Remove a slide; a chapter left without slides is removed too.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if the chapter or slide does not exist.
    pub fn delete_slide(&mut self, chapter: usize, slide: usize) -> Result<(), EditorError> {
        self.check_slide(chapter, slide)?;
        self.outline.chapters[chapter].slides.remove(slide);
        let key = self.slide_keys[chapter].remove(slide);
        self.dirty.remove(&key);
        if self.outline.chapters[chapter].slides.is_empty() {
            self.outline.chapters.remove(chapter);
            self.slide_keys.remove(chapter);
            let key = self.chapter_keys.remove(chapter);
            self.dirty.remove(&key);
        }
        self.structural_edit();
        Ok(())
    }

    /// # Errors
    ///
    /// `OutOfRange` if either index does not exist.
    pub fn reorder_chapters(&mut self, from: usize, to: usize) -> Result<(), EditorError> {
        self.check_chapter(from)?;
        self.check_chapter(to)?;
        move_item(&mut self.outline.chapters, from, to);
        move_item(&mut self.chapter_keys, from, to);
        move_item(&mut self.slide_keys, from, to);
        self.structural_edit();
        Ok(())
    }

    /// # Errors
    ///
    /// `OutOfRange` if the chapter or either slide index does not exist.
    pub fn reorder_slides(&mut self, chapter: usize, from: usize, to: usize) -> Result<(), EditorError> {
        self.check_slide(chapter, from)?;
        self.check_slide(chapter, to)?;
        move_item(&mut self.outline.chapters[chapter].slides, from, to);
        move_item(&mut self.slide_keys[chapter], from, to);
        self.structural_edit();
        Ok(())
    }

    // =========================================================================
    // SAVE
    // =========================================================================

    /// Store the working copy. On success the server's normalized content
    /// and new version replace the local ones and every marker clears; on
    /// failure nothing changes.
    ///
    /// # Errors
    ///
    /// Returns the API error; a stale version surfaces as a 409 (see
    /// [`ApiError::is_conflict`]).
    pub async fn save(&mut self) -> Result<(), EditorError> {
        let request = SaveArtifactRequest {
            content: serde_json::to_value(&self.outline)?,
            expected_version: Some(self.version.clone()),
        };
        let saved = match self.api.save_artifact(self.artifact_id, &request).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(artifact_id = %self.artifact_id, version = %self.version, error = %e, "outline: save failed");
                return Err(e.into());
            }
        };
        let mut outline: SlidesOutline = serde_json::from_value(saved.content)?;
        outline.normalize();
        self.outline = outline;
        self.version = saved.version;
        self.rekey();
        info!(artifact_id = %self.artifact_id, version = %self.version, "outline: saved");
        Ok(())
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn structural_edit(&mut self) {
        self.outline.renumber();
        self.structure_dirty = true;
    }

    fn mint_key(&mut self) -> u64 {
        self.next_key += 1;
        self.next_key
    }

    /// Fresh keys for the current structure, with every marker cleared.
    fn rekey(&mut self) {
        let chapters = self.outline.chapters.len();
        self.chapter_keys = (0..chapters).map(|_| self.mint_key()).collect();
        self.slide_keys = Vec::with_capacity(chapters);
        for chapter in 0..chapters {
            let slides = self.outline.chapters[chapter].slides.len();
            let keys = (0..slides).map(|_| self.mint_key()).collect();
            self.slide_keys.push(keys);
        }
        self.dirty.clear();
        self.header_dirty = false;
        self.structure_dirty = false;
    }

    fn check_chapter(&self, chapter: usize) -> Result<(), EditorError> {
        let len = self.outline.chapters.len();
        if chapter >= len {
            return Err(EditorError::OutOfRange { what: "chapter", index: chapter, len });
        }
        Ok(())
    }

    fn check_slide(&self, chapter: usize, slide: usize) -> Result<(), EditorError> {
        self.check_chapter(chapter)?;
        let len = self.outline.chapters[chapter].slides.len();
        if slide >= len {
            return Err(EditorError::OutOfRange { what: "slide", index: slide, len });
        }
        Ok(())
    }
}

fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from != to {
        let item = items.remove(from);
        items.insert(to, item);
    }
}
