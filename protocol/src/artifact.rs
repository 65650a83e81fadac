//! Artifact records and the slides outline schema.
//!
//! DESIGN
//! ======
//! A slides outline is chapters of slides plus a header whose `slidesCount`
//! must equal the total number of slides, with slide numbers running
//! `1..=slidesCount` across chapters in order. Nothing trusts incoming
//! numbering: `renumber()` recomputes it after every structural edit and the
//! server normalizes every saved document.
//!
//! While the model is still streaming a `generateOutline` call, the document
//! is a deep-partial (`PartialSlidesOutline`): any field may be missing, and
//! fields that do not fit the schema are carried through in `extra` instead
//! of failing the whole parse.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// KIND
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    #[serde(rename = "slidesOutline")]
    SlidesOutline,
    #[serde(rename = "markdown")]
    Markdown,
}

impl ArtifactKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SlidesOutline => "slidesOutline",
            Self::Markdown => "markdown",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "slidesOutline" => Some(Self::SlidesOutline),
            "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

// =============================================================================
// SLIDES OUTLINE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineHeader {
    pub ppt_title: String,
    #[serde(default)]
    pub slides_count: u32,
    #[serde(default)]
    pub overall_requirements: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    #[serde(default)]
    pub slide_number: u32,
    pub slide_title: String,
    #[serde(default)]
    pub slide_content: String,
    #[serde(default)]
    pub slide_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub chapter_title: String,
    #[serde(default)]
    pub slides: Vec<Slide>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlidesOutline {
    pub outline: OutlineHeader,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl SlidesOutline {
    /// Number slides `1..=N` across chapters in order and set `slidesCount = N`.
    pub fn renumber(&mut self) {
        let mut number = 0u32;
        for slide in self.chapters.iter_mut().flat_map(|chapter| chapter.slides.iter_mut()) {
            number += 1;
            slide.slide_number = number;
        }
        self.outline.slides_count = number;
    }

    /// Drop chapters without slides, then renumber.
    pub fn normalize(&mut self) {
        self.chapters.retain(|chapter| !chapter.slides.is_empty());
        self.renumber();
    }

    #[must_use]
    pub fn total_slides(&self) -> usize {
        self.chapters.iter().map(|chapter| chapter.slides.len()).sum()
    }

    /// `slidesCount` matches the slide total and numbers are contiguous from 1.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let total = self.total_slides();
        if usize::try_from(self.outline.slides_count).map_or(true, |count| count != total) {
            return false;
        }
        self.chapters
            .iter()
            .flat_map(|chapter| chapter.slides.iter())
            .zip(1u32..)
            .all(|(slide, expected)| slide.slide_number == expected)
    }
}

/// Content of a `markdown` artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkdownDocument {
    #[serde(default)]
    pub title: String,
    pub markdown: String,
}

// =============================================================================
// VALIDATION
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ArtifactContentError {
    #[error("content does not match the {kind} schema: {source}")]
    Schema {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Check `content` against the schema for `kind` and return the normalized
/// document.
///
/// # Errors
///
/// Returns `ArtifactContentError::Schema` when the content does not
/// deserialize as the schema for `kind`.
pub fn validate_content(kind: ArtifactKind, content: &Value) -> Result<Value, ArtifactContentError> {
    let schema_err = |source| ArtifactContentError::Schema { kind: kind.as_str(), source };
    match kind {
        ArtifactKind::SlidesOutline => {
            let mut outline = SlidesOutline::deserialize(content).map_err(schema_err)?;
            outline.normalize();
            serde_json::to_value(outline).map_err(schema_err)
        }
        ArtifactKind::Markdown => {
            let doc = MarkdownDocument::deserialize(content).map_err(schema_err)?;
            serde_json::to_value(doc).map_err(schema_err)
        }
    }
}

/// Version string following `current`. Unparseable versions restart at 1.
#[must_use]
pub fn next_version(current: &str) -> String {
    (current.trim().parse::<u64>().unwrap_or(0) + 1).to_string()
}

// =============================================================================
// RECORDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: Uuid,
    pub conversation_id: Uuid,
    #[serde(default)]
    pub message_id: Option<String>,
    pub kind: ArtifactKind,
    pub version: String,
    pub content: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// `PATCH /api/artifacts/{id}` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveArtifactRequest {
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<String>,
}

// =============================================================================
// DEEP-PARTIAL OUTLINE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialOutlineHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ppt_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slides_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_requirements: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSlide {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialChapter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slides: Option<Vec<PartialSlide>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartialSlidesOutline {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outline: Option<PartialOutlineHeader>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Vec<PartialChapter>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn take_string(value: Value, key: &str, extra: &mut Map<String, Value>) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        other => {
            extra.insert(key.to_owned(), other);
            None
        }
    }
}

fn take_u64(value: Value, key: &str, extra: &mut Map<String, Value>) -> Option<u64> {
    match value.as_u64() {
        Some(n) => Some(n),
        None => {
            extra.insert(key.to_owned(), value);
            None
        }
    }
}

fn take_array<T>(value: Value, key: &str, extra: &mut Map<String, Value>, item: fn(Value) -> T) -> Option<Vec<T>> {
    match value {
        Value::Array(items) => Some(items.into_iter().map(item).collect()),
        other => {
            extra.insert(key.to_owned(), other);
            None
        }
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_owned(), other);
            map
        }
    }
}

impl PartialOutlineHeader {
    fn from_value(value: Value) -> Self {
        let mut header = Self::default();
        for (key, field) in into_object(value) {
            match key.as_str() {
                "pptTitle" => header.ppt_title = take_string(field, &key, &mut header.extra),
                "slidesCount" => header.slides_count = take_u64(field, &key, &mut header.extra),
                "overallRequirements" => header.overall_requirements = take_string(field, &key, &mut header.extra),
                _ => {
                    header.extra.insert(key, field);
                }
            }
        }
        header
    }
}

impl PartialSlide {
    fn from_value(value: Value) -> Self {
        let mut slide = Self::default();
        for (key, field) in into_object(value) {
            match key.as_str() {
                "slideNumber" => slide.slide_number = take_u64(field, &key, &mut slide.extra),
                "slideTitle" => slide.slide_title = take_string(field, &key, &mut slide.extra),
                "slideContent" => slide.slide_content = take_string(field, &key, &mut slide.extra),
                "slideType" => slide.slide_type = take_string(field, &key, &mut slide.extra),
                _ => {
                    slide.extra.insert(key, field);
                }
            }
        }
        slide
    }
}

impl PartialChapter {
    fn from_value(value: Value) -> Self {
        let mut chapter = Self::default();
        for (key, field) in into_object(value) {
            match key.as_str() {
                "chapterTitle" => chapter.chapter_title = take_string(field, &key, &mut chapter.extra),
                "slides" => chapter.slides = take_array(field, &key, &mut chapter.extra, PartialSlide::from_value),
                _ => {
                    chapter.extra.insert(key, field);
                }
            }
        }
        chapter
    }
}

impl PartialSlidesOutline {
    /// Walk a (possibly repaired, possibly incomplete) document against the
    /// outline schema. Never fails.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let mut doc = Self::default();
        for (key, field) in into_object(value) {
            match key.as_str() {
                "outline" => match field {
                    Value::Object(_) => doc.outline = Some(PartialOutlineHeader::from_value(field)),
                    other => {
                        doc.extra.insert(key, other);
                    }
                },
                "chapters" => doc.chapters = take_array(field, &key, &mut doc.extra, PartialChapter::from_value),
                _ => {
                    doc.extra.insert(key, field);
                }
            }
        }
        doc
    }

    /// Slides received so far across all chapters.
    #[must_use]
    pub fn slides_seen(&self) -> usize {
        self.chapters
            .iter()
            .flatten()
            .map(|chapter| chapter.slides.as_ref().map_or(0, Vec::len))
            .sum()
    }
}

#[cfg(test)]
#[path = "artifact_test.rs"]
mod tests;
