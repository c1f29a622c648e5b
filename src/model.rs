//! Document model: placed elements over a single background.
//!
//! The model is plain data. Every successful mutation returns a [`Change`]
//! describing what happened so the owner can reschedule autosave and decide
//! whether the background needs resolving again. Nothing here performs I/O.

use std::fmt;

use url::Url;

use crate::error::ModelError;

/// Stable element identity, minted by the document and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canvas coordinates. The origin is the canvas center; the caller decides
/// which way y grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    fn offset_by(self, delta: Position) -> Self {
        Self {
            x: self.x.saturating_add(delta.x),
            y: self.y.saturating_add(delta.y),
        }
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// A placed sticker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    id: ElementId,
    content: String,
    position: Position,
    size: i32,
}

impl Element {
    pub(crate) fn from_parts(id: ElementId, content: String, position: Position, size: i32) -> Self {
        Self { id, content, position, size }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Font size / edge length in canvas units, always positive
    pub fn size(&self) -> i32 {
        self.size
    }
}

/// The document's backdrop
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Background {
    #[default]
    Blank,
    /// Remote image data that still has to be fetched
    Url(Url),
    /// Encoded image bytes stored inside the document
    ImageData(Vec<u8>),
}

impl Background {
    pub fn url(&self) -> Option<&Url> {
        match self {
            Background::Url(url) => Some(url),
            _ => None,
        }
    }

    pub fn image_data(&self) -> Option<&[u8]> {
        match self {
            Background::ImageData(data) => Some(data),
            _ => None,
        }
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Background::Blank => write!(f, "blank"),
            Background::Url(url) => write!(f, "url({})", url),
            Background::ImageData(data) => write!(f, "image data ({} bytes)", data.len()),
        }
    }
}

/// What happened to the element list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementsChanged {
    Added(ElementId),
    Moved(ElementId),
    Resized(ElementId),
    Removed(ElementId),
}

impl ElementsChanged {
    pub fn id(&self) -> ElementId {
        match *self {
            ElementsChanged::Added(id)
            | ElementsChanged::Moved(id)
            | ElementsChanged::Resized(id)
            | ElementsChanged::Removed(id) => id,
        }
    }
}

/// Change notification emitted by every successful mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Elements(ElementsChanged),
    Background { old: Background, new: Background },
}

impl Change {
    /// Whether the background descriptor actually differs, i.e. whether
    /// resolution has to be triggered again.
    pub fn background_changed(&self) -> bool {
        match self {
            Change::Background { old, new } => old != new,
            Change::Elements(_) => false,
        }
    }

    pub fn element_id(&self) -> Option<ElementId> {
        match self {
            Change::Elements(change) => Some(change.id()),
            Change::Background { .. } => None,
        }
    }
}

/// Background plus an ordered list of elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    background: Background,
    elements: Vec<Element>,
    next_id: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document with a blank background
    pub fn new() -> Self {
        Self {
            background: Background::Blank,
            elements: Vec::new(),
            next_id: 1,
        }
    }

    /// Assemble a document from already validated parts (used by the codec).
    pub(crate) fn from_parts(background: Background, elements: Vec<Element>, next_id: u64) -> Self {
        Self { background, elements, next_id }
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    /// Elements in insertion (z) order
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// The id the next added element will receive
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn add_element(
        &mut self,
        content: impl Into<String>,
        position: Position,
        size: i32,
    ) -> Result<Change, ModelError> {
        let content = content.into();
        if content.is_empty() {
            return Err(ModelError::InvalidContent);
        }
        if size <= 0 {
            return Err(ModelError::InvalidSize(size));
        }

        let id = ElementId(self.next_id);
        self.next_id = self.next_id.checked_add(1).ok_or(ModelError::IdSpaceExhausted)?;
        self.elements.push(Element { id, content, position, size });
        Ok(Change::Elements(ElementsChanged::Added(id)))
    }

    /// Offsets the element on both axes.
    pub fn move_element(&mut self, id: ElementId, delta: Position) -> Result<Change, ModelError> {
        let element = self.element_mut(id)?;
        element.position = element.position.offset_by(delta);
        Ok(Change::Elements(ElementsChanged::Moved(id)))
    }

    /// Scales the size, rounding half away from zero. The result never drops
    /// below 1.
    pub fn resize_element(&mut self, id: ElementId, scale: f64) -> Result<Change, ModelError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ModelError::InvalidScale(scale));
        }
        let element = self.element_mut(id)?;
        element.size = scaled_size(element.size, scale);
        Ok(Change::Elements(ElementsChanged::Resized(id)))
    }

    /// Returns `None` when no element has this id.
    pub fn remove_element(&mut self, id: ElementId) -> Option<Change> {
        let index = self.elements.iter().position(|e| e.id == id)?;
        self.elements.remove(index);
        Some(Change::Elements(ElementsChanged::Removed(id)))
    }

    pub fn set_background(&mut self, background: Background) -> Change {
        let old = std::mem::replace(&mut self.background, background);
        Change::Background {
            old,
            new: self.background.clone(),
        }
    }

    fn element_mut(&mut self, id: ElementId) -> Result<&mut Element, ModelError> {
        self.elements
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(ModelError::NotFound(id))
    }
}

fn scaled_size(size: i32, scale: f64) -> i32 {
    // f64::round rounds half away from zero
    let scaled = (f64::from(size) * scale).round();
    if scaled >= f64::from(i32::MAX) {
        i32::MAX
    } else {
        (scaled as i32).max(1)
    }
}
