//! Interaction tools
//!
//! Each tool is an independent state machine over pointer events (and, for
//! some tools, keys). Only one tool is active at a time; the
//! [`ToolController`] owns it and discards any in-progress gesture when the
//! tool changes. Tools read and mutate the [`AnnotationModel`] through a
//! [`ToolContext`] and report what happened as a [`ToolOutcome`] so the host
//! can repaint, ask for confirmation or open an input field.
//!
//! Pointer positions are page-relative screen pixels. Hit testing happens in
//! screen space against each annotation's bounding box; geometry is converted
//! to document units only when a gesture commits.

mod eraser;
mod free_text;
mod ink;
mod lasso;
pub mod markup;
mod select;
mod shape;
mod stamp;

pub use eraser::EraserTool;
pub use free_text::{FreeTextTool, TextMode};
pub use ink::InkTool;
pub use lasso::LassoTool;
pub use select::SelectTool;
pub use shape::ShapeTool;
pub use stamp::{StampMode, StampTool};

use crate::annotation::{
    Annotation, AnnotationBody, AnnotationId, AnnotationMetadata, AnnotationStyle, DocumentId,
    ShapeKind,
};
use crate::config::ToolConfig;
use crate::error::StampError;
use crate::geometry::{Point, Rect};
use crate::model::AnnotationModel;
use crate::transform::{document_to_screen, Placement, Viewport, ViewportTransform};
use pdf_annotator_cache::PageWindowCache;

/// Which tool is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Select,
    Shape(ShapeKind),
    Ink,
    Eraser,
    Lasso,
    FreeText(TextMode),
    Stamp(StampMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
}

/// Pointer input, relative to the page it happened on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    /// 1-based page number
    pub page: u32,
    /// Page-relative screen pixels
    pub position: Point,
    /// Stylus pressure in `[0, 1]`, when the device reports it
    pub pressure: Option<f64>,
}

impl PointerEvent {
    pub fn down(page: u32, x: f64, y: f64) -> Self {
        Self::new(PointerKind::Down, page, x, y)
    }

    pub fn moved(page: u32, x: f64, y: f64) -> Self {
        Self::new(PointerKind::Move, page, x, y)
    }

    pub fn up(page: u32, x: f64, y: f64) -> Self {
        Self::new(PointerKind::Up, page, x, y)
    }

    fn new(kind: PointerKind, page: u32, x: f64, y: f64) -> Self {
        Self {
            kind,
            page,
            position: Point::new(x, y),
            pressure: None,
        }
    }

    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure.clamp(0.0, 1.0));
        self
    }
}

/// Keys the tools react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Delete,
    Backspace,
    Escape,
    Enter,
}

impl Key {
    pub fn is_delete(&self) -> bool {
        matches!(self, Key::Delete | Key::Backspace)
    }
}

/// Deletion waiting for the user's confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletion {
    pub ids: Vec<AnnotationId>,
}

/// What a tool did with an input
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Input ignored
    None,
    /// Gesture preview needs a repaint
    PreviewChanged,
    Created(AnnotationId),
    Updated(Vec<AnnotationId>),
    Deleted(Vec<AnnotationId>),
    SelectionChanged(Vec<AnnotationId>),
    /// Destructive action waiting for confirmation
    ConfirmDelete(PendingDeletion),
    /// Host should open a text field at `at`
    BeginTextInput { page: u32, at: Point },
    /// Host should open a file picker for the stamp image
    RequestImage { page: u32, at: Point },
    /// Gesture ended without committing anything
    Discarded,
}

/// Transient drawing for the active gesture, in page-relative screen pixels
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Shape {
        page: u32,
        kind: ShapeKind,
        points: Vec<Point>,
    },
    Ink {
        page: u32,
        points: Vec<Point>,
    },
    Eraser {
        page: u32,
        center: Point,
        radius: f64,
        marked: Vec<AnnotationId>,
    },
    Lasso {
        page: u32,
        points: Vec<Point>,
    },
    Move {
        page: u32,
        ids: Vec<AnnotationId>,
        offset: Point,
    },
    TextInput {
        page: u32,
        at: Point,
    },
    StampPlacement {
        page: u32,
        at: Point,
    },
}

impl Preview {
    pub fn page(&self) -> u32 {
        match self {
            Preview::Shape { page, .. }
            | Preview::Ink { page, .. }
            | Preview::Eraser { page, .. }
            | Preview::Lasso { page, .. }
            | Preview::Move { page, .. }
            | Preview::TextInput { page, .. }
            | Preview::StampPlacement { page, .. } => *page,
        }
    }
}

/// Access to page viewports supplied by the renderer
pub trait ViewportLookup {
    fn viewport(&self, page: u32) -> Option<&dyn ViewportTransform>;
}

impl ViewportLookup for PageWindowCache<Viewport> {
    fn viewport(&self, page: u32) -> Option<&dyn ViewportTransform> {
        self.peek(page).map(|viewport| viewport as &dyn ViewportTransform)
    }
}

/// Lookup with no pages loaded
#[derive(Debug, Default, Clone, Copy)]
pub struct NoViewports;

impl ViewportLookup for NoViewports {
    fn viewport(&self, _page: u32) -> Option<&dyn ViewportTransform> {
        None
    }
}

/// Who new annotations belong to
#[derive(Debug, Clone, PartialEq)]
pub struct Authoring {
    pub document_id: DocumentId,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
}

impl Authoring {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            author_id: None,
            author_name: None,
        }
    }
}

/// Everything a tool may touch while handling an input
pub struct ToolContext<'a> {
    pub model: &'a mut AnnotationModel,
    pub viewports: &'a dyn ViewportLookup,
    pub config: &'a ToolConfig,
    pub authoring: &'a Authoring,
}

impl ToolContext<'_> {
    pub fn viewport(&self, page: u32) -> Option<&dyn ViewportTransform> {
        self.viewports.viewport(page)
    }

    /// Build an annotation owned by the current document and author
    pub fn new_annotation(
        &self,
        page: u32,
        body: AnnotationBody,
        style: AnnotationStyle,
        placement: Placement,
    ) -> Annotation {
        let mut metadata = AnnotationMetadata::new();
        metadata.author_id = self.authoring.author_id.clone();
        metadata.author_name = self.authoring.author_name.clone();
        Annotation::new(self.authoring.document_id.clone(), page, body, style)
            .with_metadata(metadata)
            .with_placement(placement)
    }

    /// Insert a finished annotation
    pub fn commit(&mut self, annotation: Annotation) -> ToolOutcome {
        tracing::debug!(
            id = %annotation.id,
            page = annotation.page_number,
            approximate = annotation.is_approximate(),
            "committing annotation"
        );
        ToolOutcome::Created(self.model.create(annotation))
    }

    /// Screen-space hit region of an annotation
    pub fn screen_bounds(&self, annotation: &Annotation) -> Rect {
        screen_bounds(annotation, self.viewports)
    }

    /// Ask for (or perform) deletion of `ids`, skipping locked annotations
    pub fn request_delete(&mut self, ids: &[AnnotationId]) -> ToolOutcome {
        let ids: Vec<AnnotationId> = ids
            .iter()
            .filter(|id| self.model.get(id).is_some_and(|a| !a.is_locked()))
            .cloned()
            .collect();
        if ids.is_empty() {
            return ToolOutcome::None;
        }
        if self.config.confirm_destructive {
            return ToolOutcome::ConfirmDelete(PendingDeletion { ids });
        }
        ToolOutcome::Deleted(apply_deletion(self.model, &PendingDeletion { ids }))
    }
}

/// Carry out a confirmed deletion; locked or vanished ids are skipped
pub fn apply_deletion(model: &mut AnnotationModel, pending: &PendingDeletion) -> Vec<AnnotationId> {
    let ids: Vec<AnnotationId> = pending
        .ids
        .iter()
        .filter(|id| model.get(id).is_some_and(|a| !a.is_locked()))
        .cloned()
        .collect();
    model
        .delete_many(&ids)
        .into_iter()
        .map(|annotation| annotation.id)
        .collect()
}

/// Bounding box of an annotation in page-relative screen pixels
///
/// Approximate annotations are already in pixels. Without a viewport the
/// stored bounds are used as-is.
pub fn screen_bounds(annotation: &Annotation, viewports: &dyn ViewportLookup) -> Rect {
    let bounds = annotation.bounds();
    if annotation.is_approximate() {
        return bounds;
    }
    document_to_screen(bounds, viewports.viewport(annotation.page_number)).unwrap_or(bounds)
}

/// Per-tool behavior
pub trait Tool {
    fn kind(&self) -> ToolKind;

    fn pointer(&mut self, event: &PointerEvent, ctx: &mut ToolContext<'_>) -> ToolOutcome;

    fn key(&mut self, _key: Key, _ctx: &mut ToolContext<'_>) -> ToolOutcome {
        ToolOutcome::None
    }

    /// Drop the in-progress gesture; returns whether there was one
    fn cancel(&mut self) -> bool;

    fn preview(&self) -> Option<Preview>;

    /// Style applied to annotations this tool creates
    fn set_style(&mut self, _style: AnnotationStyle) {}

    /// Finish a text edit started by [`ToolOutcome::BeginTextInput`]
    fn commit_text(&mut self, _text: &str, _ctx: &mut ToolContext<'_>) -> ToolOutcome {
        ToolOutcome::None
    }

    /// Finish a placement started by [`ToolOutcome::RequestImage`]
    fn place_image(&mut self, _bytes: &[u8], _ctx: &mut ToolContext<'_>) -> Result<ToolOutcome, StampError> {
        Err(StampError::NotPlacing)
    }
}

fn build(kind: ToolKind) -> Box<dyn Tool> {
    match kind {
        ToolKind::Select => Box::new(SelectTool::new()),
        ToolKind::Shape(shape) => Box::new(ShapeTool::new(shape)),
        ToolKind::Ink => Box::new(InkTool::new()),
        ToolKind::Eraser => Box::new(EraserTool::new()),
        ToolKind::Lasso => Box::new(LassoTool::new()),
        ToolKind::FreeText(mode) => Box::new(FreeTextTool::new(mode)),
        ToolKind::Stamp(mode) => Box::new(StampTool::new(mode)),
    }
}

/// Owns the active tool
pub struct ToolController {
    active: Box<dyn Tool>,
    style: Option<AnnotationStyle>,
}

impl std::fmt::Debug for ToolController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolController")
            .field("active", &self.active.kind())
            .field("preview", &self.active.preview())
            .finish()
    }
}

impl Default for ToolController {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolController {
    /// Start with the select tool
    pub fn new() -> Self {
        Self {
            active: build(ToolKind::Select),
            style: None,
        }
    }

    pub fn active_kind(&self) -> ToolKind {
        self.active.kind()
    }

    /// Switch tools, discarding any in-progress gesture
    ///
    /// Returns whether a gesture was discarded.
    pub fn set_tool(&mut self, kind: ToolKind) -> bool {
        let discarded = self.active.cancel();
        if kind != self.active.kind() {
            tracing::debug!(from = ?self.active.kind(), to = ?kind, discarded, "switching tool");
            self.active = build(kind);
            if let Some(style) = &self.style {
                self.active.set_style(style.clone());
            }
        }
        discarded
    }

    /// Style for annotations created from now on, by any tool
    pub fn set_style(&mut self, style: AnnotationStyle) {
        self.active.set_style(style.clone());
        self.style = Some(style);
    }

    pub fn pointer(&mut self, event: &PointerEvent, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        self.active.pointer(event, ctx)
    }

    pub fn key(&mut self, key: Key, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        self.active.key(key, ctx)
    }

    /// Cancel the in-progress gesture (page navigation, focus loss)
    pub fn cancel(&mut self) -> bool {
        self.active.cancel()
    }

    pub fn preview(&self) -> Option<Preview> {
        self.active.preview()
    }

    pub fn commit_text(&mut self, text: &str, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        self.active.commit_text(text, ctx)
    }

    pub fn place_image(&mut self, bytes: &[u8], ctx: &mut ToolContext<'_>) -> Result<ToolOutcome, StampError> {
        self.active.place_image(bytes, ctx)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) struct Harness {
        pub model: AnnotationModel,
        pub viewports: PageWindowCache<Viewport>,
        pub config: ToolConfig,
        pub authoring: Authoring,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            Self {
                model: AnnotationModel::new(),
                viewports: PageWindowCache::new(3),
                config: ToolConfig::default(),
                authoring: Authoring::new(DocumentId::new("doc")),
            }
        }

        /// Page 1 at scale 1, 1000x1000, unrotated
        pub(crate) fn with_viewport() -> Self {
            let mut harness = Self::new();
            let generation = harness.viewports.generation();
            let viewport = Viewport::new(1000.0, 1000.0, 1.0, crate::transform::Rotation::Deg0);
            if let Ok(viewport) = viewport {
                harness.viewports.insert(generation, 1, viewport);
            }
            harness
        }

        pub(crate) fn ctx(&mut self) -> ToolContext<'_> {
            ToolContext {
                model: &mut self.model,
                viewports: &self.viewports,
                config: &self.config,
                authoring: &self.authoring,
            }
        }

        pub(crate) fn drag(&mut self, tool: &mut dyn Tool, path: &[(f64, f64)]) -> ToolOutcome {
            let mut outcome = ToolOutcome::None;
            for (index, (x, y)) in path.iter().enumerate() {
                let event = if index == 0 {
                    PointerEvent::down(1, *x, *y)
                } else if index == path.len() - 1 {
                    PointerEvent::up(1, *x, *y)
                } else {
                    PointerEvent::moved(1, *x, *y)
                };
                outcome = tool.pointer(&event, &mut self.ctx());
            }
            outcome
        }
    }
}
