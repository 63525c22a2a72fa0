//! Per-document façade for a UI host
//!
//! [`AnnotationSession`] owns one document's model, active tool, save queue
//! and viewport cache, and forwards user input to the tools. Tool results
//! that other parts of the application care about (new annotations, page
//! jumps) are published on the shared [`EventBus`].
//!
//! Persistence is driven from outside: once per frame the host calls
//! [`flush`], which sends the queued work through a
//! [`PersistenceAdapter`] and applies the answers. The session lives in a
//! `RefCell` so it stays usable (and editable) while a flush is awaiting the
//! backend.

use crate::anchor::{verify, AnchorStatus};
use crate::annotation::{Annotation, AnnotationBody, AnnotationId, AnnotationStyle, DocumentId, MarkupKind};
use crate::config::EngineConfig;
use crate::error::{PersistenceResult, StampError};
use crate::events::{AppEvent, EventBus};
use crate::model::{AnnotationModel, AnnotationPatch};
use crate::persistence::{AnnotationBackend, FlushReport, LoadOutcome, PersistenceAdapter, SaveBatch, SaveQueue, WireRecord};
use crate::render::{project_page, RenderAdapter, RenderItem, RenderSurface};
use crate::tools::markup::{create_markup, TextSelection};
use crate::tools::{
    apply_deletion, Authoring, Key, PendingDeletion, PointerEvent, Preview, ToolContext, ToolController, ToolKind,
    ToolOutcome,
};
use crate::transform::{Viewport, ViewportTransform};
use pdf_annotator_cache::{CacheGeneration, PageWindowCache};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::Path;

/// Result of checking a page's markup anchors against its live text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorReport {
    pub intact: Vec<AnnotationId>,
    /// Re-anchored at new offsets; the updated anchor is queued for saving
    pub relocated: Vec<AnnotationId>,
    /// Could not be found again; kept at the last known position
    pub drifted: Vec<AnnotationId>,
}

/// One open document
#[derive(Debug)]
pub struct AnnotationSession {
    document_id: DocumentId,
    config: EngineConfig,
    authoring: Authoring,
    model: AnnotationModel,
    tools: ToolController,
    queue: SaveQueue,
    viewports: PageWindowCache<Viewport>,
    events: EventBus,
    drifted: BTreeSet<AnnotationId>,
}

impl AnnotationSession {
    pub fn new(document_id: DocumentId, config: EngineConfig, events: EventBus) -> Self {
        let authoring = Authoring {
            document_id: document_id.clone(),
            author_id: config.persistence.user_id.clone(),
            author_name: config.persistence.author_name.clone(),
        };
        Self {
            queue: SaveQueue::new(config.persistence.clone()),
            viewports: PageWindowCache::new(config.cache.page_window),
            document_id,
            authoring,
            model: AnnotationModel::new(),
            tools: ToolController::new(),
            events,
            drifted: BTreeSet::new(),
            config,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> &AnnotationModel {
        &self.model
    }

    /// Direct model access for edits that do not go through a tool
    ///
    /// Changes made here are persisted like any other.
    pub fn model_mut(&mut self) -> &mut AnnotationModel {
        &mut self.model
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn queue(&self) -> &SaveQueue {
        &self.queue
    }

    pub fn active_tool(&self) -> ToolKind {
        self.tools.active_kind()
    }

    pub fn preview(&self) -> Option<Preview> {
        self.tools.preview()
    }

    // ---------------------------------------------------------------------
    // Viewports and navigation
    // ---------------------------------------------------------------------

    /// Generation to pass back to [`set_viewport`](Self::set_viewport)
    pub fn viewport_generation(&self) -> CacheGeneration {
        self.viewports.generation()
    }

    pub fn viewport(&self, page: u32) -> Option<&Viewport> {
        self.viewports.peek(page)
    }

    /// Record the renderer's viewport for a page
    ///
    /// `generation` is the value of [`viewport_generation`] when the page
    /// load started; viewports from before a reload are dropped. Annotations
    /// placed approximately on the page are resolved to document units and
    /// their ids returned.
    ///
    /// [`viewport_generation`]: Self::viewport_generation
    pub fn set_viewport(&mut self, generation: CacheGeneration, page: u32, viewport: Viewport) -> Vec<AnnotationId> {
        if generation != self.viewports.generation() {
            tracing::debug!(page, ?generation, "dropping viewport from before reload");
            return Vec::new();
        }
        if !self.viewports.insert(generation, page, viewport) {
            tracing::debug!(
                page,
                current = self.viewports.current_page(),
                "viewport outside the page window not cached"
            );
        }
        self.model.resolve_approximate(page, &viewport)
    }

    /// Move to another page
    ///
    /// Cancels any in-progress gesture and re-centres the viewport window.
    /// With `announce`, a `JumpToPage` event is published for other panels.
    pub fn set_current_page(&mut self, page: u32, announce: bool) -> bool {
        let discarded = self.tools.cancel();
        self.viewports.set_current_page(page);
        if announce {
            self.events.emit(AppEvent::JumpToPage(page));
        }
        discarded
    }

    pub fn current_page(&self) -> u32 {
        self.viewports.current_page()
    }

    /// Forget every viewport after the document was re-rendered
    pub fn reload_document(&mut self) -> CacheGeneration {
        self.tools.cancel();
        let generation = self.viewports.invalidate();
        tracing::info!(document = %self.document_id, ?generation, "document reloaded");
        generation
    }

    /// Ask the bookmark panel to generate bookmarks for this document
    pub fn request_bookmarks(&self) -> usize {
        self.events.emit(AppEvent::GenerateBookmark(self.document_id.clone()))
    }

    // ---------------------------------------------------------------------
    // Input
    // ---------------------------------------------------------------------

    fn with_tools<R>(&mut self, f: impl FnOnce(&mut ToolController, &mut ToolContext<'_>) -> R) -> R {
        let mut ctx = ToolContext {
            model: &mut self.model,
            viewports: &self.viewports,
            config: &self.config.tools,
            authoring: &self.authoring,
        };
        f(&mut self.tools, &mut ctx)
    }

    fn publish(&self, outcome: ToolOutcome) -> ToolOutcome {
        if let ToolOutcome::Created(id) = &outcome {
            if let Some(annotation) = self.model.get(id) {
                self.events.emit(AppEvent::AnnotationCreated(annotation.clone()));
            }
        }
        outcome
    }

    /// Switch tools; returns whether a gesture was discarded
    pub fn set_tool(&mut self, kind: ToolKind) -> bool {
        self.tools.set_tool(kind)
    }

    pub fn set_style(&mut self, style: AnnotationStyle) {
        self.tools.set_style(style);
    }

    pub fn pointer(&mut self, event: &PointerEvent) -> ToolOutcome {
        let outcome = self.with_tools(|tools, ctx| tools.pointer(event, ctx));
        self.publish(outcome)
    }

    pub fn key(&mut self, key: Key) -> ToolOutcome {
        let outcome = self.with_tools(|tools, ctx| tools.key(key, ctx));
        self.publish(outcome)
    }

    pub fn cancel(&mut self) -> bool {
        self.tools.cancel()
    }

    /// Finish the open text editor
    pub fn commit_text(&mut self, text: &str) -> ToolOutcome {
        let outcome = self.with_tools(|tools, ctx| tools.commit_text(text, ctx));
        self.publish(outcome)
    }

    /// Finish the pending stamp placement with image bytes
    pub fn place_image(&mut self, bytes: &[u8]) -> Result<ToolOutcome, StampError> {
        let outcome = self.with_tools(|tools, ctx| tools.place_image(bytes, ctx))?;
        Ok(self.publish(outcome))
    }

    /// Finish the pending stamp placement with an image file
    pub fn place_image_file<P: AsRef<Path>>(&mut self, path: P) -> Result<ToolOutcome, StampError> {
        let bytes = std::fs::read(path)?;
        self.place_image(&bytes)
    }

    /// Mark up the current text selection
    pub fn add_markup(
        &mut self,
        kind: MarkupKind,
        selection: &TextSelection<'_>,
        style: Option<AnnotationStyle>,
    ) -> ToolOutcome {
        let context_chars = self.config.anchor.context_chars;
        let outcome = self.with_tools(|_, ctx| create_markup(ctx, kind, selection, style, context_chars));
        self.publish(outcome)
    }

    /// Carry out a deletion the user confirmed
    pub fn confirm_deletion(&mut self, pending: &PendingDeletion) -> Vec<AnnotationId> {
        apply_deletion(&mut self.model, pending)
    }

    // ---------------------------------------------------------------------
    // Anchors
    // ---------------------------------------------------------------------

    /// Check every markup on `page` against freshly extracted page text
    ///
    /// Relocated anchors are rebased and saved. Drifted markups are flagged
    /// and left in place; they are never deleted.
    pub fn verify_anchors(&mut self, page: u32, page_text: &str) -> AnchorReport {
        let context_chars = self.config.anchor.context_chars;
        let mut report = AnchorReport::default();
        let mut rebased: Vec<(AnnotationId, AnnotationBody)> = Vec::new();

        for annotation in self.model.get_by_page(page) {
            let AnnotationBody::TextMarkup {
                kind,
                anchor,
                coordinates,
            } = &annotation.body
            else {
                continue;
            };
            let id = annotation.id.clone();
            match verify(anchor, page_text) {
                AnchorStatus::Intact => report.intact.push(id),
                AnchorStatus::Relocated { start, end } => {
                    let anchor = anchor.rebased(page_text, start, end, context_chars);
                    rebased.push((
                        id.clone(),
                        AnnotationBody::TextMarkup {
                            kind: *kind,
                            anchor,
                            coordinates: coordinates.clone(),
                        },
                    ));
                    report.relocated.push(id);
                }
                AnchorStatus::Drifted => {
                    tracing::warn!(%id, page, "text anchor drifted; keeping last known position");
                    report.drifted.push(id);
                }
            }
        }

        for (id, body) in rebased {
            self.model.update(&id, AnnotationPatch::body(body));
        }
        for id in report.intact.iter().chain(&report.relocated) {
            self.drifted.remove(id);
        }
        self.drifted.extend(report.drifted.iter().cloned());
        report
    }

    pub fn is_drifted(&self, id: &AnnotationId) -> bool {
        self.drifted.contains(id)
    }

    pub fn drifted(&self) -> Vec<AnnotationId> {
        self.drifted.iter().cloned().collect()
    }

    // ---------------------------------------------------------------------
    // Rendering
    // ---------------------------------------------------------------------

    /// Screen-space items for a page, including the active preview
    pub fn render(&self, page: u32) -> Vec<RenderItem> {
        let viewport = self.viewports.peek(page).map(|v| v as &dyn ViewportTransform);
        project_page(&self.model, page, viewport, self.tools.preview().as_ref())
    }

    /// Repaint a page on a host surface
    pub fn render_to<S: RenderSurface>(&self, adapter: &mut RenderAdapter<S>, page: u32) -> usize {
        let viewport = self.viewports.peek(page).map(|v| v as &dyn ViewportTransform);
        adapter.render_page(&self.model, page, viewport, self.tools.preview().as_ref())
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Replace the content with freshly loaded annotations
    ///
    /// The save queue treats loaded annotations as already persisted.
    pub fn apply_load(&mut self, annotations: Vec<Annotation>) {
        self.tools.cancel();
        self.drifted.clear();
        self.model.replace_all(annotations);
        self.queue.reset(&self.model);
    }

    /// Collect this frame's persistence work
    pub fn take_batch(&mut self) -> PersistenceResult<Option<SaveBatch>> {
        self.queue.take_batch(&self.model)
    }

    /// Apply backend answers for a batch from [`take_batch`](Self::take_batch)
    pub fn complete_batch(
        &mut self,
        batch: SaveBatch,
        saved: PersistenceResult<Vec<WireRecord>>,
        deleted: PersistenceResult<()>,
    ) -> FlushReport {
        let report = self.queue.complete_batch(&mut self.model, batch, saved, deleted);
        for (old, new) in &report.reconciled {
            if self.drifted.remove(old) {
                self.drifted.insert(new.clone());
            }
        }
        report
    }

    /// Re-queue parked saves and deletes
    pub fn retry_failed(&mut self) -> usize {
        self.queue.retry_failed()
    }
}

/// Load the session's document through `adapter`
///
/// Unreadable records are skipped and reported in the outcome.
pub async fn load<B: AnnotationBackend>(
    session: &RefCell<AnnotationSession>,
    adapter: &PersistenceAdapter<B>,
) -> PersistenceResult<LoadOutcome> {
    let document_id = session.borrow().document_id().clone();
    let outcome = adapter.load(&document_id).await?;
    session.borrow_mut().apply_load(outcome.annotations.clone());
    Ok(outcome)
}

/// Send this frame's queued work and apply the answers
///
/// Returns `None` when nothing was queued. The session is only borrowed
/// before and after the backend call, so input keeps flowing meanwhile.
pub async fn flush<B: AnnotationBackend>(
    session: &RefCell<AnnotationSession>,
    adapter: &PersistenceAdapter<B>,
) -> PersistenceResult<Option<FlushReport>> {
    let batch = session.borrow_mut().take_batch()?;
    let Some(batch) = batch else {
        return Ok(None);
    };
    let (saved, deleted) = adapter.send(&batch).await;
    Ok(Some(session.borrow_mut().complete_batch(batch, saved, deleted)))
}
