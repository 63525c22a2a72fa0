//! In-memory annotation store
//!
//! Holds every annotation of the open document, indexed by id and by page,
//! plus the current selection. Two notification channels are exposed:
//! "annotations changed" (full current list after any mutation) and
//! "selection changed" (current selected ids). Listeners are plain callbacks
//! registered and removed through the [`ListenerId`] handed back on
//! registration.
//!
//! Every mutation bumps a per-annotation revision number. The save queue uses
//! revisions to diff the model against what the backend has seen and to
//! recognise stale responses.

use crate::annotation::{Annotation, AnnotationBody, AnnotationId, AnnotationStyle};
use crate::transform::{Placement, ViewportTransform};
use std::collections::{HashMap, HashSet};

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type AnnotationsListener = Box<dyn FnMut(&[Annotation])>;
type SelectionListener = Box<dyn FnMut(&[AnnotationId])>;

/// Partial update applied by [`AnnotationModel::update`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationPatch {
    pub body: Option<AnnotationBody>,
    pub style: Option<AnnotationStyle>,
    pub tags: Option<Vec<String>>,
    pub locked: Option<bool>,
    pub placement: Option<Placement>,
}

impl AnnotationPatch {
    pub fn body(body: AnnotationBody) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn style(style: AnnotationStyle) -> Self {
        Self {
            style: Some(style),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    annotation: Annotation,
    revision: u64,
}

/// Annotation store with change and selection notifications
#[derive(Default)]
pub struct AnnotationModel {
    /// All annotations indexed by ID
    entries: HashMap<AnnotationId, Entry>,

    /// Insertion order, used for the "annotations changed" snapshot
    order: Vec<AnnotationId>,

    /// Annotations organized by page for efficient page lookups
    by_page: HashMap<u32, Vec<AnnotationId>>,

    /// Selected ids, in selection order
    selection: Vec<AnnotationId>,

    /// Monotonic revision counter shared by all entries
    revision_counter: u64,

    next_listener: u64,
    annotation_listeners: Vec<(ListenerId, AnnotationsListener)>,
    selection_listeners: Vec<(ListenerId, SelectionListener)>,
}

impl std::fmt::Debug for AnnotationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationModel")
            .field("annotations", &self.order.len())
            .field("selection", &self.selection)
            .field("annotation_listeners", &self.annotation_listeners.len())
            .field("selection_listeners", &self.selection_listeners.len())
            .finish()
    }
}

impl AnnotationModel {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------
    // Listeners
    // ---------------------------------------------------------------------

    /// Register a callback for "annotations changed"
    pub fn on_annotations_changed(
        &mut self,
        listener: impl FnMut(&[Annotation]) + 'static,
    ) -> ListenerId {
        let id = self.next_listener_id();
        self.annotation_listeners.push((id, Box::new(listener)));
        id
    }

    /// Register a callback for "selection changed"
    pub fn on_selection_changed(
        &mut self,
        listener: impl FnMut(&[AnnotationId]) + 'static,
    ) -> ListenerId {
        let id = self.next_listener_id();
        self.selection_listeners.push((id, Box::new(listener)));
        id
    }

    /// Unregister a listener from either channel
    ///
    /// Returns `false` if no listener had this id.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.annotation_listeners.len() + self.selection_listeners.len();
        self.annotation_listeners.retain(|(lid, _)| *lid != id);
        self.selection_listeners.retain(|(lid, _)| *lid != id);
        before != self.annotation_listeners.len() + self.selection_listeners.len()
    }

    fn next_listener_id(&mut self) -> ListenerId {
        self.next_listener += 1;
        ListenerId(self.next_listener)
    }

    fn notify_annotations(&mut self) {
        if self.annotation_listeners.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for (_, listener) in &mut self.annotation_listeners {
            listener(&snapshot);
        }
    }

    fn notify_selection(&mut self) {
        let selection = self.selection.clone();
        for (_, listener) in &mut self.selection_listeners {
            listener(&selection);
        }
    }

    fn next_revision(&mut self) -> u64 {
        self.revision_counter += 1;
        self.revision_counter
    }

    // ---------------------------------------------------------------------
    // CRUD
    // ---------------------------------------------------------------------

    /// Insert a new annotation
    ///
    /// An annotation whose id is already present replaces the existing entry.
    pub fn create(&mut self, annotation: Annotation) -> AnnotationId {
        let id = annotation.id.clone();
        self.insert_entry(annotation);
        self.notify_annotations();
        id
    }

    /// Insert many annotations with a single notification
    pub fn create_many(&mut self, annotations: impl IntoIterator<Item = Annotation>) -> Vec<AnnotationId> {
        let ids: Vec<AnnotationId> = annotations
            .into_iter()
            .map(|annotation| {
                let id = annotation.id.clone();
                self.insert_entry(annotation);
                id
            })
            .collect();
        if !ids.is_empty() {
            self.notify_annotations();
        }
        ids
    }

    fn insert_entry(&mut self, annotation: Annotation) {
        let id = annotation.id.clone();
        if self.entries.contains_key(&id) {
            tracing::warn!(%id, "create with existing id replaces the annotation");
            self.detach(&id);
        }

        let revision = self.next_revision();
        self.by_page
            .entry(annotation.page_number)
            .or_default()
            .push(id.clone());
        self.order.push(id.clone());
        self.entries.insert(id, Entry { annotation, revision });
    }

    /// Apply a partial update
    ///
    /// Unknown ids are ignored and return `false`; a delete racing an edit
    /// must not take the UI down.
    pub fn update(&mut self, id: &AnnotationId, patch: AnnotationPatch) -> bool {
        if patch.is_empty() {
            return self.entries.contains_key(id);
        }
        let revision = self.next_revision();
        let Some(entry) = self.entries.get_mut(id) else {
            tracing::debug!(%id, "update of unknown annotation ignored");
            return false;
        };

        let annotation = &mut entry.annotation;
        if let Some(body) = patch.body {
            annotation.body = body;
        }
        if let Some(style) = patch.style {
            annotation.style = style;
        }
        if let Some(tags) = patch.tags {
            annotation.metadata.tags = tags;
        }
        if let Some(locked) = patch.locked {
            annotation.metadata.locked = locked;
        }
        if let Some(placement) = patch.placement {
            annotation.placement = placement;
        }
        annotation.metadata.touch();
        entry.revision = revision;

        self.notify_annotations();
        true
    }

    /// Remove an annotation
    ///
    /// Unknown ids are a no-op returning `None`.
    pub fn delete(&mut self, id: &AnnotationId) -> Option<Annotation> {
        let removed = self.detach(id)?;
        let selection_changed = self.drop_from_selection(std::slice::from_ref(id));
        self.notify_annotations();
        if selection_changed {
            self.notify_selection();
        }
        Some(removed)
    }

    /// Remove several annotations with a single notification per channel
    pub fn delete_many(&mut self, ids: &[AnnotationId]) -> Vec<Annotation> {
        let removed: Vec<Annotation> = ids.iter().filter_map(|id| self.detach(id)).collect();
        if removed.is_empty() {
            return removed;
        }
        let selection_changed = self.drop_from_selection(ids);
        self.notify_annotations();
        if selection_changed {
            self.notify_selection();
        }
        removed
    }

    fn detach(&mut self, id: &AnnotationId) -> Option<Annotation> {
        let entry = self.entries.remove(id)?;
        let page = entry.annotation.page_number;
        if let Some(page_ids) = self.by_page.get_mut(&page) {
            page_ids.retain(|aid| aid != id);
            if page_ids.is_empty() {
                self.by_page.remove(&page);
            }
        }
        self.order.retain(|aid| aid != id);
        Some(entry.annotation)
    }

    /// Replace the whole content (document load) with one notification
    pub fn replace_all(&mut self, annotations: Vec<Annotation>) {
        self.entries.clear();
        self.order.clear();
        self.by_page.clear();
        for annotation in annotations {
            self.insert_entry(annotation);
        }
        let had_selection = !self.selection.is_empty();
        self.selection.clear();
        self.notify_annotations();
        if had_selection {
            self.notify_selection();
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn get(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.entries.get(id).map(|entry| &entry.annotation)
    }

    pub fn contains(&self, id: &AnnotationId) -> bool {
        self.entries.contains_key(id)
    }

    /// Revision of the annotation's current state
    pub fn revision(&self, id: &AnnotationId) -> Option<u64> {
        self.entries.get(id).map(|entry| entry.revision)
    }

    /// Annotations on a page, in creation order
    pub fn get_by_page(&self, page: u32) -> Vec<&Annotation> {
        self.by_page
            .get(&page)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// All annotations, in creation order
    pub fn all(&self) -> Vec<&Annotation> {
        self.order.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Owned copy of every annotation, in creation order
    pub fn snapshot(&self) -> Vec<Annotation> {
        self.all().into_iter().cloned().collect()
    }

    /// Ids with their current revision, in creation order
    pub fn revisions(&self) -> Vec<(AnnotationId, u64)> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|entry| (id.clone(), entry.revision)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ---------------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------------

    /// Replace the selection
    ///
    /// Ids that are not in the model are dropped silently, as are duplicates.
    pub fn select(&mut self, ids: &[AnnotationId]) {
        let mut seen = HashSet::new();
        let selection: Vec<AnnotationId> = ids
            .iter()
            .filter(|id| self.entries.contains_key(id) && seen.insert((*id).clone()))
            .cloned()
            .collect();

        if selection != self.selection {
            self.selection = selection;
            self.notify_selection();
        }
    }

    pub fn clear_selection(&mut self) {
        self.select(&[]);
    }

    pub fn get_selection(&self) -> &[AnnotationId] {
        &self.selection
    }

    pub fn is_selected(&self, id: &AnnotationId) -> bool {
        self.selection.contains(id)
    }

    fn drop_from_selection(&mut self, ids: &[AnnotationId]) -> bool {
        let before = self.selection.len();
        self.selection.retain(|id| !ids.contains(id));
        before != self.selection.len()
    }

    // ---------------------------------------------------------------------
    // Reconciliation
    // ---------------------------------------------------------------------

    /// Replace an id everywhere it is referenced
    ///
    /// Used when the backend confirms a client-generated id. The annotation
    /// keeps its revision. Returns `false` when `old` is unknown or `new` is
    /// already taken.
    pub fn rename_id(&mut self, old: &AnnotationId, new: AnnotationId) -> bool {
        if old == &new {
            return self.entries.contains_key(old);
        }
        if self.entries.contains_key(&new) {
            tracing::warn!(%old, %new, "cannot reconcile id: target already exists");
            return false;
        }
        let Some(mut entry) = self.entries.remove(old) else {
            return false;
        };

        entry.annotation.id = new.clone();
        let page = entry.annotation.page_number;
        self.entries.insert(new.clone(), entry);

        let replace = |ids: &mut Vec<AnnotationId>| {
            for id in ids.iter_mut().filter(|id| *id == old) {
                *id = new.clone();
            }
        };
        replace(&mut self.order);
        if let Some(page_ids) = self.by_page.get_mut(&page) {
            replace(page_ids);
        }

        let selected = self.selection.contains(old);
        replace(&mut self.selection);

        self.notify_annotations();
        if selected {
            self.notify_selection();
        }
        true
    }

    /// Convert approximate annotations on `page` to document units
    ///
    /// Returns the ids that were resolved.
    pub fn resolve_approximate<V: ViewportTransform + ?Sized>(
        &mut self,
        page: u32,
        viewport: &V,
    ) -> Vec<AnnotationId> {
        let ids: Vec<AnnotationId> = self
            .get_by_page(page)
            .into_iter()
            .filter(|annotation| annotation.is_approximate())
            .map(|annotation| annotation.id.clone())
            .collect();

        for id in &ids {
            let revision = self.next_revision();
            if let Some(entry) = self.entries.get_mut(id) {
                entry.annotation.resolve_placement(viewport);
                entry.revision = revision;
            }
        }

        if !ids.is_empty() {
            tracing::debug!(page, resolved = ids.len(), "resolved approximate annotations");
            self.notify_annotations();
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{DocumentId, ShapeGeometry, ShapeKind};
    use crate::geometry::Rect;
    use crate::transform::{Rotation, Viewport};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn rect_annotation(page: u32, x: f64) -> Annotation {
        Annotation::new(
            DocumentId::new("doc"),
            page,
            AnnotationBody::Shape {
                kind: ShapeKind::Rectangle,
                geometry: ShapeGeometry::Rect(Rect::new(x, 0.0, 10.0, 10.0)),
            },
            AnnotationStyle::red_markup(),
        )
    }

    #[test]
    fn test_create_and_get_by_page() {
        let mut model = AnnotationModel::new();
        let a = model.create(rect_annotation(1, 0.0));
        let b = model.create(rect_annotation(2, 0.0));
        let c = model.create(rect_annotation(1, 50.0));

        assert_eq!(model.len(), 3);
        let page_one: Vec<_> = model.get_by_page(1).iter().map(|a| a.id.clone()).collect();
        assert_eq!(page_one, vec![a, c]);
        assert_eq!(model.get_by_page(2)[0].id, b);
        assert!(model.get_by_page(3).is_empty());
    }

    #[test]
    fn test_update_and_delete_unknown_are_noops() {
        let mut model = AnnotationModel::new();
        let unknown = AnnotationId::new_local();

        assert!(!model.update(&unknown, AnnotationPatch::style(AnnotationStyle::new())));
        assert!(model.delete(&unknown).is_none());
        assert!(model.delete_many(&[unknown]).is_empty());
    }

    #[test]
    fn test_update_bumps_revision() {
        let mut model = AnnotationModel::new();
        let id = model.create(rect_annotation(1, 0.0));
        let before = model.revision(&id).unwrap();

        assert!(model.update(
            &id,
            AnnotationPatch {
                locked: Some(true),
                ..Default::default()
            }
        ));

        assert!(model.revision(&id).unwrap() > before);
        assert!(model.get(&id).unwrap().is_locked());
    }

    #[test]
    fn test_selection_drops_unknown_ids() {
        let mut model = AnnotationModel::new();
        let id = model.create(rect_annotation(1, 0.0));
        let stale = AnnotationId::new_local();

        model.select(&[id.clone(), stale, id.clone()]);

        assert_eq!(model.get_selection(), &[id]);
    }

    #[test]
    fn test_listeners_receive_notifications() {
        let mut model = AnnotationModel::new();
        let counts = Rc::new(RefCell::new(Vec::new()));
        let selections = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&counts);
        let first = model.on_annotations_changed(move |all| sink.borrow_mut().push(all.len()));
        let sink = Rc::clone(&counts);
        model.on_annotations_changed(move |all| sink.borrow_mut().push(all.len() * 100));
        let sink = Rc::clone(&selections);
        model.on_selection_changed(move |ids| sink.borrow_mut().push(ids.len()));

        let id = model.create(rect_annotation(1, 0.0));
        model.select(&[id.clone()]);
        model.delete(&id);

        assert_eq!(*counts.borrow(), vec![1, 100, 0, 0]);
        assert_eq!(*selections.borrow(), vec![1, 0]);

        assert!(model.remove_listener(first));
        assert!(!model.remove_listener(first));
        model.create(rect_annotation(1, 0.0));
        assert_eq!(counts.borrow().last(), Some(&100));
    }

    #[test]
    fn test_delete_many_notifies_once() {
        let mut model = AnnotationModel::new();
        let notifications = Rc::new(RefCell::new(0));
        let a = model.create(rect_annotation(1, 0.0));
        let b = model.create(rect_annotation(1, 20.0));

        let sink = Rc::clone(&notifications);
        model.on_annotations_changed(move |_| *sink.borrow_mut() += 1);

        let removed = model.delete_many(&[a, b]);
        assert_eq!(removed.len(), 2);
        assert_eq!(*notifications.borrow(), 1);
        assert!(model.is_empty());
    }

    #[test]
    fn test_rename_id_rewrites_every_reference() {
        let mut model = AnnotationModel::new();
        let local = model.create(rect_annotation(3, 0.0));
        model.select(&[local.clone()]);
        let revision = model.revision(&local);

        let remote = AnnotationId::Remote("srv-1".to_string());
        assert!(model.rename_id(&local, remote.clone()));

        assert!(model.get(&local).is_none());
        assert_eq!(model.get(&remote).unwrap().id, remote);
        assert_eq!(model.get_selection(), &[remote.clone()]);
        assert_eq!(model.get_by_page(3)[0].id, remote);
        assert_eq!(model.revision(&remote), revision);
        assert!(model.all().iter().all(|a| a.id != local));
    }

    #[test]
    fn test_resolve_approximate_only_touches_page() {
        let mut model = AnnotationModel::new();
        let approximate = model.create(rect_annotation(1, 0.0).with_placement(Placement::Approximate));
        let other_page = model.create(rect_annotation(2, 0.0).with_placement(Placement::Approximate));
        let viewport = Viewport::new(100.0, 100.0, 1.0, Rotation::Deg0).unwrap();

        let resolved = model.resolve_approximate(1, &viewport);

        assert_eq!(resolved, vec![approximate.clone()]);
        assert!(!model.get(&approximate).unwrap().is_approximate());
        assert!(model.get(&other_page).unwrap().is_approximate());
    }
}
