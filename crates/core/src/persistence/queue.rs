//! Save queue: frame-coalesced, diff-based persistence of model changes
//!
//! The queue never stores annotations. It remembers, per id, which revision
//! the backend has confirmed, which revision is in flight and which revision
//! failed. Once per animation frame the host calls [`SaveQueue::take_batch`],
//! which diffs the model's current revisions against that bookkeeping and
//! yields at most one save request (new and changed annotations) and one
//! delete request (ids that left the model). Unchanged annotations are never
//! re-sent.
//!
//! Rules:
//! - one request per id at a time; edits made while a save is in flight are
//!   picked up by the next batch, so per-id order is the local order
//! - responses never overwrite local content; the server is only consulted
//!   for id assignment
//! - a response for a revision older than the confirmed one is ignored
//! - failures are parked, never retried automatically; a newer local edit or
//!   [`SaveQueue::retry_failed`] re-queues them
//! - approximate annotations are withheld until their page resolves them

use super::wire::{encode, WireRecord};
use crate::annotation::AnnotationId;
use crate::config::PersistenceConfig;
use crate::error::{PersistenceError, PersistenceResult};
use crate::model::AnnotationModel;
use std::collections::{HashMap, HashSet};

/// Identifier of a batch handed out by [`SaveQueue::take_batch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

/// One annotation included in a save request
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSave {
    /// Id at the time the batch was taken
    pub id: AnnotationId,
    /// Model revision that `record` encodes
    pub revision: u64,
    pub record: WireRecord,
}

impl PendingSave {
    pub fn is_create(&self) -> bool {
        self.id.is_local()
    }
}

/// Work for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct SaveBatch {
    pub id: BatchId,
    pub saves: Vec<PendingSave>,
    /// Server ids to delete
    pub deletes: Vec<String>,
}

impl SaveBatch {
    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.deletes.is_empty()
    }

    pub fn records(&self) -> Vec<WireRecord> {
        self.saves.iter().map(|save| save.record.clone()).collect()
    }
}

/// Outcome of applying backend responses
#[derive(Debug, Default)]
pub struct FlushReport {
    /// `(client id, server id)` pairs applied to the model
    pub reconciled: Vec<(AnnotationId, AnnotationId)>,
    /// Saves confirmed by the backend
    pub saved: usize,
    /// Server ids confirmed deleted
    pub deleted: Vec<String>,
    /// Responses ignored because local state had moved on
    pub stale: usize,
    /// Annotations whose save failed and is now parked
    pub failed_saves: Vec<AnnotationId>,
    /// Server ids whose delete failed and is now parked
    pub failed_deletes: Vec<String>,
    pub errors: Vec<PersistenceError>,
}

impl FlushReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Frame-coalescing save queue
#[derive(Debug)]
pub struct SaveQueue {
    config: PersistenceConfig,

    /// Ids the backend knows, with the revision it last confirmed
    confirmed: HashMap<AnnotationId, u64>,

    /// Ids with a save in flight, with the revision being sent
    in_flight: HashMap<AnnotationId, u64>,

    /// Ids whose save failed at the recorded revision
    failed: HashMap<AnnotationId, u64>,

    /// Server ids waiting for the next delete request
    pending_deletes: Vec<String>,

    /// Server ids with a delete in flight
    deletes_in_flight: HashSet<String>,

    /// Server ids whose delete failed
    failed_deletes: Vec<String>,

    next_batch: u64,
}

impl SaveQueue {
    /// Create an empty queue
    pub fn new(config: PersistenceConfig) -> Self {
        Self {
            config,
            confirmed: HashMap::new(),
            in_flight: HashMap::new(),
            failed: HashMap::new(),
            pending_deletes: Vec::new(),
            deletes_in_flight: HashSet::new(),
            failed_deletes: Vec::new(),
            next_batch: 0,
        }
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Forget all bookkeeping and treat the model's remote ids as confirmed
    ///
    /// Called after a document load so loaded annotations are not re-sent.
    pub fn reset(&mut self, model: &AnnotationModel) {
        self.confirmed = model
            .revisions()
            .into_iter()
            .filter(|(id, _)| !id.is_local())
            .collect();
        self.in_flight.clear();
        self.failed.clear();
        self.pending_deletes.clear();
        self.deletes_in_flight.clear();
        self.failed_deletes.clear();
    }

    /// Whether anything is waiting in flight
    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty() || !self.deletes_in_flight.is_empty()
    }

    /// Ids whose last save attempt failed
    pub fn failed(&self) -> Vec<AnnotationId> {
        self.failed.keys().cloned().collect()
    }

    pub fn is_confirmed(&self, id: &AnnotationId) -> bool {
        self.confirmed.contains_key(id)
    }

    /// Re-queue every parked save and delete
    pub fn retry_failed(&mut self) -> usize {
        let count = self.failed.len() + self.failed_deletes.len();
        self.failed.clear();
        self.pending_deletes.append(&mut self.failed_deletes);
        if count > 0 {
            tracing::info!(count, "re-queued failed persistence operations");
        }
        count
    }

    /// Collect this frame's work
    ///
    /// Returns `None` when there is nothing to send.
    pub fn take_batch(&mut self, model: &AnnotationModel) -> PersistenceResult<Option<SaveBatch>> {
        // Deletions: confirmed ids that are no longer in the model
        let mut removed: Vec<AnnotationId> = self
            .confirmed
            .keys()
            .filter(|id| !model.contains(id))
            .cloned()
            .collect();
        removed.sort();
        for id in removed {
            self.confirmed.remove(&id);
            self.failed.remove(&id);
            if let Some(remote) = id.remote() {
                self.pending_deletes.push(remote.to_string());
            }
        }
        self.failed.retain(|id, _| model.contains(id));

        let mut saves = Vec::new();
        for (id, revision) in model.revisions() {
            if self.in_flight.contains_key(&id)
                || self.failed.get(&id) == Some(&revision)
                || self.confirmed.get(&id) == Some(&revision)
            {
                continue;
            }
            let Some(annotation) = model.get(&id) else {
                continue;
            };
            if annotation.is_approximate() {
                tracing::debug!(%id, "withholding approximate annotation until its page resolves");
                continue;
            }

            self.failed.remove(&id);
            let record = encode(annotation, &self.config)?;
            saves.push(PendingSave {
                id,
                revision,
                record,
            });
        }

        let deletes: Vec<String> = self
            .pending_deletes
            .drain(..)
            .filter(|remote| !self.deletes_in_flight.contains(remote))
            .collect();

        if saves.is_empty() && deletes.is_empty() {
            return Ok(None);
        }

        for save in &saves {
            self.in_flight.insert(save.id.clone(), save.revision);
        }
        self.deletes_in_flight.extend(deletes.iter().cloned());

        self.next_batch += 1;
        let batch = SaveBatch {
            id: BatchId(self.next_batch),
            saves,
            deletes,
        };
        tracing::debug!(
            batch = batch.id.0,
            saves = batch.saves.len(),
            deletes = batch.deletes.len(),
            "composed save batch"
        );
        Ok(Some(batch))
    }

    /// Apply the backend's answers for `batch`
    ///
    /// `saved` must hold one confirmed record per entry of `batch.saves`, in
    /// order. Successful creates are reconciled into the model (the client id
    /// is replaced by the server id everywhere).
    pub fn complete_batch(
        &mut self,
        model: &mut AnnotationModel,
        batch: SaveBatch,
        saved: PersistenceResult<Vec<WireRecord>>,
        deleted: PersistenceResult<()>,
    ) -> FlushReport {
        let mut report = FlushReport::default();

        let saved = saved.and_then(|records| {
            if records.len() == batch.saves.len() {
                Ok(records)
            } else {
                Err(PersistenceError::Protocol(format!(
                    "sent {} records, backend confirmed {}",
                    batch.saves.len(),
                    records.len()
                )))
            }
        });

        match saved {
            Ok(records) => {
                for (save, record) in batch.saves.into_iter().zip(records) {
                    self.confirm_save(model, save, record, &mut report);
                }
            }
            Err(err) => {
                for save in batch.saves {
                    self.in_flight.remove(&save.id);
                    self.failed.insert(save.id.clone(), save.revision);
                    report.failed_saves.push(save.id);
                }
                tracing::warn!(
                    error = %err,
                    parked = report.failed_saves.len(),
                    "save failed; local changes kept"
                );
                report.errors.push(err);
            }
        }

        for remote in &batch.deletes {
            self.deletes_in_flight.remove(remote);
        }
        match deleted {
            Ok(()) => report.deleted = batch.deletes,
            Err(err) => {
                tracing::warn!(error = %err, count = batch.deletes.len(), "delete failed");
                report.failed_deletes = batch.deletes.clone();
                self.failed_deletes.extend(batch.deletes);
                report.errors.push(err);
            }
        }

        if report.is_success() {
            tracing::info!(
                batch = batch.id.0,
                saved = report.saved,
                reconciled = report.reconciled.len(),
                deleted = report.deleted.len(),
                "save batch complete"
            );
        }
        report
    }

    fn confirm_save(
        &mut self,
        model: &mut AnnotationModel,
        save: PendingSave,
        record: WireRecord,
        report: &mut FlushReport,
    ) {
        self.in_flight.remove(&save.id);

        let server_id = match (&save.id, record.id) {
            (AnnotationId::Remote(_), _) => save.id.clone(),
            (AnnotationId::Local(_), Some(server)) if !server.is_empty() => AnnotationId::Remote(server),
            (AnnotationId::Local(_), _) => {
                let err = PersistenceError::MissingField("id");
                tracing::warn!(id = %save.id, "backend confirmed a create without an id");
                self.failed.insert(save.id.clone(), save.revision);
                report.failed_saves.push(save.id);
                report.errors.push(err);
                return;
            }
        };

        if self
            .confirmed
            .get(&server_id)
            .is_some_and(|confirmed| *confirmed >= save.revision)
        {
            tracing::warn!(id = %server_id, revision = save.revision, "ignoring stale save response");
            report.stale += 1;
            return;
        }

        if save.id.is_local() {
            if !model.contains(&save.id) {
                // Deleted while the create was in flight
                if let Some(remote) = server_id.remote() {
                    self.pending_deletes.push(remote.to_string());
                }
                report.saved += 1;
                return;
            }
            if !model.rename_id(&save.id, server_id.clone()) {
                tracing::warn!(id = %save.id, server = %server_id, "could not reconcile server id");
                report.stale += 1;
                return;
            }
            report.reconciled.push((save.id.clone(), server_id.clone()));
        }

        self.failed.remove(&server_id);
        self.confirmed.insert(server_id, save.revision);
        report.saved += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Annotation, AnnotationBody, AnnotationStyle, DocumentId};
    use crate::geometry::{Point, Rect};
    use crate::model::AnnotationPatch;
    use crate::transform::Placement;

    fn note(model: &mut AnnotationModel, text: &str) -> AnnotationId {
        model.create(Annotation::new(
            DocumentId::new("doc"),
            1,
            AnnotationBody::Note {
                position: Point::new(10.0, 10.0),
                text: text.to_string(),
            },
            AnnotationStyle::text(),
        ))
    }

    fn confirm(batch: &SaveBatch, prefix: &str) -> Vec<WireRecord> {
        batch
            .saves
            .iter()
            .enumerate()
            .map(|(index, save)| {
                let mut record = save.record.clone();
                if record.id.is_none() {
                    record.id = Some(format!("{prefix}-{index}"));
                }
                record
            })
            .collect()
    }

    #[test]
    fn test_unchanged_annotations_are_not_resent() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        note(&mut model, "a");

        let batch = queue.take_batch(&model).unwrap().unwrap();
        let records = confirm(&batch, "srv");
        queue.complete_batch(&mut model, batch, Ok(records), Ok(()));

        assert!(queue.take_batch(&model).unwrap().is_none());
    }

    #[test]
    fn test_frame_coalesces_creates_and_edits() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        let a = note(&mut model, "a");
        note(&mut model, "b");
        model.update(&a, AnnotationPatch::style(AnnotationStyle::red_markup()));

        let batch = queue.take_batch(&model).unwrap().unwrap();
        assert_eq!(batch.saves.len(), 2);
        assert!(batch.saves.iter().all(PendingSave::is_create));
        assert!(batch.deletes.is_empty());
    }

    #[test]
    fn test_reconciles_ids_and_selection() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        let local = note(&mut model, "a");
        model.select(&[local.clone()]);

        let batch = queue.take_batch(&model).unwrap().unwrap();
        let records = confirm(&batch, "srv");
        let report = queue.complete_batch(&mut model, batch, Ok(records), Ok(()));

        let remote = AnnotationId::Remote("srv-0".to_string());
        assert_eq!(report.reconciled, vec![(local.clone(), remote.clone())]);
        assert!(model.get(&local).is_none());
        assert_eq!(model.get_selection(), &[remote.clone()]);
        assert!(queue.is_confirmed(&remote));
    }

    #[test]
    fn test_edit_during_flight_is_sent_next_frame() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        let local = note(&mut model, "a");

        let batch = queue.take_batch(&model).unwrap().unwrap();
        model.update(&local, AnnotationPatch::style(AnnotationStyle::red_markup()));

        // Still in flight: nothing new to send
        assert!(queue.take_batch(&model).unwrap().is_none());

        let records = confirm(&batch, "srv");
        queue.complete_batch(&mut model, batch, Ok(records), Ok(()));

        let next = queue.take_batch(&model).unwrap().unwrap();
        assert_eq!(next.saves.len(), 1);
        assert_eq!(next.saves[0].record.id.as_deref(), Some("srv-0"));
        assert_eq!(next.saves[0].record.data["style"]["color"], "#ff0000");
    }

    #[test]
    fn test_delete_of_unsaved_sends_nothing() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        let local = note(&mut model, "a");
        model.delete(&local);

        assert!(queue.take_batch(&model).unwrap().is_none());
    }

    #[test]
    fn test_delete_during_create_flight_deletes_server_id() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        let local = note(&mut model, "a");

        let batch = queue.take_batch(&model).unwrap().unwrap();
        model.delete(&local);
        let records = confirm(&batch, "srv");
        let report = queue.complete_batch(&mut model, batch, Ok(records), Ok(()));
        assert!(report.reconciled.is_empty());

        let next = queue.take_batch(&model).unwrap().unwrap();
        assert!(next.saves.is_empty());
        assert_eq!(next.deletes, vec!["srv-0".to_string()]);
    }

    #[test]
    fn test_failure_is_parked_until_new_edit() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        let local = note(&mut model, "a");

        let batch = queue.take_batch(&model).unwrap().unwrap();
        let report = queue.complete_batch(
            &mut model,
            batch,
            Err(PersistenceError::Backend("offline".to_string())),
            Ok(()),
        );
        assert_eq!(report.failed_saves, vec![local.clone()]);
        assert!(model.contains(&local));

        // Parked: not retried on its own
        assert!(queue.take_batch(&model).unwrap().is_none());

        model.update(
            &local,
            AnnotationPatch {
                tags: Some(vec!["again".to_string()]),
                ..Default::default()
            },
        );
        assert_eq!(queue.take_batch(&model).unwrap().unwrap().saves.len(), 1);
    }

    #[test]
    fn test_retry_failed_requeues() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        note(&mut model, "a");

        let batch = queue.take_batch(&model).unwrap().unwrap();
        queue.complete_batch(
            &mut model,
            batch,
            Err(PersistenceError::Backend("offline".to_string())),
            Ok(()),
        );

        assert_eq!(queue.retry_failed(), 1);
        assert_eq!(queue.take_batch(&model).unwrap().unwrap().saves.len(), 1);
    }

    #[test]
    fn test_short_response_is_a_protocol_error() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        note(&mut model, "a");

        let batch = queue.take_batch(&model).unwrap().unwrap();
        let report = queue.complete_batch(&mut model, batch, Ok(Vec::new()), Ok(()));

        assert!(matches!(report.errors[0], PersistenceError::Protocol(_)));
        assert_eq!(report.failed_saves.len(), 1);
    }

    #[test]
    fn test_approximate_annotations_are_withheld() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        model.create(
            Annotation::new(
                DocumentId::new("doc"),
                1,
                AnnotationBody::TextBox {
                    rect: Rect::new(0.0, 0.0, 50.0, 20.0),
                    text: "draft".to_string(),
                },
                AnnotationStyle::text(),
            )
            .with_placement(Placement::Approximate),
        );

        assert!(queue.take_batch(&model).unwrap().is_none());
    }

    #[test]
    fn test_reset_treats_loaded_annotations_as_confirmed() {
        let mut model = AnnotationModel::new();
        let mut annotation = Annotation::new(
            DocumentId::new("doc"),
            1,
            AnnotationBody::Note {
                position: Point::default(),
                text: String::new(),
            },
            AnnotationStyle::text(),
        );
        annotation.id = AnnotationId::Remote("srv-1".to_string());
        model.replace_all(vec![annotation]);

        let mut queue = SaveQueue::new(PersistenceConfig::default());
        queue.reset(&model);
        assert!(queue.take_batch(&model).unwrap().is_none());

        model.delete(&AnnotationId::Remote("srv-1".to_string()));
        let batch = queue.take_batch(&model).unwrap().unwrap();
        assert_eq!(batch.deletes, vec!["srv-1".to_string()]);
    }

    #[test]
    fn test_response_older_than_confirmed_is_ignored() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        note(&mut model, "a");
        let first = queue.take_batch(&model).unwrap().unwrap();
        let records = confirm(&first, "srv");
        queue.complete_batch(&mut model, first, Ok(records), Ok(()));
        let remote = AnnotationId::Remote("srv-0".to_string());

        // Edit goes out and stays in flight
        model.update(&remote, AnnotationPatch::style(AnnotationStyle::red_markup()));
        let older = queue.take_batch(&model).unwrap().unwrap();
        let older_revision = older.saves[0].revision;

        // Meanwhile a reload confirms a newer copy
        let mut newer = model.get(&remote).unwrap().clone();
        newer.style = AnnotationStyle::yellow_highlight();
        model.replace_all(vec![newer.clone()]);
        queue.reset(&model);
        let newer_revision = model.revision(&remote).unwrap();
        assert!(newer_revision > older_revision);

        let records = older.records();
        let report = queue.complete_batch(&mut model, older, Ok(records), Ok(()));

        assert_eq!(report.stale, 1);
        assert_eq!(report.saved, 0);
        assert!(report.is_success());
        assert_eq!(queue.confirmed.get(&remote), Some(&newer_revision));
        assert_eq!(model.get(&remote), Some(&newer));
        assert_eq!(model.revision(&remote), Some(newer_revision));
        assert!(queue.pending_deletes.is_empty());
        assert!(queue.take_batch(&model).unwrap().is_none());
    }

    #[test]
    fn test_failed_delete_is_parked() {
        let mut model = AnnotationModel::new();
        let mut queue = SaveQueue::new(PersistenceConfig::default());
        let local = note(&mut model, "a");
        let batch = queue.take_batch(&model).unwrap().unwrap();
        let records = confirm(&batch, "srv");
        queue.complete_batch(&mut model, batch, Ok(records), Ok(()));

        model.delete(&AnnotationId::Remote("srv-0".to_string()));
        let batch = queue.take_batch(&model).unwrap().unwrap();
        let report = queue.complete_batch(
            &mut model,
            batch,
            Ok(Vec::new()),
            Err(PersistenceError::Backend("offline".to_string())),
        );
        assert_eq!(report.failed_deletes, vec!["srv-0".to_string()]);
        assert!(queue.take_batch(&model).unwrap().is_none());

        queue.retry_failed();
        let batch = queue.take_batch(&model).unwrap().unwrap();
        assert_eq!(batch.deletes, vec!["srv-0".to_string()]);
        assert!(!model.contains(&local));
    }
}
