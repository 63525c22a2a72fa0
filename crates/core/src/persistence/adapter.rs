//! Backend boundary
//!
//! [`AnnotationBackend`] is the network (or storage) collaborator: it moves
//! wire records and nothing else. [`PersistenceAdapter`] sits on top of it,
//! converting between records and the internal model in both directions.
//!
//! Futures are `!Send` ([`LocalBoxFuture`]): everything runs on the UI
//! thread's executor and the core never spawns tasks of its own.

use super::queue::SaveBatch;
use super::wire::{decode, encode, GeometryAnomaly, WireRecord};
use crate::annotation::{Annotation, AnnotationId, DocumentId};
use crate::config::PersistenceConfig;
use crate::error::{PersistenceError, PersistenceResult};
use futures::future::{self, FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// Storage collaborator
///
/// `save` answers with one record per request record, in request order, each
/// carrying the server id.
pub trait AnnotationBackend {
    fn load(&self, document_id: DocumentId) -> LocalBoxFuture<'_, PersistenceResult<Vec<WireRecord>>>;

    fn save(&self, records: Vec<WireRecord>) -> LocalBoxFuture<'_, PersistenceResult<Vec<WireRecord>>>;

    fn delete(&self, ids: Vec<String>) -> LocalBoxFuture<'_, PersistenceResult<()>>;
}

/// A record the reader could not turn into an annotation
#[derive(Debug)]
pub struct RejectedRecord {
    pub id: Option<String>,
    pub error: PersistenceError,
}

/// Annotations read for a document
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub annotations: Vec<Annotation>,
    /// Fields replaced by defaults; the annotations are still included
    pub anomalies: Vec<GeometryAnomaly>,
    /// Records skipped entirely (unknown type, unreadable payload)
    pub rejected: Vec<RejectedRecord>,
}

/// Maps the internal model onto a backend
#[derive(Debug)]
pub struct PersistenceAdapter<B> {
    backend: B,
    config: PersistenceConfig,
}

impl<B: AnnotationBackend> PersistenceAdapter<B> {
    pub fn new(backend: B, config: PersistenceConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Load and normalize every annotation of a document
    ///
    /// Records that cannot be read at all are reported in
    /// [`LoadOutcome::rejected`]; one bad record never fails the load.
    pub async fn load(&self, document_id: &DocumentId) -> PersistenceResult<LoadOutcome> {
        let records = self.backend.load(document_id.clone()).await?;
        let mut outcome = LoadOutcome::default();

        for record in &records {
            match decode(record) {
                Ok(decoded) => {
                    outcome.annotations.push(decoded.annotation);
                    outcome.anomalies.extend(decoded.anomalies);
                }
                Err(error) => {
                    tracing::warn!(id = ?record.id, %error, "skipping unreadable annotation record");
                    outcome.rejected.push(RejectedRecord {
                        id: record.id.clone(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            document = %document_id,
            loaded = outcome.annotations.len(),
            anomalies = outcome.anomalies.len(),
            rejected = outcome.rejected.len(),
            "loaded annotations"
        );
        Ok(outcome)
    }

    /// Save annotations directly and return them with server ids
    ///
    /// Bypasses the save queue; content of the returned annotations is the
    /// local content, only ids come from the server.
    pub async fn save(&self, annotations: &[Annotation]) -> PersistenceResult<Vec<Annotation>> {
        let records = annotations
            .iter()
            .map(|annotation| encode(annotation, &self.config))
            .collect::<PersistenceResult<Vec<_>>>()?;
        let confirmed = self.backend.save(records).await?;
        if confirmed.len() != annotations.len() {
            return Err(PersistenceError::Protocol(format!(
                "sent {} records, backend confirmed {}",
                annotations.len(),
                confirmed.len()
            )));
        }

        annotations
            .iter()
            .zip(confirmed)
            .map(|(annotation, record)| {
                let id = record
                    .id
                    .filter(|id| !id.is_empty())
                    .ok_or(PersistenceError::MissingField("id"))?;
                let mut saved = annotation.clone();
                saved.id = AnnotationId::Remote(id);
                Ok(saved)
            })
            .collect()
    }

    /// Delete annotations by id
    ///
    /// Ids the backend never assigned are skipped.
    pub async fn delete(&self, ids: &[AnnotationId]) -> PersistenceResult<()> {
        let remote: Vec<String> = ids
            .iter()
            .filter_map(|id| id.remote().map(str::to_string))
            .collect();
        if remote.is_empty() {
            return Ok(());
        }
        self.backend.delete(remote).await
    }

    /// Send one queue batch: at most one save call and one delete call
    pub async fn send(
        &self,
        batch: &SaveBatch,
    ) -> (PersistenceResult<Vec<WireRecord>>, PersistenceResult<()>) {
        let saves: LocalBoxFuture<'_, PersistenceResult<Vec<WireRecord>>> = if batch.saves.is_empty() {
            future::ready(Ok(Vec::new())).boxed_local()
        } else {
            self.backend.save(batch.records())
        };
        let deletes: LocalBoxFuture<'_, PersistenceResult<()>> = if batch.deletes.is_empty() {
            future::ready(Ok(())).boxed_local()
        } else {
            self.backend.delete(batch.deletes.clone())
        };
        futures::join!(saves, deletes)
    }
}

/// In-process backend
///
/// Keeps records in memory and assigns sequential server ids. Every call is
/// logged so callers can observe batching. Useful offline and in tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RefCell<BTreeMap<String, WireRecord>>,
    next_id: Cell<u64>,
    save_calls: RefCell<Vec<Vec<WireRecord>>>,
    delete_calls: RefCell<Vec<Vec<String>>>,
    fail_saves: Cell<bool>,
    fail_deletes: Cell<bool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record as if it had been saved earlier
    pub fn insert(&self, record: WireRecord) -> String {
        let id = match &record.id {
            Some(id) => id.clone(),
            None => self.assign_id(),
        };
        let mut record = record;
        record.id = Some(id.clone());
        self.records.borrow_mut().insert(id.clone(), record);
        id
    }

    fn assign_id(&self) -> String {
        let next = self.next_id.get() + 1;
        self.next_id.set(next);
        format!("mem-{next}")
    }

    pub fn records(&self) -> Vec<WireRecord> {
        self.records.borrow().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<WireRecord> {
        self.records.borrow().get(id).cloned()
    }

    /// Request payloads of every `save` call so far
    pub fn save_calls(&self) -> Vec<Vec<WireRecord>> {
        self.save_calls.borrow().clone()
    }

    /// Request payloads of every `delete` call so far
    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.delete_calls.borrow().clone()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.set(fail);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.set(fail);
    }
}

impl AnnotationBackend for MemoryBackend {
    fn load(&self, document_id: DocumentId) -> LocalBoxFuture<'_, PersistenceResult<Vec<WireRecord>>> {
        let records = self
            .records
            .borrow()
            .values()
            .filter(|record| record.document_id == document_id.as_str())
            .cloned()
            .collect();
        future::ready(Ok(records)).boxed_local()
    }

    fn save(&self, records: Vec<WireRecord>) -> LocalBoxFuture<'_, PersistenceResult<Vec<WireRecord>>> {
        self.save_calls.borrow_mut().push(records.clone());
        if self.fail_saves.get() {
            return future::ready(Err(PersistenceError::Backend("save unavailable".to_string())))
                .boxed_local();
        }

        let confirmed = records
            .into_iter()
            .map(|mut record| {
                let id = match record.id.take() {
                    Some(id) => id,
                    None => self.assign_id(),
                };
                record.id = Some(id.clone());
                self.records.borrow_mut().insert(id, record.clone());
                record
            })
            .collect();
        future::ready(Ok(confirmed)).boxed_local()
    }

    fn delete(&self, ids: Vec<String>) -> LocalBoxFuture<'_, PersistenceResult<()>> {
        self.delete_calls.borrow_mut().push(ids.clone());
        if self.fail_deletes.get() {
            return future::ready(Err(PersistenceError::Backend("delete unavailable".to_string())))
                .boxed_local();
        }

        let mut records = self.records.borrow_mut();
        for id in &ids {
            records.remove(id);
        }
        future::ready(Ok(())).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationBody, AnnotationStyle, ShapeGeometry, ShapeKind};
    use crate::geometry::Rect;
    use futures::executor::block_on;
    use serde_json::json;

    fn shape() -> Annotation {
        Annotation::new(
            DocumentId::new("doc"),
            1,
            AnnotationBody::Shape {
                kind: ShapeKind::Circle,
                geometry: ShapeGeometry::Rect(Rect::new(5.0, 5.0, 20.0, 20.0)),
            },
            AnnotationStyle::red_markup(),
        )
    }

    #[test]
    fn test_save_returns_server_ids() {
        let adapter = PersistenceAdapter::new(MemoryBackend::new(), PersistenceConfig::default());
        let local = shape();

        let saved = block_on(adapter.save(std::slice::from_ref(&local))).unwrap();

        assert_eq!(saved[0].id, AnnotationId::Remote("mem-1".to_string()));
        assert_eq!(saved[0].body, local.body);
        assert_eq!(adapter.backend().records().len(), 1);
    }

    #[test]
    fn test_load_skips_unreadable_records() {
        let backend = MemoryBackend::new();
        backend.insert(encode(&shape(), &PersistenceConfig::default()).unwrap());
        backend.insert(WireRecord {
            id: None,
            document_id: "doc".to_string(),
            user_id: None,
            annotation_type: "hologram".to_string(),
            page_number: 1,
            data: json!({}),
            content: String::new(),
            tags: Vec::new(),
        });
        backend.insert(WireRecord {
            id: None,
            document_id: "other-doc".to_string(),
            user_id: None,
            annotation_type: "ink".to_string(),
            page_number: 1,
            data: json!({"paths": []}),
            content: String::new(),
            tags: Vec::new(),
        });
        let adapter = PersistenceAdapter::new(backend, PersistenceConfig::default());

        let outcome = block_on(adapter.load(&DocumentId::new("doc"))).unwrap();

        assert_eq!(outcome.annotations.len(), 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(outcome.anomalies.is_empty());
        assert!(matches!(
            outcome.annotations[0].id,
            AnnotationId::Remote(_)
        ));
    }

    #[test]
    fn test_delete_skips_local_ids() {
        let adapter = PersistenceAdapter::new(MemoryBackend::new(), PersistenceConfig::default());

        block_on(adapter.delete(&[AnnotationId::new_local()])).unwrap();
        assert!(adapter.backend().delete_calls().is_empty());

        block_on(adapter.delete(&[AnnotationId::Remote("x".to_string())])).unwrap();
        assert_eq!(adapter.backend().delete_calls(), vec![vec!["x".to_string()]]);
    }

    #[test]
    fn test_failed_save_surfaces_backend_error() {
        let adapter = PersistenceAdapter::new(MemoryBackend::new(), PersistenceConfig::default());
        adapter.backend().set_fail_saves(true);

        assert!(matches!(
            block_on(adapter.save(&[shape()])),
            Err(PersistenceError::Backend(_))
        ));
    }
}
