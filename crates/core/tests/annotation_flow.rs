use futures::executor::block_on;
use pdf_annotator_core::persistence::{decode, encode};
use pdf_annotator_core::{
    flush, load, AnnotationBody, AnnotationId, AnnotationMetadata, AnnotationSession, AnnotationStyle,
    AppEvent, Color, DocumentId, EmbeddedImage, EngineConfig, EventBus, EventKind, FontStyle, InkPath,
    InkPoint, Key, MarkupKind, MemoryBackend, PdfCoordinates, PersistenceAdapter, PersistenceConfig,
    Placement, Point, PointerEvent, Quad, Rect, Rotation, ShapeGeometry, ShapeKind, TextAnchor, ToolKind,
    ToolOutcome, Viewport, WireRecord,
};
use pdf_annotator_core::{Annotation, TextMode};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

const DOC: &str = "doc-42";

fn open_session(events: EventBus) -> RefCell<AnnotationSession> {
    RefCell::new(AnnotationSession::new(DocumentId::new(DOC), EngineConfig::default(), events))
}

fn adapter() -> PersistenceAdapter<MemoryBackend> {
    PersistenceAdapter::new(MemoryBackend::new(), PersistenceConfig::default())
}

/// Page 1 rendered at 1000x1000, scale 1: document y = 1000 - screen y
fn show_page(session: &RefCell<AnnotationSession>) {
    let mut session = session.borrow_mut();
    let generation = session.viewport_generation();
    let viewport = Viewport::new(1000.0, 1000.0, 1.0, Rotation::Deg0).expect("viewport should be valid");
    session.set_viewport(generation, 1, viewport);
}

/// 10x10 box whose screen centre is (`x`, `y`)
fn box_at(session: &RefCell<AnnotationSession>, x: f64, y: f64) -> AnnotationId {
    session.borrow_mut().model_mut().create(Annotation::new(
        DocumentId::new(DOC),
        1,
        AnnotationBody::Shape {
            kind: ShapeKind::Rectangle,
            geometry: ShapeGeometry::Rect(Rect::new(x - 5.0, 1000.0 - y - 5.0, 10.0, 10.0)),
        },
        AnnotationStyle::red_markup(),
    ))
}

fn gesture(session: &RefCell<AnnotationSession>, points: &[(f64, f64)]) -> ToolOutcome {
    let mut session = session.borrow_mut();
    let last = points.len() - 1;
    let mut outcome = ToolOutcome::None;
    for (index, &(x, y)) in points.iter().enumerate() {
        let event = match index {
            0 => PointerEvent::down(1, x, y),
            i if i == last => PointerEvent::up(1, x, y),
            _ => PointerEvent::moved(1, x, y),
        };
        outcome = session.pointer(&event);
    }
    outcome
}

fn remote_ids(session: &RefCell<AnnotationSession>, ids: &[AnnotationId]) -> Vec<String> {
    let session = session.borrow();
    ids.iter()
        .map(|id| {
            session
                .model()
                .get(id)
                .and_then(|annotation| annotation.id.remote().map(str::to_string))
                .expect("annotation should have a server id")
        })
        .collect()
}

#[test]
fn drawn_shape_is_saved_and_reloaded() {
    let session = open_session(EventBus::new());
    let adapter = adapter();
    show_page(&session);
    session
        .borrow_mut()
        .set_tool(ToolKind::Shape(ShapeKind::Rectangle));

    let ToolOutcome::Created(local) = gesture(&session, &[(100.0, 100.0), (150.0, 120.0), (200.0, 150.0)]) else {
        panic!("rectangle drag should create an annotation");
    };
    let report = block_on(flush(&session, &adapter))
        .expect("flush should succeed")
        .expect("a batch should be sent");

    assert!(report.is_success());
    assert_eq!(adapter.backend().save_calls().len(), 1);
    let (_, remote) = report.reconciled[0].clone();
    assert!(!session.borrow().model().contains(&local));
    let saved = session
        .borrow()
        .model()
        .get(&remote)
        .cloned()
        .expect("annotation should be stored under its server id");
    assert_eq!(
        saved.body,
        AnnotationBody::Shape {
            kind: ShapeKind::Rectangle,
            geometry: ShapeGeometry::Rect(Rect::new(100.0, 850.0, 100.0, 50.0)),
        }
    );

    let reopened = open_session(EventBus::new());
    let outcome = block_on(load(&reopened, &adapter)).expect("load should succeed");
    assert!(outcome.anomalies.is_empty());
    let reopened = reopened.borrow();
    let loaded = reopened.model().get(&remote).expect("reloaded annotation");
    assert_eq!(loaded.body, saved.body);
    assert_eq!(loaded.style, saved.style);
}

#[test]
fn lasso_selects_contained_annotations_and_deletes_after_confirmation() {
    let session = open_session(EventBus::new());
    let adapter = adapter();
    show_page(&session);
    let a = box_at(&session, 10.0, 10.0);
    let b = box_at(&session, 50.0, 50.0);
    let c = box_at(&session, 200.0, 200.0);
    block_on(flush(&session, &adapter)).expect("initial save should succeed");
    let ids: Vec<AnnotationId> = session
        .borrow()
        .model()
        .all()
        .iter()
        .map(|annotation| annotation.id.clone())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&a) && !ids.contains(&b) && !ids.contains(&c));

    session.borrow_mut().set_tool(ToolKind::Lasso);
    let outcome = gesture(
        &session,
        &[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)],
    );

    let ToolOutcome::SelectionChanged(selected) = outcome else {
        panic!("lasso should change the selection, got {outcome:?}");
    };
    assert_eq!(selected.len(), 2);
    assert_eq!(session.borrow().model().get_selection(), selected.as_slice());
    let expected_remote = remote_ids(&session, &selected);

    let ToolOutcome::ConfirmDelete(pending) = session.borrow_mut().key(Key::Delete) else {
        panic!("deleting a lasso selection should ask for confirmation");
    };
    assert_eq!(session.borrow().model().len(), 3);
    let deleted = session.borrow_mut().confirm_deletion(&pending);
    assert_eq!(deleted.len(), 2);
    assert_eq!(session.borrow().model().len(), 1);

    block_on(flush(&session, &adapter)).expect("delete flush should succeed");
    let mut sent = adapter.backend().delete_calls().concat();
    sent.sort();
    let mut expected = expected_remote;
    expected.sort();
    assert_eq!(sent, expected);
}

#[test]
fn eraser_drag_is_one_delete_call() {
    let session = open_session(EventBus::new());
    let adapter = adapter();
    show_page(&session);
    box_at(&session, 100.0, 100.0);
    box_at(&session, 300.0, 100.0);
    box_at(&session, 100.0, 400.0);
    block_on(flush(&session, &adapter)).expect("initial save should succeed");

    session.borrow_mut().set_tool(ToolKind::Eraser);
    let outcome = gesture(
        &session,
        &[(100.0, 100.0), (200.0, 100.0), (300.0, 100.0), (300.0, 100.0)],
    );

    let ToolOutcome::Deleted(erased) = outcome else {
        panic!("eraser should delete on release, got {outcome:?}");
    };
    assert_eq!(erased.len(), 2);
    block_on(flush(&session, &adapter)).expect("delete flush should succeed");
    let calls = adapter.backend().delete_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 2);
    assert_eq!(adapter.backend().records().len(), 1);
    let session = session.borrow();
    let remaining = session.model().all();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].bounds(), Rect::new(95.0, 595.0, 10.0, 10.0));
}

#[test]
fn annotations_drawn_before_the_page_loads_are_saved_once_resolved() {
    let session = open_session(EventBus::new());
    let adapter = adapter();
    session.borrow_mut().set_tool(ToolKind::FreeText(TextMode::Note));

    gesture(&session, &[(40.0, 60.0)]);
    let ToolOutcome::Created(id) = session.borrow_mut().commit_text("later") else {
        panic!("note should be created");
    };
    assert_eq!(
        session.borrow().model().get(&id).map(|a| a.placement),
        Some(Placement::Approximate)
    );
    assert!(block_on(flush(&session, &adapter)).expect("flush").is_none());

    show_page(&session);
    let report = block_on(flush(&session, &adapter))
        .expect("flush should succeed")
        .expect("resolved note should be sent");

    assert_eq!(report.saved, 1);
    let record = &adapter.backend().records()[0];
    assert_eq!(record.annotation_type, "note");
    assert_eq!(record.content, "later");
    assert_eq!(record.data["position"], json!({ "x": 40.0, "y": 940.0 }));
}

#[test]
fn failed_save_is_kept_locally_and_resent_after_next_edit() {
    let session = open_session(EventBus::new());
    let adapter = adapter();
    show_page(&session);
    let id = box_at(&session, 10.0, 10.0);
    adapter.backend().set_fail_saves(true);

    let report = block_on(flush(&session, &adapter))
        .expect("flush should report, not fail")
        .expect("a batch should be sent");
    assert_eq!(report.failed_saves, vec![id.clone()]);
    assert!(session.borrow().model().contains(&id));
    assert!(block_on(flush(&session, &adapter)).expect("flush").is_none());

    adapter.backend().set_fail_saves(false);
    let blue = AnnotationStyle {
        color: Color::BLUE,
        ..AnnotationStyle::red_markup()
    };
    assert!(session
        .borrow_mut()
        .model_mut()
        .update(&id, pdf_annotator_core::AnnotationPatch::style(blue)));
    let report = block_on(flush(&session, &adapter))
        .expect("flush should succeed")
        .expect("the edited annotation should be resent");

    assert!(report.is_success());
    assert_eq!(report.reconciled.len(), 1);
    assert_eq!(adapter.backend().records()[0].data["style"]["color"], json!("#0000ff"));
}

#[test]
fn legacy_records_load_alongside_modern_ones() {
    let adapter = adapter();
    adapter.backend().insert(WireRecord {
        id: Some("legacy-1".to_string()),
        document_id: DOC.to_string(),
        user_id: Some("user".to_string()),
        annotation_type: "pdfjs".to_string(),
        page_number: 2,
        data: json!({
            "pdfjs_data": {
                "annotationType": 15,
                "color": [255, 0, 0],
                "thickness": 2,
                "paths": [{ "points": [0, 0, 10, 10, 20, 0] }]
            }
        }),
        content: String::new(),
        tags: Vec::new(),
    });
    adapter.backend().insert(WireRecord {
        id: Some("modern-1".to_string()),
        document_id: DOC.to_string(),
        user_id: None,
        annotation_type: "rectangle".to_string(),
        page_number: 1,
        data: json!({ "style": { "color": "#00ff00" } }),
        content: String::new(),
        tags: Vec::new(),
    });
    let session = open_session(EventBus::new());

    let outcome = block_on(load(&session, &adapter)).expect("load should succeed");

    assert_eq!(outcome.annotations.len(), 2);
    assert!(outcome.rejected.is_empty());
    // The modern rectangle has no rect and gets the default box
    assert_eq!(outcome.anomalies.len(), 1);
    assert_eq!(outcome.anomalies[0].field, "rect");
    let session = session.borrow();
    let ink = session
        .model()
        .get(&AnnotationId::Remote("legacy-1".to_string()))
        .expect("legacy ink should load");
    let AnnotationBody::Ink { paths } = &ink.body else {
        panic!("expected ink, got {:?}", ink.body);
    };
    assert_eq!(paths[0].points.len(), 3);
    assert_eq!(ink.style.color, Color::RED);
}

#[test]
fn every_variant_survives_encode_and_decode() {
    let page_text = "Quarterly revenue grew by twelve percent";
    let image = EmbeddedImage {
        data_url: "data:image/png;base64,iVBORw0KGgo=".to_string(),
        width: 8,
        height: 4,
    };
    let quad = Quad::from_rect(Rect::new(72.0, 700.0, 120.0, 12.0));
    let bodies = vec![
        AnnotationBody::TextMarkup {
            kind: MarkupKind::Squiggly,
            anchor: TextAnchor::from_selection(page_text, 10, 17, 50).expect("anchor"),
            coordinates: PdfCoordinates {
                quads: vec![quad.clone(), quad],
                rotation: Rotation::Deg90,
                page_width: 612.0,
                page_height: 792.0,
            },
        },
        AnnotationBody::Shape {
            kind: ShapeKind::Circle,
            geometry: ShapeGeometry::Rect(Rect::new(10.0, 20.0, 30.0, 40.0)),
        },
        AnnotationBody::Shape {
            kind: ShapeKind::Polygon,
            geometry: ShapeGeometry::Points(vec![
                Point::new(0.0, 0.0),
                Point::new(50.0, 10.0),
                Point::new(25.0, 60.0),
            ]),
        },
        AnnotationBody::Ink {
            paths: vec![InkPath {
                points: vec![
                    InkPoint::new(1.0, 1.0),
                    InkPoint {
                        x: 2.5,
                        y: 3.5,
                        pressure: Some(0.75),
                    },
                ],
            }],
        },
        AnnotationBody::TextBox {
            rect: Rect::new(100.0, 100.0, 80.0, 20.0),
            text: "Check this figure".to_string(),
        },
        AnnotationBody::Note {
            position: Point::new(300.0, 400.0),
            text: "Ask about Q3".to_string(),
        },
        AnnotationBody::Stamp {
            rect: Rect::new(50.0, 50.0, 64.0, 32.0),
            image: image.clone(),
            subtype: Some("approved".to_string()),
        },
        AnnotationBody::Signature {
            rect: Rect::new(400.0, 80.0, 120.0, 40.0),
            image,
        },
    ];

    for body in bodies {
        let style = AnnotationStyle {
            color: Color::rgb(12, 34, 56),
            opacity: 0.8,
            stroke_width: 1.5,
            fill: Some(Color::YELLOW),
            dash: vec![3.0, 2.0],
            font: Some(FontStyle {
                family: "Courier".to_string(),
                size: 9.0,
            }),
            icon: Some("key".to_string()),
        };
        let mut metadata = AnnotationMetadata::new();
        metadata.author_id = Some("user-1".to_string());
        metadata.author_name = Some("Reviewer".to_string());
        metadata.tags = vec!["finance".to_string()];
        metadata.locked = true;
        let mut annotation = Annotation::new(DocumentId::new(DOC), 7, body, style).with_metadata(metadata);
        annotation.id = AnnotationId::Remote("srv-1".to_string());

        let record = encode(&annotation, &PersistenceConfig::default()).expect("encode");
        let decoded = decode(&record).expect("decode");

        assert!(decoded.anomalies.is_empty(), "{:?}", decoded.anomalies);
        assert_eq!(decoded.annotation, annotation);
    }
}

#[test]
fn created_annotations_reach_other_subscribers() {
    let events = EventBus::new();
    let created = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&created);
    let subscription = events.on(EventKind::AnnotationCreated, move |event| {
        if let AppEvent::AnnotationCreated(annotation) = event {
            sink.borrow_mut().push(annotation.clone());
        }
    });
    let session = open_session(events.clone());
    show_page(&session);
    session.borrow_mut().set_tool(ToolKind::Ink);

    let outcome = gesture(&session, &[(10.0, 10.0), (20.0, 15.0), (30.0, 30.0), (40.0, 50.0)]);

    let ToolOutcome::Created(id) = outcome else {
        panic!("ink stroke should be created, got {outcome:?}");
    };
    assert_eq!(created.borrow().len(), 1);
    assert_eq!(created.borrow()[0].id, id);
    assert!(events.off(subscription));
    session.borrow_mut().set_tool(ToolKind::Ink);
    gesture(&session, &[(10.0, 10.0), (20.0, 15.0), (30.0, 30.0)]);
    assert_eq!(created.borrow().len(), 1);
}

#[test]
fn navigating_away_discards_the_gesture_but_not_in_flight_saves() {
    let session = open_session(EventBus::new());
    let adapter = adapter();
    show_page(&session);
    box_at(&session, 10.0, 10.0);
    let batch = session
        .borrow_mut()
        .take_batch()
        .expect("batch")
        .expect("one save queued");

    session.borrow_mut().set_tool(ToolKind::Shape(ShapeKind::Line));
    session.borrow_mut().pointer(&PointerEvent::down(1, 0.0, 0.0));
    assert!(session.borrow_mut().set_current_page(9, true));
    assert!(session.borrow().preview().is_none());
    assert!(session.borrow().viewport(1).is_none());

    let (saved, deleted) = block_on(adapter.send(&batch));
    let report = session.borrow_mut().complete_batch(batch, saved, deleted);
    assert!(report.is_success());
    assert_eq!(report.reconciled.len(), 1);
}
