//! PDF Annotator Core Library
//!
//! Annotation engine for a PDF viewer: the annotation model, coordinate
//! conversion between screen and document space, interactive authoring
//! tools, persistence to a remote annotation service and projection of
//! annotations into drawable primitives.
//!
//! The engine is single-threaded and host-driven. A UI host owns one
//! [`AnnotationSession`] per open document, feeds it pointer and keyboard
//! input, supplies page viewports as pages render, and calls [`flush`] once
//! per frame to persist changes.

pub mod anchor;
pub mod annotation;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod model;
pub mod persistence;
pub mod render;
pub mod session;
pub mod tools;
pub mod transform;

pub use anchor::{verify, AnchorStatus, TextAnchor};
pub use annotation::{
    Annotation, AnnotationBody, AnnotationId, AnnotationMetadata, AnnotationStyle, Color,
    DocumentId, EmbeddedImage, FontStyle, InkPath, InkPoint, MarkupKind, PdfCoordinates, Quad,
    ShapeGeometry, ShapeKind,
};
pub use config::{AnchorConfig, CacheConfig, ColorFormat, EngineConfig, PersistenceConfig, ToolConfig};
pub use error::{
    ConfigError, PersistenceError, PersistenceResult, StampError, TransformError, TransformResult,
};
pub use events::{AppEvent, EventBus, EventKind, SubscriptionId};
pub use geometry::{Point, Rect};
pub use model::{AnnotationModel, AnnotationPatch, ListenerId};
pub use persistence::{
    AnnotationBackend, FlushReport, LoadOutcome, MemoryBackend, PersistenceAdapter, SaveBatch,
    SaveQueue, WireRecord,
};
pub use render::{Primitive, RenderAdapter, RenderItem, RenderSurface};
pub use session::{flush, load, AnchorReport, AnnotationSession};
pub use tools::markup::TextSelection;
pub use tools::{
    Key, PendingDeletion, PointerEvent, PointerKind, Preview, StampMode, TextMode, ToolController,
    ToolKind, ToolOutcome,
};
pub use transform::{Placement, Rotation, Viewport, ViewportTransform};

pub use pdf_annotator_cache::{CacheGeneration, PageWindowCache};
