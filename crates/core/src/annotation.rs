//! Annotation data model
//!
//! An annotation belongs to exactly one page of one document. All geometry is
//! stored in document-intrinsic units (PDF points, origin bottom-left); screen
//! pixels are derived on demand and never stored, except for geometry marked
//! [`Placement::Approximate`], which holds page-relative pixels until the
//! page viewport is available and it can be resolved.

use crate::anchor::TextAnchor;
use crate::geometry::{bounding_box, Point, Rect};
use crate::transform::{Placement, Rotation, ViewportTransform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side length of the square hit region around a note's anchor point
pub const NOTE_ICON_SIZE: f64 = 24.0;

const LOCAL_ID_PREFIX: &str = "local:";

/// Unique identifier for an annotation
///
/// Annotations start with a client-generated UUID and receive an opaque
/// server identifier once persisted. The local form prints with a `local:`
/// prefix so the two can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationId {
    Local(uuid::Uuid),
    Remote(String),
}

impl AnnotationId {
    /// Generate a fresh client-side identifier
    pub fn new_local() -> Self {
        AnnotationId::Local(uuid::Uuid::new_v4())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, AnnotationId::Local(_))
    }

    /// Server identifier, if this id has been confirmed
    pub fn remote(&self) -> Option<&str> {
        match self {
            AnnotationId::Remote(id) => Some(id),
            AnnotationId::Local(_) => None,
        }
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationId::Local(uuid) => write!(f, "{LOCAL_ID_PREFIX}{uuid}"),
            AnnotationId::Remote(id) => f.write_str(id),
        }
    }
}

impl FromStr for AnnotationId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(uuid) = s
            .strip_prefix(LOCAL_ID_PREFIX)
            .and_then(|rest| uuid::Uuid::parse_str(rest).ok())
        {
            return Ok(AnnotationId::Local(uuid));
        }
        Ok(AnnotationId::Remote(s.to_string()))
    }
}

impl Serialize for AnnotationId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AnnotationId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(AnnotationId::Remote(raw)))
    }
}

/// Identifier of the document an annotation belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parse `#rrggbb`, `rrggbb` or the short `#rgb` form
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match digits.len() {
            6 => Some(Self::rgb(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            3 => {
                let expand = |s: &str| channel(s).map(|v| v * 17);
                Some(Self::rgb(
                    expand(&digits[0..1])?,
                    expand(&digits[1..2])?,
                    expand(&digits[2..3])?,
                ))
            }
            _ => None,
        }
    }

    /// Channels as fractions in `[0, 1]`
    pub fn to_normalized(&self) -> [f64; 3] {
        [
            self.r as f64 / 255.0,
            self.g as f64 / 255.0,
            self.b as f64 / 255.0,
        ]
    }

    /// Build from fractions in `[0, 1]`; values outside the range are clamped
    pub fn from_normalized(rgb: [f64; 3]) -> Self {
        let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::rgb(channel(rgb[0]), channel(rgb[1]), channel(rgb[2]))
    }
}

/// Common annotation colors
impl Color {
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
}

/// Font settings for text-bearing annotations
#[derive(Debug, Clone, PartialEq)]
pub struct FontStyle {
    pub family: String,
    pub size: f64,
}

impl Default for FontStyle {
    fn default() -> Self {
        Self {
            family: "Helvetica".to_string(),
            size: 12.0,
        }
    }
}

/// Visual styling
///
/// One struct covers every variant; fields that do not apply to a variant are
/// left at their defaults and ignored by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationStyle {
    /// Stroke color for outlines, ink and markup
    pub color: Color,

    /// Opacity (0.0 = transparent, 1.0 = opaque)
    pub opacity: f64,

    /// Stroke width in document units
    pub stroke_width: f64,

    /// Fill color for closed shapes
    pub fill: Option<Color>,

    /// Line dash pattern (empty for solid line)
    pub dash: Vec<f64>,

    /// Font for text boxes and notes
    pub font: Option<FontStyle>,

    /// Icon name for notes and stamps
    pub icon: Option<String>,
}

impl AnnotationStyle {
    /// Black 2pt stroke, no fill
    pub fn new() -> Self {
        Self {
            color: Color::BLACK,
            opacity: 1.0,
            stroke_width: 2.0,
            fill: None,
            dash: Vec::new(),
            font: None,
            icon: None,
        }
    }

    /// Red outline for shape markups
    pub fn red_markup() -> Self {
        Self {
            color: Color::RED,
            ..Self::new()
        }
    }

    /// Semi-transparent yellow highlight
    pub fn yellow_highlight() -> Self {
        Self {
            color: Color::YELLOW,
            opacity: 0.4,
            stroke_width: 0.0,
            ..Self::new()
        }
    }

    /// Text box / note style with the default font
    pub fn text() -> Self {
        Self {
            font: Some(FontStyle::default()),
            ..Self::new()
        }
    }
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self::new()
    }
}

/// Creation/update bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub tags: Vec<String>,
    /// Locked annotations cannot be moved, erased or deleted
    pub locked: bool,
}

impl AnnotationMetadata {
    /// Create new metadata stamped with the current time
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            author_id: None,
            author_name: None,
            tags: Vec::new(),
            locked: false,
        }
    }

    /// Update the modified timestamp to now
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for AnnotationMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Four-corner region covering one visual run of selected text
///
/// Corner order follows PDF QuadPoints: upper-left, upper-right, lower-left,
/// lower-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub points: [Point; 4],
}

impl Quad {
    /// Quad covering an axis-aligned document rectangle
    pub fn from_rect(rect: Rect) -> Self {
        let rect = rect.normalized();
        let top = rect.y + rect.height;
        let bottom = rect.y;
        Self {
            points: [
                Point::new(rect.x, top),
                Point::new(rect.x + rect.width, top),
                Point::new(rect.x, bottom),
                Point::new(rect.x + rect.width, bottom),
            ],
        }
    }

    pub fn bounds(&self) -> Rect {
        bounding_box(&self.points).unwrap_or_default()
    }

    /// Corners in drawing order (clockwise)
    pub fn outline(&self) -> [Point; 4] {
        [self.points[0], self.points[1], self.points[3], self.points[2]]
    }
}

/// Document-space location of a text markup
#[derive(Debug, Clone, PartialEq)]
pub struct PdfCoordinates {
    pub quads: Vec<Quad>,
    pub rotation: Rotation,
    /// Intrinsic page size when the markup was created
    pub page_width: f64,
    pub page_height: f64,
}

/// Text markup flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkupKind {
    Highlight,
    Underline,
    StrikeOut,
    Squiggly,
}

/// Shape flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Line,
    Arrow,
    Polygon,
}

/// Shape geometry: a box or an ordered point list
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeGeometry {
    Rect(Rect),
    Points(Vec<Point>),
}

/// Ink sample with optional stylus pressure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InkPoint {
    pub x: f64,
    pub y: f64,
    pub pressure: Option<f64>,
}

impl InkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            pressure: None,
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// One continuous ink stroke
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InkPath {
    pub points: Vec<InkPoint>,
}

/// Image embedded directly in a stamp or signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    /// `data:<mime>;base64,<payload>`
    pub data_url: String,
    /// Pixel size of the source image
    pub width: u32,
    pub height: u32,
}

/// Variant-specific geometry and content
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationBody {
    TextMarkup {
        kind: MarkupKind,
        anchor: TextAnchor,
        coordinates: PdfCoordinates,
    },
    Shape {
        kind: ShapeKind,
        geometry: ShapeGeometry,
    },
    Ink {
        paths: Vec<InkPath>,
    },
    TextBox {
        rect: Rect,
        text: String,
    },
    Note {
        position: Point,
        text: String,
    },
    Stamp {
        rect: Rect,
        image: EmbeddedImage,
        subtype: Option<String>,
    },
    Signature {
        rect: Rect,
        image: EmbeddedImage,
    },
}

impl AnnotationBody {
    /// Bounding box of the geometry
    ///
    /// Used uniformly for selection and erasing, whatever the shape type.
    pub fn bounds(&self) -> Rect {
        match self {
            AnnotationBody::TextMarkup { coordinates, .. } => coordinates
                .quads
                .iter()
                .map(Quad::bounds)
                .reduce(|a, b| a.union(&b))
                .unwrap_or_default(),
            AnnotationBody::Shape { geometry, .. } => match geometry {
                ShapeGeometry::Rect(rect) => rect.normalized(),
                ShapeGeometry::Points(points) => bounding_box(points).unwrap_or_default(),
            },
            AnnotationBody::Ink { paths } => {
                let points: Vec<Point> = paths
                    .iter()
                    .flat_map(|path| path.points.iter().map(InkPoint::point))
                    .collect();
                bounding_box(&points).unwrap_or_default()
            }
            AnnotationBody::TextBox { rect, .. }
            | AnnotationBody::Stamp { rect, .. }
            | AnnotationBody::Signature { rect, .. } => rect.normalized(),
            AnnotationBody::Note { position, .. } => Rect::new(
                position.x - NOTE_ICON_SIZE / 2.0,
                position.y - NOTE_ICON_SIZE / 2.0,
                NOTE_ICON_SIZE,
                NOTE_ICON_SIZE,
            ),
        }
    }

    /// Apply `f` to every stored point
    ///
    /// Rectangles are mapped through two opposite corners and re-normalized,
    /// which is exact for translations and quarter-turn rotations.
    pub fn map_points(&self, f: impl Fn(Point) -> Point) -> Self {
        let map_rect = |rect: &Rect| Rect::from_corners(f(rect.min()), f(rect.max()));
        match self {
            AnnotationBody::TextMarkup {
                kind,
                anchor,
                coordinates,
            } => AnnotationBody::TextMarkup {
                kind: *kind,
                anchor: anchor.clone(),
                coordinates: PdfCoordinates {
                    quads: coordinates
                        .quads
                        .iter()
                        .map(|quad| Quad {
                            points: quad.points.map(&f),
                        })
                        .collect(),
                    ..coordinates.clone()
                },
            },
            AnnotationBody::Shape { kind, geometry } => AnnotationBody::Shape {
                kind: *kind,
                geometry: match geometry {
                    ShapeGeometry::Rect(rect) => ShapeGeometry::Rect(map_rect(rect)),
                    ShapeGeometry::Points(points) => {
                        ShapeGeometry::Points(points.iter().map(|p| f(*p)).collect())
                    }
                },
            },
            AnnotationBody::Ink { paths } => AnnotationBody::Ink {
                paths: paths
                    .iter()
                    .map(|path| InkPath {
                        points: path
                            .points
                            .iter()
                            .map(|p| {
                                let mapped = f(p.point());
                                InkPoint {
                                    x: mapped.x,
                                    y: mapped.y,
                                    pressure: p.pressure,
                                }
                            })
                            .collect(),
                    })
                    .collect(),
            },
            AnnotationBody::TextBox { rect, text } => AnnotationBody::TextBox {
                rect: map_rect(rect),
                text: text.clone(),
            },
            AnnotationBody::Note { position, text } => AnnotationBody::Note {
                position: f(*position),
                text: text.clone(),
            },
            AnnotationBody::Stamp {
                rect,
                image,
                subtype,
            } => AnnotationBody::Stamp {
                rect: map_rect(rect),
                image: image.clone(),
                subtype: subtype.clone(),
            },
            AnnotationBody::Signature { rect, image } => AnnotationBody::Signature {
                rect: map_rect(rect),
                image: image.clone(),
            },
        }
    }

    /// Offset the whole geometry
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        self.map_points(|p| p.translate(dx, dy))
    }

    /// Text content carried by the variant, if any
    pub fn content(&self) -> Option<&str> {
        match self {
            AnnotationBody::TextBox { text, .. } | AnnotationBody::Note { text, .. } => Some(text),
            AnnotationBody::TextMarkup { anchor, .. } => Some(&anchor.selected_text),
            _ => None,
        }
    }
}

/// A single annotation
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub document_id: DocumentId,
    /// 1-based page number
    pub page_number: u32,
    pub body: AnnotationBody,
    pub style: AnnotationStyle,
    pub metadata: AnnotationMetadata,
    /// Whether `body` is in document units or still in approximate pixels
    pub placement: Placement,
}

impl Annotation {
    /// Create a new annotation with a generated local id
    pub fn new(
        document_id: DocumentId,
        page_number: u32,
        body: AnnotationBody,
        style: AnnotationStyle,
    ) -> Self {
        Self {
            id: AnnotationId::new_local(),
            document_id,
            page_number: page_number.max(1),
            body,
            style,
            metadata: AnnotationMetadata::new(),
            placement: Placement::Exact,
        }
    }

    pub fn with_metadata(mut self, metadata: AnnotationMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Bounding box in the annotation's stored units
    pub fn bounds(&self) -> Rect {
        self.body.bounds()
    }

    pub fn is_locked(&self) -> bool {
        self.metadata.locked
    }

    pub fn is_approximate(&self) -> bool {
        self.placement == Placement::Approximate
    }

    /// Convert approximate pixel geometry to document units
    ///
    /// Returns `false` (and changes nothing) when the geometry is already
    /// exact.
    pub fn resolve_placement<V: ViewportTransform + ?Sized>(&mut self, viewport: &V) -> bool {
        if self.placement == Placement::Exact {
            return false;
        }
        self.body = self.body.map_points(|p| viewport.to_document_point(p));
        if let AnnotationBody::TextMarkup { coordinates, .. } = &mut self.body {
            let (width, height) = viewport.page_size();
            coordinates.page_width = width;
            coordinates.page_height = height;
            coordinates.rotation = viewport.rotation();
        }
        self.placement = Placement::Exact;
        true
    }
}
