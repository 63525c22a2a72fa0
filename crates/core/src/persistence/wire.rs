//! Wire schema and the modern record codec
//!
//! A record is flat: `{id, document_id, user_id, annotation_type, page_number,
//! data, content, tags}`. `data` holds the variant payload as a nested object.
//! Decoding is a normalizer, not a strict parser: every payload field is read
//! on its own so a single malformed field is replaced by a default (and
//! reported as a [`GeometryAnomaly`]) instead of losing the whole annotation.

use super::legacy;
use crate::anchor::TextAnchor;
use crate::annotation::{
    Annotation, AnnotationBody, AnnotationId, AnnotationMetadata, AnnotationStyle, Color,
    DocumentId, EmbeddedImage, FontStyle, InkPath, InkPoint, MarkupKind, PdfCoordinates, Quad,
    ShapeGeometry, ShapeKind,
};
use crate::config::{ColorFormat, PersistenceConfig};
use crate::error::{PersistenceError, PersistenceResult};
use crate::geometry::{Point, Rect};
use crate::transform::{Placement, Rotation};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Geometry substituted when a shape, text box or stamp has no usable box
pub const DEFAULT_RECT: Rect = Rect::new(0.0, 0.0, 100.0, 100.0);

/// Page size assumed when a markup record does not carry one (US Letter)
pub const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// Key under which legacy records nest PDF-native annotation storage
pub const LEGACY_KEY: &str = "pdfjs_data";

/// Persisted annotation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Server id; absent until the backend has assigned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub document_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub annotation_type: String,
    pub page_number: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A field that had to be replaced by a default while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryAnomaly {
    /// Record id, if the record had one
    pub id: Option<String>,
    pub field: String,
    pub reason: String,
}

/// Result of decoding one record
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub annotation: Annotation,
    pub anomalies: Vec<GeometryAnomaly>,
}

/// `annotation_type` string for a body
pub fn type_name(body: &AnnotationBody) -> &'static str {
    match body {
        AnnotationBody::TextMarkup { kind, .. } => match kind {
            MarkupKind::Highlight => "highlight",
            MarkupKind::Underline => "underline",
            MarkupKind::StrikeOut => "strikethrough",
            MarkupKind::Squiggly => "squiggly",
        },
        AnnotationBody::Shape { kind, .. } => match kind {
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Circle => "circle",
            ShapeKind::Line => "line",
            ShapeKind::Arrow => "arrow",
            ShapeKind::Polygon => "polygon",
        },
        AnnotationBody::Ink { .. } => "ink",
        AnnotationBody::TextBox { .. } => "textbox",
        AnnotationBody::Note { .. } => "note",
        AnnotationBody::Stamp { .. } => "stamp",
        AnnotationBody::Signature { .. } => "signature",
    }
}

/// Parsed `annotation_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireType {
    Markup(MarkupKind),
    Shape(ShapeKind),
    Ink,
    TextBox,
    Note,
    Stamp,
    Signature,
}

impl WireType {
    pub(crate) fn parse(name: &str) -> Option<Self> {
        let parsed = match name.trim().to_ascii_lowercase().as_str() {
            "highlight" => WireType::Markup(MarkupKind::Highlight),
            "underline" => WireType::Markup(MarkupKind::Underline),
            "strikethrough" | "strikeout" => WireType::Markup(MarkupKind::StrikeOut),
            "squiggly" => WireType::Markup(MarkupKind::Squiggly),
            "rectangle" | "square" => WireType::Shape(ShapeKind::Rectangle),
            "circle" | "ellipse" => WireType::Shape(ShapeKind::Circle),
            "line" => WireType::Shape(ShapeKind::Line),
            "arrow" => WireType::Shape(ShapeKind::Arrow),
            "polygon" => WireType::Shape(ShapeKind::Polygon),
            "ink" | "freehand" => WireType::Ink,
            "textbox" | "freetext" | "free_text" => WireType::TextBox,
            "note" | "comment" => WireType::Note,
            "stamp" | "image" => WireType::Stamp,
            "signature" => WireType::Signature,
            _ => return None,
        };
        Some(parsed)
    }

    /// Style used when a record carries none
    pub(crate) fn default_style(self) -> AnnotationStyle {
        match self {
            WireType::Markup(MarkupKind::Highlight) => AnnotationStyle::yellow_highlight(),
            WireType::TextBox | WireType::Note => AnnotationStyle::text(),
            WireType::Stamp | WireType::Signature => AnnotationStyle::new(),
            _ => AnnotationStyle::red_markup(),
        }
    }
}

// -------------------------------------------------------------------------
// Payload shapes
// -------------------------------------------------------------------------

/// Color as hex string or normalized `[r, g, b]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireColor {
    Hex(String),
    Rgb([f64; 3]),
}

impl WireColor {
    fn encode(color: Color, format: ColorFormat) -> Self {
        match format {
            ColorFormat::Hex => WireColor::Hex(color.to_hex()),
            ColorFormat::Normalized => WireColor::Rgb(color.to_normalized()),
        }
    }

    fn decode(&self) -> Option<Color> {
        match self {
            WireColor::Hex(hex) => Color::from_hex(hex),
            WireColor::Rgb(rgb) => Some(Color::from_normalized(*rgb)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFont {
    family: String,
    size: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<WireColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fill: Option<WireColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dash: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    font: Option<WireFont>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireMeta {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author_name: Option<String>,
    #[serde(default)]
    locked: bool,
}

/// Quads are flattened to PDF QuadPoints order: UL, UR, LL, LR
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WirePdfCoordinates {
    quads: Vec<[f64; 8]>,
    #[serde(default)]
    rotation: Rotation,
    page_width: f64,
    page_height: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WireInkPoint {
    x: f64,
    y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pressure: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireImage {
    data_url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Debug, Default, Serialize)]
struct WireData {
    #[serde(skip_serializing_if = "Option::is_none")]
    text_anchor: Option<TextAnchor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pdf_coordinates: Option<WirePdfCoordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rect: Option<Rect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    points: Option<Vec<Point>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    paths: Option<Vec<Vec<WireInkPoint>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<WireImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtype: Option<String>,
    style: WireStyle,
    meta: WireMeta,
}

pub(crate) fn quad_to_flat(quad: &Quad) -> [f64; 8] {
    let [a, b, c, d] = quad.points;
    [a.x, a.y, b.x, b.y, c.x, c.y, d.x, d.y]
}

pub(crate) fn quad_from_flat(flat: &[f64]) -> Option<Quad> {
    if flat.len() != 8 || flat.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Quad {
        points: [
            Point::new(flat[0], flat[1]),
            Point::new(flat[2], flat[3]),
            Point::new(flat[4], flat[5]),
            Point::new(flat[6], flat[7]),
        ],
    })
}

// -------------------------------------------------------------------------
// Encoding
// -------------------------------------------------------------------------

/// Serialize an annotation to a wire record
///
/// Local ids are sent without an `id`; the backend assigns one.
pub fn encode(annotation: &Annotation, config: &PersistenceConfig) -> PersistenceResult<WireRecord> {
    let format = config.color_format;
    let style = &annotation.style;
    let metadata = &annotation.metadata;

    let mut data = WireData {
        style: WireStyle {
            color: Some(WireColor::encode(style.color, format)),
            opacity: Some(style.opacity),
            stroke_width: Some(style.stroke_width),
            fill: style.fill.map(|fill| WireColor::encode(fill, format)),
            dash: (!style.dash.is_empty()).then(|| style.dash.clone()),
            font: style.font.as_ref().map(|font| WireFont {
                family: font.family.clone(),
                size: font.size,
            }),
            icon: style.icon.clone(),
        },
        meta: WireMeta {
            created_at: metadata.created_at,
            updated_at: metadata.updated_at,
            author_id: metadata.author_id.clone(),
            author_name: metadata.author_name.clone(),
            locked: metadata.locked,
        },
        ..WireData::default()
    };

    match &annotation.body {
        AnnotationBody::TextMarkup {
            anchor,
            coordinates,
            ..
        } => {
            data.text_anchor = Some(anchor.clone());
            data.pdf_coordinates = Some(WirePdfCoordinates {
                quads: coordinates.quads.iter().map(quad_to_flat).collect(),
                rotation: coordinates.rotation,
                page_width: coordinates.page_width,
                page_height: coordinates.page_height,
            });
        }
        AnnotationBody::Shape { geometry, .. } => match geometry {
            ShapeGeometry::Rect(rect) => data.rect = Some(*rect),
            ShapeGeometry::Points(points) => data.points = Some(points.clone()),
        },
        AnnotationBody::Ink { paths } => {
            data.paths = Some(
                paths
                    .iter()
                    .map(|path| {
                        path.points
                            .iter()
                            .map(|p| WireInkPoint {
                                x: p.x,
                                y: p.y,
                                pressure: p.pressure,
                            })
                            .collect()
                    })
                    .collect(),
            );
        }
        AnnotationBody::TextBox { rect, .. } => data.rect = Some(*rect),
        AnnotationBody::Note { position, .. } => data.position = Some(*position),
        AnnotationBody::Stamp {
            rect,
            image,
            subtype,
        } => {
            data.rect = Some(*rect);
            data.image = Some(WireImage {
                data_url: image.data_url.clone(),
                width: image.width,
                height: image.height,
            });
            data.subtype = subtype.clone();
        }
        AnnotationBody::Signature { rect, image } => {
            data.rect = Some(*rect);
            data.image = Some(WireImage {
                data_url: image.data_url.clone(),
                width: image.width,
                height: image.height,
            });
        }
    }

    Ok(WireRecord {
        id: annotation.id.remote().map(str::to_string),
        document_id: annotation.document_id.to_string(),
        user_id: config.user_id.clone(),
        annotation_type: type_name(&annotation.body).to_string(),
        page_number: i64::from(annotation.page_number),
        data: serde_json::to_value(&data)?,
        content: annotation.body.content().unwrap_or_default().to_string(),
        tags: metadata.tags.clone(),
    })
}

// -------------------------------------------------------------------------
// Decoding
// -------------------------------------------------------------------------

/// Per-field reader over a `data` object that records anomalies
pub(crate) struct FieldReader<'a> {
    object: Option<&'a Map<String, Value>>,
    record_id: Option<&'a str>,
    anomalies: Vec<GeometryAnomaly>,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(data: &'a Value, record_id: Option<&'a str>) -> Self {
        Self {
            object: data.as_object(),
            record_id,
            anomalies: Vec::new(),
        }
    }

    /// Deserialize one field; `None` when absent, null or malformed
    pub(crate) fn field<T: DeserializeOwned>(&mut self, name: &str) -> Option<T> {
        let value = self.object?.get(name)?;
        if value.is_null() {
            return None;
        }
        match T::deserialize(value) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                self.anomaly(name, format!("malformed: {err}"));
                None
            }
        }
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.object
            .and_then(|object| object.get(name))
            .is_some_and(|value| !value.is_null())
    }

    pub(crate) fn anomaly(&mut self, field: &str, reason: impl Into<String>) {
        let anomaly = GeometryAnomaly {
            id: self.record_id.map(str::to_string),
            field: field.to_string(),
            reason: reason.into(),
        };
        tracing::warn!(
            id = ?anomaly.id,
            field = %anomaly.field,
            reason = %anomaly.reason,
            "substituting default geometry"
        );
        self.anomalies.push(anomaly);
    }

    /// Field that must be present; a default is substituted otherwise
    pub(crate) fn required<T: DeserializeOwned>(&mut self, name: &str, default: T) -> T {
        let present = self.has(name);
        match self.field(name) {
            Some(value) => value,
            None => {
                if !present {
                    self.anomaly(name, "missing");
                }
                default
            }
        }
    }

    pub(crate) fn extend(&mut self, anomalies: Vec<GeometryAnomaly>) {
        self.anomalies.extend(anomalies);
    }

    pub(crate) fn into_anomalies(self) -> Vec<GeometryAnomaly> {
        self.anomalies
    }
}

/// Deserialize a wire record into the internal model
///
/// Accepts both the modern nested `data` payload and legacy records whose
/// payload is wrapped under `pdfjs_data`. Records without an `id` get a fresh
/// local id.
pub fn decode(record: &WireRecord) -> PersistenceResult<Decoded> {
    if record.document_id.trim().is_empty() {
        return Err(PersistenceError::MissingField("document_id"));
    }

    let id = match record.id.as_deref() {
        Some(id) if !id.is_empty() => AnnotationId::Remote(id.to_string()),
        _ => AnnotationId::new_local(),
    };
    let mut reader = FieldReader::new(&record.data, record.id.as_deref());

    let page_number = match u32::try_from(record.page_number) {
        Ok(page) if page >= 1 => page,
        _ => {
            reader.anomaly(
                "page_number",
                format!("out of range: {}", record.page_number),
            );
            1
        }
    };

    let (body, style, metadata) = match record.data.get(LEGACY_KEY) {
        Some(legacy_data) => {
            let (body, style) = legacy::decode(record, legacy_data, &mut reader)?;
            let mut metadata = AnnotationMetadata::new();
            metadata.author_id = record.user_id.clone();
            (body, style, metadata)
        }
        None => {
            let wire_type = WireType::parse(&record.annotation_type).ok_or_else(|| {
                PersistenceError::UnknownAnnotationType(record.annotation_type.clone())
            })?;
            let body = decode_body(wire_type, record, &mut reader);
            let style = decode_style(wire_type, &mut reader);
            let metadata = decode_meta(record, &mut reader);
            (body, style, metadata)
        }
    };

    let mut metadata = metadata;
    metadata.tags = record.tags.clone();

    let annotation = Annotation {
        id,
        document_id: DocumentId::new(record.document_id.clone()),
        page_number,
        body,
        style,
        metadata,
        placement: Placement::Exact,
    };

    Ok(Decoded {
        annotation,
        anomalies: reader.into_anomalies(),
    })
}

fn decode_body(wire_type: WireType, record: &WireRecord, reader: &mut FieldReader<'_>) -> AnnotationBody {
    match wire_type {
        WireType::Markup(kind) => {
            let anchor = reader.required(
                "text_anchor",
                TextAnchor {
                    selected_text: record.content.clone(),
                    ..TextAnchor::default()
                },
            );
            let coordinates = match reader.field::<WirePdfCoordinates>("pdf_coordinates") {
                Some(wire) => {
                    let quads: Vec<Quad> = wire.quads.iter().filter_map(|q| quad_from_flat(q)).collect();
                    if quads.len() != wire.quads.len() {
                        reader.anomaly("pdf_coordinates.quads", "dropped invalid quads");
                    }
                    PdfCoordinates {
                        quads,
                        rotation: wire.rotation,
                        page_width: wire.page_width,
                        page_height: wire.page_height,
                    }
                }
                None => {
                    if !reader.has("pdf_coordinates") {
                        reader.anomaly("pdf_coordinates", "missing");
                    }
                    PdfCoordinates {
                        quads: Vec::new(),
                        rotation: Rotation::Deg0,
                        page_width: DEFAULT_PAGE_SIZE.0,
                        page_height: DEFAULT_PAGE_SIZE.1,
                    }
                }
            };
            let coordinates = if coordinates.quads.is_empty() {
                reader.anomaly("pdf_coordinates.quads", "no quads, using default box");
                PdfCoordinates {
                    quads: vec![Quad::from_rect(DEFAULT_RECT)],
                    ..coordinates
                }
            } else {
                coordinates
            };
            AnnotationBody::TextMarkup {
                kind,
                anchor,
                coordinates,
            }
        }
        WireType::Shape(kind) => {
            let geometry = if let Some(rect) = reader.field::<Rect>("rect") {
                ShapeGeometry::Rect(rect.normalized())
            } else if let Some(points) = reader
                .field::<Vec<Point>>("points")
                .filter(|points| !points.is_empty())
            {
                ShapeGeometry::Points(points)
            } else {
                reader.anomaly("rect", "shape has neither rect nor points");
                ShapeGeometry::Rect(DEFAULT_RECT)
            };
            AnnotationBody::Shape { kind, geometry }
        }
        WireType::Ink => {
            let paths: Vec<Vec<WireInkPoint>> = reader.required("paths", Vec::new());
            AnnotationBody::Ink {
                paths: paths
                    .into_iter()
                    .map(|points| InkPath {
                        points: points
                            .into_iter()
                            .map(|p| InkPoint {
                                x: p.x,
                                y: p.y,
                                pressure: p.pressure,
                            })
                            .collect(),
                    })
                    .collect(),
            }
        }
        WireType::TextBox => AnnotationBody::TextBox {
            rect: reader.required("rect", DEFAULT_RECT).normalized(),
            text: record.content.clone(),
        },
        WireType::Note => AnnotationBody::Note {
            position: reader.required("position", DEFAULT_RECT.min()),
            text: record.content.clone(),
        },
        WireType::Stamp => AnnotationBody::Stamp {
            rect: reader.required("rect", DEFAULT_RECT).normalized(),
            image: decode_image(reader),
            subtype: reader.field("subtype"),
        },
        WireType::Signature => AnnotationBody::Signature {
            rect: reader.required("rect", DEFAULT_RECT).normalized(),
            image: decode_image(reader),
        },
    }
}

fn decode_image(reader: &mut FieldReader<'_>) -> EmbeddedImage {
    let image = reader.required(
        "image",
        WireImage {
            data_url: String::new(),
            width: 0,
            height: 0,
        },
    );
    EmbeddedImage {
        data_url: image.data_url,
        width: image.width,
        height: image.height,
    }
}

fn decode_style(wire_type: WireType, reader: &mut FieldReader<'_>) -> AnnotationStyle {
    let mut style = wire_type.default_style();
    let Some(wire) = reader.field::<WireStyle>("style") else {
        return style;
    };

    if let Some(color) = &wire.color {
        match color.decode() {
            Some(color) => style.color = color,
            None => reader.anomaly("style.color", format!("unreadable color {color:?}")),
        }
    }
    if let Some(opacity) = wire.opacity {
        style.opacity = opacity.clamp(0.0, 1.0);
    }
    if let Some(width) = wire.stroke_width {
        style.stroke_width = width.max(0.0);
    }
    style.fill = wire.fill.as_ref().and_then(WireColor::decode);
    style.dash = wire.dash.unwrap_or_default();
    style.font = wire.font.map(|font| FontStyle {
        family: font.family,
        size: font.size,
    });
    style.icon = wire.icon;
    style
}

fn decode_meta(record: &WireRecord, reader: &mut FieldReader<'_>) -> AnnotationMetadata {
    let mut metadata = AnnotationMetadata::new();
    match reader.field::<WireMeta>("meta") {
        Some(meta) => {
            metadata.created_at = meta.created_at;
            metadata.updated_at = meta.updated_at;
            metadata.author_id = meta.author_id;
            metadata.author_name = meta.author_name;
            metadata.locked = meta.locked;
        }
        None => metadata.author_id = record.user_id.clone(),
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(annotation_type: &str, data: Value) -> WireRecord {
        WireRecord {
            id: Some("srv-9".to_string()),
            document_id: "doc".to_string(),
            user_id: Some("user".to_string()),
            annotation_type: annotation_type.to_string(),
            page_number: 2,
            data,
            content: String::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_encode_shape_record() {
        let annotation = Annotation::new(
            DocumentId::new("doc"),
            3,
            AnnotationBody::Shape {
                kind: ShapeKind::Rectangle,
                geometry: ShapeGeometry::Rect(Rect::new(1.0, 2.0, 3.0, 4.0)),
            },
            AnnotationStyle::red_markup(),
        );

        let wire = encode(&annotation, &PersistenceConfig::default()).unwrap();

        assert_eq!(wire.id, None);
        assert_eq!(wire.annotation_type, "rectangle");
        assert_eq!(wire.page_number, 3);
        assert_eq!(wire.data["rect"], json!({"x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0}));
        assert_eq!(wire.data["style"]["color"], json!("#ff0000"));
    }

    #[test]
    fn test_normalized_color_format() {
        let annotation = Annotation::new(
            DocumentId::new("doc"),
            1,
            AnnotationBody::Note {
                position: Point::new(5.0, 5.0),
                text: "n".to_string(),
            },
            AnnotationStyle::red_markup(),
        );
        let config = PersistenceConfig {
            color_format: ColorFormat::Normalized,
            ..PersistenceConfig::default()
        };

        let wire = encode(&annotation, &config).unwrap();
        assert_eq!(wire.data["style"]["color"], json!([1.0, 0.0, 0.0]));
        assert_eq!(wire.content, "n");
    }

    #[test]
    fn test_missing_rect_substitutes_default() {
        let decoded = decode(&record("rectangle", json!({}))).unwrap();

        assert_eq!(decoded.annotation.bounds(), DEFAULT_RECT);
        assert_eq!(decoded.anomalies.len(), 1);
        assert_eq!(decoded.anomalies[0].field, "rect");
        assert_eq!(decoded.anomalies[0].id.as_deref(), Some("srv-9"));
    }

    #[test]
    fn test_malformed_rect_substitutes_default() {
        let decoded = decode(&record("textbox", json!({"rect": "wide"}))).unwrap();
        assert_eq!(decoded.annotation.bounds(), DEFAULT_RECT);
        assert_eq!(decoded.anomalies[0].field, "rect");
    }

    #[test]
    fn test_page_number_out_of_range_is_clamped() {
        let mut wire = record("note", json!({"position": {"x": 1.0, "y": 1.0}}));
        wire.page_number = 0;

        let decoded = decode(&wire).unwrap();
        assert_eq!(decoded.annotation.page_number, 1);
        assert_eq!(decoded.anomalies[0].field, "page_number");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(matches!(
            decode(&record("hologram", json!({}))),
            Err(PersistenceError::UnknownAnnotationType(name)) if name == "hologram"
        ));
    }

    #[test]
    fn test_missing_document_is_rejected() {
        let mut wire = record("ink", json!({}));
        wire.document_id = String::new();
        assert!(matches!(
            decode(&wire),
            Err(PersistenceError::MissingField("document_id"))
        ));
    }

    #[test]
    fn test_hex_and_normalized_colors_both_read() {
        let hex = decode(&record("line", json!({"rect": {"x":0.0,"y":0.0,"width":1.0,"height":1.0}, "style": {"color": "#00ff00"}}))).unwrap();
        let rgb = decode(&record("line", json!({"rect": {"x":0.0,"y":0.0,"width":1.0,"height":1.0}, "style": {"color": [0.0, 1.0, 0.0]}}))).unwrap();

        assert_eq!(hex.annotation.style.color, Color::rgb(0, 255, 0));
        assert_eq!(rgb.annotation.style.color, Color::rgb(0, 255, 0));
    }

    #[test]
    fn test_missing_markup_coordinates_uses_default_quad() {
        let mut wire = record("highlight", json!({}));
        wire.content = "selected".to_string();

        let decoded = decode(&wire).unwrap();
        let AnnotationBody::TextMarkup { anchor, coordinates, .. } = &decoded.annotation.body else {
            panic!("expected markup");
        };
        assert_eq!(anchor.selected_text, "selected");
        assert_eq!(coordinates.quads, vec![Quad::from_rect(DEFAULT_RECT)]);
        assert_eq!(decoded.annotation.style, AnnotationStyle::yellow_highlight());
        assert!(decoded.anomalies.iter().any(|a| a.field == "text_anchor"));
        assert!(decoded.anomalies.iter().any(|a| a.field == "pdf_coordinates"));
    }
}
