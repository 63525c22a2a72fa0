//! Reader for legacy records
//!
//! Older records stored the viewer's native annotation-storage object as-is
//! under `data.pdfjs_data` (sometimes as a JSON string). Those objects use
//! camelCase keys, a numeric `annotationType`, `[x1, y1, x2, y2]` rectangles,
//! flat coordinate arrays and colors as either 0-255 integers or fractions.
//! They are read-only here: the next save of such an annotation writes the
//! modern payload.

use super::wire::{quad_from_flat, FieldReader, WireRecord, WireType, DEFAULT_PAGE_SIZE, DEFAULT_RECT};
use crate::anchor::TextAnchor;
use crate::annotation::{
    AnnotationBody, AnnotationStyle, Color, EmbeddedImage, FontStyle, InkPath, InkPoint,
    MarkupKind, PdfCoordinates, Quad,
};
use crate::error::{PersistenceError, PersistenceResult};
use crate::geometry::{Point, Rect};
use crate::transform::Rotation;
use serde::Deserialize;
use serde_json::Value;

const FREE_TEXT: u32 = 3;
const HIGHLIGHT: u32 = 9;
const STAMP: u32 = 13;
const INK: u32 = 15;

#[derive(Debug, Deserialize)]
struct LegacyPath {
    #[serde(default)]
    bezier: Vec<f64>,
    #[serde(default)]
    points: Vec<f64>,
}

impl LegacyPath {
    /// Stroke samples; bezier data contributes its on-curve points only
    fn samples(&self) -> Vec<InkPoint> {
        if !self.points.is_empty() {
            return self
                .points
                .chunks_exact(2)
                .map(|xy| InkPoint::new(xy[0], xy[1]))
                .collect();
        }
        // [x0, y0, (c1x, c1y, c2x, c2y, x, y)*]
        let pairs: Vec<(f64, f64)> = self.bezier.chunks_exact(2).map(|xy| (xy[0], xy[1])).collect();
        pairs
            .iter()
            .enumerate()
            .filter(|(index, _)| index % 3 == 0)
            .map(|(_, (x, y))| InkPoint::new(*x, *y))
            .collect()
    }
}

/// Convert a legacy color array, accepting 0-255 or 0-1 channels
fn legacy_color(values: &[f64]) -> Option<Color> {
    if values.len() < 3 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let rgb = [values[0], values[1], values[2]];
    if rgb.iter().any(|v| *v > 1.0) {
        let channel = |v: f64| v.clamp(0.0, 255.0).round() as u8;
        Some(Color::rgb(channel(rgb[0]), channel(rgb[1]), channel(rgb[2])))
    } else {
        Some(Color::from_normalized(rgb))
    }
}

/// Decode a `pdfjs_data` payload into a body and style
pub(super) fn decode(
    record: &WireRecord,
    payload: &Value,
    outer: &mut FieldReader<'_>,
) -> PersistenceResult<(AnnotationBody, AnnotationStyle)> {
    let parsed;
    let payload = match payload {
        Value::String(json) => {
            parsed = serde_json::from_str::<Value>(json)?;
            &parsed
        }
        other => other,
    };

    let mut reader = FieldReader::new(payload, record.id.as_deref());
    let annotation_type: u32 = reader
        .field("annotationType")
        .ok_or(PersistenceError::MissingField("pdfjs_data.annotationType"))?;

    let wire_type = match annotation_type {
        FREE_TEXT => WireType::TextBox,
        HIGHLIGHT => WireType::Markup(MarkupKind::Highlight),
        STAMP => WireType::Stamp,
        INK => WireType::Ink,
        other => return Err(PersistenceError::UnknownAnnotationType(format!("pdfjs:{other}"))),
    };

    let rect = reader
        .field::<[f64; 4]>("rect")
        .map(|[x1, y1, x2, y2]| Rect::from_corners(Point::new(x1, y1), Point::new(x2, y2)));
    let rotation = reader
        .field::<i64>("rotation")
        .and_then(Rotation::from_degrees)
        .unwrap_or_default();

    let mut style = wire_type.default_style();
    if let Some(color) = reader.field::<Vec<f64>>("color") {
        match legacy_color(&color) {
            Some(color) => style.color = color,
            None => reader.anomaly("color", format!("unreadable color {color:?}")),
        }
    }
    if let Some(opacity) = reader.field::<f64>("opacity") {
        style.opacity = opacity.clamp(0.0, 1.0);
    }
    if let Some(thickness) = reader.field::<f64>("thickness") {
        style.stroke_width = thickness.max(0.0);
    }
    if let Some(size) = reader.field::<f64>("fontSize") {
        style.font = Some(FontStyle {
            size,
            ..FontStyle::default()
        });
    }

    let body = match wire_type {
        WireType::TextBox => AnnotationBody::TextBox {
            rect: rect_or_default(rect, &mut reader),
            text: reader
                .field::<String>("value")
                .unwrap_or_else(|| record.content.clone()),
        },
        WireType::Markup(kind) => {
            let flat: Vec<f64> = reader.field("quadPoints").unwrap_or_default();
            let mut quads: Vec<Quad> = flat.chunks(8).filter_map(quad_from_flat).collect();
            if quads.is_empty() {
                quads.push(Quad::from_rect(rect_or_default(rect, &mut reader)));
            }
            AnnotationBody::TextMarkup {
                kind,
                anchor: TextAnchor {
                    selected_text: record.content.clone(),
                    ..TextAnchor::default()
                },
                coordinates: PdfCoordinates {
                    quads,
                    rotation,
                    page_width: DEFAULT_PAGE_SIZE.0,
                    page_height: DEFAULT_PAGE_SIZE.1,
                },
            }
        }
        WireType::Stamp => {
            let rect = rect_or_default(rect, &mut reader);
            let data_url = reader.field::<String>("bitmapUrl").unwrap_or_else(|| {
                reader.anomaly("bitmapUrl", "missing");
                String::new()
            });
            AnnotationBody::Stamp {
                rect,
                image: EmbeddedImage {
                    data_url,
                    width: rect.width.round() as u32,
                    height: rect.height.round() as u32,
                },
                subtype: None,
            }
        }
        _ => {
            let paths: Vec<LegacyPath> = reader.required("paths", Vec::new());
            AnnotationBody::Ink {
                paths: paths
                    .iter()
                    .map(|path| InkPath {
                        points: path.samples(),
                    })
                    .filter(|path| !path.points.is_empty())
                    .collect(),
            }
        }
    };

    tracing::debug!(id = ?record.id, annotation_type, "read legacy annotation record");
    outer.extend(reader.into_anomalies());
    Ok((body, style))
}

fn rect_or_default(rect: Option<Rect>, reader: &mut FieldReader<'_>) -> Rect {
    rect.unwrap_or_else(|| {
        reader.anomaly("rect", "missing");
        DEFAULT_RECT
    })
}
