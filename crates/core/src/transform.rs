//! Screen ⇄ document coordinate transform
//!
//! Document (PDF) coordinates use the page's own unit space with the origin at
//! the bottom-left and Y growing upward. Screen coordinates are pixels
//! relative to the rendered page element, origin top-left, Y growing down.
//!
//! The transform is stateless: every call takes the page's current
//! [`Viewport`] so results never depend on cache invalidation timing. When the
//! renderer has not produced a viewport yet, conversions fail with
//! [`TransformError::UnavailablePage`] and callers fall back to an
//! approximate placement (see [`place_rect`]).

use crate::error::{TransformError, TransformResult};
use crate::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Page rotation in quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Parse any multiple of 90 degrees, including negative values
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl Serialize for Rotation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.degrees())
    }
}

impl<'de> Deserialize<'de> for Rotation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let degrees = i64::deserialize(deserializer)?;
        Rotation::from_degrees(degrees)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid rotation: {degrees}")))
    }
}

/// Point conversion exposed by a renderer's page viewport
///
/// Renderers that already carry their own viewport object can implement this
/// directly; otherwise [`Viewport`] reproduces the standard PDF viewport math
/// from scale, rotation and page size.
pub trait ViewportTransform {
    /// Convert a page-relative screen point to document units
    fn to_document_point(&self, point: Point) -> Point;

    /// Convert a document point to page-relative screen pixels
    fn to_screen_point(&self, point: Point) -> Point;

    /// Intrinsic page size in document units
    fn page_size(&self) -> (f64, f64);

    /// Pixels per document unit
    fn scale(&self) -> f64;

    fn rotation(&self) -> Rotation;
}

/// Per-page viewport descriptor
///
/// Builds the affine transform `[a, b, c, d, e, f]` mapping document points
/// to screen pixels for the page's view box `[0, 0, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    scale: f64,
    rotation: Rotation,
    page_width: f64,
    page_height: f64,
    transform: [f64; 6],
}

impl Viewport {
    /// Create a viewport
    ///
    /// Fails with [`TransformError::DegenerateViewport`] when the scale or the
    /// page size is not a positive finite number.
    pub fn new(
        page_width: f64,
        page_height: f64,
        scale: f64,
        rotation: Rotation,
    ) -> TransformResult<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(scale) || !valid(page_width) || !valid(page_height) {
            return Err(TransformError::DegenerateViewport {
                scale,
                width: page_width,
                height: page_height,
            });
        }

        let center_x = page_width / 2.0;
        let center_y = page_height / 2.0;

        // Y is flipped: PDF space grows upward, screen space grows downward.
        let (a, b, c, d) = match rotation {
            Rotation::Deg0 => (1.0, 0.0, 0.0, -1.0),
            Rotation::Deg90 => (0.0, 1.0, 1.0, 0.0),
            Rotation::Deg180 => (-1.0, 0.0, 0.0, 1.0),
            Rotation::Deg270 => (0.0, -1.0, -1.0, 0.0),
        };

        let (offset_x, offset_y) = if a == 0.0 {
            (center_y * scale, center_x * scale)
        } else {
            (center_x * scale, center_y * scale)
        };

        let transform = [
            a * scale,
            b * scale,
            c * scale,
            d * scale,
            offset_x - a * scale * center_x - c * scale * center_y,
            offset_y - b * scale * center_x - d * scale * center_y,
        ];

        Ok(Self {
            scale,
            rotation,
            page_width,
            page_height,
            transform,
        })
    }

    /// Same page at a different zoom
    pub fn with_scale(&self, scale: f64) -> TransformResult<Self> {
        Self::new(self.page_width, self.page_height, scale, self.rotation)
    }

    /// Rendered page size in pixels, accounting for rotation
    pub fn screen_size(&self) -> (f64, f64) {
        match self.rotation {
            Rotation::Deg0 | Rotation::Deg180 => {
                (self.page_width * self.scale, self.page_height * self.scale)
            }
            Rotation::Deg90 | Rotation::Deg270 => {
                (self.page_height * self.scale, self.page_width * self.scale)
            }
        }
    }

    pub fn transform(&self) -> [f64; 6] {
        self.transform
    }
}

impl ViewportTransform for Viewport {
    fn to_document_point(&self, point: Point) -> Point {
        let [a, b, c, d, e, f] = self.transform;
        let det = a * d - b * c;
        Point::new(
            (point.x * d - point.y * c + c * f - e * d) / det,
            (-point.x * b + point.y * a + e * b - f * a) / det,
        )
    }

    fn to_screen_point(&self, point: Point) -> Point {
        let [a, b, c, d, e, f] = self.transform;
        Point::new(point.x * a + point.y * c + e, point.x * b + point.y * d + f)
    }

    fn page_size(&self) -> (f64, f64) {
        (self.page_width, self.page_height)
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn rotation(&self) -> Rotation {
        self.rotation
    }
}

/// Convert a screen rectangle to document units
///
/// `rect` is in the same coordinate frame as `page_origin` (for example,
/// container-relative pixels); the page origin is subtracted first. The result
/// is normalized so width and height are non-negative whatever the drag
/// direction.
pub fn screen_to_document<V: ViewportTransform + ?Sized>(
    rect: Rect,
    page_origin: Point,
    viewport: Option<&V>,
) -> TransformResult<Rect> {
    let viewport = viewport.ok_or(TransformError::UnavailablePage)?;
    let rect = rect.normalized();
    let min = viewport.to_document_point(Point::new(rect.x - page_origin.x, rect.y - page_origin.y));
    let max = viewport.to_document_point(Point::new(
        rect.x + rect.width - page_origin.x,
        rect.y + rect.height - page_origin.y,
    ));
    Ok(Rect::from_corners(min, max))
}

/// Convert a document rectangle to page-relative screen pixels
pub fn document_to_screen<V: ViewportTransform + ?Sized>(
    rect: Rect,
    viewport: Option<&V>,
) -> TransformResult<Rect> {
    let viewport = viewport.ok_or(TransformError::UnavailablePage)?;
    let rect = rect.normalized();
    let min = viewport.to_screen_point(rect.min());
    let max = viewport.to_screen_point(rect.max());
    Ok(Rect::from_corners(min, max))
}

/// Convert a single page-relative screen point to document units
pub fn point_to_document<V: ViewportTransform + ?Sized>(
    point: Point,
    viewport: Option<&V>,
) -> TransformResult<Point> {
    let viewport = viewport.ok_or(TransformError::UnavailablePage)?;
    Ok(viewport.to_document_point(point))
}

/// Convert a single document point to page-relative screen pixels
pub fn point_to_screen<V: ViewportTransform + ?Sized>(
    point: Point,
    viewport: Option<&V>,
) -> TransformResult<Point> {
    let viewport = viewport.ok_or(TransformError::UnavailablePage)?;
    Ok(viewport.to_screen_point(point))
}

/// How trustworthy stored geometry is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Geometry is in document units
    #[default]
    Exact,

    /// Geometry holds page-relative pixels captured while the page viewport
    /// was unavailable; it must be resolved before it is persisted
    Approximate,
}

/// Convert a page-relative point, falling back to the raw pixel value
pub fn place_point<V: ViewportTransform + ?Sized>(
    point: Point,
    viewport: Option<&V>,
) -> (Point, Placement) {
    match point_to_document(point, viewport) {
        Ok(document) => (document, Placement::Exact),
        Err(_) => (point, Placement::Approximate),
    }
}

/// Convert a page-relative rectangle, falling back to the raw pixel value
pub fn place_rect<V: ViewportTransform + ?Sized>(
    rect: Rect,
    viewport: Option<&V>,
) -> (Rect, Placement) {
    match screen_to_document(rect, Point::default(), viewport) {
        Ok(document) => (document, Placement::Exact),
        Err(_) => {
            tracing::debug!("page viewport unavailable, using approximate placement");
            (rect.normalized(), Placement::Approximate)
        }
    }
}
