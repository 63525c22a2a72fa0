//! Pure geometry used by the annotation tools
//!
//! Everything here is deterministic and side-effect free: path smoothing for
//! ink strokes, point-in-polygon for the lasso, circle/rectangle overlap for
//! the eraser and bounding boxes for hit regions. The same types are used for
//! document units and screen pixels; which space a value lives in is decided
//! by the caller.

use serde::{Deserialize, Serialize};

/// Default Catmull-Rom tension
pub const DEFAULT_TENSION: f64 = 0.5;

/// Interpolated points generated per input segment when smoothing
pub const SMOOTHING_SEGMENTS: usize = 10;

/// Distance under which a point is considered to lie on a polygon edge
const EDGE_EPSILON: f64 = 1e-9;

/// A 2D point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Offset by `(dx, dy)`
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle with non-negative extent
///
/// `(x, y)` is the minimum corner; `width` and `height` are never negative
/// once the rectangle has gone through [`Rect::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build the rectangle spanned by two opposite corners, in any order
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    /// Flip negative extents so width and height are non-negative
    ///
    /// A drag from bottom-right to top-left produces a negative size; this
    /// moves the origin to the minimum corner instead.
    pub fn normalized(&self) -> Self {
        Self::from_corners(self.min(), Point::new(self.x + self.width, self.y + self.height))
    }

    pub fn min(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn max(&self) -> Point {
        Point::new(self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// The four corners, clockwise from the minimum corner
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.x + self.width, self.y),
            Point::new(self.x + self.width, self.y + self.height),
            Point::new(self.x, self.y + self.height),
        ]
    }

    /// Inclusive containment test, grown by `tolerance` on every side
    pub fn contains_point(&self, point: &Point, tolerance: f64) -> bool {
        point.x >= self.x - tolerance
            && point.x <= self.x + self.width + tolerance
            && point.y >= self.y - tolerance
            && point.y <= self.y + self.height + tolerance
    }

    /// Inclusive overlap test (touching edges count)
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.x + other.width
            && other.x <= self.x + self.width
            && self.y <= other.y + other.height
            && other.y <= self.y + self.height
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Grow by `amount` on every side
    pub fn inflate(&self, amount: f64) -> Self {
        Self::new(
            self.x - amount,
            self.y - amount,
            self.width + amount * 2.0,
            self.height + amount * 2.0,
        )
        .normalized()
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Rect) -> Self {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = (self.x + self.width).max(other.x + other.width);
        let max_y = (self.y + self.height).max(other.y + other.height);
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// Smooth a polyline with a Catmull-Rom (cardinal) spline
///
/// Uses [`SMOOTHING_SEGMENTS`] interpolated points per segment. See
/// [`smooth_path_with`].
pub fn smooth_path(points: &[Point], tension: f64) -> Vec<Point> {
    smooth_path_with(points, tension, SMOOTHING_SEGMENTS)
}

/// Smooth a polyline with a Catmull-Rom (cardinal) spline
///
/// For `n >= 3` input points the output has exactly `1 + segments * (n - 1)`
/// points: each segment contributes `segments` samples starting at its own
/// start point (so every original point is preserved), and the final input
/// point is appended. End segments reuse their endpoint as the missing
/// neighbour. Inputs with fewer than three points are returned unchanged.
pub fn smooth_path_with(points: &[Point], tension: f64, segments: usize) -> Vec<Point> {
    if points.len() < 3 || segments == 0 {
        return points.to_vec();
    }

    let n = points.len();
    let mut smoothed = Vec::with_capacity(1 + segments * (n - 1));

    for i in 0..n - 1 {
        let p0 = points[i.saturating_sub(1)];
        let p1 = points[i];
        let p2 = points[i + 1];
        let p3 = points[(i + 2).min(n - 1)];

        for step in 0..segments {
            let t = step as f64 / segments as f64;
            smoothed.push(catmull_rom(p0, p1, p2, p3, t, tension));
        }
    }

    smoothed.push(points[n - 1]);
    smoothed
}

/// Evaluate one cardinal-spline segment between `p1` and `p2` at `t`
fn catmull_rom(p0: Point, p1: Point, p2: Point, p3: Point, t: f64, tension: f64) -> Point {
    let t2 = t * t;
    let t3 = t2 * t;

    // Hermite basis
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;

    let m1x = tension * (p2.x - p0.x);
    let m1y = tension * (p2.y - p0.y);
    let m2x = tension * (p3.x - p1.x);
    let m2y = tension * (p3.y - p1.y);

    Point::new(
        h00 * p1.x + h10 * m1x + h01 * p2.x + h11 * m2x,
        h00 * p1.y + h10 * m1y + h01 * p2.y + h11 * m2y,
    )
}

/// Even-odd ray casting test
///
/// Points lying exactly on an edge or vertex count as inside. The polygon is
/// implicitly closed; fewer than three vertices never contain anything.
pub fn point_in_polygon(point: &Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let vi = &polygon[i];
        let vj = &polygon[j];

        if point_on_segment(point, vi, vj) {
            return true;
        }

        if (vi.y > point.y) != (vj.y > point.y)
            && point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

fn point_on_segment(point: &Point, a: &Point, b: &Point) -> bool {
    let cross = (b.x - a.x) * (point.y - a.y) - (b.y - a.y) * (point.x - a.x);
    let length = a.distance_to(b);
    if length < EDGE_EPSILON {
        return point.distance_to(a) < EDGE_EPSILON;
    }
    if (cross / length).abs() > EDGE_EPSILON {
        return false;
    }

    point.x >= a.x.min(b.x) - EDGE_EPSILON
        && point.x <= a.x.max(b.x) + EDGE_EPSILON
        && point.y >= a.y.min(b.y) - EDGE_EPSILON
        && point.y <= a.y.max(b.y) + EDGE_EPSILON
}

/// Whether a circle overlaps a rectangle
///
/// Inclusive: a circle that only touches the rectangle boundary counts, and
/// partial overlap is enough (full containment is not required).
pub fn circle_intersects_rect(center: &Point, radius: f64, rect: &Rect) -> bool {
    let rect = rect.normalized();
    let nearest_x = center.x.clamp(rect.x, rect.x + rect.width);
    let nearest_y = center.y.clamp(rect.y, rect.y + rect.height);
    let dx = center.x - nearest_x;
    let dy = center.y - nearest_y;
    dx * dx + dy * dy <= radius * radius
}

/// Minimal axis-aligned rectangle containing every point
///
/// Returns `None` for an empty set.
pub fn bounding_box(points: &[Point]) -> Option<Rect> {
    let first = points.first()?;
    let mut min_x = first.x;
    let mut max_x = first.x;
    let mut min_y = first.y;
    let mut max_y = first.y;
    for point in points.iter().skip(1) {
        min_x = min_x.min(point.x);
        max_x = max_x.max(point.x);
        min_y = min_y.min(point.y);
        max_y = max_y.max(point.y);
    }
    Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
}

/// Length of a polyline
pub fn path_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}
