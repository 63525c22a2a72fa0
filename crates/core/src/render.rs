//! Projection of annotations into screen-space drawing primitives
//!
//! The core never draws anything itself. [`project_page`] turns the
//! annotations of one page (plus the active tool preview) into
//! [`RenderItem`]s in page-relative pixels, and a host-provided
//! [`RenderSurface`] paints them with whatever toolkit the viewer uses.
//!
//! Annotations stored in document units are skipped while their page has no
//! viewport; approximate annotations are already in pixels and are drawn
//! as-is.

use crate::annotation::{
    Annotation, AnnotationBody, AnnotationId, Color, MarkupKind, ShapeGeometry, ShapeKind,
    NOTE_ICON_SIZE,
};
use crate::geometry::{bounding_box, Point, Rect};
use crate::model::AnnotationModel;
use crate::tools::Preview;
use crate::transform::ViewportTransform;

/// Squiggly underline wavelength and amplitude, in document units
const SQUIGGLE_PERIOD: f64 = 4.0;
const SQUIGGLE_AMPLITUDE: f64 = 1.5;

/// Arrow head length relative to the stroke width, with a floor in pixels
const ARROW_HEAD_FACTOR: f64 = 4.0;
const ARROW_HEAD_MIN: f64 = 8.0;

const PREVIEW_COLOR: Color = Color::rgb(0, 120, 215);
const PREVIEW_DASH: [f64; 2] = [4.0, 4.0];

/// Icon drawn for notes without an explicit icon name
pub const DEFAULT_NOTE_ICON: &str = "comment";

/// Line style
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub opacity: f64,
    /// Pixels
    pub width: f64,
    pub dash: Vec<f64>,
}

/// Area fill
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub color: Color,
    pub opacity: f64,
}

/// Screen-space drawing primitive
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Closed outline
    Polygon {
        points: Vec<Point>,
        stroke: Option<Stroke>,
        fill: Option<Fill>,
    },
    /// Open outline
    Polyline { points: Vec<Point>, stroke: Stroke },
    Rect {
        rect: Rect,
        stroke: Option<Stroke>,
        fill: Option<Fill>,
    },
    /// Ellipse inscribed in `rect`
    Ellipse {
        rect: Rect,
        stroke: Option<Stroke>,
        fill: Option<Fill>,
    },
    Circle {
        center: Point,
        radius: f64,
        stroke: Stroke,
    },
    Text {
        rect: Rect,
        text: String,
        color: Color,
        opacity: f64,
        font_family: String,
        /// Pixels
        font_size: f64,
    },
    Image { rect: Rect, data_url: String },
    Icon { rect: Rect, name: String, color: Color },
}

impl Primitive {
    /// Offset every coordinate
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        let shift = |points: &[Point]| points.iter().map(|p| p.translate(dx, dy)).collect();
        match self {
            Primitive::Polygon { points, stroke, fill } => Primitive::Polygon {
                points: shift(points),
                stroke: stroke.clone(),
                fill: *fill,
            },
            Primitive::Polyline { points, stroke } => Primitive::Polyline {
                points: shift(points),
                stroke: stroke.clone(),
            },
            Primitive::Rect { rect, stroke, fill } => Primitive::Rect {
                rect: rect.translate(dx, dy),
                stroke: stroke.clone(),
                fill: *fill,
            },
            Primitive::Ellipse { rect, stroke, fill } => Primitive::Ellipse {
                rect: rect.translate(dx, dy),
                stroke: stroke.clone(),
                fill: *fill,
            },
            Primitive::Circle { center, radius, stroke } => Primitive::Circle {
                center: center.translate(dx, dy),
                radius: *radius,
                stroke: stroke.clone(),
            },
            Primitive::Text {
                rect,
                text,
                color,
                opacity,
                font_family,
                font_size,
            } => Primitive::Text {
                rect: rect.translate(dx, dy),
                text: text.clone(),
                color: *color,
                opacity: *opacity,
                font_family: font_family.clone(),
                font_size: *font_size,
            },
            Primitive::Image { rect, data_url } => Primitive::Image {
                rect: rect.translate(dx, dy),
                data_url: data_url.clone(),
            },
            Primitive::Icon { rect, name, color } => Primitive::Icon {
                rect: rect.translate(dx, dy),
                name: name.clone(),
                color: *color,
            },
        }
    }
}

/// Primitives for one annotation, or for the tool preview when `id` is `None`
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub id: Option<AnnotationId>,
    pub selected: bool,
    /// Drawn from approximate pixel geometry
    pub approximate: bool,
    /// Screen bounding box, for hit regions and selection outlines
    pub bounds: Rect,
    pub primitives: Vec<Primitive>,
}

/// Host drawing backend
pub trait RenderSurface {
    /// Drop everything previously drawn on `page`
    fn clear(&mut self, page: u32);

    fn draw(&mut self, page: u32, item: &RenderItem);
}

/// Collects items instead of drawing them
impl RenderSurface for Vec<RenderItem> {
    fn clear(&mut self, _page: u32) {
        Vec::clear(self);
    }

    fn draw(&mut self, _page: u32, item: &RenderItem) {
        self.push(item.clone());
    }
}

/// Repaints pages on a [`RenderSurface`]
#[derive(Debug, Default)]
pub struct RenderAdapter<S> {
    surface: S,
}

impl<S: RenderSurface> RenderAdapter<S> {
    pub fn new(surface: S) -> Self {
        Self { surface }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Clear and redraw one page; returns the number of items drawn
    pub fn render_page(
        &mut self,
        model: &AnnotationModel,
        page: u32,
        viewport: Option<&dyn ViewportTransform>,
        preview: Option<&Preview>,
    ) -> usize {
        let items = project_page(model, page, viewport, preview);
        self.surface.clear(page);
        for item in &items {
            self.surface.draw(page, item);
        }
        items.len()
    }
}

/// Project a page's annotations and the active preview into screen space
pub fn project_page(
    model: &AnnotationModel,
    page: u32,
    viewport: Option<&dyn ViewportTransform>,
    preview: Option<&Preview>,
) -> Vec<RenderItem> {
    let preview = preview.filter(|preview| preview.page() == page);
    let (moving, offset) = match preview {
        Some(Preview::Move { ids, offset, .. }) => (ids.as_slice(), *offset),
        _ => (&[][..], Point::default()),
    };

    let mut items: Vec<RenderItem> = model
        .get_by_page(page)
        .into_iter()
        .filter_map(|annotation| {
            let mut item = project_annotation(annotation, viewport)?;
            item.selected = model.is_selected(&annotation.id);
            if moving.contains(&annotation.id) && !annotation.is_locked() {
                item.primitives = item
                    .primitives
                    .iter()
                    .map(|primitive| primitive.translate(offset.x, offset.y))
                    .collect();
                item.bounds = item.bounds.translate(offset.x, offset.y);
            }
            Some(item)
        })
        .collect();

    if let Some(item) = preview.and_then(project_preview) {
        items.push(item);
    }
    items
}

/// Project a single annotation
///
/// Returns `None` for exact geometry when no viewport is available.
pub fn project_annotation(
    annotation: &Annotation,
    viewport: Option<&dyn ViewportTransform>,
) -> Option<RenderItem> {
    let (scale, to_screen): (f64, Box<dyn Fn(Point) -> Point + '_>) = if annotation.is_approximate() {
        (1.0, Box::new(|p: Point| p))
    } else {
        let viewport = viewport?;
        (viewport.scale(), Box::new(move |p: Point| viewport.to_screen_point(p)))
    };

    let style = &annotation.style;
    let stroke = Stroke {
        color: style.color,
        opacity: style.opacity,
        width: style.stroke_width * scale,
        dash: style.dash.iter().map(|d| d * scale).collect(),
    };
    let fill = style.fill.map(|color| Fill {
        color,
        opacity: style.opacity,
    });
    let screen_rect = |rect: &Rect| Rect::from_corners(to_screen(rect.min()), to_screen(rect.max()));

    let primitives = match &annotation.body {
        AnnotationBody::TextMarkup { kind, coordinates, .. } => coordinates
            .quads
            .iter()
            .map(|quad| {
                let [ul, ur, ll, lr] = quad.points.map(&to_screen);
                markup_primitive(*kind, [ul, ur, ll, lr], style.color, style.opacity, &stroke, scale)
            })
            .collect(),
        AnnotationBody::Shape { kind, geometry } => {
            let points: Vec<Point> = match geometry {
                ShapeGeometry::Rect(rect) => vec![to_screen(rect.min()), to_screen(rect.max())],
                ShapeGeometry::Points(points) => points.iter().map(|p| to_screen(*p)).collect(),
            };
            shape_primitives(*kind, &points, Some(stroke), fill)
        }
        AnnotationBody::Ink { paths } => paths
            .iter()
            .map(|path| Primitive::Polyline {
                points: path.points.iter().map(|p| to_screen(p.point())).collect(),
                stroke: stroke.clone(),
            })
            .collect(),
        AnnotationBody::TextBox { rect, text } => {
            let font = style.font.clone().unwrap_or_default();
            vec![Primitive::Text {
                rect: screen_rect(rect),
                text: text.clone(),
                color: style.color,
                opacity: style.opacity,
                font_family: font.family,
                font_size: font.size * scale,
            }]
        }
        AnnotationBody::Note { position, .. } => {
            let center = to_screen(*position);
            let size = NOTE_ICON_SIZE * scale;
            vec![Primitive::Icon {
                rect: Rect::new(center.x - size / 2.0, center.y - size / 2.0, size, size),
                name: style.icon.clone().unwrap_or_else(|| DEFAULT_NOTE_ICON.to_string()),
                color: style.color,
            }]
        }
        AnnotationBody::Stamp { rect, image, .. } | AnnotationBody::Signature { rect, image } => {
            vec![Primitive::Image {
                rect: screen_rect(rect),
                data_url: image.data_url.clone(),
            }]
        }
    };

    Some(RenderItem {
        id: Some(annotation.id.clone()),
        selected: false,
        approximate: annotation.is_approximate(),
        bounds: screen_rect(&annotation.bounds()),
        primitives,
    })
}

/// One quad of a text markup; corners are upper-left, upper-right,
/// lower-left, lower-right
fn markup_primitive(
    kind: MarkupKind,
    [ul, ur, ll, lr]: [Point; 4],
    color: Color,
    opacity: f64,
    stroke: &Stroke,
    scale: f64,
) -> Primitive {
    let line_stroke = Stroke {
        width: stroke.width.max(1.0),
        ..stroke.clone()
    };
    match kind {
        MarkupKind::Highlight => Primitive::Polygon {
            points: vec![ul, ur, lr, ll],
            stroke: None,
            fill: Some(Fill { color, opacity }),
        },
        MarkupKind::Underline => Primitive::Polyline {
            points: vec![ll, lr],
            stroke: line_stroke,
        },
        MarkupKind::StrikeOut => Primitive::Polyline {
            points: vec![midpoint(ul, ll), midpoint(ur, lr)],
            stroke: line_stroke,
        },
        MarkupKind::Squiggly => Primitive::Polyline {
            points: zigzag(ll, lr, ul, SQUIGGLE_PERIOD * scale, SQUIGGLE_AMPLITUDE * scale),
            stroke: line_stroke,
        },
    }
}

fn midpoint(a: Point, b: Point) -> Point {
    Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

/// Zigzag along `from -> to`, peaks pointing toward `up`
fn zigzag(from: Point, to: Point, up: Point, period: f64, amplitude: f64) -> Vec<Point> {
    let length = from.distance_to(&to);
    if !length.is_finite() || length <= f64::EPSILON || period <= 0.0 {
        return vec![from, to];
    }
    let (ux, uy) = ((to.x - from.x) / length, (to.y - from.y) / length);
    // Normal toward the top edge of the quad
    let (mut nx, mut ny) = (-uy, ux);
    if (up.x - from.x) * nx + (up.y - from.y) * ny < 0.0 {
        nx = -nx;
        ny = -ny;
    }

    let half = period / 2.0;
    let steps = (length / half).ceil() as usize;
    (0..=steps)
        .map(|i| {
            let along = (i as f64 * half).min(length);
            let lift = if i % 2 == 1 { amplitude } else { 0.0 };
            Point::new(from.x + ux * along + nx * lift, from.y + uy * along + ny * lift)
        })
        .collect()
}

/// Primitives for a shape given its screen points
///
/// Box shapes use the bounding box of the points; line shapes use the first
/// and last point.
fn shape_primitives(kind: ShapeKind, points: &[Point], stroke: Option<Stroke>, fill: Option<Fill>) -> Vec<Primitive> {
    let Some(bounds) = bounding_box(points) else {
        return Vec::new();
    };
    match kind {
        ShapeKind::Rectangle => vec![Primitive::Rect {
            rect: bounds,
            stroke,
            fill,
        }],
        ShapeKind::Circle => vec![Primitive::Ellipse {
            rect: bounds,
            stroke,
            fill,
        }],
        ShapeKind::Polygon => vec![Primitive::Polygon {
            points: points.to_vec(),
            stroke,
            fill,
        }],
        ShapeKind::Line | ShapeKind::Arrow => {
            let (Some(start), Some(end), Some(stroke)) = (points.first(), points.last(), stroke) else {
                return Vec::new();
            };
            let mut primitives = vec![Primitive::Polyline {
                points: vec![*start, *end],
                stroke: stroke.clone(),
            }];
            if kind == ShapeKind::Arrow {
                if let Some(head) = arrow_head(*start, *end, stroke.width) {
                    primitives.push(Primitive::Polygon {
                        points: head.to_vec(),
                        stroke: None,
                        fill: Some(Fill {
                            color: stroke.color,
                            opacity: stroke.opacity,
                        }),
                    });
                }
            }
            primitives
        }
    }
}

/// Triangle at `end` pointing away from `start`
fn arrow_head(start: Point, end: Point, width: f64) -> Option<[Point; 3]> {
    let length = start.distance_to(&end);
    if length <= f64::EPSILON {
        return None;
    }
    let size = (width * ARROW_HEAD_FACTOR).max(ARROW_HEAD_MIN);
    let (ux, uy) = ((end.x - start.x) / length, (end.y - start.y) / length);
    let base = Point::new(end.x - ux * size, end.y - uy * size);
    let (nx, ny) = (-uy * size / 2.0, ux * size / 2.0);
    Some([
        end,
        Point::new(base.x + nx, base.y + ny),
        Point::new(base.x - nx, base.y - ny),
    ])
}

fn preview_stroke() -> Stroke {
    Stroke {
        color: PREVIEW_COLOR,
        opacity: 1.0,
        width: 1.0,
        dash: PREVIEW_DASH.to_vec(),
    }
}

/// Project the active gesture preview (already in screen space)
pub fn project_preview(preview: &Preview) -> Option<RenderItem> {
    let primitives = match preview {
        Preview::Shape {
            kind: ShapeKind::Polygon,
            points,
            ..
        } => vec![Primitive::Polyline {
            points: points.clone(),
            stroke: preview_stroke(),
        }],
        Preview::Shape { kind, points, .. } => shape_primitives(*kind, points, Some(preview_stroke()), None),
        Preview::Ink { points, .. } => vec![Primitive::Polyline {
            points: points.clone(),
            stroke: Stroke {
                dash: Vec::new(),
                ..preview_stroke()
            },
        }],
        Preview::Eraser { center, radius, .. } => vec![Primitive::Circle {
            center: *center,
            radius: *radius,
            stroke: preview_stroke(),
        }],
        Preview::Lasso { points, .. } => vec![Primitive::Polygon {
            points: points.clone(),
            stroke: Some(preview_stroke()),
            fill: None,
        }],
        // Drawn by offsetting the annotations themselves; text and stamp
        // placement are shown by the host's own input widgets
        Preview::Move { .. } | Preview::TextInput { .. } | Preview::StampPlacement { .. } => return None,
    };

    let points: Vec<Point> = match preview {
        Preview::Shape { points, .. } | Preview::Ink { points, .. } | Preview::Lasso { points, .. } => points.clone(),
        Preview::Eraser { center, radius, .. } => vec![
            center.translate(-radius, -radius),
            center.translate(*radius, *radius),
        ],
        _ => Vec::new(),
    };

    Some(RenderItem {
        id: None,
        selected: false,
        approximate: false,
        bounds: bounding_box(&points).unwrap_or_default(),
        primitives,
    })
}
