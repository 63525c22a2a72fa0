//! Rectangle, circle, line, arrow and polygon drawing

use super::{Key, PointerEvent, PointerKind, Preview, Tool, ToolContext, ToolKind, ToolOutcome};
use crate::annotation::{AnnotationBody, AnnotationStyle, ShapeGeometry, ShapeKind};
use crate::geometry::{Point, Rect};
use crate::transform::{place_point, place_rect, Placement};

/// Vertices needed before a polygon can close
const MIN_POLYGON_VERTICES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    Dragging {
        page: u32,
        start: Point,
        current: Point,
    },
    Polygon {
        page: u32,
        vertices: Vec<Point>,
        cursor: Point,
    },
}

/// Drag-to-draw shapes
///
/// Rectangles, circles, lines and arrows are drawn with a single drag; drags
/// shorter than the minimum distance are discarded as accidental clicks.
/// Polygons are built one click per vertex and close on Enter or on a click
/// near the first vertex.
#[derive(Debug)]
pub struct ShapeTool {
    kind: ShapeKind,
    style: AnnotationStyle,
    state: State,
}

impl ShapeTool {
    pub fn new(kind: ShapeKind) -> Self {
        Self {
            kind,
            style: AnnotationStyle::red_markup(),
            state: State::Idle,
        }
    }

    fn finish_drag(&self, page: u32, start: Point, end: Point, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        if start.distance_to(&end) < ctx.config.min_drag_distance {
            return ToolOutcome::Discarded;
        }

        let viewport = ctx.viewport(page);
        let (geometry, placement) = match self.kind {
            ShapeKind::Rectangle | ShapeKind::Circle => {
                let (rect, placement) = place_rect(Rect::from_corners(start, end), viewport);
                (ShapeGeometry::Rect(rect), placement)
            }
            _ => {
                let (from, placement) = place_point(start, viewport);
                let (to, _) = place_point(end, viewport);
                (ShapeGeometry::Points(vec![from, to]), placement)
            }
        };

        let annotation = ctx.new_annotation(
            page,
            AnnotationBody::Shape {
                kind: self.kind,
                geometry,
            },
            self.style.clone(),
            placement,
        );
        ctx.commit(annotation)
    }

    fn close_polygon(&mut self, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        let State::Polygon { page, vertices, .. } = std::mem::replace(&mut self.state, State::Idle) else {
            return ToolOutcome::None;
        };
        if vertices.len() < MIN_POLYGON_VERTICES {
            return ToolOutcome::Discarded;
        }

        let viewport = ctx.viewport(page);
        let placement = if viewport.is_some() {
            Placement::Exact
        } else {
            Placement::Approximate
        };
        let points = vertices
            .into_iter()
            .map(|vertex| place_point(vertex, viewport).0)
            .collect();

        let annotation = ctx.new_annotation(
            page,
            AnnotationBody::Shape {
                kind: ShapeKind::Polygon,
                geometry: ShapeGeometry::Points(points),
            },
            self.style.clone(),
            placement,
        );
        ctx.commit(annotation)
    }

    fn polygon_pointer(&mut self, event: &PointerEvent, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        match (event.kind, &mut self.state) {
            (PointerKind::Down, State::Polygon { page, vertices, cursor }) if *page == event.page => {
                let closes = vertices.len() >= MIN_POLYGON_VERTICES
                    && vertices
                        .first()
                        .is_some_and(|first| first.distance_to(&event.position) <= ctx.config.min_drag_distance);
                if closes {
                    return self.close_polygon(ctx);
                }
                vertices.push(event.position);
                *cursor = event.position;
                ToolOutcome::PreviewChanged
            }
            (PointerKind::Down, _) => {
                // A click on another page starts over
                self.state = State::Polygon {
                    page: event.page,
                    vertices: vec![event.position],
                    cursor: event.position,
                };
                ToolOutcome::PreviewChanged
            }
            (PointerKind::Move, State::Polygon { page, cursor, .. }) if *page == event.page => {
                *cursor = event.position;
                ToolOutcome::PreviewChanged
            }
            _ => ToolOutcome::None,
        }
    }
}

impl Tool for ShapeTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Shape(self.kind)
    }

    fn pointer(&mut self, event: &PointerEvent, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        if self.kind == ShapeKind::Polygon {
            return self.polygon_pointer(event, ctx);
        }

        match event.kind {
            PointerKind::Down => {
                self.state = State::Dragging {
                    page: event.page,
                    start: event.position,
                    current: event.position,
                };
                ToolOutcome::PreviewChanged
            }
            PointerKind::Move => match &mut self.state {
                State::Dragging { page, current, .. } if *page == event.page => {
                    *current = event.position;
                    ToolOutcome::PreviewChanged
                }
                _ => ToolOutcome::None,
            },
            PointerKind::Up => {
                let State::Dragging { page, start, current } = std::mem::replace(&mut self.state, State::Idle)
                else {
                    return ToolOutcome::None;
                };
                let end = if event.page == page { event.position } else { current };
                self.finish_drag(page, start, end, ctx)
            }
        }
    }

    fn key(&mut self, key: Key, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        match key {
            Key::Enter => self.close_polygon(ctx),
            Key::Escape if self.cancel() => ToolOutcome::Discarded,
            _ => ToolOutcome::None,
        }
    }

    fn cancel(&mut self) -> bool {
        let active = self.state != State::Idle;
        self.state = State::Idle;
        active
    }

    fn preview(&self) -> Option<Preview> {
        match &self.state {
            State::Idle => None,
            State::Dragging { page, start, current } => Some(Preview::Shape {
                page: *page,
                kind: self.kind,
                points: vec![*start, *current],
            }),
            State::Polygon { page, vertices, cursor } => {
                let mut points = vertices.clone();
                points.push(*cursor);
                Some(Preview::Shape {
                    page: *page,
                    kind: ShapeKind::Polygon,
                    points,
                })
            }
        }
    }

    fn set_style(&mut self, style: AnnotationStyle) {
        self.style = style;
    }
}
