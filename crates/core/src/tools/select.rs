//! Click selection and drag-to-move

use super::{Key, PointerEvent, PointerKind, Preview, Tool, ToolContext, ToolKind, ToolOutcome};
use crate::annotation::AnnotationId;
use crate::geometry::Point;
use crate::model::AnnotationPatch;

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    /// Pointer is down on an annotation; becomes a move past the drag threshold
    Pressed {
        page: u32,
        ids: Vec<AnnotationId>,
        origin: Point,
        current: Point,
        moving: bool,
    },
}

/// Pointer selection
///
/// A click selects every annotation whose bounding box contains the point
/// (within the hit tolerance); clicking empty space clears the selection.
/// Dragging a selected annotation moves the whole selection.
#[derive(Debug)]
pub struct SelectTool {
    state: State,
}

impl Default for SelectTool {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectTool {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    fn hits(&self, ctx: &ToolContext<'_>, page: u32, position: &Point) -> Vec<AnnotationId> {
        ctx.model
            .get_by_page(page)
            .into_iter()
            .filter(|annotation| {
                ctx.screen_bounds(annotation)
                    .inflate(ctx.config.hit_tolerance)
                    .contains_point(position, 0.0)
            })
            .map(|annotation| annotation.id.clone())
            .collect()
    }

    fn press(&mut self, event: &PointerEvent, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        let hits = self.hits(ctx, event.page, &event.position);
        if hits.is_empty() {
            self.state = State::Idle;
            if ctx.model.get_selection().is_empty() {
                return ToolOutcome::None;
            }
            ctx.model.clear_selection();
            return ToolOutcome::SelectionChanged(Vec::new());
        }

        // Pressing on part of the selection keeps it so it can be dragged
        let outcome = if hits.iter().any(|id| ctx.model.is_selected(id)) {
            ToolOutcome::None
        } else {
            ctx.model.select(&hits);
            ToolOutcome::SelectionChanged(ctx.model.get_selection().to_vec())
        };

        self.state = State::Pressed {
            page: event.page,
            ids: ctx.model.get_selection().to_vec(),
            origin: event.position,
            current: event.position,
            moving: false,
        };
        outcome
    }

    /// Translate the unlocked part of the selection by the drag delta
    fn finish_move(&self, page: u32, origin: Point, current: Point, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        let pixel_delta = (current.x - origin.x, current.y - origin.y);
        let document_delta = ctx.viewport(page).map(|viewport| {
            let from = viewport.to_document_point(origin);
            let to = viewport.to_document_point(current);
            (to.x - from.x, to.y - from.y)
        });

        let moves: Vec<(AnnotationId, AnnotationPatch)> = ctx
            .model
            .get_selection()
            .iter()
            .filter_map(|id| ctx.model.get(id))
            .filter(|annotation| !annotation.is_locked() && annotation.page_number == page)
            .filter_map(|annotation| {
                let (dx, dy) = if annotation.is_approximate() {
                    pixel_delta
                } else {
                    document_delta?
                };
                Some((
                    annotation.id.clone(),
                    AnnotationPatch::body(annotation.body.translate(dx, dy)),
                ))
            })
            .collect();

        if moves.is_empty() {
            return ToolOutcome::Discarded;
        }

        let mut moved = Vec::with_capacity(moves.len());
        for (id, patch) in moves {
            if ctx.model.update(&id, patch) {
                moved.push(id);
            }
        }
        tracing::debug!(page, count = moved.len(), "moved annotations");
        ToolOutcome::Updated(moved)
    }
}

impl Tool for SelectTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Select
    }

    fn pointer(&mut self, event: &PointerEvent, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        match event.kind {
            PointerKind::Down => self.press(event, ctx),
            PointerKind::Move => {
                let State::Pressed {
                    page,
                    origin,
                    current,
                    moving,
                    ..
                } = &mut self.state
                else {
                    return ToolOutcome::None;
                };
                if *page != event.page {
                    return ToolOutcome::None;
                }
                *current = event.position;
                if !*moving && origin.distance_to(current) >= ctx.config.min_drag_distance {
                    *moving = true;
                }
                if *moving {
                    ToolOutcome::PreviewChanged
                } else {
                    ToolOutcome::None
                }
            }
            PointerKind::Up => {
                let state = std::mem::replace(&mut self.state, State::Idle);
                let State::Pressed {
                    page, origin, moving, ..
                } = state
                else {
                    return ToolOutcome::None;
                };
                let current = if event.page == page { event.position } else { origin };
                let moving = moving || origin.distance_to(&current) >= ctx.config.min_drag_distance;
                if !moving {
                    return ToolOutcome::None;
                }
                self.finish_move(page, origin, current, ctx)
            }
        }
    }

    fn key(&mut self, key: Key, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        match key {
            k if k.is_delete() => {
                let selection = ctx.model.get_selection().to_vec();
                ctx.request_delete(&selection)
            }
            Key::Escape => {
                if self.cancel() {
                    return ToolOutcome::Discarded;
                }
                if ctx.model.get_selection().is_empty() {
                    return ToolOutcome::None;
                }
                ctx.model.clear_selection();
                ToolOutcome::SelectionChanged(Vec::new())
            }
            _ => ToolOutcome::None,
        }
    }

    fn cancel(&mut self) -> bool {
        let moving = matches!(self.state, State::Pressed { moving: true, .. });
        self.state = State::Idle;
        moving
    }

    fn preview(&self) -> Option<Preview> {
        match &self.state {
            State::Pressed {
                page,
                ids,
                origin,
                current,
                moving: true,
            } => Some(Preview::Move {
                page: *page,
                ids: ids.clone(),
                offset: Point::new(current.x - origin.x, current.y - origin.y),
            }),
            _ => None,
        }
    }
}
