//! Circular eraser

use super::{PointerEvent, PointerKind, Preview, Tool, ToolContext, ToolKind, ToolOutcome};
use crate::annotation::AnnotationId;
use crate::config::ToolConfig;
use crate::geometry::{circle_intersects_rect, Point};

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    Hovering {
        page: u32,
        center: Point,
    },
    Erasing {
        page: u32,
        center: Point,
        marked: Vec<AnnotationId>,
    },
}

/// Eraser
///
/// While the pointer is down, every unlocked annotation whose bounding box
/// meets the eraser circle is marked. Fast pointer moves are swept in steps
/// of half the radius so nothing between two samples is skipped. Everything
/// marked is deleted together when the pointer is released, with a single
/// model change (and therefore a single backend delete call).
#[derive(Debug)]
pub struct EraserTool {
    /// Last radius seen in the config, for the cursor preview
    radius: f64,
    state: State,
}

impl Default for EraserTool {
    fn default() -> Self {
        Self::new()
    }
}

impl EraserTool {
    pub fn new() -> Self {
        Self {
            radius: ToolConfig::default().eraser_radius,
            state: State::Idle,
        }
    }

    fn mark_at(center: &Point, page: u32, marked: &mut Vec<AnnotationId>, ctx: &ToolContext<'_>) {
        let radius = ctx.config.eraser_radius;
        for annotation in ctx.model.get_by_page(page) {
            if annotation.is_locked() || marked.contains(&annotation.id) {
                continue;
            }
            if circle_intersects_rect(center, radius, &ctx.screen_bounds(annotation)) {
                marked.push(annotation.id.clone());
            }
        }
    }

    /// Mark along the segment `from -> to`, sampling every half radius
    fn sweep(from: Point, to: Point, page: u32, marked: &mut Vec<AnnotationId>, ctx: &ToolContext<'_>) {
        let step = (ctx.config.eraser_radius / 2.0).max(1.0);
        let distance = from.distance_to(&to);
        if !distance.is_finite() {
            return;
        }
        let steps = (distance / step).ceil() as usize;
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            let center = Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t);
            Self::mark_at(&center, page, marked, ctx);
        }
        Self::mark_at(&to, page, marked, ctx);
    }
}

impl Tool for EraserTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Eraser
    }

    fn pointer(&mut self, event: &PointerEvent, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        self.radius = ctx.config.eraser_radius;
        match event.kind {
            PointerKind::Down => {
                let mut marked = Vec::new();
                Self::mark_at(&event.position, event.page, &mut marked, ctx);
                self.state = State::Erasing {
                    page: event.page,
                    center: event.position,
                    marked,
                };
                ToolOutcome::PreviewChanged
            }
            PointerKind::Move => {
                match &mut self.state {
                    State::Erasing { page, center, marked } if *page == event.page => {
                        Self::sweep(*center, event.position, *page, marked, ctx);
                        *center = event.position;
                    }
                    State::Erasing { .. } => return ToolOutcome::None,
                    _ => {
                        self.state = State::Hovering {
                            page: event.page,
                            center: event.position,
                        };
                    }
                }
                ToolOutcome::PreviewChanged
            }
            PointerKind::Up => {
                let State::Erasing { page, center, mut marked } = std::mem::replace(&mut self.state, State::Idle)
                else {
                    return ToolOutcome::None;
                };
                if event.page == page {
                    Self::sweep(center, event.position, page, &mut marked, ctx);
                    self.state = State::Hovering {
                        page,
                        center: event.position,
                    };
                }
                if marked.is_empty() {
                    return ToolOutcome::Discarded;
                }

                let deleted: Vec<AnnotationId> = ctx
                    .model
                    .delete_many(&marked)
                    .into_iter()
                    .map(|annotation| annotation.id)
                    .collect();
                tracing::debug!(page, count = deleted.len(), "erased annotations");
                ToolOutcome::Deleted(deleted)
            }
        }
    }

    fn cancel(&mut self) -> bool {
        matches!(std::mem::replace(&mut self.state, State::Idle), State::Erasing { .. })
    }

    fn preview(&self) -> Option<Preview> {
        let (page, center, marked) = match &self.state {
            State::Idle => return None,
            State::Hovering { page, center } => (*page, *center, Vec::new()),
            State::Erasing { page, center, marked } => (*page, *center, marked.clone()),
        };
        Some(Preview::Eraser {
            page,
            center,
            radius: self.radius,
            marked,
        })
    }
}
