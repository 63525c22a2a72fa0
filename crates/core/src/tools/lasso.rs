//! Freeform lasso selection

use super::{Key, PointerEvent, PointerKind, Preview, Tool, ToolContext, ToolKind, ToolOutcome};
use crate::annotation::AnnotationId;
use crate::geometry::{point_in_polygon, Point};

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    Drawing { page: u32, points: Vec<Point> },
}

/// Lasso
///
/// The traced outline is closed implicitly; an annotation is selected when
/// the center of its bounding box lies inside it. Delete removes the lasso
/// selection.
#[derive(Debug)]
pub struct LassoTool {
    state: State,
}

impl Default for LassoTool {
    fn default() -> Self {
        Self::new()
    }
}

impl LassoTool {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    fn finish(page: u32, polygon: &[Point], ctx: &mut ToolContext<'_>) -> ToolOutcome {
        if polygon.len() < ctx.config.min_lasso_points {
            return ToolOutcome::Discarded;
        }

        let ids: Vec<AnnotationId> = ctx
            .model
            .get_by_page(page)
            .into_iter()
            .filter(|annotation| point_in_polygon(&ctx.screen_bounds(annotation).center(), polygon))
            .map(|annotation| annotation.id.clone())
            .collect();

        tracing::debug!(page, selected = ids.len(), "lasso selection");
        ctx.model.select(&ids);
        ToolOutcome::SelectionChanged(ctx.model.get_selection().to_vec())
    }
}

impl Tool for LassoTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Lasso
    }

    fn pointer(&mut self, event: &PointerEvent, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        match event.kind {
            PointerKind::Down => {
                self.state = State::Drawing {
                    page: event.page,
                    points: vec![event.position],
                };
                ToolOutcome::PreviewChanged
            }
            PointerKind::Move => match &mut self.state {
                State::Drawing { page, points } if *page == event.page => {
                    points.push(event.position);
                    ToolOutcome::PreviewChanged
                }
                _ => ToolOutcome::None,
            },
            PointerKind::Up => {
                let State::Drawing { page, mut points } = std::mem::replace(&mut self.state, State::Idle) else {
                    return ToolOutcome::None;
                };
                if event.page == page && points.last() != Some(&event.position) {
                    points.push(event.position);
                }
                Self::finish(page, &points, ctx)
            }
        }
    }

    fn key(&mut self, key: Key, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        match key {
            k if k.is_delete() => {
                let selection = ctx.model.get_selection().to_vec();
                ctx.request_delete(&selection)
            }
            Key::Escape if self.cancel() => ToolOutcome::Discarded,
            _ => ToolOutcome::None,
        }
    }

    fn cancel(&mut self) -> bool {
        matches!(std::mem::replace(&mut self.state, State::Idle), State::Drawing { .. })
    }

    fn preview(&self) -> Option<Preview> {
        match &self.state {
            State::Idle => None,
            State::Drawing { page, points } => Some(Preview::Lasso {
                page: *page,
                points: points.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::super::PendingDeletion;
    use super::*;
    use crate::annotation::{AnnotationBody, AnnotationStyle};
    use crate::transform::Placement;

    /// Note centered on a screen point (page is 1000pt tall at scale 1)
    fn add_note(harness: &mut Harness, x: f64, y: f64) -> AnnotationId {
        let annotation = harness.ctx().new_annotation(
            1,
            AnnotationBody::Note {
                position: Point::new(x, 1000.0 - y),
                text: String::new(),
            },
            AnnotationStyle::text(),
            Placement::Exact,
        );
        harness.model.create(annotation)
    }

    #[test]
    fn test_selects_annotations_with_center_inside() {
        let mut harness = Harness::with_viewport();
        let a = add_note(&mut harness, 10.0, 10.0);
        let b = add_note(&mut harness, 50.0, 50.0);
        add_note(&mut harness, 200.0, 200.0);
        let mut tool = LassoTool::new();

        let outcome = harness.drag(&mut tool, &[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]);

        assert_eq!(outcome, ToolOutcome::SelectionChanged(vec![a.clone(), b.clone()]));
        assert_eq!(harness.model.get_selection(), &[a, b]);
    }

    #[test]
    fn test_short_lasso_selects_nothing() {
        let mut harness = Harness::with_viewport();
        add_note(&mut harness, 10.0, 10.0);
        let mut tool = LassoTool::new();

        let outcome = harness.drag(&mut tool, &[(0.0, 0.0), (100.0, 100.0)]);

        assert_eq!(outcome, ToolOutcome::Discarded);
        assert!(harness.model.get_selection().is_empty());
    }

    #[test]
    fn test_delete_after_lasso() {
        let mut harness = Harness::with_viewport();
        let a = add_note(&mut harness, 10.0, 10.0);
        let mut tool = LassoTool::new();
        harness.drag(&mut tool, &[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]);

        assert_eq!(
            tool.key(Key::Backspace, &mut harness.ctx()),
            ToolOutcome::ConfirmDelete(PendingDeletion { ids: vec![a.clone()] })
        );

        harness.config.confirm_destructive = false;
        assert_eq!(tool.key(Key::Delete, &mut harness.ctx()), ToolOutcome::Deleted(vec![a]));
        assert!(harness.model.is_empty());
    }
}
