//! Text markup from a text selection
//!
//! Unlike the pointer tools, markup is created from a finished text
//! selection plus an explicit "add markup" action, so it is a function
//! rather than a state machine.

use super::{ToolContext, ToolOutcome};
use crate::anchor::{quads_agree, TextAnchor};
use crate::annotation::{Annotation, AnnotationBody, AnnotationStyle, MarkupKind, PdfCoordinates, Quad};
use crate::transform::{place_point, Placement};

/// A text selection made on a rendered page
#[derive(Debug, Clone, PartialEq)]
pub struct TextSelection<'a> {
    pub page: u32,
    /// Extracted text of the whole page
    pub page_text: &'a str,
    /// Character offsets of the selection in `page_text`
    pub start: usize,
    pub end: usize,
    /// One quad per visual line, page-relative screen pixels
    pub quads: Vec<Quad>,
}

/// Default look of each markup kind
pub fn default_markup_style(kind: MarkupKind) -> AnnotationStyle {
    match kind {
        MarkupKind::Highlight => AnnotationStyle::yellow_highlight(),
        _ => AnnotationStyle {
            stroke_width: 1.0,
            ..AnnotationStyle::red_markup()
        },
    }
}

/// Create a highlight, underline, strike-out or squiggly for `selection`
///
/// Empty selections (no text or no quads) are discarded.
pub fn create_markup(
    ctx: &mut ToolContext<'_>,
    kind: MarkupKind,
    selection: &TextSelection<'_>,
    style: Option<AnnotationStyle>,
    context_chars: usize,
) -> ToolOutcome {
    let Some(anchor) =
        TextAnchor::from_selection(selection.page_text, selection.start, selection.end, context_chars)
    else {
        tracing::debug!(start = selection.start, end = selection.end, "empty text selection");
        return ToolOutcome::Discarded;
    };
    if selection.quads.is_empty() {
        return ToolOutcome::Discarded;
    }

    let viewport = ctx.viewport(selection.page);
    let quads = selection
        .quads
        .iter()
        .map(|quad| Quad {
            points: quad.points.map(|point| place_point(point, viewport).0),
        })
        .collect();
    let (placement, page_width, page_height, rotation) = match viewport {
        Some(viewport) => {
            let (width, height) = viewport.page_size();
            (Placement::Exact, width, height, viewport.rotation())
        }
        // Filled in when the placement is resolved
        None => (Placement::Approximate, 0.0, 0.0, Default::default()),
    };

    let annotation = ctx.new_annotation(
        selection.page,
        AnnotationBody::TextMarkup {
            kind,
            anchor,
            coordinates: PdfCoordinates {
                quads,
                rotation,
                page_width,
                page_height,
            },
        },
        style.unwrap_or_else(|| default_markup_style(kind)),
        placement,
    );
    ctx.commit(annotation)
}

/// Whether quads re-derived from the anchor still cover the stored region
///
/// Non-markup annotations have no region to compare and always agree.
pub fn region_agrees(annotation: &Annotation, rederived: &[Quad], tolerance: f64) -> bool {
    match &annotation.body {
        AnnotationBody::TextMarkup { coordinates, .. } => quads_agree(&coordinates.quads, rederived, tolerance),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use crate::geometry::Rect;
    use crate::transform::Rotation;

    const PAGE_TEXT: &str = "The quick brown fox jumps over the lazy dog";

    fn selection(quads: Vec<Quad>) -> TextSelection<'static> {
        TextSelection {
            page: 1,
            page_text: PAGE_TEXT,
            start: 4,
            end: 19,
            quads,
        }
    }

    #[test]
    fn test_highlight_from_selection() {
        let mut harness = Harness::with_viewport();
        // Two lines on screen
        let quads = vec![
            Quad::from_rect(Rect::new(100.0, 100.0, 200.0, 12.0)),
            Quad::from_rect(Rect::new(100.0, 114.0, 80.0, 12.0)),
        ];

        let outcome = create_markup(
            &mut harness.ctx(),
            MarkupKind::Highlight,
            &selection(quads),
            None,
            10,
        );

        let ToolOutcome::Created(id) = outcome else {
            panic!("expected a created annotation, got {outcome:?}");
        };
        let annotation = harness.model.get(&id).unwrap();
        assert_eq!(annotation.style, AnnotationStyle::yellow_highlight());
        let AnnotationBody::TextMarkup { anchor, coordinates, .. } = &annotation.body else {
            panic!("expected markup");
        };
        assert_eq!(anchor.selected_text, "quick brown fox");
        assert_eq!(anchor.prefix, "The ");
        assert_eq!(anchor.suffix, " jumps ove");
        assert_eq!(coordinates.quads.len(), 2);
        assert_eq!((coordinates.page_width, coordinates.page_height), (1000.0, 1000.0));
        assert_eq!(coordinates.rotation, Rotation::Deg0);
        assert_eq!(annotation.bounds(), Rect::new(100.0, 874.0, 200.0, 26.0));
    }

    #[test]
    fn test_empty_selection_is_discarded() {
        let mut harness = Harness::with_viewport();
        let mut empty = selection(vec![Quad::from_rect(Rect::new(0.0, 0.0, 1.0, 1.0))]);
        empty.end = empty.start;

        assert_eq!(
            create_markup(&mut harness.ctx(), MarkupKind::Underline, &empty, None, 50),
            ToolOutcome::Discarded
        );
        assert_eq!(
            create_markup(&mut harness.ctx(), MarkupKind::Underline, &selection(Vec::new()), None, 50),
            ToolOutcome::Discarded
        );
        assert!(harness.model.is_empty());
    }

    #[test]
    fn test_region_agreement() {
        let mut harness = Harness::with_viewport();
        let screen = Quad::from_rect(Rect::new(100.0, 100.0, 200.0, 12.0));
        let ToolOutcome::Created(id) = create_markup(
            &mut harness.ctx(),
            MarkupKind::StrikeOut,
            &selection(vec![screen]),
            None,
            50,
        ) else {
            panic!("expected a created annotation");
        };
        let annotation = harness.model.get(&id).unwrap();
        let AnnotationBody::TextMarkup { coordinates, .. } = &annotation.body else {
            panic!("expected markup");
        };

        assert!(region_agrees(annotation, &coordinates.quads, 0.5));
        let shifted: Vec<Quad> = coordinates
            .quads
            .iter()
            .map(|quad| Quad {
                points: quad.points.map(|p| p.translate(0.0, 14.0)),
            })
            .collect();
        assert!(!region_agrees(annotation, &shifted, 0.5));
    }
}
