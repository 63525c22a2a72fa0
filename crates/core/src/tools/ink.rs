//! Freehand ink strokes

use super::{PointerEvent, PointerKind, Preview, Tool, ToolContext, ToolKind, ToolOutcome};
use crate::annotation::{AnnotationBody, AnnotationStyle, InkPath, InkPoint};
use crate::geometry::{smooth_path_with, Point};
use crate::transform::{place_point, Placement};

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    Drawing { page: u32, samples: Vec<InkPoint> },
}

/// Pen tool
///
/// Samples the pointer while it is down, then smooths the stroke with a
/// Catmull-Rom spline before storing it. Strokes with too few samples are
/// treated as stray taps.
#[derive(Debug)]
pub struct InkTool {
    style: AnnotationStyle,
    state: State,
}

impl Default for InkTool {
    fn default() -> Self {
        Self::new()
    }
}

impl InkTool {
    pub fn new() -> Self {
        Self {
            style: AnnotationStyle::red_markup(),
            state: State::Idle,
        }
    }

    fn push(samples: &mut Vec<InkPoint>, event: &PointerEvent) {
        let sample = InkPoint {
            x: event.position.x,
            y: event.position.y,
            pressure: event.pressure,
        };
        // Repeated events at the same spot add nothing to the stroke
        if samples.last().is_some_and(|last| last.point() == sample.point()) {
            return;
        }
        samples.push(sample);
    }

    fn finish(&self, page: u32, samples: Vec<InkPoint>, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        if samples.len() < ctx.config.min_ink_points {
            tracing::debug!(samples = samples.len(), "ink stroke too short, discarding");
            return ToolOutcome::Discarded;
        }

        let smoothed = smooth_stroke(&samples, ctx.config.smoothing_tension, ctx.config.smoothing_segments);
        let viewport = ctx.viewport(page);
        let placement = if viewport.is_some() {
            Placement::Exact
        } else {
            Placement::Approximate
        };
        let points = smoothed
            .into_iter()
            .map(|sample| {
                let (point, _) = place_point(sample.point(), viewport);
                InkPoint {
                    x: point.x,
                    y: point.y,
                    pressure: sample.pressure,
                }
            })
            .collect();

        let annotation = ctx.new_annotation(
            page,
            AnnotationBody::Ink {
                paths: vec![InkPath { points }],
            },
            self.style.clone(),
            placement,
        );
        ctx.commit(annotation)
    }
}

/// Smooth positions and carry pressure along the interpolated samples
fn smooth_stroke(samples: &[InkPoint], tension: f64, segments: usize) -> Vec<InkPoint> {
    let positions: Vec<Point> = samples.iter().map(InkPoint::point).collect();
    let smoothed = smooth_path_with(&positions, tension, segments);
    if smoothed.len() == samples.len() {
        return samples.to_vec();
    }

    smoothed
        .into_iter()
        .enumerate()
        .map(|(index, point)| {
            let segment = (index / segments).min(samples.len() - 1);
            let t = (index % segments) as f64 / segments as f64;
            let next = (segment + 1).min(samples.len() - 1);
            InkPoint {
                x: point.x,
                y: point.y,
                pressure: lerp_pressure(samples[segment].pressure, samples[next].pressure, t),
            }
        })
        .collect()
}

fn lerp_pressure(a: Option<f64>, b: Option<f64>, t: f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + (b - a) * t),
        (Some(p), None) | (None, Some(p)) => Some(p),
        (None, None) => None,
    }
}

impl Tool for InkTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Ink
    }

    fn pointer(&mut self, event: &PointerEvent, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        match event.kind {
            PointerKind::Down => {
                let mut samples = Vec::new();
                Self::push(&mut samples, event);
                self.state = State::Drawing {
                    page: event.page,
                    samples,
                };
                ToolOutcome::PreviewChanged
            }
            PointerKind::Move => match &mut self.state {
                State::Drawing { page, samples } if *page == event.page => {
                    Self::push(samples, event);
                    ToolOutcome::PreviewChanged
                }
                _ => ToolOutcome::None,
            },
            PointerKind::Up => {
                let State::Drawing { page, mut samples } = std::mem::replace(&mut self.state, State::Idle)
                else {
                    return ToolOutcome::None;
                };
                if event.page == page {
                    Self::push(&mut samples, event);
                }
                self.finish(page, samples, ctx)
            }
        }
    }

    fn cancel(&mut self) -> bool {
        matches!(std::mem::replace(&mut self.state, State::Idle), State::Drawing { .. })
    }

    fn preview(&self) -> Option<Preview> {
        match &self.state {
            State::Idle => None,
            State::Drawing { page, samples } => Some(Preview::Ink {
                page: *page,
                points: samples.iter().map(InkPoint::point).collect(),
            }),
        }
    }

    fn set_style(&mut self, style: AnnotationStyle) {
        self.style = style;
    }
}
