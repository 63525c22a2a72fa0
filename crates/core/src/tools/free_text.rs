//! Text boxes and sticky notes

use super::{Key, PointerEvent, PointerKind, Preview, Tool, ToolContext, ToolKind, ToolOutcome};
use crate::annotation::{AnnotationBody, AnnotationStyle, FontStyle};
use crate::geometry::{Point, Rect};
use crate::transform::{place_point, place_rect};

/// Average glyph advance relative to the font size
const CHAR_WIDTH_FACTOR: f64 = 0.6;
const LINE_HEIGHT_FACTOR: f64 = 1.2;
/// Inner padding of a text box, in document units
const TEXT_PADDING: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextMode {
    /// Text drawn directly on the page
    TextBox,
    /// Icon that expands to show its comment
    Note,
}

/// Free text entry
///
/// A click opens an editor at the pointer; the annotation is only created
/// once the host hands back non-blank text through
/// [`Tool::commit_text`].
#[derive(Debug)]
pub struct FreeTextTool {
    mode: TextMode,
    style: AnnotationStyle,
    editing: Option<(u32, Point)>,
}

impl FreeTextTool {
    pub fn new(mode: TextMode) -> Self {
        Self {
            mode,
            style: AnnotationStyle::text(),
            editing: None,
        }
    }
}

/// Estimated size of `text` in document units
pub(crate) fn estimate_text_size(text: &str, font: &FontStyle) -> (f64, f64) {
    let lines: Vec<&str> = text.lines().collect();
    let longest = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
    let width = longest as f64 * font.size * CHAR_WIDTH_FACTOR + TEXT_PADDING;
    let height = lines.len().max(1) as f64 * font.size * LINE_HEIGHT_FACTOR + TEXT_PADDING;
    (width, height)
}

impl Tool for FreeTextTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FreeText(self.mode)
    }

    fn pointer(&mut self, event: &PointerEvent, _ctx: &mut ToolContext<'_>) -> ToolOutcome {
        if event.kind != PointerKind::Down {
            return ToolOutcome::None;
        }
        // A click elsewhere abandons the open editor and starts a new one
        self.editing = Some((event.page, event.position));
        ToolOutcome::BeginTextInput {
            page: event.page,
            at: event.position,
        }
    }

    fn key(&mut self, key: Key, _ctx: &mut ToolContext<'_>) -> ToolOutcome {
        match key {
            Key::Escape if self.cancel() => ToolOutcome::Discarded,
            _ => ToolOutcome::None,
        }
    }

    fn commit_text(&mut self, text: &str, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        let Some((page, at)) = self.editing.take() else {
            return ToolOutcome::None;
        };
        let text = text.trim_end();
        if text.trim().is_empty() {
            return ToolOutcome::Discarded;
        }

        let viewport = ctx.viewport(page);
        let (body, placement) = match self.mode {
            TextMode::TextBox => {
                let font = self.style.font.clone().unwrap_or_default();
                let (width, height) = estimate_text_size(text, &font);
                let scale = viewport.map_or(1.0, |viewport| viewport.scale());
                let (rect, placement) = place_rect(Rect::new(at.x, at.y, width * scale, height * scale), viewport);
                (
                    AnnotationBody::TextBox {
                        rect,
                        text: text.to_string(),
                    },
                    placement,
                )
            }
            TextMode::Note => {
                let (position, placement) = place_point(at, viewport);
                (
                    AnnotationBody::Note {
                        position,
                        text: text.to_string(),
                    },
                    placement,
                )
            }
        };

        let annotation = ctx.new_annotation(page, body, self.style.clone(), placement);
        ctx.commit(annotation)
    }

    fn cancel(&mut self) -> bool {
        self.editing.take().is_some()
    }

    fn preview(&self) -> Option<Preview> {
        self.editing.map(|(page, at)| Preview::TextInput { page, at })
    }

    fn set_style(&mut self, style: AnnotationStyle) {
        self.style = style;
    }
}
