//! Image stamps and signatures

use super::{Key, PointerEvent, PointerKind, Preview, Tool, ToolContext, ToolKind, ToolOutcome};
use crate::annotation::{AnnotationBody, AnnotationStyle, EmbeddedImage};
use crate::error::StampError;
use crate::geometry::{Point, Rect};
use crate::transform::place_rect;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::ImageReader;
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StampMode {
    Image,
    Signature,
}

/// Image placement
///
/// A click picks the spot and asks the host for an image; the stamp is
/// created when the bytes come back through [`Tool::place_image`]. The image
/// is embedded as a data URL and sized to fit the configured maximum while
/// keeping its aspect ratio; its top-left corner sits at the click.
#[derive(Debug)]
pub struct StampTool {
    mode: StampMode,
    style: AnnotationStyle,
    placing: Option<(u32, Point)>,
}

impl StampTool {
    pub fn new(mode: StampMode) -> Self {
        Self {
            mode,
            style: AnnotationStyle::new(),
            placing: None,
        }
    }
}

/// Decode enough of an image to embed it
pub fn embed_image(bytes: &[u8]) -> Result<EmbeddedImage, StampError> {
    if bytes.is_empty() {
        return Err(StampError::Empty);
    }
    let format = image::guess_format(bytes)?;
    // Header only; the bitmap itself is never decoded
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format).into_dimensions()?;
    Ok(EmbeddedImage {
        data_url: format!("data:{};base64,{}", format.to_mime_type(), STANDARD.encode(bytes)),
        width,
        height,
    })
}

/// Document size of an image, shrunk to fit `max_side`
pub(crate) fn fit_size(width: u32, height: u32, max_side: f64) -> (f64, f64) {
    let (width, height) = (width.max(1) as f64, height.max(1) as f64);
    let factor = (max_side / width.max(height)).min(1.0);
    (width * factor, height * factor)
}

impl Tool for StampTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Stamp(self.mode)
    }

    fn pointer(&mut self, event: &PointerEvent, _ctx: &mut ToolContext<'_>) -> ToolOutcome {
        if event.kind != PointerKind::Down {
            return ToolOutcome::None;
        }
        self.placing = Some((event.page, event.position));
        ToolOutcome::RequestImage {
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

    fn place_image(&mut self, bytes: &[u8], ctx: &mut ToolContext<'_>) -> Result<ToolOutcome, StampError> {
        let (page, at) = self.placing.ok_or(StampError::NotPlacing)?;
        // An unreadable file leaves the placement open for another attempt
        let image = embed_image(bytes)?;
        self.placing = None;

        let (width, height) = fit_size(image.width, image.height, ctx.config.stamp_max_size);
        let viewport = ctx.viewport(page);
        let scale = viewport.map_or(1.0, |viewport| viewport.scale());
        let (rect, placement) = place_rect(Rect::new(at.x, at.y, width * scale, height * scale), viewport);

        tracing::debug!(
            page,
            width = image.width,
            height = image.height,
            mode = ?self.mode,
            "placing image"
        );
        let body = match self.mode {
            StampMode::Image => AnnotationBody::Stamp {
                rect,
                image,
                subtype: None,
            },
            StampMode::Signature => AnnotationBody::Signature { rect, image },
        };
        let annotation = ctx.new_annotation(page, body, self.style.clone(), placement);
        Ok(ctx.commit(annotation))
    }

    fn cancel(&mut self) -> bool {
        self.placing.take().is_some()
    }

    fn preview(&self) -> Option<Preview> {
        self.placing.map(|(page, at)| Preview::StampPlacement { page, at })
    }

    fn set_style(&mut self, style: AnnotationStyle) {
        self.style = style;
    }
}
