//! Typed publish/subscribe channel between the annotation core and the rest
//! of the application
//!
//! Panels that have no direct reference to the viewer (chat, bookmarks)
//! subscribe here instead of listening on a global broadcast. Delivery is
//! synchronous, in subscription order, with no acknowledgement. Handlers may
//! subscribe, unsubscribe or emit from inside a callback.

use crate::annotation::{Annotation, DocumentId};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Notification published on the bus
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Scroll the viewer to a 1-based page
    JumpToPage(u32),

    /// Scroll the viewer to the text chunk a chat answer cited
    JumpToChunk(String),

    /// A tool committed a new annotation
    AnnotationCreated(Annotation),

    /// Ask the bookmark panel to generate bookmarks for a document
    GenerateBookmark(DocumentId),
}

impl AppEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AppEvent::JumpToPage(_) => EventKind::JumpToPage,
            AppEvent::JumpToChunk(_) => EventKind::JumpToChunk,
            AppEvent::AnnotationCreated(_) => EventKind::AnnotationCreated,
            AppEvent::GenerateBookmark(_) => EventKind::GenerateBookmark,
        }
    }
}

/// Discriminant used to subscribe to one kind of event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JumpToPage,
    JumpToChunk,
    AnnotationCreated,
    GenerateBookmark,
}

/// Handle returned by [`EventBus::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Rc<dyn Fn(&AppEvent)>;

struct Subscriber {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
}

/// Single-threaded event bus
///
/// Cloning the bus yields another handle to the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Rc<RefCell<Vec<Subscriber>>>,
    next_id: Rc<Cell<u64>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.borrow().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`
    pub fn on(&self, kind: EventKind, handler: impl Fn(&AppEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.subscribers.borrow_mut().push(Subscriber {
            id,
            kind,
            handler: Rc::new(handler),
        });
        id
    }

    /// Remove a subscription; returns `false` if it was already gone
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        before != subscribers.len()
    }

    /// Deliver `event` to every current subscriber of its kind
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, event: AppEvent) -> usize {
        let kind = event.kind();
        // Snapshot so handlers can touch the bus while we iterate
        let handlers: Vec<Handler> = self
            .subscribers
            .borrow()
            .iter()
            .filter(|subscriber| subscriber.kind == kind)
            .map(|subscriber| Rc::clone(&subscriber.handler))
            .collect();

        tracing::trace!(?kind, handlers = handlers.len(), "emit");
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|subscriber| subscriber.kind == kind)
            .count()
    }
}
