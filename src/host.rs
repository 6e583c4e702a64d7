//! The hosting page the viewer is mounted into
//!
//! Stands in for the DOM: a registry of event listeners scoped either to the
//! whole document or to the viewer surface, the body's overflow style used for
//! scroll locking, and the viewport width.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::pdf::gesture::TouchEvent;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        meta: false,
        shift: false,
        alt: false,
    };
    pub const CTRL: Self = Self {
        ctrl: true,
        ..Self::NONE
    };
    pub const META: Self = Self {
        meta: true,
        ..Self::NONE
    };

    /// Ctrl on most platforms, Cmd on macOS
    #[must_use]
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Escape,
    Char(char),
    Named(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub modifiers: Modifiers,
}

/// Where an event originated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventTarget {
    /// Inside the viewer surface
    Viewer,
    /// Anywhere else on the page
    Page,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HostEventKind {
    ContextMenu,
    SelectStart,
    DragStart,
    Copy,
    KeyDown(KeyEvent),
    Touch(TouchEvent),
}

impl HostEventKind {
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            HostEventKind::ContextMenu => EventType::ContextMenu,
            HostEventKind::SelectStart => EventType::SelectStart,
            HostEventKind::DragStart => EventType::DragStart,
            HostEventKind::Copy => EventType::Copy,
            HostEventKind::KeyDown(_) => EventType::KeyDown,
            HostEventKind::Touch(_) => EventType::Touch,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HostEvent {
    pub target: EventTarget,
    pub kind: HostEventKind,
}

impl HostEvent {
    #[must_use]
    pub fn new(target: EventTarget, kind: HostEventKind) -> Self {
        Self { target, kind }
    }

    /// Helper to create a key press event
    #[must_use]
    pub fn key(target: EventTarget, key: Key, modifiers: Modifiers) -> Self {
        Self::new(target, HostEventKind::KeyDown(KeyEvent { key, modifiers }))
    }

    /// Helper to create a Ctrl+char key press
    #[must_use]
    pub fn ctrl_char(target: EventTarget, c: char) -> Self {
        Self::key(target, Key::Char(c), Modifiers::CTRL)
    }

    #[must_use]
    pub fn escape() -> Self {
        Self::key(EventTarget::Page, Key::Escape, Modifiers::NONE)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    ContextMenu,
    SelectStart,
    DragStart,
    Copy,
    KeyDown,
    Touch,
}

/// Which events a listener sees
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerScope {
    Document,
    Viewer,
}

impl ListenerScope {
    fn covers(self, target: EventTarget) -> bool {
        match self {
            ListenerScope::Document => true,
            ListenerScope::Viewer => target == EventTarget::Viewer,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    PreventDefault,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Box<dyn Fn(&HostEventKind) -> Disposition + Send>;

struct Listener {
    id: ListenerId,
    scope: ListenerScope,
    event_type: EventType,
    handler: Handler,
}

struct HostState {
    listeners: Vec<Listener>,
    next_id: u64,
    body_overflow: Option<String>,
    viewport_width_px: u32,
}

/// Shared handle to the hosting page
#[derive(Clone)]
pub struct HostPage(Arc<Mutex<HostState>>);

impl Default for HostPage {
    fn default() -> Self {
        Self::new(1280)
    }
}

impl std::fmt::Debug for HostPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("HostPage")
            .field("listeners", &state.listeners.len())
            .field("body_overflow", &state.body_overflow)
            .field("viewport_width_px", &state.viewport_width_px)
            .finish()
    }
}

impl HostPage {
    #[must_use]
    pub fn new(viewport_width_px: u32) -> Self {
        Self(Arc::new(Mutex::new(HostState {
            listeners: Vec::new(),
            next_id: 1,
            body_overflow: None,
            viewport_width_px,
        })))
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_listener(
        &self,
        scope: ListenerScope,
        event_type: EventType,
        handler: impl Fn(&HostEventKind) -> Disposition + Send + 'static,
    ) -> ListenerId {
        let mut state = self.state();
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        state.listeners.push(Listener {
            id,
            scope,
            event_type,
            handler: Box::new(handler),
        });
        id
    }

    /// Returns false if no listener had this id
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.id != id);
        state.listeners.len() != before
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    /// Run every matching listener; any of them may prevent the default action
    pub fn dispatch(&self, event: &HostEvent) -> Disposition {
        let state = self.state();
        let event_type = event.kind.event_type();
        let mut disposition = Disposition::Continue;

        for listener in state
            .listeners
            .iter()
            .filter(|l| l.event_type == event_type && l.scope.covers(event.target))
        {
            if (listener.handler)(&event.kind) == Disposition::PreventDefault {
                disposition = Disposition::PreventDefault;
            }
        }
        disposition
    }

    /// Current inline `overflow` style of the body, `None` when unset
    #[must_use]
    pub fn body_overflow(&self) -> Option<String> {
        self.state().body_overflow.clone()
    }

    /// Replace the body's overflow style, returning the previous value
    pub fn set_body_overflow(&self, value: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.state().body_overflow, value)
    }

    #[must_use]
    pub fn viewport_width_px(&self) -> u32 {
        self.state().viewport_width_px
    }

    pub fn resize(&self, width_px: u32) {
        self.state().viewport_width_px = width_px;
    }
}
