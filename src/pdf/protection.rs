//! Content protection while the viewer is mounted
//!
//! Suppresses selection and dragging on the viewer surface, and the context
//! menu, copying, and print/save shortcuts page-wide. Everything is
//! registered on install and removed when the guard is dropped.

use crate::host::{
    Disposition, EventType, HostEventKind, HostPage, Key, KeyEvent, ListenerId, ListenerScope,
};

/// Ctrl/Cmd+P and Ctrl/Cmd+S
#[must_use]
pub fn is_blocked_shortcut(key: &KeyEvent) -> bool {
    key.modifiers.command() && matches!(key.key, Key::Char('p' | 'P' | 's' | 'S'))
}

fn suppress(_: &HostEventKind) -> Disposition {
    Disposition::PreventDefault
}

fn suppress_shortcuts(event: &HostEventKind) -> Disposition {
    match event {
        HostEventKind::KeyDown(key) if is_blocked_shortcut(key) => Disposition::PreventDefault,
        _ => Disposition::Continue,
    }
}

/// Installed suppressions; dropping the guard removes them
#[must_use = "protection is removed as soon as the guard is dropped"]
pub struct ContentGuard {
    host: HostPage,
    listeners: Vec<ListenerId>,
}

impl ContentGuard {
    pub fn install(host: &HostPage) -> Self {
        let listeners = vec![
            host.add_listener(ListenerScope::Document, EventType::ContextMenu, suppress),
            host.add_listener(ListenerScope::Viewer, EventType::SelectStart, suppress),
            host.add_listener(ListenerScope::Viewer, EventType::DragStart, suppress),
            host.add_listener(ListenerScope::Document, EventType::Copy, suppress),
            host.add_listener(ListenerScope::Document, EventType::KeyDown, suppress_shortcuts),
        ];
        log::trace!("content guard installed ({} listeners)", listeners.len());

        Self {
            host: host.clone(),
            listeners,
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Drop for ContentGuard {
    fn drop(&mut self) {
        for id in self.listeners.drain(..) {
            self.host.remove_listener(id);
        }
        log::trace!("content guard removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EventTarget, HostEvent, Modifiers};

    fn blocked(host: &HostPage, event: HostEvent) -> bool {
        host.dispatch(&event) == Disposition::PreventDefault
    }

    #[test]
    fn blocks_while_installed() {
        let host = HostPage::default();
        let _guard = ContentGuard::install(&host);

        assert!(blocked(&host, HostEvent::new(EventTarget::Viewer, HostEventKind::ContextMenu)));
        assert!(blocked(&host, HostEvent::new(EventTarget::Page, HostEventKind::Copy)));
        assert!(blocked(&host, HostEvent::new(EventTarget::Viewer, HostEventKind::SelectStart)));
        assert!(blocked(&host, HostEvent::new(EventTarget::Viewer, HostEventKind::DragStart)));
        assert!(blocked(&host, HostEvent::ctrl_char(EventTarget::Page, 'p')));
        assert!(blocked(
            &host,
            HostEvent::key(EventTarget::Viewer, Key::Char('S'), Modifiers::META)
        ));
    }

    #[test]
    fn leaves_ordinary_input_alone() {
        let host = HostPage::default();
        let _guard = ContentGuard::install(&host);

        assert!(!blocked(&host, HostEvent::ctrl_char(EventTarget::Page, 'f')));
        assert!(!blocked(
            &host,
            HostEvent::key(EventTarget::Page, Key::Char('p'), Modifiers::NONE)
        ));
        assert!(!blocked(&host, HostEvent::new(EventTarget::Page, HostEventKind::SelectStart)));
    }

    #[test]
    fn drop_removes_every_listener() {
        let host = HostPage::default();
        let guard = ContentGuard::install(&host);
        assert_eq!(host.listener_count(), guard.listener_count());

        drop(guard);
        assert_eq!(host.listener_count(), 0);
        assert!(!blocked(&host, HostEvent::new(EventTarget::Page, HostEventKind::ContextMenu)));
        assert!(!blocked(&host, HostEvent::new(EventTarget::Page, HostEventKind::Copy)));
        assert!(!blocked(&host, HostEvent::ctrl_char(EventTarget::Page, 'p')));
    }
}
