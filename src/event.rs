//! Event keys, handler bundles, and tree-relative input events.
//!
//! Every view can carry a lazily-allocated [`HandlerBundle`]: an ordered list
//! of handlers per event slot, subscribed independently of the view's
//! [`ViewBehavior`](crate::view::ViewBehavior). Built-in lifecycle and input
//! slots form the closed [`EventKind`] enum; applications mint additional
//! slots through a [`KeyRegistry`] (owned by the
//! [`Runtime`](crate::runtime::Runtime)) rather than a hidden global table.
//!
//! Input events carry a mutable `handled` flag. During two-phase dispatch the
//! first handler that calls [`MouseEvent::handle`] (or the key/wheel
//! equivalent) stops propagation immediately.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bitflags::bitflags;

use crate::color::Color;
use crate::context::ViewContext;
use crate::error::Error;
use crate::geometry::Vec2;
use crate::view::ViewId;

bitflags! {
    /// Keyboard modifier state attached to key events.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL  = 1 << 1;
        const ALT   = 1 << 2;
        const META  = 1 << 3;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum MouseButton {
    #[default]
    None,
    Left,
    Middle,
    Right,
}

/// An application-defined event slot minted by [`KeyRegistry`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EventKey(pub(crate) u32);

/// Interned key space for custom event slots.
///
/// Names are unique for the registry's lifetime; registering the same name
/// twice is a caller bug.
#[derive(Default)]
pub struct KeyRegistry {
    names: HashMap<String, EventKey>,
    by_id: Vec<String>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_register(&mut self, name: &str) -> Result<EventKey, Error> {
        if name.is_empty() {
            return Err(Error::DuplicateEventKey(String::new()));
        }
        if self.names.contains_key(name) {
            return Err(Error::DuplicateEventKey(name.to_owned()));
        }
        let key = EventKey(self.by_id.len() as u32);
        self.names.insert(name.to_owned(), key);
        self.by_id.push(name.to_owned());
        Ok(key)
    }

    /// Register a custom event key. Panics on a duplicate or empty name.
    pub fn register(&mut self, name: &str) -> EventKey {
        match self.try_register(name) {
            Ok(key) => key,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<EventKey> {
        self.names.get(name).copied()
    }

    pub fn name(&self, key: EventKey) -> Option<&str> {
        self.by_id.get(key.0 as usize).map(String::as_str)
    }
}

/// Every event slot a view can publish.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EventKind {
    // Property / structure notifications.
    AlphaChanged,
    BackgroundChanged,
    HiddenChanged,
    PositionChanged,
    SizeChanged,
    TransformChanged,
    PreRepaint,
    Repaint,
    SubviewAdded,
    SubviewRemoved,
    SubviewIndexChanged,
    PreLayout,
    Layout,

    // Hover notifications (fired on chain diffs, single phase).
    MouseEntered,
    MouseExited,

    // Capture phase (root -> target).
    PreKeyPressed,
    PreKeyReleased,
    PreKeyTyped,
    PreMousePressed,
    PreMouseReleased,
    PreMouseClicked,
    PreMouseMoved,
    PreMouseDragged,
    PreMouseWheel,

    // Focus notifications.
    GotKeyboardFocus,
    LostKeyboardFocus,

    // Bubble phase (target -> root).
    KeyPressed,
    KeyReleased,
    KeyTyped,
    MousePressed,
    MouseReleased,
    MouseClicked,
    MouseMoved,
    MouseDragged,
    MouseWheel,

    /// Application-defined slot.
    Custom(EventKey),
}

/// Payload handed to event handlers.
pub enum EventArg<'a> {
    None,
    Alpha(f32),
    Background(Option<Color>),
    Vec2(Vec2),
    View(ViewId),
    Mouse(&'a mut MouseEvent),
    Key(&'a mut KeyEvent),
    Wheel(&'a mut WheelEvent),
    Canvas(&'a mut dyn crate::canvas::Canvas),
}

/// Subscription handle returned by [`HandlerBundle::add_handler`] (through
/// `ViewContext::add_event_handler`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct HandlerId(u64);

/// An event handler. Handlers receive the owning context, the sender view,
/// and the event payload.
pub type EventHandler = Rc<RefCell<dyn FnMut(&mut ViewContext, ViewId, &mut EventArg<'_>)>>;

/// Per-view map of event slot to ordered handler list. Allocated lazily the
/// first time a handler is added.
#[derive(Default)]
pub struct HandlerBundle {
    map: HashMap<EventKind, Vec<(HandlerId, EventHandler)>>,
    next_id: u64,
}

impl HandlerBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, kind: EventKind, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.map.entry(kind).or_default().push((id, handler));
        id
    }

    /// Returns true if the handler was present and removed.
    pub fn remove_handler(&mut self, kind: EventKind, id: HandlerId) -> bool {
        if let Some(list) = self.map.get_mut(&kind) {
            let before = list.len();
            list.retain(|(hid, _)| *hid != id);
            return list.len() != before;
        }
        false
    }

    /// Snapshot the handler list for a slot. The snapshot decouples firing
    /// from mutation: a handler may add or remove handlers without
    /// invalidating the iteration in progress.
    pub fn handlers_for(&self, kind: EventKind) -> Vec<EventHandler> {
        self.map
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.values().all(Vec::is_empty)
    }
}

/// A mouse event in root-view coordinates.
///
/// `position` and `velocity` are expressed in the root view's space; use
/// [`MouseEvent::position_in`] / [`MouseEvent::velocity_in`] to resolve them
/// into an arbitrary view's local space.
#[derive(Debug)]
pub struct MouseEvent {
    pub position: Vec2,
    pub button: MouseButton,
    pub click_count: u32,
    pub velocity: Vec2,
    handled: bool,
}

impl MouseEvent {
    pub fn new(position: Vec2, button: MouseButton, click_count: u32, velocity: Vec2) -> Self {
        Self {
            position,
            button,
            click_count,
            velocity,
            handled: false,
        }
    }

    /// Mark the event handled, stopping propagation after the current
    /// handler returns.
    pub fn handle(&mut self) {
        self.handled = true;
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// The event position in `view`'s local coordinate space.
    pub fn position_in(&self, cx: &ViewContext, view: ViewId) -> Vec2 {
        cx.point_from_root(view, self.position)
    }

    /// The velocity vector rotated/scaled into `view`'s local space.
    ///
    /// Velocity is a direction, not a position, so the transform is applied
    /// to both endpoints of the vector and the difference is taken.
    pub fn velocity_in(&self, cx: &ViewContext, view: ViewId) -> Vec2 {
        let tip = cx.point_from_root(view, self.velocity);
        let origin = cx.point_from_root(view, Vec2::ZERO);
        tip - origin
    }
}

/// A keyboard event dispatched along the focus chain.
#[derive(Debug)]
pub struct KeyEvent {
    pub code: u32,
    pub ch: Option<char>,
    pub modifiers: Modifiers,
    handled: bool,
}

impl KeyEvent {
    pub fn new(code: u32, ch: Option<char>, modifiers: Modifiers) -> Self {
        Self {
            code,
            ch,
            modifiers,
            handled: false,
        }
    }

    pub fn handle(&mut self) {
        self.handled = true;
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    pub fn is_shift_down(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }

    pub fn is_ctrl_down(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }

    pub fn is_alt_down(&self) -> bool {
        self.modifiers.contains(Modifiers::ALT)
    }

    pub fn is_meta_down(&self) -> bool {
        self.modifiers.contains(Modifiers::META)
    }

    pub fn is_meta_or_ctrl_down(&self) -> bool {
        self.modifiers.intersects(Modifiers::META | Modifiers::CTRL)
    }
}

/// A scroll-wheel event. Shares the mouse event's coordinate conventions.
#[derive(Debug)]
pub struct WheelEvent {
    pub position: Vec2,
    pub rotation: i32,
    pub velocity: Vec2,
    handled: bool,
}

impl WheelEvent {
    pub fn new(position: Vec2, rotation: i32, velocity: Vec2) -> Self {
        Self {
            position,
            rotation,
            velocity,
            handled: false,
        }
    }

    pub fn handle(&mut self) {
        self.handled = true;
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    pub fn position_in(&self, cx: &ViewContext, view: ViewId) -> Vec2 {
        cx.point_from_root(view, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler() -> EventHandler {
        Rc::new(RefCell::new(|_: &mut ViewContext, _: ViewId, _: &mut EventArg<'_>| {}))
    }

    #[test]
    fn test_key_registry_unique_names() {
        let mut reg = KeyRegistry::new();
        let a = reg.register("scrolled");
        let b = reg.register("toggled");
        assert_ne!(a, b);
        assert_eq!(reg.lookup("scrolled"), Some(a));
        assert_eq!(reg.name(b), Some("toggled"));
        assert_eq!(
            reg.try_register("scrolled"),
            Err(Error::DuplicateEventKey("scrolled".into()))
        );
    }

    #[test]
    #[should_panic(expected = "duplicate event key")]
    fn test_key_registry_duplicate_panics() {
        let mut reg = KeyRegistry::new();
        reg.register("once");
        reg.register("once");
    }

    #[test]
    fn test_handler_bundle_add_remove() {
        let mut bundle = HandlerBundle::new();
        let id = bundle.add_handler(EventKind::MousePressed, noop_handler());
        assert_eq!(bundle.handlers_for(EventKind::MousePressed).len(), 1);
        assert!(bundle.remove_handler(EventKind::MousePressed, id));
        assert!(!bundle.remove_handler(EventKind::MousePressed, id));
        assert!(bundle.handlers_for(EventKind::MousePressed).is_empty());
    }

    #[test]
    fn test_handler_bundle_preserves_order() {
        let mut bundle = HandlerBundle::new();
        let a = bundle.add_handler(EventKind::Repaint, noop_handler());
        let b = bundle.add_handler(EventKind::Repaint, noop_handler());
        assert_ne!(a, b);
        assert_eq!(bundle.handlers_for(EventKind::Repaint).len(), 2);
    }

    #[test]
    fn test_modifiers() {
        let e = KeyEvent::new(13, Some('\n'), Modifiers::CTRL | Modifiers::SHIFT);
        assert!(e.is_ctrl_down());
        assert!(e.is_shift_down());
        assert!(!e.is_alt_down());
        assert!(e.is_meta_or_ctrl_down());
    }
}
