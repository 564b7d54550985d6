//! One view tree bound to one host window.
//!
//! A [`ViewContext`] owns the view arena, the root view, the per-context
//! [`BufferPool`], keyboard focus, and the mouse-over chain. Raw host input
//! is pulled through the [`HostWindow`](crate::canvas::HostWindow) binding
//! and dispatched here in two phases: capture (`Pre*` slots, root toward the
//! target) then bubble (unprefixed slots, target toward the root). The first
//! hook or handler that marks the event handled stops the walk.
//!
//! The context tracks a single dirty flag. Any visual mutation sets it; the
//! runtime repaints dirty contexts once per frame tick, so a burst of
//! mutations between ticks costs one traversal.

use crate::canvas::{Canvas, HostWindow, InputEvent, KeyInput};
use crate::color::Color;
use crate::event::{
    EventArg, EventKind, KeyEvent, MouseButton, MouseEvent, WheelEvent,
};
use crate::geometry::{Rect, Vec2};
use crate::pool::BufferPool;
use crate::view::{Slot, ViewId};

/// Milliseconds of pointer motion accumulated per velocity sample.
const VELOCITY_SAMPLE_MS: u64 = 40;

pub struct ViewContext {
    // arena (accessed by the view module)
    pub(crate) slots: Vec<Slot>,
    pub(crate) free: Vec<u32>,
    pub(crate) root: ViewId,
    pub(crate) alloc_count: u64,

    pub(crate) host: Box<dyn HostWindow>,
    pub(crate) pool: BufferPool,
    pub(crate) invalid: bool,

    // keyboard focus, ordered outermost -> focused leaf
    focus_chain: Vec<ViewId>,

    // hover chain, ordered root -> deepest view under the pointer
    mouse_chain: Vec<ViewId>,
    last_mouse_root: Vec2,

    // pointer velocity sampling
    current_mouse: Option<Vec2>,
    last_mouse: Option<Vec2>,
    cached_velocity: Option<Vec2>,
    mouse_timer_ms: u64,
    pressed_button: MouseButton,

    // debug overlay
    debug_mode: bool,
    debug_target: Option<ViewId>,
    overlay_fps: u32,
}

impl ViewContext {
    /// Create a context bound to `host`, with a fresh default root view
    /// sized to the host window.
    pub fn new(host: Box<dyn HostWindow>) -> Self {
        let mut cx = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: ViewId {
                index: 0,
                generation: 0,
            },
            alloc_count: 0,
            host,
            pool: BufferPool::new(),
            invalid: true,
            focus_chain: Vec::new(),
            mouse_chain: Vec::new(),
            last_mouse_root: Vec2::ZERO,
            current_mouse: None,
            last_mouse: None,
            cached_velocity: None,
            mouse_timer_ms: 0,
            pressed_button: MouseButton::None,
            debug_mode: false,
            debug_target: None,
            overlay_fps: 0,
        };
        let root = cx.new_view();
        cx.root = root;
        cx.propagate_context(root, true);
        let size = cx.host.size();
        cx.set_size(root, size.x, size.y);
        cx
    }

    pub fn root_view(&self) -> ViewId {
        self.root
    }

    /// Replace the root view. The new root must be standalone; the old root
    /// and its subtree stay in the arena but leave the context. Focus and
    /// hover state are reset.
    pub fn set_root_view(&mut self, view: ViewId) {
        if let Err(e) = self.try_set_root_view(view) {
            panic!("{e}");
        }
    }

    pub fn try_set_root_view(&mut self, view: ViewId) -> Result<(), crate::error::Error> {
        if !self.contains(view) {
            return Err(crate::error::Error::UnknownView);
        }
        if self.parent(view).is_some() || self.has_context(view) {
            return Err(crate::error::Error::AlreadyInContext);
        }
        self.request_focus(None);
        self.set_mouse_chain(Vec::new());
        let old = self.root;
        self.turn_back_buffers(old);
        self.propagate_context(old, false);
        self.root = view;
        self.propagate_context(view, true);
        let size = self.host.size();
        self.set_position(view, 0, 0);
        self.set_size(view, size.x, size.y);
        self.invalid = true;
        Ok(())
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Change the surface-memory ceiling of this context's pool.
    pub fn set_buffer_limit_bytes(&mut self, limit: u64) {
        self.pool.set_limit_bytes(limit);
    }

    pub fn host(&self) -> &dyn HostWindow {
        &*self.host
    }

    pub fn host_mut(&mut self) -> &mut dyn HostWindow {
        &mut *self.host
    }

    /// Release everything the context holds against the host: all cached
    /// view buffers and the idle pool. The tree itself stays usable.
    pub fn dispose(&mut self) {
        let root = self.root;
        self.turn_back_buffers(root);
        self.pool.clear();
    }

    // ---- frame ----

    /// Whether something changed since the last rendered frame.
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// Force a full repaint on the next frame.
    pub fn invalidate(&mut self) {
        self.invalid = true;
    }

    /// Paint the tree into the host window. Clears the dirty flag first so
    /// paint hooks can re-dirty the context for the next frame.
    pub fn render_frame(&mut self) {
        self.invalid = false;
        let mut canvas = match self.host.begin_frame() {
            Some(c) => c,
            None => {
                // Host can't paint right now; try again next tick.
                self.invalid = true;
                return;
            }
        };
        let root = self.root;
        self.repaint_view(root, &mut *canvas, false);
        if self.debug_mode {
            self.paint_debug_overlay(&mut *canvas);
            // The overlay shows live counters, so keep frames coming.
            self.invalid = true;
        }
        self.host.end_frame(canvas);
    }

    /// Drain pending host input and dispatch it through the tree.
    pub fn pump_input(&mut self) {
        let events = self.host.take_events();
        for event in events {
            self.dispatch_input(event);
        }
    }

    /// Dispatch one raw input event. Positions are in root-view
    /// coordinates.
    pub fn dispatch_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::KeyPressed(k) => {
                self.dispatch_key(EventKind::PreKeyPressed, EventKind::KeyPressed, k)
            }
            InputEvent::KeyReleased(k) => {
                self.dispatch_key(EventKind::PreKeyReleased, EventKind::KeyReleased, k)
            }
            InputEvent::KeyTyped(k) => {
                self.dispatch_key(EventKind::PreKeyTyped, EventKind::KeyTyped, k)
            }
            InputEvent::MousePressed {
                position,
                button,
                click_count,
            } => {
                self.host.acquire_focus();
                self.current_mouse = Some(position);
                self.pressed_button = button;
                let mut e = MouseEvent::new(position, button, click_count, self.mouse_velocity());
                self.update_mouse_chain(Some(position));
                self.dispatch_mouse(EventKind::PreMousePressed, EventKind::MousePressed, &mut e);
            }
            InputEvent::MouseReleased {
                position,
                button,
                click_count,
            } => {
                self.current_mouse = Some(position);
                let mut e = MouseEvent::new(position, button, click_count, self.mouse_velocity());
                self.dispatch_mouse(EventKind::PreMouseReleased, EventKind::MouseReleased, &mut e);
                // A release is also a click; the click walk re-checks
                // geometry so a pointer that wandered off fires on the
                // common prefix only.
                let mut e = MouseEvent::new(position, button, click_count, self.mouse_velocity());
                self.dispatch_clicked(&mut e);
                self.update_mouse_chain(Some(position));
            }
            InputEvent::MouseMoved { position } => {
                self.current_mouse = Some(position);
                let mut e = MouseEvent::new(
                    position,
                    MouseButton::None,
                    0,
                    self.mouse_velocity(),
                );
                self.update_mouse_chain(Some(position));
                self.dispatch_mouse(EventKind::PreMouseMoved, EventKind::MouseMoved, &mut e);
            }
            InputEvent::MouseDragged { position } => {
                // Drags keep the chain captured at press time.
                self.current_mouse = Some(position);
                let mut e =
                    MouseEvent::new(position, self.pressed_button, 0, self.mouse_velocity());
                self.dispatch_mouse(EventKind::PreMouseDragged, EventKind::MouseDragged, &mut e);
            }
            InputEvent::Wheel { position, rotation } => {
                self.current_mouse = Some(position);
                let mut e = WheelEvent::new(position, rotation, self.mouse_velocity());
                self.update_mouse_chain(Some(position));
                self.dispatch_wheel(&mut e);
            }
            InputEvent::PointerLeft => {
                self.set_mouse_chain(Vec::new());
            }
            InputEvent::Resized(size) => {
                let root = self.root;
                self.set_position(root, 0, 0);
                self.set_size(root, size.x, size.y);
            }
        }
    }

    // ---- keyboard focus ----

    /// The deepest focused view, if any.
    pub fn focused_view(&self) -> Option<ViewId> {
        self.focus_chain.last().copied()
    }

    pub fn is_focused(&self, view: ViewId) -> bool {
        self.focused_view() == Some(view)
    }

    pub(crate) fn is_in_focus_chain(&self, view: ViewId) -> bool {
        self.focus_chain.contains(&view)
    }

    /// Move keyboard focus to `view` (or clear it with `None`). The old
    /// focused leaf is notified of the loss before the new one is notified
    /// of the gain; both notifications observe the already-updated chain.
    pub fn request_focus(&mut self, view: Option<ViewId>) {
        if let Some(v) = view {
            if self.is_focused(v) {
                return;
            }
        }
        let new_chain = match view {
            Some(v) => self.view_path(v),
            None => Vec::new(),
        };
        let old_chain = std::mem::replace(&mut self.focus_chain, new_chain);
        if let Some(&old_leaf) = old_chain.last() {
            self.fire_focus_change(old_leaf, false);
        }
        if let Some(v) = view {
            self.fire_focus_change(v, true);
        }
    }

    fn fire_focus_change(&mut self, view: ViewId, got: bool) {
        self.with_behavior_mut(view, |b, cx| {
            if got {
                b.got_keyboard_focus(cx, view);
            } else {
                b.lost_keyboard_focus(cx, view);
            }
        });
        let kind = if got {
            EventKind::GotKeyboardFocus
        } else {
            EventKind::LostKeyboardFocus
        };
        let mut arg = EventArg::None;
        self.fire_event(view, kind, &mut arg);
    }

    fn dispatch_key(&mut self, pre: EventKind, main: EventKind, input: KeyInput) {
        // No focus, no delivery.
        let chain = self.focus_chain.clone();
        let mut e = KeyEvent::new(input.code, input.ch, input.modifiers);
        for &v in &chain {
            self.fire_key_hook(v, pre, &mut e);
            if e.is_handled() {
                return;
            }
        }
        for &v in chain.iter().rev() {
            self.fire_key_hook(v, main, &mut e);
            if e.is_handled() {
                return;
            }
        }
    }

    fn fire_key_hook(&mut self, view: ViewId, kind: EventKind, e: &mut KeyEvent) {
        self.with_behavior_mut(view, |b, cx| match kind {
            EventKind::PreKeyPressed => b.pre_key_pressed(cx, view, e),
            EventKind::PreKeyReleased => b.pre_key_released(cx, view, e),
            EventKind::PreKeyTyped => b.pre_key_typed(cx, view, e),
            EventKind::KeyPressed => b.key_pressed(cx, view, e),
            EventKind::KeyReleased => b.key_released(cx, view, e),
            EventKind::KeyTyped => b.key_typed(cx, view, e),
            _ => {}
        });
        let mut arg = EventArg::Key(e);
        self.fire_event(view, kind, &mut arg);
    }

    // ---- mouse-over chain ----

    pub(crate) fn is_in_mouse_chain(&self, view: ViewId) -> bool {
        self.mouse_chain.contains(&view)
    }

    /// The current hover chain, root first.
    pub fn mouse_chain(&self) -> &[ViewId] {
        &self.mouse_chain
    }

    /// Recompute the hover chain for a pointer position (root-view
    /// coordinates), or for the last known position when `None`. The root
    /// is always a member while the pointer is inside the window.
    pub(crate) fn update_mouse_chain(&mut self, position: Option<Vec2>) {
        let p = match position {
            Some(p) => {
                self.last_mouse_root = p;
                p
            }
            None => self.last_mouse_root,
        };
        let mut chain = vec![self.root];
        let root = self.root;
        chain.extend(self.hit_chain(root, p));
        let deepest = *chain.last().unwrap();
        self.set_mouse_chain(chain);
        if self.debug_mode && self.debug_target != Some(deepest) {
            self.debug_target = Some(deepest);
            self.invalid = true;
        }
    }

    /// Diff the chains and notify: exits for views leaving the chain first,
    /// then entries for views joining it.
    fn set_mouse_chain(&mut self, new_chain: Vec<ViewId>) {
        let old_chain = self.mouse_chain.clone();
        for &old in &old_chain {
            if !new_chain.contains(&old) {
                self.fire_hover_change(old, false);
            }
        }
        for &new in &new_chain {
            if !old_chain.contains(&new) {
                self.fire_hover_change(new, true);
            }
        }
        self.mouse_chain = new_chain;
    }

    fn fire_hover_change(&mut self, view: ViewId, entered: bool) {
        self.with_behavior_mut(view, |b, cx| {
            if entered {
                b.mouse_entered(cx, view);
            } else {
                b.mouse_exited(cx, view);
            }
        });
        let kind = if entered {
            EventKind::MouseEntered
        } else {
            EventKind::MouseExited
        };
        let mut arg = EventArg::None;
        self.fire_event(view, kind, &mut arg);
    }

    fn dispatch_mouse(&mut self, pre: EventKind, main: EventKind, e: &mut MouseEvent) {
        let chain = self.mouse_chain.clone();
        for &v in &chain {
            self.fire_mouse_hook(v, pre, e);
            if e.is_handled() {
                return;
            }
        }
        for &v in chain.iter().rev() {
            self.fire_mouse_hook(v, main, e);
            if e.is_handled() {
                return;
            }
        }
    }

    /// The click walk differs from the other mouse events: the capture
    /// phase re-tests geometry on the way down and stops at the first chain
    /// member the pointer is no longer inside; the bubble phase then covers
    /// only the verified prefix.
    fn dispatch_clicked(&mut self, e: &mut MouseEvent) {
        let chain = self.mouse_chain.clone();
        let mut p = e.position;
        let mut depth = 0;
        while depth < chain.len() {
            let v = chain[depth];
            p = self.point_from_parent(v, p);
            if !self.is_inside(v, p) {
                break;
            }
            self.fire_mouse_hook(v, EventKind::PreMouseClicked, e);
            if e.is_handled() {
                return;
            }
            depth += 1;
        }
        for i in (0..depth).rev() {
            self.fire_mouse_hook(chain[i], EventKind::MouseClicked, e);
            if e.is_handled() {
                return;
            }
        }
    }

    fn dispatch_wheel(&mut self, e: &mut WheelEvent) {
        let chain = self.mouse_chain.clone();
        for &v in &chain {
            self.fire_wheel_hook(v, EventKind::PreMouseWheel, e);
            if e.is_handled() {
                return;
            }
        }
        for &v in chain.iter().rev() {
            self.fire_wheel_hook(v, EventKind::MouseWheel, e);
            if e.is_handled() {
                return;
            }
        }
    }

    fn fire_mouse_hook(&mut self, view: ViewId, kind: EventKind, e: &mut MouseEvent) {
        self.with_behavior_mut(view, |b, cx| match kind {
            EventKind::PreMousePressed => b.pre_mouse_pressed(cx, view, e),
            EventKind::PreMouseReleased => b.pre_mouse_released(cx, view, e),
            EventKind::PreMouseClicked => b.pre_mouse_clicked(cx, view, e),
            EventKind::PreMouseMoved => b.pre_mouse_moved(cx, view, e),
            EventKind::PreMouseDragged => b.pre_mouse_dragged(cx, view, e),
            EventKind::MousePressed => b.mouse_pressed(cx, view, e),
            EventKind::MouseReleased => b.mouse_released(cx, view, e),
            EventKind::MouseClicked => b.mouse_clicked(cx, view, e),
            EventKind::MouseMoved => b.mouse_moved(cx, view, e),
            EventKind::MouseDragged => b.mouse_dragged(cx, view, e),
            _ => {}
        });
        let mut arg = EventArg::Mouse(e);
        self.fire_event(view, kind, &mut arg);
    }

    fn fire_wheel_hook(&mut self, view: ViewId, kind: EventKind, e: &mut WheelEvent) {
        self.with_behavior_mut(view, |b, cx| match kind {
            EventKind::PreMouseWheel => b.pre_mouse_wheel(cx, view, e),
            EventKind::MouseWheel => b.mouse_wheel(cx, view, e),
            _ => {}
        });
        let mut arg = EventArg::Wheel(e);
        self.fire_event(view, kind, &mut arg);
    }

    // ---- pointer velocity ----

    /// The most recent velocity sample in root-view pixels per second.
    /// Zero until a full sample window has elapsed.
    pub fn mouse_velocity(&self) -> Vec2 {
        self.cached_velocity.unwrap_or(Vec2::ZERO)
    }

    /// Accumulate pointer motion; once at least [`VELOCITY_SAMPLE_MS`] has
    /// elapsed, publish a new velocity sample and restart the window.
    /// Called by the runtime on every frame tick.
    pub fn sample_mouse_velocity(&mut self, dt_ms: u64) {
        self.mouse_timer_ms += dt_ms;
        if self.mouse_timer_ms >= VELOCITY_SAMPLE_MS {
            if let (Some(last), Some(current)) = (self.last_mouse, self.current_mouse) {
                let scale = 1000.0 / self.mouse_timer_ms as f64;
                self.cached_velocity = Some(Vec2::new(
                    ((current.x - last.x) as f64 * scale).round() as i32,
                    ((current.y - last.y) as f64 * scale).round() as i32,
                ));
            }
            self.last_mouse = self.current_mouse;
            self.mouse_timer_ms = 0;
        }
    }

    // ---- debug overlay ----

    pub fn is_debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Toggle the diagnostics overlay: a frame around the view under the
    /// pointer plus live fps / allocation / pool counters.
    pub fn set_debug_mode(&mut self, enable: bool) {
        self.debug_mode = enable;
        self.invalid = true;
    }

    pub fn debug_target(&self) -> Option<ViewId> {
        if self.debug_mode {
            self.debug_target
        } else {
            None
        }
    }

    pub fn set_debug_target(&mut self, view: ViewId) {
        if self.debug_mode && self.has_context(view) {
            self.debug_target = Some(view);
            self.invalid = true;
        }
    }

    pub(crate) fn set_overlay_fps(&mut self, fps: u32) {
        self.overlay_fps = fps;
    }

    fn paint_debug_overlay(&mut self, g: &mut dyn Canvas) {
        const LINE_HEIGHT: i32 = 12;
        if let Some(target) = self.debug_target.filter(|&t| self.has_context(t)) {
            let pos = self.position_in_root(target);
            let size = self.size(target);
            g.stroke_rect(
                Rect::new(pos.x, pos.y, size.x - 1, size.y - 1),
                Color::MAGENTA,
            );
            let label = format!(
                "{}({},{},{},{})",
                self.behavior_name(target),
                self.left(target),
                self.top(target),
                size.x,
                size.y
            );
            let width = g.text_width(&label);
            g.fill_rect(
                Rect::new(pos.x, pos.y, width + 2, LINE_HEIGHT),
                Color::MAGENTA,
            );
            g.fill_text(
                &label,
                Vec2::new(pos.x + 1, pos.y + LINE_HEIGHT - 2),
                Color::WHITE,
            );
        }

        let label = format!(
            "fps = {}, view_alloc = {}, active_buf = {:.1} MB, cached_buf = {:.1} MB",
            self.overlay_fps,
            self.alloc_count,
            self.pool.active_bytes() as f64 / 1024.0 / 1024.0,
            self.pool.cached_bytes() as f64 / 1024.0 / 1024.0,
        );
        let width = g.text_width(&label);
        let root_size = self.size(self.root);
        g.fill_rect(
            Rect::new(
                root_size.x - width - 1,
                root_size.y - LINE_HEIGHT - 1,
                width + 1,
                LINE_HEIGHT + 1,
            ),
            Color::ORANGE,
        );
        g.fill_text(
            &label,
            Vec2::new(root_size.x - width, root_size.y - 3),
            Color::BLACK,
        );
    }
}
