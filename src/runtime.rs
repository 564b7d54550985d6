//! The single-threaded runtime tying contexts, animations, and the frame
//! clock together.
//!
//! [`Runtime`] is a clonable handle to shared state. All callback and tree
//! work happens on the thread that calls [`Runtime::frame`] (usually from
//! inside [`Runtime::run`], paced by the [`Driver`]); the clock thread never
//! touches views.
//!
//! Each frame runs in a fixed order: deferred tasks queued since the last
//! frame, then animation ticks, then per-context input, velocity sampling,
//! and repaint of dirty contexts. Canceled animations report completion
//! through the deferred queue, so a cancellation always settles before the
//! replacement animation's first timed tick.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::animation::Animation;
use crate::canvas::HostWindow;
use crate::context::ViewContext;
use crate::driver::Driver;
use crate::error::Error;
use crate::event::{EventKey, KeyRegistry};

type DeferredTask = Box<dyn FnOnce()>;

struct RuntimeInner {
    contexts: Vec<Weak<RefCell<ViewContext>>>,
    animations: Vec<Animation>,
    deferred: VecDeque<DeferredTask>,
    keys: KeyRegistry,
    fps: u32,
    max_fps: u32,
    quit: bool,
}

/// Clonable handle to the runtime. All clones share state.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RefCell<RuntimeInner>>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(RuntimeInner {
                contexts: Vec::new(),
                animations: Vec::new(),
                deferred: VecDeque::new(),
                keys: KeyRegistry::new(),
                fps: 0,
                max_fps: Driver::DEFAULT_MAX_FPS,
                quit: false,
            })),
        }
    }

    // ---- contexts ----

    /// Create a context bound to `host` and register it for frame service.
    pub fn new_context(&self, host: Box<dyn HostWindow>) -> Rc<RefCell<ViewContext>> {
        let cx = Rc::new(RefCell::new(ViewContext::new(host)));
        self.register_context(&cx);
        cx
    }

    /// Register an existing context. The runtime holds only a weak
    /// reference; dropping every strong handle unregisters implicitly.
    pub fn register_context(&self, cx: &Rc<RefCell<ViewContext>>) {
        let mut inner = self.inner.borrow_mut();
        let already = inner
            .contexts
            .iter()
            .any(|w| w.as_ptr() == Rc::as_ptr(cx));
        if !already {
            inner.contexts.push(Rc::downgrade(cx));
            log::info!("context registered ({} total)", inner.contexts.len());
        }
    }

    /// Unregister a context and release its host resources.
    pub fn unregister_context(&self, cx: &Rc<RefCell<ViewContext>>) {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let before = inner.contexts.len();
            inner.contexts.retain(|w| w.as_ptr() != Rc::as_ptr(cx));
            inner.contexts.len() != before
        };
        if removed {
            cx.borrow_mut().dispose();
            log::info!("context unregistered");
        }
    }

    /// Number of registered contexts still alive.
    pub fn context_count(&self) -> usize {
        self.inner
            .borrow()
            .contexts
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    // ---- animations ----

    /// Start an animation. Panics when it is already running.
    pub fn commit_animation(&self, animation: &Animation) {
        if let Err(e) = self.try_commit_animation(animation) {
            panic!("{e}");
        }
    }

    /// Start an animation: cancel the first running animation sharing its
    /// mutex tag, register it, and deliver progress 0 immediately.
    pub fn try_commit_animation(&self, animation: &Animation) -> Result<(), Error> {
        if animation.is_playing() {
            return Err(Error::AnimationRunning);
        }
        let peer = self
            .inner
            .borrow()
            .animations
            .iter()
            .find(|a| a.shares_mutex(animation))
            .cloned();
        if let Some(peer) = peer {
            self.cancel_animation(&peer);
        }
        self.inner.borrow_mut().animations.push(animation.clone());
        animation.begin();
        Ok(())
    }

    /// Cancel a running animation. Its completion callback fires with
    /// `canceled = true` at the start of the next frame. Canceling an
    /// animation that is not playing does nothing.
    pub fn cancel_animation(&self, animation: &Animation) {
        if !animation.mark_canceled() {
            return;
        }
        self.inner
            .borrow_mut()
            .animations
            .retain(|a| !a.same_handle(animation));
        let animation = animation.clone();
        self.defer(move || animation.run_completed(true));
    }

    /// Build an animation that waits `delay` seconds, then commits
    /// `target`. The delay carries the target's mutex tag, so committing it
    /// preempts peers for the whole delay-plus-animation span. The returned
    /// animation still has to be committed.
    pub fn delayed(&self, delay: f32, target: &Animation) -> Animation {
        let weak = Rc::downgrade(&self.inner);
        let target_handle = target.clone();
        let mut wrapper = Animation::new(delay).on_complete(move |canceled| {
            if !canceled {
                if let Some(inner) = weak.upgrade() {
                    let rt = Runtime { inner };
                    let _ = rt.try_commit_animation(&target_handle);
                }
            }
        });
        if let Some(tag) = target.mutex_tag() {
            wrapper = wrapper.with_mutex(tag);
        }
        wrapper
    }

    /// Number of animations currently registered.
    pub fn animation_count(&self) -> usize {
        self.inner.borrow().animations.len()
    }

    // ---- deferred tasks ----

    /// Queue a task to run at the start of the next frame, before animation
    /// ticks and painting.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.inner.borrow_mut().deferred.push_back(Box::new(task));
    }

    // ---- custom event keys ----

    /// Mint a custom event key. Panics on a duplicate name.
    pub fn register_event_key(&self, name: &str) -> EventKey {
        self.inner.borrow_mut().keys.register(name)
    }

    pub fn try_register_event_key(&self, name: &str) -> Result<EventKey, Error> {
        self.inner.borrow_mut().keys.try_register(name)
    }

    pub fn event_key(&self, name: &str) -> Option<EventKey> {
        self.inner.borrow().keys.lookup(name)
    }

    pub fn event_key_name(&self, key: EventKey) -> Option<String> {
        self.inner.borrow().keys.name(key).map(str::to_owned)
    }

    // ---- frame loop ----

    /// Measured frame rate of the most recent frame.
    pub fn fps(&self) -> u32 {
        self.inner.borrow().fps
    }

    pub fn max_fps(&self) -> u32 {
        self.inner.borrow().max_fps
    }

    /// Cap the frame rate. Takes effect on the next clock interval.
    pub fn set_max_fps(&self, max_fps: u32) {
        self.inner.borrow_mut().max_fps = max_fps.max(1);
    }

    /// Ask [`Runtime::run`] to return after the current frame.
    pub fn quit(&self) {
        self.inner.borrow_mut().quit = true;
    }

    /// Drive frames until [`Runtime::quit`] is called or the last context
    /// is dropped.
    pub fn run(&self) {
        let driver = Driver::start(self.max_fps());
        log::info!("runtime loop started");
        loop {
            driver.set_max_fps(self.max_fps());
            let tick = match driver.wait_tick() {
                Some(tick) => tick,
                None => break,
            };
            self.inner.borrow_mut().fps = driver.fps();
            self.frame(tick.dt_ms);
            driver.finish_tick();
            if self.inner.borrow().quit || self.context_count() == 0 {
                break;
            }
        }
        drop(driver);
        log::info!("runtime loop stopped");
    }

    /// Run one frame covering `dt_ms` of wall time.
    ///
    /// Order: deferred tasks queued before this frame, animation ticks,
    /// then per-context input, velocity sampling, and repaint of dirty
    /// contexts. Tasks deferred during the frame run next frame.
    pub fn frame(&self, dt_ms: u64) {
        let tasks = std::mem::take(&mut self.inner.borrow_mut().deferred);
        for task in tasks {
            task();
        }

        let dt = dt_ms as f32 / 1000.0;
        let animations: Vec<Animation> = self.inner.borrow().animations.clone();
        for animation in &animations {
            animation.update(dt);
        }
        self.inner
            .borrow_mut()
            .animations
            .retain(|a| a.is_playing());

        let contexts: Vec<Rc<RefCell<ViewContext>>> = self
            .inner
            .borrow()
            .contexts
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        let fps = self.inner.borrow().fps;
        for cx in &contexts {
            let mut cx = cx.borrow_mut();
            cx.sample_mouse_velocity(dt_ms);
            cx.pump_input();
            if cx.is_invalid() {
                cx.set_overlay_fps(fps);
                cx.render_frame();
            }
        }

        self.inner
            .borrow_mut()
            .contexts
            .retain(|w| w.strong_count() > 0);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
