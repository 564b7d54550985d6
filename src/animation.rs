//! Fixed-duration animations driven by the frame clock.
//!
//! An [`Animation`] is a cheap clonable handle around shared state. Build
//! one with the chained `with_*`/`on_*` methods, then start it through
//! [`Runtime::commit_animation`](crate::runtime::Runtime::commit_animation).
//! Each frame tick advances the timer and calls the animate callback with
//! eased progress in `0.0..=1.0`; progress 1.0 is always delivered exactly
//! once before completion.
//!
//! A mutex tag makes animations mutually exclusive: committing an animation
//! cancels any running animation carrying an equal tag. Cancellation reports
//! completion with `canceled = true`, deferred to the start of the next
//! frame; natural completion reports synchronously from the final tick.

use std::cell::RefCell;
use std::rc::Rc;

/// Easing applied to linear progress before it reaches the animate
/// callback.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Curve {
    #[default]
    Linear,
    /// Accelerate from rest.
    EaseIn,
    /// Decelerate into the end position.
    EaseOut,
    /// Accelerate, then decelerate.
    EaseInEaseOut,
}

impl Curve {
    pub fn apply(self, t: f32) -> f32 {
        match self {
            Curve::Linear => t,
            Curve::EaseIn => t * t,
            Curve::EaseOut => t * (2.0 - t),
            Curve::EaseInEaseOut => {
                if t <= 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - 2.0 * (t - 1.0) * (t - 1.0)
                }
            }
        }
    }
}

pub(crate) struct AnimationInner {
    duration: f32,
    curve: Curve,
    mutex: Option<String>,
    timer: f32,
    playing: bool,
    animate: Option<Box<dyn FnMut(f32)>>,
    completed: Option<Box<dyn FnMut(bool)>>,
}

/// Handle to one animation. Clones share the same underlying state.
#[derive(Clone)]
pub struct Animation {
    inner: Rc<RefCell<AnimationInner>>,
}

impl Animation {
    /// An animation lasting `duration` seconds with a linear curve and no
    /// callbacks.
    pub fn new(duration: f32) -> Self {
        Self {
            inner: Rc::new(RefCell::new(AnimationInner {
                duration,
                curve: Curve::Linear,
                mutex: None,
                timer: 0.0,
                playing: false,
                animate: None,
                completed: None,
            })),
        }
    }

    pub fn with_curve(self, curve: Curve) -> Self {
        self.inner.borrow_mut().curve = curve;
        self
    }

    /// Tag this animation for mutual exclusion. Committing it cancels any
    /// running animation with an equal tag.
    pub fn with_mutex(self, tag: impl Into<String>) -> Self {
        self.inner.borrow_mut().mutex = Some(tag.into());
        self
    }

    /// Set the per-tick callback receiving eased progress.
    pub fn on_animate(self, f: impl FnMut(f32) + 'static) -> Self {
        self.inner.borrow_mut().animate = Some(Box::new(f));
        self
    }

    /// Set the completion callback; the flag is true when the animation was
    /// canceled instead of running to the end.
    pub fn on_complete(self, f: impl FnMut(bool) + 'static) -> Self {
        self.inner.borrow_mut().completed = Some(Box::new(f));
        self
    }

    pub fn is_playing(&self) -> bool {
        self.inner.borrow().playing
    }

    pub fn duration(&self) -> f32 {
        self.inner.borrow().duration
    }

    pub fn curve(&self) -> Curve {
        self.inner.borrow().curve
    }

    pub fn set_curve(&self, curve: Curve) {
        self.inner.borrow_mut().curve = curve;
    }

    pub fn mutex_tag(&self) -> Option<String> {
        self.inner.borrow().mutex.clone()
    }

    /// Uneased progress in `0.0..=1.0`.
    pub fn linear_progress(&self) -> f32 {
        let inner = self.inner.borrow();
        if inner.duration <= 0.0 {
            1.0
        } else {
            (inner.timer / inner.duration).min(1.0)
        }
    }

    pub(crate) fn same_handle(&self, other: &Animation) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn shares_mutex(&self, other: &Animation) -> bool {
        match (&self.inner.borrow().mutex, &other.inner.borrow().mutex) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Reset and start: progress 0 is delivered immediately from here.
    pub(crate) fn begin(&self) {
        let zero = {
            let mut inner = self.inner.borrow_mut();
            inner.timer = 0.0;
            inner.playing = true;
            inner.curve.apply(0.0)
        };
        self.run_animate(zero);
    }

    /// Flip to not-playing if currently playing. The caller owns the
    /// completion notification.
    pub(crate) fn mark_canceled(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.playing {
            inner.playing = false;
            true
        } else {
            false
        }
    }

    /// Advance by `dt` seconds. Returns true when the animation finished on
    /// this tick (the completion callback has already run).
    pub(crate) fn update(&self, dt: f32) -> bool {
        let (progress, finished) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.playing {
                return true;
            }
            inner.timer += dt;
            if inner.timer < inner.duration {
                (inner.curve.apply(inner.timer / inner.duration), false)
            } else {
                inner.playing = false;
                (inner.curve.apply(1.0), true)
            }
        };
        self.run_animate(progress);
        if finished {
            self.run_completed(false);
        }
        finished
    }

    /// Call the animate callback with no borrow held, so the callback may
    /// cancel or reconfigure the animation.
    fn run_animate(&self, progress: f32) {
        let f = self.inner.borrow_mut().animate.take();
        if let Some(mut f) = f {
            f(progress);
            let mut inner = self.inner.borrow_mut();
            if inner.animate.is_none() {
                inner.animate = Some(f);
            }
        }
    }

    pub(crate) fn run_completed(&self, canceled: bool) {
        let f = self.inner.borrow_mut().completed.take();
        if let Some(mut f) = f {
            f(canceled);
            let mut inner = self.inner.borrow_mut();
            if inner.completed.is_none() {
                inner.completed = Some(f);
            }
        }
    }
}
