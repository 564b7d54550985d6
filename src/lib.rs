//! Retained-mode view compositor.
//!
//! A [`ViewContext`](context::ViewContext) owns a tree of views bound to one
//! host window. Views cache their rendered content in pooled offscreen
//! surfaces, so a frame composites cached buffers and only re-rasterizes
//! what actually changed. Input arrives from the host, is resolved against
//! the tree by hit testing, and is dispatched in two phases (capture, then
//! bubble) along the hover or focus chain. A [`Runtime`](runtime::Runtime)
//! services any number of contexts from a single frame loop paced by the
//! [`Driver`](driver::Driver) clock thread, and drives
//! [`Animation`](animation::Animation)s from the same clock.
//!
//! The crate has no windowing dependency: backends implement the traits in
//! [`canvas`], and [`headless`] provides a complete in-memory backend.
//!
//! ```no_run
//! use vitrea::prelude::*;
//!
//! let runtime = Runtime::new();
//! let cx = runtime.new_context(Box::new(HeadlessHost::new(800, 600)));
//! {
//!     let mut cx = cx.borrow_mut();
//!     let root = cx.root_view();
//!     let panel = cx.new_view();
//!     cx.add_child(root, panel);
//!     cx.set_frame(panel, Rect::new(20, 20, 200, 120));
//!     cx.set_background(panel, Some(Color::rgb(0.2, 0.4, 0.9)));
//! }
//! runtime.run();
//! ```

pub mod animation;
pub mod canvas;
pub mod color;
pub mod context;
pub mod driver;
pub mod error;
pub mod event;
pub mod geometry;
pub mod headless;
pub mod layout;
pub mod pool;
pub mod runtime;
pub mod view;

pub mod prelude {
    pub use crate::animation::{Animation, Curve};
    pub use crate::canvas::{Canvas, HostWindow, InputEvent, KeyInput, PaintSurface};
    pub use crate::color::Color;
    pub use crate::context::ViewContext;
    pub use crate::error::Error;
    pub use crate::event::{
        EventArg, EventKind, KeyEvent, Modifiers, MouseButton, MouseEvent, WheelEvent,
    };
    pub use crate::geometry::{Insets, Range, Rect, Vec2};
    pub use crate::headless::HeadlessHost;
    pub use crate::runtime::Runtime;
    pub use crate::view::{PaintMode, ViewBehavior, ViewId};
}
