//! Host capability traits.
//!
//! The compositor core never talks to a real windowing system. It paints
//! through a [`Canvas`] (translate/transform/clip stack, alpha compositing,
//! fills, text runs, surface compositing), caches content in
//! [`PaintSurface`]s handed out by the host, and receives raw input through a
//! [`HostWindow`] binding. Backends implement these traits;
//! [`crate::headless`] ships a recording implementation for tests.

use kurbo::Affine;

use crate::color::Color;
use crate::event::{Modifiers, MouseButton};
use crate::geometry::{Rect, Vec2};

/// A 2D drawing target.
///
/// All drawing is subject to the current translation, transform, clip and
/// alpha. Transform state is undone by applying inverses (the repaint walk
/// applies each view's inverse on exit), clip state by matching
/// `push_clip`/`pop_clip` pairs.
pub trait Canvas {
    /// Shift the coordinate origin.
    fn translate(&mut self, dx: i32, dy: i32);

    /// Concatenate an affine transform onto the current one.
    fn transform(&mut self, affine: Affine);

    /// Intersect the clip with a rectangle in current local coordinates.
    fn push_clip(&mut self, rect: Rect);

    /// Undo the most recent [`Canvas::push_clip`].
    fn pop_clip(&mut self);

    /// The current clip in local coordinates, if any clip is active.
    fn clip_bounds(&self) -> Option<Rect>;

    /// The current global alpha multiplier.
    fn alpha(&self) -> f32;

    /// Replace the global alpha multiplier.
    fn set_alpha(&mut self, alpha: f32);

    /// Replace all pixels with `color` (source composite, ignoring alpha).
    /// Used to reset an offscreen buffer before re-rendering it.
    fn clear(&mut self, color: Color);

    /// Fill a rectangle with the current alpha applied.
    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Outline a rectangle. Used by the debug overlay.
    fn stroke_rect(&mut self, rect: Rect, color: Color);

    /// Composite the top-left `width x height` region of a surface at the
    /// local origin.
    fn draw_surface(&mut self, surface: &dyn PaintSurface, width: i32, height: i32);

    /// Draw a text run with its baseline-left corner at `origin`.
    fn fill_text(&mut self, text: &str, origin: Vec2, color: Color);

    /// Approximate advance width of a text run, for overlay layout.
    fn text_width(&self, text: &str) -> i32 {
        text.chars().count() as i32 * 7
    }
}

/// Result of revalidating an offscreen surface against the host.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SurfaceStatus {
    /// Contents intact, ready to composite.
    Ok,
    /// The surface was restored; contents are undefined and must be
    /// re-rendered.
    Restored,
    /// The surface no longer matches the host configuration and must be
    /// recreated.
    Incompatible,
}

/// An offscreen render surface owned by the compositor (usually checked out
/// of the [`crate::pool::BufferPool`]).
///
/// Dropping a surface releases its host resources.
pub trait PaintSurface {
    fn width(&self) -> i32;
    fn height(&self) -> i32;

    /// Bytes of host memory this surface accounts for.
    fn byte_size(&self) -> u64 {
        self.width().max(0) as u64 * self.height().max(0) as u64 * 4
    }

    /// Revalidate against the host before drawing into or out of the
    /// surface.
    fn validate(&mut self) -> SurfaceStatus;

    /// True when the host invalidated the contents since the last draw; the
    /// caller must loop and re-render until stable.
    fn contents_lost(&mut self) -> bool;

    /// A canvas drawing into this surface.
    fn canvas(&mut self) -> &mut dyn Canvas;
}

/// Raw key data from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyInput {
    pub code: u32,
    pub ch: Option<char>,
    pub modifiers: Modifiers,
}

/// A raw input event delivered by the host window, in host (root-view)
/// coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    KeyPressed(KeyInput),
    KeyReleased(KeyInput),
    KeyTyped(KeyInput),
    MousePressed {
        position: Vec2,
        button: MouseButton,
        click_count: u32,
    },
    MouseReleased {
        position: Vec2,
        button: MouseButton,
        click_count: u32,
    },
    MouseMoved {
        position: Vec2,
    },
    MouseDragged {
        position: Vec2,
    },
    Wheel {
        position: Vec2,
        rotation: i32,
    },
    /// The pointer left the host window entirely.
    PointerLeft,
    Resized(Vec2),
}

/// The host window a [`crate::context::ViewContext`] is bound to.
pub trait HostWindow {
    /// Current window size in pixels.
    fn size(&self) -> Vec2;

    /// Downcast access to the concrete backend.
    fn as_any(&self) -> &dyn std::any::Any;

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;

    /// Allocate an offscreen surface compatible with this window.
    fn create_surface(&mut self, width: i32, height: i32) -> Box<dyn PaintSurface>;

    /// Ask the host to schedule a paint of the window.
    fn request_repaint(&mut self);

    /// Ask the host for keyboard focus (called on mouse press).
    fn acquire_focus(&mut self);

    /// Drain input events received since the last call.
    fn take_events(&mut self) -> Vec<InputEvent>;

    /// Begin painting a frame; `None` when the host cannot paint right now.
    fn begin_frame(&mut self) -> Option<Box<dyn Canvas>>;

    /// Finish the frame begun by [`HostWindow::begin_frame`].
    fn end_frame(&mut self, canvas: Box<dyn Canvas>);
}
