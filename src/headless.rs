//! In-memory host backend.
//!
//! [`HeadlessHost`] implements the host traits without a windowing system:
//! surfaces are plain structs, frames render into a [`RecordingCanvas`] that
//! logs draw commands, and input is injected through a queue. Surface
//! failures can be scripted ([`HeadlessHost::script_validation`],
//! [`HeadlessHost::lose_contents`]) to exercise the buffered-repaint
//! recovery paths. Tests drive everything through this module; it is also a
//! reference for writing a real backend.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use kurbo::Affine;

use crate::canvas::{Canvas, HostWindow, InputEvent, PaintSurface, SurfaceStatus};
use crate::color::Color;
use crate::geometry::{Rect, Vec2};

/// One recorded draw command, in root (global) coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    Clear(Color),
    FillRect {
        rect: Rect,
        color: Color,
        alpha: f32,
    },
    StrokeRect {
        rect: Rect,
        color: Color,
    },
    Surface {
        at: Vec2,
        width: i32,
        height: i32,
        alpha: f32,
    },
    Text {
        text: String,
        origin: Vec2,
        color: Color,
    },
}

/// A [`Canvas`] that records every draw command it receives.
pub struct RecordingCanvas {
    offset: Vec2,
    transform: Affine,
    clip_stack: Vec<Rect>,
    alpha: f32,
    ops: Vec<DrawOp>,
    sink: Option<Rc<RefCell<HostShared>>>,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self {
            offset: Vec2::ZERO,
            transform: Affine::IDENTITY,
            clip_stack: Vec::new(),
            alpha: 1.0,
            ops: Vec::new(),
            sink: None,
        }
    }

    /// Commands recorded so far.
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }

    fn to_global(&self, rect: Rect) -> Rect {
        Rect::new(
            rect.left + self.offset.x,
            rect.top + self.offset.y,
            rect.width,
            rect.height,
        )
    }
}

impl Default for RecordingCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas for RecordingCanvas {
    fn translate(&mut self, dx: i32, dy: i32) {
        self.offset.x += dx;
        self.offset.y += dy;
    }

    fn transform(&mut self, affine: Affine) {
        self.transform = self.transform * affine;
    }

    fn push_clip(&mut self, rect: Rect) {
        self.clip_stack.push(self.to_global(rect));
    }

    fn pop_clip(&mut self) {
        assert!(self.clip_stack.pop().is_some(), "unbalanced clip pop");
    }

    fn clip_bounds(&self) -> Option<Rect> {
        let mut iter = self.clip_stack.iter();
        let mut bounds = *iter.next()?;
        for clip in iter {
            bounds = bounds.intersect(*clip);
        }
        Some(Rect::new(
            bounds.left - self.offset.x,
            bounds.top - self.offset.y,
            bounds.width,
            bounds.height,
        ))
    }

    fn alpha(&self) -> f32 {
        self.alpha
    }

    fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha;
    }

    fn clear(&mut self, color: Color) {
        self.ops.push(DrawOp::Clear(color));
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.ops.push(DrawOp::FillRect {
            rect: self.to_global(rect),
            color,
            alpha: self.alpha,
        });
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color) {
        self.ops.push(DrawOp::StrokeRect {
            rect: self.to_global(rect),
            color,
        });
    }

    fn draw_surface(&mut self, surface: &dyn PaintSurface, width: i32, height: i32) {
        self.ops.push(DrawOp::Surface {
            at: self.offset,
            width: width.min(surface.width()),
            height: height.min(surface.height()),
            alpha: self.alpha,
        });
    }

    fn fill_text(&mut self, text: &str, origin: Vec2, color: Color) {
        self.ops.push(DrawOp::Text {
            text: text.to_owned(),
            origin: origin + self.offset,
            color,
        });
    }
}

impl Drop for RecordingCanvas {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.borrow_mut().last_frame = std::mem::take(&mut self.ops);
        }
    }
}

struct HostShared {
    surfaces_created: usize,
    frames_rendered: usize,
    repaint_requests: usize,
    focus_requests: usize,
    scripted_validations: VecDeque<SurfaceStatus>,
    scripted_losses: u32,
    last_frame: Vec<DrawOp>,
}

/// A windowless [`HostWindow`] for tests and offscreen rendering.
pub struct HeadlessHost {
    size: Vec2,
    events: Vec<InputEvent>,
    shared: Rc<RefCell<HostShared>>,
}

impl HeadlessHost {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            size: Vec2::new(width, height),
            events: Vec::new(),
            shared: Rc::new(RefCell::new(HostShared {
                surfaces_created: 0,
                frames_rendered: 0,
                repaint_requests: 0,
                focus_requests: 0,
                scripted_validations: VecDeque::new(),
                scripted_losses: 0,
                last_frame: Vec::new(),
            })),
        }
    }

    /// Queue an input event for the next [`HostWindow::take_events`] drain.
    pub fn push_event(&mut self, event: InputEvent) {
        self.events.push(event);
    }

    /// Change the reported window size. Does not emit a resize event.
    pub fn set_size(&mut self, width: i32, height: i32) {
        self.size = Vec2::new(width, height);
    }

    /// Total surfaces allocated through [`HostWindow::create_surface`].
    pub fn surfaces_created(&self) -> usize {
        self.shared.borrow().surfaces_created
    }

    /// Completed `begin_frame`/`end_frame` pairs.
    pub fn frames_rendered(&self) -> usize {
        self.shared.borrow().frames_rendered
    }

    pub fn repaint_requests(&self) -> usize {
        self.shared.borrow().repaint_requests
    }

    pub fn focus_requests(&self) -> usize {
        self.shared.borrow().focus_requests
    }

    /// Draw commands of the most recently completed frame.
    pub fn last_frame_ops(&self) -> Vec<DrawOp> {
        self.shared.borrow().last_frame.clone()
    }

    /// Script the result of the next surface validation (applies to
    /// whichever surface validates next; repeated calls queue up).
    pub fn script_validation(&self, status: SurfaceStatus) {
        self.shared
            .borrow_mut()
            .scripted_validations
            .push_back(status);
    }

    /// Make the next `times` contents-lost checks report a loss.
    pub fn lose_contents(&self, times: u32) {
        self.shared.borrow_mut().scripted_losses += times;
    }
}

impl HostWindow for HeadlessHost {
    fn size(&self) -> Vec2 {
        self.size
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn create_surface(&mut self, width: i32, height: i32) -> Box<dyn PaintSurface> {
        self.shared.borrow_mut().surfaces_created += 1;
        Box::new(HeadlessSurface {
            width: width.max(1),
            height: height.max(1),
            canvas: RecordingCanvas::new(),
            shared: self.shared.clone(),
        })
    }

    fn request_repaint(&mut self) {
        self.shared.borrow_mut().repaint_requests += 1;
    }

    fn acquire_focus(&mut self) {
        self.shared.borrow_mut().focus_requests += 1;
    }

    fn take_events(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.events)
    }

    fn begin_frame(&mut self) -> Option<Box<dyn Canvas>> {
        let mut canvas = RecordingCanvas::new();
        canvas.sink = Some(self.shared.clone());
        Some(Box::new(canvas))
    }

    fn end_frame(&mut self, canvas: Box<dyn Canvas>) {
        drop(canvas); // flushes recorded ops into shared state
        self.shared.borrow_mut().frames_rendered += 1;
    }
}

struct HeadlessSurface {
    width: i32,
    height: i32,
    canvas: RecordingCanvas,
    shared: Rc<RefCell<HostShared>>,
}

impl PaintSurface for HeadlessSurface {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn validate(&mut self) -> SurfaceStatus {
        self.shared
            .borrow_mut()
            .scripted_validations
            .pop_front()
            .unwrap_or(SurfaceStatus::Ok)
    }

    fn contents_lost(&mut self) -> bool {
        let mut shared = self.shared.borrow_mut();
        if shared.scripted_losses > 0 {
            shared.scripted_losses -= 1;
            true
        } else {
            false
        }
    }

    fn canvas(&mut self) -> &mut dyn Canvas {
        &mut self.canvas
    }
}
