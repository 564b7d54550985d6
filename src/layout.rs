//! Manual layout helpers.
//!
//! There is no constraint solver; layout code runs imperatively inside
//! [`ViewBehavior::layout_view`](crate::view::ViewBehavior::layout_view) (or
//! anywhere else) and positions views directly. These helpers cover the
//! common anchor arithmetic: `put_*` moves a view, `scale_*` moves an edge
//! while keeping the opposite edge fixed. Edge distances (`right`, `bottom`)
//! are measured to the parent's matching edge, so every function taking one
//! panics when the view has no parent.

use crate::context::ViewContext;
use crate::geometry::Insets;
use crate::view::ViewId;

pub fn put_with_left(cx: &mut ViewContext, view: ViewId, left: i32) {
    cx.set_left(view, left);
}

pub fn put_with_top(cx: &mut ViewContext, view: ViewId, top: i32) {
    cx.set_top(view, top);
}

/// Place the view `right` pixels from the parent's right edge.
pub fn put_with_right(cx: &mut ViewContext, view: ViewId, right: i32) {
    let parent = parent_of(cx, view);
    cx.set_left(view, cx.width(parent) - right - cx.width(view));
}

/// Place the view `bottom` pixels from the parent's bottom edge.
pub fn put_with_bottom(cx: &mut ViewContext, view: ViewId, bottom: i32) {
    let parent = parent_of(cx, view);
    cx.set_top(view, cx.height(parent) - bottom - cx.height(view));
}

/// Center the view horizontally on the parent-space x coordinate `hc`.
pub fn put_with_horizontal_center(cx: &mut ViewContext, view: ViewId, hc: i32) {
    cx.set_left(view, hc - cx.width(view) / 2);
}

/// Center the view vertically on the parent-space y coordinate `vc`.
pub fn put_with_vertical_center(cx: &mut ViewContext, view: ViewId, vc: i32) {
    cx.set_top(view, vc - cx.height(view) / 2);
}

/// Place the view to the left of a sibling with `margin` between them.
pub fn put_at_left_side_of(cx: &mut ViewContext, view: ViewId, sibling: ViewId, margin: i32) {
    cx.set_left(view, cx.left(sibling) - margin - cx.width(view));
}

/// Place the view to the right of a sibling with `margin` between them.
pub fn put_at_right_side_of(cx: &mut ViewContext, view: ViewId, sibling: ViewId, margin: i32) {
    cx.set_left(view, cx.left(sibling) + cx.width(sibling) + margin);
}

/// Place the view above a sibling with `margin` between them.
pub fn put_at_top_side_of(cx: &mut ViewContext, view: ViewId, sibling: ViewId, margin: i32) {
    cx.set_top(view, cx.top(sibling) - margin - cx.height(view));
}

/// Place the view below a sibling with `margin` between them.
pub fn put_at_bottom_side_of(cx: &mut ViewContext, view: ViewId, sibling: ViewId, margin: i32) {
    cx.set_top(view, cx.top(sibling) + cx.height(sibling) + margin);
}

/// Center the view on a sibling's center.
pub fn put_at_center_of(cx: &mut ViewContext, view: ViewId, sibling: ViewId) {
    put_with_horizontal_center(cx, view, cx.left(sibling) + cx.width(sibling) / 2);
    put_with_vertical_center(cx, view, cx.top(sibling) + cx.height(sibling) / 2);
}

/// Center the view inside its parent.
pub fn put_at_center_of_parent(cx: &mut ViewContext, view: ViewId) {
    let parent = parent_of(cx, view);
    put_with_horizontal_center(cx, view, cx.width(parent) / 2);
    put_with_vertical_center(cx, view, cx.height(parent) / 2);
}

/// Move the left edge to `left`, keeping the right edge fixed.
pub fn scale_with_left(cx: &mut ViewContext, view: ViewId, left: i32) {
    let delta = cx.left(view) - left;
    cx.set_left(view, left);
    let width = cx.width(view);
    cx.set_width(view, width + delta);
}

/// Move the right edge to `right` pixels from the parent's right edge,
/// keeping the left edge fixed.
pub fn scale_with_right(cx: &mut ViewContext, view: ViewId, right: i32) {
    let parent = parent_of(cx, view);
    cx.set_width(view, cx.width(parent) - right - cx.left(view));
}

/// Move the top edge to `top`, keeping the bottom edge fixed.
pub fn scale_with_top(cx: &mut ViewContext, view: ViewId, top: i32) {
    let delta = cx.top(view) - top;
    cx.set_top(view, top);
    let height = cx.height(view);
    cx.set_height(view, height + delta);
}

/// Move the bottom edge to `bottom` pixels from the parent's bottom edge,
/// keeping the top edge fixed.
pub fn scale_with_bottom(cx: &mut ViewContext, view: ViewId, bottom: i32) {
    let parent = parent_of(cx, view);
    cx.set_height(view, cx.height(parent) - bottom - cx.top(view));
}

/// Pin both horizontal edges.
pub fn scale_with_left_and_right(cx: &mut ViewContext, view: ViewId, left: i32, right: i32) {
    cx.set_left(view, left);
    scale_with_right(cx, view, right);
}

/// Pin both vertical edges.
pub fn scale_with_top_and_bottom(cx: &mut ViewContext, view: ViewId, top: i32, bottom: i32) {
    cx.set_top(view, top);
    scale_with_bottom(cx, view, bottom);
}

/// Fill the parent leaving a uniform margin on all sides.
pub fn scale_with_margin_to_parent(cx: &mut ViewContext, view: ViewId, margin: i32) {
    scale_with_insets_to_parent(cx, view, Insets::uniform(margin));
}

/// Fill the parent leaving the given insets.
pub fn scale_with_insets_to_parent(cx: &mut ViewContext, view: ViewId, insets: Insets) {
    cx.set_position(view, insets.left, insets.top);
    scale_with_right(cx, view, insets.right);
    scale_with_bottom(cx, view, insets.bottom);
}

fn parent_of(cx: &ViewContext, view: ViewId) -> ViewId {
    cx.parent(view).expect("the view does not have a parent")
}
