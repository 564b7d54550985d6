//! Input dispatch tests: hover chain maintenance, two-phase delivery,
//! click pruning, and focus routing.

use std::cell::RefCell;
use std::rc::Rc;

use vitrea::event::EventHandler;
use vitrea::headless::HeadlessHost;
use vitrea::prelude::*;

type Log = Rc<RefCell<Vec<String>>>;

fn tracker(log: &Log, tag: &str) -> EventHandler {
    let log = log.clone();
    let tag = tag.to_owned();
    Rc::new(RefCell::new(
        move |_cx: &mut ViewContext, _view: ViewId, _arg: &mut EventArg<'_>| {
            log.borrow_mut().push(tag.clone());
        },
    ))
}

fn handling_tracker(log: &Log, tag: &str) -> EventHandler {
    let log = log.clone();
    let tag = tag.to_owned();
    Rc::new(RefCell::new(
        move |_cx: &mut ViewContext, _view: ViewId, arg: &mut EventArg<'_>| {
            log.borrow_mut().push(tag.clone());
            match arg {
                EventArg::Mouse(e) => e.handle(),
                EventArg::Key(e) => e.handle(),
                EventArg::Wheel(e) => e.handle(),
                _ => {}
            }
        },
    ))
}

fn new_context() -> ViewContext {
    ViewContext::new(Box::new(HeadlessHost::new(800, 600)))
}

/// root > a > b, with b nested inside a.
fn nested_tree(cx: &mut ViewContext) -> (ViewId, ViewId, ViewId) {
    let root = cx.root_view();
    let a = cx.new_view();
    let b = cx.new_view();
    cx.add_child(root, a);
    cx.add_child(a, b);
    cx.set_frame(a, Rect::new(100, 100, 200, 200));
    cx.set_frame(b, Rect::new(50, 50, 100, 100));
    (root, a, b)
}

fn press(cx: &mut ViewContext, x: i32, y: i32) {
    cx.dispatch_input(InputEvent::MousePressed {
        position: Vec2::new(x, y),
        button: MouseButton::Left,
        click_count: 1,
    });
}

fn release(cx: &mut ViewContext, x: i32, y: i32) {
    cx.dispatch_input(InputEvent::MouseReleased {
        position: Vec2::new(x, y),
        button: MouseButton::Left,
        click_count: 1,
    });
}

#[test]
fn test_capture_then_bubble_order() {
    let mut cx = new_context();
    let (root, a, b) = nested_tree(&mut cx);
    let log = Log::default();
    for (view, name) in [(root, "root"), (a, "a"), (b, "b")] {
        cx.add_event_handler(view, EventKind::PreMousePressed, tracker(&log, &format!("pre {name}")));
        cx.add_event_handler(view, EventKind::MousePressed, tracker(&log, name));
    }

    press(&mut cx, 180, 180); // inside b (root: 180, a: 80, b: 30)
    assert_eq!(
        *log.borrow(),
        vec!["pre root", "pre a", "pre b", "b", "a", "root"]
    );
}

#[test]
fn test_handled_event_stops_immediately() {
    let mut cx = new_context();
    let (root, a, b) = nested_tree(&mut cx);
    let log = Log::default();
    cx.add_event_handler(root, EventKind::PreMousePressed, tracker(&log, "pre root"));
    cx.add_event_handler(a, EventKind::PreMousePressed, handling_tracker(&log, "pre a"));
    cx.add_event_handler(b, EventKind::PreMousePressed, tracker(&log, "pre b"));
    for (view, name) in [(root, "root"), (a, "a"), (b, "b")] {
        cx.add_event_handler(view, EventKind::MousePressed, tracker(&log, name));
    }

    press(&mut cx, 180, 180);
    // The capture phase stops at `a`; the bubble phase never starts.
    assert_eq!(*log.borrow(), vec!["pre root", "pre a"]);
}

#[test]
fn test_hover_chain_fires_exits_before_entries() {
    let mut cx = new_context();
    let root = cx.root_view();
    let a = cx.new_view();
    let b = cx.new_view();
    let c = cx.new_view();
    cx.add_child(root, a);
    cx.add_child(a, b);
    cx.add_child(root, c);
    cx.set_frame(a, Rect::new(0, 0, 200, 200));
    cx.set_frame(b, Rect::new(0, 0, 100, 100));
    cx.set_frame(c, Rect::new(300, 0, 100, 100));

    let log = Log::default();
    for (view, name) in [(root, "root"), (a, "a"), (b, "b"), (c, "c")] {
        cx.add_event_handler(view, EventKind::MouseEntered, tracker(&log, &format!("enter {name}")));
        cx.add_event_handler(view, EventKind::MouseExited, tracker(&log, &format!("exit {name}")));
    }

    cx.dispatch_input(InputEvent::MouseMoved {
        position: Vec2::new(50, 50),
    });
    assert_eq!(*log.borrow(), vec!["enter root", "enter a", "enter b"]);
    log.borrow_mut().clear();

    cx.dispatch_input(InputEvent::MouseMoved {
        position: Vec2::new(350, 50),
    });
    assert_eq!(*log.borrow(), vec!["exit a", "exit b", "enter c"]);
}

#[test]
fn test_pointer_leaving_window_clears_chain() {
    let mut cx = new_context();
    let (root, a, b) = nested_tree(&mut cx);
    let log = Log::default();
    for (view, name) in [(root, "root"), (a, "a"), (b, "b")] {
        cx.add_event_handler(view, EventKind::MouseExited, tracker(&log, &format!("exit {name}")));
    }

    cx.dispatch_input(InputEvent::MouseMoved {
        position: Vec2::new(180, 180),
    });
    cx.dispatch_input(InputEvent::PointerLeft);
    assert_eq!(*log.borrow(), vec!["exit root", "exit a", "exit b"]);
    assert!(cx.mouse_chain().is_empty());
}

#[test]
fn test_drag_keeps_the_pressed_chain_and_button() {
    let mut cx = new_context();
    let (root, a, b) = nested_tree(&mut cx);
    press(&mut cx, 180, 180);
    assert_eq!(cx.mouse_chain(), &[root, a, b]);

    let buttons = Rc::new(RefCell::new(Vec::new()));
    let bs = buttons.clone();
    cx.add_event_handler(
        b,
        EventKind::MouseDragged,
        Rc::new(RefCell::new(
            move |_cx: &mut ViewContext, _v: ViewId, arg: &mut EventArg<'_>| {
                if let EventArg::Mouse(e) = arg {
                    bs.borrow_mut().push(e.button);
                }
            },
        )),
    );

    // Drag far outside b: the chain is not recomputed and the event
    // carries the button held since the press.
    cx.dispatch_input(InputEvent::MouseDragged {
        position: Vec2::new(700, 500),
    });
    assert_eq!(cx.mouse_chain(), &[root, a, b]);
    assert_eq!(*buttons.borrow(), vec![MouseButton::Left]);
}

#[test]
fn test_release_fires_released_then_clicked_then_updates_chain() {
    let mut cx = new_context();
    let (_root, _a, b) = nested_tree(&mut cx);
    let log = Log::default();
    cx.add_event_handler(b, EventKind::MouseReleased, tracker(&log, "released"));
    cx.add_event_handler(b, EventKind::MouseClicked, tracker(&log, "clicked"));
    cx.add_event_handler(b, EventKind::MouseExited, tracker(&log, "exited"));

    press(&mut cx, 180, 180);
    // Release at a point outside b entirely: released still reaches the
    // captured chain, clicked is pruned, and only then does the chain
    // update fire the exit.
    release(&mut cx, 700, 500);
    assert_eq!(*log.borrow(), vec!["released", "exited"]);
}

#[test]
fn test_clicked_inside_test_prunes_chain() {
    let mut cx = new_context();
    let (root, a, b) = nested_tree(&mut cx);
    let log = Log::default();
    for (view, name) in [(root, "root"), (a, "a"), (b, "b")] {
        cx.add_event_handler(view, EventKind::PreMouseClicked, tracker(&log, &format!("pre {name}")));
        cx.add_event_handler(view, EventKind::MouseClicked, tracker(&log, name));
    }

    press(&mut cx, 180, 180);
    // Drag to a point still inside a but outside b, then release. The
    // chain is still [root, a, b]; the click walk verifies geometry on
    // the way down and covers only the verified prefix on the way up.
    cx.dispatch_input(InputEvent::MouseDragged {
        position: Vec2::new(120, 120),
    });
    release(&mut cx, 120, 120);
    assert_eq!(*log.borrow(), vec!["pre root", "pre a", "a", "root"]);
}

#[test]
fn test_click_on_stable_point_covers_whole_chain() {
    let mut cx = new_context();
    let (root, a, b) = nested_tree(&mut cx);
    let log = Log::default();
    for (view, name) in [(root, "root"), (a, "a"), (b, "b")] {
        cx.add_event_handler(view, EventKind::MouseClicked, tracker(&log, name));
    }

    press(&mut cx, 180, 180);
    release(&mut cx, 180, 180);
    assert_eq!(*log.borrow(), vec!["b", "a", "root"]);
}

#[test]
fn test_press_requests_host_keyboard_focus() {
    let mut cx = new_context();
    press(&mut cx, 10, 10);
    let host = cx.host().as_any().downcast_ref::<HeadlessHost>().unwrap();
    assert_eq!(host.focus_requests(), 1);
}

#[test]
fn test_key_events_walk_the_focus_chain_both_ways() {
    let mut cx = new_context();
    let (root, a, b) = nested_tree(&mut cx);
    cx.request_focus(Some(b));
    let log = Log::default();
    for (view, name) in [(root, "root"), (a, "a"), (b, "b")] {
        cx.add_event_handler(view, EventKind::PreKeyPressed, tracker(&log, &format!("pre {name}")));
        cx.add_event_handler(view, EventKind::KeyPressed, tracker(&log, name));
    }

    cx.dispatch_input(InputEvent::KeyPressed(KeyInput {
        code: 32,
        ch: Some(' '),
        modifiers: Modifiers::empty(),
    }));
    assert_eq!(
        *log.borrow(),
        vec!["pre root", "pre a", "pre b", "b", "a", "root"]
    );
}

#[test]
fn test_handled_key_event_stops_bubbling() {
    let mut cx = new_context();
    let (root, a, b) = nested_tree(&mut cx);
    cx.request_focus(Some(b));
    let log = Log::default();
    cx.add_event_handler(b, EventKind::KeyPressed, handling_tracker(&log, "b"));
    cx.add_event_handler(a, EventKind::KeyPressed, tracker(&log, "a"));
    cx.add_event_handler(root, EventKind::KeyPressed, tracker(&log, "root"));

    cx.dispatch_input(InputEvent::KeyPressed(KeyInput {
        code: 13,
        ch: Some('\n'),
        modifiers: Modifiers::empty(),
    }));
    assert_eq!(*log.borrow(), vec!["b"]);
}

#[test]
fn test_wheel_follows_the_hover_chain() {
    let mut cx = new_context();
    let (_root, _a, b) = nested_tree(&mut cx);
    let rotations = Rc::new(RefCell::new(Vec::new()));
    let rs = rotations.clone();
    cx.add_event_handler(
        b,
        EventKind::MouseWheel,
        Rc::new(RefCell::new(
            move |_cx: &mut ViewContext, _v: ViewId, arg: &mut EventArg<'_>| {
                if let EventArg::Wheel(e) = arg {
                    rs.borrow_mut().push(e.rotation);
                }
            },
        )),
    );

    cx.dispatch_input(InputEvent::Wheel {
        position: Vec2::new(180, 180),
        rotation: -3,
    });
    assert_eq!(*rotations.borrow(), vec![-3]);
}

#[test]
fn test_event_positions_resolve_into_local_space() {
    let mut cx = new_context();
    let (_root, _a, b) = nested_tree(&mut cx);
    let positions = Rc::new(RefCell::new(Vec::new()));
    let ps = positions.clone();
    cx.add_event_handler(
        b,
        EventKind::MousePressed,
        Rc::new(RefCell::new(
            move |cx: &mut ViewContext, view: ViewId, arg: &mut EventArg<'_>| {
                if let EventArg::Mouse(e) = arg {
                    ps.borrow_mut().push(e.position_in(cx, view));
                }
            },
        )),
    );

    press(&mut cx, 180, 180);
    // root (180,180) -> a (80,80) -> b (30,30)
    assert_eq!(*positions.borrow(), vec![Vec2::new(30, 30)]);
}

#[test]
fn test_handlers_can_mutate_the_tree_mid_dispatch() {
    let mut cx = new_context();
    let (root, a, b) = nested_tree(&mut cx);
    let removed = b;
    cx.add_event_handler(
        a,
        EventKind::PreMousePressed,
        Rc::new(RefCell::new(
            move |cx: &mut ViewContext, _v: ViewId, _arg: &mut EventArg<'_>| {
                if cx.parent(removed).is_some() {
                    cx.remove_from_parent(removed);
                }
            },
        )),
    );
    let log = Log::default();
    cx.add_event_handler(b, EventKind::MousePressed, tracker(&log, "b"));
    cx.add_event_handler(root, EventKind::MousePressed, tracker(&log, "root"));

    // The handler detaches b while the event walks the chain; dispatch
    // finishes without touching freed state.
    press(&mut cx, 180, 180);
    assert!(cx.parent(b).is_none());
    assert_eq!(*log.borrow(), vec!["b", "root"]);
}
