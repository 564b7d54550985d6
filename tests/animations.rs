//! Animations driving view properties through the runtime frame loop.

use std::cell::RefCell;
use std::rc::Rc;

use vitrea::headless::HeadlessHost;
use vitrea::prelude::*;

fn frames_rendered(cx: &Rc<RefCell<ViewContext>>) -> usize {
    let cx = cx.borrow();
    cx.host()
        .as_any()
        .downcast_ref::<HeadlessHost>()
        .unwrap()
        .frames_rendered()
}

fn setup() -> (Runtime, Rc<RefCell<ViewContext>>, ViewId) {
    let rt = Runtime::new();
    let cx = rt.new_context(Box::new(HeadlessHost::new(400, 300)));
    let panel = {
        let mut cx = cx.borrow_mut();
        let root = cx.root_view();
        let panel = cx.new_view();
        cx.add_child(root, panel);
        cx.set_frame(panel, Rect::new(0, 0, 100, 100));
        panel
    };
    (rt, cx, panel)
}

#[test]
fn test_fade_animation_repaints_each_tick() {
    let (rt, cx, panel) = setup();
    rt.frame(16); // settle the initial paint
    let baseline = frames_rendered(&cx);

    let target = cx.clone();
    let fade = Animation::new(1.0).on_animate(move |p| {
        target.borrow_mut().set_alpha(panel, 1.0 - 0.5 * p);
    });
    rt.commit_animation(&fade);

    rt.frame(500);
    assert_eq!(cx.borrow().alpha(panel), 0.75);
    assert_eq!(frames_rendered(&cx), baseline + 1);

    rt.frame(500);
    assert_eq!(cx.borrow().alpha(panel), 0.5);
    assert!(!fade.is_playing());
    assert_eq!(frames_rendered(&cx), baseline + 2);

    // Settled: no more property changes, no more paints.
    rt.frame(500);
    assert_eq!(frames_rendered(&cx), baseline + 2);
}

#[test]
fn test_slide_animation_follows_the_curve() {
    let (rt, cx, panel) = setup();
    let target = cx.clone();
    let slide = Animation::new(1.0)
        .with_curve(Curve::EaseOut)
        .on_animate(move |p| {
            target.borrow_mut().set_left(panel, (100.0 * p).round() as i32);
        });
    rt.commit_animation(&slide);
    assert_eq!(cx.borrow().left(panel), 0);

    // EaseOut: t(2 - t), so the halfway tick lands at 75.
    rt.frame(500);
    assert_eq!(cx.borrow().left(panel), 75);
    rt.frame(500);
    assert_eq!(cx.borrow().left(panel), 100);
}

#[test]
fn test_committing_a_mutex_peer_preempts_the_running_slide() {
    let (rt, cx, panel) = setup();

    let target = cx.clone();
    let outcome = Rc::new(RefCell::new(None));
    let o = outcome.clone();
    let slide_out = Animation::new(1.0)
        .with_mutex("panel-slide")
        .on_animate(move |p| {
            target.borrow_mut().set_left(panel, (200.0 * p) as i32);
        })
        .on_complete(move |canceled| *o.borrow_mut() = Some(canceled));
    rt.commit_animation(&slide_out);
    rt.frame(500);
    assert_eq!(cx.borrow().left(panel), 100);

    // The replacement takes over from wherever the panel is now.
    let target = cx.clone();
    let from = cx.borrow().left(panel);
    let slide_back = Animation::new(1.0)
        .with_mutex("panel-slide")
        .on_animate(move |p| {
            let left = from as f32 * (1.0 - p);
            target.borrow_mut().set_left(panel, left as i32);
        });
    rt.commit_animation(&slide_back);
    assert!(!slide_out.is_playing());

    rt.frame(500);
    assert_eq!(*outcome.borrow(), Some(true));
    assert_eq!(cx.borrow().left(panel), 50);
    rt.frame(500);
    assert_eq!(cx.borrow().left(panel), 0);
}

#[test]
fn test_delayed_animation_runs_after_the_wait() {
    let (rt, cx, panel) = setup();
    let target = cx.clone();
    let appear = Animation::new(0.5).on_animate(move |p| {
        target.borrow_mut().set_alpha(panel, p);
    });
    cx.borrow_mut().set_alpha(panel, 0.0);

    let delayed = rt.delayed(0.5, &appear);
    rt.commit_animation(&delayed);

    // Still waiting: the target has not begun.
    rt.frame(400);
    assert_eq!(cx.borrow().alpha(panel), 0.0);
    assert!(!appear.is_playing());

    // The delay elapses and commits the target, which then animates to
    // completion over the following frames.
    rt.frame(100);
    assert!(appear.is_playing());
    rt.frame(250);
    assert_eq!(cx.borrow().alpha(panel), 0.5);
    rt.frame(250);
    assert_eq!(cx.borrow().alpha(panel), 1.0);
    assert!(!appear.is_playing());
}

#[test]
fn test_completion_can_chain_the_next_animation() {
    let (rt, cx, panel) = setup();

    let target = cx.clone();
    let second = Animation::new(0.5).on_animate(move |p| {
        target.borrow_mut().set_top(panel, (40.0 * p) as i32);
    });

    let rt2 = rt.clone();
    let target = cx.clone();
    let first = Animation::new(0.5)
        .on_animate(move |p| {
            target.borrow_mut().set_left(panel, (40.0 * p) as i32);
        })
        .on_complete(move |canceled| {
            if !canceled {
                rt2.commit_animation(&second);
            }
        });
    rt.commit_animation(&first);

    rt.frame(500);
    assert_eq!(cx.borrow().position(panel), Vec2::new(40, 0));
    rt.frame(500);
    assert_eq!(cx.borrow().position(panel), Vec2::new(40, 40));
}

#[test]
fn test_host_input_is_pumped_during_the_frame() {
    let (rt, cx, panel) = setup();
    let pressed = Rc::new(RefCell::new(0));
    {
        let mut cx = cx.borrow_mut();
        let p = pressed.clone();
        cx.add_event_handler(
            panel,
            EventKind::MousePressed,
            Rc::new(RefCell::new(
                move |_: &mut ViewContext, _: ViewId, _: &mut EventArg<'_>| {
                    *p.borrow_mut() += 1;
                },
            )),
        );
    }

    cx.borrow_mut()
        .host_mut()
        .as_any_mut()
        .downcast_mut::<HeadlessHost>()
        .unwrap()
        .push_event(InputEvent::MousePressed {
            position: Vec2::new(50, 50),
            button: MouseButton::Left,
            click_count: 1,
        });
    rt.frame(16);
    assert_eq!(*pressed.borrow(), 1);
}
