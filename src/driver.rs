//! The frame clock.
//!
//! A background thread watches elapsed wall time and offers a tick whenever
//! enough time has passed for the configured frame-rate cap. Ticks cross to
//! the UI thread over zero-capacity channels in a strict handshake: the
//! clock thread blocks until the UI thread accepts the tick, the UI thread
//! runs the frame, and the clock waits for the acknowledgement before
//! timing the next interval. Frame processing time therefore counts toward
//! the next delta, so a slow frame yields a proportionally larger `dt`
//! instead of a backlog of stale ticks.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

/// One frame tick. `dt_ms` is the wall time covered by this frame,
/// including the processing time of the previous one.
#[derive(Clone, Copy, Debug)]
pub struct Tick {
    pub dt_ms: u64,
}

/// A frame is due once the elapsed time at the current cap exceeds one
/// frame interval.
fn frame_due(elapsed_ms: u64, max_fps: u64) -> bool {
    elapsed_ms * max_fps > 1000
}

struct Shared {
    running: AtomicBool,
    max_fps: AtomicU32,
    fps: AtomicU32,
    sleep_lock: Mutex<()>,
    wake: Condvar,
}

/// Handle to the clock thread.
pub struct Driver {
    shared: Arc<Shared>,
    ticks: Receiver<Tick>,
    acks: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Driver {
    pub const DEFAULT_MAX_FPS: u32 = 60;

    /// Spawn the clock thread with the given frame-rate cap.
    pub fn start(max_fps: u32) -> Self {
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            max_fps: AtomicU32::new(max_fps.max(1)),
            fps: AtomicU32::new(0),
            sleep_lock: Mutex::new(()),
            wake: Condvar::new(),
        });
        let (tick_tx, tick_rx) = bounded::<Tick>(0);
        let (ack_tx, ack_rx) = bounded::<()>(0);
        let thread_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("frame-clock".into())
            .spawn(move || clock_loop(thread_shared, tick_tx, ack_rx))
            .expect("failed to spawn frame clock thread");
        log::debug!("frame clock started at {} fps cap", max_fps.max(1));
        Self {
            shared,
            ticks: tick_rx,
            acks: ack_tx,
            handle: Some(handle),
        }
    }

    /// Block until the next tick. `None` once the clock has stopped.
    pub fn wait_tick(&self) -> Option<Tick> {
        self.ticks.recv().ok()
    }

    /// Acknowledge the tick returned by the last [`Driver::wait_tick`],
    /// releasing the clock thread to time the next frame.
    pub fn finish_tick(&self) {
        let _ = self.acks.send(());
    }

    /// Measured rate of the most recent frame, in frames per second.
    pub fn fps(&self) -> u32 {
        self.shared.fps.load(Ordering::Relaxed)
    }

    pub fn max_fps(&self) -> u32 {
        self.shared.max_fps.load(Ordering::Relaxed)
    }

    pub fn set_max_fps(&self, max_fps: u32) {
        self.shared.max_fps.store(max_fps.max(1), Ordering::Relaxed);
    }

    /// Stop the clock and join its thread. Idempotent.
    pub fn stop(&mut self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            // Interrupt a sleeping clock immediately.
            let _guard = self.shared.sleep_lock.lock();
            self.shared.wake.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            // Unblock a clock parked on either side of the handshake until
            // it observes the stop flag and exits.
            while !handle.is_finished() {
                if self.ticks.try_recv().is_ok() {
                    let _ = self.acks.try_send(());
                }
                std::thread::yield_now();
            }
            let _ = handle.join();
            log::debug!("frame clock stopped");
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn clock_loop(shared: Arc<Shared>, ticks: Sender<Tick>, acks: Receiver<()>) {
    let mut t0 = Instant::now();
    while shared.running.load(Ordering::SeqCst) {
        let now = Instant::now();
        let elapsed = now.duration_since(t0).as_millis() as u64;
        let max_fps = shared.max_fps.load(Ordering::Relaxed) as u64;
        if frame_due(elapsed, max_fps) {
            shared
                .fps
                .store((1000 / elapsed.max(1)) as u32, Ordering::Relaxed);
            if ticks.send(Tick { dt_ms: elapsed }).is_err() {
                break;
            }
            if acks.recv().is_err() {
                break;
            }
            // Time from `now`, not from the ack: the frame's processing
            // time flows into the next dt.
            t0 = now;
        } else {
            let frame_interval = 1000 / max_fps;
            let wait = Duration::from_millis(frame_interval.saturating_sub(elapsed).max(1));
            let mut guard = shared.sleep_lock.lock();
            if shared.running.load(Ordering::SeqCst) {
                shared.wake.wait_for(&mut guard, wait);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_due_threshold() {
        // At 60 fps a frame is due after 1000/60 ~ 16.7 ms.
        assert!(!frame_due(16, 60));
        assert!(frame_due(17, 60));
        // At 1000 fps every elapsed millisecond past the first is enough.
        assert!(!frame_due(1, 1000));
        assert!(frame_due(2, 1000));
        // A 1 fps cap needs more than a second.
        assert!(!frame_due(1000, 1));
        assert!(frame_due(1001, 1));
    }

    #[test]
    fn test_ticks_arrive_and_report_dt() {
        let mut driver = Driver::start(500);
        let tick = driver.wait_tick().expect("clock should tick");
        assert!(tick.dt_ms >= 2);
        driver.finish_tick();
        let tick = driver.wait_tick().expect("clock should keep ticking");
        assert!(tick.dt_ms >= 2);
        driver.finish_tick();
        driver.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut driver = Driver::start(60);
        driver.stop();
        driver.stop();
        assert!(driver.wait_tick().is_none());
    }

    #[test]
    fn test_max_fps_clamped_to_one() {
        let mut driver = Driver::start(0);
        assert_eq!(driver.max_fps(), 1);
        driver.set_max_fps(0);
        assert_eq!(driver.max_fps(), 1);
        driver.stop();
    }
}
