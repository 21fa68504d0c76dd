//! Periodic scheduler
//!
//! Drives [`Runtime::tick`] at a fixed rate, either from a background
//! thread or host-driven. Redraw requests coalesce into a single atomic
//! flag per tick; an optional wake callback pokes the host event loop when
//! the flag goes up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::handle::RuntimeHandle;
use crate::runtime::Runtime;

/// Callback type for waking the host event loop from the tick thread
pub type WakeCallback = Arc<dyn Fn() + Send + Sync>;

/// Animation/collision ticks run at this rate; periodic handlers at half it
pub const DEFAULT_FPS: u32 = 60;

/// Fixed-rate driver around a [`Runtime`]
pub struct Scheduler {
    runtime: Arc<Mutex<Runtime>>,
    needs_redraw: Arc<AtomicBool>,
    stop_flag: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    wake_callback: Option<WakeCallback>,
    target_fps: u32,
    last_tick: Option<Instant>,
}

impl Scheduler {
    pub fn new(runtime: Runtime) -> Self {
        let needs_redraw = runtime.needs_redraw_flag();
        Self {
            runtime: Arc::new(Mutex::new(runtime)),
            needs_redraw,
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            wake_callback: None,
            target_fps: DEFAULT_FPS,
            last_tick: None,
        }
    }

    /// The shared runtime, for hosts that need direct access between ticks
    pub fn runtime(&self) -> Arc<Mutex<Runtime>> {
        Arc::clone(&self.runtime)
    }

    /// Script-facing handle bound to the runtime
    pub fn handle(&self) -> RuntimeHandle {
        self.runtime.lock().unwrap().handle()
    }

    /// Set a callback invoked from the tick thread whenever a tick requests
    /// a redraw
    pub fn set_wake_callback<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.wake_callback = Some(Arc::new(callback));
    }

    pub fn set_target_fps(&mut self, fps: u32) {
        self.target_fps = fps.max(1);
    }

    /// Host-driven tick: computes elapsed time since the previous call
    pub fn tick(&mut self) {
        let now = Instant::now();
        let dt = self
            .last_tick
            .map(|last| (now - last).as_secs_f64())
            .unwrap_or(1.0 / self.target_fps as f64);
        self.last_tick = Some(now);
        self.runtime.lock().unwrap().tick(dt);
    }

    /// Check and clear the coalesced redraw flag
    pub fn take_needs_redraw(&self) -> bool {
        self.needs_redraw.swap(false, Ordering::Acquire)
    }

    /// Start ticking on a background thread at the target rate
    pub fn start_background(&mut self) {
        if self.thread_handle.is_some() {
            return; // Already running
        }
        debug!(fps = self.target_fps, "starting scheduler thread");
        let runtime = Arc::clone(&self.runtime);
        let stop_flag = Arc::clone(&self.stop_flag);
        let needs_redraw = Arc::clone(&self.needs_redraw);
        let wake_callback = self.wake_callback.clone();
        let frame_duration = Duration::from_micros(1_000_000 / self.target_fps as u64);

        self.thread_handle = Some(thread::spawn(move || {
            let mut last = Instant::now();
            while !stop_flag.load(Ordering::Relaxed) {
                let start = Instant::now();
                let dt = (start - last).as_secs_f64();
                last = start;

                runtime.lock().unwrap().tick(dt);

                // The flag stays up for the host to take; the callback just
                // wakes its loop
                if needs_redraw.load(Ordering::Acquire) {
                    if let Some(ref callback) = wake_callback {
                        callback();
                    }
                }

                let elapsed = start.elapsed();
                if elapsed < frame_duration {
                    thread::sleep(frame_duration - elapsed);
                }
            }
        }));
    }

    /// Stop the background thread, joining it
    pub fn stop_background(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        self.stop_flag.store(false, Ordering::Relaxed);
    }

    pub fn is_background_running(&self) -> bool {
        self.thread_handle.is_some()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_background();
    }
}
