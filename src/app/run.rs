//! Main application loop.
//!
//! Flow per iteration:
//! 1. Dispatch control endpoint commands
//! 2. Tick the controller (stream I/O, init timeout, pull timer) and
//!    handle its events
//! 3. Redraw the surface if anything changed
//! 4. Publish snapshots for the control endpoint

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{info, trace};

use super::PlayerApp;

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);
const PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// PXLD show name
    pub name: String,
    pub autoplay: bool,
    pub start_frame: u32,
    /// Exit after this long; None runs until the process is stopped
    pub duration: Option<Duration>,
    /// PNG written on exit
    pub snapshot: Option<PathBuf>,
    pub control_port: Option<u16>,
    /// Slave to view (and play) after load, -1 for the whole board
    pub initial_view: i32,
    /// Loop sleep between iterations
    pub tick: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            autoplay: false,
            start_frame: 0,
            duration: None,
            snapshot: None,
            control_port: None,
            initial_view: -1,
            tick: Duration::from_millis(4),
        }
    }
}

impl PlayerApp {
    /// Bootstrap `opts.name` and run until `opts.duration` elapses
    pub fn run(&mut self, opts: &RunOptions) -> anyhow::Result<()> {
        let started = Instant::now();
        self.bootstrap(&opts.name, started)
            .with_context(|| format!("Failed to load '{}'", opts.name))?;

        if opts.initial_view >= 0 {
            self.select_view(opts.initial_view, started)
                .with_context(|| format!("Cannot view slave {}", opts.initial_view))?;
        }

        if let Some(port) = opts.control_port {
            self.start_api_server(port, started);
        }

        // Errors land on the status line; the loop keeps serving commands
        if opts.autoplay {
            let _ = self.play(opts.start_frame, started);
        } else {
            self.pending_still = Some(opts.start_frame);
            if let Err(e) = self.open_session(started) {
                self.status.warning(format!("Not connected: {}", e), started);
            }
        }

        let mut last_stats = started;
        let mut last_publish = started;
        loop {
            let now = Instant::now();
            if let Some(limit) = opts.duration {
                if now.saturating_duration_since(started) >= limit {
                    info!("Run duration {:?} reached", limit);
                    break;
                }
            }

            self.handle_api_commands(now);
            self.tick(now);
            if self.draw() {
                trace!("Redrawn at frame {}", self.controller.current_frame());
            }

            if now.saturating_duration_since(last_publish) >= PUBLISH_INTERVAL {
                self.update_api_state();
                last_publish = now;
            }
            if now.saturating_duration_since(last_stats) >= STATS_LOG_INTERVAL {
                let cache = self.controller.cache();
                let stats = cache.stats();
                info!(
                    "Cache stats: {} entries | hits: {} | misses: {} | hit rate: {:.1}% | fps: {:.1}",
                    cache.len(),
                    stats.hits(),
                    stats.misses(),
                    stats.hit_rate() * 100.0,
                    self.controller.stats().measured_fps().unwrap_or(0.0)
                );
                last_stats = now;
            }

            std::thread::sleep(opts.tick);
        }

        self.controller.disconnect();
        if let Some(path) = &opts.snapshot {
            self.snapshot(path)?;
        }
        Ok(())
    }
}
