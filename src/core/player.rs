//! Playback controller: the client side of the PXLD streaming protocol.
//!
//! **Architecture**: the controller owns the [`ConnectionManager`], the
//! [`FrameCache`] and the current [`FrameView`]. It does NOT own the board;
//! the app passes slave pixel counts in when the board changes. All state
//! lives on the app-loop thread and time is passed in explicitly.
//!
//! # States
//!
//! ```text
//! Disconnected -> Connected -> Initializing -> Ready <-> Playing <-> Paused
//! ```
//!
//! `stop` returns to Ready with frame 0. A transport close from any state
//! forces Disconnected and discards the session and cache.
//!
//! # Stale-frame filter
//!
//! Frames that were already in flight when the user paused or stopped must
//! not repaint the board. A frame message is dropped when:
//! - `should_accept_frames` is false (set by play/seek/get_frame, cleared by
//!   pause/stop), or
//! - it arrives within the guard window after the last play/pause/stop while
//!   the server has not confirmed playback with `playback_started`.
//!
//! A frame explicitly requested by seek/get_frame bypasses the guard window.
//!
//! # Pacing
//!
//! Push: the server streams after `playback_play`. Pull: after each accepted
//! frame the next `playback_get_frame` is scheduled
//! `max(1 ms, 1000/fps - last latency)` later, wrapping to frame 0 at the end.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::connection::{ConnectionManager, Inbound, PLAYBACK_IDENTITY, Pacing};
use super::error::{PlayerError, PlayerResult};
use super::frame_cache::{FrameCache, RgbwBuffer};
use super::protocol::{ClientMessage, ServerMessage, SlaveFrame, decode_rgbw, split_merged};
use super::scheduler::ScheduledTask;
use super::session::Scope;

pub const DEFAULT_GUARD: Duration = Duration::from_millis(100);
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);
const STATS_WINDOW: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Disconnected,
    Connected,
    Initializing,
    Ready,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn name(self) -> &'static str {
        match self {
            PlaybackState::Disconnected => "disconnected",
            PlaybackState::Connected => "connected",
            PlaybackState::Initializing => "initializing",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        }
    }

    /// Ready, Playing or Paused: a session exists
    pub fn has_session(self) -> bool {
        matches!(
            self,
            PlaybackState::Ready | PlaybackState::Playing | PlaybackState::Paused
        )
    }
}

/// Created on `playback_ready`, discarded on disconnect
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub filename: String,
    pub scope: Scope,
    pub total_frames: u32,
    pub fps: f64,
    pub current_frame: u32,
    pub slave_ids: Option<Vec<i32>>,
}

impl PlaybackSession {
    fn frame_interval(&self) -> Duration {
        let fps = if self.fps > 0.0 { self.fps } else { 30.0 };
        Duration::from_secs_f64(1.0 / fps)
    }

    fn next_frame(&self, frame: u32) -> u32 {
        let next = frame + 1;
        if self.total_frames == 0 || next >= self.total_frames { 0 } else { next }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotAccepting,
    GuardWindow,
}

/// Notifications for the app loop
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Connected(Pacing),
    Ready { total_frames: u32, fps: f64 },
    InitFailed(PlayerError),
    FrameShown { frame: u32, from_cache: bool },
    FrameDropped { frame: u32, reason: DropReason },
    Started(u32),
    Paused(u32),
    Stopped,
    DecodeFailed(PlayerError),
    ServerError(String),
    Disconnected(String),
}

/// Latest good per-slave buffers; what the renderer draws
#[derive(Debug, Clone, Default)]
pub struct FrameView {
    frame: Option<u32>,
    buffers: HashMap<i32, RgbwBuffer>,
}

impl FrameView {
    /// View over explicit buffers, e.g. a frame served outside the controller
    pub fn with_buffers(frame: u32, buffers: impl IntoIterator<Item = (i32, RgbwBuffer)>) -> Self {
        let mut view = Self::default();
        view.update(frame, buffers);
        view
    }

    pub fn frame(&self) -> Option<u32> {
        self.frame
    }

    pub fn buffer(&self, slave_id: i32) -> Option<&[u8]> {
        self.buffers.get(&slave_id).map(|b| &b[..])
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    fn update(&mut self, frame: u32, buffers: impl IntoIterator<Item = (i32, RgbwBuffer)>) {
        self.frame = Some(frame);
        self.buffers.extend(buffers);
    }

    fn clear(&mut self) {
        self.frame = None;
        self.buffers.clear();
    }
}

/// Rolling frame timing
#[derive(Debug, Clone, Default)]
pub struct PlaybackStats {
    intervals: VecDeque<Duration>,
    last_frame_at: Option<Instant>,
    pub last_latency: Option<Duration>,
    pub accepted: u64,
    pub dropped: u64,
    pub decode_errors: u64,
}

impl PlaybackStats {
    fn record_frame(&mut self, now: Instant) {
        if let Some(prev) = self.last_frame_at {
            if self.intervals.len() == STATS_WINDOW {
                self.intervals.pop_front();
            }
            self.intervals.push_back(now.saturating_duration_since(prev));
        }
        self.last_frame_at = Some(now);
        self.accepted += 1;
    }

    /// Measured frames per second over the last 60 intervals
    pub fn measured_fps(&self) -> Option<f64> {
        if self.intervals.is_empty() {
            return None;
        }
        let total: Duration = self.intervals.iter().sum();
        let avg = total.as_secs_f64() / self.intervals.len() as f64;
        (avg > 0.0).then(|| 1.0 / avg)
    }

    fn reset_timing(&mut self) {
        self.intervals.clear();
        self.last_frame_at = None;
    }
}

/// Timing and cache bounds
#[derive(Debug, Clone, Copy)]
pub struct PlaybackConfig {
    pub guard: Duration,
    pub init_timeout: Duration,
    pub cache_max_entries: usize,
    pub cache_max_bytes: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            guard: DEFAULT_GUARD,
            init_timeout: DEFAULT_INIT_TIMEOUT,
            cache_max_entries: super::frame_cache::DEFAULT_MAX_ENTRIES,
            cache_max_bytes: super::frame_cache::DEFAULT_MAX_BYTES,
        }
    }
}

struct PendingInit {
    filename: String,
    scope: Scope,
    started: Instant,
}

pub struct PlaybackController {
    conn: ConnectionManager,
    config: PlaybackConfig,
    state: PlaybackState,
    pacing: Pacing,
    session: Option<PlaybackSession>,
    pending_init: Option<PendingInit>,
    /// (filename, scope) the cache currently holds frames for
    cache_owner: Option<(String, Scope)>,
    cache: FrameCache,
    view: FrameView,
    pixel_counts: Vec<(i32, u32)>,
    should_accept_frames: bool,
    control_timestamp: Option<Instant>,
    server_playing: bool,
    /// Frame asked for by seek/get_frame, exempt from the guard window
    requested: Option<u32>,
    pull: ScheduledTask<u32>,
    last_request: Option<(u32, Instant)>,
    stats: PlaybackStats,
    events: VecDeque<PlayerEvent>,
}

impl PlaybackController {
    pub fn new(conn: ConnectionManager, config: PlaybackConfig) -> Self {
        info!(
            "PlaybackController: guard {} ms, init timeout {} ms",
            config.guard.as_millis(),
            config.init_timeout.as_millis()
        );
        Self {
            conn,
            state: PlaybackState::Disconnected,
            pacing: Pacing::Push,
            session: None,
            pending_init: None,
            cache_owner: None,
            cache: FrameCache::new(config.cache_max_entries, config.cache_max_bytes),
            view: FrameView::default(),
            pixel_counts: Vec::new(),
            should_accept_frames: false,
            control_timestamp: None,
            server_playing: false,
            requested: None,
            pull: ScheduledTask::new(),
            last_request: None,
            stats: PlaybackStats::default(),
            events: VecDeque::new(),
            config,
        }
    }

    // --- queries ---------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn via_fallback(&self) -> bool {
        self.conn.via_fallback()
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn should_accept_frames(&self) -> bool {
        self.should_accept_frames
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn current_frame(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.current_frame)
    }

    pub fn view(&self) -> &FrameView {
        &self.view
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    pub fn pull_pending(&self) -> bool {
        self.pull.is_pending()
    }

    /// Slave order and sizes used to split merged `-1` buffers
    pub fn set_pixel_counts(&mut self, counts: Vec<(i32, u32)>) {
        self.pixel_counts = counts;
    }

    pub fn drain_events(&mut self) -> Vec<PlayerEvent> {
        self.events.drain(..).collect()
    }

    // --- commands --------------------------------------------------------

    pub fn connect(&mut self) -> PlayerResult<Pacing> {
        self.pull.cancel();
        let pacing = self.conn.connect(PLAYBACK_IDENTITY)?;
        self.reset_session();
        self.pacing = pacing;
        self.state = PlaybackState::Connected;
        self.events.push_back(PlayerEvent::Connected(pacing));
        Ok(pacing)
    }

    pub fn disconnect(&mut self) {
        self.pull.cancel();
        self.conn.disconnect();
        if self.state != PlaybackState::Disconnected {
            self.to_disconnected("disconnected by user".into());
        }
    }

    /// Ask the server to open `filename` for `scope`. A different filename or
    /// scope than the cached one clears the frame cache.
    pub fn init(&mut self, filename: &str, scope: Scope, now: Instant) -> PlayerResult<()> {
        if self.state == PlaybackState::Disconnected {
            return Err(PlayerError::NotConnected);
        }
        let owner = (filename.to_string(), scope);
        if self.cache_owner.as_ref() != Some(&owner) {
            self.cache.clear();
            self.view.clear();
            self.cache_owner = Some(owner);
        }
        self.conn.send(&ClientMessage::PlaybackInit {
            filename: filename.to_string(),
            slave_id: scope.to_wire(),
        })?;
        self.pull.cancel();
        self.should_accept_frames = false;
        self.server_playing = false;
        self.requested = None;
        self.pending_init = Some(PendingInit {
            filename: filename.to_string(),
            scope,
            started: now,
        });
        self.state = PlaybackState::Initializing;
        info!("Init '{}' ({})", filename, scope);
        Ok(())
    }

    pub fn play(&mut self, frame: u32, now: Instant) -> PlayerResult<()> {
        let scope = self.require_session("play")?;
        self.conn.send(&ClientMessage::PlaybackPlay {
            frame,
            slave_id: slave_filter(scope),
        })?;
        self.state = PlaybackState::Playing;
        self.should_accept_frames = true;
        self.server_playing = false;
        self.control_timestamp = Some(now);
        self.stats.reset_timing();
        self.set_current(frame);
        info!("Play from frame {}", frame);
        if self.pacing == Pacing::Pull {
            self.request_frame(frame, scope, now)?;
        }
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> PlayerResult<()> {
        if self.state != PlaybackState::Playing {
            return Err(self.invalid("pause"));
        }
        self.conn.send(&ClientMessage::PlaybackPause {})?;
        self.state = PlaybackState::Paused;
        self.halt(now);
        info!("Paused at frame {}", self.current_frame());
        Ok(())
    }

    pub fn stop(&mut self, now: Instant) -> PlayerResult<()> {
        self.require_session("stop")?;
        self.conn.send(&ClientMessage::PlaybackStop {})?;
        self.state = PlaybackState::Ready;
        self.halt(now);
        self.set_current(0);
        info!("Stopped");
        Ok(())
    }

    /// Jump to `frame`. Served from the cache when every slave in scope has
    /// it, otherwise fetched.
    pub fn seek(&mut self, frame: u32, now: Instant) -> PlayerResult<()> {
        let scope = self.require_session("seek")?;
        self.set_current(frame);
        if self.show_cached(scope, frame) {
            debug!("Seek {} served from cache", frame);
            self.events.push_back(PlayerEvent::FrameShown {
                frame,
                from_cache: true,
            });
            return Ok(());
        }
        self.conn.send(&ClientMessage::PlaybackSeek {
            frame,
            slave_id: slave_filter(scope),
        })?;
        self.should_accept_frames = true;
        self.requested = Some(frame);
        self.last_request = Some((frame, now));
        Ok(())
    }

    /// One-off fetch of `frame` for `scope`
    pub fn get_frame(&mut self, frame: u32, scope: Scope, now: Instant) -> PlayerResult<()> {
        self.require_session("fetch frame")?;
        self.request_frame(frame, scope, now)
    }

    /// Poll the connection, fire timers, and process every inbound message in
    /// arrival order.
    pub fn tick(&mut self, now: Instant) {
        for inbound in self.conn.poll() {
            match inbound {
                Inbound::Message(msg) => self.handle(msg, now),
                Inbound::Closed(reason) => self.to_disconnected(reason),
            }
        }

        if let Some(pending) = &self.pending_init {
            let waited = now.saturating_duration_since(pending.started);
            if waited >= self.config.init_timeout {
                warn!("No playback_ready for '{}' after {:?}", pending.filename, waited);
                self.pending_init = None;
                self.state = PlaybackState::Connected;
                self.events
                    .push_back(PlayerEvent::InitFailed(PlayerError::InitTimeout {
                        waited_ms: waited.as_millis() as u64,
                    }));
            }
        }

        if let Some(frame) = self.pull.tick(now) {
            if self.state == PlaybackState::Playing {
                let scope = self.session.as_ref().map_or(Scope::All, |s| s.scope);
                if let Err(e) = self.request_frame(frame, scope, now) {
                    warn!("Pull of frame {} failed: {}", frame, e);
                }
            }
        }
    }

    // --- inbound ---------------------------------------------------------

    fn handle(&mut self, msg: ServerMessage, now: Instant) {
        trace!("<- {:?}", msg);
        match msg {
            ServerMessage::Connection { message } => info!("Server: {}", message),
            ServerMessage::PlaybackReady {
                total_frames,
                fps,
                slave_ids,
            } => self.on_ready(total_frames, fps, slave_ids),
            ServerMessage::PlaybackStarted { frame } => {
                self.server_playing = true;
                self.events.push_back(PlayerEvent::Started(frame));
            }
            ServerMessage::PlaybackPaused { frame } => {
                self.server_playing = false;
                self.events.push_back(PlayerEvent::Paused(frame));
            }
            ServerMessage::PlaybackStopped {} => {
                self.server_playing = false;
                self.should_accept_frames = false;
                self.requested = None;
                self.pull.cancel();
                if matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
                    self.state = PlaybackState::Ready;
                }
                self.set_current(0);
                self.events.push_back(PlayerEvent::Stopped);
            }
            ServerMessage::FrameData {
                frame,
                slave_id,
                rgbw_b64,
            } => {
                if self.admit(frame, now) {
                    self.on_frame_data(frame, slave_id, &rgbw_b64, now);
                }
            }
            ServerMessage::FrameDataAll { frame, slaves } => {
                if self.admit(frame, now) {
                    self.on_frame_data_all(frame, &slaves, now);
                }
            }
            ServerMessage::PlaybackError { message } => {
                warn!("Playback error: {}", message);
                if self.state == PlaybackState::Initializing {
                    self.pending_init = None;
                    self.state = PlaybackState::Connected;
                    self.events
                        .push_back(PlayerEvent::InitFailed(PlayerError::Api(message.clone())));
                } else if let Some(frame) = self.requested.take() {
                    // failed fetch: skip past it
                    self.continue_pull(frame, now);
                }
                self.events.push_back(PlayerEvent::ServerError(message));
            }
            ServerMessage::Error { message } => {
                warn!("Server error: {}", message);
                self.events.push_back(PlayerEvent::ServerError(message));
            }
            ServerMessage::Unknown => debug!("Ignoring unknown message type"),
        }
    }

    fn on_ready(&mut self, total_frames: u32, fps: f64, slave_ids: Option<Vec<i32>>) {
        let Some(pending) = self.pending_init.take() else {
            debug!("playback_ready outside init, updating session");
            if let Some(s) = self.session.as_mut() {
                s.total_frames = total_frames;
                s.fps = fps;
            }
            return;
        };
        info!(
            "Ready: '{}' {} frames @ {} fps",
            pending.filename, total_frames, fps
        );
        self.session = Some(PlaybackSession {
            filename: pending.filename,
            scope: pending.scope,
            total_frames,
            fps,
            current_frame: 0,
            slave_ids,
        });
        self.state = PlaybackState::Ready;
        self.events.push_back(PlayerEvent::Ready { total_frames, fps });
    }

    /// Stale-frame filter
    fn admit(&mut self, frame: u32, now: Instant) -> bool {
        let verdict = if !self.should_accept_frames {
            Err(DropReason::NotAccepting)
        } else if self.requested == Some(frame) || self.server_playing {
            Ok(())
        } else {
            match self.control_timestamp {
                Some(ts) if now.saturating_duration_since(ts) < self.config.guard => {
                    Err(DropReason::GuardWindow)
                }
                _ => Ok(()),
            }
        };
        match verdict {
            Ok(()) => true,
            Err(reason) => {
                debug!("Dropped frame {} ({:?})", frame, reason);
                self.stats.dropped += 1;
                self.events.push_back(PlayerEvent::FrameDropped { frame, reason });
                false
            }
        }
    }

    fn on_frame_data(&mut self, frame: u32, slave_id: i32, b64: &str, now: Instant) {
        let buf = match decode_rgbw(b64) {
            Ok(b) => b,
            Err(e) => return self.decode_failed(frame, e, now),
        };
        let buffers = if slave_id < 0 {
            let (parts, err) = split_merged(&buf, &self.pixel_counts);
            if let Some(e) = err {
                return self.decode_failed(frame, e, now);
            }
            parts
        } else {
            vec![(slave_id, buf)]
        };
        self.accept(frame, buffers, now);
    }

    fn on_frame_data_all(&mut self, frame: u32, slaves: &[SlaveFrame], now: Instant) {
        let mut buffers = Vec::with_capacity(slaves.len());
        for s in slaves {
            match decode_rgbw(&s.rgbw_b64) {
                Ok(b) => buffers.push((s.slave_id, b)),
                Err(e) => return self.decode_failed(frame, e, now),
            }
        }
        self.accept(frame, buffers, now);
    }

    fn accept(&mut self, frame: u32, buffers: Vec<(i32, RgbwBuffer)>, now: Instant) {
        for (id, buf) in &buffers {
            self.cache.put(Scope::Slave(*id), frame, RgbwBuffer::clone(buf));
        }
        self.view.update(frame, buffers);
        self.set_current(frame);
        if self.requested == Some(frame) {
            self.requested = None;
        }
        self.stats.record_frame(now);
        self.events.push_back(PlayerEvent::FrameShown {
            frame,
            from_cache: false,
        });

        self.continue_pull(frame, now);
    }

    /// Pull pacing: queue the frame after `frame`, whether it was shown or skipped
    fn continue_pull(&mut self, frame: u32, now: Instant) {
        if self.pacing == Pacing::Pull && self.state == PlaybackState::Playing {
            self.schedule_next_pull(frame, now);
        }
    }

    fn schedule_next_pull(&mut self, frame: u32, now: Instant) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if let Some((requested, at)) = self.last_request {
            if requested == frame {
                self.stats.last_latency = Some(now.saturating_duration_since(at));
            }
        }
        let latency = self.stats.last_latency.unwrap_or_default();
        let delay = session
            .frame_interval()
            .saturating_sub(latency)
            .max(Duration::from_millis(1));
        let next = session.next_frame(frame);
        trace!("Next pull: frame {} in {:?}", next, delay);
        self.pull.schedule_in(next, now, delay);
    }

    fn decode_failed(&mut self, frame: u32, err: PlayerError, now: Instant) {
        warn!("Frame {} skipped: {}", frame, err);
        self.stats.decode_errors += 1;
        if self.requested == Some(frame) {
            self.requested = None;
        }
        self.events.push_back(PlayerEvent::DecodeFailed(err));
        self.continue_pull(frame, now);
    }

    // --- helpers ---------------------------------------------------------

    fn request_frame(&mut self, frame: u32, scope: Scope, now: Instant) -> PlayerResult<()> {
        self.conn.send(&ClientMessage::PlaybackGetFrame {
            frame,
            slave_id: scope.to_wire(),
        })?;
        self.should_accept_frames = true;
        self.requested = Some(frame);
        self.last_request = Some((frame, now));
        Ok(())
    }

    fn show_cached(&mut self, scope: Scope, frame: u32) -> bool {
        let ids: Vec<i32> = match scope {
            Scope::Slave(id) => vec![id],
            Scope::All => self.pixel_counts.iter().map(|(id, _)| *id).collect(),
        };
        if !self.cache.contains_all(&ids, frame) {
            return false;
        }
        let mut buffers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(buf) = self.cache.get(Scope::Slave(id), frame) {
                buffers.push((id, buf));
            }
        }
        self.view.update(frame, buffers);
        true
    }

    /// Shared tail of pause/stop
    fn halt(&mut self, now: Instant) {
        self.should_accept_frames = false;
        self.server_playing = false;
        self.requested = None;
        self.control_timestamp = Some(now);
        self.pull.cancel();
    }

    fn set_current(&mut self, frame: u32) {
        if let Some(s) = self.session.as_mut() {
            s.current_frame = frame;
        }
    }

    fn require_session(&self, op: &'static str) -> PlayerResult<Scope> {
        if self.state == PlaybackState::Disconnected {
            return Err(PlayerError::NotConnected);
        }
        match (&self.session, self.state.has_session()) {
            (Some(s), true) => Ok(s.scope),
            _ => Err(self.invalid(op)),
        }
    }

    fn invalid(&self, op: &'static str) -> PlayerError {
        PlayerError::InvalidState {
            op,
            state: self.state.name(),
        }
    }

    fn reset_session(&mut self) {
        self.session = None;
        self.pending_init = None;
        self.cache_owner = None;
        self.cache.clear();
        self.view.clear();
        self.should_accept_frames = false;
        self.server_playing = false;
        self.control_timestamp = None;
        self.requested = None;
        self.last_request = None;
        self.stats = PlaybackStats::default();
    }

    fn to_disconnected(&mut self, reason: String) {
        info!("Playback disconnected: {}", reason);
        self.pull.cancel();
        self.reset_session();
        self.state = PlaybackState::Disconnected;
        self.events.push_back(PlayerEvent::Disconnected(reason));
    }
}

fn slave_filter(scope: Scope) -> Option<i32> {
    match scope {
        Scope::All => None,
        Scope::Slave(id) => Some(id),
    }
}
