//! In-memory transport and canned HTTP API for tests.
//!
//! The test plays the server through [`LoopbackServer`]: it pushes raw text
//! frames and inspects what the client sent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::api::{LayoutDoc, MappingDoc, PxldApi, PxldInfo, SlaveInfo, SlaveRgbw};
use super::connection::{Connector, Pacing, Transport, TransportEvent};
use super::error::{PlayerError, PlayerResult};
use super::protocol::{ClientMessage, ServerMessage, encode_rgbw};

#[derive(Default)]
struct LoopState {
    opened: usize,
    closed: usize,
    sent: Vec<ClientMessage>,
    refuse: Option<String>,
    events: Option<Sender<TransportEvent>>,
}

type Shared = Arc<Mutex<LoopState>>;

fn lock(state: &Shared) -> std::sync::MutexGuard<'_, LoopState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct LoopbackConnector {
    state: Shared,
    pacing: Pacing,
}

#[derive(Clone)]
pub struct LoopbackServer {
    state: Shared,
}

impl LoopbackConnector {
    pub fn new(pacing: Pacing) -> (Self, LoopbackServer) {
        let state: Shared = Arc::default();
        (
            Self {
                state: Arc::clone(&state),
                pacing,
            },
            LoopbackServer { state },
        )
    }

    /// Make every subsequent `open` fail
    pub fn refuse(&self, reason: &str) {
        lock(&self.state).refuse = Some(reason.to_string());
    }
}

impl Connector for LoopbackConnector {
    fn open(&self, _identity: &str) -> PlayerResult<(Box<dyn Transport>, Receiver<TransportEvent>)> {
        let mut st = lock(&self.state);
        if let Some(reason) = &st.refuse {
            return Err(PlayerError::Transport(reason.clone()));
        }
        let (tx, rx) = unbounded();
        st.opened += 1;
        st.events = Some(tx);
        let transport = LoopbackTransport {
            state: Arc::clone(&self.state),
            pacing: self.pacing,
            open: true,
        };
        Ok((Box::new(transport), rx))
    }

    fn label(&self) -> &str {
        "loopback"
    }
}

struct LoopbackTransport {
    state: Shared,
    pacing: Pacing,
    open: bool,
}

impl Transport for LoopbackTransport {
    fn send(&mut self, msg: &ClientMessage) -> PlayerResult<()> {
        if !self.open {
            return Err(PlayerError::Transport("closed".into()));
        }
        lock(&self.state).sent.push(msg.clone());
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            lock(&self.state).closed += 1;
        }
    }

    fn pacing(&self) -> Pacing {
        self.pacing
    }

    fn label(&self) -> &str {
        "loopback"
    }
}

impl LoopbackServer {
    pub fn push_text(&self, text: &str) {
        if let Some(tx) = &lock(&self.state).events {
            let _ = tx.send(TransportEvent::Text(text.to_string()));
        }
    }

    pub fn push(&self, msg: &ServerMessage) {
        let text = serde_json::to_string(msg).unwrap();
        self.push_text(&text);
    }

    pub fn drop_connection(&self, reason: &str) {
        if let Some(tx) = lock(&self.state).events.take() {
            let _ = tx.send(TransportEvent::Closed(reason.to_string()));
        }
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        lock(&self.state).sent.clone()
    }

    pub fn take_sent(&self) -> Vec<ClientMessage> {
        std::mem::take(&mut lock(&self.state).sent)
    }

    pub fn opened(&self) -> usize {
        lock(&self.state).opened
    }

    pub fn closed(&self) -> usize {
        lock(&self.state).closed
    }
}

// ---------------------------------------------------------------------------
// Mock HTTP API

/// Canned API: frames are `pixel_count * 4` bytes filled with the frame index
#[derive(Default)]
pub struct MockApi {
    pub info: PxldInfo,
    pub slaves: Vec<SlaveInfo>,
    pub mappings: Mutex<HashMap<i32, MappingDoc>>,
    pub layout: Mutex<LayoutDoc>,
    pub failing_mappings: HashSet<i32>,
    pub fail_posts: bool,
    pub posts: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn with_two_slaves() -> Self {
        Self {
            info: PxldInfo {
                fps: 30.0,
                total_frames: 100,
                total_slaves: 2,
                total_pixels: 6,
                ..PxldInfo::default()
            },
            slaves: vec![
                SlaveInfo {
                    slave_id: 1,
                    pixel_count: 4,
                    data_length: 16,
                    valid_bounds: true,
                },
                SlaveInfo {
                    slave_id: 2,
                    pixel_count: 2,
                    data_length: 8,
                    valid_bounds: true,
                },
            ],
            ..Self::default()
        }
    }

    fn pixels(&self, slave_id: i32) -> PlayerResult<u32> {
        self.slaves
            .iter()
            .find(|s| s.slave_id == slave_id)
            .map(|s| s.pixel_count)
            .ok_or_else(|| PlayerError::Api(format!("no slave {}", slave_id)))
    }

    fn post(&self, what: String) -> PlayerResult<()> {
        if self.fail_posts {
            return Err(PlayerError::Api("read-only".into()));
        }
        self.posts.lock().unwrap_or_else(|e| e.into_inner()).push(what);
        Ok(())
    }

    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl PxldApi for MockApi {
    fn info(&self, name: &str) -> PlayerResult<PxldInfo> {
        if name.is_empty() {
            return Err(PlayerError::Api("PXLD not found".into()));
        }
        Ok(self.info.clone())
    }

    fn slaves(&self, _name: &str) -> PlayerResult<Vec<SlaveInfo>> {
        Ok(self.slaves.clone())
    }

    fn slave_frame(&self, _name: &str, frame: u32, slave_id: i32) -> PlayerResult<String> {
        let n = self.pixels(slave_id)?;
        Ok(encode_rgbw(&vec![frame as u8; n as usize * 4]))
    }

    fn all_slaves_frame(&self, name: &str, frame: u32) -> PlayerResult<Vec<SlaveRgbw>> {
        self.slaves
            .iter()
            .map(|s| {
                Ok(SlaveRgbw {
                    slave_id: s.slave_id,
                    rgbw_b64: self.slave_frame(name, frame, s.slave_id)?,
                })
            })
            .collect()
    }

    fn get_mapping(&self, slave_id: i32) -> PlayerResult<Option<MappingDoc>> {
        if self.failing_mappings.contains(&slave_id) {
            return Err(PlayerError::Api("mapping store offline".into()));
        }
        Ok(self
            .mappings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&slave_id)
            .cloned())
    }

    fn set_mapping(&self, doc: &MappingDoc) -> PlayerResult<()> {
        self.post(format!("mapping {}", doc.slave_id))?;
        self.mappings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(doc.slave_id, doc.clone());
        Ok(())
    }

    fn set_mappings_batch(&self, docs: &[MappingDoc]) -> PlayerResult<()> {
        self.post(format!("batch {}", docs.len()))?;
        let mut store = self.mappings.lock().unwrap_or_else(|e| e.into_inner());
        for d in docs {
            store.insert(d.slave_id, d.clone());
        }
        Ok(())
    }

    fn get_layout(&self) -> PlayerResult<LayoutDoc> {
        Ok(self.layout.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn set_layout(&self, doc: &LayoutDoc) -> PlayerResult<()> {
        self.post(format!("layout {}", doc.layout.len()))?;
        *self.layout.lock().unwrap_or_else(|e| e.into_inner()) = doc.clone();
        Ok(())
    }
}
