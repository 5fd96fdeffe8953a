//! HTTP polling transport.
//!
//! Used when the stream endpoint is unreachable. A worker thread answers each
//! client message by calling [`PxldApi`] and replies with the same server
//! message shapes the stream would send, so the controller cannot tell the
//! two apart except by [`Pacing::Pull`].

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error, info, warn};

use super::api::PxldApi;
use super::connection::{Connector, Pacing, Transport, TransportEvent};
use super::error::{PlayerError, PlayerResult};
use super::protocol::{ClientMessage, ServerMessage, SlaveFrame};
use super::session::Scope;

pub struct HttpConnector {
    api: Arc<dyn PxldApi>,
}

impl HttpConnector {
    pub fn new(api: Arc<dyn PxldApi>) -> Self {
        Self { api }
    }
}

impl Connector for HttpConnector {
    fn open(&self, identity: &str) -> PlayerResult<(Box<dyn Transport>, Receiver<TransportEvent>)> {
        let (cmd_tx, cmd_rx) = unbounded::<ClientMessage>();
        let (ev_tx, ev_rx) = unbounded::<TransportEvent>();
        let api = Arc::clone(&self.api);
        let thread = std::thread::Builder::new()
            .name("pxld-http-poll".into())
            .spawn(move || {
                let mut worker = PollWorker::new(api);
                for msg in cmd_rx.iter() {
                    let Some(reply) = worker.answer(msg) else {
                        continue;
                    };
                    let text = match reply.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("HTTP poll: {}", e);
                            continue;
                        }
                    };
                    if ev_tx.send(TransportEvent::Text(text)).is_err() {
                        break;
                    }
                }
                debug!("HTTP poll worker exit");
            })
            .map_err(|e| PlayerError::Transport(e.to_string()))?;
        info!("HTTP polling transport opened for {}", identity);
        let transport = HttpTransport {
            commands: Some(cmd_tx),
            thread: Some(thread),
        };
        Ok((Box::new(transport), ev_rx))
    }

    fn label(&self) -> &str {
        "http-poll"
    }
}

pub struct HttpTransport {
    commands: Option<Sender<ClientMessage>>,
    thread: Option<JoinHandle<()>>,
}

impl Transport for HttpTransport {
    fn send(&mut self, msg: &ClientMessage) -> PlayerResult<()> {
        let tx = self.commands.as_ref().ok_or(PlayerError::NotConnected)?;
        tx.send(msg.clone())
            .map_err(|_| PlayerError::Transport("HTTP poll worker gone".into()))
    }

    fn close(&mut self) {
        // Dropping the sender ends the worker's receive loop
        self.commands = None;
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("HTTP poll worker panicked");
            }
        }
    }

    fn pacing(&self) -> Pacing {
        Pacing::Pull
    }

    fn label(&self) -> &str {
        "http-poll"
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Synthesizes server replies from HTTP calls
struct PollWorker {
    api: Arc<dyn PxldApi>,
    session: Option<(String, Scope)>,
    frame: u32,
}

impl PollWorker {
    fn new(api: Arc<dyn PxldApi>) -> Self {
        Self {
            api,
            session: None,
            frame: 0,
        }
    }

    fn answer(&mut self, msg: ClientMessage) -> Option<ServerMessage> {
        match msg {
            ClientMessage::PlaybackInit { filename, slave_id } => Some(match self.api.info(&filename) {
                Ok(info) => {
                    self.session = Some((filename, Scope::from_wire(slave_id)));
                    self.frame = 0;
                    ServerMessage::PlaybackReady {
                        total_frames: info.total_frames,
                        fps: info.fps,
                        slave_ids: None,
                    }
                }
                Err(e) => ServerMessage::PlaybackError { message: e.to_string() },
            }),
            ClientMessage::PlaybackPlay { frame, .. } => {
                self.frame = frame;
                Some(ServerMessage::PlaybackStarted { frame })
            }
            ClientMessage::PlaybackPause {} => Some(ServerMessage::PlaybackPaused { frame: self.frame }),
            ClientMessage::PlaybackStop {} => {
                self.frame = 0;
                Some(ServerMessage::PlaybackStopped {})
            }
            ClientMessage::PlaybackSeek { frame, slave_id } => {
                let scope = slave_id.map(Scope::from_wire);
                Some(self.fetch(frame, scope))
            }
            ClientMessage::PlaybackGetFrame { frame, slave_id } => {
                Some(self.fetch(frame, Some(Scope::from_wire(slave_id))))
            }
        }
    }

    fn fetch(&mut self, frame: u32, scope: Option<Scope>) -> ServerMessage {
        let Some((name, session_scope)) = &self.session else {
            warn!("HTTP poll: frame {} requested before init", frame);
            return ServerMessage::PlaybackError {
                message: "playback not initialized".into(),
            };
        };
        self.frame = frame;
        let result = match scope.unwrap_or(*session_scope) {
            Scope::Slave(id) => self
                .api
                .slave_frame(name, frame, id)
                .map(|rgbw_b64| ServerMessage::FrameData {
                    frame,
                    slave_id: id,
                    rgbw_b64,
                }),
            Scope::All => self.api.all_slaves_frame(name, frame).map(|data| ServerMessage::FrameDataAll {
                frame,
                slaves: data
                    .into_iter()
                    .map(|s| SlaveFrame {
                        slave_id: s.slave_id,
                        rgbw_b64: s.rgbw_b64,
                        pixel_count: None,
                    })
                    .collect(),
            }),
        };
        result.unwrap_or_else(|e| ServerMessage::PlaybackError { message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loopback::MockApi;
    use std::time::Duration;

    fn recv(rx: &Receiver<TransportEvent>) -> ServerMessage {
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            TransportEvent::Text(t) => ServerMessage::parse(&t).unwrap(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_init_play_fetch() {
        let api = Arc::new(MockApi::with_two_slaves());
        let connector = HttpConnector::new(api);
        let (mut transport, rx) = connector.open("playback").unwrap();
        assert_eq!(transport.pacing(), Pacing::Pull);

        transport
            .send(&ClientMessage::PlaybackInit {
                filename: "show.pxld".into(),
                slave_id: -1,
            })
            .unwrap();
        assert_eq!(
            recv(&rx),
            ServerMessage::PlaybackReady {
                total_frames: 100,
                fps: 30.0,
                slave_ids: None
            }
        );

        transport.send(&ClientMessage::PlaybackPlay { frame: 0, slave_id: None }).unwrap();
        assert_eq!(recv(&rx), ServerMessage::PlaybackStarted { frame: 0 });

        transport
            .send(&ClientMessage::PlaybackGetFrame { frame: 3, slave_id: -1 })
            .unwrap();
        match recv(&rx) {
            ServerMessage::FrameDataAll { frame, slaves } => {
                assert_eq!(frame, 3);
                assert_eq!(slaves.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }

        transport
            .send(&ClientMessage::PlaybackGetFrame { frame: 3, slave_id: 2 })
            .unwrap();
        assert!(matches!(recv(&rx), ServerMessage::FrameData { slave_id: 2, .. }));

        transport.close();
    }

    #[test]
    fn test_fetch_before_init_is_error() {
        let api = Arc::new(MockApi::with_two_slaves());
        let (mut transport, rx) = HttpConnector::new(api).open("playback").unwrap();
        transport
            .send(&ClientMessage::PlaybackSeek { frame: 1, slave_id: None })
            .unwrap();
        assert!(matches!(recv(&rx), ServerMessage::PlaybackError { .. }));
    }
}
