//! REST API implementation using rouille.
//!
//! GET endpoints read [`SharedApiState`] snapshots published by the app
//! loop; POST endpoints turn into [`ApiCommand`]s sent over a channel.
//! CORS headers are added to every response for browser access.

use rouille::{Request, Response};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, mpsc};
use std::thread;

/// Commands sent from API handlers to the app loop
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCommand {
    Play,
    Pause,
    Stop,
    /// Seek to a frame
    SetFrame(u32),
    /// Slave id, or -1 for the board view
    View(i32),
    /// Board cell (board view) or slave cell (single view)
    Pick { x: i32, y: i32 },
    /// Edit the picked cell
    Apply { pxld_id: i32, mcu_id: i32 },
    /// Persist all mappings
    SaveMapping,
    /// Auto-arrange and persist the layout
    ArrangeLayout,
    /// Write a PNG of the current view
    Snapshot(Option<String>),
}

/// Playback state snapshot for API responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub state: String,
    pub frame: u32,
    pub total_frames: u32,
    pub fps: f64,
    pub measured_fps: Option<f64>,
    pub playing: bool,
    pub connected: bool,
    pub via_fallback: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlaveSnapshot {
    pub slave_id: i32,
    pub pixel_count: u32,
    pub ox: i32,
    pub oy: i32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PickSnapshot {
    pub slave_id: i32,
    pub x: u32,
    pub y: u32,
    pub pxld_id: i32,
    pub mcu_id: i32,
}

/// Board state snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub name: String,
    pub grid_w: u32,
    pub grid_h: u32,
    /// -1 in board view
    pub view: i32,
    pub slaves: Vec<SlaveSnapshot>,
    pub picked: Option<PickSnapshot>,
    pub overlaps: usize,
}

/// Frame cache stats for API responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Full status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub player: PlayerSnapshot,
    pub board: BoardSnapshot,
    pub cache: CacheSnapshot,
    pub status: Option<String>,
}

/// Shared state readable by API handlers (updated by the app loop)
#[derive(Default)]
pub struct SharedApiState {
    pub player: RwLock<PlayerSnapshot>,
    pub board: RwLock<BoardSnapshot>,
    pub cache: RwLock<CacheSnapshot>,
    pub status: RwLock<Option<String>>,
}

impl SharedApiState {
    fn status_response(&self) -> StatusResponse {
        StatusResponse {
            player: self.player.read().unwrap_or_else(|e| e.into_inner()).clone(),
            board: self.board.read().unwrap_or_else(|e| e.into_inner()).clone(),
            cache: self.cache.read().unwrap_or_else(|e| e.into_inner()).clone(),
            status: self.status.read().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PickRequest {
    x: i32,
    y: i32,
}

#[derive(Debug, Deserialize)]
struct ApplyRequest {
    pxld_id: i32,
    mcu_id: i32,
}

/// Generic API response
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn ok() -> Self {
        Self { success: true, message: None, error: None }
    }

    fn ok_msg(msg: &str) -> Self {
        Self { success: true, message: Some(msg.to_string()), error: None }
    }

    fn err(msg: &str) -> Self {
        Self { success: false, message: None, error: Some(msg.to_string()) }
    }
}

/// REST API server
pub struct ApiServer;

impl ApiServer {
    /// Bind and serve in a background thread. Returns the command receiver
    /// for the app loop to poll.
    pub fn start(port: u16, state: Arc<SharedApiState>) -> anyhow::Result<mpsc::Receiver<ApiCommand>> {
        let (tx, rx) = mpsc::channel();
        let addr = format!("127.0.0.1:{}", port);
        let server = rouille::Server::new(&addr, move |request| Self::handle_request(request, &state, &tx))
            .map_err(|e| anyhow::anyhow!("Failed to bind control endpoint on {}: {}", addr, e))?;
        log::info!("Control endpoint listening on http://{}", server.server_addr());

        thread::Builder::new()
            .name("pxld-control".into())
            .spawn(move || server.run())?;
        Ok(rx)
    }

    pub(crate) fn handle_request(
        request: &Request,
        state: &SharedApiState,
        tx: &mpsc::Sender<ApiCommand>,
    ) -> Response {
        if request.method() == "OPTIONS" {
            return Response::empty_204()
                .with_additional_header("Access-Control-Allow-Origin", "*")
                .with_additional_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
                .with_additional_header("Access-Control-Allow-Headers", "Content-Type");
        }

        // Path parameters are parsed by hand
        let path = request.url();
        if request.method() == "POST" {
            if let Some(n) = path.strip_prefix("/api/player/frame/") {
                return match n.parse::<u32>() {
                    Ok(frame) => Self::send_command(tx, ApiCommand::SetFrame(frame)),
                    Err(_) => Response::json(&ApiResponse::err("Invalid frame number")).with_status_code(400),
                }
                .with_additional_header("Access-Control-Allow-Origin", "*");
            }
            if let Some(id) = path.strip_prefix("/api/view/") {
                return match id.parse::<i32>() {
                    Ok(id) => Self::send_command(tx, ApiCommand::View(id)),
                    Err(_) => Response::json(&ApiResponse::err("Invalid slave id")).with_status_code(400),
                }
                .with_additional_header("Access-Control-Allow-Origin", "*");
            }
        }

        let response = rouille::router!(request,
            (GET) ["/api/status"] => {
                Response::json(&state.status_response())
            },
            (GET) ["/api/health"] => {
                Response::json(&ApiResponse::ok_msg("pxld-player control endpoint"))
            },

            (POST) ["/api/player/play"] => {
                Self::send_command(tx, ApiCommand::Play)
            },
            (POST) ["/api/player/pause"] => {
                Self::send_command(tx, ApiCommand::Pause)
            },
            (POST) ["/api/player/stop"] => {
                Self::send_command(tx, ApiCommand::Stop)
            },
            (POST) ["/api/player/frame"] => {
                Response::json(&ApiResponse::err("Missing frame number")).with_status_code(400)
            },

            (POST) ["/api/pick"] => {
                match rouille::input::json_input::<PickRequest>(request) {
                    Ok(p) => Self::send_command(tx, ApiCommand::Pick { x: p.x, y: p.y }),
                    Err(e) => Self::bad_json(e),
                }
            },
            (POST) ["/api/mapping/apply"] => {
                match rouille::input::json_input::<ApplyRequest>(request) {
                    Ok(a) => Self::send_command(tx, ApiCommand::Apply { pxld_id: a.pxld_id, mcu_id: a.mcu_id }),
                    Err(e) => Self::bad_json(e),
                }
            },
            (POST) ["/api/mapping/save"] => {
                Self::send_command(tx, ApiCommand::SaveMapping)
            },
            (POST) ["/api/layout/arrange"] => {
                Self::send_command(tx, ApiCommand::ArrangeLayout)
            },
            (POST) ["/api/snapshot"] => {
                Self::send_command(tx, ApiCommand::Snapshot(request.get_param("path")))
            },

            _ => {
                Response::json(&ApiResponse::err("Not found")).with_status_code(404)
            }
        );

        response.with_additional_header("Access-Control-Allow-Origin", "*")
    }

    fn send_command(tx: &mpsc::Sender<ApiCommand>, cmd: ApiCommand) -> Response {
        match tx.send(cmd) {
            Ok(_) => Response::json(&ApiResponse::ok()),
            Err(e) => Response::json(&ApiResponse::err(&format!("Failed to send command: {}", e)))
                .with_status_code(500),
        }
    }

    fn bad_json(e: rouille::input::json::JsonError) -> Response {
        Response::json(&ApiResponse::err(&format!("Invalid JSON: {}", e))).with_status_code(400)
    }
}
