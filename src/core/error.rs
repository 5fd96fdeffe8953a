//! Error taxonomy for the playback core.
//!
//! Nothing here is fatal to the process: every variant degrades to a visible
//! status message while the session keeps its previous good state.

/// Playback, mapping, transport and API errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// Stream could not be opened, or failed while in use
    Transport(String),
    /// Send attempted without an open connection
    NotConnected,
    /// No `playback_ready` arrived within the init bound
    InitTimeout { waited_ms: u64 },
    /// mcu_id already used by another cell of the same slave
    DuplicateMcuId {
        slave_id: i32,
        mcu_id: i32,
        taken_by: (u32, u32),
    },
    /// Slave id not present in the session
    UnknownSlave(i32),
    /// Local coordinate outside the slave's geometry
    OutOfBounds { slave_id: i32, x: u32, y: u32 },
    /// Malformed base64 or a pixel buffer that is not RGBW-aligned
    Decode(String),
    /// HTTP API answered `ok:false`, or the request itself failed
    Api(String),
    /// Message could not be serialized or parsed
    Protocol(String),
    /// Operation not valid in the current playback state
    InvalidState {
        op: &'static str,
        state: &'static str,
    },
}

impl std::fmt::Display for PlayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerError::Transport(msg) => write!(f, "Transport error: {}", msg),
            PlayerError::NotConnected => write!(f, "Not connected to playback server"),
            PlayerError::InitTimeout { waited_ms } => {
                write!(f, "Playback init timed out after {} ms", waited_ms)
            }
            PlayerError::DuplicateMcuId {
                slave_id,
                mcu_id,
                taken_by,
            } => write!(
                f,
                "mcu_id {} already used by slave {} cell ({},{}); pick another value or -1",
                mcu_id, slave_id, taken_by.0, taken_by.1
            ),
            PlayerError::UnknownSlave(id) => write!(f, "Unknown slave {}", id),
            PlayerError::OutOfBounds { slave_id, x, y } => {
                write!(f, "Cell ({},{}) is outside slave {}", x, y, slave_id)
            }
            PlayerError::Decode(msg) => write!(f, "Frame decode failed: {}", msg),
            PlayerError::Api(msg) => write!(f, "API error: {}", msg),
            PlayerError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            PlayerError::InvalidState { op, state } => {
                write!(f, "Cannot {} while {}", op, state)
            }
        }
    }
}

impl std::error::Error for PlayerError {}

pub type PlayerResult<T> = Result<T, PlayerError>;
