//! Blocking client for the PXLD HTTP JSON API.
//!
//! Every response is an envelope `{ok, ...}`; `ok:false` carries the reason
//! in `err` (or `message`) and becomes [`PlayerError::Api`]. Callers decide
//! what to do with a failure; nothing here mutates board state.

use std::time::Duration;

use log::{debug, trace};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{PlayerError, PlayerResult};
use super::layout::Placement;
use super::mapping::MapPoint;
use super::session::Slave;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/light/api/";

/// `pxld/info` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PxldInfo {
    pub fps: f64,
    pub total_frames: u32,
    pub total_slaves: u32,
    pub total_pixels: u32,
    pub magic: String,
    pub version: u32,
    pub udp_port: u16,
    pub crc32_ok: bool,
}

/// `pxld/slaves` item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaveInfo {
    pub slave_id: i32,
    pub pixel_count: u32,
    pub data_length: u32,
    pub valid_bounds: bool,
}

impl SlaveInfo {
    pub fn slave(&self) -> Slave {
        Slave {
            id: self.slave_id,
            pixel_count: self.pixel_count,
        }
    }
}

/// One slave's buffer from `pxld/all_slaves_rgbw`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveRgbw {
    pub slave_id: i32,
    pub rgbw_b64: String,
}

/// Persisted mapping of one slave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDoc {
    #[serde(default = "mapping_version")]
    pub version: u32,
    pub slave_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ox: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oy: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
    #[serde(default)]
    pub map: Vec<MapPoint>,
}

pub const MAPPING_VERSION: u32 = 2;

fn mapping_version() -> u32 {
    MAPPING_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct MappingBatch<'a> {
    batch: bool,
    mappings: &'a [MappingDoc],
}

/// Board layout document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDoc {
    #[serde(default = "layout_version")]
    pub version: u32,
    #[serde(default)]
    pub layout: Vec<Placement>,
}

fn layout_version() -> u32 {
    1
}

impl LayoutDoc {
    pub fn new(layout: Vec<Placement>) -> Self {
        Self { version: 1, layout }
    }
}

/// HTTP API surface consumed by the player
pub trait PxldApi: Send + Sync {
    fn info(&self, name: &str) -> PlayerResult<PxldInfo>;
    fn slaves(&self, name: &str) -> PlayerResult<Vec<SlaveInfo>>;
    /// base64 RGBW of one slave
    fn slave_frame(&self, name: &str, frame: u32, slave_id: i32) -> PlayerResult<String>;
    fn all_slaves_frame(&self, name: &str, frame: u32) -> PlayerResult<Vec<SlaveRgbw>>;
    /// None when the server has no mapping stored for the slave
    fn get_mapping(&self, slave_id: i32) -> PlayerResult<Option<MappingDoc>>;
    fn set_mapping(&self, doc: &MappingDoc) -> PlayerResult<()>;
    fn set_mappings_batch(&self, docs: &[MappingDoc]) -> PlayerResult<()>;
    fn get_layout(&self) -> PlayerResult<LayoutDoc>;
    fn set_layout(&self, doc: &LayoutDoc) -> PlayerResult<()>;
}

/// `reqwest::blocking` implementation
#[derive(Debug, Clone)]
pub struct HttpApi {
    base: String,
    client: reqwest::blocking::Client,
}

impl HttpApi {
    pub fn new(base: &str, timeout: Duration) -> PlayerResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlayerError::Api(e.to_string()))?;
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        debug!("HttpApi base: {}", base);
        Ok(Self { base, client })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> PlayerResult<Value> {
        trace!("GET {} {:?}", path, query);
        let resp = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .map_err(|e| PlayerError::Api(format!("GET {}: {}", path, e)))?;
        read_envelope(path, resp)
    }

    fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> PlayerResult<Value> {
        trace!("POST {}", path);
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .map_err(|e| PlayerError::Api(format!("POST {}: {}", path, e)))?;
        read_envelope(path, resp)
    }
}

fn read_envelope(path: &str, resp: reqwest::blocking::Response) -> PlayerResult<Value> {
    let status = resp.status();
    let body: Value = resp
        .json()
        .map_err(|e| PlayerError::Api(format!("{} ({}): {}", path, status, e)))?;
    check_ok(body)
}

/// Unwrap an `{ok, ...}` envelope
pub fn check_ok(body: Value) -> PlayerResult<Value> {
    if body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(body);
    }
    let msg = body
        .get("err")
        .or_else(|| body.get("message"))
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("request failed")
        .to_string();
    Err(PlayerError::Api(msg))
}

/// Deserialize one field of an envelope
pub fn field<T: DeserializeOwned>(body: &Value, key: &str) -> PlayerResult<T> {
    let v = body
        .get(key)
        .cloned()
        .ok_or_else(|| PlayerError::Api(format!("response missing '{}'", key)))?;
    serde_json::from_value(v).map_err(|e| PlayerError::Api(format!("bad '{}': {}", key, e)))
}

impl PxldApi for HttpApi {
    fn info(&self, name: &str) -> PlayerResult<PxldInfo> {
        let body = self.get("pxld/info/", &[("name", name.to_string())])?;
        field(&body, "info")
    }

    fn slaves(&self, name: &str) -> PlayerResult<Vec<SlaveInfo>> {
        let body = self.get("pxld/slaves/", &[("name", name.to_string())])?;
        field(&body, "slaves")
    }

    fn slave_frame(&self, name: &str, frame: u32, slave_id: i32) -> PlayerResult<String> {
        let body = self.get(
            "pxld/slave_frame_rgbw/",
            &[
                ("name", name.to_string()),
                ("frame", frame.to_string()),
                ("slave_id", slave_id.to_string()),
            ],
        )?;
        field(&body, "b64")
    }

    fn all_slaves_frame(&self, name: &str, frame: u32) -> PlayerResult<Vec<SlaveRgbw>> {
        let body = self.get(
            "pxld/all_slaves_rgbw/",
            &[("name", name.to_string()), ("frame", frame.to_string())],
        )?;
        field(&body, "data")
    }

    fn get_mapping(&self, slave_id: i32) -> PlayerResult<Option<MappingDoc>> {
        let body = self.get("mapping/get/", &[("slave_id", slave_id.to_string())])?;
        match body.get("data") {
            None | Some(Value::Null) => Ok(None),
            Some(_) => field(&body, "data").map(Some),
        }
    }

    fn set_mapping(&self, doc: &MappingDoc) -> PlayerResult<()> {
        self.post("mapping/set/", doc).map(|_| ())
    }

    fn set_mappings_batch(&self, docs: &[MappingDoc]) -> PlayerResult<()> {
        let batch = MappingBatch {
            batch: true,
            mappings: docs,
        };
        self.post("mapping/set/", &batch).map(|_| ())
    }

    fn get_layout(&self) -> PlayerResult<LayoutDoc> {
        let body = self.get("layout/get/", &[])?;
        match body.get("data") {
            None | Some(Value::Null) => Ok(LayoutDoc::default()),
            Some(_) => field(&body, "data"),
        }
    }

    fn set_layout(&self, doc: &LayoutDoc) -> PlayerResult<()> {
        self.post("layout/set/", doc).map(|_| ())
    }
}
