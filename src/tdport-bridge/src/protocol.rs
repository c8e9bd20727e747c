//! Line-delimited JSON messages exchanged with the helper.
//!
//! Requests carry an `id` and an `op` plus the operation's parameters:
//!
//! ```text
//! {"id":1,"op":"load","tdata":"/accounts/+1555/tdata","legacy":false}
//! {"id":1,"ok":true,"result":{"loaded":true,"accounts":[{"user_id":42}]}}
//! ```
//!
//! A failed request answers `{"id":1,"ok":false,"error":"..."}`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tdport_batch::{AccountInfo, SessionFlag};

/// One request line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub op: Operation,
}

/// Operations understood by the helper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Load { tdata: PathBuf, legacy: bool },
    Convert { session: PathBuf, flag: SessionFlag },
    Connect,
    IsAuthorized,
    GetMe,
    Disconnect,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Load { .. } => "load",
            Self::Convert { .. } => "convert",
            Self::Connect => "connect",
            Self::IsAuthorized => "is_authorized",
            Self::GetMe => "get_me",
            Self::Disconnect => "disconnect",
        }
    }
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of `load`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LoadResult {
    pub loaded: bool,
    #[serde(default)]
    pub accounts: Vec<AccountInfo>,
}

/// Result of `is_authorized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AuthorizedResult {
    pub authorized: bool,
}
