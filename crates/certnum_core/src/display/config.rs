//! Typed element configuration and its JSON blob encoding.
//!
//! The blob shape is `{"display": 1}`; `1` selects the allocated number.
//! Anything else decodes to pass-through of the issue code.

use log::warn;
use serde::Deserialize;
use serde_json::Value;

/// Persisted tag for [`DisplayMode::ShowAllocatedNumber`].
pub const DISPLAY_CERTIFICATE_NUMBER: i64 = 1;

/// Enumerated display modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisplayMode {
    /// Show the sequence number, allocating it on first render.
    ShowAllocatedNumber,
}

impl DisplayMode {
    pub fn tag(self) -> i64 {
        match self {
            Self::ShowAllocatedNumber => DISPLAY_CERTIFICATE_NUMBER,
        }
    }

    pub fn from_tag(tag: i64) -> Option<Self> {
        match tag {
            DISPLAY_CERTIFICATE_NUMBER => Some(Self::ShowAllocatedNumber),
            _ => None,
        }
    }
}

/// Element configuration. `mode == None` passes the issue code through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayConfig {
    pub mode: Option<DisplayMode>,
}

#[derive(Debug, Deserialize)]
struct ElementData {
    #[serde(default)]
    display: Option<Value>,
}

impl DisplayConfig {
    pub fn show_allocated_number() -> Self {
        Self {
            mode: Some(DisplayMode::ShowAllocatedNumber),
        }
    }

    /// Decodes a persisted blob. Never fails: absent, malformed or unknown
    /// values fall back to pass-through.
    pub fn from_json(blob: Option<&str>) -> Self {
        let Some(blob) = blob.map(str::trim).filter(|value| !value.is_empty()) else {
            return Self::default();
        };

        let data: ElementData = match serde_json::from_str(blob) {
            Ok(data) => data,
            Err(err) => {
                warn!(
                    "event=display_config_decode module=display status=error error_code=invalid_json error={}",
                    err
                );
                return Self::default();
            }
        };

        let mode = data.display.as_ref().and_then(parse_tag).and_then(DisplayMode::from_tag);
        if mode.is_none() && data.display.is_some() {
            warn!("event=display_config_decode module=display status=fallback reason=unknown_mode");
        }
        Self { mode }
    }

    /// Encodes to the persisted blob shape.
    pub fn to_json(&self) -> String {
        match self.mode {
            Some(mode) => serde_json::json!({ "display": mode.tag() }).to_string(),
            None => "{}".to_string(),
        }
    }
}

// Form posts may deliver the tag as a string.
fn parse_tag(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
