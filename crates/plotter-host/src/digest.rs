//! The flattened document digest consumed by the orchestrator, plus the
//! layer-name control-escape parser.
//!
//! A digest is an ordered list of layers, each an ordered list of paths,
//! each path a polyline of (x, y) points in inches, device space. It is
//! produced by an external digester (or loaded from its JSON "plob"
//! form) and consumed read-only during plotting.

use motion::XyPoint;
use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Version tag of the pre-flattened checkpointable digest format.
pub const PLOB_VERSION: &str = "2.1";

/// One polyline to draw in a single pen-down pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathItem {
    /// Vertices in inches; a drawable path has at least two.
    pub vertices: Vec<[f64; 2]>,
}

impl PathItem {
    pub fn points(&self) -> Vec<XyPoint> {
        self.vertices.iter().map(|v| XyPoint::new(v[0], v[1])).collect()
    }
}

/// A named group of paths. The name may carry control escapes; see
/// [`LayerProps`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub name: String,
    pub paths: Vec<PathItem>,
}

/// The full flattened document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocDigest {
    #[serde(default)]
    pub name: String,
    /// Document dimensions, inches.
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_plob_version")]
    pub plob_version: String,
    pub layers: Vec<Layer>,
}

fn default_plob_version() -> String {
    PLOB_VERSION.to_string()
}

impl DocDigest {
    /// Parse the JSON plob form, rejecting digests with non-finite
    /// dimensions.
    pub fn from_json(text: &str) -> Result<Self, HostError> {
        let digest: DocDigest =
            serde_json::from_str(text).map_err(|e| HostError::Digest(e.to_string()))?;
        if !digest.width.is_finite() || !digest.height.is_finite() || digest.width <= 0.0
            || digest.height <= 0.0
        {
            return Err(HostError::Digest("document dimensions are not valid".into()));
        }
        Ok(digest)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("digest serialization cannot fail")
    }
}

/// A single control override decoded from a layer name.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LayerOverride {
    /// `+h<int>`: temporary pen-down height, percent (0-100).
    Height(u32),
    /// `+s<int>`: temporary pen-down speed, percent (1-110).
    Speed(u32),
    /// `+d<int>`: delay before plotting the layer, ms.
    Delay(u32),
}

/// Decoded control escapes from one layer name.
///
/// Grammar: optional leading `!` (programmatic pause), then an optional
/// integer (the layer number used by layer-filtering modes), then zero or
/// more `+h<int>` / `+s<int>` / `+d<int>` codes. Scanning stops at the
/// first text that is not an escape code, so display text may follow.
/// Out-of-range values are dropped during parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerProps {
    pub pause: bool,
    pub layer_number: Option<u32>,
    pub overrides: Vec<LayerOverride>,
}

impl LayerProps {
    pub fn parse(name: &str) -> Self {
        let mut props = LayerProps::default();
        let mut rest = name.trim_start();

        if let Some(stripped) = rest.strip_prefix('!') {
            props.pause = true;
            rest = stripped;
        }

        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            props.layer_number = digits.parse().ok();
            rest = &rest[digits.len()..];
        }

        // Escape codes must follow the layer number immediately; anything
        // else ends the scan.
        loop {
            let Some(code) = rest.get(..2) else { break };
            let key = code.to_ascii_lowercase();
            if !matches!(key.as_str(), "+h" | "+s" | "+d") {
                break;
            }
            rest = &rest[2..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            rest = &rest[digits.len()..];
            let Ok(value) = digits.parse::<u32>() else { break };
            match key.as_str() {
                "+h" if value <= 100 => props.overrides.push(LayerOverride::Height(value)),
                "+s" if (1..=110).contains(&value) => {
                    props.overrides.push(LayerOverride::Speed(value))
                }
                "+d" if value > 0 => props.overrides.push(LayerOverride::Delay(value)),
                _ => {} // out of range: ignored, scanning continues
            }
        }

        props
    }
}
