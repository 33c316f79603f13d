//! Checkpoint persistence: progress scalars written into a well-known
//! node of the caller's document, sufficient to resume a paused plot.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Key of the checkpoint node inside the caller's document.
pub const PLOTDATA_TAG: &str = "plotdata";

fn default_randseed() -> i64 {
    1
}

/// The persisted progress record. Coordinates are inches, relative to
/// the first-point offset of the plot they belong to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub application: String,
    pub model: String,
    pub plob_version: String,
    /// Layer selector in effect: -1 all layers, -2 completed plot.
    pub layer: i32,
    /// Pause/resume node counter at the time of writing.
    pub node: u64,
    /// Ordinal of the last fully plotted path.
    pub last_path: u32,
    /// Node counter recorded after that path completed.
    pub node_after_path: u64,
    pub last_known_x: f64,
    pub last_known_y: f64,
    pub paused_x: f64,
    pub paused_y: f64,
    #[serde(default)]
    pub row: i32,
    #[serde(default = "default_randseed")]
    pub randseed: i64,
    /// Unix timestamp at write time.
    #[serde(default)]
    pub id: u64,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            application: "plotter-host".to_string(),
            model: String::new(),
            plob_version: String::new(),
            layer: 0,
            node: 0,
            last_path: 0,
            node_after_path: 0,
            last_known_x: 0.0,
            last_known_y: 0.0,
            paused_x: 0.0,
            paused_y: 0.0,
            row: 0,
            randseed: 1,
            id: 0,
        }
    }
}

impl Checkpoint {
    /// Read the checkpoint node from a document, if present. Any type
    /// error in a mandatory field discards the entire record; the two
    /// optional fields (`row`, `randseed`) fall back to defaults.
    pub fn read_from(doc: &Value) -> Option<Checkpoint> {
        let node = doc.get(PLOTDATA_TAG)?;
        match serde_json::from_value(node.clone()) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                debug!("discarding malformed checkpoint record: {e}");
                None
            }
        }
    }

    /// Write this record into the document, replacing any previous one
    /// and stamping the write time.
    pub fn write_into(&self, doc: &mut Value) {
        let mut stamped = self.clone();
        stamped.id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if let Value::Object(map) = doc {
            map.insert(
                PLOTDATA_TAG.to_string(),
                serde_json::to_value(&stamped).expect("checkpoint serialization cannot fail"),
            );
        }
    }
}
