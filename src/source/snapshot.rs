// Initial-state snapshot document and the loader that tolerates its absence.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use super::file_source::FileSnapshot;
use super::http_source::HttpSnapshot;
use super::traits::SnapshotSource;
use crate::model::FrameDims;

/// JSON snapshot of a full context window. Missing shape fields default to the store's own.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitialState {
    #[serde(default, rename = "T")]
    pub t: Option<usize>,
    #[serde(default, rename = "C")]
    pub c: Option<usize>,
    #[serde(default, rename = "H")]
    pub h: Option<usize>,
    #[serde(default, rename = "W")]
    pub w: Option<usize>,
    pub obs_buffer: Vec<f32>,
    pub act_buffer: Vec<i64>,
}

impl InitialState {
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).context("parse initial state")
    }

    /// `(T, C, H, W)` with missing fields filled from the given defaults.
    pub fn shape_or(&self, t: usize, dims: FrameDims) -> (usize, usize, usize, usize) {
        (
            self.t.unwrap_or(t),
            self.c.unwrap_or(dims.c),
            self.h.unwrap_or(dims.h),
            self.w.unwrap_or(dims.w),
        )
    }
}

/// Pick an HTTP source for `http(s)://` locations and a file source otherwise.
pub fn snapshot_source_for(location: &str) -> Box<dyn SnapshotSource> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Box::new(HttpSnapshot::new(location))
    } else {
        Box::new(FileSnapshot::new(location))
    }
}

/// Fetch and parse a snapshot. Any failure is logged and yields `None`.
pub async fn load_initial_state(source: &dyn SnapshotSource) -> Option<InitialState> {
    let result = async {
        let bytes = source.fetch().await?;
        InitialState::from_slice(&bytes)
    }
    .await;

    match result {
        Ok(state) => {
            info!("initial state fetched from {}", source.location());
            Some(state)
        }
        Err(e) => {
            warn!("initial state unavailable from {}: {:#}", source.location(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_missing_shape_fields() {
        let state =
            InitialState::from_slice(br#"{"T":4,"obs_buffer":[0.0,1.5],"act_buffer":[1]}"#)
                .unwrap();
        assert_eq!(state.t, Some(4));
        assert_eq!(state.c, None);
        assert_eq!(state.shape_or(2, FrameDims::new(3, 8, 8)), (4, 3, 8, 8));
        assert_eq!(state.obs_buffer, vec![0.0, 1.5]);
    }

    #[test]
    fn test_source_selection() {
        assert_eq!(
            snapshot_source_for("https://example.com/init.json").location(),
            "https://example.com/init.json"
        );
        assert_eq!(snapshot_source_for("init/state.json").location(), "init/state.json");
    }
}
