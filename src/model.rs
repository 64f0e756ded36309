// Per-model parameters and the catalog that maps model ids to them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::config::{DEFAULT_DECODER_OUTPUT, DEFAULT_NUM_STEPS, DEFAULT_SIGMA_MAX, DEFAULT_SIGMA_MIN};
use crate::error::EngineError;

/// Geometry of one planar channel-major frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDims {
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl FrameDims {
    pub fn new(c: usize, h: usize, w: usize) -> Self {
        Self { c, h, w }
    }

    /// Number of elements in one frame (`C*H*W`).
    pub fn len(&self) -> usize {
        self.c * self.h * self.w
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Names the rollout network expects for its configuration-driven inputs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InputNames {
    pub obs: String,
    pub act: String,
    /// Whether the network takes the extra `sigma_cond` scalar.
    pub sigma_cond: bool,
}

impl Default for InputNames {
    fn default() -> Self {
        Self {
            obs: "obs".to_string(),
            act: "act".to_string(),
            sigma_cond: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DenoiserConfig {
    pub num_steps: usize,
    pub sigma_min: f32,
    pub sigma_max: f32,
    pub inputs: InputNames,
}

impl Default for DenoiserConfig {
    fn default() -> Self {
        Self {
            num_steps: DEFAULT_NUM_STEPS,
            sigma_min: DEFAULT_SIGMA_MIN,
            sigma_max: DEFAULT_SIGMA_MAX,
            inputs: InputNames::default(),
        }
    }
}

/// Range a latent model's normalized `[-1, 1]` encoding maps back to before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LatentRange {
    pub min: f32,
    pub max: f32,
}

fn default_output_c() -> usize {
    DEFAULT_DECODER_OUTPUT.0
}

fn default_output_h() -> usize {
    DEFAULT_DECODER_OUTPUT.1
}

fn default_output_w() -> usize {
    DEFAULT_DECODER_OUTPUT.2
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecoderConfig {
    pub path: PathBuf,
    #[serde(default = "default_output_c")]
    pub output_c: usize,
    #[serde(default = "default_output_h")]
    pub output_h: usize,
    #[serde(default = "default_output_w")]
    pub output_w: usize,
    #[serde(default)]
    pub latent_range: Option<LatentRange>,
}

impl DecoderConfig {
    pub fn output_dims(&self) -> FrameDims {
        FrameDims::new(self.output_c, self.output_h, self.output_w)
    }
}

/// Whether observations are pixels or latents that need a decoder pass.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    Latent(DecoderConfig),
    Direct,
}

impl Default for ModelKind {
    fn default() -> Self {
        ModelKind::Direct
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "C")]
    pub c: usize,
    #[serde(alias = "H")]
    pub h: usize,
    #[serde(alias = "W")]
    pub w: usize,
    #[serde(alias = "T")]
    pub t: usize,
    pub num_actions: usize,
    #[serde(default)]
    pub action_names: Vec<String>,
    #[serde(default)]
    pub default_action: usize,
    /// Reduced-precision weights; the accelerated backend needs the matching capability.
    #[serde(default, alias = "is_fp16")]
    pub reduced_precision: bool,
    #[serde(default)]
    pub denoiser: DenoiserConfig,
    pub denoiser_path: PathBuf,
    /// File path or http(s) URL of the initial-state snapshot.
    #[serde(default)]
    pub init_state: Option<String>,
    #[serde(default)]
    pub kind: ModelKind,
}

impl ModelConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: ModelConfig = serde_json::from_str(text).context("parse model config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn frame_dims(&self) -> FrameDims {
        FrameDims::new(self.c, self.h, self.w)
    }

    pub fn decoder(&self) -> Option<&DecoderConfig> {
        match &self.kind {
            ModelKind::Latent(decoder) => Some(decoder),
            ModelKind::Direct => None,
        }
    }

    pub fn is_latent(&self) -> bool {
        matches!(self.kind, ModelKind::Latent(_))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg).into());

        if self.c == 0 || self.h == 0 || self.w == 0 || self.t == 0 {
            return invalid(format!(
                "dimensions must be positive (T={} C={} H={} W={})",
                self.t, self.c, self.h, self.w
            ));
        }
        if self.num_actions == 0 {
            return invalid("num_actions must be > 0".to_string());
        }
        if self.default_action >= self.num_actions {
            return invalid(format!(
                "default_action {} outside [0, {})",
                self.default_action, self.num_actions
            ));
        }
        let d = &self.denoiser;
        if d.num_steps == 0 {
            return invalid("num_steps must be > 0".to_string());
        }
        if !(d.sigma_min > 0.0 && d.sigma_min.is_finite()) {
            return invalid(format!("sigma_min must be positive, got {}", d.sigma_min));
        }
        if !(d.sigma_max > d.sigma_min && d.sigma_max.is_finite()) {
            return invalid(format!(
                "sigma_max {} must exceed sigma_min {}",
                d.sigma_max, d.sigma_min
            ));
        }
        if let ModelKind::Latent(dec) = &self.kind {
            if dec.output_dims().is_empty() {
                return invalid("decoder output dimensions must be positive".to_string());
            }
            if let Some(range) = dec.latent_range {
                if !(range.max > range.min) {
                    return invalid(format!(
                        "latent range max {} must exceed min {}",
                        range.max, range.min
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct CatalogDocument {
    default_model: String,
    models: BTreeMap<String, ModelConfig>,
}

/// Named model configurations with a default entry.
///
/// Every instance holds its default model and only valid configs; deserializing
/// goes through the same checks as [`ModelCatalog::from_json`].
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "CatalogDocument")]
pub struct ModelCatalog {
    default_model: String,
    models: BTreeMap<String, ModelConfig>,
}

impl TryFrom<CatalogDocument> for ModelCatalog {
    type Error = EngineError;

    fn try_from(doc: CatalogDocument) -> Result<Self, EngineError> {
        if !doc.models.contains_key(&doc.default_model) {
            return Err(EngineError::InvalidConfig(format!(
                "default model `{}` not in catalog",
                doc.default_model
            )));
        }
        for (id, model) in &doc.models {
            model
                .validate()
                .map_err(|e| EngineError::InvalidConfig(format!("model `{}`: {:#}", id, e)))?;
        }
        Ok(Self {
            default_model: doc.default_model,
            models: doc.models,
        })
    }
}

impl ModelCatalog {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse model catalog")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read model catalog {}", path.display()))?;
        Self::from_json(&text)
    }

    /// Look up a model by id, falling back to the default model for unknown ids.
    pub fn get(&self, id: &str) -> &ModelConfig {
        match self.models.get(id) {
            Some(model) => model,
            None => {
                warn!("unknown model `{}`, using `{}`", id, self.default_model);
                &self.models[&self.default_model]
            }
        }
    }

    pub fn default_id(&self) -> &str {
        &self.default_model
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}
