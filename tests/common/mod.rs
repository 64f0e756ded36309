// Shared fixtures: host-backed networks that check the feed contract and record calls.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Result};
use parking_lot::Mutex;

use wm_rollout_engine::frontend::FrameSink;
use wm_rollout_engine::inference::host::{HostBackend, HostOutputs};
use wm_rollout_engine::inference::Tensor;
use wm_rollout_engine::model::{
    DecoderConfig, DenoiserConfig, FrameDims, InputNames, LatentRange, ModelConfig, ModelKind,
};

pub const DENOISER_PATH: &str = "models/test/denoiser.onnx";
pub const DECODER_PATH: &str = "models/test/decoder.onnx";

/// What the rollout network saw on one call.
#[derive(Debug, Clone)]
pub struct DenoiseCall {
    pub sigma: f32,
    pub sigma_cond: Option<f32>,
    pub actions: Vec<i64>,
    pub noisy: Vec<f32>,
}

pub type CallLog = Arc<Mutex<Vec<DenoiseCall>>>;

pub fn direct_model(t: usize, dims: FrameDims, num_steps: usize) -> ModelConfig {
    ModelConfig {
        name: "test-direct".to_string(),
        description: String::new(),
        c: dims.c,
        h: dims.h,
        w: dims.w,
        t,
        num_actions: 4,
        action_names: Vec::new(),
        default_action: 0,
        reduced_precision: false,
        denoiser: DenoiserConfig {
            num_steps,
            sigma_min: 0.002,
            sigma_max: 5.0,
            inputs: InputNames::default(),
        },
        denoiser_path: PathBuf::from(DENOISER_PATH),
        init_state: None,
        kind: ModelKind::Direct,
    }
}

pub fn latent_model(range: Option<LatentRange>) -> ModelConfig {
    let mut model = direct_model(4, FrameDims::new(4, 8, 8), 1);
    model.name = "test-latent".to_string();
    model.kind = ModelKind::Latent(DecoderConfig {
        path: PathBuf::from(DECODER_PATH),
        output_c: 3,
        output_h: 16,
        output_w: 16,
        latent_range: range,
    });
    model
}

/// Feed names a rollout network for `model` declares.
pub fn denoiser_feeds(model: &ModelConfig) -> Vec<String> {
    let inputs = &model.denoiser.inputs;
    let mut feeds = vec![
        "noisy_next_obs".to_string(),
        "sigma".to_string(),
        inputs.obs.clone(),
        inputs.act.clone(),
    ];
    if inputs.sigma_cond {
        feeds.push("sigma_cond".to_string());
    }
    feeds
}

fn f32_input<'a>(inputs: &'a HashMap<String, Tensor>, name: &str) -> Result<&'a Tensor> {
    let tensor = inputs
        .get(name)
        .ok_or_else(|| anyhow!("missing input `{}`", name))?;
    ensure!(tensor.as_f32().is_some(), "input `{}` must be f32", name);
    Ok(tensor)
}

/// Rollout network that validates its feeds against `model` and returns a constant frame.
pub fn register_denoiser(backend: &HostBackend, model: &ModelConfig, value: f32) -> CallLog {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let calls = log.clone();
    let (t, dims) = (model.t, model.frame_dims());
    let names = model.denoiser.inputs.clone();

    let feeds = denoiser_feeds(model);
    let feeds: Vec<&str> = feeds.iter().map(String::as_str).collect();

    backend.register(
        model.denoiser_path.clone(),
        &feeds,
        &["denoised"],
        move |inputs: &HashMap<String, Tensor>| -> Result<HostOutputs> {
            let noisy = f32_input(inputs, "noisy_next_obs")?;
            ensure!(noisy.shape == vec![1, dims.c, dims.h, dims.w], "noisy shape {:?}", noisy.shape);
            let sigma = f32_input(inputs, "sigma")?
                .scalar_f32()
                .ok_or_else(|| anyhow!("sigma must be a scalar"))?;
            let obs = f32_input(inputs, &names.obs)?;
            ensure!(obs.shape == vec![1, t * dims.c, dims.h, dims.w], "obs shape {:?}", obs.shape);
            let act = inputs
                .get(&names.act)
                .and_then(Tensor::as_i64)
                .ok_or_else(|| anyhow!("missing i64 input `{}`", names.act))?;
            ensure!(act.len() == t, "act has {} entries", act.len());

            let sigma_cond = match (names.sigma_cond, inputs.get("sigma_cond")) {
                (true, Some(cond)) => cond.scalar_f32(),
                (true, None) => return Err(anyhow!("sigma_cond required")),
                (false, Some(_)) => return Err(anyhow!("sigma_cond not expected")),
                (false, None) => None,
            };
            ensure!(inputs.len() == 4 + sigma_cond.is_some() as usize, "unexpected extra inputs");

            calls.lock().push(DenoiseCall {
                sigma,
                sigma_cond,
                actions: act.to_vec(),
                noisy: noisy.as_f32().unwrap_or_default().to_vec(),
            });

            let denoised = vec![value; dims.len()];
            Ok(vec![(
                "denoised".to_string(),
                Tensor::from_f32(denoised, vec![1, dims.c, dims.h, dims.w]),
            )])
        },
    );
    log
}

/// Rollout network that always fails.
pub fn register_failing_denoiser(backend: &HostBackend, model: &ModelConfig) {
    let feeds = denoiser_feeds(model);
    let feeds: Vec<&str> = feeds.iter().map(String::as_str).collect();

    backend.register(
        model.denoiser_path.clone(),
        &feeds,
        &["denoised"],
        |_inputs: &HashMap<String, Tensor>| -> Result<HostOutputs> {
            Err(anyhow!("device lost"))
        },
    );
}

/// Decoder that echoes the first latent channel's mean into every output pixel,
/// and records the latent values it received.
pub fn register_decoder(backend: &HostBackend, model: &ModelConfig) -> Arc<Mutex<Vec<Vec<f32>>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let dec = model.decoder().expect("latent model").clone();
    let out = dec.output_dims();

    backend.register(
        dec.path.clone(),
        &["latent"],
        &["rgb"],
        move |inputs: &HashMap<String, Tensor>| -> Result<HostOutputs> {
            ensure!(inputs.len() == 1, "decoder takes only `latent`");
            let latent = f32_input(inputs, "latent")?;
            let data = latent.as_f32().unwrap_or_default();
            log.lock().push(data.to_vec());
            let mean = data.iter().sum::<f32>() / data.len() as f32;
            Ok(vec![(
                "rgb".to_string(),
                Tensor::from_f32(vec![mean; out.len()], vec![1, out.c, out.h, out.w]),
            )])
        },
    );
    seen
}

/// Frames handed to a renderer, with their dims.
pub type Presented = Arc<Mutex<Vec<(Vec<f32>, FrameDims)>>>;

pub struct RecordingSink(pub Presented);

impl RecordingSink {
    pub fn new() -> (Self, Presented) {
        let frames: Presented = Arc::new(Mutex::new(Vec::new()));
        (Self(frames.clone()), frames)
    }
}

impl FrameSink for RecordingSink {
    fn present(&mut self, frame: &[f32], dims: FrameDims) -> Result<()> {
        ensure!(frame.len() == dims.len(), "frame does not match dims");
        self.0.lock().push((frame.to_vec(), dims));
        Ok(())
    }
}
