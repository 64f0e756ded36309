use wm_rollout_engine::model::{FrameDims, ModelCatalog, ModelKind};
use wm_rollout_engine::BackendMode;
use wm_rollout_engine::SessionConfig;

const CATALOG: &str = r#"{
    "default_model": "flappy",
    "models": {
        "flappy": {
            "name": "Flappy",
            "C": 3, "H": 64, "W": 64, "T": 4,
            "num_actions": 2,
            "action_names": ["NOOP", "FLAP"],
            "denoiser": { "num_steps": 2, "sigma_min": 0.002, "sigma_max": 5.0 },
            "denoiser_path": "models/flappy/denoiser.onnx",
            "init_state": "models/flappy/init_state.json"
        },
        "mercury": {
            "name": "Mercury Flow",
            "C": 4, "H": 64, "W": 64, "T": 4,
            "num_actions": 2,
            "is_fp16": true,
            "denoiser": { "num_steps": 1, "inputs": { "sigma_cond": false } },
            "denoiser_path": "models/mercury/denoiser.onnx",
            "kind": { "kind": "latent", "path": "models/mercury/decoder.onnx",
                      "output_h": 128, "output_w": 128 }
        }
    }
}"#;

#[tokio::test]
async fn test_load_catalog_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models.json");
    tokio::fs::write(&path, CATALOG).await.unwrap();

    let catalog = ModelCatalog::load(&path).await.unwrap();
    assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["flappy", "mercury"]);

    let flappy = catalog.get("flappy");
    assert_eq!(flappy.frame_dims(), FrameDims::new(3, 64, 64));
    assert_eq!(flappy.kind, ModelKind::Direct);
    assert_eq!(flappy.action_names.len(), 2);

    let mercury = catalog.get("mercury");
    assert!(mercury.reduced_precision);
    assert_eq!(mercury.denoiser.num_steps, 1);
    assert_eq!(mercury.denoiser.sigma_max, 5.0);
    let dec = mercury.decoder().unwrap();
    assert_eq!(dec.output_dims(), FrameDims::new(3, 128, 128));
    assert!(dec.latent_range.is_none());

    assert_eq!(catalog.get("unknown").name, "Flappy");
}

#[tokio::test]
async fn test_catalog_rejects_invalid_model() {
    let text = CATALOG.replace("\"num_actions\": 2,\n            \"action_names\"", "\"num_actions\": 0,\n            \"action_names\"");
    assert_ne!(text, CATALOG);
    assert!(ModelCatalog::from_json(&text).is_err());

    let dir = tempfile::tempdir().unwrap();
    assert!(ModelCatalog::load(&dir.path().join("missing.json")).await.is_err());
}

#[test]
fn test_session_config_defaults() {
    let cfg: SessionConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cfg.backend_mode, BackendMode::Auto);
    assert!(cfg.frame_budget().is_none());
    assert_eq!(SessionConfig::safe_mode().backend_mode, BackendMode::Safe);
}
