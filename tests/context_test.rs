use wm_rollout_engine::engine::context::ContextStore;
use wm_rollout_engine::model::FrameDims;
use wm_rollout_engine::source::snapshot::InitialState;

fn frame(dims: FrameDims, k: usize) -> Vec<f32> {
    (0..dims.len()).map(|i| (k * 1000 + i) as f32).collect()
}

#[test]
fn test_window_tracks_sliding_sequence() {
    let t = 4;
    let dims = FrameDims::new(2, 3, 3);
    let mut store = ContextStore::new(t, dims, 5);
    let mut appended: Vec<Vec<f32>> = Vec::new();

    for k in 1..=11 {
        let next = frame(dims, k);
        store.advance(&next, k as i64 % 5).unwrap();
        appended.push(next);

        assert_eq!(store.observations().len(), t * dims.len());
        assert_eq!(store.actions().len(), t);
        assert_eq!(store.current_observation().0, &appended[k - 1][..]);

        // Slot i holds the frame appended (t - 1 - i) advances ago, or zeros before that.
        for slot in 0..t {
            let got = &store.observations()[slot * dims.len()..(slot + 1) * dims.len()];
            let age = t - 1 - slot;
            if age < k {
                assert_eq!(got, &appended[k - 1 - age][..], "k={} slot={}", k, slot);
            } else {
                assert!(got.iter().all(|v| *v == 0.0), "k={} slot={}", k, slot);
            }
        }
    }
    // Actions of advances 9, 10 and 11; the last one also fills the trailing slot.
    assert_eq!(store.actions(), &[4, 0, 1, 1]);
}

#[test]
fn test_reset_rejects_mismatched_snapshot() {
    let dims = FrameDims::new(4, 64, 64);
    let mut store = ContextStore::new(4, dims, 7);
    store.advance(&vec![1.0; dims.len()], 2).unwrap();

    // Snapshot for a 3x48x64 model against a 4x64x64 store.
    let snapshot = InitialState {
        t: Some(4),
        c: Some(3),
        h: Some(48),
        w: Some(64),
        obs_buffer: vec![0.5; 4 * 3 * 48 * 64],
        act_buffer: vec![1; 4],
    };
    store.reset(Some(&snapshot));

    assert!(store.observations().iter().all(|v| *v == 0.0));
    assert!(store.actions().iter().all(|a| *a == 0));
}

#[test]
fn test_reset_rejects_partial_buffers() {
    let dims = FrameDims::new(1, 2, 2);
    let mut store = ContextStore::new(2, dims, 3);

    // Shape fields match but the action buffer is short: nothing is copied.
    let snapshot = InitialState {
        t: Some(2),
        c: Some(1),
        h: Some(2),
        w: Some(2),
        obs_buffer: vec![0.25; 8],
        act_buffer: vec![1],
    };
    store.reset(Some(&snapshot));
    assert!(store.observations().iter().all(|v| *v == 0.0));

    // Out-of-range action.
    let snapshot = InitialState {
        act_buffer: vec![1, 3],
        ..snapshot
    };
    store.reset(Some(&snapshot));
    assert!(store.observations().iter().all(|v| *v == 0.0));

    // Non-finite observation.
    let mut obs = vec![0.25; 8];
    obs[5] = f32::NAN;
    let snapshot = InitialState {
        obs_buffer: obs,
        act_buffer: vec![1, 2],
        ..snapshot
    };
    store.reset(Some(&snapshot));
    assert!(store.observations().iter().all(|v| *v == 0.0));
}

#[test]
fn test_reset_copies_matching_snapshot() {
    let dims = FrameDims::new(1, 2, 2);
    let mut store = ContextStore::new(2, dims, 3);

    let obs: Vec<f32> = (0..8).map(|i| i as f32 / 8.0).collect();
    let snapshot = InitialState {
        t: None,
        c: None,
        h: Some(2),
        w: Some(2),
        obs_buffer: obs.clone(),
        act_buffer: vec![2, 1],
    };
    store.reset(Some(&snapshot));

    assert_eq!(store.observations(), &obs[..]);
    assert_eq!(store.actions(), &[2, 1]);
    assert_eq!(store.current_observation().0, &obs[4..]);

    store.reset(None);
    assert!(store.observations().iter().all(|v| *v == 0.0));
}
