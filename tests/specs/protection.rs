//! Protected-worker guarantees.

use crate::prelude::*;
use strategos_engine::{EngineError, KillOptions};

#[tokio::test]
async fn generals_survive_auto_cleanup_and_require_force() {
    let f = fixture();
    let general = f.spawn_plain("GENERAL: theater command").await;

    // Completion with auto-cleanup never touches a protected worker
    f.engine.complete_worker(&general, true).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(f.engine.get_worker(&general).is_some());

    // The periodic sweep leaves it alone too
    f.clock.advance(std::time::Duration::from_secs(3600));
    f.engine.cleanup_tick().await;
    assert!(f.engine.get_worker(&general).is_some());

    // Explicit kill demands force
    let err = f
        .engine
        .kill_worker(&general, KillOptions::auto("cleanup"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KillBlocked(_)));
    assert!(f
        .engine
        .kill_worker(&general, KillOptions::forced("operator"))
        .await
        .unwrap());
}

#[tokio::test]
async fn normalized_payloads_never_leak_secrets() {
    let f = fixture();
    let mut rx = f.engine.subscribe();
    let id = f
        .spawn(
            "IMPL: secretive",
            strategos_engine::SpawnOptions {
                ralph_mode: true,
                task: Some("guard the token".to_string()),
                ..strategos_engine::SpawnOptions::default()
            },
        )
        .await;

    // Everything observable from outside: API payloads and events
    let api_view = serde_json::to_string(&f.engine.get_worker(&id).unwrap()).unwrap();
    assert!(!api_view.contains("ralph_token"));
    assert!(!api_view.contains(f.dir.path().to_str().unwrap()));

    while let Ok(event) = rx.try_recv() {
        let text = event.payload.to_string();
        assert!(
            !text.contains("ralph_token"),
            "event {} leaked a token field",
            event.name
        );
        assert!(
            !text.contains(f.dir.path().to_str().unwrap()),
            "event {} leaked an absolute path",
            event.name
        );
    }
}
