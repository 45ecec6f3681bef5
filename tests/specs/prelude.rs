//! Shared fixture for engine behavioral specs.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::sync::Arc;
use std::time::Duration;
use strategos_adapters::FakeMux;
use strategos_core::{FakeClock, SequentialIdGen, WorkerId};
use strategos_engine::{Engine, EngineConfig, EngineDeps, NoopHistory, SpawnOptions, SpawnRequest};

pub type SpecEngine = Arc<Engine<FakeMux, FakeClock, SequentialIdGen>>;

pub struct Fixture {
    pub engine: SpecEngine,
    pub mux: FakeMux,
    pub clock: FakeClock,
    pub dir: tempfile::TempDir,
}

pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("demo")).unwrap();

    let mut config = EngineConfig::new(dir.path().to_path_buf(), dir.path().join(".strategos"));
    config.initial_message_delay = Duration::from_millis(10);
    config.auto_cleanup_delay = Duration::from_millis(50);
    config.queue_send_spacing = Duration::from_millis(5);
    config.save_debounce = Duration::from_millis(20);

    let mux = FakeMux::new();
    let clock = FakeClock::new();
    let engine = Engine::new(
        EngineDeps {
            mux: mux.clone(),
            clock: clock.clone(),
            id_gen: SequentialIdGen::new("w"),
            history: Box::new(NoopHistory),
        },
        config,
    );
    Fixture {
        engine,
        mux,
        clock,
        dir,
    }
}

impl Fixture {
    pub async fn spawn(&self, label: &str, options: SpawnOptions) -> WorkerId {
        self.engine
            .spawn_worker(SpawnRequest {
                project_path: "demo".to_string(),
                label: label.to_string(),
                options,
            })
            .await
            .unwrap()
            .id
    }

    pub async fn spawn_plain(&self, label: &str) -> WorkerId {
        self.spawn(label, SpawnOptions::default()).await
    }

    pub async fn spawn_after(&self, label: &str, deps: &[&WorkerId]) -> WorkerId {
        self.spawn(
            label,
            SpawnOptions {
                depends_on: deps.iter().map(|d| d.to_string()).collect(),
                ..SpawnOptions::default()
            },
        )
        .await
    }
}
