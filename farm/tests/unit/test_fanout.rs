//! Group fanout tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::Span;

use farmctl::bridge::DiscoveredDevice;
use farmctl::device::DeviceState;
use farmctl::errors::FarmError;
use farmctl::fanout::{Direction, FanoutEngine, Options};
use farmctl::library::{Group, MemoryLibrary};
use farmctl::registry::{DeviceRegistry, Options as RegistryOptions};

use common::{FakeAgent, FakeBridge};

struct Farm {
    bridge: Arc<FakeBridge>,
    registry: Arc<DeviceRegistry>,
    fanout: FanoutEngine,
}

impl Farm {
    fn new(ids: &[&str], stagger_base: Duration) -> Self {
        let bridge = Arc::new(FakeBridge::online(ids));
        let registry = Arc::new(DeviceRegistry::new(
            bridge.clone(),
            Arc::new(FakeAgent::new()),
            RegistryOptions::default(),
            Span::none(),
        ));

        let library = Arc::new(MemoryLibrary::new());
        let mut members: Vec<&str> = ids.to_vec();
        members.push("ghost");
        library.insert_group(Group::new("g1", members));

        let fanout = FanoutEngine::new(
            registry.clone(),
            library,
            bridge.clone(),
            Options {
                stagger_base,
                stagger_jitter: Duration::ZERO,
            },
            Span::none(),
        );
        Self {
            bridge,
            registry,
            fanout,
        }
    }

    /// Poll once and let enrichment finish
    async fn discover(&self) {
        self.registry.poll().await;
        self.drain().await;
    }

    async fn drain(&self) {
        for device in self.registry.devices() {
            device.queue().enqueue(|| async { Ok(()) }).unwrap().await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_tap_converts_to_each_device_pixels() {
    let farm = Farm::new(&["dev-1", "dev-2"], Duration::ZERO);
    farm.discover().await;

    let report = farm.fanout.tap_at("g1", 0.5, 0.5, 0.0).await.unwrap();
    farm.drain().await;

    assert_eq!(report.devices, vec!["dev-1", "dev-2"]);
    assert_eq!(farm.bridge.inputs("dev-1"), vec!["input tap 540 1200"]);
    assert_eq!(farm.bridge.inputs("dev-2"), vec!["input tap 540 1200"]);
}

#[tokio::test(start_paused = true)]
async fn test_devices_are_staggered() {
    let farm = Farm::new(&["dev-1", "dev-2", "dev-3"], Duration::from_millis(100));
    farm.discover().await;

    let submitted_at = Instant::now();
    farm.fanout.key("g1", "home").await.unwrap();
    farm.drain().await;

    let keys: Vec<_> = farm
        .bridge
        .calls()
        .into_iter()
        .filter(|c| c.command == "input keyevent KEYCODE_HOME")
        .collect();
    assert_eq!(keys.len(), 3);
    for (i, call) in keys.iter().enumerate() {
        assert_eq!(call.device, format!("dev-{}", i + 1));
        assert_eq!(call.at - submitted_at, Duration::from_millis(100 * i as u64));
    }
}

#[tokio::test]
async fn test_devices_without_resolution_are_skipped() {
    let farm = Farm::new(&["dev-1"], Duration::ZERO);
    // Known and ONLINE, but never enriched
    farm.registry.reconcile(&[DiscoveredDevice {
        id: "dev-1".to_string(),
        state: DeviceState::Online,
        model: None,
    }]);

    let report = farm.fanout.tap_at("g1", 0.5, 0.5, 0.0).await.unwrap();
    assert!(report.devices.is_empty());

    // Actions without coordinates still go out
    let report = farm.fanout.key("g1", "back").await.unwrap();
    farm.drain().await;
    assert_eq!(report.devices, vec!["dev-1"]);
    assert_eq!(farm.bridge.inputs("dev-1"), vec!["input keyevent KEYCODE_BACK"]);
}

#[tokio::test]
async fn test_offline_members_are_skipped() {
    let farm = Farm::new(&["dev-1", "dev-2"], Duration::ZERO);
    farm.discover().await;
    farm.bridge.detach("dev-2");
    farm.registry.poll().await;

    let report = farm.fanout.wake("g1").await.unwrap();
    farm.drain().await;

    assert_eq!(report.devices, vec!["dev-1"]);
    assert!(farm.bridge.inputs("dev-2").is_empty());
}

#[tokio::test]
async fn test_one_device_failing_does_not_affect_others() {
    let farm = Farm::new(&["dev-1", "dev-2", "dev-3"], Duration::ZERO);
    farm.discover().await;
    farm.bridge.fail_device("dev-2");

    let report = farm.fanout.swipe_direction("g1", Direction::Up, 0.0).await.unwrap();
    farm.drain().await;

    assert_eq!(report.devices.len(), 3);
    assert_eq!(farm.bridge.inputs("dev-1"), vec!["input swipe 540 1800 540 600 300"]);
    assert_eq!(farm.bridge.inputs("dev-3"), vec!["input swipe 540 1800 540 600 300"]);

    // The failing device's queue keeps working
    farm.fanout.screen_off("g1").await.unwrap();
    farm.drain().await;
    assert_eq!(
        farm.bridge.inputs("dev-2"),
        vec!["input swipe 540 1800 540 600 300", "input keyevent KEYCODE_SLEEP"]
    );
}

#[tokio::test]
async fn test_shutdown_powers_off() {
    let farm = Farm::new(&["dev-1"], Duration::ZERO);
    farm.discover().await;

    farm.fanout.shutdown("g1").await.unwrap();
    farm.drain().await;

    assert!(farm
        .bridge
        .calls()
        .iter()
        .any(|c| c.device == "dev-1" && c.command == "reboot -p"));
}

#[tokio::test]
async fn test_unknown_group_fails_fast() {
    let farm = Farm::new(&["dev-1"], Duration::ZERO);
    farm.discover().await;

    let result = farm.fanout.tap_at("nope", 0.5, 0.5, 0.0).await;
    assert!(matches!(result, Err(FarmError::NotFound(_))));
}
