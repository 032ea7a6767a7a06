//! Integration tests for the guarded lifecycle operations.

use std::sync::Arc;
use vsprout::machine::{KeyPair, LifecycleController, MachineRecord, MachineStatus};
use vsprout::options::{ConnectionInfo, MachineOptions};
use vsprout::platform::types::PowerState;
use vsprout_test_utils::{
    AutoConfirm, FakePlatform, FixedImageBuilder, InstantProbe, MemoryRecordStore,
};

fn connection() -> ConnectionInfo {
    ConnectionInfo {
        host: "vcenter.test".to_string(),
        port: 443,
        user: "admin".to_string(),
        password: "secret".to_string(),
        allow_insecure_tls: false,
    }
}

fn record_with_status(name: &str, status: MachineStatus) -> MachineRecord {
    let mut record = MachineRecord::new(name, connection());
    record.host_key = Some(KeyPair {
        public: "host-pub".to_string(),
        private: "host-priv".to_string(),
    });
    record.client_key = Some(KeyPair {
        public: "client-pub".to_string(),
        private: "client-priv".to_string(),
    });
    record.force_status(status);
    record
}

struct TestContext {
    platform: Arc<FakePlatform>,
    store: Arc<MemoryRecordStore>,
    confirm: Arc<AutoConfirm>,
    controller: LifecycleController,
}

impl TestContext {
    fn new(platform: FakePlatform, status: MachineStatus) -> Self {
        Self::with_record(
            platform,
            record_with_status("web-0", status),
            InstantProbe::reachable(),
            true,
        )
    }

    fn with_record(
        platform: FakePlatform,
        record: MachineRecord,
        probe: InstantProbe,
        answer: bool,
    ) -> Self {
        let platform = Arc::new(platform);
        let store = Arc::new(MemoryRecordStore::new());
        store.put(record);
        let confirm = Arc::new(AutoConfirm::new(answer));
        let controller = LifecycleController::new(
            MachineOptions::named("web-0"),
            connection(),
            platform.clone(),
            store.clone(),
            Arc::new(probe),
            Arc::new(FixedImageBuilder::new("/nonexistent/base.vmdk")),
            confirm.clone(),
        )
        .expect("controller construction");
        Self {
            platform,
            store,
            confirm,
            controller,
        }
    }
}

// ============================================================================
// GUARD TESTS
// ============================================================================

#[tokio::test]
async fn create_from_up_succeeds_without_remote_calls() {
    let ctx = TestContext::new(FakePlatform::new("vcenter.test"), MachineStatus::Up);
    assert!(ctx.controller.create().await.unwrap());
    assert!(ctx.platform.calls().is_empty());
    assert_eq!(ctx.controller.status(), MachineStatus::Up);
}

#[tokio::test]
async fn create_from_transient_state_is_refused() {
    let ctx = TestContext::new(FakePlatform::new("vcenter.test"), MachineStatus::Starting);
    assert!(!ctx.controller.create().await.unwrap());
    assert!(ctx.platform.calls().is_empty());
}

#[tokio::test]
async fn start_refused_unless_stopped() {
    for status in [
        MachineStatus::Missing,
        MachineStatus::Up,
        MachineStatus::Stopping,
        MachineStatus::Unknown,
    ] {
        let ctx = TestContext::new(FakePlatform::new("vcenter.test"), status);
        assert!(!ctx.controller.start().await.unwrap(), "start from {status}");
        assert!(ctx.platform.calls().is_empty());
        assert_eq!(ctx.controller.status(), status);
    }
}

#[tokio::test]
async fn stop_refused_unless_up() {
    for status in [
        MachineStatus::Missing,
        MachineStatus::Stopped,
        MachineStatus::Starting,
        MachineStatus::Unknown,
    ] {
        let ctx = TestContext::new(FakePlatform::new("vcenter.test"), status);
        assert!(!ctx.controller.stop().await.unwrap(), "stop from {status}");
        assert!(ctx.platform.calls().is_empty());
    }
}

// ============================================================================
// START / STOP TESTS
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn start_powers_on_and_records_address() {
    let platform = FakePlatform::new("vcenter.test")
        .with_existing_machine("web-0", PowerState::PoweredOff)
        .with_address("10.0.0.7");
    let ctx = TestContext::new(platform, MachineStatus::Stopped);

    assert!(ctx.controller.start().await.unwrap());
    assert_eq!(ctx.controller.status(), MachineStatus::Up);
    assert_eq!(
        ctx.platform.machine_power("web-0"),
        Some(PowerState::PoweredOn)
    );

    let record = ctx.store.get("web-0").unwrap();
    assert_eq!(record.status, MachineStatus::Up);
    assert_eq!(record.ip_address.as_deref(), Some("10.0.0.7"));
}

#[tokio::test]
async fn start_fails_when_machine_absent_on_platform() {
    let ctx = TestContext::new(FakePlatform::new("vcenter.test"), MachineStatus::Stopped);
    assert!(ctx.controller.start().await.is_err());
    // The recorded status was never advanced past the guard.
    assert_eq!(ctx.controller.status(), MachineStatus::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_drains_power_and_persists_stopped() {
    let platform = FakePlatform::new("vcenter.test")
        .with_existing_machine("web-0", PowerState::PoweredOn);
    let ctx = TestContext::new(platform, MachineStatus::Up);

    assert!(ctx.controller.stop().await.unwrap());
    assert_eq!(ctx.controller.status(), MachineStatus::Stopped);
    assert_eq!(
        ctx.platform.machine_power("web-0"),
        Some(PowerState::PoweredOff)
    );
    assert!(ctx
        .platform
        .calls()
        .contains(&"shutdown_guest(web-0)".to_string()));
    assert_eq!(ctx.store.get("web-0").unwrap().status, MachineStatus::Stopped);
}

// ============================================================================
// DESTROY TESTS
// ============================================================================

#[tokio::test]
async fn destroy_absent_machine_succeeds_without_prompting() {
    let ctx = TestContext::new(FakePlatform::new("vcenter.test"), MachineStatus::Stopped);
    assert!(ctx.controller.destroy(false).await.unwrap());
    assert!(ctx.confirm.prompts().is_empty());
}

#[tokio::test]
async fn destroy_declined_leaves_machine_alone() {
    let platform = FakePlatform::new("vcenter.test")
        .with_existing_machine("web-0", PowerState::PoweredOff);
    let ctx = TestContext::with_record(
        platform,
        record_with_status("web-0", MachineStatus::Stopped),
        InstantProbe::reachable(),
        false,
    );

    assert!(!ctx.controller.destroy(false).await.unwrap());
    assert_eq!(ctx.confirm.prompts().len(), 1);
    assert!(ctx.platform.machine_power("web-0").is_some());
    assert_eq!(ctx.controller.status(), MachineStatus::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn destroy_running_machine_stops_it_first() {
    let platform = FakePlatform::new("vcenter.test")
        .with_existing_machine("web-0", PowerState::PoweredOn);
    let ctx = TestContext::new(platform, MachineStatus::Up);

    assert!(ctx.controller.destroy(false).await.unwrap());
    assert_eq!(ctx.controller.status(), MachineStatus::Missing);
    assert!(ctx.platform.machine_power("web-0").is_none());

    let calls = ctx.platform.calls();
    let shutdown = calls.iter().position(|c| c == "shutdown_guest(web-0)");
    let destroy = calls.iter().position(|c| c == "destroy_machine(web-0)");
    assert!(shutdown.unwrap() < destroy.unwrap());

    let record = ctx.store.get("web-0").unwrap();
    assert_eq!(record.status, MachineStatus::Missing);
    assert!(record.ip_address.is_none());
}

// ============================================================================
// CHECK TESTS
// ============================================================================

#[tokio::test]
async fn check_absent_machine_resets_record() {
    let mut record = record_with_status("web-0", MachineStatus::Up);
    record.set_ip_address(Some("10.0.0.7".to_string()));
    let ctx = TestContext::with_record(
        FakePlatform::new("vcenter.test"),
        record,
        InstantProbe::reachable(),
        true,
    );

    let status = ctx.controller.check().await.unwrap();
    assert_eq!(status, MachineStatus::Missing);
    let record = ctx.store.get("web-0").unwrap();
    assert_eq!(record.status, MachineStatus::Missing);
    assert!(record.ip_address.is_none());
}

#[tokio::test]
async fn check_powered_off_machine_is_stopped() {
    let platform = FakePlatform::new("vcenter.test")
        .with_existing_machine("web-0", PowerState::PoweredOff);
    let ctx = TestContext::new(platform, MachineStatus::Up);

    assert_eq!(ctx.controller.check().await.unwrap(), MachineStatus::Stopped);
}

#[tokio::test]
async fn check_reachable_machine_is_up() {
    let platform = FakePlatform::new("vcenter.test")
        .with_existing_machine("web-0", PowerState::PoweredOn);
    let platform = Arc::new(platform);
    let store = Arc::new(MemoryRecordStore::new());
    let mut record = record_with_status("web-0", MachineStatus::Unknown);
    record.set_ip_address(Some("10.0.0.7".to_string()));
    store.put(record);

    let controller = LifecycleController::new(
        MachineOptions::named("web-0"),
        connection(),
        platform,
        store.clone(),
        Arc::new(InstantProbe::reachable()),
        Arc::new(FixedImageBuilder::new("/nonexistent/base.vmdk")),
        Arc::new(AutoConfirm::new(true)),
    )
    .unwrap();

    assert_eq!(controller.check().await.unwrap(), MachineStatus::Up);
    assert_eq!(store.get("web-0").unwrap().status, MachineStatus::Up);
}

#[tokio::test]
async fn check_unreachable_running_machine_keeps_recorded_status() {
    let platform = FakePlatform::new("vcenter.test")
        .with_existing_machine("web-0", PowerState::PoweredOn);
    let mut record = record_with_status("web-0", MachineStatus::Starting);
    record.set_ip_address(Some("10.0.0.7".to_string()));
    let ctx = TestContext::with_record(platform, record, InstantProbe::unreachable(), true);

    assert_eq!(ctx.controller.check().await.unwrap(), MachineStatus::Starting);
}
