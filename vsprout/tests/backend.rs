//! Integration tests for the backend registry.

use std::sync::Arc;
use vsprout::backend::{self, BackendContext};
use vsprout::machine::MachineStatus;
use vsprout::options::ConnectionInfo;
use vsprout::ProvisionError;
use vsprout_test_utils::{
    AutoConfirm, FakePlatform, FixedImageBuilder, InstantProbe, MemoryRecordStore,
};

fn context() -> BackendContext {
    BackendContext {
        platform: Arc::new(FakePlatform::new("vcenter.test")),
        connection: ConnectionInfo {
            host: "vcenter.test".to_string(),
            port: 443,
            user: "admin".to_string(),
            password: "secret".to_string(),
            allow_insecure_tls: false,
        },
        store: Arc::new(MemoryRecordStore::new()),
        probe: Arc::new(InstantProbe::reachable()),
        images: Arc::new(FixedImageBuilder::new("/nonexistent/base.vmdk")),
        confirm: Arc::new(AutoConfirm::new(true)),
    }
}

#[tokio::test]
async fn vsphere_backend_constructs_and_checks() {
    let config = serde_json::json!({ "name": "web-0" });
    let machine = backend::create_backend("vsphere", &config, context()).unwrap();

    // Nothing exists on the platform yet.
    assert_eq!(machine.check().await.unwrap(), MachineStatus::Missing);
}

#[test]
fn unknown_backend_kind_is_a_config_error() {
    let config = serde_json::json!({ "name": "web-0" });
    let err = backend::create_backend("openstack", &config, context()).unwrap_err();
    assert!(matches!(err, ProvisionError::Config(_)));
}

#[test]
fn invalid_options_are_rejected_before_construction() {
    let config = serde_json::json!({ "name": "web-0", "vcpus": 0 });
    let err = backend::create_backend("vsphere", &config, context()).unwrap_err();
    assert!(matches!(err, ProvisionError::Config(_)));
}
