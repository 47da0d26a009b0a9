use std::collections::BTreeMap;
use std::path::Path;

use fleet_core::CancellationToken;
use fleet_providers::mock::{failed_deployment, MockFileSystem, MockProcessPlatform, MockProvisioningClient};
use fleet_providers::{DeletionStatus, DeploymentOutcome, FileSystem, ProcessError, ProcessPlatform,
                      ProvisioningClient, ResourceGroupSpec};

fn spec() -> ResourceGroupSpec {
    ResourceGroupSpec { name: "fleet-rg-0000abcd-001".into(),
                        region: "westus2".into(),
                        vm_sku: "Standard_D2s_v5".into(),
                        os_disk_sku: "Standard_LRS".into(),
                        vm_count: 2,
                        cluster_name: None,
                        tags: BTreeMap::new() }
}

#[tokio::test]
async fn provisioning_script_then_default() {
    let client = MockProvisioningClient::new();
    let token = CancellationToken::new();
    client.script_deploy(Ok(failed_deployment("quota")));

    let first = client.deploy_resource_group(&spec(), &token).await.unwrap();
    assert_eq!(first.outcome(), DeploymentOutcome::Failed);
    let second = client.deploy_resource_group(&spec(), &token).await.unwrap();
    assert_eq!(second.outcome(), DeploymentOutcome::Succeeded);
    assert_eq!(second.virtual_machines.len(), 2);

    client.script_delete(Ok(DeletionStatus::Accepted));
    assert_eq!(client.delete_resource_group(&spec(), &token).await, Ok(DeletionStatus::Accepted));
    assert_eq!(client.delete_resource_group(&spec(), &token).await, Ok(DeletionStatus::Succeeded));
    assert_eq!(client.deploy_calls().len(), 2);
    assert_eq!(client.delete_calls().len(), 2);
}

#[tokio::test]
async fn process_platform_lifecycle() {
    let platform = MockProcessPlatform::new();
    let handle = platform.start(Path::new("/opt/worker/loadgen"), &["--x".into()], Path::new("/opt/worker"))
                         .await
                         .unwrap();
    assert_eq!(handle.name, "loadgen");
    assert_eq!(platform.try_find_by_pid(handle.pid).await, Some(handle.clone()));

    platform.push_kill_error(ProcessError::AccessDenied(handle.pid));
    assert_eq!(platform.kill(&handle).await, Err(ProcessError::AccessDenied(handle.pid)));
    assert_eq!(platform.kill(&handle).await, Ok(()));
    assert!(platform.has_exited(&handle).await);
    assert_eq!(platform.kill(&handle).await, Err(ProcessError::AlreadyExited(handle.pid)));
    assert_eq!(platform.kill_count(), 3);

    let survivor = platform.insert_running(77, "loadgen");
    assert_eq!(platform.try_find_by_name("loadgen").await.map(|h| h.pid), Some(survivor.pid));
    platform.reboot();
    assert!(platform.try_find_by_name("loadgen").await.is_none());
}

#[tokio::test]
async fn file_system_failures_are_counted() {
    let fs = MockFileSystem::new();
    fs.fail_next_writes(1);
    assert!(fs.write_file(Path::new("/specs/a.json"), "{}").await.is_err());
    assert!(fs.write_file(Path::new("/specs/a.json"), "{}").await.is_ok());
    assert_eq!(fs.write_attempts(), 2);
    assert!(fs.exists(Path::new("/specs/a.json")).await);
}
