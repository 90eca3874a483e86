mod common;

use std::time::Duration;

use common::{device, payload, rig, rig_with_pairing, FakePairing, MemoryStore, ScriptedFrames};
use gmshoot_supervisor::{
    ConnectionStatus, ErrorKind, ErrorReport, Severity, SupervisorConfig, SupervisorEvent,
};

#[tokio::test(start_paused = true)]
async fn connection_loss_then_recovery_within_backoff() {
    let rig = rig(SupervisorConfig::default(), ScriptedFrames::silent(), MemoryStore::default());
    let supervisor = &rig.supervisor;
    supervisor.pair_device(&payload("a")).await.unwrap();
    assert!(supervisor.connection().is_connected());

    supervisor.connection().report_device_set(Vec::new()).await;
    let raised = supervisor.errors().unresolved().await;
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].kind, ErrorKind::Connection);
    assert_eq!(raised[0].severity, Severity::Critical);
    assert!(raised[0].auto_retry);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let state = supervisor.connection().report_device_set(vec![device("a")]).await;

    assert_eq!(state.status, ConnectionStatus::Connected);
    assert_eq!(state.downtime_ms, 0);
    assert!(supervisor.errors().unresolved().await.is_empty());
    let record = supervisor.errors().get(&raised[0].id).await.unwrap();
    assert!(record.resolved);
    assert_eq!(record.retry_count, 0);
    assert!(!supervisor.errors().has_pending_retry(&record.id).await);
}

#[tokio::test(start_paused = true)]
async fn downtime_accumulates_while_disconnected() {
    let rig = rig(SupervisorConfig::default(), ScriptedFrames::silent(), MemoryStore::default());
    let supervisor = &rig.supervisor;
    let mut events = supervisor.subscribe();

    supervisor.connection().report_device_set(vec![device("a")]).await;
    supervisor.connection().report_device_set(Vec::new()).await;
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    assert!(supervisor.connection().state().await.downtime_ms >= 3_000);

    let mut ticks = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SupervisorEvent::DowntimeTick { .. }) {
            ticks += 1;
        }
    }
    assert_eq!(ticks, 3);
}

#[tokio::test(start_paused = true)]
async fn device_error_exhausts_its_retries() {
    let rig = rig(SupervisorConfig::default(), ScriptedFrames::silent(), MemoryStore::default());
    let errors = rig.supervisor.errors();

    let record = errors
        .report(
            ErrorReport::new(ErrorKind::Device, Severity::Medium, "camera stopped answering")
                .auto_retry(true)
                .max_retries(2),
        )
        .await;

    // 1s then 2s of backoff, then nothing left
    tokio::time::sleep(Duration::from_secs(30)).await;

    let after = errors.get(&record.id).await.unwrap();
    assert_eq!(after.retry_count, 2);
    assert!(!after.resolved);
    assert!(after.next_retry_at.is_none());
    assert!(!errors.has_pending_retry(&record.id).await);
    assert!(errors.is_permanent(&record.id).await);
}

#[tokio::test(start_paused = true)]
async fn failed_pairing_surfaces_an_error() {
    let rig = rig_with_pairing(
        SupervisorConfig::default(),
        ScriptedFrames::silent(),
        MemoryStore::default(),
        FakePairing { fail: true },
    );
    let supervisor = &rig.supervisor;

    assert!(supervisor.pair_device(&payload("a")).await.is_err());
    assert_eq!(
        supervisor.connection().state().await.status,
        ConnectionStatus::Disconnected
    );

    let errors = supervisor.errors().unresolved().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Connection);
    assert_eq!(errors[0].severity, Severity::High);
    assert!(!errors[0].auto_retry);
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_without_devices_raises_fresh_error() {
    let rig = rig(SupervisorConfig::default(), ScriptedFrames::silent(), MemoryStore::default());
    let errors = rig.supervisor.errors();

    assert!(!errors.retry_all_connections().await);
    let unresolved = errors.unresolved().await;
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].severity, Severity::High);
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_resolves_when_a_device_returns() {
    let rig = rig(SupervisorConfig::default(), ScriptedFrames::silent(), MemoryStore::default());
    let supervisor = rig.supervisor.clone();
    supervisor.connection().report_device_set(vec![device("a")]).await;
    supervisor.connection().report_device_set(Vec::new()).await;

    let connection = supervisor.connection().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        connection.report_device_set(vec![device("a")]).await;
    });

    assert!(supervisor.errors().retry_all_connections().await);
    let stats = supervisor.errors().stats().await;
    assert_eq!(stats.unresolved, 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_retries() {
    let rig = rig(SupervisorConfig::default(), ScriptedFrames::silent(), MemoryStore::default());
    let supervisor = &rig.supervisor;
    supervisor.connection().report_device_set(vec![device("a")]).await;
    supervisor.connection().report_device_set(Vec::new()).await;

    let lost = supervisor.errors().unresolved().await;
    assert!(supervisor.errors().has_pending_retry(&lost[0].id).await);

    supervisor.shutdown().await;
    assert!(!supervisor.errors().has_pending_retry(&lost[0].id).await);
    assert_eq!(supervisor.errors().pending_timers().await, 0);
}
