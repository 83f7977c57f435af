use statemig_history::{FileLedger, HistoryLedger, HistoryRecord};
use statemig_state::{ContentHash, DeploymentId};
use std::sync::Arc;

#[tokio::test]
async fn concurrent_appends_keep_every_line_intact() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(FileLedger::new(dir.path().join("history.jsonl")));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                let name = format!("doc-{i:02}");
                let record = HistoryRecord::new(
                    name.clone(),
                    ContentHash::compute(name.as_bytes()),
                    DeploymentId::new("app"),
                );
                ledger.record(record).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let records = ledger.records().await.unwrap();
    assert_eq!(records.len(), 16);
    for i in 0..16 {
        let name = format!("doc-{i:02}");
        assert!(ledger
            .has_applied(&name, &ContentHash::compute(name.as_bytes()))
            .await
            .unwrap());
    }
}

#[tokio::test]
async fn reopened_ledger_sees_previous_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    let digest = ContentHash::compute(b"actions");

    FileLedger::new(&path)
        .record(HistoryRecord::new("split-db", digest, DeploymentId::new("envs/prod")))
        .await
        .unwrap();

    let reopened = FileLedger::new(&path);
    let records = reopened.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].deployment, DeploymentId::new("envs/prod"));
    assert!(reopened.has_applied("split-db", &digest).await.unwrap());
}
