//! End-to-end scenarios exercising login, create/list, revisioning, child
//! collections, and tamper detection together.

mod common;

use clinical_store::session::{bootstrap, create_account, Session};
use clinical_store::Error;
use serde_json::json;

async fn login_admin(data_dir: &std::path::Path) -> Session {
    common::init_tracing();
    let models = vec![common::client_file_model()];
    bootstrap(data_dir, &models).await.unwrap();
    create_account(data_dir, "admin", "pw").await.unwrap();
    Session::login(data_dir, "admin", "pw").await.unwrap()
}

#[tokio::test]
async fn scenario_1_create_then_list() {
    let dir = tempfile::tempdir().unwrap();
    let session = login_admin(dir.path()).await;
    let client_files = session.collection(common::client_file_model());

    let created = client_files
        .create(
            json!({
                "clientName": {"first": "Ada", "middle": "", "last": "Lovelace"},
                "recordId": "R-1",
                "plan": {"sections": []}
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .await
        .unwrap();
    assert_eq!(created["recordId"], "R-1");

    let entries = client_files.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].indexed_fields["clientName.first"], "Ada");
    assert_eq!(entries[0].indexed_fields["clientName.last"], "Lovelace");
}

#[tokio::test]
async fn scenario_2_create_revision_renames_directory() {
    let dir = tempfile::tempdir().unwrap();
    let session = login_admin(dir.path()).await;
    let client_files = session.collection(common::client_file_model());

    let created = client_files
        .create(
            json!({
                "clientName": {"first": "Ada", "middle": "", "last": "Lovelace"},
                "recordId": "R-1",
                "plan": {"sections": []}
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let mut revised = created.clone();
    revised
        .get_mut("clientName")
        .unwrap()
        .as_object_mut()
        .unwrap()
        .insert("last".to_string(), json!("Byron"));
    client_files.create_revision(revised).await.unwrap();

    let entries = client_files.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].indexed_fields["clientName.last"], "Byron");
    assert!(entries[0].indexed_fields["clientName.last"] != "Lovelace");

    let revisions = client_files.list_revisions(&id).await.unwrap();
    assert_eq!(revisions.len(), 2);
    assert!(revisions[0].timestamp <= revisions[1].timestamp);
}

#[tokio::test]
async fn scenario_3_child_collection_create_and_validation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let session = login_admin(dir.path()).await;
    let client_files = session.collection(common::client_file_model());

    let client = client_files
        .create(
            json!({
                "clientName": {"first": "Ada", "middle": "", "last": "Lovelace"},
                "recordId": "R-1",
                "plan": {"sections": []}
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .await
        .unwrap();
    let client_id = client["id"].as_str().unwrap().to_string();

    let prog_notes = client_files
        .child_collection("progNotes", &client_id)
        .unwrap();

    let note = prog_notes
        .create(
            json!({
                "clientFileId": client_id,
                "type": "basic",
                "status": "default",
                "notes": "hello",
                "backdate": ""
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .await
        .unwrap();
    assert_eq!(note["notes"], "hello");

    let missing_status = prog_notes
        .create(
            json!({
                "clientFileId": client_id,
                "type": "basic",
                "notes": "hello",
                "backdate": ""
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .await;
    assert!(matches!(missing_status, Err(Error::Validation { .. })));
}

#[tokio::test]
async fn scenario_5_integrity_violation_via_copied_ciphertext() {
    let dir = tempfile::tempdir().unwrap();
    let session = login_admin(dir.path()).await;
    let client_files = session.collection(common::client_file_model());

    let x = client_files
        .create(
            json!({
                "clientName": {"first": "Ada", "middle": "", "last": "Lovelace"},
                "recordId": "R-X",
                "plan": {"sections": []}
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .await
        .unwrap();
    let y = client_files
        .create(
            json!({
                "clientName": {"first": "Grace", "middle": "", "last": "Hopper"},
                "recordId": "R-Y",
                "plan": {"sections": []}
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .await
        .unwrap();

    let entries = client_files.list().await.unwrap();
    let x_dir = entries
        .iter()
        .find(|e| e.id == x["id"].as_str().unwrap())
        .unwrap()
        .dir_path
        .clone();
    let y_dir = entries
        .iter()
        .find(|e| e.id == y["id"].as_str().unwrap())
        .unwrap()
        .dir_path
        .clone();

    let mut x_files = tokio::fs::read_dir(&x_dir).await.unwrap();
    let mut x_revision_file = None;
    while let Some(entry) = x_files.next_entry().await.unwrap() {
        if entry.file_type().await.unwrap().is_file() {
            x_revision_file = Some(entry.path());
            break;
        }
    }
    let x_revision_file = x_revision_file.expect("clientFile object has a revision file");

    tokio::fs::copy(&x_revision_file, y_dir.join(x_revision_file.file_name().unwrap()))
        .await
        .unwrap();

    let result = client_files.read_revisions(y["id"].as_str().unwrap()).await;
    assert!(matches!(result, Err(Error::Integrity { .. })));
}

#[tokio::test]
async fn scenario_6_read_latest_revisions_zero_skips_decryption() {
    let dir = tempfile::tempdir().unwrap();
    let session = login_admin(dir.path()).await;
    let client_files = session.collection(common::client_file_model());

    let created = client_files
        .create(
            json!({
                "clientName": {"first": "Ada", "middle": "", "last": "Lovelace"},
                "recordId": "R-1",
                "plan": {"sections": []}
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .await
        .unwrap();

    let revisions = client_files
        .read_latest_revisions(created["id"].as_str().unwrap(), 0)
        .await
        .unwrap();
    assert!(revisions.is_empty());
}
