//! Round-trip, rename, revision-ordering, and tamper-detection properties
//! of the collection engine. Lock exclusion/reclaim and filename codec
//! properties are covered as unit tests alongside the lock manager and
//! filename codec, where the infrastructure they need (short leases, raw
//! byte-string generators) already lives.

mod common;

use clinical_store::session::{bootstrap, create_account, Session};
use clinical_store::Error;
use rstest::rstest;
use serde_json::json;

async fn login_admin(data_dir: &std::path::Path) -> Session {
    common::init_tracing();
    let models = vec![common::client_file_model()];
    bootstrap(data_dir, &models).await.unwrap();
    create_account(data_dir, "admin", "pw").await.unwrap();
    Session::login(data_dir, "admin", "pw").await.unwrap()
}

#[rstest]
#[case("Ada", "Lovelace", "R-1")]
#[case("Grace", "Hopper", "R-2")]
#[case("Katherine", "Johnson", "R-3")]
#[tokio::test]
async fn p1_round_trip_create_then_read(#[case] first: &str, #[case] last: &str, #[case] record_id: &str) {
    let dir = tempfile::tempdir().unwrap();
    let session = login_admin(dir.path()).await;
    let client_files = session.collection(common::client_file_model());

    let input = json!({
        "clientName": {"first": first, "middle": "", "last": last},
        "recordId": record_id,
        "plan": {"sections": []}
    });
    let created = client_files
        .create(input.as_object().unwrap().clone())
        .await
        .unwrap();

    let id = created["id"].as_str().unwrap();
    let read_back = client_files.read_latest_revisions(id, 1).await.unwrap();
    assert_eq!(read_back.len(), 1);
    assert_eq!(read_back[0], created);
}

#[tokio::test]
async fn p2_rename_on_index_change() {
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

    let mut revised = created.clone();
    revised
        .get_mut("clientName")
        .unwrap()
        .as_object_mut()
        .unwrap()
        .insert("first".to_string(), json!("Augusta"));
    client_files.create_revision(revised).await.unwrap();

    let entries = client_files.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].indexed_fields["clientName.first"], "Augusta");
    assert!(entries
        .iter()
        .all(|e| e.indexed_fields["clientName.first"] != "Ada"));
}

#[tokio::test]
async fn p3_revision_list_is_sorted_and_grows_by_one() {
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

    let before = client_files.list_revisions(&id).await.unwrap();
    assert_eq!(before.len(), 1);

    let mut revised = created.clone();
    revised.insert("recordId".to_string(), json!("R-1-updated"));
    let new_revision = client_files.create_revision(revised).await.unwrap();

    let after = client_files.list_revisions(&id).await.unwrap();
    assert_eq!(after.len(), 2);
    for window in after.windows(2) {
        assert!(window[0].timestamp <= window[1].timestamp);
    }
    assert_eq!(
        after.last().unwrap().revision_id,
        new_revision["revisionId"].as_str().unwrap()
    );
}

#[tokio::test]
async fn p4_moved_ciphertext_fails_integrity_check() {
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

    let mut reader = tokio::fs::read_dir(&x_dir).await.unwrap();
    let mut x_revision_file = None;
    while let Some(entry) = reader.next_entry().await.unwrap() {
        if entry.file_type().await.unwrap().is_file() {
            x_revision_file = Some(entry.path());
            break;
        }
    }
    let x_revision_file = x_revision_file.unwrap();

    tokio::fs::copy(
        &x_revision_file,
        y_dir.join(x_revision_file.file_name().unwrap()),
    )
    .await
    .unwrap();

    let result = client_files.read_revisions(y["id"].as_str().unwrap()).await;
    assert!(matches!(result, Err(Error::Integrity { .. })));
}
