use reel_admin::{backfill, collect_inputs, read_records, reconcile, seed};
use reel_core::models::{fields, POSTS};
use reel_core::posts::Posts;
use reel_core::{ArrayFieldMutator, DocumentStoreClient, Patch, SledStore};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

const USERS_JSON: &str = r#"[
  {"kind": "user", "uid": "u1", "name": "Ann Lee", "email": "ann@example.com", "bio": "hi"},
  {"kind": "user", "uid": "u2", "name": "Bob"}
]"#;

const POSTS_JSONL: &str = r#"{"kind": "post", "creator": "u1", "title": "Night Drive", "video": {"url": "https://cdn/n.mp4"}, "likes": ["u2"]}

{"kind": "post", "creator": "u2", "title": "Morning Run", "video": {"url": "https://cdn/m.mp4", "publicId": "m"}}
"#;

fn client() -> DocumentStoreClient {
    DocumentStoreClient::new(Arc::new(SledStore::temporary().unwrap()))
}

#[tokio::test]
async fn seed_directory_then_search() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("nested")).unwrap();
    // posts sort before users by path; creators must still resolve
    fs::write(dir.path().join("a_posts.jsonl"), POSTS_JSONL).unwrap();
    fs::write(dir.path().join("nested/users.json"), USERS_JSON).unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let files = collect_inputs(dir.path());
    assert_eq!(files.len(), 2);
    let mut records = Vec::new();
    for file in &files {
        records.extend(read_records(file).unwrap());
    }

    let client = client();
    let report = seed(&client, records).await.unwrap();
    assert_eq!((report.users, report.posts, report.likes), (2, 2, 1));

    let posts = Posts::new(client.clone());
    let hits = posts.search("night").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].is_liked_by("u2"));
    assert_eq!(posts.search("bo").await.unwrap()[0].title, "Morning Run");

    let clean = reconcile(&client, false).await.unwrap();
    assert_eq!(clean.posts, 2);
    assert!(clean.diverged.is_empty());
}

#[tokio::test]
async fn unknown_creator_fails_the_seed() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("posts.jsonl");
    fs::write(&file, POSTS_JSONL).unwrap();
    let err = seed(&client(), read_records(&file).unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("unknown creator"));
}

#[tokio::test]
async fn reconcile_applies_repairs() {
    let client = client();
    let dir = tempdir().unwrap();
    let users = dir.path().join("users.json");
    fs::write(&users, USERS_JSON).unwrap();
    let posts_file = dir.path().join("posts.jsonl");
    fs::write(&posts_file, POSTS_JSONL).unwrap();
    let mut records = read_records(&users).unwrap();
    records.extend(read_records(&posts_file).unwrap());
    seed(&client, records).await.unwrap();

    let post = Posts::new(client.clone()).search("morning").await.unwrap().remove(0);
    ArrayFieldMutator::new(client.clone()).union(POSTS, &post.id, fields::LIKER_IDS, "ghost").await.unwrap();

    let found = reconcile(&client, true).await.unwrap();
    assert_eq!(found.diverged.len(), 1);
    assert_eq!(found.diverged[0].orphaned_in_set, ["ghost"]);
    assert!(reconcile(&client, false).await.unwrap().diverged.is_empty());
}

#[tokio::test]
async fn backfill_rewrites_stale_shadows_once() {
    let client = client();
    client
        .add(POSTS, Patch::new().set(fields::TITLE, "Big Sur").set(fields::TITLE_LOWER, "old title"), Some("p1"))
        .await
        .unwrap();
    assert_eq!(backfill(&client).await.unwrap(), 1);
    assert_eq!(backfill(&client).await.unwrap(), 0);
    let doc = client.get_by_id(POSTS, "p1").await.unwrap().unwrap();
    assert_eq!(doc.str_field(fields::TITLE_LOWER), Some("big sur"));
}
