use anyhow::{bail, Context, Result};
use reel_core::likes::{LikeAudit, Likes};
use reel_core::models::{fields, CurrentUser, MediaRef, POSTS, USERS};
use reel_core::optimistic::RemoteToggle;
use reel_core::posts::{NewPost, Posts};
use reel_core::profiles::{ProfileEdit, Profiles};
use reel_core::search::normalize;
use reel_core::{Document, DocumentStoreClient, PairKey, Patch};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};
use walkdir::WalkDir;

/// One line (or array element) of a seed file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SeedRecord {
    User {
        uid: String,
        name: String,
        #[serde(default)]
        email: String,
        #[serde(default)]
        avatar: String,
        #[serde(default)]
        bio: String,
    },
    Post {
        /// uid of a user seeded earlier or already stored
        creator: String,
        title: String,
        #[serde(default)]
        description: String,
        video: MediaRef,
        #[serde(default)]
        thumbnail: MediaRef,
        #[serde(default)]
        likes: Vec<String>,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub users: usize,
    pub posts: usize,
    pub likes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub generated_at: String,
    pub posts: usize,
    pub applied: bool,
    pub diverged: Vec<LikeAudit>,
}

/// JSON and JSONL files under `input`, or `input` itself.
pub fn collect_inputs(input: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

pub fn read_records(file: &Path) -> Result<Vec<SeedRecord>> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut records = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: SeedRecord = serde_json::from_str(&line).with_context(|| format!("{} line {}", file.display(), n + 1))?;
            records.push(record);
        }
        return Ok(records);
    }
    let json: serde_json::Value = serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    match json {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(anyhow::Error::from))
            .collect(),
        serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(json)?]),
        _ => bail!("{} holds neither an object nor an array", file.display()),
    }
}

/// Users first, so posts can refer to creators from any file.
pub async fn seed(client: &DocumentStoreClient, mut records: Vec<SeedRecord>) -> Result<SeedReport> {
    records.sort_by_key(|r| matches!(r, SeedRecord::Post { .. }));
    let profiles = Profiles::new(client.clone());
    let posts = Posts::new(client.clone());
    let likes = Likes::new(client.clone());
    let mut report = SeedReport::default();

    for record in records {
        match record {
            SeedRecord::User { uid, name, email, avatar, bio } => {
                let user = CurrentUser::new(uid, name, avatar);
                profiles.register(&user, &email).await?;
                if !bio.is_empty() {
                    profiles.update(&user.uid, ProfileEdit { bio: Some(bio), ..Default::default() }).await?;
                }
                report.users += 1;
            }
            SeedRecord::Post { creator, title, description, video, thumbnail, likes: likers } => {
                let Some(profile) = profiles.get(&creator).await? else {
                    bail!("post {title:?} names unknown creator {creator}");
                };
                let post = posts
                    .publish(&profile.current_user(), NewPost { title, description, video, thumbnail })
                    .await?;
                report.posts += 1;
                for uid in likers {
                    let liker = match profiles.get(&uid).await? {
                        Some(profile) => profile.current_user(),
                        None => CurrentUser::new(uid.as_str(), uid.as_str(), ""),
                    };
                    let key = PairKey::new(uid, &post.id);
                    likes.writes(liker).switch_on(&key).await?;
                    report.likes += 1;
                }
            }
        }
    }
    info!(users = report.users, posts = report.posts, likes = report.likes, "seed complete");
    Ok(report)
}

/// Audit every post's like invariant; with `apply`, repair the ones that
/// diverged.
pub async fn reconcile(client: &DocumentStoreClient, apply: bool) -> Result<ReconcileReport> {
    let likes = Likes::new(client.clone());
    let docs = client.get_all(POSTS).await?;
    let mut diverged = Vec::new();
    for doc in &docs {
        let audit = if apply { likes.repair(&doc.id).await } else { likes.audit(&doc.id).await };
        match audit {
            Ok(audit) if !audit.is_consistent() => diverged.push(audit),
            Ok(_) => {}
            Err(err) => warn!(id = %doc.id, error = %err, "skipping post"),
        }
    }
    info!(posts = docs.len(), diverged = diverged.len(), applied = apply, "reconcile finished");
    Ok(ReconcileReport {
        generated_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "".into()),
        posts: docs.len(),
        applied: apply,
        diverged,
    })
}

/// Rewrite lower-cased shadow fields that no longer match their display
/// field. Returns how many documents changed.
pub async fn backfill(client: &DocumentStoreClient) -> Result<usize> {
    let mut rewritten = 0;
    for doc in client.get_all(POSTS).await? {
        let patch = stale_shadows(&doc, &[(fields::TITLE, fields::TITLE_LOWER), (fields::CREATOR_NAME, fields::CREATOR_NAME_LOWER)]);
        if !patch.is_empty() {
            client.update(POSTS, &doc.id, &patch).await?;
            rewritten += 1;
        }
    }
    for doc in client.get_all(USERS).await? {
        let patch = stale_shadows(&doc, &[(fields::NAME, fields::NAME_LOWER)]);
        if !patch.is_empty() {
            client.update(USERS, &doc.id, &patch).await?;
            rewritten += 1;
        }
    }
    info!(rewritten, "shadow fields backfilled");
    Ok(rewritten)
}

fn stale_shadows(doc: &Document, pairs: &[(&str, &str)]) -> Patch {
    let mut patch = Patch::new();
    for (display, shadow) in pairs {
        let Some(text) = doc.str_field(display) else { continue };
        let expected = normalize(text);
        if doc.str_field(shadow) != Some(expected.as_str()) {
            patch = patch.set(*shadow, expected);
        }
    }
    patch
}
