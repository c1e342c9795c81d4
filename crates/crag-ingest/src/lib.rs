//! Walks a directory of captured pages and loads them into the record store.
//!
//! Users already present in the store are skipped wholesale: the known-id set
//! is snapshotted once at the start of the run, so a profile inserted during
//! the walk does not shadow its own ascent-list file.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use crag_core::{AscentRecord, PageKind, UserId};
use crag_parsers::{ascent_records, parse_profile};
use crag_storage::{classify_capture_name, CaptureStore, RecordStore};
use scraper::Html;
use tracing::{error, info, warn};

/// Per-run tally returned by [`run_ingest`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub profiles: usize,
    pub ascent_lists: usize,
    pub skipped: usize,
    pub unrecognized: usize,
    pub failed: usize,
}

enum FileOutcome {
    Profile,
    AscentList(usize),
    Skipped,
    Unrecognized,
}

/// Ingests every capture under `input` into `store`.
///
/// File names are visited in descending lexicographic order. A failure in one
/// file is logged and never aborts the walk.
pub async fn run_ingest(input: &Path, store: &RecordStore) -> anyhow::Result<IngestSummary> {
    let known = store.user_ids().await?;
    let captures = CaptureStore::new(input);

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(input)
        .await
        .with_context(|| format!("reading capture directory {}", input.display()))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .context("walking capture directory")?
    {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort_unstable_by(|a, b| b.cmp(a));

    let mut summary = IngestSummary::default();
    for name in &names {
        match ingest_file(&captures, store, &known, name).await {
            Ok(FileOutcome::Profile) => summary.profiles += 1,
            Ok(FileOutcome::AscentList(count)) => {
                summary.ascent_lists += 1;
                info!(file = %name, rows = count, "stored ascent rows");
            }
            Ok(FileOutcome::Skipped) => summary.skipped += 1,
            Ok(FileOutcome::Unrecognized) => summary.unrecognized += 1,
            Err(err) => {
                error!(file = %name, error = %format!("{err:#}"), "failed to ingest capture");
                summary.failed += 1;
            }
        }
    }

    info!(
        profiles = summary.profiles,
        ascent_lists = summary.ascent_lists,
        skipped = summary.skipped,
        unrecognized = summary.unrecognized,
        failed = summary.failed,
        "ingest finished"
    );
    Ok(summary)
}

async fn ingest_file(
    captures: &CaptureStore,
    store: &RecordStore,
    known: &HashSet<UserId>,
    name: &str,
) -> anyhow::Result<FileOutcome> {
    let Some((kind, prefix)) = classify_capture_name(name) else {
        warn!(file = %name, "unrecognized file name, skipping");
        return Ok(FileOutcome::Unrecognized);
    };
    let user_id: UserId = prefix
        .parse()
        .with_context(|| format!("parsing user id from `{name}`"))?;

    if known.contains(&user_id) {
        info!(file = %name, user_id, "user already stored, skipping");
        return Ok(FileOutcome::Skipped);
    }

    let html = captures.read(name).await?;
    match kind {
        PageKind::Profile => {
            info!(file = %name, user_id, "parsing profile page");
            let profile = parse_profile(user_id, &html)?;
            store.insert_user(&profile).await?;
            Ok(FileOutcome::Profile)
        }
        PageKind::AscentList => {
            info!(file = %name, user_id, "parsing ascent list");
            let document = Html::parse_document(&html);
            let records: Vec<AscentRecord> =
                ascent_records(&document, user_id).collect::<Result<_, _>>()?;
            let count = records.len();
            store.insert_ascents(&records).await?;
            Ok(FileOutcome::AscentList(count))
        }
    }
}
