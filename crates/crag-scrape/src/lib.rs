//! Concurrent, resumable crawl over a numeric profile-identifier range.
//!
//! The scheduler preloads a shared depletion-only queue and runs a fixed
//! pool of fetch workers until it drains. Each worker owns one browser
//! session; per-identifier failures become exception-ledger entries and
//! never abort the pool. Ledger writes flow through a single consumer task
//! so workers never share a database handle.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use crag_core::{PageKind, UserId};
use crag_storage::{CaptureStore, RecordStore};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use url::Url;

pub const CRATE_NAME: &str = "crag-scrape";

const PROFILE_URL_BASE: &str = "https://www.8a.nu/User/Profile.aspx?UserId=";
const PROFILE_FRAME_SELECTOR: &str = "frame#main";
const BOULDERS_LINK_XPATH: &str = "//a[normalize-space(text())='Boulders']";
const ALL_ASCENTS_LINK_XPATH: &str = "//a[contains(text(), 'All Ascents')]";

pub fn profile_url(user_id: UserId) -> String {
    format!("{PROFILE_URL_BASE}{user_id}")
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("browser configuration: {0}")]
    Browser(String),
    #[error("expected element `{0}` not found")]
    MissingElement(&'static str),
    #[error("invalid frame url: {0}")]
    Url(#[from] url::ParseError),
}

/// Both pages of one identifier, captured within a single session.
#[derive(Debug, Clone)]
pub struct CapturedPair {
    pub profile_html: String,
    pub ascents_html: String,
}

/// The browser capability a fetch worker depends on. One session serves
/// many identifiers and is closed when the worker's queue runs dry.
#[async_trait]
pub trait ProfileSession: Send {
    async fn capture(&mut self, user_id: UserId) -> Result<CapturedPair, SessionError>;
    async fn close(self) -> Result<(), SessionError>;
}

/// Opens one session per worker.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: ProfileSession + 'static;
    async fn open(&self) -> Result<Self::Session, SessionError>;
}

/// Chromium-backed session. The profile content lives in an embedded
/// frame, so the session resolves the frame's `src` against the profile
/// URL and navigates into it before capturing; the ascent list is reached
/// through two in-page link navigations.
pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeSessionFactory;

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    type Session = ChromeSession;

    async fn open(&self) -> Result<ChromeSession, SessionError> {
        let config = BrowserConfig::builder()
            .build()
            .map_err(SessionError::Browser)?;
        let (browser, mut events) = Browser::launch(config).await?;
        // The handler stream must be drained for the CDP connection to
        // make progress.
        let handler = tokio::spawn(async move { while events.next().await.is_some() {} });
        Ok(ChromeSession { browser, handler })
    }
}

impl ChromeSession {
    async fn capture_on(page: &Page, base_url: &str) -> Result<CapturedPair, SessionError> {
        let frame = page.find_element(PROFILE_FRAME_SELECTOR).await?;
        let src = frame
            .attribute("src")
            .await?
            .ok_or(SessionError::MissingElement("frame#main src"))?;
        let frame_url = Url::parse(base_url)?.join(&src)?;
        page.goto(frame_url.as_str()).await?;
        let profile_html = page.content().await?;

        page.find_xpath(BOULDERS_LINK_XPATH).await?.click().await?;
        page.wait_for_navigation().await?;
        page.find_xpath(ALL_ASCENTS_LINK_XPATH).await?.click().await?;
        page.wait_for_navigation().await?;
        let ascents_html = page.content().await?;

        Ok(CapturedPair {
            profile_html,
            ascents_html,
        })
    }
}

#[async_trait]
impl ProfileSession for ChromeSession {
    async fn capture(&mut self, user_id: UserId) -> Result<CapturedPair, SessionError> {
        let url = profile_url(user_id);
        let page = self.browser.new_page(url.as_str()).await?;
        let result = Self::capture_on(&page, &url).await;
        let _ = page.close().await;
        result
    }

    async fn close(mut self) -> Result<(), SessionError> {
        self.browser.close().await?;
        self.handler.abort();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// First identifier of the range, inclusive.
    pub start: UserId,
    /// End of the range, exclusive.
    pub end: UserId,
    pub output_dir: PathBuf,
    pub workers: usize,
}

#[derive(Debug)]
struct ExceptionReport {
    user_id: UserId,
    reason: String,
}

type WorkQueue = Arc<Mutex<VecDeque<UserId>>>;

fn next_item(queue: &WorkQueue) -> Option<UserId> {
    queue.lock().expect("work queue poisoned").pop_front()
}

/// Sole writer of the exception ledger; workers report through the channel.
async fn ledger_writer(store: RecordStore, mut reports: mpsc::Receiver<ExceptionReport>) {
    while let Some(report) = reports.recv().await {
        if let Err(err) = store.insert_exception(report.user_id, &report.reason).await {
            error!(user_id = report.user_id, error = %err, "failed to record exception");
        }
    }
}

async fn store_pair(
    captures: &CaptureStore,
    user_id: UserId,
    pair: &CapturedPair,
) -> anyhow::Result<()> {
    captures
        .write(user_id, PageKind::Profile, &pair.profile_html)
        .await?;
    captures
        .write(user_id, PageKind::AscentList, &pair.ascents_html)
        .await?;
    Ok(())
}

async fn worker_loop<S: ProfileSession>(
    worker: usize,
    queue: WorkQueue,
    captures: CaptureStore,
    ledgered: Arc<HashSet<UserId>>,
    reports: mpsc::Sender<ExceptionReport>,
    mut session: S,
) {
    while let Some(user_id) = next_item(&queue) {
        if captures.is_complete(user_id).await {
            info!(worker, user_id, "captures already exist, skipping");
            continue;
        }
        if ledgered.contains(&user_id) {
            info!(worker, user_id, "in exception ledger, skipping");
            continue;
        }

        info!(worker, user_id, url = %profile_url(user_id), "scraping");
        let outcome = match session.capture(user_id).await {
            Ok(pair) => store_pair(&captures, user_id, &pair)
                .await
                .map_err(|err| format!("{err:#}")),
            Err(err) => Err(err.to_string()),
        };
        match outcome {
            Ok(()) => info!(worker, user_id, "scraped"),
            Err(reason) => {
                warn!(worker, user_id, %reason, "fetch failed, recording exception");
                let _ = reports
                    .send(ExceptionReport { user_id, reason })
                    .await;
            }
        }
    }

    if let Err(err) = session.close().await {
        warn!(worker, error = %err, "failed to close session");
    }
}

/// Run the scrape phase: preload the queue with `[start, end)`, spawn the
/// worker pool and wait for drain. Per-identifier failures never surface
/// here; only environment-level failures (database, output directory,
/// browser launch) abort the run.
pub async fn run_scrape<F>(
    config: ScrapeConfig,
    factory: F,
    store: RecordStore,
) -> anyhow::Result<()>
where
    F: SessionFactory,
{
    let captures = CaptureStore::new(&config.output_dir);
    captures.ensure_root().await?;

    let ledgered = Arc::new(store.exception_ids().await?);

    let ids: VecDeque<UserId> = (config.start..config.end).collect();
    info!(
        size = ids.len(),
        start = config.start,
        end = config.end,
        "loading identifier range into the queue"
    );
    let queue: WorkQueue = Arc::new(Mutex::new(ids));

    let (reports, inbox) = mpsc::channel(64);
    let ledger = tokio::spawn(ledger_writer(store.clone(), inbox));

    let mut workers = Vec::new();
    for worker in 0..config.workers.max(1) {
        let session = factory.open().await?;
        workers.push(tokio::spawn(worker_loop(
            worker,
            queue.clone(),
            captures.clone(),
            ledgered.clone(),
            reports.clone(),
            session,
        )));
    }
    drop(reports);

    for handle in workers {
        if let Err(err) = handle.await {
            error!(error = %err, "worker task failed");
        }
    }
    let _ = ledger.await;
    Ok(())
}
