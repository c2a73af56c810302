use std::time::Instant;

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::Settings;
use crate::db::{self, StepRow, UploadRow, UploadStatus};
use crate::describe::Enhancer;
use crate::discover::{self, InputKind};
use crate::fetch::Storefront;
use crate::parser;
use crate::shopify::upload::{UploadReport, Uploader};
use crate::shopify::AdminClient;
use crate::transform::{self, ProductDraft, UploadOptions};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub upload: UploadOptions,
    pub collection_ids: Vec<String>,
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub force: bool,
    pub enhance: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub uploaded: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Drafts printed by a dry run.
    pub drafted: usize,
}

impl RunStats {
    pub fn print(&self) {
        if self.drafted > 0 {
            println!(
                "Done: {} products ({} drafted, {} failed).",
                self.total, self.drafted, self.failed
            );
        } else {
            println!(
                "Done: {} products ({} uploaded, {} partial, {} failed, {} skipped).",
                self.total, self.uploaded, self.partial, self.failed, self.skipped
            );
        }
    }
}

/// Scrape → transform → upload, one product URL at a time.
pub struct Pipeline<'a> {
    settings: &'a Settings,
    conn: &'a Connection,
    storefront: Storefront,
    admin: AdminClient,
    enhancer: Option<Enhancer>,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings, conn: &'a Connection) -> Result<Self> {
        let enhancer = match &settings.ai {
            Some(ai) => Some(Enhancer::new(ai, settings)?),
            None => None,
        };
        Ok(Self {
            settings,
            conn,
            storefront: Storefront::new(settings)?,
            admin: AdminClient::new(settings)?,
            enhancer,
        })
    }

    #[cfg(test)]
    fn with_admin(mut self, admin: AdminClient) -> Self {
        self.admin = admin;
        self
    }

    /// Canonical product URLs behind a product, collection or sitemap URL.
    /// These are also the ledger keys.
    pub async fn resolve_urls(&self, input_url: &str, limit: Option<usize>) -> Result<Vec<String>> {
        let kind = InputKind::classify(input_url);
        info!("Input {} is a {}", input_url, kind);
        let found = match kind {
            InputKind::Product => vec![input_url.to_string()],
            InputKind::Collection => {
                discover::scrape_collection(
                    &self.storefront,
                    input_url,
                    self.settings.collection_pages,
                )
                .await?
            }
            InputKind::Sitemap => discover::scrape_sitemap(&self.storefront, input_url).await?,
        };
        let mut urls = discover::canonical_product_urls(found);
        if let Some(n) = limit {
            urls.truncate(n);
        }
        Ok(urls)
    }

    pub async fn run(&self, input_url: &str, opts: &RunOptions) -> Result<RunStats> {
        if opts.enhance && self.enhancer.is_none() {
            bail!("--enhance needs an [ai] section with endpoint and api_key");
        }

        let urls = self.resolve_urls(input_url, opts.limit).await?;
        let mut stats = RunStats {
            total: urls.len(),
            ..Default::default()
        };
        if urls.is_empty() {
            warn!("No product URLs found at {}", input_url);
            return Ok(stats);
        }

        let mode = if opts.dry_run { "scrape" } else { "upload" };
        let run_id = db::start_run(self.conn, input_url, mode)?;
        let mut uploader = Uploader::new(&self.admin, self.settings);

        let pb = ProgressBar::new(urls.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        for url in &urls {
            let started = Instant::now();

            if !opts.dry_run && !opts.force {
                if let Some(product_id) = db::already_uploaded(self.conn, url)? {
                    info!("Skipping {}: already uploaded as {}", url, product_id);
                    let row = UploadRow {
                        source_url: url.clone(),
                        handle: None,
                        title: None,
                        product_id: Some(product_id),
                        status: UploadStatus::Skipped,
                        error: None,
                        latency_ms: None,
                    };
                    db::record_upload(self.conn, run_id, &row, &[])?;
                    stats.skipped += 1;
                    pb.inc(1);
                    continue;
                }
            }

            let draft = match self.prepare(url, opts).await {
                Ok(draft) => draft,
                Err(e) => {
                    warn!("Failed to prepare {}: {:#}", url, e);
                    if !opts.dry_run {
                        let row = failed_row(url, None, e.to_string(), started);
                        db::record_upload(self.conn, run_id, &row, &[])?;
                    }
                    stats.failed += 1;
                    pb.inc(1);
                    continue;
                }
            };

            if opts.dry_run {
                let json = serde_json::to_string_pretty(&draft.to_product_set_input())?;
                pb.suspend(|| println!("{}", json));
                stats.drafted += 1;
                pb.inc(1);
                continue;
            }

            match uploader.upload(&draft, &opts.collection_ids).await {
                Ok(report) => {
                    let status = if report.is_complete() {
                        stats.uploaded += 1;
                        UploadStatus::Uploaded
                    } else {
                        stats.partial += 1;
                        UploadStatus::Partial
                    };
                    let row = UploadRow {
                        source_url: url.clone(),
                        handle: Some(draft.handle.clone()),
                        title: Some(draft.title.clone()),
                        product_id: Some(report.product_id.clone()),
                        status,
                        error: failure_summary(&report),
                        latency_ms: Some(started.elapsed().as_millis() as i64),
                    };
                    db::record_upload(self.conn, run_id, &row, &step_rows(&report))?;
                }
                Err(e) => {
                    warn!("Upload of {} failed: {}", draft.handle, e);
                    let row = failed_row(url, Some(&draft), e.to_string(), started);
                    db::record_upload(self.conn, run_id, &row, &[])?;
                    stats.failed += 1;
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        db::finish_run(self.conn, run_id)?;
        info!(
            "Run {}: {} uploaded, {} partial, {} failed, {} skipped",
            run_id, stats.uploaded, stats.partial, stats.failed, stats.skipped
        );
        Ok(stats)
    }

    async fn prepare(&self, url: &str, opts: &RunOptions) -> Result<ProductDraft> {
        let mut scraped = parser::scrape_product(&self.storefront, url).await?;

        if opts.enhance {
            if let Some(enhancer) = &self.enhancer {
                match enhancer.rewrite(&scraped.title, &scraped.description).await {
                    Ok(html) => scraped.description = html,
                    Err(e) => warn!("Keeping scraped description for {}: {:#}", scraped.handle, e),
                }
            }
        }

        let draft = transform::build_draft(&scraped, &opts.upload, &mut rand::thread_rng())?;
        Ok(draft)
    }
}

fn failed_row(url: &str, draft: Option<&ProductDraft>, error: String, started: Instant) -> UploadRow {
    UploadRow {
        source_url: url.to_string(),
        handle: draft.map(|d| d.handle.clone()),
        title: draft.map(|d| d.title.clone()),
        product_id: None,
        status: UploadStatus::Failed,
        error: Some(error),
        latency_ms: Some(started.elapsed().as_millis() as i64),
    }
}

fn failure_summary(report: &UploadReport) -> Option<String> {
    let failed: Vec<&str> = report.failures().map(|s| s.step.as_str()).collect();
    if failed.is_empty() {
        None
    } else {
        Some(format!("failed steps: {}", failed.join(", ")))
    }
}

fn step_rows(report: &UploadReport) -> Vec<StepRow> {
    report
        .steps
        .iter()
        .map(|s| StepRow {
            step: s.step.as_str().to_string(),
            status: s.status.label().to_string(),
            detail: s.status.detail().map(String::from),
        })
        .collect()
}
