//! Ingest jobs and the orchestrator that runs them.
//!
//! Each job is Fetcher → Extractor → Normalizer → Linker with one write
//! transaction per logical batch. Record-scope failures are logged and
//! counted; transport and store failures abort the job.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{
    Config, DEFAULT_EVENT_CARDS_LIMIT, DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_PROFILE_LIMIT, EVENTS_LIST_URL, RANKINGS_URL,
    STATS_ARCHIVE_URL,
};
use crate::db::{writer, Store, StoreLock};
use crate::error::{AppError, FetchError, Result};
use crate::extract::{
    EventPageExtractor, EventsListExtractor, Extracted, Extractor, FighterProfileExtractor, RankingsExtractor,
    StatsArchiveExtractor,
};
use crate::fetcher::{Fetch, SourceDescriptor};
use crate::linker::{LinkCounts, Linker};
use crate::normalize::{looks_like_person_name, Normalizer};
use crate::types::ArchiveRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Rankings,
    Events,
    EventCards,
    Profiles,
    Stats,
    /// events, event-cards, rankings, profiles, stats
    All,
}

impl JobKind {
    /// Concrete jobs in run order.
    pub fn expand(self) -> Vec<JobKind> {
        match self {
            JobKind::All => vec![
                JobKind::Events,
                JobKind::EventCards,
                JobKind::Rankings,
                JobKind::Profiles,
                JobKind::Stats,
            ],
            job => vec![job],
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::Rankings => "rankings",
            JobKind::Events => "events",
            JobKind::EventCards => "event-cards",
            JobKind::Profiles => "profiles",
            JobKind::Stats => "stats",
            JobKind::All => "all",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Serialize)]
pub struct JobReport {
    /// Payloads fetched.
    pub fetched: u64,
    /// Staging records produced by the extractor.
    pub extracted: u64,
    /// Records skipped by the extractor or the normalizer.
    pub rejected: u64,
    /// Payloads whose expected structure was missing.
    pub parse_errors: u64,
    /// Fight rows rewritten from a short event name.
    pub backfilled: u64,
    /// Archive names that matched a stored fighter.
    pub names_matched: u64,
    pub link: LinkCounts,
}

impl JobReport {
    fn absorb<R>(&mut self, extracted: &Extracted<R>) {
        self.extracted += extracted.records.len() as u64;
        self.rejected += extracted.rejected.len() as u64;
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} extracted={} rejected={} parse_errors={} created={} updated={} unchanged={} \
             invalid={} buffered={} quarantined={}",
            self.fetched,
            self.extracted,
            self.rejected,
            self.parse_errors,
            self.link.created,
            self.link.updated,
            self.link.unchanged,
            self.link.rejected,
            self.link.buffered,
            self.link.quarantined,
        )?;
        if self.backfilled > 0 {
            write!(f, " backfilled={}", self.backfilled)?;
        }
        if self.names_matched > 0 {
            write!(f, " names_matched={}", self.names_matched)?;
        }
        Ok(())
    }
}

/// Outcome of one `ingest` invocation.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub jobs: Vec<(JobKind, JobReport)>,
    /// Final retry of buffered round statistics.
    pub retry: LinkCounts,
}

impl RunReport {
    pub fn job(&self, kind: JobKind) -> Option<&JobReport> {
        self.jobs.iter().find(|(k, _)| *k == kind).map(|(_, r)| r)
    }

    pub fn quarantined(&self) -> u64 {
        self.jobs.iter().map(|(_, r)| r.link.quarantined).sum::<u64>() + self.retry.quarantined
    }

    /// 1 when any record was quarantined, else 0.
    pub fn exit_code(&self) -> u8 {
        if self.quarantined() > 0 {
            1
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Sources {
    pub events_list: String,
    pub rankings: String,
    pub stats_archive: String,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            events_list: EVENTS_LIST_URL.to_string(),
            rankings: RANKINGS_URL.to_string(),
            stats_archive: STATS_ARCHIVE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub sources: Sources,
    /// Events visited per `event-cards` run.
    pub card_limit: usize,
    /// Profile pages visited per `profiles` run.
    pub profile_limit: usize,
    /// Wall-clock budget of each job.
    pub job_timeout: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            sources: Sources::default(),
            card_limit: DEFAULT_EVENT_CARDS_LIMIT,
            profile_limit: DEFAULT_PROFILE_LIMIT,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
        }
    }
}

pub struct Orchestrator<F: Fetch> {
    store: Store,
    fetcher: F,
    normalizer: Normalizer,
    clock: Arc<dyn Clock>,
    opts: IngestOptions,
    linker: Linker,
}

impl<F: Fetch> Orchestrator<F> {
    pub fn new(store: Store, fetcher: F, clock: Arc<dyn Clock>, opts: IngestOptions) -> Self {
        let linker = Linker::new(clock.now());
        Self {
            store,
            fetcher,
            normalizer: Normalizer::new(),
            clock,
            opts,
            linker,
        }
    }

    /// Run the selected jobs in order, then retry buffered round statistics
    /// once and quarantine what is still unresolved.
    pub async fn run(&mut self, kind: JobKind) -> Result<RunReport> {
        let mut report = RunReport::default();
        for job in kind.expand() {
            let started = Instant::now();
            let budget = self.opts.job_timeout;
            // Dropping the job future rolls back its open transaction.
            let job_report = match tokio::time::timeout(budget, self.run_job(job)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(AppError::JobTimeout(format!(
                        "{job} exceeded its {}s budget",
                        budget.as_secs_f64()
                    )))
                }
            };
            info!(
                "[JOBS] {job} finished in {:.1}s: {job_report}",
                started.elapsed().as_secs_f64()
            );
            report.jobs.push((job, job_report));
        }

        if self.linker.pending() > 0 {
            let mut tx = self.store.begin().await?;
            self.linker.flush_pending(&mut tx, &mut report.retry).await?;
            tx.commit().await?;
            info!(
                "[JOBS] retried buffered round stats: linked={} quarantined={}",
                report.retry.linked(),
                report.retry.quarantined
            );
        }
        Ok(report)
    }

    async fn run_job(&mut self, job: JobKind) -> Result<JobReport> {
        self.linker.set_now(self.clock.now());
        let mut report = JobReport::default();
        match job {
            JobKind::Events => self.ingest_events(&mut report).await?,
            JobKind::EventCards => self.ingest_event_cards(&mut report).await?,
            JobKind::Rankings => self.ingest_rankings(&mut report).await?,
            JobKind::Profiles => self.ingest_profiles(&mut report).await?,
            JobKind::Stats => self.ingest_stats(&mut report).await?,
            JobKind::All => return Err(AppError::Config("'all' is not a single job".into())),
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // events
    // -----------------------------------------------------------------------

    async fn ingest_events(&mut self, report: &mut JobReport) -> Result<()> {
        let url = self.opts.sources.events_list.clone();
        let raw = self.fetcher.fetch(&SourceDescriptor::http(&url)).await?;
        report.fetched += 1;

        let extracted = match EventsListExtractor.extract(&raw) {
            Ok(x) => x,
            Err(e) => {
                warn!("[EVENTS] {url}: {e}");
                report.parse_errors += 1;
                return Ok(());
            }
        };
        report.absorb(&extracted);

        for staging in &extracted.records {
            let event = match self.normalizer.canonical_event(staging) {
                Ok(e) => e,
                Err(e) => {
                    warn!("[EVENTS] {}: {e}", staging.name);
                    report.rejected += 1;
                    continue;
                }
            };
            let mut tx = self.store.begin().await?;
            let (id, change, backfilled) = self.linker.link_event(&mut tx, &event).await?;
            tx.commit().await?;
            debug!("[EVENTS] #{id} {} {change:?}", event.name);
            report.link.record(change);
            report.backfilled += backfilled;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // event-cards
    // -----------------------------------------------------------------------

    async fn ingest_event_cards(&mut self, report: &mut JobReport) -> Result<()> {
        let events = {
            let mut conn = self.store.pool().acquire().await?;
            writer::events_for_cards(&mut conn, self.opts.card_limit as i64).await?
        };
        info!("[CARDS] visiting {} event pages", events.len());

        for event in events {
            let Some(url) = event.source_url.clone() else {
                continue;
            };
            let raw = self.fetcher.fetch(&SourceDescriptor::http(&url)).await?;
            report.fetched += 1;

            let extracted = match EventPageExtractor.extract(&raw) {
                Ok(x) => x,
                Err(e) => {
                    warn!("[CARDS] {}: {e}", event.name);
                    report.parse_errors += 1;
                    continue;
                }
            };
            report.absorb(&extracted);

            let date = event
                .date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
            let mut fights = Vec::with_capacity(extracted.records.len());
            for staging in &extracted.records {
                match self.normalizer.canonical_fight(staging, &event.name, date) {
                    Ok(f) => fights.push(f),
                    Err(e) => {
                        warn!("[CARDS] {}: {e}", event.name);
                        report.rejected += 1;
                    }
                }
            }

            let mut tx = self.store.begin().await?;
            self.linker.link_fights(&mut tx, &event.name, &fights, &mut report.link).await?;
            tx.commit().await?;
            debug!("[CARDS] {}: {} bouts", event.name, fights.len());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // rankings
    // -----------------------------------------------------------------------

    async fn ingest_rankings(&mut self, report: &mut JobReport) -> Result<()> {
        let url = self.opts.sources.rankings.clone();
        let raw = self.fetcher.fetch(&SourceDescriptor::http(&url)).await?;
        report.fetched += 1;

        let extracted = match RankingsExtractor.extract(&raw) {
            Ok(x) => x,
            Err(e) => {
                warn!("[RANKINGS] {url}: {e}");
                report.parse_errors += 1;
                return Ok(());
            }
        };
        report.absorb(&extracted);

        for list in &extracted.records {
            let (ranking, rejected) = match self.normalizer.canonical_ranking(list) {
                Ok(r) => r,
                Err(e) => {
                    warn!("[RANKINGS] {e}");
                    report.rejected += 1;
                    continue;
                }
            };
            for e in &rejected {
                warn!("[RANKINGS] {e}");
            }
            report.rejected += rejected.len() as u64;

            let mut tx = self.store.begin().await?;
            self.linker.link_ranking(&mut tx, &ranking, &mut report.link).await?;
            tx.commit().await?;
            debug!("[RANKINGS] {}: {} entries", ranking.weight_class, ranking.entries.len());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // profiles
    // -----------------------------------------------------------------------

    /// Visit stored profile pages of fighters still missing a birth date. A
    /// page answering with an HTTP error is skipped; transport failures abort.
    async fn ingest_profiles(&mut self, report: &mut JobReport) -> Result<()> {
        let fighters = {
            let mut conn = self.store.pool().acquire().await?;
            writer::fighters_for_profiles(&mut conn, self.opts.profile_limit as i64).await?
        };
        info!("[PROFILES] visiting {} profile pages", fighters.len());

        for fighter in fighters {
            let Some(url) = fighter.profile_url.clone() else {
                continue;
            };
            let raw = match self.fetcher.fetch(&SourceDescriptor::http(&url)).await {
                Ok(raw) => raw,
                Err(e @ FetchError::Http { .. }) => {
                    warn!("[PROFILES] fighter #{}: {e}", fighter.id);
                    report.rejected += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            report.fetched += 1;

            let extracted = match FighterProfileExtractor.extract(&raw) {
                Ok(x) => x,
                Err(e) => {
                    warn!("[PROFILES] {url}: {e}");
                    report.parse_errors += 1;
                    continue;
                }
            };
            report.absorb(&extracted);

            for staging in &extracted.records {
                let profile = match self.normalizer.canonical_profile(staging, &url) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("[PROFILES] {e}");
                        report.rejected += 1;
                        continue;
                    }
                };
                let mut tx = self.store.begin().await?;
                let change = self.linker.enrich_fighter(&mut tx, fighter.id, &profile).await?;
                tx.commit().await?;
                debug!("[PROFILES] #{} {} {change:?}", fighter.id, profile.name.display());
                report.link.record(change);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // stats
    // -----------------------------------------------------------------------

    async fn ingest_stats(&mut self, report: &mut JobReport) -> Result<()> {
        let url = self.opts.sources.stats_archive.clone();
        let raw = self.fetcher.fetch(&SourceDescriptor::gzip_archive(&url)).await?;
        report.fetched += 1;

        let extracted = match StatsArchiveExtractor.extract(&raw) {
            Ok(x) => x,
            Err(e) => {
                warn!("[STATS] {url}: {e}");
                report.parse_errors += 1;
                return Ok(());
            }
        };
        report.absorb(&extracted);

        // Rows of one fight share an event; the archive is one batch.
        let mut tx = self.store.begin().await?;
        let mut per_event: HashMap<String, u64> = HashMap::new();
        for record in extracted.records {
            match record {
                ArchiveRecord::FighterName(name) => {
                    if looks_like_person_name(&name) && self.linker.match_archive_name(&mut tx, &name).await? {
                        report.names_matched += 1;
                    }
                }
                ArchiveRecord::Round(staging) => match self.normalizer.canonical_round_stat(&staging) {
                    Ok(stat) => {
                        *per_event.entry(stat.event_name.clone().unwrap_or_default()).or_default() += 1;
                        self.linker.link_round_stat(&mut tx, stat, &mut report.link).await?;
                    }
                    Err(e) => {
                        warn!("[STATS] {e}");
                        report.rejected += 1;
                    }
                },
            }
        }
        tx.commit().await?;
        for (event, rows) in per_event {
            debug!("[STATS] {rows} round rows for '{event}'");
        }
        Ok(())
    }
}

/// Take the store lock, open (or bootstrap) the store and run `job`.
pub async fn ingest<F: Fetch>(
    cfg: &Config,
    fetcher: F,
    clock: Arc<dyn Clock>,
    job: JobKind,
    opts: IngestOptions,
) -> Result<RunReport> {
    let _lock = StoreLock::acquire(&cfg.db_path)?;
    let store = Store::open(cfg).await?;
    let mut orchestrator = Orchestrator::new(store.clone(), fetcher, clock, opts);
    let result = orchestrator.run(job).await;
    store.close().await;
    result
}
