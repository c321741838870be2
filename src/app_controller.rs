use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use crate::app_config::Config;
use crate::cards::cache::CacheStore;
use crate::cards::resume::ResumeLedger;
use crate::cards::{CardPipeline, PipelineSettings, RunReport, SpeechRoute};
use crate::deck::{DeckPackager, TsvDeckWriter};
use crate::file_utils::FileManager;
use crate::providers;

// @module: Application controller wiring config, backends, pipeline and deck output

// Bar currently on screen, so log output can be printed around it
static ACTIVE_PROGRESS: Lazy<Mutex<Option<ProgressBar>>> = Lazy::new(|| Mutex::new(None));

/// Run `print` with the active progress bar hidden, if there is one
pub fn suspend_progress<F: FnOnce()>(print: F) {
    let bar = ACTIVE_PROGRESS.lock().clone();
    match bar {
        Some(bar) => bar.suspend(print),
        None => print(),
    }
}

// @struct: Main application controller
pub struct Controller {
    config: Config,
}

/// What a finished build produced, for the end summary
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub deck_path: PathBuf,
    pub media_dir: PathBuf,
    pub report: RunReport,
    pub state_file: Option<PathBuf>,
}

impl Controller {
    // @creates: Controller from a validated config
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // @builds: Pipeline from config
    pub fn build_pipeline(&self) -> CardPipeline {
        let backend = providers::create_backend(&self.config);
        let (primary, fallback) = providers::create_speech_backends(&self.config, backend.clone());

        let mut pipeline = CardPipeline::new(
            backend,
            SpeechRoute::new(primary, fallback),
            PipelineSettings::from_config(&self.config),
        )
        .with_retry_policy(self.config.retry_policy());

        if self.config.enable_cache {
            pipeline = pipeline.with_cache(CacheStore::new(&self.config.cache_dir, true));
        }
        if self.config.resume_enabled {
            pipeline = pipeline.with_resume(ResumeLedger::new(&self.config.state_file));
        }
        pipeline
    }

    // @runs: Full build for a word list
    pub async fn run(&self, input: &Path) -> Result<BuildSummary> {
        let words = FileManager::read_word_list(input)?;
        if words.is_empty() {
            return Err(anyhow!("No words found in {}", input.display()));
        }

        let media_dir = self.config.media_dir();
        FileManager::ensure_dir(&self.config.output_dir)?;
        FileManager::ensure_dir(&media_dir)?;

        info!(
            "lingodeck: {} - {} ({} word(s), {} -> {})",
            self.config.backend.display_name(),
            self.config.active_model(),
            words.len(),
            self.config.source_label(),
            self.config.target_label()
        );

        let pipeline = self.build_pipeline();
        let progress_bar = ProgressBar::new(words.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} words ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));

        *ACTIVE_PROGRESS.lock() = Some(progress_bar.clone());
        let pb = progress_bar.clone();
        let result = pipeline
            .run(&words, move |done, _total, word| {
                pb.set_position(done as u64);
                pb.set_message(word.to_string());
            })
            .await;
        progress_bar.finish_and_clear();
        ACTIVE_PROGRESS.lock().take();
        let report = result?;

        let writer = TsvDeckWriter::new(
            self.config.deck_path(),
            &self.config.source_label(),
            &self.config.target_label(),
        );
        let deck_path = writer.package(&report.rows, &media_dir)?;

        let summary = BuildSummary {
            deck_path,
            media_dir,
            report,
            state_file: self.config.resume_enabled.then(|| self.config.state_file.clone()),
        };
        Self::log_summary(&summary);
        Ok(summary)
    }

    // @logs: End-of-run summary
    fn log_summary(summary: &BuildSummary) {
        let stats = summary.report.stats;
        info!("Deck: {}", summary.deck_path.display());
        info!("Media: {}", summary.media_dir.display());
        info!(
            "Cards: {} complete, {} degraded, {} skipped ({} from cache)",
            stats.completed, stats.degraded, stats.skipped, stats.cache_hits
        );
        match &summary.report.oov_report {
            Some(path) => info!("New words: {} ({})", summary.report.oov_count, path.display()),
            None => info!("New words: none"),
        }
        if let Some(state_file) = &summary.state_file {
            info!("Resume state: {} word(s) in {}", summary.report.processed_count, state_file.display());
        }
        if stats.degraded > 0 {
            warn!("{} card(s) are missing audio or new-word translations", stats.degraded);
        }
    }
}
