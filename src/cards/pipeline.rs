/*!
 * Card pipeline orchestrator.
 *
 * Turns each input word into a result row:
 * - cache lookup or generation (through retry)
 * - word and example audio (primary speech backend, then fallback)
 * - playback-rate adjustment of fresh example clips
 * - OOV extraction and optional batch translation
 * - resume ledger commit
 *
 * Items run strictly one after another. Generation failures end the run;
 * audio and OOV translation failures only degrade the item.
 */

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{Config, UsageNotes};
use crate::cards::audio::{rate_needs_adjustment, AudioPostProcessor};
use crate::cards::cache::{CacheKey, CacheStore};
use crate::cards::oov::{extract_candidates, OovCollector};
use crate::cards::resume::ResumeLedger;
use crate::cards::retry::{retry_with_backoff, retryable_by_message, RetryPolicy};
use crate::errors::PipelineError;
use crate::file_utils::safe_filename;
use crate::providers::{CardBackend, GenerationResult, LanguagePair};

/// Per-run settings of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Usage-notes mode passed to generation and part of the cache key
    pub usage_notes: UsageNotes,
    /// Directory receiving audio clips
    pub media_dir: PathBuf,
    /// Audio file extension, without the dot
    pub audio_ext: String,
    /// Whether example sentences get audio
    pub add_example_audio: bool,
    /// Playback rate applied to fresh example clips
    pub example_audio_rate: f64,
    /// Whether the new-words block is filled
    pub show_new_words: bool,
    /// Whether OOV tokens are translated
    pub oov_translate: bool,
    /// Re-synthesize clips that already exist
    pub regenerate_audio: bool,
    /// Pause after every processed item
    pub item_delay: Duration,
    /// Languages passed to OOV translation
    pub languages: LanguagePair,
    /// Where the OOV report is written at the end of the run
    pub oov_report_path: PathBuf,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            usage_notes: config.usage_notes_def,
            media_dir: config.media_dir(),
            audio_ext: config.audio_ext.trim_start_matches('.').to_string(),
            add_example_audio: config.add_example_audio,
            example_audio_rate: config.example_audio_rate,
            show_new_words: config.show_new_words_on_back,
            oov_translate: config.oov_translate,
            regenerate_audio: config.regenerate_audio_always,
            item_delay: config.item_delay(),
            languages: LanguagePair::from_config(config),
            oov_report_path: config.extra_words_file.clone(),
        }
    }
}

/// Speech backends in order of preference
#[derive(Debug, Clone)]
pub struct SpeechRoute {
    primary: Arc<dyn CardBackend>,
    fallback: Option<Arc<dyn CardBackend>>,
}

impl SpeechRoute {
    pub fn new(primary: Arc<dyn CardBackend>, fallback: Option<Arc<dyn CardBackend>>) -> Self {
        Self { primary, fallback }
    }

    /// Route that only uses `backend`
    pub fn single(backend: Arc<dyn CardBackend>) -> Self {
        Self::new(backend, None)
    }
}

/// One deck row: six display fields in deck column order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    /// Word, with `[sound:..]` reference when its clip exists
    pub front: String,
    /// Translation
    pub back: String,
    /// Source example, with `[sound:..]` reference when its clip exists
    pub example_src: String,
    /// Target example
    pub example_tgt: String,
    /// Usage note, may be empty
    pub note: String,
    /// Newline-separated `token = translation` lines
    pub new_words: String,
}

impl ResultRow {
    /// Fields in deck column order
    pub fn fields(&self) -> [&str; 6] {
        [
            &self.front,
            &self.back,
            &self.example_src,
            &self.example_tgt,
            &self.note,
            &self.new_words,
        ]
    }
}

/// Result of processing one input word
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// Already in the resume ledger; nothing was called
    Skipped,
    /// Row produced with everything it asked for
    Completed(ResultRow),
    /// Row produced, but some audio or translation step failed
    Degraded { row: ResultRow, issues: Vec<String> },
}

impl ItemOutcome {
    pub fn row(&self) -> Option<&ResultRow> {
        match self {
            Self::Skipped => None,
            Self::Completed(row) | Self::Degraded { row, .. } => Some(row),
        }
    }
}

/// Counters for the end-of-run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub completed: usize,
    pub degraded: usize,
    pub skipped: usize,
    pub cache_hits: usize,
}

/// Mutable state of one run
#[derive(Debug, Default)]
pub struct RunContext {
    vocabulary: HashSet<String>,
    processed: HashSet<String>,
    rows: Vec<ResultRow>,
    oov: OovCollector,
    stats: RunStats,
}

impl RunContext {
    /// Fresh state for `words`, resuming from `processed`
    pub fn new(words: &[String], processed: HashSet<String>) -> Self {
        Self {
            vocabulary: words.iter().map(|w| w.trim().to_lowercase()).collect(),
            processed,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn processed(&self) -> &HashSet<String> {
        &self.processed
    }

    pub fn oov(&self) -> &OovCollector {
        &self.oov
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Rows of processed items, in input order
    pub rows: Vec<ResultRow>,
    /// Distinct OOV tokens seen in the run
    pub oov_count: usize,
    /// Report file, when one was written
    pub oov_report: Option<PathBuf>,
    /// Size of the processed set at the end of the run
    pub processed_count: usize,
    pub stats: RunStats,
}

// How a clip ended up on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClipStatus {
    Existing,
    Fresh,
    Missing,
}

/// Orchestrates generation, audio, OOV handling and persistence per word
#[derive(Debug)]
pub struct CardPipeline {
    backend: Arc<dyn CardBackend>,
    speech: SpeechRoute,
    retry: RetryPolicy,
    cache: Option<CacheStore>,
    ledger: Option<ResumeLedger>,
    audio: AudioPostProcessor,
    settings: PipelineSettings,
}

impl CardPipeline {
    /// Pipeline without cache or resume, with the default retry policy
    pub fn new(backend: Arc<dyn CardBackend>, speech: SpeechRoute, settings: PipelineSettings) -> Self {
        Self {
            backend,
            speech,
            retry: RetryPolicy::default(),
            cache: None,
            ledger: None,
            audio: AudioPostProcessor::default(),
            settings,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Enable resume: processed words are skipped and the ledger is committed after every item
    pub fn with_resume(mut self, ledger: ResumeLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_audio_processor(mut self, audio: AudioPostProcessor) -> Self {
        self.audio = audio;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Build the run state, loading the ledger when resume is enabled
    pub fn start_run(&self, words: &[String]) -> RunContext {
        let processed = self.ledger.as_ref().map(ResumeLedger::load).unwrap_or_default();
        if !processed.is_empty() {
            info!("Resuming: {} word(s) already processed", processed.len());
        }
        RunContext::new(words, processed)
    }

    /// Process every word in order, calling `progress(done, total, word)`
    /// before each item
    pub async fn run<F>(&self, words: &[String], progress: F) -> Result<RunReport, PipelineError>
    where
        F: Fn(usize, usize, &str),
    {
        let mut ctx = self.start_run(words);
        let total = words.len();

        for (index, word) in words.iter().enumerate() {
            progress(index, total, word.as_str());
            let outcome = self.process_item(&mut ctx, word).await?;

            if outcome != ItemOutcome::Skipped && !self.settings.item_delay.is_zero() {
                tokio::time::sleep(self.settings.item_delay).await;
            }
        }

        Ok(self.finish(ctx))
    }

    /// Process a single word against the run state
    pub async fn process_item(&self, ctx: &mut RunContext, word: &str) -> Result<ItemOutcome, PipelineError> {
        let word = word.trim();
        let lower = word.to_lowercase();

        if self.ledger.is_some() && ctx.processed.contains(&lower) {
            debug!("Skipping '{}': already processed", word);
            ctx.stats.skipped += 1;
            return Ok(ItemOutcome::Skipped);
        }

        let mut issues = Vec::new();
        let card = self.card_for(ctx, word).await?;

        // Word audio
        let stem = safe_filename(word);
        let word_clip = self.clip_path(&stem, "");
        let word_status = self.ensure_clip(word, &word_clip, &mut issues).await;

        // Example audio
        let example_clip = self.clip_path(&stem, "_ex");
        let mut example_status = ClipStatus::Missing;
        if self.settings.add_example_audio && !card.example_src.trim().is_empty() {
            example_status = self.ensure_clip(&card.example_src, &example_clip, &mut issues).await;

            let rate = self.settings.example_audio_rate;
            if example_status == ClipStatus::Fresh && rate_needs_adjustment(rate) {
                if let Err(e) = self.audio.adjust_in_place(&example_clip, rate).await {
                    warn!("Keeping original example audio for '{}': {}", word, e);
                    issues.push(format!("example audio rate not applied: {}", e));
                }
            } else if example_status == ClipStatus::Existing && rate_needs_adjustment(rate) {
                // Re-timing a reused clip could compound an earlier change
                warn!(
                    "Reusing example audio for '{}' as is; rate {} is only applied to new clips (use --force-audio to re-time it)",
                    word, rate
                );
            }
        }

        // New words
        let candidates = extract_candidates(&card.example_src, word, &ctx.vocabulary);
        ctx.oov.extend(&candidates);
        let new_words = if self.settings.show_new_words && !candidates.is_empty() {
            let translations = self.translate_new_words(word, &candidates, &mut issues).await;
            render_new_words(&candidates, &translations)
        } else {
            String::new()
        };

        let row = ResultRow {
            front: with_sound(word, word_status, &word_clip),
            back: card.translation,
            example_src: with_sound(&card.example_src, example_status, &example_clip),
            example_tgt: card.example_tgt,
            note: card.note,
            new_words,
        };

        ctx.rows.push(row.clone());
        ctx.processed.insert(lower);
        if let Some(ledger) = &self.ledger {
            ledger.commit(&ctx.processed).map_err(|e| {
                PipelineError::Ledger(format!("{} after '{}': {}", ledger.path().display(), word, e))
            })?;
        }

        if issues.is_empty() {
            ctx.stats.completed += 1;
            Ok(ItemOutcome::Completed(row))
        } else {
            warn!("'{}' completed with {} issue(s)", word, issues.len());
            ctx.stats.degraded += 1;
            Ok(ItemOutcome::Degraded { row, issues })
        }
    }

    /// Close the run: persist the OOV report and hand back the results
    pub fn finish(&self, ctx: RunContext) -> RunReport {
        let report_path = &self.settings.oov_report_path;
        let oov_report = match ctx.oov.persist(report_path) {
            Ok(true) => {
                info!("Wrote {} new word(s) to {}", ctx.oov.len(), report_path.display());
                Some(report_path.clone())
            }
            Ok(false) => None,
            Err(e) => {
                warn!("Failed to write new-words report {}: {}", report_path.display(), e);
                None
            }
        };

        RunReport {
            oov_count: ctx.oov.len(),
            oov_report,
            processed_count: ctx.processed.len(),
            stats: ctx.stats,
            rows: ctx.rows,
        }
    }

    // Cached card, or a fresh validated generation written through to the cache
    async fn card_for(&self, ctx: &mut RunContext, word: &str) -> Result<GenerationResult, PipelineError> {
        let key = CacheKey::new(self.backend.name(), self.backend.model(), self.settings.usage_notes, word);

        if let Some(card) = self.cache.as_ref().and_then(|cache| cache.read(&key)) {
            ctx.stats.cache_hits += 1;
            return Ok(card);
        }

        let label = format!("Generation for '{}'", word);
        let card = retry_with_backoff(
            &self.retry,
            &label,
            || self.backend.generate(word, self.settings.usage_notes),
            retryable_by_message,
        )
        .await
        .and_then(|card| card.validate().map(|_| card))
        .map_err(|source| PipelineError::Generation {
            word: word.to_string(),
            source,
        })?;

        if let Some(cache) = &self.cache {
            cache.write_or_warn(&key, &card);
        }
        Ok(card)
    }

    fn clip_path(&self, stem: &str, suffix: &str) -> PathBuf {
        self.settings
            .media_dir
            .join(format!("{}{}.{}", stem, suffix, self.settings.audio_ext))
    }

    // Reuse an existing clip, or synthesize through the primary backend and
    // then the fallback, each with its own retry budget
    async fn ensure_clip(&self, text: &str, clip: &Path, issues: &mut Vec<String>) -> ClipStatus {
        if clip.exists() && !self.settings.regenerate_audio {
            debug!("Reusing existing audio {}", clip.display());
            return ClipStatus::Existing;
        }

        let primary_error = match self.synthesize_with(&self.speech.primary, text, clip).await {
            Ok(()) => return ClipStatus::Fresh,
            Err(e) => e,
        };

        let Some(fallback) = &self.speech.fallback else {
            warn!("Speech synthesis failed for {}: {}", clip.display(), primary_error);
            issues.push(format!("no audio for {}: {}", clip.display(), primary_error));
            return ClipStatus::Missing;
        };

        warn!(
            "{} speech failed for {} ({}), trying {}",
            self.speech.primary.name(),
            clip.display(),
            primary_error,
            fallback.name()
        );
        match self.synthesize_with(fallback, text, clip).await {
            Ok(()) => ClipStatus::Fresh,
            Err(e) => {
                warn!("Fallback speech failed for {}: {}", clip.display(), e);
                issues.push(format!("no audio for {}: {}", clip.display(), e));
                ClipStatus::Missing
            }
        }
    }

    async fn synthesize_with(
        &self,
        backend: &Arc<dyn CardBackend>,
        text: &str,
        clip: &Path,
    ) -> Result<(), crate::errors::ProviderError> {
        let label = format!("{} speech for '{}'", backend.name(), text);
        retry_with_backoff(
            &self.retry,
            &label,
            || backend.synthesize_speech(text, clip),
            retryable_by_message,
        )
        .await
    }

    async fn translate_new_words(
        &self,
        word: &str,
        candidates: &[String],
        issues: &mut Vec<String>,
    ) -> HashMap<String, String> {
        if !self.settings.oov_translate {
            return HashMap::new();
        }

        let label = format!("New-word translation for '{}'", word);
        let result = retry_with_backoff(
            &self.retry,
            &label,
            || self.backend.translate_batch(candidates, &self.settings.languages),
            retryable_by_message,
        )
        .await;

        match result {
            Ok(translations) => translations,
            Err(e) => {
                warn!("New words of '{}' left untranslated: {}", word, e);
                issues.push(format!("new-word translation failed: {}", e));
                HashMap::new()
            }
        }
    }
}

// `text<br>[sound:FILE]` when the clip is on disk, plain text otherwise
fn with_sound(text: &str, status: ClipStatus, clip: &Path) -> String {
    if status == ClipStatus::Missing || !clip.exists() {
        return text.to_string();
    }
    match clip.file_name() {
        Some(name) => format!("{}<br>[sound:{}]", text, name.to_string_lossy()),
        None => text.to_string(),
    }
}

/// `token = translation` per candidate, bare `token` when untranslated
pub fn render_new_words(candidates: &[String], translations: &HashMap<String, String>) -> String {
    candidates
        .iter()
        .map(|token| match translations.get(token) {
            Some(tr) if !tr.trim().is_empty() => format!("{} = {}", token, tr.trim()),
            _ => token.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
