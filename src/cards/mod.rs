/*!
 * Flashcard building blocks.
 *
 * - `retry`: exponential backoff around backend calls
 * - `cache`: on-disk generation cache
 * - `resume`: processed-word ledger
 * - `oov`: out-of-vocabulary extraction
 * - `audio`: playback-rate post-processing
 * - `pipeline`: the per-word orchestrator tying them together
 */

pub mod audio;
pub mod cache;
pub mod oov;
pub mod pipeline;
pub mod resume;
pub mod retry;

pub use pipeline::{CardPipeline, ItemOutcome, PipelineSettings, ResultRow, RunContext, RunReport, SpeechRoute};
