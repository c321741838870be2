/*!
 * End-to-end pipeline runs against the mock backend
 */

use anyhow::Result;
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use lingodeck::cards::audio::AudioPostProcessor;
use lingodeck::cards::cache::CacheStore;
use lingodeck::cards::resume::ResumeLedger;
use lingodeck::cards::{CardPipeline, ItemOutcome, SpeechRoute};
use lingodeck::errors::PipelineError;
use lingodeck::providers::{GenerationResult, MockBackend};
use crate::common::{self, FakeTempo};

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

fn pipeline_with(backend: &Arc<MockBackend>, dir: &Path) -> CardPipeline {
    CardPipeline::new(backend.clone(), SpeechRoute::single(backend.clone()), common::test_settings(dir))
        .with_retry_policy(common::fast_retry(3))
}

/// Test a full run: rows in input order with audio, ledger and report written
#[tokio::test(start_paused = true)]
async fn test_run_withThreeWords_shouldProduceRowsLedgerAndReport() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default().with_translations([("saya", "ik")]));
    let state_file = temp_dir.path().join("state.json");
    let pipeline = pipeline_with(&backend, temp_dir.path()).with_resume(ResumeLedger::new(&state_file));

    let report = pipeline.run(&words(&["kucing", "makan", "ikan"]), |_, _, _| {}).await?;

    assert_eq!(report.rows.len(), 3);
    let first = &report.rows[0];
    assert_eq!(first.front, "kucing<br>[sound:kucing.mp3]");
    assert_eq!(first.back, "kucing-tr");
    assert_eq!(first.example_src, "Saya suka kucing.<br>[sound:kucing_ex.mp3]");
    assert_eq!(first.example_tgt, "Ik hou van kucing-tr.");
    assert_eq!(first.new_words, "saya = ik\nsuka");
    assert_eq!(report.rows[2].back, "ikan-tr");

    let media = temp_dir.path().join("media");
    assert_eq!(fs::read_to_string(media.join("kucing.mp3"))?, "MOCK-AUDIO:kucing");
    assert_eq!(fs::read_to_string(media.join("makan_ex.mp3"))?, "MOCK-AUDIO:Saya suka makan.");

    assert_eq!(report.processed_count, 3);
    assert_eq!(ResumeLedger::new(&state_file).load().len(), 3);

    assert_eq!(report.oov_count, 2);
    assert_eq!(report.oov_report, Some(temp_dir.path().join("extra_words.txt")));
    assert_eq!(fs::read_to_string(temp_dir.path().join("extra_words.txt"))?, "saya\nsuka\n");

    assert_eq!(backend.generate_calls(), 3);
    assert_eq!(backend.speech_calls(), 6);
    assert_eq!(backend.translate_calls(), 3);
    assert_eq!(report.stats.completed, 3);
    Ok(())
}

/// Test that a resumed run skips processed words without any backend call
#[tokio::test(start_paused = true)]
async fn test_run_withProcessedLedger_shouldSkipWithoutCalls() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let state_file = temp_dir.path().join("state.json");
    let list = words(&["kucing", "makan"]);

    let first = Arc::new(MockBackend::default());
    pipeline_with(&first, temp_dir.path())
        .with_resume(ResumeLedger::new(&state_file))
        .run(&list, |_, _, _| {})
        .await?;

    let second = Arc::new(MockBackend::default());
    let report = pipeline_with(&second, temp_dir.path())
        .with_resume(ResumeLedger::new(&state_file))
        .run(&words(&["Kucing", "makan", "ikan"]), |_, _, _| {})
        .await?;

    assert_eq!(report.stats.skipped, 2);
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].back, "ikan-tr");
    assert_eq!(second.generate_calls(), 1);
    assert_eq!(second.speech_calls(), 2);
    assert_eq!(report.processed_count, 3);
    Ok(())
}

/// Test that duplicates are processed again when resume is off
#[tokio::test(start_paused = true)]
async fn test_run_withoutResume_shouldProcessDuplicates() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default());

    let report = pipeline_with(&backend, temp_dir.path())
        .run(&words(&["kucing", "kucing"]), |_, _, _| {})
        .await?;

    assert_eq!(report.rows.len(), 2);
    assert_eq!(backend.generate_calls(), 2);
    // Second item reuses the clips written by the first
    assert_eq!(backend.speech_calls(), 2);
    Ok(())
}

/// Test that a cached card is used without calling generation
#[tokio::test(start_paused = true)]
async fn test_run_withWarmCache_shouldNotGenerate() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let cache_dir = temp_dir.path().join("cache");
    let list = words(&["kucing"]);

    let first = Arc::new(MockBackend::default());
    pipeline_with(&first, temp_dir.path())
        .with_cache(CacheStore::new(&cache_dir, true))
        .run(&list, |_, _, _| {})
        .await?;
    assert_eq!(fs::read_dir(&cache_dir)?.count(), 1);

    let second = Arc::new(MockBackend::default().fail_generation("invalid api key", 10));
    let report = pipeline_with(&second, temp_dir.path())
        .with_cache(CacheStore::new(&cache_dir, true))
        .run(&list, |_, _, _| {})
        .await?;

    assert_eq!(second.generate_calls(), 0);
    assert_eq!(report.stats.cache_hits, 1);
    assert_eq!(report.rows[0].back, "kucing-tr");
    Ok(())
}

/// Test that transient generation failures are retried until success
#[tokio::test(start_paused = true)]
async fn test_run_withTransientGenerationFailures_shouldRecover() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default().fail_generation("HTTP 503 Service Unavailable", 2));

    let report = pipeline_with(&backend, temp_dir.path())
        .run(&words(&["kucing"]), |_, _, _| {})
        .await?;

    assert_eq!(backend.generate_calls(), 3);
    assert_eq!(report.rows.len(), 1);
    Ok(())
}

/// Test that exhausted generation retries end the run
#[tokio::test(start_paused = true)]
async fn test_run_withPersistentRateLimit_shouldFailAfterMaxAttempts() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default().fail_generation("HTTP 429 rate limit", 10));

    let result = pipeline_with(&backend, temp_dir.path())
        .run(&words(&["kucing", "makan"]), |_, _, _| {})
        .await;

    match result {
        Err(PipelineError::Generation { word, .. }) => assert_eq!(word, "kucing"),
        other => panic!("expected generation failure, got {:?}", other.map(|r| r.rows.len())),
    }
    assert_eq!(backend.generate_calls(), 3);
    Ok(())
}

/// Test that an incomplete generation is fatal and the ledger keeps earlier items only
#[tokio::test(start_paused = true)]
async fn test_run_withIncompleteGeneration_shouldStopAndKeepLedger() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let state_file = temp_dir.path().join("state.json");
    let broken = GenerationResult {
        example_tgt: String::new(),
        ..MockBackend::default_card("kucing")
    };
    let backend = Arc::new(MockBackend::default().with_card("kucing", broken));

    let result = pipeline_with(&backend, temp_dir.path())
        .with_resume(ResumeLedger::new(&state_file))
        .run(&words(&["makan", "kucing", "ikan"]), |_, _, _| {})
        .await;

    assert!(matches!(result, Err(PipelineError::Generation { .. })));
    assert_eq!(backend.generate_calls(), 2);
    let processed = ResumeLedger::new(&state_file).load();
    assert!(processed.contains("makan"));
    assert!(!processed.contains("kucing"));
    assert!(!processed.contains("ikan"));
    Ok(())
}

/// Test that failed speech degrades the item and leaves out the sound reference
#[tokio::test(start_paused = true)]
async fn test_process_item_withFailingSpeech_shouldDegradeWithoutSound() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default().failing_speech("invalid voice"));
    let pipeline = pipeline_with(&backend, temp_dir.path());
    let list = words(&["kucing"]);
    let mut ctx = pipeline.start_run(&list);

    let outcome = pipeline.process_item(&mut ctx, "kucing").await?;

    match outcome {
        ItemOutcome::Degraded { row, issues } => {
            assert_eq!(row.front, "kucing");
            assert_eq!(row.example_src, "Saya suka kucing.");
            assert_eq!(issues.len(), 2);
        }
        other => panic!("expected degraded outcome, got {:?}", other),
    }
    assert_eq!(ctx.processed().len(), 1);
    Ok(())
}

/// Test that the fallback speech backend is used when the primary fails
#[tokio::test(start_paused = true)]
async fn test_process_item_withFailingPrimarySpeech_shouldUseFallback() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let main = Arc::new(MockBackend::default());
    let google = Arc::new(MockBackend::new("google", "tts").failing_speech("HTTP 503 Service Unavailable"));
    let pipeline = CardPipeline::new(
        main.clone(),
        SpeechRoute::new(google.clone(), Some(main.clone())),
        common::test_settings(temp_dir.path()),
    )
    .with_retry_policy(common::fast_retry(2));
    let list = words(&["kucing"]);
    let mut ctx = pipeline.start_run(&list);

    let outcome = pipeline.process_item(&mut ctx, "kucing").await?;

    assert!(matches!(outcome, ItemOutcome::Completed(_)));
    // Two clips, each tried twice on the primary
    assert_eq!(google.speech_calls(), 4);
    assert_eq!(main.speech_calls(), 2);
    assert_eq!(main.spoken_texts(), vec!["kucing".to_string(), "Saya suka kucing.".to_string()]);
    Ok(())
}

/// Test that a failed new-word translation degrades but keeps bare tokens
#[tokio::test(start_paused = true)]
async fn test_process_item_withFailingTranslation_shouldKeepBareTokens() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default().failing_translation("invalid api key"));
    let pipeline = pipeline_with(&backend, temp_dir.path());
    let list = words(&["kucing"]);
    let mut ctx = pipeline.start_run(&list);

    let outcome = pipeline.process_item(&mut ctx, "kucing").await?;

    match outcome {
        ItemOutcome::Degraded { row, issues } => {
            assert_eq!(row.new_words, "saya\nsuka");
            assert!(issues[0].contains("translation"));
        }
        other => panic!("expected degraded outcome, got {:?}", other),
    }
    assert_eq!(ctx.oov().tokens(), ["saya", "suka"]);
    Ok(())
}

/// Test that hidden new words are still collected but never translated
#[tokio::test(start_paused = true)]
async fn test_run_withNewWordsHidden_shouldCollectWithoutTranslating() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default());
    let mut settings = common::test_settings(temp_dir.path());
    settings.show_new_words = false;
    let pipeline = CardPipeline::new(backend.clone(), SpeechRoute::single(backend.clone()), settings);

    let report = pipeline.run(&words(&["kucing"]), |_, _, _| {}).await?;

    assert_eq!(report.rows[0].new_words, "");
    assert_eq!(report.oov_count, 2);
    assert_eq!(backend.translate_calls(), 0);
    Ok(())
}

/// Test that the playback rate is applied to fresh example clips only
#[tokio::test(start_paused = true)]
async fn test_run_withSlowerRate_shouldAdjustFreshExampleClipOnce() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let list = words(&["kucing"]);
    let example_clip = temp_dir.path().join("media").join("kucing_ex.mp3");

    let backend = Arc::new(MockBackend::default());
    let tempo = Arc::new(FakeTempo::working());
    let mut settings = common::test_settings(temp_dir.path());
    settings.example_audio_rate = 0.85;
    let pipeline = CardPipeline::new(backend.clone(), SpeechRoute::single(backend.clone()), settings.clone())
        .with_audio_processor(AudioPostProcessor::new(tempo.clone()));

    pipeline.run(&list, |_, _, _| {}).await?;

    assert_eq!(tempo.rates(), vec![0.85]);
    assert_eq!(fs::read_to_string(&example_clip)?, "MOCK-AUDIO:Saya suka kucing.|atempo=0.85");
    let word_clip = temp_dir.path().join("media").join("kucing.mp3");
    assert_eq!(fs::read_to_string(word_clip)?, "MOCK-AUDIO:kucing");

    // Clips on disk are reused untouched by the next run
    let second_tempo = Arc::new(FakeTempo::working());
    CardPipeline::new(backend.clone(), SpeechRoute::single(backend.clone()), settings)
        .with_audio_processor(AudioPostProcessor::new(second_tempo.clone()))
        .run(&list, |_, _, _| {})
        .await?;

    assert!(second_tempo.rates().is_empty());
    assert_eq!(fs::read_to_string(&example_clip)?, "MOCK-AUDIO:Saya suka kucing.|atempo=0.85");
    Ok(())
}

/// Test that a neutral rate never invokes the transform
#[tokio::test(start_paused = true)]
async fn test_run_withNeutralRate_shouldNotTransform() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default());
    let tempo = Arc::new(FakeTempo::working());
    let pipeline = pipeline_with(&backend, temp_dir.path())
        .with_audio_processor(AudioPostProcessor::new(tempo.clone()));

    pipeline.run(&words(&["kucing"]), |_, _, _| {}).await?;

    assert!(tempo.rates().is_empty());
    Ok(())
}

/// Test that a failed rate change keeps the original clip and its reference
#[tokio::test(start_paused = true)]
async fn test_process_item_withFailingTempo_shouldKeepOriginalClip() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default());
    let mut settings = common::test_settings(temp_dir.path());
    settings.example_audio_rate = 1.25;
    let pipeline = CardPipeline::new(backend.clone(), SpeechRoute::single(backend.clone()), settings)
        .with_audio_processor(AudioPostProcessor::new(Arc::new(FakeTempo::failing())));
    let list = words(&["kucing"]);
    let mut ctx = pipeline.start_run(&list);

    let outcome = pipeline.process_item(&mut ctx, "kucing").await?;

    let example_clip = temp_dir.path().join("media").join("kucing_ex.mp3");
    assert_eq!(fs::read_to_string(&example_clip)?, "MOCK-AUDIO:Saya suka kucing.");
    match outcome {
        ItemOutcome::Degraded { row, .. } => {
            assert_eq!(row.example_src, "Saya suka kucing.<br>[sound:kucing_ex.mp3]");
        }
        other => panic!("expected degraded outcome, got {:?}", other),
    }
    Ok(())
}

/// Test that a clip left unadjusted by an earlier failure is reused, not re-timed
#[tokio::test(start_paused = true)]
async fn test_process_item_withUnadjustedExistingClip_shouldReuseWithoutTransform() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default());
    let mut settings = common::test_settings(temp_dir.path());
    settings.example_audio_rate = 1.25;
    let list = words(&["kucing"]);

    let failing = CardPipeline::new(backend.clone(), SpeechRoute::single(backend.clone()), settings.clone())
        .with_audio_processor(AudioPostProcessor::new(Arc::new(FakeTempo::failing())));
    let mut ctx = failing.start_run(&list);
    failing.process_item(&mut ctx, "kucing").await?;
    let speech_calls = backend.speech_calls();

    let tempo = Arc::new(FakeTempo::working());
    let rerun = CardPipeline::new(backend.clone(), SpeechRoute::single(backend.clone()), settings)
        .with_audio_processor(AudioPostProcessor::new(tempo.clone()));
    let mut ctx = rerun.start_run(&list);
    let outcome = rerun.process_item(&mut ctx, "kucing").await?;

    let example_clip = temp_dir.path().join("media").join("kucing_ex.mp3");
    assert!(tempo.rates().is_empty());
    assert_eq!(backend.speech_calls(), speech_calls);
    assert_eq!(fs::read_to_string(&example_clip)?, "MOCK-AUDIO:Saya suka kucing.");
    match outcome {
        ItemOutcome::Completed(row) => {
            assert_eq!(row.example_src, "Saya suka kucing.<br>[sound:kucing_ex.mp3]");
        }
        other => panic!("expected completed outcome, got {:?}", other),
    }
    Ok(())
}

/// Test that disabling example audio leaves the example without a clip
#[tokio::test(start_paused = true)]
async fn test_run_withoutExampleAudio_shouldOnlySynthesizeWord() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default());
    let mut settings = common::test_settings(temp_dir.path());
    settings.add_example_audio = false;
    let pipeline = CardPipeline::new(backend.clone(), SpeechRoute::single(backend.clone()), settings);

    let report = pipeline.run(&words(&["kucing"]), |_, _, _| {}).await?;

    assert_eq!(backend.speech_calls(), 1);
    assert_eq!(report.rows[0].example_src, "Saya suka kucing.");
    assert!(!temp_dir.path().join("media").join("kucing_ex.mp3").exists());
    Ok(())
}

/// Test that forced regeneration re-synthesizes existing clips
#[tokio::test(start_paused = true)]
async fn test_run_withRegenerateAudio_shouldOverwriteExistingClips() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let media = temp_dir.path().join("media");
    fs::create_dir_all(&media)?;
    fs::write(media.join("kucing.mp3"), "OLD")?;

    let backend = Arc::new(MockBackend::default());
    let mut settings = common::test_settings(temp_dir.path());
    settings.regenerate_audio = true;
    let pipeline = CardPipeline::new(backend.clone(), SpeechRoute::single(backend.clone()), settings);

    pipeline.run(&words(&["kucing"]), |_, _, _| {}).await?;

    assert_eq!(backend.speech_calls(), 2);
    assert_eq!(fs::read_to_string(media.join("kucing.mp3"))?, "MOCK-AUDIO:kucing");
    Ok(())
}

/// Test that an unwritable ledger stops the run
#[tokio::test(start_paused = true)]
async fn test_run_withUnwritableLedger_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let ledger_dir = temp_dir.path().join("state.json");
    fs::create_dir_all(&ledger_dir)?;
    let backend = Arc::new(MockBackend::default());

    let result = pipeline_with(&backend, temp_dir.path())
        .with_resume(ResumeLedger::new(&ledger_dir))
        .run(&words(&["kucing"]), |_, _, _| {})
        .await;

    assert!(matches!(result, Err(PipelineError::Ledger(_))));
    Ok(())
}

/// Test progress reporting and the courtesy delay between items
#[tokio::test(start_paused = true)]
async fn test_run_shouldReportProgressAndPauseBetweenItems() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let backend = Arc::new(MockBackend::default());
    let mut settings = common::test_settings(temp_dir.path());
    settings.item_delay = Duration::from_secs(2);
    let pipeline = CardPipeline::new(backend.clone(), SpeechRoute::single(backend.clone()), settings);
    let seen = Mutex::new(Vec::new());
    let start = Instant::now();

    pipeline
        .run(&words(&["kucing", "makan"]), |done, total, word| {
            seen.lock().push((done, total, word.to_string()));
        })
        .await?;

    assert_eq!(
        seen.into_inner(),
        vec![(0, 2, "kucing".to_string()), (1, 2, "makan".to_string())]
    );
    assert_eq!(start.elapsed(), Duration::from_secs(4));
    Ok(())
}
