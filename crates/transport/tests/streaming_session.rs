//! End-to-end session tests over a deterministic engine and virtual device.

use std::sync::Arc;
use std::time::Duration;

use speech_stream_audio::{OutputDevice, PlaybackState, VirtualOutputDevice};
use speech_stream_config::SessionConfig;
use speech_stream_core::{Error, GenerateOptions};
use speech_stream_pipeline::{SentenceSplitter, StubEngine};
use speech_stream_transport::SpeechSession;

fn options(text: &str) -> GenerateOptions {
    GenerateOptions {
        text: text.to_string(),
        ..Default::default()
    }
}

/// Let the chunk-routing task drain in-flight chunks into the scheduler.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn session() -> (SpeechSession, Arc<VirtualOutputDevice>) {
    let config = SessionConfig::default();
    let device = VirtualOutputDevice::new(config.scheduler.input_sample_rate);
    let session = SpeechSession::new(
        config,
        Arc::new(StubEngine::new(22050)),
        Arc::new(SentenceSplitter),
        device.clone(),
    );
    (session, device)
}

#[tokio::test]
async fn test_speak_buffers_and_opens_gate() {
    let (session, device) = session();

    assert_eq!(session.load_model("stub").await.unwrap(), 22050);
    session.play().await.unwrap();
    assert!(device.is_running());

    session
        .speak(options("Hello there. General Kenobi."))
        .await
        .unwrap();
    settle().await;

    // Generation is fully buffered and cleared to start.
    assert!(session.buffered_secs() > 0.0);
    assert!(session.is_playing());
    assert_eq!(session.state(), PlaybackState::Playing);

    // Give the tick task a couple of periods to move audio onto the device.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let scheduled = device.scheduled();
    assert!(!scheduled.is_empty());
    for source in &scheduled {
        assert!(source.start_time >= 0.0);
    }

    session.shutdown();
}

#[tokio::test]
async fn test_speak_supersedes_previous_generation() {
    let (session, _device) = session();
    session.load_model("stub").await.unwrap();
    session.play().await.unwrap();

    session
        .speak(options(
            "This is a fairly long sentence that buffers a lot of audio. And another one for good measure.",
        ))
        .await
        .unwrap();
    settle().await;
    let buffered_long = session.buffered_secs();
    assert!(buffered_long > 1.0);

    session.speak(options("Hi.")).await.unwrap();
    settle().await;
    let buffered_short = session.buffered_secs();

    // The long generation's audio was dropped, only the short one remains.
    assert!(buffered_short > 0.0);
    assert!(buffered_short < buffered_long / 2.0);

    session.shutdown();
}

#[tokio::test]
async fn test_invalid_text_leaves_playback_untouched() {
    let (session, _device) = session();
    session.load_model("stub").await.unwrap();
    session.play().await.unwrap();

    session.speak(options("Keep this audio.")).await.unwrap();
    settle().await;
    let buffered = session.buffered_secs();
    assert!(buffered > 0.0);

    let result = session.speak(options("   ")).await;
    assert!(matches!(result, Err(Error::Validation(_))));

    // The rejected request never cancelled the previous one.
    assert!((session.buffered_secs() - buffered).abs() < 1e-6);

    session.shutdown();
}

#[tokio::test]
async fn test_speak_before_load_reports_error() {
    let (session, _device) = session();

    let result = session.speak(options("Too early.")).await;
    assert!(matches!(result, Err(Error::Transport(_))));

    session.shutdown();
}

#[tokio::test]
async fn test_cancel_without_active_generation_is_noop() {
    let (session, _device) = session();
    session.cancel().await.unwrap();
    session.shutdown();
}

#[tokio::test]
async fn test_pause_keeps_buffered_audio() {
    let (session, device) = session();
    session.load_model("stub").await.unwrap();
    session.play().await.unwrap();
    session.speak(options("Buffered speech.")).await.unwrap();
    settle().await;

    let buffered = session.buffered_secs();
    session.pause().await.unwrap();

    assert!(!device.is_running());
    assert_eq!(session.state(), PlaybackState::Paused);
    assert!(session.buffered_secs() >= buffered - 1e-6);

    session.shutdown();
}
