//! Session lifecycle integration tests
//!
//! Drives the session controller with scripted transports and hand-fed
//! capture frames; no audio hardware or network involved.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_test::assert_ok;

use prism_studio::voice::{AudioFrame, pcm};
use prism_studio::{
    Error, INPUT_SAMPLE_RATE, LiveConfig, PlaybackScheduler, SessionController, SessionEvent,
    SessionState,
};

mod common;
use common::{ManualCapture, NullSink, ScriptedTransport, generate_sine_samples};

fn controller_with(
    transport: ScriptedTransport,
) -> (
    SessionController,
    mpsc::Sender<AudioFrame>,
    std::sync::Arc<std::sync::atomic::AtomicBool>,
    std::sync::Arc<std::sync::atomic::AtomicBool>,
) {
    let (capture, frame_tx, capture_running) = ManualCapture::new();
    let (sink, sink_running) = NullSink::new();
    let scheduler = PlaybackScheduler::new();

    let controller = SessionController::new(
        LiveConfig::default(),
        Box::new(transport),
        Box::new(capture),
        Box::new(sink),
        scheduler,
    );

    (controller, frame_tx, capture_running, sink_running)
}

#[tokio::test]
async fn stop_before_start_is_a_noop() {
    let (mut controller, _tx, _cap, _sink) =
        controller_with(ScriptedTransport::new(vec![SessionEvent::Opened]));

    assert_eq!(controller.state(), SessionState::Idle);
    assert_ok!(controller.stop().await);
    assert_eq!(controller.state(), SessionState::Idle);

    // and again
    assert_ok!(controller.stop().await);
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test]
async fn double_start_opens_one_session() {
    let transport = ScriptedTransport::new(vec![SessionEvent::Opened]);
    let connects = std::sync::Arc::clone(&transport.connects);
    let (mut controller, _tx, capture_running, _sink) = controller_with(transport);

    controller.start().await.unwrap();
    assert_eq!(controller.state(), SessionState::Streaming);
    assert!(capture_running.load(Ordering::SeqCst));

    // second start while streaming is ignored
    controller.start().await.unwrap();
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), SessionState::Streaming);

    controller.stop().await.unwrap();
    assert_eq!(controller.state(), SessionState::Closed);
}

#[tokio::test]
async fn stop_is_idempotent_and_releases_everything() {
    let transport = ScriptedTransport::new(vec![SessionEvent::Opened]);
    let closes = std::sync::Arc::clone(&transport.closes);
    let (mut controller, _tx, capture_running, sink_running) = controller_with(transport);

    controller.start().await.unwrap();
    assert!(capture_running.load(Ordering::SeqCst));
    assert!(sink_running.load(Ordering::SeqCst));

    controller.stop().await.unwrap();
    controller.stop().await.unwrap();

    assert_eq!(controller.state(), SessionState::Closed);
    assert!(!capture_running.load(Ordering::SeqCst));
    assert!(!sink_running.load(Ordering::SeqCst));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn session_can_restart_after_close() {
    let transport = ScriptedTransport::with_scripts(vec![
        vec![SessionEvent::Opened],
        vec![SessionEvent::Opened],
    ]);
    let connects = std::sync::Arc::clone(&transport.connects);
    let (mut controller, _tx, _cap, _sink) = controller_with(transport);

    controller.start().await.unwrap();
    controller.stop().await.unwrap();
    assert_eq!(controller.state(), SessionState::Closed);

    controller.start().await.unwrap();
    assert_eq!(controller.state(), SessionState::Streaming);
    assert_eq!(connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_open_lands_in_errored() {
    let transport =
        ScriptedTransport::new(vec![SessionEvent::Error("microphone denied".to_string())]);
    let (mut controller, _tx, capture_running, _sink) = controller_with(transport);

    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(controller.state(), SessionState::Errored);
    assert!(!capture_running.load(Ordering::SeqCst));

    // errored sessions can be restarted by the caller; a stop stays a noop
    assert_ok!(controller.stop().await);
    assert_eq!(controller.state(), SessionState::Errored);
}

#[tokio::test]
async fn reply_audio_is_scheduled_in_arrival_order() {
    let first = pcm::samples_to_pcm16(&vec![0.1f32; 2400]); // 0.1s
    let second = pcm::samples_to_pcm16(&vec![0.2f32; 4800]); // 0.2s

    let transport = ScriptedTransport::new(vec![
        SessionEvent::Opened,
        SessionEvent::Audio(first),
        SessionEvent::Audio(second),
    ]);
    let (mut controller, _tx, _cap, _sink) = controller_with(transport);

    controller.start().await.unwrap();
    let scheduler = controller.scheduler();

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let checks = async {
        tokio::time::sleep(Duration::from_millis(200)).await;

        // both chunks scheduled back to back; nothing rendered yet
        assert_eq!(scheduler.active_sources(), 2);
        assert!((scheduler.cursor() - 0.3).abs() < 1e-9);

        let intervals = scheduler.active_intervals();
        assert!((intervals[0].1 - intervals[1].0).abs() < 1e-9);

        shutdown_tx.send(()).await.unwrap();
    };

    let (run_result, ()) = tokio::join!(controller.run(&mut shutdown_rx), checks);
    run_result.unwrap();

    assert_eq!(controller.state(), SessionState::Closed);
    // teardown resets the playback timeline
    assert_eq!(controller.scheduler().active_sources(), 0);
}

#[tokio::test]
async fn barge_in_cuts_scheduled_playback() {
    let reply = pcm::samples_to_pcm16(&vec![0.1f32; 24000]); // 1s

    let transport = ScriptedTransport::new(vec![
        SessionEvent::Opened,
        SessionEvent::Audio(reply),
        SessionEvent::Interrupted,
    ]);
    let (mut controller, _tx, _cap, _sink) = controller_with(transport);

    controller.start().await.unwrap();
    let scheduler = controller.scheduler();

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let checks = async {
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(scheduler.active_sources(), 0);
        assert!(scheduler.cursor().abs() < 1e-9);

        shutdown_tx.send(()).await.unwrap();
    };

    let (run_result, ()) = tokio::join!(controller.run(&mut shutdown_rx), checks);
    run_result.unwrap();
}

#[tokio::test]
async fn malformed_reply_chunk_is_dropped_not_fatal() {
    let good = pcm::samples_to_pcm16(&vec![0.1f32; 2400]);

    let transport = ScriptedTransport::new(vec![
        SessionEvent::Opened,
        SessionEvent::Audio(vec![1, 2, 3]), // odd length, undecodable
        SessionEvent::Audio(Vec::new()),    // empty
        SessionEvent::Audio(good),
    ]);
    let (mut controller, _tx, _cap, _sink) = controller_with(transport);

    controller.start().await.unwrap();
    let scheduler = controller.scheduler();

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let checks = async {
        tokio::time::sleep(Duration::from_millis(200)).await;

        // only the good chunk made it; the bad ones moved nothing
        assert_eq!(scheduler.active_sources(), 1);
        assert!((scheduler.cursor() - 0.1).abs() < 1e-9);

        shutdown_tx.send(()).await.unwrap();
    };

    let (run_result, ()) = tokio::join!(controller.run(&mut shutdown_rx), checks);
    run_result.unwrap();
    assert_eq!(controller.state(), SessionState::Closed);
}

#[tokio::test]
async fn transport_error_tears_the_session_down() {
    let transport = ScriptedTransport::new(vec![
        SessionEvent::Opened,
        SessionEvent::Error("stream reset".to_string()),
    ]);
    let closes = std::sync::Arc::clone(&transport.closes);
    let (mut controller, _tx, capture_running, sink_running) = controller_with(transport);

    controller.start().await.unwrap();

    let (_shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let err = controller.run(&mut shutdown_rx).await.unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(controller.state(), SessionState::Errored);
    assert!(!capture_running.load(Ordering::SeqCst));
    assert!(!sink_running.load(Ordering::SeqCst));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn remote_close_ends_the_run() {
    let transport = ScriptedTransport::new(vec![SessionEvent::Opened, SessionEvent::Closed]);
    let (mut controller, _tx, _cap, _sink) = controller_with(transport);

    controller.start().await.unwrap();

    let (_shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    assert_ok!(controller.run(&mut shutdown_rx).await);
    assert_eq!(controller.state(), SessionState::Closed);
}

#[tokio::test]
async fn captured_frames_are_forwarded_in_order() {
    let transport = ScriptedTransport::new(vec![SessionEvent::Opened]);
    let sent = std::sync::Arc::clone(&transport.sent);
    let (mut controller, frame_tx, _cap, _sink) = controller_with(transport);

    controller.start().await.unwrap();

    let quiet = generate_sine_samples(INPUT_SAMPLE_RATE, 0.05, 0.1);
    let loud = generate_sine_samples(INPUT_SAMPLE_RATE, 0.05, 0.9);

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let feed = async {
        frame_tx.send(AudioFrame::new(quiet.clone())).await.unwrap();
        frame_tx.send(AudioFrame::new(loud.clone())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).await.unwrap();
    };

    let (run_result, ()) = tokio::join!(controller.run(&mut shutdown_rx), feed);
    run_result.unwrap();

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].mime_type, "audio/pcm;rate=16000");
    assert_eq!(sent[0].data, pcm::samples_to_pcm16(&quiet));
    assert_eq!(sent[1].data, pcm::samples_to_pcm16(&loud));
}
