//! Integration tests for the child stream relay.
//!
//! Validates:
//! - lines from both streams reach the sink with terminators stripped
//! - `stop()` returns within its drain timeout even if a stream never ends
//! - no line is delivered after `stop()` returns

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;

use appbooter::orchestrator::relay::{StreamKind, StreamRelay};

use super::test_helpers::CollectingSink;

async fn wait_for_lines(sink: &CollectingSink, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while sink.lines().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("lines relayed");
}

/// Both pumps forward complete lines, tagged with their stream.
#[tokio::test]
async fn forwards_lines_from_both_streams() {
    let (mut out_w, out_r) = tokio::io::duplex(256);
    let (mut err_w, err_r) = tokio::io::duplex(256);
    let sink = Arc::new(CollectingSink::default());
    let relay = StreamRelay::start(Some(out_r), Some(err_r), sink.clone(), Duration::from_secs(1));

    out_w.write_all(b"first\r\nsecond\n").await.expect("write stdout");
    err_w.write_all(b"warning\n").await.expect("write stderr");
    wait_for_lines(&sink, 3).await;

    let lines = sink.lines();
    let stdout: Vec<_> = lines
        .iter()
        .filter(|(kind, _)| *kind == StreamKind::Stdout)
        .map(|(_, line)| line.as_str())
        .collect();
    assert_eq!(stdout, vec!["first", "second"]);
    assert!(lines.contains(&(StreamKind::Stderr, "warning".to_owned())));

    assert!(relay.stop().await);
}

/// Draining delivers a trailing line without newline and finishes at EOF.
#[tokio::test]
async fn drain_reads_until_end_of_input() {
    let (mut out_w, out_r) = tokio::io::duplex(256);
    let sink = Arc::new(CollectingSink::default());
    let relay = StreamRelay::start(
        Some(out_r),
        None::<tokio::io::DuplexStream>,
        sink.clone(),
        Duration::from_secs(1),
    );

    out_w.write_all(b"one\nlast-without-newline").await.expect("write");
    drop(out_w);

    assert!(relay.drain().await, "EOF reached within the drain timeout");
    assert_eq!(
        sink.lines(),
        vec![
            (StreamKind::Stdout, "one".to_owned()),
            (StreamKind::Stdout, "last-without-newline".to_owned()),
        ]
    );
}

/// Invalid UTF-8 is relayed lossily rather than dropped.
#[tokio::test]
async fn invalid_utf8_is_replaced() {
    let (mut out_w, out_r) = tokio::io::duplex(64);
    let sink = Arc::new(CollectingSink::default());
    let relay = StreamRelay::start(
        Some(out_r),
        None::<tokio::io::DuplexStream>,
        sink.clone(),
        Duration::from_secs(1),
    );

    out_w.write_all(b"bad \xff byte\n").await.expect("write");
    wait_for_lines(&sink, 1).await;

    assert_eq!(sink.lines()[0].1, "bad \u{fffd} byte");
    relay.stop().await;
}

/// Stopping a relay whose streams stay open returns promptly.
#[tokio::test]
async fn stop_is_bounded_when_streams_stay_open() {
    let (_out_w, out_r) = tokio::io::duplex(64);
    let (_err_w, err_r) = tokio::io::duplex(64);
    let sink = Arc::new(CollectingSink::default());
    let relay = StreamRelay::start(Some(out_r), Some(err_r), sink, Duration::from_millis(500));

    let started = Instant::now();
    relay.stop().await;

    assert!(started.elapsed() < Duration::from_secs(2));
}

/// Nothing written after `stop()` reaches the sink.
#[tokio::test]
async fn no_lines_after_stop() {
    let (mut out_w, out_r) = tokio::io::duplex(256);
    let sink = Arc::new(CollectingSink::default());
    let relay = StreamRelay::start(
        Some(out_r),
        None::<tokio::io::DuplexStream>,
        sink.clone(),
        Duration::from_secs(1),
    );

    out_w.write_all(b"before\n").await.expect("write");
    wait_for_lines(&sink, 1).await;

    assert!(relay.stop().await);
    // The reader is gone once the pump exits, so a late write may fail.
    let _ = out_w.write_all(b"after\n").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(sink.lines(), vec![(StreamKind::Stdout, "before".to_owned())]);
}

/// A relay with no streams is immediately finished.
#[tokio::test]
async fn relay_without_streams_is_finished() {
    let sink = Arc::new(CollectingSink::default());
    let relay = StreamRelay::start(
        None::<tokio::io::DuplexStream>,
        None::<tokio::io::DuplexStream>,
        sink,
        Duration::from_millis(100),
    );
    assert!(relay.is_finished());
    assert!(relay.stop().await);
}
