// Integration tests for the response aggregator's timing and delivery
// guarantees. Timing-sensitive tests use short real durations with generous
// assertion margins.
use roundtable::{CompletionCallback, ResponseAggregator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

fn channel_callback() -> (
    CompletionCallback,
    oneshot::Receiver<HashMap<String, String>>,
) {
    let (tx, rx) = oneshot::channel();
    (
        Box::new(move |replies| {
            Box::pin(async move {
                let _ = tx.send(replies);
            })
        }),
        rx,
    )
}

fn counting_callback(counter: Arc<AtomicUsize>) -> CompletionCallback {
    Box::new(move |_replies| {
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    })
}

#[tokio::test]
async fn test_threshold_short_circuits_before_deadline() {
    let aggregator = ResponseAggregator::new();
    let (callback, rx) = channel_callback();

    let started = Instant::now();
    aggregator
        .submit("round", 2, Duration::from_secs(30), callback)
        .await
        .unwrap();
    aggregator.record_reply("round", "a", "alpha").await;
    aggregator.record_reply("round", "b", "beta").await;

    let replies = rx.await.unwrap();
    assert_eq!(replies.len(), 2);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "threshold completion must not wait for the deadline"
    );

    let stats = aggregator.get_stats().await;
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.timed_out, 0);
    assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_partial_round_completes_at_deadline() {
    let aggregator = ResponseAggregator::new();
    let (callback, rx) = channel_callback();

    let started = Instant::now();
    aggregator
        .submit("round", 3, Duration::from_millis(250), callback)
        .await
        .unwrap();
    aggregator.record_reply("round", "a", "alpha").await;
    aggregator.record_reply("round", "b", "beta").await;

    let replies = rx.await.unwrap();
    assert_eq!(replies.len(), 2, "exactly the replies that made it in time");
    assert!(
        started.elapsed() >= Duration::from_millis(200),
        "an unmet threshold must hold the round open until the deadline"
    );

    let stats = aggregator.get_stats().await;
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.active_rounds, 0);
}

#[tokio::test]
async fn test_empty_round_still_completes() {
    let aggregator = ResponseAggregator::new();
    let (callback, rx) = channel_callback();

    aggregator
        .submit("quiet", 2, Duration::from_millis(150), callback)
        .await
        .unwrap();

    let replies = rx.await.unwrap();
    assert!(replies.is_empty(), "nobody answered in time, not an error");

    let stats = aggregator.get_stats().await;
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.success_rate, 0.0);
}

#[tokio::test]
async fn test_replies_after_completion_are_ignored() {
    let aggregator = ResponseAggregator::new();
    let (callback, rx) = channel_callback();

    aggregator
        .submit("round", 1, Duration::from_secs(30), callback)
        .await
        .unwrap();
    aggregator.record_reply("round", "a", "alpha").await;
    let replies = rx.await.unwrap();
    assert_eq!(replies.len(), 1);

    // The round is gone; a straggler changes nothing and raises nothing.
    aggregator.record_reply("round", "b", "too late").await;
    let stats = aggregator.get_stats().await;
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.active_rounds, 0);
}

#[tokio::test]
async fn test_completion_fires_exactly_once_under_race() {
    // Land the final reply right on top of the deadline, repeatedly. Whichever
    // path wins, the callback must fire exactly once per round.
    for i in 0..20 {
        let aggregator = ResponseAggregator::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let round_id = format!("race-{}", i);

        aggregator
            .submit(
                round_id.clone(),
                1,
                Duration::from_millis(20),
                counting_callback(counter.clone()),
            )
            .await
            .unwrap();

        let racer = {
            let aggregator = aggregator.clone();
            let round_id = round_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                aggregator.record_reply(&round_id, "a", "photo finish").await;
            })
        };
        racer.await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(
            counter.load(Ordering::SeqCst),
            1,
            "round {} delivered more or less than once",
            round_id
        );
        let stats = aggregator.get_stats().await;
        assert_eq!(stats.completed + stats.timed_out, 1);
        assert_eq!(stats.active_rounds, 0);
    }
}

#[tokio::test]
async fn test_average_latency_folds_over_threshold_completions() {
    let aggregator = ResponseAggregator::new();

    let (callback, rx) = channel_callback();
    aggregator
        .submit("r1", 1, Duration::from_secs(30), callback)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    aggregator.record_reply("r1", "a", "alpha").await;
    rx.await.unwrap();

    let first_avg = aggregator.get_stats().await.avg_response_time;
    assert!(
        first_avg >= 0.1 && first_avg < 5.0,
        "first average should reflect the ~100ms round, got {}",
        first_avg
    );

    let (callback, rx) = channel_callback();
    aggregator
        .submit("r2", 1, Duration::from_secs(30), callback)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    aggregator.record_reply("r2", "a", "alpha").await;
    rx.await.unwrap();

    let stats = aggregator.get_stats().await;
    assert_eq!(stats.completed, 2);
    // (1*avg + elapsed) / 2: the mean of a ~0.1s and a ~0.3s round.
    assert!(
        stats.avg_response_time > first_avg,
        "a slower round must pull the average up"
    );
    assert!(
        stats.avg_response_time >= 0.15 && stats.avg_response_time < 5.0,
        "average should sit between the two rounds, got {}",
        stats.avg_response_time
    );
}

#[tokio::test]
async fn test_rounds_are_independent() {
    let aggregator = ResponseAggregator::new();

    let (callback_a, rx_a) = channel_callback();
    let (callback_b, rx_b) = channel_callback();
    aggregator
        .submit("a", 1, Duration::from_secs(30), callback_a)
        .await
        .unwrap();
    aggregator
        .submit("b", 1, Duration::from_secs(30), callback_b)
        .await
        .unwrap();
    assert_eq!(aggregator.get_stats().await.active_rounds, 2);

    aggregator.record_reply("a", "agent", "done").await;
    let replies = rx_a.await.unwrap();
    assert_eq!(replies["agent"], "done");

    // Round b is untouched by a's completion.
    assert_eq!(aggregator.get_stats().await.active_rounds, 1);
    aggregator.record_reply("b", "agent", "also done").await;
    rx_b.await.unwrap();
    assert_eq!(aggregator.get_stats().await.active_rounds, 0);
}
