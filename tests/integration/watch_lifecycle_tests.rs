use super::*;
use pricewatch::FailureKind;

const URL: &str = "https://shop.example/products/lifecycle";

#[tokio::test]
async fn test_idempotent_checks_above_target() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let key = h.watch(URL, "50").await?;
    h.fetcher.set_price(URL, "64.99");

    h.manager.check_watch(&key).await?;
    h.manager.check_watch(&key).await?;

    assert_eq!(h.dispatcher.count(), 0);
    assert_eq!(h.fetcher.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_at_most_one_alert_over_many_cycles() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let key = h.watch(URL, "50").await?;
    h.fetcher.set_price(URL, "49.99");

    for _ in 0..10 {
        h.manager.check_watch(&key).await?;
    }

    assert_eq!(h.dispatcher.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_rearm_after_target_change() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let key = h.watch(URL, "50").await?;
    h.fetcher.set_price(URL, "45.00");
    h.manager.check_watch(&key).await?;
    assert_eq!(h.dispatcher.count(), 1);

    // Same target again: still fired, nothing new
    h.watch(URL, "50.00").await?;
    h.manager.check_watch(&key).await?;
    assert_eq!(h.dispatcher.count(), 1);

    // New target not yet met
    h.watch(URL, "40").await?;
    let watch = h.manager.get_watch(&key).await?.expect("watch stored");
    assert!(!watch.alert_already_sent);
    h.manager.check_watch(&key).await?;
    assert_eq!(h.dispatcher.count(), 1);

    // New target met: exactly one more
    h.fetcher.set_price(URL, "39.00");
    for _ in 0..3 {
        h.manager.check_watch(&key).await?;
    }
    assert_eq!(h.dispatcher.count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_dispatch_failure_is_retried() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let key = h.watch(URL, "50").await?;
    h.fetcher.set_price(URL, "45.00");
    h.dispatcher.fail_next(2);

    for _ in 0..2 {
        let result = h.manager.check_watch(&key).await?;
        assert!(result.checked);
        assert_eq!(result.reason, Some(FailureKind::DispatchFailed));
    }
    assert_eq!(h.dispatcher.count(), 0);

    let result = h.manager.check_watch(&key).await?;
    assert!(result.alerted);
    assert_eq!(result.delivery_id.as_deref(), Some("SM0001"));

    h.manager.check_watch(&key).await?;
    assert_eq!(h.dispatcher.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_checks_send_one_alert() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let key = h.watch(URL, "50").await?;
    h.fetcher.set_price(URL, "45.00");
    h.fetcher.set_delay(Duration::from_millis(100));

    let (a, b) = tokio::join!(h.manager.check_watch(&key), h.manager.check_watch(&key));
    let alerted = [a?.alerted, b?.alerted];

    assert_eq!(alerted.iter().filter(|a| **a).count(), 1);
    assert_eq!(h.dispatcher.count(), 1);
    assert_eq!(h.fetcher.calls(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_checks_across_threads_send_one_alert() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let key = h.watch(URL, "50").await?;
    h.fetcher.set_price(URL, "45.00");
    h.fetcher.set_delay(Duration::from_millis(20));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = h.manager.clone();
            let key = key.clone();
            tokio::spawn(async move { manager.check_watch(&key).await })
        })
        .collect();

    let mut alerts = 0;
    for handle in handles {
        if handle.await??.alerted {
            alerts += 1;
        }
    }

    assert_eq!(alerts, 1);
    assert_eq!(h.dispatcher.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_distinct_recipients_are_independent() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let first = h.watch(URL, "50").await?;
    let second = h
        .manager
        .register(pricewatch::NewWatch {
            url: URL.to_string(),
            recipient: "whatsapp:+15550002222".to_string(),
            target_price: "30".parse()?,
        })
        .await?
        .watch
        .key();
    h.fetcher.set_price(URL, "45.00");

    assert!(h.manager.check_watch(&first).await?.alerted);
    assert!(!h.manager.check_watch(&second).await?.alerted);
    assert_eq!(h.manager.list_watches().await?.len(), 2);
    Ok(())
}
