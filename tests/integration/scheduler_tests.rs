use super::*;
use pricewatch::{CyclePhase, OneOffCheck};

#[tokio::test]
async fn test_cycle_covers_every_watch_despite_failures() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let urls = [
        "https://shop.example/p/1",
        "https://shop.example/p/2",
        "https://shop.example/p/3",
        "https://shop.example/p/4",
    ];
    for url in urls {
        h.watch(url, "100").await?;
    }
    h.fetcher.set_status(urls[0], 500);
    h.fetcher.set_price(urls[1], "99.00");
    h.fetcher.set_html(urls[2], "<p>no price here</p>".to_string());
    h.fetcher.set_price(urls[3], "150.00");

    let report = h.scheduler.run_cycle().await;
    assert_eq!(report.attempted, 4);
    assert_eq!(report.checked, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.alerts_sent, 1);

    let second = h.scheduler.run_cycle().await;
    assert_eq!(second.alerts_sent, 0);
    assert_eq!(h.dispatcher.count(), 1);

    let stats = h.scheduler.stats().await;
    assert_eq!(stats.cycles_completed, 2);
    assert_eq!(stats.phase, CyclePhase::Idle);
    Ok(())
}

#[tokio::test]
async fn test_one_off_and_cycle_race_sends_one_alert() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let url = "https://shop.example/p/race";
    let key = h.watch(url, "100").await?;
    h.fetcher.set_price(url, "90.00");
    h.fetcher.set_delay(Duration::from_millis(80));

    let scheduled = h
        .scheduler
        .check_once(key.clone(), Duration::from_millis(10))
        .await?;
    assert!(matches!(scheduled, OneOffCheck::Scheduled { .. }));

    let report = h.scheduler.run_cycle().await;
    let scheduler = h.scheduler.clone();
    assert!(
        wait_for_condition(
            || {
                let scheduler = scheduler.clone();
                async move { scheduler.pending_checks().await == 0 }
            },
            Duration::from_secs(2),
        )
        .await
    );

    assert_eq!(h.fetcher.calls(), 2);
    assert_eq!(h.dispatcher.count(), 1);
    assert!(report.attempted == 1);
    Ok(())
}

#[tokio::test]
async fn test_background_loop_picks_up_new_watches() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let config = get_test_config();
    let scheduler = RecheckScheduler::new(h.manager.clone(), &config.scheduler)
        .with_interval(Duration::from_millis(50));

    scheduler.start().await?;
    let url = "https://shop.example/p/later";
    h.fetcher.set_price(url, "10.00");
    h.watch(url, "20").await?;

    let dispatcher = h.dispatcher.clone();
    let alerted = wait_for_condition(
        || {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.count() == 1 }
        },
        Duration::from_secs(2),
    )
    .await;
    scheduler.shutdown(Duration::from_secs(1)).await;

    assert!(alerted);
    assert_eq!(h.dispatcher.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_zero_delay_returns_inline_result() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let url = "https://shop.example/p/now";
    let key = h.watch(url, "20").await?;
    h.fetcher.set_price(url, "25.00");

    match h.scheduler.check_once(key, Duration::ZERO).await? {
        OneOffCheck::Completed(result) => {
            assert!(result.checked);
            assert!(!result.alerted);
            assert_eq!(result.price, Some("25".parse()?));
        }
        other => panic!("expected inline result, got {other:?}"),
    }
    Ok(())
}
