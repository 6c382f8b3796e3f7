use super::*;
use axum::http::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let (status, body) = make_request(h.app_state(), Method::GET, "/api/health", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn test_notify_flow() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let url = "https://shop.example/api/item";

    h.fetcher.set_price(url, "120.00");
    let (status, body) = make_request(
        h.app_state(),
        Method::POST,
        "/api/notify",
        Some(json!({"url": url, "target_price": 100, "delay_minutes": 0})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "not_triggered");
    assert_eq!(body["data"]["price"], 120.0);
    assert_eq!(body["data"]["triggered"], false);

    h.fetcher.set_price(url, "95.00");
    let (_, body) = make_request(
        h.app_state(),
        Method::POST,
        "/api/notify",
        Some(json!({"url": url, "target_price": 100})),
    )
    .await?;
    assert_eq!(body["data"]["status"], "sent");
    assert_eq!(body["data"]["sid"], "SM0001");

    let (_, body) = make_request(
        h.app_state(),
        Method::POST,
        "/api/notify",
        Some(json!({"url": url, "target_price": 100})),
    )
    .await?;
    assert_eq!(body["data"]["status"], "already_sent");
    assert_eq!(h.dispatcher.count(), 1);

    let (status, body) = make_request(h.app_state(), Method::GET, "/api/watches", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(|w| w.len()), Some(1));
    assert_eq!(body["data"][0]["alert_already_sent"], true);
    Ok(())
}

#[tokio::test]
async fn test_notify_with_delay_is_scheduled() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let url = "https://shop.example/api/later";
    h.fetcher.set_price(url, "10.00");

    let (status, body) = make_request(
        h.app_state(),
        Method::POST,
        "/api/notify",
        Some(json!({"url": url, "target_price": 20, "delay_minutes": 30, "send_to": "+15550003333"})),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "scheduled");
    assert!(body["data"]["job_id"].is_string());
    assert_eq!(h.fetcher.calls(), 0);

    let (_, stats) = make_request(h.app_state(), Method::GET, "/api/scheduler", None).await?;
    assert_eq!(stats["data"]["pending_checks"], 1);

    h.scheduler.shutdown(Duration::from_millis(100)).await;
    Ok(())
}

#[tokio::test]
async fn test_notify_validation_errors() -> anyhow::Result<()> {
    let h = create_harness().await?;

    let cases = [
        json!({"url": "https://shop.example/x", "target_price": -1}),
        json!({"url": "not a url", "target_price": 10}),
        json!({"url": "ftp://shop.example/x", "target_price": 10}),
        json!({"url": "https://shop.example/x", "target_price": 10, "delay_minutes": 5000}),
    ];

    for case in cases {
        let (status, body) =
            make_request(h.app_state(), Method::POST, "/api/notify", Some(case.clone())).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "case: {case}");
        assert_eq!(body["success"], false);
    }

    assert!(h.manager.list_watches().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_malformed_bodies_use_error_envelope() -> anyhow::Result<()> {
    let h = create_harness().await?;

    let cases = [
        (Method::POST, "/api/notify", json!({"url": "https://shop.example/x", "target_price": "abc"})),
        (Method::POST, "/api/notify", json!({"url": "https://shop.example/x"})),
        (Method::DELETE, "/api/watches", json!({"url": "https://shop.example/x"})),
    ];

    for (method, uri, body) in cases {
        let (status, response) = make_request(h.app_state(), method, uri, Some(body.clone())).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "case: {body}");
        assert_eq!(response["success"], false);
        assert_eq!(response["error"]["code"], "BAD_REQUEST");
    }

    assert!(h.manager.list_watches().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_notify_requires_a_recipient() -> anyhow::Result<()> {
    let mut h = create_harness().await?;
    h.config.notifications.whatsapp.default_recipient = None;

    let (status, _) = make_request(
        h.app_state(),
        Method::POST,
        "/api/notify",
        Some(json!({"url": "https://shop.example/x", "target_price": 10})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_remove_watch() -> anyhow::Result<()> {
    let h = create_harness().await?;
    let url = "https://shop.example/api/remove";
    h.watch(url, "10").await?;

    let (status, body) = make_request(
        h.app_state(),
        Method::DELETE,
        "/api/watches",
        Some(json!({"url": url, "recipient": "+15550001111"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], true);

    let (status, _) = make_request(
        h.app_state(),
        Method::DELETE,
        "/api/watches",
        Some(json!({"url": url, "recipient": RECIPIENT})),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
