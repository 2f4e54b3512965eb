//! Admin API over a real listener.

use reqwest::StatusCode;
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_admin_requires_key() {
    let (upstream, _hits) = common::start_mock_upstream().await;
    let shield = common::start_shield(common::test_config(upstream)).await;

    let res = reqwest::Client::new()
        .get(shield.admin("/admin/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = shield.admin_client().get(shield.admin("/admin/status")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let status: Value = res.json().await.unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["rate_limit_rules"], 6);

    shield.stop().await;
}

#[tokio::test]
async fn test_block_listing_and_history() {
    let (upstream, _hits) = common::start_mock_upstream().await;
    let shield = common::start_shield(common::test_config(upstream)).await;
    let admin = shield.admin_client();

    for (address, reason) in [("192.0.2.10", "scraping"), ("192.0.2.11", "fraud")] {
        let res = admin
            .post(shield.admin("/admin/ip/block"))
            .json(&serde_json::json!({ "address": address, "reason": reason, "actor": "ops-1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let blocked: Vec<Value> = admin
        .get(shield.admin("/admin/ip/blocked"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(blocked.len(), 2);
    assert!(blocked.iter().all(|e| e["added_by"] == "ops-1" && e["expires_at"].is_null()));

    let res = admin
        .delete(shield.admin("/admin/ip/block/192.0.2.10"))
        .query(&[("actor", "ops-2")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let report: Value = admin
        .get(shield.admin("/admin/ip/192.0.2.10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["blocked"], false);
    assert_eq!(report["history"].as_array().unwrap().len(), 1);
    assert_eq!(report["history"][0]["is_active"], false);

    shield.shield.audit.flush().await;
    let page: Value = admin
        .get(shield.admin("/admin/audit"))
        .query(&[("action", "IpUnblocked")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["actor_id"], "ops-2");

    shield.stop().await;
}
