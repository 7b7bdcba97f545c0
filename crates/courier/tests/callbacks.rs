// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous providers: accepted attempts, signed callbacks and
//! callback-window expiry.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use courier_core::{
    AttemptOutcome, Channel, Clock, CourierError, DeliveryStatus, GeographyKey, VoiceRule,
};
use courier_engine::{CallbackOutcome, CallbackPayload, sign};
use courier_test_utils::{
    CALLBACK_SECRET, Scripted, ScriptedProvider, TestHarness, new_request, provider, zone_policy,
};

fn accept(vendor_id: &str) -> Scripted {
    Scripted::Accept {
        provider_request_id: vendor_id.to_string(),
    }
}

fn signed_body(
    vendor_id: &str,
    outcome: CallbackOutcome,
    cost: Option<f64>,
    timestamp: DateTime<Utc>,
) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&CallbackPayload {
        provider_request_id: vendor_id.to_string(),
        outcome,
        cost,
        timestamp,
        detail: Some("handset ack".into()),
    })
    .unwrap();
    let signature = sign(CALLBACK_SECRET.as_bytes(), &body).unwrap();
    (body, signature)
}

async fn async_sms_harness(script: Vec<Scripted>) -> (TestHarness, Arc<ScriptedProvider>) {
    let sms = Arc::new(ScriptedProvider::with_script("sms-async", script));
    let harness = TestHarness::builder()
        .configure(|config| config.worker.default_callback_wait_seconds = 120)
        .with_zone(zone_policy("WA", 5))
        .with_provider(provider("sms-async", Channel::Sms, Some("WA"), 1, 0.5), sms.clone())
        .build()
        .await
        .unwrap();
    (harness, sms)
}

#[tokio::test]
async fn accepted_attempt_waits_for_callback() {
    let (harness, _) = async_sms_harness(vec![accept("v-1")]).await;
    let id = harness.enqueue(new_request("SN", "WA", Channel::Sms)).await.unwrap();
    harness.run_worker_once("w1").await.unwrap();

    let status = harness.status(&id).await.unwrap();
    assert_eq!(status.status, DeliveryStatus::Pending);
    assert_eq!(status.attempts.len(), 1);
    assert_eq!(status.attempts[0].outcome, AttemptOutcome::Accepted);
    assert_eq!(status.attempts[0].provider_request_id.as_deref(), Some("v-1"));
    assert_eq!(status.next_attempt_at, harness.clock.now() + Duration::seconds(120));

    // Not claimable while the window is open.
    harness.clock.advance(Duration::seconds(60));
    assert_eq!(harness.run_worker_once("w1").await.unwrap(), 0);

    let (body, signature) = signed_body("v-1", CallbackOutcome::Delivered, Some(0.42), harness.clock.now());
    let view = harness
        .engine
        .provider_inbound_callback(&body, &signature)
        .await
        .unwrap();
    assert_eq!(view.status, DeliveryStatus::Delivered);
    assert_eq!(view.attempts.len(), 2);
    assert_eq!(view.attempts[1].outcome, AttemptOutcome::Delivered);
    assert_eq!(view.attempts[1].cost, 0.42);
    assert_eq!(view.attempts[1].latency_ms, 60_000);

    let actions: Vec<String> = harness
        .engine
        .audit_trail(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert!(actions.contains(&"accepted".to_string()));
    assert!(actions.contains(&"callback_delivered".to_string()));

    // A replay finds nothing left to await.
    assert!(matches!(
        harness.engine.provider_inbound_callback(&body, &signature).await,
        Err(CourierError::NotFound { .. })
    ));
}

#[tokio::test]
async fn forged_or_stale_callbacks_are_rejected() {
    let (harness, _) = async_sms_harness(vec![accept("v-1")]).await;
    let id = harness.enqueue(new_request("SN", "WA", Channel::Sms)).await.unwrap();
    harness.run_worker_once("w1").await.unwrap();

    let (body, _) = signed_body("v-1", CallbackOutcome::Delivered, None, harness.clock.now());
    let forged = sign(b"some-other-secret-value-000000", &body).unwrap();
    assert!(matches!(
        harness.engine.provider_inbound_callback(&body, &forged).await,
        Err(CourierError::Signature(_))
    ));
    assert!(matches!(
        harness.engine.provider_inbound_callback(&body, "not-hex").await,
        Err(CourierError::Signature(_))
    ));

    let (stale, signature) = signed_body(
        "v-1",
        CallbackOutcome::Delivered,
        None,
        harness.clock.now() - Duration::hours(1),
    );
    assert!(matches!(
        harness.engine.provider_inbound_callback(&stale, &signature).await,
        Err(CourierError::Signature(_))
    ));

    let status = harness.status(&id).await.unwrap();
    assert_eq!(status.status, DeliveryStatus::Pending);
    assert_eq!(status.attempts.len(), 1);
}

#[tokio::test]
async fn callbacks_without_a_secret_are_refused() {
    let harness = TestHarness::builder()
        .configure(|config| config.callback.secret = None)
        .with_zone(zone_policy("WA", 5))
        .build()
        .await
        .unwrap();
    let (body, signature) = signed_body("v-1", CallbackOutcome::Delivered, None, harness.clock.now());
    assert!(matches!(
        harness.engine.provider_inbound_callback(&body, &signature).await,
        Err(CourierError::Signature(_))
    ));
}

#[tokio::test]
async fn transient_callback_failure_reschedules_immediately() {
    let (harness, sms) = async_sms_harness(vec![accept("v-1")]).await;
    let id = harness.enqueue(new_request("SN", "WA", Channel::Sms)).await.unwrap();
    harness.run_worker_once("w1").await.unwrap();

    harness.clock.advance(Duration::seconds(10));
    let (body, signature) = signed_body("v-1", CallbackOutcome::TransientFailure, None, harness.clock.now());
    let view = harness
        .engine
        .provider_inbound_callback(&body, &signature)
        .await
        .unwrap();
    assert_eq!(view.status, DeliveryStatus::Pending);
    assert_eq!(view.next_attempt_at, harness.clock.now());
    assert_eq!(view.attempts[1].outcome, AttemptOutcome::TransientFailure);

    // The script is spent, so the next pass delivers synchronously.
    harness.run_worker_once("w1").await.unwrap();
    let status = harness.status(&id).await.unwrap();
    assert_eq!(status.status, DeliveryStatus::Delivered);
    assert_eq!(status.attempts.len(), 3);
    assert_eq!(sms.calls(), 2);
}

#[tokio::test]
async fn permanent_callback_failure_is_terminal() {
    let (harness, _) = async_sms_harness(vec![accept("v-1")]).await;
    let id = harness.enqueue(new_request("SN", "WA", Channel::Sms)).await.unwrap();
    harness.run_worker_once("w1").await.unwrap();

    let (body, signature) = signed_body("v-1", CallbackOutcome::PermanentFailure, None, harness.clock.now());
    harness
        .engine
        .provider_inbound_callback(&body, &signature)
        .await
        .unwrap();

    let status = harness.status(&id).await.unwrap();
    assert_eq!(status.status, DeliveryStatus::Failed);
    assert_eq!(status.failure_reason.as_deref(), Some("permanent_failure"));
}

#[tokio::test]
async fn elapsed_window_times_out_and_resumes_with_next_provider() {
    let slow = Arc::new(ScriptedProvider::with_script("sms-async", vec![accept("v-2")]));
    let sync = Arc::new(ScriptedProvider::new("sms-sync"));
    let harness = TestHarness::builder()
        .configure(|config| config.worker.default_callback_wait_seconds = 120)
        .with_zone(zone_policy("WA", 5))
        .with_provider(provider("sms-async", Channel::Sms, Some("WA"), 1, 0.5), slow.clone())
        .with_provider(provider("sms-sync", Channel::Sms, Some("WA"), 2, 0.5), sync.clone())
        .build()
        .await
        .unwrap();

    let id = harness.enqueue(new_request("SN", "WA", Channel::Sms)).await.unwrap();
    harness.run_worker_once("w1").await.unwrap();
    assert_eq!(sync.calls(), 0);

    harness.clock.advance(Duration::seconds(121));
    assert_eq!(harness.run_worker_once("w1").await.unwrap(), 1);

    let status = harness.status(&id).await.unwrap();
    assert_eq!(status.status, DeliveryStatus::Delivered);
    let chain: Vec<(&str, AttemptOutcome)> = status
        .attempts
        .iter()
        .map(|a| (a.provider_id.as_str(), a.outcome))
        .collect();
    assert_eq!(
        chain,
        vec![
            ("sms-async", AttemptOutcome::Accepted),
            ("sms-async", AttemptOutcome::Timeout),
            ("sms-sync", AttemptOutcome::Delivered),
        ]
    );
    assert_eq!((slow.calls(), sync.calls()), (1, 1));

    // The vendor answers too late.
    let (body, signature) = signed_body("v-2", CallbackOutcome::Delivered, None, harness.clock.now());
    assert!(matches!(
        harness.engine.provider_inbound_callback(&body, &signature).await,
        Err(CourierError::NotFound { .. })
    ));
}

#[tokio::test]
async fn voice_reservation_is_held_until_callback() {
    let voice = Arc::new(ScriptedProvider::with_script("voice-async", vec![accept("call-7")]));
    let harness = TestHarness::builder()
        .with_zone(zone_policy("WA", 5))
        .with_provider(provider("voice-async", Channel::Voice, Some("WA"), 1, 1.5), voice)
        .with_voice_rule(VoiceRule {
            geography: GeographyKey::Country("SN".into()),
            fallback_delay_seconds: 30,
            budget_daily_usd: Some(10.0),
            ..VoiceRule::default()
        })
        .build()
        .await
        .unwrap();
    let key = GeographyKey::Country("SN".into());

    let id = harness.enqueue(new_request("SN", "WA", Channel::Voice)).await.unwrap();
    harness.run_worker_once("w1").await.unwrap();

    let status = harness.status(&id).await.unwrap();
    assert_eq!(status.next_attempt_at, harness.clock.now() + Duration::seconds(30));
    let held = harness.engine.budget().held(&id).await.unwrap().unwrap();
    assert_eq!((held.geography(), held.amount()), (&key, 1.5));
    assert_eq!(harness.engine.budget().reserved(&key, harness.clock.now()).await.unwrap(), 1.5);

    let (body, signature) = signed_body("call-7", CallbackOutcome::Delivered, None, harness.clock.now());
    let view = harness
        .engine
        .provider_inbound_callback(&body, &signature)
        .await
        .unwrap();
    assert_eq!(view.status, DeliveryStatus::Delivered);
    assert_eq!(view.attempts[1].cost, 1.5);

    let budget = harness.engine.budget();
    let now = harness.clock.now();
    assert!(budget.held(&id).await.unwrap().is_none());
    assert_eq!(budget.reserved(&key, now).await.unwrap(), 0.0);
    assert_eq!(budget.committed(&key, now).await.unwrap(), (1.5, 1.5));
}

#[tokio::test]
async fn voice_window_expiry_releases_reservation() {
    let voice = Arc::new(ScriptedProvider::with_script("voice-async", vec![accept("call-8")]));
    let harness = TestHarness::builder()
        .with_zone(zone_policy("WA", 1))
        .with_provider(provider("voice-async", Channel::Voice, Some("WA"), 1, 1.5), voice)
        .with_voice_rule(VoiceRule {
            geography: GeographyKey::Country("SN".into()),
            fallback_delay_seconds: 30,
            budget_daily_usd: Some(10.0),
            ..VoiceRule::default()
        })
        .build()
        .await
        .unwrap();
    let key = GeographyKey::Country("SN".into());

    let id = harness.enqueue(new_request("SN", "WA", Channel::Voice)).await.unwrap();
    harness.run_worker_once("w1").await.unwrap();
    assert_eq!(harness.engine.budget().reserved(&key, harness.clock.now()).await.unwrap(), 1.5);

    harness.clock.advance(Duration::seconds(31));
    harness.run_worker_once("w1").await.unwrap();

    // One retry allowed and the timeout consumed it.
    let status = harness.status(&id).await.unwrap();
    assert_eq!(status.status, DeliveryStatus::Failed);
    assert_eq!(status.failure_reason.as_deref(), Some("max_retries_exhausted"));
    assert_eq!(status.attempts.last().map(|a| a.outcome), Some(AttemptOutcome::Timeout));
    let budget = harness.engine.budget();
    let now = harness.clock.now();
    assert!(budget.held(&id).await.unwrap().is_none());
    assert_eq!(budget.reserved(&key, now).await.unwrap(), 0.0);
    assert_eq!(budget.committed(&key, now).await.unwrap(), (0.0, 0.0));
}
