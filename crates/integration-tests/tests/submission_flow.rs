use chrono::Duration;
use domains::error::AppError;
use domains::models::{BanStatus, ModerationStatus, ModerationVerdict, SubmissionOutcome};
use domains::ports::MockContentModerator;
use integration_tests::{request, Harness};
use std::sync::Arc;

#[tokio::test]
async fn three_per_hour_then_limited_then_released() {
    let h = Harness::builder().per_hour(3).build();

    for n in 0..3 {
        h.clock.advance(Duration::seconds(10));
        let outcome = h
            .submit_from("203.0.113.50", &format!("sighting {n} at the docks"))
            .await;
        assert_eq!(outcome.label(), "success");
    }

    let first_at = integration_tests::start() + Duration::seconds(10);
    h.clock.advance(Duration::seconds(10));
    let outcome = h.submit_from("203.0.113.50", "fourth sighting at the docks").await;
    assert_eq!(
        outcome,
        SubmissionOutcome::RateLimited {
            reset_at: first_at + Duration::hours(1)
        }
    );

    h.clock.set(first_at + Duration::hours(1));
    let outcome = h.submit_from("203.0.113.50", "fifth sighting at the docks").await;
    assert_eq!(outcome.label(), "success");
}

#[tokio::test]
async fn ten_minute_ban_expires_on_time() {
    let h = Harness::builder().build();
    let key = h.throttle_key_of("203.0.113.51");
    let ban = h
        .bans
        .ban(&key, Duration::minutes(10), "harassment", "admin")
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(5));
    match h.submit_from("203.0.113.51", "let me post").await {
        SubmissionOutcome::Banned { reason, expires_at } => {
            assert_eq!(reason, "harassment");
            assert_eq!(expires_at, integration_tests::start() + Duration::minutes(10));
            assert_eq!(expires_at, ban.expires_at);
        }
        other => panic!("expected ban, got {other:?}"),
    }

    h.clock.advance(Duration::minutes(6));
    assert_eq!(h.bans.is_banned(&key).await, BanStatus::NotBanned);
    let outcome = h.submit_from("203.0.113.51", "let me post now").await;
    assert_eq!(outcome.label(), "success");
}

#[tokio::test]
async fn oversized_tip_fails_before_any_policy_check() {
    let mut moderator = MockContentModerator::new();
    moderator.expect_moderate().times(0);
    let h = Harness::builder()
        .per_hour(1)
        .moderator(Arc::new(moderator))
        .build();
    let key = h.throttle_key_of("203.0.113.52");
    h.bans
        .ban(&key, Duration::hours(1), "spam", "admin")
        .await
        .unwrap();

    let err = h
        .tips
        .submit(request("203.0.113.52", &"a".repeat(1200)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
    // neither the ban nor the quota was consulted
    assert_eq!(h.rate_limiter.remaining_quota(&key), 1);
    assert_eq!(h.rate_limiter.tracked_identifiers(), 0);
}

#[tokio::test]
async fn banned_actor_never_reaches_moderation_or_quota() {
    let mut moderator = MockContentModerator::new();
    moderator.expect_moderate().times(0);
    let h = Harness::builder().moderator(Arc::new(moderator)).build();
    let key = h.throttle_key_of("203.0.113.53");
    h.bans
        .ban(&key, Duration::hours(1), "spam", "admin")
        .await
        .unwrap();

    for _ in 0..20 {
        let outcome = h.submit_from("203.0.113.53", "spam spam lovely spam").await;
        assert_eq!(outcome.label(), "banned");
    }
    assert_eq!(h.rate_limiter.remaining_quota(&key), 10);
}

#[tokio::test]
async fn non_accepted_outcomes_leave_no_trace() {
    let mut moderator = MockContentModerator::new();
    moderator
        .expect_moderate()
        .withf(|text| text.contains("reject me"))
        .returning(|_| {
            Ok(ModerationVerdict {
                status: ModerationStatus::Rejected,
                moderated_text: String::new(),
                reason: None,
                categories: vec!["harassment".into()],
            })
        });
    let h = Harness::builder()
        .per_hour(1)
        .moderator(Arc::new(moderator))
        .build();

    let outcome = h.submit_from("203.0.113.54", "please reject me").await;
    assert_eq!(
        outcome,
        SubmissionOutcome::Rejected {
            reason: "Content rejected by moderation".to_string()
        }
    );
    // the rejected attempt still consumed the only slot
    let outcome = h.submit_from("203.0.113.54", "please reject me again").await;
    assert_eq!(outcome.label(), "rate_limited");

    assert_eq!(h.tips.recent_len().await, 0);
    assert_eq!(h.tips.pending_len().await, 0);
    assert!(h.tips.list_recent().await.is_empty());
    assert!(h.tips.last_interaction().await.is_none());
}

#[tokio::test]
async fn display_hashes_differ_while_quota_is_shared() {
    let h = Harness::builder().per_hour(2).build();

    let first = match h.submit_from("203.0.113.55", "the red van again").await {
        SubmissionOutcome::Accepted(r) => r,
        other => panic!("{other:?}"),
    };
    let second = match h.submit_from("203.0.113.55", "the blue van this time").await {
        SubmissionOutcome::Accepted(r) => r,
        other => panic!("{other:?}"),
    };

    assert_ne!(first.identity_hash, second.identity_hash);
    assert_eq!(second.remaining, 0);
    assert_eq!(
        h.submit_from("203.0.113.55", "and a green van").await.label(),
        "rate_limited"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_respect_the_cap_and_queue_once() {
    let h = Arc::new(Harness::builder().per_hour(10).build());

    let tasks: Vec<_> = (0..40)
        .map(|n| {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                h.submit_from("203.0.113.56", &format!("burst number {n} downtown"))
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        if task.await.unwrap().label() == "success" {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 10);

    let consumers: Vec<_> = (0..6)
        .map(|_| {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                loop {
                    let batch = h.tips.take_pending_batch().await;
                    if batch.is_empty() {
                        break seen;
                    }
                    assert!(batch.len() <= 3);
                    seen.extend(batch);
                }
            })
        })
        .collect();

    let mut delivered = Vec::new();
    for consumer in consumers {
        delivered.extend(consumer.await.unwrap());
    }
    assert_eq!(delivered.len(), 10);
    delivered.sort();
    delivered.dedup();
    assert_eq!(delivered.len(), 10, "a tip was delivered twice");
}
