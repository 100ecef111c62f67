// tests/learning_flow.rs
//
// End-to-end capture → adjustment → metrics behaviour through the public facade.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use feedback_learner::adjustment::AdjustmentType;
use feedback_learner::clock::ManualClock;
use feedback_learner::{
    BehaviorData, ConfigPatch, ExplicitKind, FeedbackLearner, FeedbackType, LearningConfig,
    LearningError, MemoryStore,
};

const FACTORS: [&str; 3] = ["efficiency_weight", "risk_weight", "quality_weight"];

async fn rig(cfg: LearningConfig) -> (FeedbackLearner, Arc<MemoryStore>, Arc<ManualClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
    ));
    let learner = FeedbackLearner::new(cfg, store.clone(), clock.clone());
    learner.initialize().await;
    (learner, store, clock)
}

fn cfg(min: usize, rate: f64) -> LearningConfig {
    LearningConfig {
        min_feedbacks_for_adjustment: min,
        learning_rate: rate,
        ..LearningConfig::default()
    }
}

async fn reject(l: &FeedbackLearner, decision: &str) {
    l.capture_explicit_feedback("op", decision, ExplicitKind::Rejection, None, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn explicit_feedback_maps_kind_to_value() {
    let (l, _, _) = rig(LearningConfig::default()).await;

    let a = l
        .capture_explicit_feedback("u", "d", ExplicitKind::Approval, Some("good".into()), None)
        .await
        .unwrap();
    assert_eq!(a.value, 1.0);
    assert!(a.explicit);
    assert_eq!(a.kind, FeedbackType::Approval);
    assert_eq!(a.comment.as_deref(), Some("good"));

    let r = l
        .capture_explicit_feedback("u", "d", ExplicitKind::Rejection, None, None)
        .await
        .unwrap();
    assert_eq!(r.value, -1.0);

    let m = l
        .capture_explicit_feedback("u", "d", ExplicitKind::Modification, None, None)
        .await
        .unwrap();
    assert_eq!(m.value, 0.0);
}

#[tokio::test]
async fn implicit_feedback_follows_priority_rules() {
    let (l, _, _) = rig(LearningConfig::default()).await;
    let cases = [
        (
            BehaviorData {
                task_completed: Some(true),
                error_occurred: Some(false),
                ..Default::default()
            },
            0.7,
        ),
        (
            BehaviorData {
                error_occurred: Some(true),
                task_completed: Some(true),
                ..Default::default()
            },
            -0.7,
        ),
        (
            BehaviorData {
                alternative_chosen: Some(true),
                ..Default::default()
            },
            -0.5,
        ),
        (
            BehaviorData {
                modifications_count: Some(3),
                ..Default::default()
            },
            -0.3,
        ),
        (BehaviorData::default(), 0.0),
    ];
    for (i, (b, want)) in cases.into_iter().enumerate() {
        let fb = l
            .capture_implicit_feedback("u", &format!("d{i}"), b, None)
            .await
            .unwrap();
        assert_eq!(fb.value, want, "case {i}");
        assert!(!fb.explicit);
        assert_eq!(fb.kind, FeedbackType::Implicit);
    }
}

#[tokio::test]
async fn negative_sentiment_decreases_every_factor_once() {
    let (l, store, _) = rig(cfg(3, 0.1)).await;
    let before = l.get_all_weights();

    reject(&l, "d1").await;
    l.capture_implicit_feedback(
        "op",
        "d1",
        BehaviorData {
            alternative_chosen: Some(true),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();
    l.capture_implicit_feedback(
        "op",
        "d1",
        BehaviorData {
            error_occurred: Some(true),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();

    for f in FACTORS {
        let b = before.iter().find(|w| w.factor == f).unwrap();
        let a = l.get_decision_weight(f).unwrap();
        assert!((b.current_weight - a.current_weight - 0.05).abs() < 1e-9, "{f}");
        assert_eq!(b.confidence - a.confidence, 10.0, "{f}");
        assert_eq!(a.adjustment_count, 1);
        assert_eq!(a.historical_weight, b.historical_weight);
    }

    let hist = l.get_adjustment_history(50);
    assert_eq!(hist.len(), 1);
    assert_eq!(hist[0].adjustment_type, AdjustmentType::WeightDecrease);
    assert!((hist[0].magnitude - 0.05).abs() < 1e-12);
    assert_eq!(hist[0].affected, FACTORS.to_vec());

    assert_eq!(store.saved_adjustments().len(), 1);
    assert_eq!(store.saved_feedback().len(), 3);
    // one default seed write + one adjustment write per factor
    for f in FACTORS {
        assert_eq!(store.weight_write_count(f), 2);
    }
}

#[tokio::test]
async fn below_minimum_count_changes_nothing() {
    let (l, _, _) = rig(cfg(3, 0.1)).await;
    let before = l.get_all_weights();
    reject(&l, "d1").await;
    reject(&l, "d1").await;
    assert_eq!(l.get_all_weights(), before);
    assert!(l.get_adjustment_history(50).is_empty());
}

#[tokio::test]
async fn dead_zone_changes_nothing() {
    let (l, _, _) = rig(cfg(3, 0.1)).await;
    let before = l.get_all_weights();
    for k in [
        ExplicitKind::Approval,
        ExplicitKind::Rejection,
        ExplicitKind::Modification,
    ] {
        l.capture_explicit_feedback("u", "d1", k, None, None)
            .await
            .unwrap();
    }
    assert_eq!(l.get_all_weights(), before);
    assert!(l.get_adjustment_history(50).is_empty());
}

#[tokio::test]
async fn every_capture_past_threshold_re_evaluates() {
    let (l, _, _) = rig(cfg(3, 0.1)).await;
    for _ in 0..4 {
        reject(&l, "d1").await;
    }
    let hist = l.get_adjustment_history(50);
    assert_eq!(hist.len(), 2);
    let risk = l.get_decision_weight("risk_weight").unwrap();
    assert!((risk.current_weight - 0.3).abs() < 1e-9);
    assert_eq!(risk.confidence, 50.0);
    assert_eq!(risk.adjustment_count, 2);
}

#[tokio::test]
async fn positive_sentiment_increases_with_smaller_step() {
    let (l, _, _) = rig(cfg(2, 0.5)).await;
    for _ in 0..2 {
        l.capture_explicit_feedback("u", "d", ExplicitKind::Approval, None, None)
            .await
            .unwrap();
    }
    let adj = &l.get_adjustment_history(1)[0];
    assert_eq!(adj.adjustment_type, AdjustmentType::WeightIncrease);
    assert!((adj.magnitude - 0.15).abs() < 1e-12);
    let eff = l.get_decision_weight("efficiency_weight").unwrap();
    assert!((eff.current_weight - 0.45).abs() < 1e-9);
    assert_eq!(eff.confidence, 75.0);
}

#[tokio::test]
async fn auto_adjust_off_only_records_feedback() {
    let (l, store, _) = rig(LearningConfig {
        auto_adjust_enabled: false,
        ..cfg(1, 0.1)
    })
    .await;
    reject(&l, "d").await;
    assert!(l.get_adjustment_history(50).is_empty());
    assert_eq!(l.retained_feedback(), 1);
    assert_eq!(store.saved_feedback().len(), 1);
}

#[tokio::test]
async fn disabled_channels_reject_without_mutation() {
    let (l, store, _) = rig(LearningConfig::default()).await;

    l.update_config(ConfigPatch {
        explicit_feedback_enabled: Some(false),
        ..Default::default()
    })
    .await;
    let err = l
        .capture_explicit_feedback("u", "d", ExplicitKind::Approval, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LearningError::ChannelDisabled(_)));
    // implicit still open
    l.capture_implicit_feedback("u", "d", BehaviorData::default(), None)
        .await
        .unwrap();
    assert_eq!(l.retained_feedback(), 1);

    l.update_config(ConfigPatch {
        enabled: Some(false),
        explicit_feedback_enabled: Some(true),
        ..Default::default()
    })
    .await;
    for res in [
        l.capture_explicit_feedback("u", "d", ExplicitKind::Approval, None, None)
            .await,
        l.capture_implicit_feedback("u", "d", BehaviorData::default(), None)
            .await,
    ] {
        assert!(res.unwrap_err().is_channel_disabled());
    }
    assert_eq!(l.retained_feedback(), 1);
    assert_eq!(store.saved_feedback().len(), 1);
}

#[tokio::test]
async fn adjustment_history_is_newest_first_and_limited() {
    let (l, _, clock) = rig(cfg(1, 0.1)).await;
    for d in ["a", "b", "c"] {
        clock.advance(Duration::seconds(1));
        reject(&l, d).await;
    }
    let hist = l.get_adjustment_history(2);
    assert_eq!(hist.len(), 2);
    assert!(hist[0].applied_at > hist[1].applied_at);
    assert_eq!(l.get_adjustment_history(50).len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_captures_for_one_decision_never_double_apply() {
    let (l, _, _) = rig(LearningConfig {
        persistence_enabled: false,
        ..cfg(3, 0.01)
    })
    .await;

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let l = l.clone();
        tasks.push(tokio::spawn(async move { reject(&l, "hot").await }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    // each capture evaluates atomically with its own append: captures #3..#50 adjust
    assert_eq!(l.get_adjustment_history(1000).len(), 48);
    let risk = l.get_decision_weight("risk_weight").unwrap();
    assert_eq!(risk.adjustment_count, 48);
    assert!((risk.current_weight - (0.4 - 48.0 * 0.005)).abs() < 1e-9);
    assert_eq!(risk.confidence, 0.0);
}

#[tokio::test]
async fn metrics_over_empty_history_have_no_division_by_zero() {
    let (l, _, _) = rig(LearningConfig::default()).await;
    let m = l.calculate_metrics(None, None, None).await;
    assert_eq!(m.summary.total_feedbacks, 0);
    assert_eq!(m.summary.approval_rate, 0.0);
    assert_eq!(m.summary.rejection_rate, 0.0);
    assert_eq!(m.summary.improvement_trend, 0.0);
    assert_eq!(m.summary.average_confidence, 70.0);
    assert!(m.accuracy_over_time.is_empty());
}

#[tokio::test]
async fn metrics_summarise_window_and_current_confidence() {
    let (l, _, clock) = rig(cfg(3, 0.1)).await;
    for _ in 0..3 {
        clock.advance(Duration::minutes(1));
        reject(&l, "d1").await;
    }
    clock.advance(Duration::minutes(1));
    l.capture_explicit_feedback("alice", "d2", ExplicitKind::Approval, None, None)
        .await
        .unwrap();

    let m = l.calculate_metrics(None, None, None).await;
    assert_eq!(m.summary.total_feedbacks, 4);
    assert_eq!(m.summary.approval_rate, 25.0);
    assert_eq!(m.summary.rejection_rate, 75.0);
    assert_eq!(m.summary.adjustments_made, 1);
    assert_eq!(m.summary.average_confidence, 60.0);
    assert_eq!(m.accuracy_over_time.len(), 4);
    assert_eq!(m.effectiveness_over_time.len(), 4);

    let alice = l.calculate_metrics(Some("alice"), None, None).await;
    assert_eq!(alice.summary.total_feedbacks, 1);
    assert_eq!(alice.summary.approval_rate, 100.0);

    assert_eq!(l.cached_metrics(None).unwrap(), m);
    assert_eq!(l.cached_metrics(Some("alice")).unwrap(), alice);
    assert!(l.cached_metrics(Some("bob")).is_none());
}

#[tokio::test]
async fn small_sample_trend_compares_overlapping_windows() {
    let (l, _, clock) = rig(LearningConfig {
        auto_adjust_enabled: false,
        ..LearningConfig::default()
    })
    .await;

    // 5 entries: old and recent samples are the same set → trend 0
    for k in [
        ExplicitKind::Rejection,
        ExplicitKind::Rejection,
        ExplicitKind::Rejection,
        ExplicitKind::Approval,
        ExplicitKind::Approval,
    ] {
        clock.advance(Duration::minutes(1));
        l.capture_explicit_feedback("u", "d", k, None, None)
            .await
            .unwrap();
    }
    let m = l.calculate_metrics(None, None, None).await;
    assert_eq!(m.summary.improvement_trend, 0.0);

    // 15 entries (10 more approvals): old = first 10 → 7/10, recent = last 10 → 10/10
    for _ in 0..10 {
        clock.advance(Duration::minutes(1));
        l.capture_explicit_feedback("u", "d", ExplicitKind::Approval, None, None)
            .await
            .unwrap();
    }
    let m = l.calculate_metrics(None, None, None).await;
    let expected = 100.0 * (1.0 - 0.7) / 0.7;
    assert!((m.summary.improvement_trend - expected).abs() < 1e-9);
}

#[tokio::test]
async fn metrics_window_excludes_old_feedback() {
    let (l, _, clock) = rig(LearningConfig::default()).await;
    reject(&l, "old").await;
    clock.advance(Duration::days(8));
    l.capture_explicit_feedback("u", "new", ExplicitKind::Approval, None, None)
        .await
        .unwrap();

    let m = l.calculate_metrics(None, None, None).await;
    assert_eq!(m.summary.total_feedbacks, 1);
    assert_eq!(m.summary.approval_rate, 100.0);
    assert_eq!(m.period.end - m.period.start, Duration::days(7));
}
