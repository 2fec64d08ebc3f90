use chrono::{Duration, Utc};
use proptest::prelude::*;
use wavefront::domain::models::{CriticalityTier, PriorityContext};
use wavefront::PriorityEngine;

fn arb_tier() -> impl Strategy<Value = CriticalityTier> {
    prop_oneof![
        Just(CriticalityTier::P0),
        Just(CriticalityTier::P1),
        Just(CriticalityTier::P2),
        Just(CriticalityTier::P3),
        Just(CriticalityTier::P4),
    ]
}

fn arb_context() -> impl Strategy<Value = PriorityContext> {
    (
        arb_tier(),
        0u32..20,
        0u32..10,
        prop::option::of(-48i64..200),
        prop::option::of(0.0f64..=10.0),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(criticality, blocks, depends, deadline_hours, business_value, customer, security)| {
                PriorityContext {
                    criticality,
                    blocks_count: blocks,
                    depends_count: depends,
                    deadline: deadline_hours.map(|h| Utc::now() + Duration::hours(h)),
                    business_value,
                    complexity: None,
                    customer_facing: customer,
                    security_related: security,
                    sla_hours: None,
                }
            },
        )
}

fn score_total(context: &PriorityContext) -> (f64, f64) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let engine = PriorityEngine::new();
        let score = engine.score("prop-task", context).await;
        (score.total, score.confidence)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: every score lands in [0, 10] with at most one decimal,
    /// and confidence stays in [0, 1].
    #[test]
    fn prop_score_bounded(context in arb_context()) {
        let (total, confidence) = score_total(&context);
        prop_assert!((0.0..=10.0).contains(&total));
        prop_assert!(((total * 10.0).round() - total * 10.0).abs() < 1e-9);
        prop_assert!((0.0..=1.0).contains(&confidence));
    }

    /// Property: raising only the criticality tier never lowers the
    /// score.
    #[test]
    fn prop_criticality_is_monotonic(context in arb_context()) {
        let tiers = [
            CriticalityTier::P4,
            CriticalityTier::P3,
            CriticalityTier::P2,
            CriticalityTier::P1,
            CriticalityTier::P0,
        ];
        let mut previous = -1.0;
        for tier in tiers {
            let mut ctx = context.clone();
            ctx.criticality = tier;
            let (total, _) = score_total(&ctx);
            prop_assert!(total >= previous - 1e-9);
            previous = total;
        }
    }

    /// Property: blocking more tasks never lowers the score.
    #[test]
    fn prop_blocking_pressure_is_monotonic(context in arb_context(), extra in 1u32..10) {
        let (base, _) = score_total(&context);
        let mut boosted = context.clone();
        boosted.blocks_count = context.blocks_count.saturating_add(extra);
        let (higher, _) = score_total(&boosted);
        prop_assert!(higher >= base - 1e-9);
    }
}
