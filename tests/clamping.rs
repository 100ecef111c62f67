// tests/clamping.rs
//
// Randomised walks over the registry: whatever the sequence of steps, weights
// stay in [0, 1] and confidence in [0, 100].

use chrono::Utc;
use feedback_learner::weights::WeightRegistry;
use rand::Rng;

const FACTORS: [&str; 3] = ["efficiency_weight", "risk_weight", "quality_weight"];

#[test]
fn random_walk_stays_in_bounds() {
    let mut rng = rand::rng();
    let mut reg = WeightRegistry::with_defaults(Utc::now());

    for _ in 0..5_000 {
        let factor = FACTORS[rng.random_range(0..FACTORS.len())];
        let delta = rng.random_range(0.0..0.6);
        let conf = rng.random_range(0.0..40.0);
        let w = if rng.random_bool(0.5) {
            reg.increase(factor, delta, conf, Utc::now())
        } else {
            reg.decrease(factor, delta, conf, Utc::now())
        }
        .expect("known factor");

        assert!((0.0..=1.0).contains(&w.current_weight), "{w:?}");
        assert!((0.0..=100.0).contains(&w.confidence), "{w:?}");
    }

    let total: u32 = reg.all().iter().map(|w| w.adjustment_count).sum();
    assert_eq!(total, 5_000);
    for w in reg.all() {
        // historical weight is the seed and never moves
        assert!(w.historical_weight == 0.3 || w.historical_weight == 0.4);
    }
}

#[test]
fn unknown_factor_is_left_alone() {
    let mut reg = WeightRegistry::with_defaults(Utc::now());
    assert!(reg.decrease("ghost", 0.1, 5.0, Utc::now()).is_none());
    assert_eq!(reg.len(), 3);
}
