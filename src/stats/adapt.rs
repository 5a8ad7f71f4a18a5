use crate::config::CoreConfig;
use crate::stats::Attempt;

/// Difficulty hint for question generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adaptation {
    /// `-1`, `0` or `+1`.
    pub delta: i8,
    /// Cooldown to pass into the next call.
    pub cooldown_remaining: u32,
}

/// Looks at the last `adapt_window` attempts. High accuracy at a fast
/// average pace raises difficulty, low accuracy lowers it. After a nonzero
/// delta, the next `adapt_cooldown` calls return 0. Never steps outside
/// `min_difficulty..=max_difficulty`.
pub fn adapt(recent: &[Attempt], current_difficulty: u8, cooldown_remaining: u32, config: &CoreConfig) -> Adaptation {
    let hold = |cooldown: u32| Adaptation {
        delta: 0,
        cooldown_remaining: cooldown,
    };

    if cooldown_remaining > 0 {
        return hold(cooldown_remaining - 1);
    }
    if recent.len() < config.adapt_window {
        return hold(0);
    }

    let window = &recent[recent.len() - config.adapt_window..];
    let n = window.len() as f64;
    let accuracy = window.iter().filter(|a| a.is_correct).count() as f64 / n;
    let avg_ms = window.iter().map(|a| a.response_time_ms).sum::<u64>() as f64 / n;
    let fast_ms = config.fast_threshold_ms(current_difficulty) as f64;

    let delta = if accuracy >= config.adapt_high_accuracy && avg_ms <= fast_ms {
        1
    } else if accuracy <= config.adapt_low_accuracy {
        -1
    } else {
        0
    };

    let delta = match delta {
        1 if current_difficulty >= config.max_difficulty => 0,
        -1 if current_difficulty <= config.min_difficulty => 0,
        d => d,
    };

    if delta != 0 {
        log::debug!(
            "[STATS] adapt {:+} at difficulty {} (accuracy {:.2}, avg {:.0}ms)",
            delta,
            current_difficulty,
            accuracy,
            avg_ms
        );
        Adaptation {
            delta,
            cooldown_remaining: config.adapt_cooldown,
        }
    } else {
        hold(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempts(results: &[(bool, u64)]) -> Vec<Attempt> {
        results
            .iter()
            .map(|&(ok, ms)| Attempt::new("arithmetic", ok, ms))
            .collect()
    }

    #[test]
    fn s5_fast_and_accurate_steps_up_then_cools_down() {
        let config = CoreConfig::default();
        let recent = attempts(&[(true, 1200); 5]);

        let first = adapt(&recent, 2, 0, &config);
        assert_eq!(first.delta, 1);
        assert_eq!(first.cooldown_remaining, 10);

        let next = adapt(&recent, 2, 10, &config);
        assert_eq!(next.delta, 0);
        assert_eq!(next.cooldown_remaining, 9);
    }

    #[test]
    fn accurate_but_slow_holds() {
        let config = CoreConfig::default();
        let recent = attempts(&[(true, 6_000); 5]);
        assert_eq!(adapt(&recent, 2, 0, &config).delta, 0);
    }

    #[test]
    fn low_accuracy_steps_down() {
        let config = CoreConfig::default();
        let recent = attempts(&[(false, 900), (false, 900), (true, 900), (false, 900), (true, 900)]);
        assert_eq!(adapt(&recent, 3, 0, &config).delta, -1);
    }

    #[test]
    fn only_the_window_counts() {
        let config = CoreConfig::default();
        let mut recent = attempts(&[(false, 9_000); 20]);
        recent.extend(attempts(&[(true, 1_000); 5]));
        assert_eq!(adapt(&recent, 1, 0, &config).delta, 1);
    }

    #[test]
    fn short_history_holds() {
        let config = CoreConfig::default();
        assert_eq!(adapt(&attempts(&[(true, 500); 4]), 2, 0, &config).delta, 0);
    }

    #[test]
    fn never_leaves_difficulty_range() {
        let config = CoreConfig::default();
        assert_eq!(adapt(&attempts(&[(true, 500); 5]), 5, 0, &config).delta, 0);
        assert_eq!(adapt(&attempts(&[(false, 500); 5]), 1, 0, &config).delta, 0);
    }
}
