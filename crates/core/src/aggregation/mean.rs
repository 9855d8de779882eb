//! Incremental mean primitives
//!
//! Every tier average is maintained from the previous mean and count only,
//! without sample history.

use metasync_domain::constants::NO_LOOP;

/// Rounding applied to the deployment loop-counter average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopRounding {
    Ceiling,
    Nearest,
    Floor,
}

/// Loop-counter averages are rounded up, biasing the estimate toward the
/// larger parallel fan-out. Kept separate from [`running_mean`] so the bias
/// can be changed without touching the other averages.
pub const LOOP_COUNTER_ROUNDING: LoopRounding = LoopRounding::Ceiling;

/// `(avg * count + value) / (count + 1)`.
pub fn running_mean(avg: f64, count: i64, value: f64) -> f64 {
    let count = count.max(0) as f64;
    (avg * count + value) / (count + 1.0)
}

/// Success rate after one more outcome.
///
/// The previous number of successes is recovered as `round(rate * count)`.
pub fn running_success_rate(rate: f64, count: i64, success: bool) -> f64 {
    let count = count.max(0);
    let previous = (rate.clamp(0.0, 1.0) * count as f64).round();
    let successes = previous + if success { 1.0 } else { 0.0 };
    (successes / (count + 1) as f64).clamp(0.0, 1.0)
}

/// Loop-counter average after one more observation, rounded with
/// [`LOOP_COUNTER_ROUNDING`].
pub fn running_loop_counter(avg: i64, count: i64, value: i64) -> i64 {
    round_loop_average(running_mean(avg as f64, count, value as f64), LOOP_COUNTER_ROUNDING)
}

/// Loop value contributed by an invocation: its `max_loop_counter`, or zero
/// when it ran outside a parallel loop.
pub fn effective_loop_value(max_loop_counter: Option<i32>) -> i64 {
    match max_loop_counter {
        Some(value) if value != NO_LOOP => i64::from(value),
        _ => 0,
    }
}

fn round_loop_average(mean: f64, rounding: LoopRounding) -> i64 {
    let rounded = match rounding {
        LoopRounding::Ceiling => mean.ceil(),
        LoopRounding::Nearest => mean.round(),
        LoopRounding::Floor => mean.floor(),
    };
    rounded as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[test]
    fn mean_converges_on_repeated_value() {
        let (mut avg, mut count) = (0.0, 0);
        for _ in 0..250 {
            avg = running_mean(avg, count, 42.5);
            count += 1;
        }
        assert_close(avg, 42.5);
    }

    #[test]
    fn accumulation_ignores_order() {
        let values = [12.0, 7.5, 300.0, 0.25, 41.0, 99.0];
        let (avg0, count0) = (80.0, 3_i64);
        let expected =
            (count0 as f64 * avg0 + values.iter().sum::<f64>()) / (count0 as usize + values.len()) as f64;

        let orders: [[usize; 6]; 4] =
            [[0, 1, 2, 3, 4, 5], [5, 4, 3, 2, 1, 0], [2, 0, 5, 1, 3, 4], [3, 5, 1, 4, 0, 2]];
        for order in orders {
            let (mut avg, mut count) = (avg0, count0);
            for index in order {
                avg = running_mean(avg, count, values[index]);
                count += 1;
            }
            assert_close(avg, expected);
        }
    }

    #[test]
    fn first_observation_replaces_empty_average() {
        assert_eq!(running_mean(0.0, 0, 120.0), 120.0);
        assert_eq!(running_mean(100.0, 1, 120.0), 110.0);
    }

    #[test]
    fn success_rate_stays_within_bounds() {
        let outcomes = [true, false, false, true, true, true, false, true, false, false, false];
        let (mut rate, mut count, mut successes) = (0.0, 0_i64, 0);

        for success in outcomes {
            rate = running_success_rate(rate, count, success);
            count += 1;
            successes += i64::from(success);

            assert!((0.0..=1.0).contains(&rate), "rate {rate} out of bounds");
            assert_close(rate, successes as f64 / count as f64);
        }
    }

    #[test]
    fn success_rate_tolerates_out_of_range_history() {
        assert_eq!(running_success_rate(1.7, 4, true), 1.0);
        assert_eq!(running_success_rate(-0.3, 4, false), 0.0);
    }

    #[test]
    fn loop_counter_average_rounds_up() {
        assert_eq!(running_loop_counter(0, 0, 3), 3);
        // (3 * 1 + 0) / 2 = 1.5
        assert_eq!(running_loop_counter(3, 1, 0), 2);
        // (2 * 2 + 1) / 3 = 1.67
        assert_eq!(running_loop_counter(2, 2, 1), 2);
        assert_eq!(running_loop_counter(4, 3, 4), 4);
    }

    #[test]
    fn loop_rounding_policies_differ_only_in_direction() {
        assert_eq!(round_loop_average(1.5, LoopRounding::Ceiling), 2);
        assert_eq!(round_loop_average(1.5, LoopRounding::Floor), 1);
        assert_eq!(round_loop_average(1.4, LoopRounding::Nearest), 1);
    }

    #[test]
    fn loops_outside_parallel_for_count_as_zero() {
        assert_eq!(effective_loop_value(None), 0);
        assert_eq!(effective_loop_value(Some(-1)), 0);
        assert_eq!(effective_loop_value(Some(8)), 8);
    }
}
