//! Wall-clock timing of backend operations.
//!
//! An experiment runs one operation a fixed number of times, strictly one
//! after another. The first invocation is reported on its own (cold caches,
//! connection warm-up); the remaining ones are averaged (steady state).

use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Time a single invocation in milliseconds.
///
/// The operation's output is dropped after the clock stops. An error is
/// returned as-is and no duration is produced.
pub async fn measure<F, Fut, T, E>(operation: F) -> Result<f64, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let output = operation().await?;
    let elapsed = start.elapsed();
    drop(output);
    Ok(elapsed.as_secs_f64() * 1000.0)
}

/// Durations collected for one experiment cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSamples {
    /// Every duration in invocation order, milliseconds.
    pub samples: Vec<f64>,
    /// `samples[0]`, or NaN when nothing ran.
    pub first: f64,
    /// Mean of `samples[1..]`, or NaN with fewer than two samples.
    pub mean_rest: f64,
}

impl ExperimentSamples {
    pub fn from_samples(samples: Vec<f64>) -> Self {
        let first = samples.first().copied().unwrap_or(f64::NAN);
        let rest = samples.get(1..).unwrap_or_default();
        let mean_rest = if rest.is_empty() {
            f64::NAN
        } else {
            rest.iter().sum::<f64>() / rest.len() as f64
        };
        Self {
            samples,
            first,
            mean_rest,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Invoke `operation` exactly `repetitions` times, sequentially.
///
/// The first failure stops the experiment and is returned; the remaining
/// repetitions are not attempted.
pub async fn run_experiment<F, Fut, T, E>(
    mut operation: F,
    repetitions: usize,
) -> Result<ExperimentSamples, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut samples = Vec::with_capacity(repetitions);
    for _ in 0..repetitions {
        samples.push(measure(&mut operation).await?);
    }
    Ok(ExperimentSamples::from_samples(samples))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[test]
    fn test_first_and_mean_rest() {
        let samples = ExperimentSamples::from_samples(vec![10.0, 2.0, 4.0, 6.0]);
        assert_eq!(samples.first, 10.0);
        assert_eq!(samples.mean_rest, 4.0);
        assert_eq!(samples.len(), 4);
    }

    #[test]
    fn test_single_sample_has_nan_mean() {
        let samples = ExperimentSamples::from_samples(vec![3.5]);
        assert_eq!(samples.first, 3.5);
        assert!(samples.mean_rest.is_nan());
    }

    #[test]
    fn test_no_samples() {
        let samples = ExperimentSamples::from_samples(vec![]);
        assert!(samples.is_empty());
        assert!(samples.first.is_nan());
        assert!(samples.mean_rest.is_nan());
    }

    #[tokio::test]
    async fn test_measure_covers_operation() {
        let ms = measure(|| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(())
        })
        .await
        .unwrap();
        assert!(ms >= 20.0, "measured {ms}ms");
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(31)]
    #[tokio::test]
    async fn test_runs_exactly_repetitions(#[case] repetitions: usize) {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = run_experiment(
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            },
            repetitions,
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), repetitions);
        assert_eq!(result.samples.len(), repetitions);
        assert_eq!(result.first, result.samples[0]);
        if repetitions >= 2 {
            let rest = &result.samples[1..];
            let mean = rest.iter().sum::<f64>() / rest.len() as f64;
            assert_eq!(result.mean_rest, mean);
        } else {
            assert!(result.mean_rest.is_nan());
        }
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_repetitions() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = run_experiment(
            move || async move {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                if call == 2 {
                    Err(format!("failed on call {call}"))
                } else {
                    Ok(())
                }
            },
            10,
        )
        .await;

        assert_eq!(result, Err("failed on call 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
