use std::sync::Arc;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::backend::Backend;
use crate::conf::ExperimentConfig;
use crate::core::{BenchError, LogicalQuery};
use crate::dataset::Dataset;
use crate::harness::{ExperimentSamples, run_experiment};
use crate::runner::prepare_tier;

/// How the query cells of one tier are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// One cell after another in declared order. Latencies are undisturbed.
    #[default]
    Sequential,
    /// All cells of a tier at once on the runtime's worker threads.
    /// Shortens the suite, but cells contend with each other and Q3's write
    /// races the other queries' reads.
    Parallel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentPlan {
    pub tiers: Vec<usize>,
    pub queries: Vec<LogicalQuery>,
    pub repetitions: usize,
    pub mode: ExecutionMode,
}

impl ExperimentPlan {
    pub fn cells(&self) -> usize {
        self.tiers.len() * self.queries.len()
    }

    /// Planned queries that write to the backend.
    pub fn mutating_queries(&self) -> Vec<LogicalQuery> {
        self.queries
            .iter()
            .copied()
            .filter(LogicalQuery::is_mutating)
            .collect()
    }
}

impl From<&ExperimentConfig> for ExperimentPlan {
    fn from(config: &ExperimentConfig) -> Self {
        Self {
            tiers: config.tiers.clone(),
            queries: config.queries.clone(),
            repetitions: config.repetitions,
            mode: if config.parallel_queries {
                ExecutionMode::Parallel
            } else {
                ExecutionMode::Sequential
            },
        }
    }
}

/// Timings of one (tier, query) cell.
///
/// A failed cell keeps its place in the matrix with NaN timings and the
/// error text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub records: usize,
    pub query: LogicalQuery,
    pub first_ms: f64,
    pub mean_rest_ms: f64,
    pub samples: Vec<f64>,
    pub error: Option<String>,
}

impl ExperimentResult {
    fn completed(records: usize, query: LogicalQuery, samples: ExperimentSamples) -> Self {
        Self {
            records,
            query,
            first_ms: samples.first,
            mean_rest_ms: samples.mean_rest,
            samples: samples.samples,
            error: None,
        }
    }

    fn failed(records: usize, query: LogicalQuery, err: &BenchError) -> Self {
        Self {
            records,
            query,
            first_ms: f64::NAN,
            mean_rest_ms: f64::NAN,
            samples: Vec::new(),
            error: Some(err.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

async fn run_cell(
    backend: &dyn Backend,
    records: usize,
    query: LogicalQuery,
    repetitions: usize,
) -> ExperimentResult {
    info!(records = records, query = query; "running {} for {} records", query, records);
    match run_experiment(move || backend.run_query(query), repetitions).await {
        Ok(samples) => {
            info!(
                records = records, query = query;
                "{}: first {:.3}ms, mean of remaining {:.3}ms",
                query,
                samples.first,
                samples.mean_rest
            );
            ExperimentResult::completed(records, query, samples)
        }
        Err(err) => {
            error!(records = records, query = query; "{} failed at {} records: {}", query, records, err);
            ExperimentResult::failed(records, query, &err)
        }
    }
}

async fn run_tier_parallel(
    backend: &Arc<dyn Backend>,
    records: usize,
    plan: &ExperimentPlan,
) -> Result<Vec<ExperimentResult>, BenchError> {
    let mut tasks = JoinSet::new();
    for (idx, query) in plan.queries.iter().copied().enumerate() {
        let backend = Arc::clone(backend);
        let repetitions = plan.repetitions;
        tasks.spawn(async move {
            (
                idx,
                run_cell(backend.as_ref(), records, query, repetitions).await,
            )
        });
    }

    let mut cells: Vec<Option<ExperimentResult>> = vec![None; plan.queries.len()];
    while let Some(joined) = tasks.join_next().await {
        let (idx, result) = joined
            .map_err(|e| BenchError::QueryError(format!("query task did not finish: {e}")))?;
        cells[idx] = Some(result);
    }
    Ok(cells.into_iter().flatten().collect())
}

/// Run every (tier, query) cell against `backend`.
///
/// Tiers run in the given order, each replacing the previous tier's data.
/// Within a tier queries run in the given order against the same loaded
/// state, so Q3's update is visible to whatever runs after it. A failing
/// load aborts the run; a failing query only marks its own cell.
pub async fn run_all(
    backend: &Arc<dyn Backend>,
    dataset: &Dataset,
    plan: &ExperimentPlan,
) -> Result<Vec<ExperimentResult>, BenchError> {
    if plan.mode == ExecutionMode::Parallel {
        warn!("parallel query mode: cells of a tier share the backend concurrently");
        for query in plan.mutating_queries() {
            warn!(query = query; "{} writes while the other cells of its tier read", query);
        }
    }
    let mut results = Vec::with_capacity(plan.cells());

    for &tier in &plan.tiers {
        info!(records = tier; "running experiments for {} records", tier);
        prepare_tier(backend.as_ref(), dataset, tier)
            .await
            .map_err(|e| match e {
                BenchError::LoadError(_) | BenchError::ConnectionError(_) => e,
                other => BenchError::LoadError(format!("tier {}: {}", tier, other)),
            })?;

        match plan.mode {
            ExecutionMode::Sequential => {
                for &query in &plan.queries {
                    results.push(run_cell(backend.as_ref(), tier, query, plan.repetitions).await);
                }
            }
            ExecutionMode::Parallel => {
                results.extend(run_tier_parallel(backend, tier, plan).await?);
            }
        }
        info!(records = tier; "experiment for {} records completed", tier);
    }

    Ok(results)
}

/// Owns the backend handle for one run and releases it afterwards,
/// whether the run succeeded or not.
pub struct MatrixRunner {
    backend: Arc<dyn Backend>,
    plan: ExperimentPlan,
}

impl MatrixRunner {
    pub fn new(backend: Arc<dyn Backend>, plan: ExperimentPlan) -> Self {
        Self { backend, plan }
    }

    pub fn plan(&self) -> &ExperimentPlan {
        &self.plan
    }

    pub async fn run(self, dataset: &Dataset) -> Result<Vec<ExperimentResult>, BenchError> {
        let outcome = run_all(&self.backend, dataset, &self.plan).await;
        if let Err(err) = self.backend.close().await {
            warn!("closing {} backend failed: {}", self.backend.name(), err);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::testutil::{FlakyBackend, four_row_dataset};

    fn plan(tiers: Vec<usize>, repetitions: usize) -> ExperimentPlan {
        ExperimentPlan {
            tiers,
            queries: LogicalQuery::ALL.to_vec(),
            repetitions,
            mode: ExecutionMode::Sequential,
        }
    }

    #[test]
    fn test_plan_from_config() {
        let config = ExperimentConfig {
            parallel_queries: true,
            ..ExperimentConfig::default()
        };
        let plan = ExperimentPlan::from(&config);
        assert_eq!(plan.mode, ExecutionMode::Parallel);
        assert_eq!(plan.cells(), 16);
        assert_eq!(plan.repetitions, 31);
    }

    #[test]
    fn test_mutating_queries() {
        assert_eq!(plan(vec![1], 1).mutating_queries(), vec![LogicalQuery::Q3]);
        let read_only = ExperimentPlan {
            queries: vec![LogicalQuery::Q4, LogicalQuery::Q1],
            ..plan(vec![1], 1)
        };
        assert!(read_only.mutating_queries().is_empty());
    }

    #[tokio::test]
    async fn test_tiers_outer_queries_inner() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new(2));
        let results = run_all(&backend, &four_row_dataset(), &plan(vec![2, 4], 3))
            .await
            .unwrap();

        let cells: Vec<(usize, LogicalQuery)> =
            results.iter().map(|r| (r.records, r.query)).collect();
        let expected: Vec<(usize, LogicalQuery)> = [2, 4]
            .into_iter()
            .flat_map(|tier| LogicalQuery::ALL.into_iter().map(move |q| (tier, q)))
            .collect();
        assert_eq!(cells, expected);
    }

    #[tokio::test]
    async fn test_failed_query_keeps_matrix_rectangular() {
        let flaky = Arc::new(FlakyBackend::new().failing_query(LogicalQuery::Q2));
        let backend: Arc<dyn Backend> = flaky.clone();
        let results = run_all(&backend, &four_row_dataset(), &plan(vec![2, 4], 3))
            .await
            .unwrap();

        assert_eq!(results.len(), 8);
        for result in &results {
            if result.query == LogicalQuery::Q2 {
                assert!(result.is_failed());
                assert!(result.first_ms.is_nan());
                assert!(result.mean_rest_ms.is_nan());
            } else {
                assert!(!result.is_failed());
                assert_eq!(result.samples.len(), 3);
            }
        }
        // Q2 stops after its first failing call in each tier.
        assert_eq!(flaky.query_calls(), 2 * (3 * 3 + 1));
    }

    #[tokio::test]
    async fn test_load_failure_aborts_run_and_closes() {
        let flaky = Arc::new(FlakyBackend::new().failing_load(1));
        let runner = MatrixRunner::new(flaky.clone(), plan(vec![2, 4], 2));

        let err = runner.run(&four_row_dataset()).await.unwrap_err();
        assert!(matches!(err, BenchError::LoadError(_)));
        assert_eq!(flaky.close_calls(), 1);
        // Only the first tier's cells ran.
        assert_eq!(flaky.query_calls(), 4 * 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_mode_same_shape() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new(2));
        let mut plan = plan(vec![2, 4], 3);
        plan.mode = ExecutionMode::Parallel;

        let results = run_all(&backend, &four_row_dataset(), &plan).await.unwrap();
        assert_eq!(results.len(), 8);
        assert_eq!(results[1].query, LogicalQuery::Q2);
        assert_eq!(results[7].records, 4);
        assert!(results.iter().all(|r| r.samples.len() == 3));
    }
}
