//! Region Fan-Out
//!
//! Builds one pool job per region, runs them with bounded concurrency and
//! flattens the per-region results. A region that denies access contributes
//! an empty result and a warning; any other failure fails the whole fan-out
//! once every region has finished.

use super::pool::{run_jobs, Job};
use crate::error::{InventoryError, Result};
use crate::provider::{region_label, AccessDenialClassifier, Region};
use std::future::Future;
use std::sync::Arc;

/// Wrap a region job so access denials turn into an empty result
async fn tolerate_denial<T, Fut>(
    work: Fut,
    region: Option<Region>,
    label: String,
    classifier: Arc<dyn AccessDenialClassifier>,
) -> Result<Vec<T>>
where
    Fut: Future<Output = Result<Vec<T>>>,
{
    match work.await {
        Ok(items) => Ok(items),
        Err(err) => match err.as_api() {
            Some(api) if classifier.is_access_denied(api) => {
                tracing::warn!(
                    region = %region_label(region.as_ref()),
                    kind = %label,
                    code = %api.code,
                    "access denied, skipping region"
                );
                Ok(Vec::new())
            }
            _ => Err(err),
        },
    }
}

/// One job per region; a failed region listing becomes a single pre-failed job
pub fn region_jobs<T, F, Fut>(
    regions: Result<Vec<Option<Region>>>,
    label: &str,
    classifier: Arc<dyn AccessDenialClassifier>,
    build: F,
) -> Vec<Job<T>>
where
    T: Send + 'static,
    F: Fn(Option<Region>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
    let regions = match regions {
        Ok(regions) => regions,
        Err(err) => return vec![Job::failed(err)],
    };

    regions
        .into_iter()
        .map(|region| {
            let work = build(region.clone());
            let label = label.to_string();
            let classifier = classifier.clone();
            Job::new(move || tolerate_denial(work, region, label, classifier))
        })
        .collect()
}

/// Run `build` for every region and union the results
pub async fn fan_out<T, F, Fut>(
    regions: Result<Vec<Option<Region>>>,
    label: &str,
    limit: usize,
    classifier: Arc<dyn AccessDenialClassifier>,
    build: F,
) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(Option<Region>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
    let jobs = region_jobs(regions, label, classifier, build);
    let total = jobs.len();
    tracing::debug!("{}: fanning out over {} regions", label, total);

    match run_jobs(jobs, limit).await {
        Ok(per_region) => {
            let items: Vec<T> = per_region.into_iter().flatten().collect();
            tracing::debug!("{}: {} items from {} regions", label, items.len(), total);
            Ok(items)
        }
        // A lone failure is reported as itself, not as an aggregate
        Err(InventoryError::Jobs(mut errors)) if errors.len() == 1 => {
            Err(errors.failures.remove(0).error)
        }
        Err(err) => Err(err),
    }
}
