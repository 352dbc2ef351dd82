// Phase 11: 全ジョブ実行

use tracing::warn;

use crate::pipeline::job_runner::{JobConfig, JobResult, run_job};

/// Run multiple jobs, collecting results.
///
/// Jobs run one after another inside a dedicated rayon pool of `workers`
/// threads (0 = rayon default); the parallelism is within each job.
/// One job failure does NOT prevent other jobs from running.
pub fn run_all_jobs(jobs: &[JobConfig], workers: usize) -> Vec<crate::error::Result<JobResult>> {
    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(|| jobs.iter().map(run_job).collect()),
        Err(e) => {
            warn!(error = %e, "failed to build worker pool, using the global pool");
            jobs.iter().map(run_job).collect()
        }
    }
}
