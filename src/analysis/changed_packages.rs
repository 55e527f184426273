use std::collections::BTreeSet;

use log::debug;

use crate::error::{Result, SquashError};
use crate::models::{DependencyVersion, Job, JobId, PackageKey};

/// Minimal view of a job used while scanning history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub id: JobId,
    pub ci_id: String,
}

impl From<&Job> for JobRef {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            ci_id: job.ci_id.clone(),
        }
    }
}

/// Read access to job history needed to find a job's predecessor.
pub trait JobHistory {
    /// Nearest job of `job`'s dataset strictly before it in `(date, id)`
    /// order whose CI id differs from `job`'s.
    ///
    /// Implementations stop at the first match instead of materialising the
    /// whole earlier history.
    fn previous_comparable(&self, job: &Job) -> Result<Option<JobRef>>;

    fn packages(&self, job_id: JobId) -> Result<Vec<DependencyVersion>>;
}

/// Jobs of `job`'s dataset strictly before it in `(date, id)` order, newest first.
pub fn earlier_jobs(jobs: &[Job], job: &Job) -> Vec<JobRef> {
    let mut earlier: Vec<&Job> = jobs
        .iter()
        .filter(|candidate| {
            candidate.ci_dataset == job.ci_dataset
                && (candidate.date, candidate.id) < (job.date, job.id)
        })
        .collect();

    earlier.sort_by(|a, b| (b.date, b.id).cmp(&(a.date, a.id)));
    earlier.into_iter().map(JobRef::from).collect()
}

/// First earlier job whose CI id differs from `job`'s.
///
/// Jobs sharing the CI id are variants of the same submission, not an
/// earlier run, so they are skipped.
pub fn nearest_comparable<I>(job: &Job, earlier: I) -> Option<JobRef>
where
    I: IntoIterator<Item = JobRef>,
{
    earlier
        .into_iter()
        .find(|candidate| candidate.ci_id != job.ci_id)
}

/// Packages of `current` whose `(name, commit, url)` did not exist in `previous`.
///
/// Packages that disappeared are not reported.
pub fn diff_packages(
    current: &[DependencyVersion],
    previous: &[DependencyVersion],
) -> BTreeSet<PackageKey> {
    let previous: BTreeSet<PackageKey> = previous.iter().map(DependencyVersion::key).collect();

    current
        .iter()
        .map(DependencyVersion::key)
        .filter(|key| !previous.contains(key))
        .collect()
}

/// Packages that changed in `job` with respect to its previous comparable job.
///
/// A job without a predecessor is compared with itself, giving an empty set.
pub fn changed_packages<H>(history: &H, job: &Job) -> Result<BTreeSet<PackageKey>>
where
    H: JobHistory + ?Sized,
{
    let Some(previous) = history.previous_comparable(job)? else {
        debug!(
            "No previous comparable job for ci_id {} in dataset {}",
            job.ci_id, job.ci_dataset
        );
        return Ok(BTreeSet::new());
    };

    let previous_packages = history.packages(previous.id)?;
    Ok(diff_packages(&job.packages, &previous_packages))
}

impl JobHistory for [Job] {
    fn previous_comparable(&self, job: &Job) -> Result<Option<JobRef>> {
        Ok(nearest_comparable(job, earlier_jobs(self, job)))
    }

    fn packages(&self, job_id: JobId) -> Result<Vec<DependencyVersion>> {
        self.iter()
            .find(|job| job.id == job_id)
            .map(|job| job.packages.clone())
            .ok_or(SquashError::JobNotFound(job_id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::models::JobStatus;

    fn t(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 2, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    fn pkg(name: &str, commit: &str) -> DependencyVersion {
        DependencyVersion {
            name: name.to_string(),
            git_url: format!("https://github.com/lsst/{name}.git"),
            git_commit: commit.to_string(),
            git_branch: "master".to_string(),
            build_version: String::new(),
        }
    }

    fn job(id: JobId, ci_id: &str, dataset: &str, hours: i64, packages: Vec<DependencyVersion>) -> Job {
        Job {
            id,
            ci_id: ci_id.to_string(),
            ci_name: "validate_drp".to_string(),
            ci_dataset: dataset.to_string(),
            ci_label: "centos-7".to_string(),
            ci_url: format!("https://ci.lsst.codes/job/validate_drp/{ci_id}/"),
            date: t(hours),
            status: JobStatus::Ok,
            packages,
        }
    }

    fn keys(items: &[(&str, &str)]) -> BTreeSet<PackageKey> {
        items
            .iter()
            .map(|(name, commit)| pkg(name, commit).key())
            .collect()
    }

    #[test]
    fn test_flags_only_new_triples() {
        let jobs = vec![
            job(1, "10", "cfht", 0, vec![pkg("A", "1"), pkg("B", "2")]),
            job(2, "11", "cfht", 8, vec![pkg("A", "1"), pkg("B", "1")]),
        ];

        let changed = changed_packages(jobs.as_slice(), &jobs[1]).unwrap();
        assert_eq!(changed, keys(&[("B", "1")]));
    }

    #[test]
    fn test_first_job_has_no_changes() {
        let jobs = vec![job(1, "10", "cfht", 0, vec![pkg("A", "1")])];
        assert!(changed_packages(jobs.as_slice(), &jobs[0]).unwrap().is_empty());

        let empty: Vec<Job> = Vec::new();
        assert!(changed_packages(empty.as_slice(), &jobs[0]).unwrap().is_empty());
    }

    #[test]
    fn test_all_predecessors_sharing_ci_id_means_no_changes() {
        let jobs = vec![
            job(1, "5", "cfht", 0, vec![pkg("A", "0")]),
            job(2, "5", "cfht", 8, vec![pkg("A", "1")]),
        ];
        assert!(changed_packages(jobs.as_slice(), &jobs[1]).unwrap().is_empty());
    }

    #[test]
    fn test_scan_skips_jobs_with_own_ci_id_only() {
        let jobs = vec![
            job(1, "5", "cfht", 0, vec![pkg("A", "1")]),
            job(2, "5", "cfht", 8, vec![pkg("A", "2")]),
            job(3, "7", "cfht", 16, vec![pkg("A", "3")]),
        ];

        // job 3 compares against job 2, the nearest earlier job with a different ci_id
        let earlier = earlier_jobs(&jobs, &jobs[2]);
        let previous = nearest_comparable(&jobs[2], earlier).unwrap();
        assert_eq!(previous.id, 2);
        assert_eq!(
            changed_packages(jobs.as_slice(), &jobs[2]).unwrap(),
            keys(&[("A", "3")])
        );

        // job 2 skips job 1 because they share ci_id "5"
        assert!(jobs.as_slice().previous_comparable(&jobs[1]).unwrap().is_none());
    }

    #[test]
    fn test_removed_packages_are_not_reported() {
        let jobs = vec![
            job(1, "10", "cfht", 0, vec![pkg("A", "1"), pkg("B", "1")]),
            job(2, "11", "cfht", 8, vec![pkg("A", "1")]),
        ];
        assert!(changed_packages(jobs.as_slice(), &jobs[1]).unwrap().is_empty());
    }

    #[test]
    fn test_other_datasets_are_ignored() {
        let jobs = vec![
            job(1, "10", "cfht", 0, vec![pkg("A", "1")]),
            job(2, "11", "decam", 4, vec![pkg("A", "9")]),
            job(3, "12", "cfht", 8, vec![pkg("A", "1")]),
        ];
        assert!(changed_packages(jobs.as_slice(), &jobs[2]).unwrap().is_empty());
    }

    #[test]
    fn test_equal_timestamps_are_ordered_by_id() {
        let jobs = vec![
            job(1, "10", "cfht", 0, vec![pkg("A", "1")]),
            job(2, "11", "cfht", 0, vec![pkg("A", "2")]),
        ];

        assert_eq!(earlier_jobs(&jobs, &jobs[1]), vec![JobRef::from(&jobs[0])]);
        assert!(earlier_jobs(&jobs, &jobs[0]).is_empty());
    }

    #[test]
    fn test_unknown_job_packages_is_an_error() {
        let jobs: Vec<Job> = Vec::new();
        assert!(matches!(
            jobs.as_slice().packages(42),
            Err(SquashError::JobNotFound(42))
        ));
    }
}
