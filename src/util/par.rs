//! Job runner shared by the matching and detection loops.
//!
//! Jobs are independent; results come back in job order on both the
//! sequential and the rayon path, so callers can sort stably afterwards.

#[cfg(feature = "rayon")]
pub(crate) fn run_jobs<J, R, F>(jobs: &[J], parallel: bool, f: F) -> Vec<R>
where
    J: Sync,
    R: Send,
    F: Fn(&J) -> Option<R> + Sync + Send,
{
    use rayon::prelude::*;
    if parallel {
        jobs.par_iter().filter_map(&f).collect()
    } else {
        jobs.iter().filter_map(f).collect()
    }
}

#[cfg(not(feature = "rayon"))]
pub(crate) fn run_jobs<J, R, F>(jobs: &[J], _parallel: bool, f: F) -> Vec<R>
where
    F: Fn(&J) -> Option<R>,
{
    jobs.iter().filter_map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::run_jobs;

    #[test]
    fn keeps_job_order() {
        let jobs: Vec<u32> = (0..100).collect();
        let out = run_jobs(&jobs, true, |&j| (j % 3 != 0).then_some(j * 2));
        let expected: Vec<u32> = jobs.iter().filter(|&&j| j % 3 != 0).map(|j| j * 2).collect();
        assert_eq!(out, expected);
    }
}
