// tests/scheduler.rs

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::join_all;
use goer::{
    error::{GoerError, Result},
    job::{Definitions, JobDef},
    rules::Rule,
    scheduler::Scheduler,
};
use goer_test_utils::{
    FakeExecutor, RecordingReporter, ReportEvent, StepEvent, init_tracing, with_timeout,
};

struct Harness {
    scheduler: Arc<Scheduler>,
    executor: Arc<FakeExecutor>,
    reporter: Arc<RecordingReporter>,
}

fn harness(definitions: Definitions, executor: FakeExecutor) -> Harness {
    init_tracing();

    let executor = Arc::new(executor);
    let reporter = Arc::new(RecordingReporter::new());
    let scheduler = Scheduler::resolve(definitions)
        .unwrap()
        .with_executor(executor.clone())
        .with_reporter(reporter.clone());

    Harness {
        scheduler: Arc::new(scheduler),
        executor,
        reporter,
    }
}

fn defs<const N: usize>(entries: [(&str, JobDef); N]) -> Definitions {
    entries
        .into_iter()
        .map(|(id, def)| (id.to_string(), def))
        .collect()
}

/// leaf <- mid1, mid2 <- root
fn diamond() -> Definitions {
    let leaf = JobDef::new(["echo leaf"]);
    let mid1 = JobDef::new(["echo mid1"]).after(&leaf);
    let mid2 = JobDef::new(["echo mid2"]).after(&leaf);
    let root = JobDef::group().after(&mid1).after(&mid2);

    defs([("leaf", leaf), ("mid1", mid1), ("mid2", mid2), ("root", root)])
}

fn started_at(events: &[StepEvent], job_id: &str) -> usize {
    events
        .iter()
        .position(|e| matches!(e, StepEvent::Started { job, .. } if job == job_id))
        .unwrap_or_else(|| panic!("job {job_id} never started"))
}

fn finished_at(events: &[StepEvent], job_id: &str) -> usize {
    events
        .iter()
        .rposition(|e| matches!(e, StepEvent::Finished { job, .. } if job == job_id))
        .unwrap_or_else(|| panic!("job {job_id} never finished"))
}

struct Fixed(bool);

impl Rule for Fixed {
    fn name(&self) -> String {
        format!("Fixed({})", self.0)
    }

    fn can_skip(&self) -> Result<bool> {
        Ok(self.0)
    }
}

/// Records which steps had run at the moment the rule was evaluated.
struct Observing {
    executor: Arc<FakeExecutor>,
    seen: Arc<Mutex<Option<Vec<String>>>>,
}

impl Rule for Observing {
    fn name(&self) -> String {
        "Observing".to_string()
    }

    fn can_skip(&self) -> Result<bool> {
        *self.seen.lock().unwrap() = Some(self.executor.executed());
        Ok(true)
    }
}

struct Misconfigured;

impl Rule for Misconfigured {
    fn name(&self) -> String {
        "Misconfigured".to_string()
    }

    fn can_skip(&self) -> Result<bool> {
        Err(GoerError::Config("source missing".to_string()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn diamond_runs_every_job_once() {
    let h = harness(diamond(), FakeExecutor::new().with_delay(Duration::from_millis(20)));

    assert!(with_timeout(h.scheduler.run("root")).await);

    assert_eq!(h.executor.count("echo leaf"), 1);
    assert_eq!(h.executor.count("echo mid1"), 1);
    assert_eq!(h.executor.count("echo mid2"), 1);
    assert_eq!(h.executor.executed().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_execution() {
    let h = harness(diamond(), FakeExecutor::new().with_delay(Duration::from_millis(20)));

    let mut requests: Vec<_> = (0..8).map(|_| h.scheduler.run("leaf")).collect();
    requests.push(h.scheduler.run("root"));
    requests.push(h.scheduler.run("mid1"));

    let results = with_timeout(join_all(requests)).await;

    assert!(results.into_iter().all(|ok| ok));
    assert_eq!(h.executor.count("echo leaf"), 1);
    assert_eq!(h.executor.count("echo mid1"), 1);
}

#[tokio::test]
async fn later_requests_reuse_the_finished_result() {
    let h = harness(diamond(), FakeExecutor::new().with_exit_code("echo leaf", 1));

    assert!(!h.scheduler.run("leaf").await);
    assert!(!h.scheduler.run("leaf").await);
    assert!(!h.scheduler.run("mid1").await);

    assert_eq!(h.executor.count("echo leaf"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_dependency_failure_is_seen_by_every_dependent() {
    let h = harness(
        diamond(),
        FakeExecutor::new()
            .with_delay(Duration::from_millis(10))
            .with_exit_code("echo leaf", 1),
    );

    assert!(!with_timeout(h.scheduler.run("root")).await);

    assert_eq!(h.executor.executed(), ["echo leaf"]);
    for job in ["mid1", "mid2", "root"] {
        assert_eq!(h.reporter.failure_of(job).as_deref(), Some("dependency failed"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dependencies_finish_before_the_dependent_starts() {
    let slow = JobDef::new(["echo slow 1", "echo slow 2", "echo slow 3"]);
    let fast = JobDef::new(["echo fast"]);
    let top = JobDef::new(["echo top"]).after(&slow).after(&fast);
    let h = harness(
        defs([("slow", slow), ("fast", fast), ("top", top)]),
        FakeExecutor::new().with_delay(Duration::from_millis(10)),
    );

    assert!(with_timeout(h.scheduler.run("top")).await);

    let events = h.executor.events();
    let top_start = started_at(&events, "top");
    assert!(finished_at(&events, "slow") < top_start);
    assert!(finished_at(&events, "fast") < top_start);
}

#[tokio::test]
async fn failed_dependency_short_circuits_the_dependent() {
    let a = JobDef::new(["exit 1"]);
    let b = JobDef::new(["echo b"]).after(&a);
    let h = harness(defs([("a", a), ("b", b)]), FakeExecutor::new().with_exit_code("exit 1", 1));

    assert!(!h.scheduler.run("b").await);

    assert_eq!(h.executor.count("echo b"), 0);
    assert!(!h.reporter.events().contains(&ReportEvent::Started("b".to_string())));
}

#[tokio::test]
async fn cascading_failure_through_an_empty_job() {
    let a = JobDef::new(["exit 1"]);
    let b = JobDef::group().after(&a);
    let h = harness(defs([("a", a), ("b", b)]), FakeExecutor::new().with_exit_code("exit 1", 1));

    assert!(!h.scheduler.run("b").await);

    assert_eq!(h.reporter.failure_of("b").as_deref(), Some("dependency failed"));
    assert!(
        h.reporter
            .failure_of("a")
            .is_some_and(|detail| detail.contains("exit code 1"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn running_siblings_are_not_cancelled_by_a_failure() {
    let bad = JobDef::new(["fail fast"]);
    let sibling = JobDef::new(["step 1", "step 2", "step 3"]);
    let root = JobDef::new(["echo root"]).after(&bad).after(&sibling);
    let h = harness(
        defs([("bad", bad), ("sibling", sibling), ("root", root)]),
        FakeExecutor::new()
            .with_delay(Duration::from_millis(15))
            .with_exit_code("fail fast", 1),
    );

    assert!(!with_timeout(h.scheduler.run("root")).await);

    for step in ["step 1", "step 2", "step 3"] {
        assert_eq!(h.executor.count(step), 1);
    }
    assert_eq!(h.executor.count("echo root"), 0);
    assert!(h.reporter.events().contains(&ReportEvent::Finished("sibling".to_string())));
}

#[tokio::test]
async fn step_sequence_stops_at_first_failure() {
    let job = JobDef::new(["ok", "fail", "ok2"]);
    let h = harness(defs([("job", job)]), FakeExecutor::new().with_exit_code("fail", 4));

    assert!(!h.scheduler.run("job").await);

    assert_eq!(h.executor.executed(), ["ok", "fail"]);
    assert_eq!(
        h.reporter.failure_of("job").as_deref(),
        Some("step 2 `fail` failed with exit code 4")
    );
}

#[tokio::test]
async fn all_rules_passing_skips_every_step() {
    let job = JobDef::new(["echo build"]).rule(Fixed(true)).rule(Fixed(true));
    let h = harness(defs([("build", job)]), FakeExecutor::new());

    assert!(h.scheduler.run("build").await);

    assert!(h.executor.executed().is_empty());
    assert_eq!(h.reporter.skipped(), ["build"]);
}

#[tokio::test]
async fn one_failing_rule_runs_the_steps() {
    let job = JobDef::new(["echo build"]).rule(Fixed(true)).rule(Fixed(false));
    let h = harness(defs([("build", job)]), FakeExecutor::new());

    assert!(h.scheduler.run("build").await);

    assert_eq!(h.executor.executed(), ["echo build"]);
    assert!(h.reporter.skipped().is_empty());
}

#[tokio::test]
async fn skip_rules_are_checked_after_dependencies() {
    let executor = Arc::new(FakeExecutor::new());
    let seen = Arc::new(Mutex::new(None));

    let dep = JobDef::new(["echo dep"]);
    let job = JobDef::new(["echo job"]).after(&dep).rule(Observing {
        executor: executor.clone(),
        seen: seen.clone(),
    });

    let reporter = Arc::new(RecordingReporter::new());
    let scheduler = Arc::new(
        Scheduler::resolve(defs([("dep", dep), ("job", job)]))
            .unwrap()
            .with_executor(executor.clone())
            .with_reporter(reporter.clone()),
    );

    assert!(scheduler.run("job").await);

    assert_eq!(seen.lock().unwrap().clone(), Some(vec!["echo dep".to_string()]));
    assert_eq!(executor.count("echo job"), 0);
    assert_eq!(reporter.skipped(), ["job"]);
}

#[tokio::test]
async fn skipped_dependency_still_lets_the_dependent_run() {
    let dep = JobDef::new(["echo dep"]).rule(Fixed(true));
    let job = JobDef::new(["echo job"]).after(&dep);
    let h = harness(defs([("dep", dep), ("job", job)]), FakeExecutor::new());

    assert!(h.scheduler.run("job").await);

    assert_eq!(h.executor.executed(), ["echo job"]);
}

#[tokio::test]
async fn rule_errors_fail_the_job_without_running_it() {
    let job = JobDef::new(["echo build"]).rule(Misconfigured);
    let h = harness(defs([("build", job)]), FakeExecutor::new());

    assert!(!h.scheduler.run("build").await);

    assert!(h.executor.executed().is_empty());
    assert_eq!(
        h.reporter.failure_of("build").as_deref(),
        Some("Config error: source missing")
    );
}

#[tokio::test]
async fn spawn_errors_are_contained_to_the_job() {
    let broken = JobDef::new(["no shell"]);
    let fine = JobDef::new(["echo fine"]);
    let root = JobDef::group().after(&broken).after(&fine);
    let h = harness(
        defs([("broken", broken), ("fine", fine), ("root", root)]),
        FakeExecutor::new().with_spawn_error("no shell"),
    );

    assert!(!h.scheduler.run("root").await);

    assert_eq!(h.executor.count("echo fine"), 1);
    assert!(
        h.reporter
            .failure_of("broken")
            .is_some_and(|detail| detail.contains("cannot spawn `no shell`"))
    );
}

#[tokio::test]
async fn unknown_job_is_reported_and_fails() {
    let h = harness(diamond(), FakeExecutor::new());

    assert!(!h.scheduler.run("missing").await);

    assert_eq!(
        h.reporter.failure_of("missing").as_deref(),
        Some("Unknown job: 'missing'")
    );
    assert!(h.executor.executed().is_empty());
}

#[tokio::test]
async fn unrelated_jobs_run_concurrently() {
    let a = JobDef::new(["echo a"]);
    let b = JobDef::new(["echo b"]);
    let root = JobDef::group().after(&a).after(&b);
    let h = harness(
        defs([("a", a), ("b", b), ("root", root)]),
        FakeExecutor::new().with_delay(Duration::from_millis(50)),
    );

    assert!(with_timeout(h.scheduler.run("root")).await);

    assert_eq!(h.executor.max_concurrent(), 2);
}
