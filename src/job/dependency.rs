use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use super::{DefRef, Definitions, Job};
use crate::error::{GoerError, Result};

/// Turns definitions into jobs, translating definition references into ids.
///
/// Fails before anything runs if a reference points outside `definitions` or
/// if the resulting graph has a cycle.
pub fn resolve(definitions: Definitions) -> Result<HashMap<String, Job>> {
    let ids: HashMap<DefRef, &str> = definitions
        .iter()
        .map(|(id, def)| (def.reference(), id.as_str()))
        .collect();

    let mut translated = Vec::with_capacity(definitions.len());
    for (id, def) in &definitions {
        let mut depends_on = Vec::with_capacity(def.dependencies.len());
        for reference in &def.dependencies {
            match ids.get(reference) {
                Some(dep_id) => depends_on.push(dep_id.to_string()),
                None => {
                    return Err(GoerError::Resolution(format!(
                        "Job '{}' depends on {} which is not registered",
                        id, reference
                    )));
                }
            }
        }
        translated.push(depends_on);
    }

    let jobs: HashMap<String, Job> = definitions
        .into_iter()
        .zip(translated)
        .map(|((id, def), depends_on)| {
            let job = Job {
                id: id.clone(),
                steps: def.steps,
                depends_on,
                rules: def.rules,
                workdir: def.workdir,
                env: def.env,
            };
            (id, job)
        })
        .collect();

    detect_cycles(&jobs)?;
    debug!(jobs = jobs.len(), "resolved job graph");

    Ok(jobs)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Depth-first search with in-progress/done marks shared across roots, so
/// every job is visited once however deep the graph is.
pub fn detect_cycles(jobs: &HashMap<String, Job>) -> Result<()> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut roots: Vec<&str> = jobs.keys().map(String::as_str).collect();
    roots.sort_unstable();

    for root in roots {
        let mut path = Vec::new();
        if let Some(cycle) = visit(root, jobs, &mut marks, &mut path) {
            return Err(GoerError::Resolution(format!(
                "Circular dependency: {}",
                cycle.join(" -> ")
            )));
        }
    }

    Ok(())
}

fn visit<'a>(
    job_id: &'a str,
    jobs: &'a HashMap<String, Job>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    match marks.get(job_id) {
        Some(Mark::Done) => return None,
        Some(Mark::InProgress) => {
            let start = path.iter().position(|id| *id == job_id).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|id| id.to_string()).collect();
            cycle.push(job_id.to_string());
            return Some(cycle);
        }
        None => {}
    }

    marks.insert(job_id, Mark::InProgress);
    path.push(job_id);

    if let Some(job) = jobs.get(job_id) {
        for dep in &job.depends_on {
            if let Some(cycle) = visit(dep, jobs, marks, path) {
                return Some(cycle);
            }
        }
    }

    path.pop();
    marks.insert(job_id, Mark::Done);
    None
}

/// Orders `job_ids` so every job comes after its dependencies. Ties are
/// broken alphabetically. Dependencies outside `job_ids` are ignored.
pub fn sort_topologically(jobs: &HashMap<String, Job>, job_ids: &[String]) -> Vec<String> {
    let selected: HashSet<&str> = job_ids.iter().map(String::as_str).collect();
    let mut in_degrees: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for &id in &selected {
        let deps: BTreeSet<&str> = jobs
            .get(id)
            .map(|job| {
                job.depends_on
                    .iter()
                    .map(String::as_str)
                    .filter(|dep| selected.contains(dep))
                    .collect()
            })
            .unwrap_or_default();

        in_degrees.insert(id, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(id);
        }
    }

    let mut ready: BTreeSet<&str> = in_degrees
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut sorted = Vec::with_capacity(selected.len());

    while let Some(id) = ready.pop_first() {
        sorted.push(id.to_string());

        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = in_degrees.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    sorted
}

/// The requested jobs plus everything they transitively depend on, in
/// dependency order.
pub fn required_jobs(jobs: &HashMap<String, Job>, targets: &[String]) -> Result<Vec<String>> {
    let mut needed: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for target in targets {
        match jobs.get_key_value(target.as_str()) {
            Some((id, _)) => queue.push_back(id),
            None => return Err(GoerError::UnknownJob(target.clone())),
        }
    }

    while let Some(current) = queue.pop_front() {
        if !needed.insert(current) {
            continue;
        }

        if let Some(job) = jobs.get(current) {
            for dep in &job.depends_on {
                if !needed.contains(dep.as_str()) {
                    queue.push_back(dep);
                }
            }
        }
    }

    let needed: Vec<String> = needed.into_iter().map(str::to_string).collect();
    Ok(sort_topologically(jobs, &needed))
}
