use std::{
    collections::{BTreeMap, HashMap},
    env, fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use serde::Deserialize;

use super::{DefRef, Definitions, JobDef, Step};
use crate::{
    error::{GoerError, Result},
    output::OutputMode,
    rules::RuleConfig,
    util::is_glob_pattern,
};

static BRACED_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid braced variable regex")
});

static SIMPLE_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("valid simple variable regex")
});

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    #[serde(default, rename = "job")]
    jobs: BTreeMap<String, JobConfig>,
    config: Option<ConfigSection>,
    #[serde(default)]
    variables: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigSection {
    workers: Option<usize>,
    output: Option<OutputMode>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobConfig {
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    rules: Vec<RuleConfig>,
    workdir: Option<String>,
    env: Option<HashMap<String, String>>,
}

/// A parsed job file: the definitions plus runner settings.
#[derive(Debug)]
pub struct JobFile {
    pub definitions: Definitions,
    pub workers: Option<usize>,
    pub output: Option<OutputMode>,
}

pub fn load_jobs(path: &Path) -> Result<JobFile> {
    let contents = fs::read_to_string(path).map_err(|e| {
        GoerError::Config(format!("Could not read '{}': {}", path.display(), e))
    })?;
    parse_jobs(&contents)
}

pub fn parse_jobs(contents: &str) -> Result<JobFile> {
    let config: Config = toml::from_str(contents)?;
    process_config(config)
}

fn process_config(config: Config) -> Result<JobFile> {
    let workers = config.config.as_ref().and_then(|c| c.workers);
    let output = config.config.as_ref().and_then(|c| c.output);

    let mut variables = config.variables;
    add_builtin_variables(&mut variables);

    // Every definition needs its identity before dependencies can point at it.
    let mut definitions: Definitions = BTreeMap::new();
    let mut references: HashMap<String, DefRef> = HashMap::new();
    let mut pending: Vec<(String, Vec<String>)> = Vec::new();

    for (id, job) in config.jobs {
        let def = build_definition(&id, job.steps, job.rules, job.workdir, job.env, &variables)?;
        references.insert(id.clone(), def.reference());
        pending.push((id.clone(), job.depends_on));
        definitions.insert(id, def);
    }

    for (id, depends_on) in pending {
        for dep_id in depends_on {
            let reference = references.get(&dep_id).copied().ok_or_else(|| {
                GoerError::Resolution(format!(
                    "Job '{}' depends on '{}' which doesn't exist",
                    id, dep_id
                ))
            })?;

            if let Some(def) = definitions.get_mut(&id) {
                def.add_dependency(reference);
            }
        }
    }

    Ok(JobFile {
        definitions,
        workers,
        output,
    })
}

fn build_definition(
    id: &str,
    steps: Vec<String>,
    rules: Vec<RuleConfig>,
    workdir: Option<String>,
    env: Option<HashMap<String, String>>,
    variables: &HashMap<String, String>,
) -> Result<JobDef> {
    let substitute = |text: &str| substitute_variables(text, variables);

    let mut def = JobDef::new(steps.iter().map(|s| Step::new(substitute(s))));
    def.workdir = workdir.map(|w| PathBuf::from(substitute(&w)));
    def.env = env.map(|vars| {
        vars.into_iter()
            .map(|(key, value)| (key, substitute(&value)))
            .collect()
    });

    for rule in rules {
        let rule = rule.map_paths(substitute);
        if let RuleConfig::File { source, .. } = &rule {
            if is_glob_pattern(source) {
                return Err(GoerError::Config(format!(
                    "Job '{}' has a file rule with glob source '{}', use kind = \"glob\"",
                    id, source
                )));
            }
        }
        def.rules.push(rule.into_rule());
    }

    Ok(def)
}

fn add_builtin_variables(variables: &mut HashMap<String, String>) {
    for (key, value) in env::vars() {
        variables.insert(format!("ENV_{}", key), value);
    }

    if let Ok(pwd) = env::current_dir() {
        variables.insert("PWD".to_string(), pwd.to_string_lossy().to_string());
    }
}

fn substitute_variables(text: &str, variables: &HashMap<String, String>) -> String {
    let lookup = |caps: &regex::Captures| {
        variables
            .get(&caps[1])
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    };

    let result = BRACED_VARIABLE.replace_all(text, lookup);
    SIMPLE_VARIABLE.replace_all(&result, lookup).to_string()
}
