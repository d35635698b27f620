//! Dependency-wave scheduling.
//!
//! Steps are grouped into waves: wave *n* holds every step whose
//! dependencies all sit in earlier waves. Steps of one wave run
//! concurrently; a wave starts only after the previous one completed, and
//! the first failure stops all further waves.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{Error, Result};

/// Group `edges` (`(step, depends_on)`) into dependency waves.
///
/// Within a wave, steps keep their declaration order. Unknown dependencies
/// and cycles are configuration errors.
pub fn waves(edges: &[(String, Vec<String>)]) -> Result<Vec<Vec<String>>> {
    let declared: HashMap<&str, usize> = edges
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.as_str(), i))
        .collect();

    for (id, deps) in edges {
        for dep in deps {
            if !declared.contains_key(dep.as_str()) {
                return Err(Error::config(format!(
                    "step `{}` depends on undeclared step `{}`",
                    id, dep
                )));
            }
        }
    }

    let mut level: BTreeMap<usize, usize> = BTreeMap::new();
    let mut remaining: Vec<usize> = (0..edges.len()).collect();
    while !remaining.is_empty() {
        let before = remaining.len();
        remaining.retain(|&i| {
            let deps = &edges[i].1;
            let ready: Option<usize> = deps.iter().try_fold(0usize, |acc, dep| {
                level.get(&declared[dep.as_str()]).map(|l| acc.max(l + 1))
            });
            match ready {
                Some(l) => {
                    level.insert(i, l);
                    false
                }
                None => true,
            }
        });
        if remaining.len() == before {
            let stuck: Vec<&str> = remaining.iter().map(|&i| edges[i].0.as_str()).collect();
            return Err(Error::config(format!(
                "dependency cycle between: {}",
                stuck.join(", ")
            )));
        }
    }

    let depth = level.values().copied().max().map_or(0, |d| d + 1);
    let mut waves = vec![Vec::new(); depth];
    for (i, (id, _)) in edges.iter().enumerate() {
        waves[level[&i]].push(id.clone());
    }
    Ok(waves)
}

/// Run `step` for every id, wave by wave, at most `jobs` at a time.
///
/// Returns `(id, output)` pairs in completion order. On failure the
/// remaining steps of the current wave are allowed to finish, no later
/// wave is started, and the first error is returned.
pub fn execute<T, F>(waves: &[Vec<String>], jobs: usize, step: F) -> Result<Vec<(String, T)>>
where
    F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(jobs.max(1))
        .build()
        .map_err(|e| Error::config(format!("failed to start worker runtime: {}", e)))?;
    let step = Arc::new(step);

    runtime.block_on(async move {
        let mut done = Vec::new();
        for (n, wave) in waves.iter().enumerate() {
            debug!(wave = n, steps = ?wave, "starting wave");
            let mut set = JoinSet::new();
            for id in wave {
                let step = Arc::clone(&step);
                let id = id.clone();
                set.spawn_blocking(move || {
                    let result = step(&id);
                    (id, result)
                });
            }

            let mut failure = None;
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((id, Ok(output))) => done.push((id, output)),
                    Ok((_, Err(e))) => {
                        failure.get_or_insert(e);
                    }
                    Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
                    Err(join) => {
                        failure.get_or_insert(Error::config(format!("build step aborted: {}", join)));
                    }
                }
            }
            if let Some(e) = failure {
                return Err(e);
            }
        }
        Ok(done)
    })
}
