/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::engine::memory
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    In-process build engine. States are path → node maps with
    whiteout markers for deletions; plan execution is handed
    to an injected runner, with a zypper simulator supplied.

  Security / Safety Notes:
    Nothing leaves the process; no commands are executed.

  Dependencies:
    tokio::time for simulated execution latency.

  Operational Scope:
    Dry runs and tests of layer composition.

  Revision History:
    2025-11-12 COD  Authored in-memory engine and simulator.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Pure state algebra; inputs never mutated
    - Deterministic ordering via BTreeMap
============================================================*/

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::engine::BuildEngine;
use crate::error::{PatchError, Result};
use crate::plan::{UpdatePlan, ENV_RPM_DB_DIR, ENV_RPM_DB_FILES, NO_DATABASE_EXIT_CODE};
use crate::version::compare_rpm_evr;

/// A filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir,
    File(Arc<[u8]>),
    /// Records that the path was deleted relative to a lower state.
    Whiteout,
}

/// Immutable in-memory image state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemState {
    nodes: Arc<BTreeMap<String, Node>>,
}

impl MemState {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a state holding the given files.
    pub fn from_files<P, D>(files: impl IntoIterator<Item = (P, D)>) -> Self
    where
        P: AsRef<str>,
        D: AsRef<[u8]>,
    {
        let nodes = files
            .into_iter()
            .map(|(path, data)| {
                (
                    normalize(path.as_ref()),
                    Node::File(Arc::from(data.as_ref())),
                )
            })
            .collect();
        Self {
            nodes: Arc::new(nodes),
        }
    }

    /// New state with `path` set to `data`.
    pub fn with_file(&self, path: &str, data: impl AsRef<[u8]>) -> Self {
        let mut nodes = (*self.nodes).clone();
        nodes.insert(normalize(path), Node::File(Arc::from(data.as_ref())));
        Self {
            nodes: Arc::new(nodes),
        }
    }

    /// New state with an empty directory at `path`.
    pub fn with_dir(&self, path: &str) -> Self {
        let mut nodes = (*self.nodes).clone();
        nodes.insert(normalize(path), Node::Dir);
        Self {
            nodes: Arc::new(nodes),
        }
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        match self.nodes.get(&normalize(path)) {
            Some(Node::File(data)) => Some(&data[..]),
            _ => None,
        }
    }

    /// Visible entries, whiteouts excluded.
    pub fn visible(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes
            .iter()
            .filter(|(_, node)| !matches!(node, Node::Whiteout))
            .map(|(path, node)| (path.as_str(), node))
    }

    /// Visible content as an owned map, for equivalence checks.
    pub fn contents(&self) -> BTreeMap<String, Node> {
        self.visible()
            .map(|(path, node)| (path.to_string(), node.clone()))
            .collect()
    }

    /// True when the state carries no entries at all, whiteouts included.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn visible_node(&self, path: &str) -> Option<&Node> {
        self.nodes
            .get(path)
            .filter(|node| !matches!(node, Node::Whiteout))
    }
}

/// Executes a plan against the mounted state.
pub type Runner = Arc<dyn Fn(&UpdatePlan, &MemState) -> Result<MemState> + Send + Sync>;

/// In-process `BuildEngine`.
pub struct MemoryEngine {
    images: BTreeMap<String, MemState>,
    runner: Runner,
    latency: Option<Duration>,
    executions: AtomicUsize,
}

impl MemoryEngine {
    pub fn new(runner: Runner) -> Self {
        Self {
            images: BTreeMap::new(),
            runner,
            latency: None,
            executions: AtomicUsize::new(0),
        }
    }

    /// Register an image so `resolve_image` can find it.
    pub fn with_image(mut self, reference: impl Into<String>, state: MemState) -> Self {
        self.images.insert(reference.into(), state);
        self
    }

    /// Delay every execution, to exercise cancellation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of plans executed so far.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildEngine for MemoryEngine {
    type State = MemState;

    async fn resolve_image(&self, reference: &str) -> Result<MemState> {
        self.images
            .get(reference)
            .cloned()
            .ok_or_else(|| PatchError::Resolution {
                image: reference.to_string(),
                reason: "image not registered".into(),
            })
    }

    async fn execute(
        &self,
        _tooling: &MemState,
        plan: &UpdatePlan,
        mount: &MemState,
    ) -> Result<MemState> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        (self.runner)(plan, mount)
    }

    async fn extract_file(&self, state: &MemState, path: &str) -> Result<Vec<u8>> {
        state
            .file(path)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| PatchError::ExtractionFailure {
                path: path.to_string(),
                reason: "file not present in state".into(),
            })
    }

    fn scratch(&self) -> MemState {
        MemState::empty()
    }

    fn diff(&self, lower: &MemState, upper: &MemState) -> MemState {
        let mut nodes = BTreeMap::new();
        for (path, node) in upper.visible() {
            if lower.visible_node(path) != Some(node) {
                nodes.insert(path.to_string(), node.clone());
            }
        }
        for (path, _) in lower.visible() {
            if upper.visible_node(path).is_none() {
                nodes.insert(path.to_string(), Node::Whiteout);
            }
        }
        MemState {
            nodes: Arc::new(nodes),
        }
    }

    fn merge(&self, states: &[MemState]) -> MemState {
        let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
        for state in states {
            for (path, node) in state.nodes.iter() {
                if matches!(node, Node::Whiteout) {
                    remove_tree(&mut nodes, path);
                }
                nodes.insert(path.clone(), node.clone());
            }
        }
        MemState {
            nodes: Arc::new(nodes),
        }
    }

    fn copy(&self, dest: &MemState, src: &MemState, from: &str, to: &str) -> MemState {
        let from = normalize(from);
        let to = normalize(to);
        let mut nodes = (*dest.nodes).clone();
        for (path, node) in src.visible() {
            if let Some(relative) = strip_tree_prefix(path, &from) {
                nodes.insert(join(&to, relative), node.clone());
            }
        }
        MemState {
            nodes: Arc::new(nodes),
        }
    }

    fn remove_file(&self, state: &MemState, path: &str) -> MemState {
        let mut nodes = (*state.nodes).clone();
        remove_tree(&mut nodes, &normalize(path));
        MemState {
            nodes: Arc::new(nodes),
        }
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn strip_tree_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path.trim_start_matches('/'));
    }
    if path == prefix {
        return Some("");
    }
    path.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
}

fn join(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        base.to_string()
    } else if base == "/" {
        format!("/{relative}")
    } else {
        format!("{base}/{relative}")
    }
}

fn remove_tree(nodes: &mut BTreeMap<String, Node>, path: &str) {
    nodes.retain(|existing, _| strip_tree_prefix(existing, path).is_none());
}

/// Package available from the simulated repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPackage {
    pub version: String,
    pub arch: String,
}

/// Render an RPM database file body for the simulator.
pub fn render_rpm_db(packages: &BTreeMap<String, RepoPackage>) -> String {
    packages
        .iter()
        .map(|(name, pkg)| format!("{name}\t{}\t{}\n", pkg.version, pkg.arch))
        .collect()
}

fn parse_rpm_db(raw: &[u8]) -> BTreeMap<String, RepoPackage> {
    String::from_utf8_lossy(raw)
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next()?;
            let version = fields.next()?;
            let arch = fields.next()?;
            Some((
                name.to_string(),
                RepoPackage {
                    version: version.to_string(),
                    arch: arch.to_string(),
                },
            ))
        })
        .collect()
}

/// Runner that behaves like the zypper plan: checks the database, upgrades
/// installed requested packages to the repository version when newer, and
/// writes the installed-package manifest.
pub fn zypper_simulator(repository: BTreeMap<String, RepoPackage>) -> Runner {
    Arc::new(move |plan: &UpdatePlan, mount: &MemState| -> Result<MemState> {
        let db_dir = plan
            .env_bindings
            .get(ENV_RPM_DB_DIR)
            .and_then(|full| full.strip_prefix(plan.input_mount_path.as_str()))
            .map(normalize)
            .ok_or_else(|| PatchError::ExecutionFailure {
                command: "zypper".into(),
                status: 1,
                diagnostics: "RPM DB location missing from plan".into(),
            })?;
        let candidates = plan
            .env_bindings
            .get(ENV_RPM_DB_FILES)
            .map(String::as_str)
            .unwrap_or_default();

        let Some((db_path, raw_db)) = candidates.split_whitespace().find_map(|file| {
            let path = join(&db_dir, file);
            mount.file(&path).map(|raw| (path, raw))
        }) else {
            return Err(PatchError::ExecutionFailure {
                command: "zypper".into(),
                status: NO_DATABASE_EXIT_CODE,
                diagnostics: "RPM DB not found".into(),
            });
        };

        let mut installed = parse_rpm_db(raw_db);
        let mut state = mount.clone();
        for name in &plan.packages {
            let (Some(current), Some(candidate)) = (installed.get(name), repository.get(name))
            else {
                continue;
            };
            if compare_rpm_evr(&current.version, &candidate.version).is_lt() {
                state = state.with_file(
                    &format!("/usr/share/{name}/VERSION"),
                    candidate.version.as_bytes(),
                );
                installed.insert(name.clone(), candidate.clone());
            }
        }

        if installed != parse_rpm_db(raw_db) {
            state = state.with_file(&db_path, render_rpm_db(&installed));
        }

        let manifest: String = plan
            .packages
            .iter()
            .filter_map(|name| {
                installed
                    .get(name)
                    .map(|pkg| format!("{name}\t{}\t{}\n", pkg.version, pkg.arch))
            })
            .collect();
        Ok(state.with_file(&plan.manifest_output_path, manifest))
    })
}
