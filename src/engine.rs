//! Dependency-aware pipeline engine.
//!
//! The engine turns a scanned source tree into a set of finished artifacts.
//! Each source entry becomes exactly one [`PipelineTask`], which carries the
//! entry through its classifier-chosen transformer chain.
//!
//! ## Scheduling
//!
//! Tasks run in *waves*. A wave runs every ready task in parallel on the
//! rayon pool; each task advances through its chain until it finishes,
//! fails, or needs a file that has not finished yet:
//!
//! ```text
//! wave 1   index.md ──markdown──layout──▶ needs styles.util.css   (waits)
//!          styles.util.css ──utility──css-post──▶ finished
//!          logo.png ──▶ finished (verbatim)
//! merge    artifact map += styles.util.css → styles.css, logo.png → logo.png
//! wave 2   index.md ──▶ @ref(styles.util.css) becomes /styles.css ──▶ finished
//! merge    artifact map += index.md → index.html
//! ```
//!
//! Between waves, finished tasks are registered in the [`ArtifactMap`] one
//! by one in scan order. During a wave every task only holds a shared
//! borrow of the map, so registration never races with lookups and what a
//! task can see depends only on the inputs, never on thread timing. This is
//! what keeps two builds of the same tree byte-identical.
//!
//! ## References
//!
//! After every transformer step the task's new content is searched for
//! `@ref(...)` tokens (see [`crate::reference`]). A file no transformer
//! accepts is searched once, as read. Each target must be a scanned entry;
//! if it has already completed the token is replaced with its final URL,
//! otherwise the task waits. Only UTF-8 content is searched, and
//! passthrough files are never touched.
//!
//! Every output path a transformer returns is normalised before it is used.
//! A path that is empty or climbs out of the destination fails the task.
//!
//! ## Failure policy
//!
//! | Situation | Outcome |
//! |-----------|---------|
//! | Transformer returns an error | that task fails |
//! | Reference to an unknown path | that task fails |
//! | Reference to a failed task | the referencing task fails |
//! | Tasks waiting on each other | every cycle member fails, naming the cycle |
//! | Transformer returns a path outside the destination | that task fails |
//! | Two tasks produce one output path | the later-registered task fails |
//! | Missing source root, cancellation | whole build aborts |
//!
//! Per-task failures are collected in the [`BuildResult`]; every other task
//! still completes and is written.

use crate::artifact::{Artifact, ArtifactBody, ArtifactError, ArtifactMap};
use crate::classify::{Classification, Disposition, classify};
use crate::reference::{find_references, normalize, substitute, targets};
use crate::registry::FrozenRegistry;
use crate::rules::PathRules;
use crate::scan::{ScanError, Scanner};
use crate::transform::TransformError;
use crate::types::{SourceEntry, relative_identity};
use crate::writer::{MANIFEST_FILE, OutputWriter};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort the whole build.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source tree error: {0}")]
    Scan(#[from] ScanError),
    #[error("Destination {0} lies inside the source tree and is not excluded")]
    DestinationInSource(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Build cancelled")]
    Cancelled,
}

/// A failure confined to one task (or one written artifact).
#[derive(Error, Debug)]
#[error("{path}: {kind}")]
pub struct TaskError {
    /// Source identity of the failed task.
    pub path: String,
    pub kind: TaskErrorKind,
}

impl TaskError {
    pub fn new(path: impl Into<String>, kind: TaskErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[derive(Error, Debug)]
pub enum TaskErrorKind {
    #[error("cannot scan: {0}")]
    Scan(#[source] ScanError),
    #[error("transformer '{transformer}' failed: {source}")]
    Transform {
        transformer: String,
        #[source]
        source: TransformError,
    },
    #[error("reference to '{target}' does not match any source file")]
    MissingReference { target: String },
    #[error("referenced file '{target}' failed to build")]
    DependencyFailed { target: String },
    #[error("output path '{output_path}' is empty or leaves the destination root")]
    InvalidOutputPath { output_path: String },
    #[error("dependency cycle between {}", .members.join(", "))]
    DependencyCycle { members: Vec<String> },
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("cannot write {output_path}: {source}")]
    Write {
        output_path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Cooperative cancellation flag shared between a build and its caller.
///
/// A cancelled build stops at the next wave, transformer step, or file
/// write and returns [`PipelineError::Cancelled`]. Whatever it already wrote
/// to the destination must be treated as garbage.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Immutable build configuration, constructed once per build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub exclude: PathRules,
    pub passthrough: PathRules,
    /// Also write the artifact map to `artifact-manifest.json`.
    pub artifact_manifest: bool,
}

impl BuildConfig {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            exclude: PathRules::empty(),
            passthrough: PathRules::empty(),
            artifact_manifest: false,
        }
    }

    pub fn with_exclude(mut self, exclude: PathRules) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_passthrough(mut self, passthrough: PathRules) -> Self {
        self.passthrough = passthrough;
        self
    }

    pub fn with_artifact_manifest(mut self, enabled: bool) -> Self {
        self.artifact_manifest = enabled;
        self
    }
}

#[derive(Debug)]
enum TaskStatus {
    Ready,
    Waiting(BTreeSet<String>),
    /// Chain done; not yet in the artifact map.
    Finished,
    Completed,
    Failed(TaskError),
}

/// Per-entry unit of work.
#[derive(Debug)]
pub struct PipelineTask {
    identity: String,
    classification: Classification,
    content: Vec<u8>,
    output_path: String,
    /// Index of the next transformer to run.
    step: usize,
    /// Content produced by the last step still has to be searched for references.
    unresolved: bool,
    status: TaskStatus,
}

/// Read-only view of the build shared by all tasks in a wave.
struct WaveContext<'a> {
    artifacts: &'a ArtifactMap,
    known: &'a BTreeSet<String>,
    failed: &'a BTreeSet<String>,
    cancel: &'a CancelToken,
}

enum Resolution {
    Resolved,
    Waiting(BTreeSet<String>),
    Failed(TaskErrorKind),
}

impl PipelineTask {
    pub fn new(entry: SourceEntry, classification: Classification) -> Self {
        // A file no transformer accepts still has its references resolved.
        let unresolved = classification.disposition == Disposition::Transform
            && classification.transformers.is_empty();
        Self {
            output_path: classification.output_path.clone(),
            identity: entry.path,
            content: entry.content,
            classification,
            step: 0,
            unresolved,
            status: TaskStatus::Ready,
        }
    }

    fn failed(path: String, error: ScanError) -> Self {
        Self {
            classification: Classification {
                disposition: Disposition::Transform,
                transformers: Vec::new(),
                output_path: path.clone(),
            },
            output_path: path.clone(),
            status: TaskStatus::Failed(TaskError::new(path.clone(), TaskErrorKind::Scan(error))),
            identity: path,
            content: Vec::new(),
            step: 0,
            unresolved: false,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Output path after the steps run so far.
    pub fn output_path(&self) -> &str {
        &self.output_path
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, TaskStatus::Failed(_))
    }

    fn is_ready(&self) -> bool {
        matches!(self.status, TaskStatus::Ready)
    }

    fn is_waiting(&self) -> bool {
        matches!(self.status, TaskStatus::Waiting(_))
    }

    fn fail(&mut self, kind: TaskErrorKind) {
        warn!(path = %self.identity, error = %kind, "task failed");
        self.status = TaskStatus::Failed(TaskError::new(self.identity.clone(), kind));
    }

    /// Re-check a waiting task against the state left by the last merge.
    fn wake(&mut self, artifacts: &ArtifactMap, failed: &BTreeSet<String>) {
        let TaskStatus::Waiting(targets) = &self.status else {
            return;
        };
        if let Some(target) = targets.iter().find(|t| failed.contains(*t)) {
            let target = target.clone();
            self.fail(TaskErrorKind::DependencyFailed { target });
        } else if targets.iter().all(|t| artifacts.contains(t)) {
            self.status = TaskStatus::Ready;
        }
    }

    /// Run as many steps as possible without waiting on another task.
    fn advance(&mut self, ctx: &WaveContext<'_>) {
        loop {
            if ctx.cancel.is_cancelled() {
                return;
            }
            if self.unresolved {
                match self.resolve_references(ctx) {
                    Resolution::Resolved => self.unresolved = false,
                    Resolution::Waiting(targets) => {
                        debug!(path = %self.identity, waiting_on = ?targets, "task suspended");
                        self.status = TaskStatus::Waiting(targets);
                        return;
                    }
                    Resolution::Failed(kind) => {
                        self.fail(kind);
                        return;
                    }
                }
            }

            let Some(descriptor) = self.classification.transformers.get(self.step).cloned() else {
                self.status = TaskStatus::Finished;
                return;
            };
            let content = std::mem::take(&mut self.content);
            match descriptor.transformer().transform(content, &self.output_path) {
                Ok(output) => {
                    let Some(output_path) = normalize(&output.path) else {
                        debug!(transformer = %descriptor.identity, "rejected output path");
                        self.fail(TaskErrorKind::InvalidOutputPath {
                            output_path: output.path,
                        });
                        return;
                    };
                    debug!(
                        path = %self.identity,
                        transformer = %descriptor.identity,
                        output = %output_path,
                        "applied transformer"
                    );
                    self.content = output.content;
                    self.output_path = output_path;
                    self.step += 1;
                    self.unresolved = true;
                }
                Err(source) => {
                    self.fail(TaskErrorKind::Transform {
                        transformer: descriptor.identity.clone(),
                        source,
                    });
                    return;
                }
            }
        }
    }

    fn resolve_references(&mut self, ctx: &WaveContext<'_>) -> Resolution {
        let Ok(text) = std::str::from_utf8(&self.content) else {
            return Resolution::Resolved;
        };
        let refs = find_references(text);
        if refs.is_empty() {
            return Resolution::Resolved;
        }

        if let Some(escaping) = refs.iter().find(|r| r.target.is_none()) {
            return Resolution::Failed(TaskErrorKind::MissingReference {
                target: escaping.raw.clone(),
            });
        }

        let mut waiting = BTreeSet::new();
        for target in targets(&refs) {
            if ctx.artifacts.contains(&target) {
                continue;
            }
            if !ctx.known.contains(&target) {
                return Resolution::Failed(TaskErrorKind::MissingReference { target });
            }
            if ctx.failed.contains(&target) {
                return Resolution::Failed(TaskErrorKind::DependencyFailed { target });
            }
            waiting.insert(target);
        }
        if !waiting.is_empty() {
            return Resolution::Waiting(waiting);
        }

        let resolved = substitute(text, &refs, |target| ctx.artifacts.url(target));
        self.content = resolved.into_bytes();
        Resolution::Resolved
    }
}

/// Every task for one build, before execution, in scan order.
#[derive(Debug, Default)]
pub struct Plan {
    tasks: Vec<PipelineTask>,
    /// Scan failures that could not be attributed to an entry.
    errors: Vec<TaskError>,
}

impl Plan {
    pub fn tasks(&self) -> &[PipelineTask] {
        &self.tasks
    }

    pub fn errors(&self) -> &[TaskError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Summary numbers for one build.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    pub tasks: usize,
    pub completed: usize,
    pub verbatim: usize,
    pub failed: usize,
    pub waves: usize,
    pub written: usize,
    pub duration_ms: u64,
}

/// Outcome of a build.
#[derive(Debug)]
pub struct BuildResult {
    /// Successfully completed artifacts, in scan order.
    pub artifacts: Vec<Artifact>,
    pub errors: Vec<TaskError>,
    pub artifact_map: ArtifactMap,
    pub stats: BuildStats,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn artifact(&self, identity: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.identity == identity)
    }

    pub fn error_for(&self, path: &str) -> Option<&TaskError> {
        self.errors.iter().find(|e| e.path == path)
    }
}

/// The configured pipeline: build config, frozen registry, cancel token.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: BuildConfig,
    registry: FrozenRegistry,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: BuildConfig, registry: FrozenRegistry) -> Self {
        Self {
            config,
            registry,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn registry(&self) -> &FrozenRegistry {
        &self.registry
    }

    /// Scan the source tree and classify every entry.
    pub fn plan(&self) -> Result<Plan, PipelineError> {
        let scanner = Scanner::new(&self.config.source, self.config.exclude.clone())?;
        self.check_destination()?;
        info!(
            source = %scanner.root().display(),
            exclude = ?self.config.exclude.patterns(),
            passthrough = ?self.config.passthrough.patterns(),
            "planning build"
        );
        Ok(self.plan_entries(scanner.entries()))
    }

    /// Build a plan from already-scanned entries.
    pub fn plan_entries<I>(&self, entries: I) -> Plan
    where
        I: IntoIterator<Item = Result<SourceEntry, ScanError>>,
    {
        let mut plan = Plan::default();
        for item in entries {
            match item {
                Ok(entry) => {
                    let classification =
                        classify(&entry, self.registry.descriptors(), &self.config.passthrough);
                    plan.tasks.push(PipelineTask::new(entry, classification));
                }
                Err(err) => match err.entry_path().filter(|p| !p.is_empty()) {
                    // A directory that cannot be listed is yielded first and
                    // then reported; keep one task per identity.
                    Some(path) => match plan.tasks.last_mut() {
                        Some(last) if last.identity == path => last.fail(TaskErrorKind::Scan(err)),
                        _ => plan.tasks.push(PipelineTask::failed(path, err)),
                    },
                    None => plan
                        .errors
                        .push(TaskError::new(".", TaskErrorKind::Scan(err))),
                },
            }
        }
        plan
    }

    /// Plan and execute without writing anything.
    pub fn run(&self) -> Result<BuildResult, PipelineError> {
        let plan = self.plan()?;
        self.execute(plan)
    }

    /// Plan, execute, and write the output tree.
    pub fn build(&self) -> Result<BuildResult, PipelineError> {
        let mut result = self.run()?;
        let writer = OutputWriter::new(&self.config.destination).with_cancel_token(self.cancel.clone());

        let write_errors = writer.write_all(&result.artifacts)?;
        result.stats.written = result.artifacts.len() - write_errors.len();
        result.errors.extend(write_errors);

        if self.config.artifact_manifest {
            if let Err(err) = writer.write_manifest(&result.artifact_map) {
                result.errors.push(err);
            }
        }

        info!(
            destination = %self.config.destination.display(),
            written = result.stats.written,
            errors = result.errors.len(),
            "output written"
        );
        Ok(result)
    }

    /// Execute a plan to completion.
    pub fn execute(&self, plan: Plan) -> Result<BuildResult, PipelineError> {
        let start = Instant::now();
        let Plan {
            mut tasks,
            errors: mut unattributed,
        } = plan;

        let known: BTreeSet<String> = tasks.iter().map(|t| t.identity.clone()).collect();
        let mut artifacts = ArtifactMap::new();
        if self.config.artifact_manifest {
            artifacts.reserve_output(MANIFEST_FILE, "the artifact manifest");
        }
        let mut waves = 0;

        loop {
            self.check_cancelled()?;

            let mut failed: BTreeSet<String> = tasks
                .iter()
                .filter(|t| t.is_failed())
                .map(|t| t.identity.clone())
                .collect();
            // Failures propagate along wait chains until nothing new fails.
            loop {
                let mut changed = false;
                for task in &mut tasks {
                    task.wake(&artifacts, &failed);
                    if task.is_failed() && failed.insert(task.identity.clone()) {
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }

            let ready = tasks.iter().filter(|t| t.is_ready()).count();
            if ready == 0 {
                if !tasks.iter().any(PipelineTask::is_waiting) {
                    break;
                }
                break_cycles(&mut tasks);
                continue;
            }

            waves += 1;
            debug!(wave = waves, ready, "starting wave");
            let ctx = WaveContext {
                artifacts: &artifacts,
                known: &known,
                failed: &failed,
                cancel: &self.cancel,
            };
            tasks
                .par_iter_mut()
                .filter(|t| t.is_ready())
                .for_each(|t| t.advance(&ctx));
            self.check_cancelled()?;

            for task in &mut tasks {
                if !matches!(task.status, TaskStatus::Finished) {
                    continue;
                }
                match artifacts.insert(&task.identity, &task.output_path) {
                    Ok(()) => task.status = TaskStatus::Completed,
                    Err(err) => task.fail(err.into()),
                }
            }
        }

        let mut stats = BuildStats {
            tasks: tasks.len(),
            waves,
            ..Default::default()
        };
        let mut produced = Vec::new();
        let mut errors = Vec::new();
        errors.append(&mut unattributed);

        for task in tasks {
            match task.status {
                TaskStatus::Completed => {
                    stats.completed += 1;
                    let is_dir = task.classification.disposition == Disposition::Directory;
                    if task.classification.is_verbatim() && !is_dir {
                        stats.verbatim += 1;
                    }
                    let body = if is_dir {
                        ArtifactBody::Directory
                    } else {
                        ArtifactBody::File(task.content)
                    };
                    produced.push(Artifact {
                        applied: task
                            .classification
                            .transformers
                            .iter()
                            .map(|d| d.identity.clone())
                            .collect(),
                        identity: task.identity,
                        output_path: task.output_path,
                        body,
                    });
                }
                TaskStatus::Failed(err) => {
                    stats.failed += 1;
                    errors.push(err);
                }
                // The loop only exits once nothing is ready or waiting.
                TaskStatus::Ready | TaskStatus::Waiting(_) | TaskStatus::Finished => {}
            }
        }
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            tasks = stats.tasks,
            completed = stats.completed,
            failed = stats.failed,
            waves = stats.waves,
            duration_ms = stats.duration_ms,
            "build executed"
        );

        Ok(BuildResult {
            artifacts: produced,
            errors,
            artifact_map: artifacts,
            stats,
        })
    }

    fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            warn!("build cancelled");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// The destination may only live inside the source tree if it is excluded
    /// from scanning; otherwise each build would pick up the previous output.
    fn check_destination(&self) -> Result<(), PipelineError> {
        let source = std::path::absolute(&self.config.source)?;
        let destination = std::path::absolute(&self.config.destination)?;
        let Ok(rel) = destination.strip_prefix(&source) else {
            return Ok(());
        };
        let excluded = relative_identity(rel)
            .filter(|id| !id.is_empty())
            .is_some_and(|id| self.config.exclude.matches(&id) || is_hidden(rel));
        if excluded {
            Ok(())
        } else {
            Err(PipelineError::DestinationInSource(destination))
        }
    }
}

fn is_hidden(rel: &Path) -> bool {
    rel.components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

/// Fail every task that is part of a wait cycle.
///
/// Called when no task is ready but some are waiting. At that point every
/// waiting task waits on another waiting task, so the wait-for graph has at
/// least one cycle. Tasks that merely wait *on* a cycle are left alone and
/// fail with `DependencyFailed` once the cycle members are marked failed.
fn break_cycles(tasks: &mut [PipelineTask]) {
    let index: BTreeMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_waiting())
        .map(|(i, t)| (t.identity.as_str(), i))
        .collect();

    let mut edges: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &i in index.values() {
        if let TaskStatus::Waiting(targets) = &tasks[i].status {
            let next = targets
                .iter()
                .filter_map(|t| index.get(t.as_str()).copied())
                .collect();
            edges.insert(i, next);
        }
    }

    let mut cycles = strongly_connected(&edges)
        .into_iter()
        .filter(|scc| scc.len() > 1 || edges.get(&scc[0]).is_some_and(|n| n.contains(&scc[0])))
        .collect::<Vec<_>>();

    if cycles.is_empty() {
        // Unreachable in practice; fail everything waiting so the build ends.
        cycles.push(edges.keys().copied().collect());
    }

    for cycle in cycles {
        let mut members: Vec<String> = cycle.iter().map(|&i| tasks[i].identity.clone()).collect();
        members.sort();
        warn!(members = ?members, "dependency cycle");
        for &i in &cycle {
            tasks[i].fail(TaskErrorKind::DependencyCycle {
                members: members.clone(),
            });
        }
    }
}

/// Tarjan's strongly connected components over a small adjacency map.
fn strongly_connected(edges: &BTreeMap<usize, Vec<usize>>) -> Vec<Vec<usize>> {
    struct Tarjan<'a> {
        edges: &'a BTreeMap<usize, Vec<usize>>,
        next_index: usize,
        index: BTreeMap<usize, usize>,
        lowlink: BTreeMap<usize, usize>,
        stack: Vec<usize>,
        on_stack: BTreeSet<usize>,
        components: Vec<Vec<usize>>,
    }

    impl Tarjan<'_> {
        fn visit(&mut self, v: usize) {
            self.index.insert(v, self.next_index);
            self.lowlink.insert(v, self.next_index);
            self.next_index += 1;
            self.stack.push(v);
            self.on_stack.insert(v);

            let successors = self.edges.get(&v).cloned().unwrap_or_default();
            for w in successors {
                if !self.index.contains_key(&w) {
                    self.visit(w);
                    let low = self.lowlink[&v].min(self.lowlink[&w]);
                    self.lowlink.insert(v, low);
                } else if self.on_stack.contains(&w) {
                    let low = self.lowlink[&v].min(self.index[&w]);
                    self.lowlink.insert(v, low);
                }
            }

            if self.lowlink[&v] == self.index[&v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack.remove(&w);
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                self.components.push(component);
            }
        }
    }

    let mut tarjan = Tarjan {
        edges,
        next_index: 0,
        index: BTreeMap::new(),
        lowlink: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        components: Vec::new(),
    };
    for &v in edges.keys() {
        if !tarjan.index.contains_key(&v) {
            tarjan.visit(v);
        }
    }
    tarjan.components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TransformerRegistry;
    use crate::test_helpers::{InvocationLog, StubTransformer, entries, setup_fixtures, write_tree};
    use tempfile::TempDir;

    fn pipeline(registry: TransformerRegistry) -> Pipeline {
        Pipeline::new(BuildConfig::new("unused-src", "unused-dst"), registry.freeze())
    }

    fn run(pipeline: &Pipeline, files: &[(&str, &str)]) -> BuildResult {
        pipeline.execute(pipeline.plan_entries(entries(files))).unwrap()
    }

    fn text(result: &BuildResult, identity: &str) -> String {
        let artifact = result
            .artifact(identity)
            .unwrap_or_else(|| panic!("no artifact for {identity}: {:?}", result.errors));
        String::from_utf8(artifact.bytes().to_vec()).unwrap()
    }

    fn css_pipeline() -> Pipeline {
        pipeline(
            TransformerRegistry::new()
                .with(StubTransformer::for_type("utility", "css").renaming(".util.css", ".css"))
                .unwrap()
                .with(StubTransformer::for_type("page", "md").producing("html"))
                .unwrap(),
        )
    }

    #[test]
    fn independent_tasks_complete_in_one_wave() {
        let p = css_pipeline();
        let result = run(&p, &[("a.md", "A"), ("b.css", "B"), ("c.png", "C")]);
        assert!(result.is_success());
        assert_eq!(result.stats.waves, 1);
        assert_eq!(result.artifact_map.get("a.md"), Some("a.html"));
        assert_eq!(result.artifact_map.get("c.png"), Some("c.png"));
    }

    #[test]
    fn reference_resolves_to_post_transform_path() {
        let p = css_pipeline();
        let result = run(
            &p,
            &[
                ("index.md", r#"<link href="@ref(styles.util.css)">"#),
                ("styles.util.css", ".p-4 {}"),
            ],
        );
        assert!(result.is_success(), "{:?}", result.errors);
        assert_eq!(text(&result, "index.md"), r#"<link href="/styles.css">"#);
        assert_eq!(result.artifact_map.get("styles.util.css"), Some("styles.css"));
        assert_eq!(result.stats.waves, 2);
    }

    #[test]
    fn chained_references_resolve_across_waves() {
        let p = css_pipeline();
        let result = run(
            &p,
            &[
                ("a.md", "@ref(b.md)"),
                ("b.md", "@ref(c.md)"),
                ("c.md", "leaf"),
            ],
        );
        assert!(result.is_success());
        assert_eq!(text(&result, "a.md"), "/b.html");
        assert_eq!(text(&result, "b.md"), "/c.html");
        assert_eq!(result.stats.waves, 3);
    }

    #[test]
    fn missing_reference_fails_only_referencing_task() {
        let p = css_pipeline();
        let result = run(
            &p,
            &[("broken.md", "@ref(nope.css)"), ("ok.md", "fine"), ("s.css", "x")],
        );
        assert_eq!(result.errors.len(), 1);
        let err = &result.errors[0];
        assert_eq!(err.path, "broken.md");
        assert!(matches!(
            &err.kind,
            TaskErrorKind::MissingReference { target } if target == "nope.css"
        ));
        assert!(result.artifact("ok.md").is_some());
        assert!(result.artifact("s.css").is_some());
        assert!(result.artifact("broken.md").is_none());
    }

    #[test]
    fn reference_escaping_root_is_missing() {
        let p = css_pipeline();
        let result = run(&p, &[("a.md", "@ref(../etc/passwd)")]);
        assert!(matches!(
            &result.errors[0].kind,
            TaskErrorKind::MissingReference { target } if target == "../etc/passwd"
        ));
    }

    #[test]
    fn two_task_cycle_fails_both_members() {
        let p = css_pipeline();
        let result = run(
            &p,
            &[("a.md", "@ref(b.md)"), ("b.md", "@ref(a.md)"), ("c.md", "ok")],
        );
        assert_eq!(result.errors.len(), 2);
        for path in ["a.md", "b.md"] {
            let err = result.error_for(path).unwrap();
            match &err.kind {
                TaskErrorKind::DependencyCycle { members } => {
                    assert_eq!(members, &vec!["a.md".to_string(), "b.md".to_string()]);
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
        assert!(result.artifact("a.md").is_none());
        assert!(result.artifact("b.md").is_none());
        assert!(result.artifact("c.md").is_some());
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let p = css_pipeline();
        let result = run(&p, &[("loop.md", "@ref(loop.md)")]);
        assert!(matches!(
            &result.errors[0].kind,
            TaskErrorKind::DependencyCycle { members } if members == &vec!["loop.md".to_string()]
        ));
    }

    #[test]
    fn task_waiting_on_cycle_fails_as_dependency() {
        let p = css_pipeline();
        let result = run(
            &p,
            &[
                ("a.md", "@ref(b.md)"),
                ("b.md", "@ref(a.md)"),
                ("index.md", "@ref(a.md)"),
            ],
        );
        let err = result.error_for("index.md").unwrap();
        assert!(matches!(
            &err.kind,
            TaskErrorKind::DependencyFailed { target } if target == "a.md"
        ));
    }

    #[test]
    fn transformer_failure_is_task_error() {
        let p = pipeline(
            TransformerRegistry::new()
                .with(StubTransformer::for_type("explode", "md").failing())
                .unwrap(),
        );
        let result = run(&p, &[("a.md", "x"), ("b.txt", "y")]);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            &result.errors[0].kind,
            TaskErrorKind::Transform { transformer, .. } if transformer == "explode"
        ));
        assert!(result.artifact("b.txt").is_some());
    }

    #[test]
    fn dependent_of_failed_task_fails() {
        let p = pipeline(
            TransformerRegistry::new()
                .with(StubTransformer::for_type("explode", "css").failing())
                .unwrap()
                .with(StubTransformer::for_type("page", "md"))
                .unwrap(),
        );
        let result = run(&p, &[("a.md", "@ref(s.css)"), ("s.css", "x")]);
        let err = result.error_for("a.md").unwrap();
        assert!(matches!(
            &err.kind,
            TaskErrorKind::DependencyFailed { target } if target == "s.css"
        ));
    }

    #[test]
    fn failure_propagates_along_wait_chain() {
        let p = pipeline(
            TransformerRegistry::new()
                .with(StubTransformer::for_type("explode", "css").failing())
                .unwrap()
                .with(StubTransformer::for_type("page", "md"))
                .unwrap(),
        );
        let result = run(
            &p,
            &[("a.md", "@ref(b.md)"), ("b.md", "@ref(s.css)"), ("s.css", "x")],
        );
        assert_eq!(result.errors.len(), 3);
        assert!(matches!(
            &result.error_for("b.md").unwrap().kind,
            TaskErrorKind::DependencyFailed { target } if target == "s.css"
        ));
        assert!(matches!(
            &result.error_for("a.md").unwrap().kind,
            TaskErrorKind::DependencyFailed { target } if target == "b.md"
        ));
    }

    #[test]
    fn invocation_order_follows_registration_order() {
        for names in [["a", "b", "c"], ["c", "a", "b"], ["b", "c", "a"]] {
            let log = InvocationLog::default();
            let mut registry = TransformerRegistry::new();
            for name in names {
                registry
                    .register(StubTransformer::for_type(name, "txt").recording(&log))
                    .unwrap();
            }
            let p = pipeline(registry);
            let result = run(&p, &[("x.txt", "1"), ("y.txt", "2")]);
            assert!(result.is_success());
            assert_eq!(log.for_path("x.txt"), names.to_vec());
            assert_eq!(log.for_path("y.txt"), names.to_vec());
        }
    }

    #[test]
    fn content_flows_through_chain() {
        let p = pipeline(
            TransformerRegistry::new()
                .with(StubTransformer::any("one").appending("+1"))
                .unwrap()
                .with(StubTransformer::any("two").appending("+2"))
                .unwrap(),
        );
        let result = run(&p, &[("f.txt", "start")]);
        assert_eq!(text(&result, "f.txt"), "start+1+2");
        assert_eq!(result.artifact("f.txt").unwrap().applied, vec!["one", "two"]);
    }

    #[test]
    fn passthrough_skips_chain_and_keeps_bytes() {
        let log = InvocationLog::default();
        let registry = TransformerRegistry::new()
            .with(StubTransformer::any("touch").appending("!").recording(&log))
            .unwrap();
        let config = BuildConfig::new("s", "d").with_passthrough(PathRules::new(["public"]).unwrap());
        let p = Pipeline::new(config, registry.freeze());

        let result = run(
            &p,
            &[("public/raw.css", "@ref(missing)"), ("page.md", "@ref(public/raw.css)")],
        );
        assert!(result.is_success(), "{:?}", result.errors);
        assert_eq!(text(&result, "public/raw.css"), "@ref(missing)");
        assert_eq!(result.artifact_map.get("public/raw.css"), Some("public/raw.css"));
        assert_eq!(text(&result, "page.md"), "/public/raw.css!");
        assert_eq!(log.for_path("public/raw.css"), Vec::<String>::new());
    }

    #[test]
    fn output_collision_fails_later_task() {
        let p = pipeline(
            TransformerRegistry::new()
                .with(StubTransformer::for_type("page", "md").producing("html"))
                .unwrap(),
        );
        let result = run(&p, &[("about.html", "a"), ("about.md", "b")]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "about.md");
        assert!(matches!(
            result.errors[0].kind,
            TaskErrorKind::Artifact(ArtifactError::OutputCollision { .. })
        ));
    }

    #[test]
    fn collision_is_detected_after_normalising_paths() {
        let p = pipeline(
            TransformerRegistry::new()
                .with(StubTransformer::for_type("page", "txt").renaming(".txt", ".html"))
                .unwrap()
                .with(StubTransformer::for_type("blob", "dat").renaming("b.dat", "./x.html"))
                .unwrap(),
        );
        let result = run(&p, &[("b.dat", "FROM_B"), ("x.txt", "FROM_X")]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "x.txt");
        assert!(matches!(
            result.errors[0].kind,
            TaskErrorKind::Artifact(ArtifactError::OutputCollision { .. })
        ));
        assert_eq!(result.artifact_map.get("b.dat"), Some("x.html"));
    }

    #[test]
    fn output_path_leaving_destination_fails_task() {
        let p = pipeline(
            TransformerRegistry::new()
                .with(StubTransformer::for_type("escape", "txt").renaming("a.txt", "../escaped.txt"))
                .unwrap(),
        );
        let result = run(&p, &[("a.txt", "x"), ("b.txt", "y")]);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            &result.error_for("a.txt").unwrap().kind,
            TaskErrorKind::InvalidOutputPath { output_path } if output_path == "../escaped.txt"
        ));
        assert!(result.artifact("a.txt").is_none());
        assert_eq!(result.artifact_map.get("b.txt"), Some("b.txt"));
    }

    #[test]
    fn output_paths_are_normalised() {
        let p = pipeline(
            TransformerRegistry::new()
                .with(StubTransformer::for_type("nest", "txt").renaming("a.txt", "/out/./deep/../a.txt"))
                .unwrap(),
        );
        let result = run(&p, &[("a.txt", "x")]);
        assert!(result.is_success(), "{:?}", result.errors);
        assert_eq!(result.artifact("a.txt").unwrap().output_path, "out/a.txt");
    }

    #[test]
    fn untransformed_text_has_references_resolved() {
        let p = css_pipeline();
        let result = run(
            &p,
            &[
                ("index.html", r#"<link href="@ref(styles.util.css)">"#),
                ("styles.util.css", ".p-4 {}"),
            ],
        );
        assert!(result.is_success(), "{:?}", result.errors);
        assert_eq!(text(&result, "index.html"), r#"<link href="/styles.css">"#);
        assert!(result.artifact("index.html").unwrap().applied.is_empty());
    }

    #[test]
    fn untransformed_text_with_missing_reference_fails() {
        let p = css_pipeline();
        let result = run(&p, &[("robots.txt", "Sitemap: @ref(sitemap.xml)")]);
        assert!(matches!(
            &result.error_for("robots.txt").unwrap().kind,
            TaskErrorKind::MissingReference { target } if target == "sitemap.xml"
        ));
    }

    #[test]
    fn manifest_path_is_reserved_when_enabled() {
        let registry = TransformerRegistry::new().freeze();
        let files = || entries(&[("artifact-manifest.json", "USER_FILE"), ("a.txt", "a")]);

        let with_manifest =
            Pipeline::new(BuildConfig::new("s", "d").with_artifact_manifest(true), registry.clone());
        let result = with_manifest.execute(with_manifest.plan_entries(files())).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "artifact-manifest.json");
        assert!(matches!(
            result.errors[0].kind,
            TaskErrorKind::Artifact(ArtifactError::OutputCollision { .. })
        ));

        let without = Pipeline::new(BuildConfig::new("s", "d"), registry);
        let result = without.execute(without.plan_entries(files())).unwrap();
        assert!(result.is_success());
    }

    #[test]
    fn unlistable_directory_is_one_failed_task() {
        let p = css_pipeline();
        let plan = p.plan_entries(vec![
            Ok(SourceEntry::directory("locked")),
            Err(ScanError::Read {
                path: "locked".into(),
                source: std::io::Error::other("denied"),
            }),
            Ok(SourceEntry::file("ok.md", "x")),
        ]);
        assert_eq!(plan.len(), 2);
        let result = p.execute(plan).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            result.error_for("locked").unwrap().kind,
            TaskErrorKind::Scan(_)
        ));
        assert!(result.artifact("locked").is_none());
        assert!(result.artifact("ok.md").is_some());
    }

    #[test]
    fn directories_become_directory_artifacts() {
        let p = css_pipeline();
        let plan = p.plan_entries(vec![
            Ok(SourceEntry::directory("blog")),
            Ok(SourceEntry::file("blog/a.md", "x")),
        ]);
        let result = p.execute(plan).unwrap();
        assert!(result.artifact("blog").unwrap().is_dir());
        assert_eq!(result.artifact_map.get("blog/a.md"), Some("blog/a.html"));
    }

    #[test]
    fn scan_error_becomes_task_error() {
        let p = css_pipeline();
        let plan = p.plan_entries(vec![
            Err(ScanError::Read {
                path: "locked.css".into(),
                source: std::io::Error::other("denied"),
            }),
            Ok(SourceEntry::file("a.md", "@ref(locked.css)")),
            Ok(SourceEntry::file("b.md", "fine")),
        ]);
        let result = p.execute(plan).unwrap();
        assert!(matches!(
            result.error_for("locked.css").unwrap().kind,
            TaskErrorKind::Scan(_)
        ));
        assert!(matches!(
            &result.error_for("a.md").unwrap().kind,
            TaskErrorKind::DependencyFailed { target } if target == "locked.css"
        ));
        assert!(result.artifact("b.md").is_some());
    }

    #[test]
    fn binary_output_is_not_searched() {
        let p = pipeline(
            TransformerRegistry::new()
                .with(StubTransformer::for_type("bin", "dat"))
                .unwrap(),
        );
        let plan = p.plan_entries(vec![Ok(SourceEntry::file(
            "x.dat",
            vec![0xff, b'@', b'r', b'e', b'f', b'(', b'a', b')'],
        ))]);
        let result = p.execute(plan).unwrap();
        assert!(result.is_success());
    }

    #[test]
    fn cancelled_build_aborts() {
        let p = css_pipeline();
        let plan = p.plan_entries(entries(&[("a.md", "x")]));
        p.cancel_token().cancel();
        assert!(matches!(p.execute(plan), Err(PipelineError::Cancelled)));
    }

    #[test]
    fn execution_is_deterministic() {
        let files = [
            ("index.md", "@ref(a.util.css) @ref(b.md)"),
            ("a.util.css", "a"),
            ("b.md", "@ref(c.md)"),
            ("c.md", "c"),
            ("d.png", "d"),
        ];
        let p = css_pipeline();
        let first = run(&p, &files);
        let second = run(&p, &files);
        assert_eq!(first.artifacts, second.artifacts);
        assert_eq!(
            first.artifact_map.iter().collect::<Vec<_>>(),
            second.artifact_map.iter().collect::<Vec<_>>()
        );
    }

    // =========================================================================
    // Filesystem builds
    // =========================================================================

    #[test]
    fn build_writes_fixture_site() {
        let tmp = setup_fixtures();
        let site = crate::config::load_config(&tmp.path().join(crate::config::CONFIG_FILE)).unwrap();
        let registry =
            crate::transformers::registry_from_names(site.transformers.as_slice(), site.layout.as_ref())
                .unwrap();
        let p = Pipeline::new(site.build_config(tmp.path()).unwrap(), registry.freeze());

        let result = p.build().unwrap();
        assert!(result.is_success(), "{:?}", result.errors);
        assert_eq!(result.stats.written, result.artifacts.len());
        // css finishes first, then the assignment page, then the index linking to it
        assert_eq!(result.stats.waves, 3);
        assert!(tmp.path().join("_site/artifact-manifest.json").exists());
        assert!(tmp.path().join("_site/public/logo.svg").exists());
    }

    #[test]
    fn run_does_not_write() {
        let tmp = TempDir::new().unwrap();
        write_tree(&tmp.path().join("src"), &[("a.md", "x")]);
        let config = BuildConfig::new(tmp.path().join("src"), tmp.path().join("out"));
        let p = Pipeline::new(config, css_pipeline().registry().clone());

        let result = p.run().unwrap();
        assert_eq!(result.artifact_map.get("a.md"), Some("a.html"));
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn missing_source_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let config = BuildConfig::new(tmp.path().join("nope"), tmp.path().join("out"));
        let p = Pipeline::new(config, TransformerRegistry::new().freeze());
        assert!(matches!(p.build(), Err(PipelineError::Scan(_))));
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn destination_inside_source_needs_exclusion() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("index.md", "x")]);
        let inside = BuildConfig::new(tmp.path(), tmp.path().join("out"));
        let p = Pipeline::new(inside.clone(), TransformerRegistry::new().freeze());
        assert!(matches!(p.plan(), Err(PipelineError::DestinationInSource(_))));

        let excluded = inside.with_exclude(PathRules::new(["out"]).unwrap());
        let p = Pipeline::new(excluded, TransformerRegistry::new().freeze());
        assert!(p.plan().is_ok());

        let same = BuildConfig::new(tmp.path(), tmp.path());
        let p = Pipeline::new(same, TransformerRegistry::new().freeze());
        assert!(p.plan().is_err());
    }

    #[test]
    fn tarjan_finds_cycles() {
        let mut edges = BTreeMap::new();
        edges.insert(0, vec![1]);
        edges.insert(1, vec![0]);
        edges.insert(2, vec![0]);
        edges.insert(3, vec![3]);
        let mut sccs = strongly_connected(&edges);
        sccs.sort();
        assert_eq!(sccs, vec![vec![0, 1], vec![2], vec![3]]);
    }
}
