//! Incremental executor (§4.6): staleness tickets, a parallel OS-thread
//! worker pool (not async — §5's concurrency model is plain threads plus a
//! shared cancellation flag), dependency-file ingestion, and the downstream
//! archive/link/test steps.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Instant, SystemTime};

use bpt_diagnostics::Cancellation;
use thiserror::Error;

use crate::db::{mtime_to_ms, BuildDb, BuildDbError};
use crate::depfile::{self, DEFAULT_MSVC_LEADER};
use crate::plan::{ArchiveId, CompileId, LinkId, LinkKind, Plans};
use crate::toolchain::{ArchiveSpec, DepsMode, LinkExeSpec, Toolchain, ToolchainKnobs};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Db(#[from] BuildDbError),
    #[error("failed to run {tool}: {source}")]
    Spawn { tool: String, #[source] source: std::io::Error },
}

#[derive(Debug, Clone)]
pub struct CompileFailure {
    pub output: PathBuf,
    pub command: String,
    pub status: Option<i32>,
    pub captured_output: String,
}

#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub recompiled: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<CompileFailure>,
}

impl ExecutionReport {
    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }
}

fn quote_command(command: &[String]) -> String {
    command
        .iter()
        .map(|a| if a.contains(' ') { format!("\"{a}\"") } else { a.clone() })
        .collect::<Vec<_>>()
        .join(" ")
}

fn needs_recompile(db: &BuildDb, output: &Path, quoted_command: &str, toolchain_hash: &str, syntax_only: bool) -> bool {
    let Ok(Some(prior)) = db.command_of(output) else {
        return true;
    };
    if prior.quoted_command != quoted_command || prior.toolchain_hash != toolchain_hash {
        return true;
    }
    if !syntax_only && !output.exists() {
        return true;
    }
    let Ok(Some(inputs)) = db.inputs_of(output) else {
        return true;
    };
    for (path, stored_mtime) in inputs {
        let actual = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => return true,
        };
        if mtime_to_ms(actual) != mtime_to_ms(stored_mtime) {
            return true;
        }
    }
    false
}

struct CompileOutcome {
    output: PathBuf,
    quoted: String,
    succeeded: bool,
    status: Option<i32>,
    captured_output: String,
    duration_ms: u64,
    toolchain_hash: String,
    inputs: Vec<PathBuf>,
    compile_start: SystemTime,
}

fn write_syncheck_shim(header: &Path, shim_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = shim_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let header_abs = header.canonicalize().unwrap_or_else(|_| header.to_path_buf());
    std::fs::write(shim_path, format!("#include \"{}\"\n", header_abs.display()))
}

fn run_one(
    toolchain: &Toolchain,
    plans: &Plans,
    id: CompileId,
    cwd: &Path,
    knobs: ToolchainKnobs,
    cancellation: &Cancellation,
) -> Result<CompileOutcome, ExecError> {
    let plan = plans.compile(id);
    let mut spec = plan.to_spec();

    if plan.rules.syntax_only {
        let shim = plan.output.with_extension("syncheck.cpp");
        write_syncheck_shim(&plan.source, &shim)
            .map_err(|e| ExecError::Spawn { tool: "syncheck shim".into(), source: e })?;
        spec.source_path = shim;
    }
    if let Some(parent) = plan.output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ExecError::Spawn { tool: "mkdir".into(), source: e })?;
    }

    let info = toolchain.create_compile_command(&spec, cwd, knobs);
    let quoted = quote_command(&info.command);
    let toolchain_hash = toolchain.content_hash();
    let compile_start = SystemTime::now();

    if cancellation.is_cancelled() {
        return Ok(CompileOutcome {
            output: plan.output.clone(),
            quoted,
            succeeded: false,
            status: None,
            captured_output: "cancelled".to_string(),
            duration_ms: 0,
            toolchain_hash,
            inputs: Vec::new(),
            compile_start,
        });
    }

    let start = Instant::now();
    let program = &info.command[0];
    let output = Command::new(program)
        .args(&info.command[1..])
        .current_dir(cwd)
        .output()
        .map_err(|e| ExecError::Spawn { tool: program.clone(), source: e })?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let mut inputs = vec![spec.source_path.clone()];
    let mut captured = stderr.clone();

    if output.status.success() {
        match toolchain.deps_mode {
            DepsMode::GnuMakefile => {
                if let Some(depfile_path) = &info.gnu_depfile_path {
                    if let Ok(content) = std::fs::read_to_string(depfile_path) {
                        if let Ok(parsed) = depfile::parse_makefile_deps(&content) {
                            inputs = parsed;
                        }
                    }
                }
            }
            DepsMode::MsvcShowIncludes => {
                let parsed = depfile::parse_msvc_show_includes(&stdout, DEFAULT_MSVC_LEADER);
                if !parsed.inputs.is_empty() {
                    inputs = parsed.inputs;
                }
                captured = format!("{}\n{}", parsed.cleaned_output, stderr);
            }
            DepsMode::None => {}
        }
    }

    Ok(CompileOutcome {
        output: plan.output.clone(),
        quoted,
        succeeded: output.status.success(),
        status: output.status.code(),
        captured_output: captured,
        duration_ms,
        toolchain_hash,
        inputs,
        compile_start,
    })
}

/// Compiles every plan named by `compile_ids`, reusing cached results where
/// the staleness ticket says nothing changed. Returns whether every
/// attempted compile succeeded — matching the spec's `compile_all(plans,
/// env, n_jobs) → bool`.
pub fn compile_all(
    db: &mut BuildDb,
    toolchain: &Toolchain,
    plans: &Plans,
    compile_ids: &[CompileId],
    cwd: &Path,
    knobs: ToolchainKnobs,
    n_jobs: usize,
    cancellation: &Cancellation,
) -> Result<ExecutionReport, ExecError> {
    let n_jobs = n_jobs.max(1);
    let toolchain_hash = toolchain.content_hash();

    let mut to_run = Vec::new();
    let mut report = ExecutionReport::default();
    for &id in compile_ids {
        let plan = plans.compile(id);
        let spec = plan.to_spec();
        let info = toolchain.create_compile_command(&spec, cwd, knobs);
        let quoted = quote_command(&info.command);
        if needs_recompile(db, &plan.output, &quoted, &toolchain_hash, plan.rules.syntax_only) {
            to_run.push(id);
        } else {
            report.skipped.push(plan.output.clone());
            if let Ok(Some(prior)) = db.command_of(&plan.output) {
                if !prior.compiler_output.trim().is_empty() && plan.rules.enable_warnings {
                    tracing::warn!(output = %plan.output.display(), "{}", prior.compiler_output.trim());
                }
            }
        }
    }

    let work: Mutex<std::collections::VecDeque<CompileId>> = Mutex::new(to_run.into_iter().collect());
    let outcomes: Mutex<Vec<CompileOutcome>> = Mutex::new(Vec::new());
    let stop = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..n_jobs {
            scope.spawn(|| loop {
                if cancellation.is_cancelled() || stop.load(Ordering::SeqCst) {
                    break;
                }
                let next = work.lock().unwrap().pop_front();
                let Some(id) = next else { break };
                match run_one(toolchain, plans, id, cwd, knobs, cancellation) {
                    Ok(outcome) => {
                        let failed = !outcome.succeeded;
                        outcomes.lock().unwrap().push(outcome);
                        if failed {
                            stop.store(true, Ordering::SeqCst);
                        }
                    }
                    Err(e) => {
                        tracing::error!("compile job failed to spawn: {e}");
                        stop.store(true, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    let outcomes = outcomes.into_inner().unwrap();
    db.in_transaction(|tx| {
        for outcome in &outcomes {
            crate::db::insert_compilation(
                tx,
                &outcome.output,
                &outcome.quoted,
                &outcome.captured_output,
                &outcome.toolchain_hash,
                outcome.duration_ms,
                outcome.compile_start,
            )?;
            crate::db::delete_inputs(tx, &outcome.output)?;
            for input in &outcome.inputs {
                let mtime = std::fs::metadata(input)
                    .and_then(|m| m.modified())
                    .unwrap_or(outcome.compile_start)
                    .min(outcome.compile_start);
                crate::db::insert_input(tx, &outcome.output, input, mtime)?;
            }
        }
        Ok(())
    })?;

    for outcome in outcomes {
        if outcome.succeeded {
            report.recompiled.push(outcome.output.clone());
            if !outcome.captured_output.trim().is_empty() {
                tracing::warn!(output = %outcome.output.display(), "{}", outcome.captured_output.trim());
            }
        } else {
            report.failures.push(CompileFailure {
                output: outcome.output.clone(),
                command: outcome.quoted.clone(),
                status: outcome.status,
                captured_output: outcome.captured_output.clone(),
            });
        }
    }

    Ok(report)
}

/// Runs every archive plan whose inputs all succeeded, in their own
/// parallel batch after all compiles have joined. A failed archive is
/// reported but does not stop unrelated archives from running.
pub fn archive_all(
    toolchain: &Toolchain,
    plans: &Plans,
    archive_ids: &[ArchiveId],
    cwd: &Path,
    report: &ExecutionReport,
) -> Vec<CompileFailure> {
    let failed_outputs: std::collections::HashSet<&Path> =
        report.failures.iter().map(|f| f.output.as_path()).collect();
    let mut failures = Vec::new();

    for &id in archive_ids {
        let plan = plans.archive(id);
        let inputs: Vec<PathBuf> = plan.inputs.iter().map(|c| plans.compile(*c).output.clone()).collect();
        if inputs.iter().any(|p| failed_outputs.contains(p.as_path())) {
            continue;
        }
        if let Some(parent) = plan.output.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let spec = ArchiveSpec { input_files: inputs, out_path: plan.output.clone() };
        let command = toolchain.create_archive_command(&spec, cwd);
        match Command::new(&command[0]).args(&command[1..]).current_dir(cwd).output() {
            Ok(out) if out.status.success() => {}
            Ok(out) => failures.push(CompileFailure {
                output: plan.output.clone(),
                command: quote_command(&command),
                status: out.status.code(),
                captured_output: String::from_utf8_lossy(&out.stderr).into_owned(),
            }),
            Err(e) => failures.push(CompileFailure {
                output: plan.output.clone(),
                command: quote_command(&command),
                status: None,
                captured_output: e.to_string(),
            }),
        }
    }
    failures
}

/// Links every link plan whose main compile and library inputs are all
/// present, after the archive batch completes.
pub fn link_all(
    toolchain: &Toolchain,
    plans: &Plans,
    link_ids: &[LinkId],
    cwd: &Path,
    report: &ExecutionReport,
    archive_failures: &[CompileFailure],
) -> Vec<CompileFailure> {
    let failed_outputs: std::collections::HashSet<&Path> = report
        .failures
        .iter()
        .chain(archive_failures.iter())
        .map(|f| f.output.as_path())
        .collect();
    let mut failures = Vec::new();

    for &id in link_ids {
        let plan = plans.link(id);
        let main_output = &plans.compile(plan.main).output;
        if failed_outputs.contains(main_output.as_path())
            || plan.library_inputs.iter().any(|p| failed_outputs.contains(p.as_path()))
        {
            continue;
        }
        if let Some(parent) = plan.output.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let mut inputs = vec![main_output.clone()];
        inputs.extend(plan.library_inputs.iter().cloned());
        let spec = LinkExeSpec { inputs, output: plan.output.clone() };
        let command = toolchain.create_link_executable_command(&spec, cwd);
        match Command::new(&command[0]).args(&command[1..]).current_dir(cwd).output() {
            Ok(out) if out.status.success() => {}
            Ok(out) => failures.push(CompileFailure {
                output: plan.output.clone(),
                command: quote_command(&command),
                status: out.status.code(),
                captured_output: String::from_utf8_lossy(&out.stderr).into_owned(),
            }),
            Err(e) => failures.push(CompileFailure {
                output: plan.output.clone(),
                command: quote_command(&command),
                status: None,
                captured_output: e.to_string(),
            }),
        }
    }
    failures
}

/// A single test binary's result.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub binary: PathBuf,
    pub passed: bool,
    pub status: Option<i32>,
    pub captured_output: String,
}

/// Runs every linked test binary as a plain subprocess and aggregates the
/// per-test results; a test binary whose link failed is skipped, not
/// reported as a test failure.
pub fn run_tests(plans: &Plans, link_ids: &[LinkId], cwd: &Path) -> Vec<TestResult> {
    let mut results = Vec::new();
    for &id in link_ids {
        let plan = plans.link(id);
        if plan.kind != LinkKind::Test {
            continue;
        }
        if !plan.output.exists() {
            continue;
        }
        match Command::new(&plan.output).current_dir(cwd).output() {
            Ok(out) => results.push(TestResult {
                binary: plan.output.clone(),
                passed: out.status.success(),
                status: out.status.code(),
                captured_output: format!(
                    "{}{}",
                    String::from_utf8_lossy(&out.stdout),
                    String::from_utf8_lossy(&out.stderr)
                ),
            }),
            Err(e) => results.push(TestResult {
                binary: plan.output.clone(),
                passed: false,
                status: None,
                captured_output: e.to_string(),
            }),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_command_wraps_args_with_spaces() {
        let cmd = vec!["gcc".to_string(), "-DFOO=bar baz".to_string()];
        assert_eq!(quote_command(&cmd), r#"gcc "-DFOO=bar baz""#);
    }

    #[test]
    fn report_ok_is_true_only_with_no_failures() {
        let report = ExecutionReport::default();
        assert!(report.ok());
    }
}
