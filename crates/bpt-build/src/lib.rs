//! Toolchain argv synthesis, build planning, build DB, and incremental
//! executor (§4.3-§4.7). This crate root wires the leaf modules into the
//! single entry point `bpt build` (and `compile-file`/`build-deps`) drive:
//! plan the libraries, execute the compile batch, then archive, link, and
//! optionally run tests.

pub mod db;
pub mod depfile;
pub mod dirscan;
pub mod exec;
mod migrations;
pub mod plan;
pub mod source;
pub mod toolchain;

use std::path::{Path, PathBuf};

use bpt_diagnostics::Cancellation;
use thiserror::Error;

pub use db::{BuildDb, BuildDbError, CompletedCompilation};
pub use exec::{CompileFailure, ExecError, ExecutionReport, TestResult};
pub use plan::{
    ArchiveId, ArchivePlan, CompileId, CompilePlan, LibraryBuildInput, LibraryPlan, LinkExePlan, LinkId, LinkKind,
    PlanError, Plans,
};
pub use toolchain::{get_builtin, Toolchain, ToolchainKnobs};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Db(#[from] BuildDbError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Options for one `bpt build` invocation (§6: `build`/`compile-file`/
/// `build-deps` all bottom out here with different `libs` slices).
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub jobs: usize,
    pub run_tests: bool,
    pub tty: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            jobs: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4) + 2,
            run_tests: false,
            tty: false,
        }
    }
}

/// Everything produced by one build run: the library plans (for reporting),
/// the compile/archive/link execution results, and any test results if
/// `run_tests` was requested.
#[derive(Debug)]
pub struct BuildRunResult {
    pub libraries: Vec<LibraryPlan>,
    pub compile_report: ExecutionReport,
    pub archive_failures: Vec<CompileFailure>,
    pub link_failures: Vec<CompileFailure>,
    pub test_results: Vec<TestResult>,
}

impl BuildRunResult {
    /// Whether every attempted compile, archive, and link step succeeded.
    /// Test failures are reported separately (§4.6: "per-test failure
    /// records... are accumulated and reported in aggregate") and do not by
    /// themselves make the build unsuccessful.
    pub fn build_ok(&self) -> bool {
        self.compile_report.ok() && self.archive_failures.is_empty() && self.link_failures.is_empty()
    }
}

/// Plans `libs` (already ordered dependency-first by the caller), then runs
/// the full compile -> archive -> link pipeline against `db`, persisting
/// build-DB state as it goes (§4.4-§4.6). Header-independence syntax-only
/// checks are compiled alongside ordinary library sources in the same
/// batch.
pub fn run_build(
    db: &mut BuildDb,
    toolchain: &Toolchain,
    libs: &[LibraryBuildInput],
    cwd: &Path,
    options: &BuildOptions,
    cancellation: &Cancellation,
) -> Result<BuildRunResult, BuildError> {
    let (plans, libraries) = plan::plan_libraries(db, toolchain, libs)?;

    let mut compile_ids: Vec<CompileId> = plans.compile_ids().collect();
    compile_ids.sort_by_key(|id| plans.compile(*id).output.clone());

    let knobs = ToolchainKnobs { is_tty: options.tty };
    let compile_report =
        exec::compile_all(db, toolchain, &plans, &compile_ids, cwd, knobs, options.jobs, cancellation)?;

    let archive_ids: Vec<ArchiveId> = plans.archive_ids().collect();
    let archive_failures = exec::archive_all(toolchain, &plans, &archive_ids, cwd, &compile_report);

    let link_ids: Vec<LinkId> = plans.link_ids().collect();
    let link_failures = exec::link_all(toolchain, &plans, &link_ids, cwd, &compile_report, &archive_failures);

    let test_results = if options.run_tests { exec::run_tests(&plans, &link_ids, cwd) } else { Vec::new() };

    Ok(BuildRunResult { libraries, compile_report, archive_failures, link_failures, test_results })
}

/// Compiles a single free-standing source file against a toolchain, bypassing
/// the planner entirely — the `bpt compile-file` subcommand's whole job.
pub fn compile_one_file(
    db: &mut BuildDb,
    toolchain: &Toolchain,
    source: &Path,
    output: &Path,
    include_dirs: &[PathBuf],
    cwd: &Path,
    cancellation: &Cancellation,
) -> Result<ExecutionReport, BuildError> {
    let mut plans = Plans::default();
    let rules = plan::CompileRules {
        include_dirs: include_dirs.to_vec(),
        external_include_dirs: Vec::new(),
        defines: Vec::new(),
        uses: Vec::new(),
        enable_warnings: true,
        syntax_only: false,
    };
    let id = plans.push_adhoc_compile(CompilePlan {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        qualifier: bpt_types::Name::parse("compile-file").expect("constant name is valid"),
        rules,
    });
    let knobs = ToolchainKnobs::default();
    Ok(exec::compile_all(db, toolchain, &plans, &[id], cwd, knobs, 1, cancellation)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpt_types::{LibraryInfo, Name};

    fn lib(name: &str, dir: &Path) -> LibraryBuildInput {
        LibraryBuildInput {
            info: LibraryInfo::new(Name::parse(name).unwrap(), PathBuf::from(name)),
            root_dir: dir.to_path_buf(),
            qualifier: Name::parse(name).unwrap(),
            uses: Vec::new(),
            external_include_dirs: Vec::new(),
            test_extra_uses: Vec::new(),
            test_extra_include_dirs: Vec::new(),
            build_tests: false,
            build_apps: false,
            warnings: true,
            out_dir: dir.join("_build").join(name),
        }
    }

    #[test]
    fn run_build_reports_ok_with_no_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = BuildDb::open_in_memory().unwrap();
        let tc = get_builtin("gcc").unwrap();
        let result = run_build(
            &mut db,
            &tc,
            &[],
            dir.path(),
            &BuildOptions::default(),
            &Cancellation::new(),
        )
        .unwrap();
        assert!(result.build_ok());
    }

    #[test]
    fn run_build_plans_and_reports_a_header_only_library() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("hdrlib/include")).unwrap();
        std::fs::write(dir.path().join("hdrlib/include/widget.hpp"), "").unwrap();

        let mut db = BuildDb::open_in_memory().unwrap();
        let tc = get_builtin("gcc").unwrap();
        let libs = vec![lib("hdrlib", dir.path())];
        let result = run_build(
            &mut db,
            &tc,
            &libs,
            dir.path(),
            &BuildOptions { jobs: 1, run_tests: false, tty: false },
            &Cancellation::new(),
        );
        // No real compiler is guaranteed to exist in this environment; we
        // only assert the planning half produced the expected shape.
        let result = result.unwrap_or_else(|e| panic!("run_build should plan even if exec fails: {e}"));
        assert_eq!(result.libraries.len(), 1);
        assert!(result.libraries[0].archive.is_none());
    }
}
