//! Build planner (§4.4): turns a set of libraries (root project plus
//! materialized dependencies) into an arena of compile/archive/link nodes.
//! `Plans` owns every node; cross-references are `PlanId`-style indices
//! (`CompileId`/`ArchiveId`/`LinkId`) rather than shared pointers, replacing
//! the original's shared-pointer graph (Design Note 1).
//!
//! Grounded on `original_source/src/dds/build/plan/library.cpp`'s
//! `library_plan::create()`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use bpt_types::{LibraryInfo, Name};
use thiserror::Error;

use crate::db::BuildDbError;
use crate::source::{self, SourceKind};
use crate::toolchain::{CompileFileSpec, Toolchain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompileId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchiveId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(usize);

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("directory scan failed: {0}")]
    Scan(#[from] BuildDbError),
    #[error("cyclic library usage: {0}")]
    Cyclic(String),
    #[error("library '{0}' uses unknown library '{1}'")]
    UnknownUse(Name, Name),
}

#[derive(Debug, Clone)]
pub struct CompileRules {
    pub include_dirs: Vec<PathBuf>,
    pub external_include_dirs: Vec<PathBuf>,
    pub defines: Vec<String>,
    pub uses: Vec<Name>,
    pub enable_warnings: bool,
    pub syntax_only: bool,
}

#[derive(Debug, Clone)]
pub struct CompilePlan {
    pub source: PathBuf,
    pub output: PathBuf,
    pub qualifier: Name,
    pub rules: CompileRules,
}

impl CompilePlan {
    /// The toolchain-agnostic compile request this node describes. Syntax-
    /// only (header-independence) plans still name the real header as
    /// `source` — `Toolchain::create_compile_command` is responsible for
    /// generating the `.syncheck` shim that actually gets compiled.
    pub fn to_spec(&self) -> CompileFileSpec {
        let mut spec = CompileFileSpec::new(self.source.clone(), self.output.clone());
        spec.include_dirs = self.rules.include_dirs.clone();
        spec.external_include_dirs = self.rules.external_include_dirs.clone();
        spec.enable_warnings = self.rules.enable_warnings;
        spec.syntax_only = self.rules.syntax_only;
        spec
    }
}

#[derive(Debug, Clone)]
pub struct ArchivePlan {
    pub output: PathBuf,
    pub inputs: Vec<CompileId>,
    pub qualifier: Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    App,
    Test,
}

#[derive(Debug, Clone)]
pub struct LinkExePlan {
    pub main: CompileId,
    /// This library's own archive (if any) followed by the transitive,
    /// deduplicated archives of everything it `uses`, in the order they
    /// were first reached.
    pub library_inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub kind: LinkKind,
}

#[derive(Debug, Clone)]
pub struct LibraryPlan {
    pub name: Name,
    pub archive: Option<ArchiveId>,
    pub links: Vec<LinkId>,
    pub header_checks: Vec<CompileId>,
    pub uses: Vec<Name>,
}

/// Owns every plan node produced by a planning run.
#[derive(Debug, Default)]
pub struct Plans {
    compiles: Vec<CompilePlan>,
    archives: Vec<ArchivePlan>,
    links: Vec<LinkExePlan>,
}

impl Plans {
    pub fn compile(&self, id: CompileId) -> &CompilePlan {
        &self.compiles[id.0]
    }
    pub fn archive(&self, id: ArchiveId) -> &ArchivePlan {
        &self.archives[id.0]
    }
    pub fn link(&self, id: LinkId) -> &LinkExePlan {
        &self.links[id.0]
    }
    pub fn compile_ids(&self) -> impl Iterator<Item = CompileId> {
        (0..self.compiles.len()).map(CompileId)
    }
    pub fn archive_ids(&self) -> impl Iterator<Item = ArchiveId> {
        (0..self.archives.len()).map(ArchiveId)
    }
    pub fn link_ids(&self) -> impl Iterator<Item = LinkId> {
        (0..self.links.len()).map(LinkId)
    }

    fn push_compile(&mut self, plan: CompilePlan) -> CompileId {
        self.compiles.push(plan);
        CompileId(self.compiles.len() - 1)
    }

    /// Inserts a single adhoc compile node outside of [`plan_libraries`] —
    /// used by `bpt compile-file`, which has no library context at all.
    pub fn push_adhoc_compile(&mut self, plan: CompilePlan) -> CompileId {
        self.push_compile(plan)
    }
    fn push_archive(&mut self, plan: ArchivePlan) -> ArchiveId {
        self.archives.push(plan);
        ArchiveId(self.archives.len() - 1)
    }
    fn push_link(&mut self, plan: LinkExePlan) -> LinkId {
        self.links.push(plan);
        LinkId(self.links.len() - 1)
    }
}

/// One library to plan, already resolved down to concrete directories and a
/// flattened usage-requirements view. Callers (the `bpt build` command) are
/// responsible for ordering `libs` so that every name a library `uses`
/// appears earlier in the slice — the planner does not re-derive topological
/// order, only consumes it.
pub struct LibraryBuildInput {
    pub info: LibraryInfo,
    /// Directory containing `info.path`.
    pub root_dir: PathBuf,
    /// The name this library's plan nodes and archive/object paths are
    /// keyed under (distinct from `info.name` when a package vendors more
    /// than one copy of the same library name under different subtrees).
    pub qualifier: Name,
    /// `info.intra_uses` plus every cross-package dependency's used
    /// libraries, already validated to exist.
    pub uses: Vec<Name>,
    /// Transitive external include dirs contributed by `uses`.
    pub external_include_dirs: Vec<PathBuf>,
    /// `info.intra_test_uses` plus test-only cross-package dependencies.
    pub test_extra_uses: Vec<Name>,
    pub test_extra_include_dirs: Vec<PathBuf>,
    pub build_tests: bool,
    pub build_apps: bool,
    pub warnings: bool,
    pub out_dir: PathBuf,
}

struct BuiltLibrary {
    archive_path: Option<PathBuf>,
    /// This library's own archive (if any) plus the transitive closure of
    /// everything it uses, deduplicated, in first-reached order.
    link_inputs: Vec<PathBuf>,
}

fn flatten_link_inputs(
    owner: &Name,
    own_archive: Option<&Path>,
    uses: &[Name],
    built: &HashMap<Name, BuiltLibrary>,
) -> Result<Vec<PathBuf>, PlanError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    if let Some(p) = own_archive {
        if seen.insert(p.to_path_buf()) {
            out.push(p.to_path_buf());
        }
    }
    for name in uses {
        let built_lib = built
            .get(name)
            .ok_or_else(|| PlanError::UnknownUse(owner.clone(), name.clone()))?;
        for p in &built_lib.link_inputs {
            if seen.insert(p.clone()) {
                out.push(p.clone());
            }
        }
    }
    Ok(out)
}

fn object_path(out_dir: &Path, rel: &Path, suffix: &str) -> PathBuf {
    out_dir.join(rel).with_extension(suffix.trim_start_matches('.'))
}

/// Plans every library in `libs`, in order. Dependencies must already
/// appear in `Plans`/`built` by the time a dependent is processed — callers
/// pass `libs` in dependency-first (reverse topological over `uses`) order.
pub fn plan_libraries(
    db: &mut crate::db::BuildDb,
    toolchain: &Toolchain,
    libs: &[LibraryBuildInput],
) -> Result<(Plans, Vec<LibraryPlan>), PlanError> {
    let mut plans = Plans::default();
    let mut built: HashMap<Name, BuiltLibrary> = HashMap::new();
    let mut results = Vec::new();

    for lib in libs {
        let lib_root = lib.root_dir.join(&lib.info.path);
        let include_root = lib_root.join("include");
        let src_root = lib_root.join("src");

        let mut include_dirs = Vec::new();
        let mut header_files = Vec::new();
        if include_root.is_dir() {
            include_dirs.push(include_root.clone());
            let rels = db.scan_dir(&include_root)?;
            header_files = source::classify_public_headers(&rels);
        }
        let mut private_files = Vec::new();
        if src_root.is_dir() {
            include_dirs.push(src_root.clone());
            let rels = db.scan_dir(&src_root)?;
            private_files = source::classify_private_sources(&rels);
        }

        let mut lib_sources = Vec::new();
        let mut test_sources = Vec::new();
        let mut app_sources = Vec::new();
        for f in &private_files {
            match f.kind {
                SourceKind::Source => lib_sources.push(f.path.clone()),
                SourceKind::Test => test_sources.push(f.path.clone()),
                SourceKind::App => app_sources.push(f.path.clone()),
                SourceKind::Header => {}
            }
        }

        let mut uses = lib.info.intra_uses.iter().cloned().collect::<Vec<_>>();
        for n in &lib.uses {
            if !uses.contains(n) {
                uses.push(n.clone());
            }
        }

        let base_rules = |syntax_only: bool| CompileRules {
            include_dirs: include_dirs.clone(),
            external_include_dirs: lib.external_include_dirs.clone(),
            defines: Vec::new(),
            uses: uses.clone(),
            enable_warnings: lib.warnings,
            syntax_only,
        };

        let mut lib_compile_ids = Vec::new();
        for rel in &lib_sources {
            let id = plans.push_compile(CompilePlan {
                source: src_root.join(rel),
                output: object_path(&lib.out_dir, rel, &toolchain.object_suffix),
                qualifier: lib.qualifier.clone(),
                rules: base_rules(false),
            });
            lib_compile_ids.push(id);
        }

        let archive = if !lib_compile_ids.is_empty() {
            let archive_out =
                lib.out_dir.join(format!("lib{}{}", lib.qualifier.as_str(), toolchain.archive_suffix));
            Some(plans.push_archive(ArchivePlan {
                output: archive_out,
                inputs: lib_compile_ids.clone(),
                qualifier: lib.qualifier.clone(),
            }))
        } else {
            None
        };
        let archive_path = archive.map(|id| plans.archive(id).output.clone());

        let mut header_checks = Vec::new();
        for h in &header_files {
            let mut rules = base_rules(true);
            rules.include_dirs.push(include_root.clone());
            let syncheck_out = lib.out_dir.join("syncheck").join(h.path.with_extension(
                format!("syncheck{}", toolchain.object_suffix),
            ));
            let id = plans.push_compile(CompilePlan {
                source: include_root.join(&h.path),
                output: syncheck_out,
                qualifier: lib.qualifier.clone(),
                rules,
            });
            header_checks.push(id);
        }

        let link_inputs = flatten_link_inputs(&lib.qualifier, archive_path.as_deref(), &uses, &built)?;

        let mut links = Vec::new();
        if lib.build_apps {
            for rel in &app_sources {
                let obj = object_path(&lib.out_dir.join("app"), rel, &toolchain.object_suffix);
                let main_id = plans.push_compile(CompilePlan {
                    source: src_root.join(rel),
                    output: obj,
                    qualifier: lib.qualifier.clone(),
                    rules: base_rules(false),
                });
                let exe_name = rel.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                let exe_out = lib.out_dir.join(format!("{exe_name}{}", toolchain.exe_suffix));
                links.push(plans.push_link(LinkExePlan {
                    main: main_id,
                    library_inputs: link_inputs.clone(),
                    output: exe_out,
                    kind: LinkKind::App,
                }));
            }
        }

        if lib.build_tests {
            let mut test_uses = uses.clone();
            for n in lib.info.intra_test_uses.iter().chain(lib.test_extra_uses.iter()) {
                if !test_uses.contains(n) {
                    test_uses.push(n.clone());
                }
            }
            let test_include_dirs = {
                let mut v = include_dirs.clone();
                v.extend(lib.test_extra_include_dirs.iter().cloned());
                v
            };
            let test_link_inputs =
                flatten_link_inputs(&lib.qualifier, archive_path.as_deref(), &test_uses, &built)?;

            for rel in &test_sources {
                let obj = object_path(&lib.out_dir.join("test"), rel, &toolchain.object_suffix);
                let mut rules = base_rules(false);
                rules.include_dirs = test_include_dirs.clone();
                rules.uses = test_uses.clone();
                let mut external = lib.external_include_dirs.clone();
                external.extend(lib.test_extra_include_dirs.iter().cloned());
                rules.external_include_dirs = external;
                let main_id = plans.push_compile(CompilePlan {
                    source: src_root.join(rel),
                    output: obj,
                    qualifier: lib.qualifier.clone(),
                    rules,
                });
                let exe_name = rel.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                let exe_out = lib.out_dir.join("test").join(format!("{exe_name}{}", toolchain.exe_suffix));
                links.push(plans.push_link(LinkExePlan {
                    main: main_id,
                    library_inputs: test_link_inputs.clone(),
                    output: exe_out,
                    kind: LinkKind::Test,
                }));
            }
        }

        built.insert(
            lib.qualifier.clone(),
            BuiltLibrary { archive_path, link_inputs: link_inputs.clone() },
        );

        results.push(LibraryPlan {
            name: lib.qualifier.clone(),
            archive,
            links,
            header_checks,
            uses,
        });
    }

    Ok((plans, results))
}

/// Depth-first search for a cycle in the `intra_uses`/`intra_test_uses`
/// graph of a single package's libraries. Returns the cycle (library names,
/// first name repeated at the end) if one exists.
pub fn find_cycle(libraries: &[LibraryInfo]) -> Option<Vec<Name>> {
    let by_name: HashMap<&Name, &LibraryInfo> = libraries.iter().map(|l| (&l.name, l)).collect();
    let mut visiting: HashSet<Name> = HashSet::new();
    let mut visited: HashSet<Name> = HashSet::new();
    let mut stack: Vec<Name> = Vec::new();

    fn visit(
        name: &Name,
        by_name: &HashMap<&Name, &LibraryInfo>,
        visiting: &mut HashSet<Name>,
        visited: &mut HashSet<Name>,
        stack: &mut Vec<Name>,
    ) -> Option<Vec<Name>> {
        if visited.contains(name) {
            return None;
        }
        if visiting.contains(name) {
            let pos = stack.iter().position(|n| n == name).unwrap_or(0);
            let mut cycle = stack[pos..].to_vec();
            cycle.push(name.clone());
            return Some(cycle);
        }
        visiting.insert(name.clone());
        stack.push(name.clone());
        if let Some(lib) = by_name.get(name) {
            for next in lib.intra_uses.iter().chain(lib.intra_test_uses.iter()) {
                if let Some(cycle) = visit(next, by_name, visiting, visited, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        visiting.remove(name);
        visited.insert(name.clone());
        None
    }

    for lib in libraries {
        if let Some(cycle) = visit(&lib.name, &by_name, &mut visiting, &mut visited, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::BuildDb;
    use crate::toolchain::get_builtin;
    use bpt_types::Name;

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn lib(name: &str, dir: &Path) -> LibraryBuildInput {
        LibraryBuildInput {
            info: LibraryInfo::new(n(name), PathBuf::from(name)),
            root_dir: dir.to_path_buf(),
            qualifier: n(name),
            uses: Vec::new(),
            external_include_dirs: Vec::new(),
            test_extra_uses: Vec::new(),
            test_extra_include_dirs: Vec::new(),
            build_tests: true,
            build_apps: true,
            warnings: true,
            out_dir: dir.join("_build").join(name),
        }
    }

    #[test]
    fn library_with_only_sources_gets_an_archive_and_no_links() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("mylib/src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("widget.cpp"), "").unwrap();

        let mut db = BuildDb::open_in_memory().unwrap();
        let tc = get_builtin("gcc").unwrap();
        let libs = vec![lib("mylib", dir.path())];
        let (plans, results) = plan_libraries(&mut db, &tc, &libs).unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].archive.is_some());
        assert!(results[0].links.is_empty());
        assert_eq!(plans.compile_ids().count(), 1);
    }

    #[test]
    fn header_only_library_produces_no_archive() {
        let dir = tempfile::tempdir().unwrap();
        let inc = dir.path().join("hdrlib/include");
        std::fs::create_dir_all(&inc).unwrap();
        std::fs::write(inc.join("widget.hpp"), "").unwrap();

        let mut db = BuildDb::open_in_memory().unwrap();
        let tc = get_builtin("gcc").unwrap();
        let libs = vec![lib("hdrlib", dir.path())];
        let (_, results) = plan_libraries(&mut db, &tc, &libs).unwrap();

        assert!(results[0].archive.is_none());
        assert_eq!(results[0].header_checks.len(), 1);
    }

    #[test]
    fn test_and_app_sources_each_become_a_link_plan() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("mylib/src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("widget.cpp"), "").unwrap();
        std::fs::write(src.join("widget.test.cpp"), "").unwrap();
        std::fs::write(src.join("tool.main.cpp"), "").unwrap();

        let mut db = BuildDb::open_in_memory().unwrap();
        let tc = get_builtin("gcc").unwrap();
        let libs = vec![lib("mylib", dir.path())];
        let (plans, results) = plan_libraries(&mut db, &tc, &libs).unwrap();

        assert_eq!(results[0].links.len(), 2);
        for link_id in &results[0].links {
            let link = plans.link(*link_id);
            assert_eq!(link.library_inputs.len(), 1); // just this library's own archive
        }
    }

    #[test]
    fn a_dependent_library_links_its_used_archive() {
        let dir = tempfile::tempdir().unwrap();
        let base_src = dir.path().join("base/src");
        std::fs::create_dir_all(&base_src).unwrap();
        std::fs::write(base_src.join("base.cpp"), "").unwrap();

        let app_src = dir.path().join("app/src");
        std::fs::create_dir_all(&app_src).unwrap();
        std::fs::write(app_src.join("thing.main.cpp"), "").unwrap();

        let mut db = BuildDb::open_in_memory().unwrap();
        let tc = get_builtin("gcc").unwrap();
        let mut base_lib = lib("base", dir.path());
        base_lib.build_tests = false;
        base_lib.build_apps = false;
        let mut app_lib = lib("app", dir.path());
        app_lib.uses = vec![n("base")];
        app_lib.build_tests = false;

        let (plans, results) = plan_libraries(&mut db, &tc, &[base_lib, app_lib]).unwrap();
        let app_plan = &results[1];
        assert_eq!(app_plan.links.len(), 1);
        let link = plans.link(app_plan.links[0]);
        assert_eq!(link.library_inputs.len(), 2); // app's own archive + base's archive
    }

    #[test]
    fn detects_an_intra_package_cycle() {
        let mut a = LibraryInfo::new(n("a"), PathBuf::from("a"));
        a.intra_uses.insert(n("b"));
        let mut b = LibraryInfo::new(n("b"), PathBuf::from("b"));
        b.intra_uses.insert(n("a"));
        let cycle = find_cycle(&[a, b]);
        assert!(cycle.is_some());
    }

    #[test]
    fn no_cycle_when_uses_graph_is_acyclic() {
        let mut a = LibraryInfo::new(n("a"), PathBuf::from("a"));
        a.intra_uses.insert(n("b"));
        let b = LibraryInfo::new(n("b"), PathBuf::from("b"));
        assert!(find_cycle(&[a, b]).is_none());
    }
}
