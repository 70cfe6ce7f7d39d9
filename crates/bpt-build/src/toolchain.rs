//! Argv-template toolchain abstraction: turns a compile/archive/link
//! request into the literal argv a compiler driver expects, without
//! knowing which compiler it actually is.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Which language a source file is compiled as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    Automatic,
    C,
    Cxx,
}

/// How the compiler is asked to report header dependencies, and how the
/// resulting output is parsed back into a dependency list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepsMode {
    None,
    GnuMakefile,
    MsvcShowIncludes,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ToolchainKnobs {
    pub is_tty: bool,
}

/// Everything needed to compile one source file.
#[derive(Debug, Clone)]
pub struct CompileFileSpec {
    pub source_path: PathBuf,
    pub out_path: PathBuf,
    pub definitions: Vec<String>,
    pub include_dirs: Vec<PathBuf>,
    pub external_include_dirs: Vec<PathBuf>,
    pub lang: Language,
    pub enable_warnings: bool,
    pub syntax_only: bool,
}

impl CompileFileSpec {
    pub fn new(source_path: PathBuf, out_path: PathBuf) -> Self {
        CompileFileSpec {
            source_path,
            out_path,
            definitions: Vec::new(),
            include_dirs: Vec::new(),
            external_include_dirs: Vec::new(),
            lang: Language::Automatic,
            enable_warnings: false,
            syntax_only: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveSpec {
    pub input_files: Vec<PathBuf>,
    pub out_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LinkExeSpec {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Result of [`Toolchain::create_compile_command`]: the argv to run, plus
/// where a GNU-style depfile will land (if the toolchain's `deps_mode`
/// produces one).
#[derive(Debug, Clone)]
pub struct CompileCommandInfo {
    pub command: Vec<String>,
    pub gnu_depfile_path: Option<PathBuf>,
}

/// An immutable, freely-shared compiler description built from argv
/// templates: `<FLAGS>`/`<IN>`/`<OUT>`/`<PATH>`/`<DEF>` placeholders are
/// substituted at command-construction time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Toolchain {
    pub c_compile: Vec<String>,
    pub cxx_compile: Vec<String>,
    pub inc_template: Vec<String>,
    pub def_template: Vec<String>,
    pub link_archive: Vec<String>,
    pub link_exe: Vec<String>,
    pub warning_flags: Vec<String>,
    pub tty_flags: Vec<String>,
    pub syntax_only_flags: Vec<String>,
    pub archive_suffix: String,
    pub object_suffix: String,
    pub exe_suffix: String,
    pub deps_mode: DepsMode,
}

impl Toolchain {
    fn include_args(&self, p: &Path, cwd: &Path) -> Vec<String> {
        replace_all(&self.inc_template, "<PATH>", &shortest_path(p, cwd))
    }

    fn definition_args(&self, s: &str) -> Vec<String> {
        replace_all(&self.def_template, "<DEF>", s)
    }

    /// Builds the argv to compile one source file, deciding the language
    /// (explicit, else by extension), appending include/define/warning
    /// flags, and wiring in the toolchain's dependency-tracking mode.
    pub fn create_compile_command(
        &self,
        spec: &CompileFileSpec,
        cwd: &Path,
        knobs: ToolchainKnobs,
    ) -> CompileCommandInfo {
        let lang = match spec.lang {
            Language::Automatic => {
                match spec.source_path.extension().and_then(|e| e.to_str()) {
                    Some("c") | Some("C") => Language::C,
                    _ => Language::Cxx,
                }
            }
            other => other,
        };

        let template = if lang == Language::C { &self.c_compile } else { &self.cxx_compile };

        let mut flags = Vec::new();
        for dir in &spec.include_dirs {
            flags.extend(self.include_args(dir, cwd));
        }
        for dir in &spec.external_include_dirs {
            flags.extend(self.include_args(dir, cwd));
        }
        for def in &spec.definitions {
            flags.extend(self.definition_args(def));
        }
        if spec.enable_warnings {
            flags.extend(self.warning_flags.iter().cloned());
        }
        if knobs.is_tty {
            flags.extend(self.tty_flags.iter().cloned());
        }
        if spec.syntax_only {
            flags.extend(self.syntax_only_flags.iter().cloned());
        }

        let mut gnu_depfile_path = None;
        match self.deps_mode {
            DepsMode::GnuMakefile => {
                let mut path = spec.out_path.clone();
                let mut ext = path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default();
                ext.push_str(".d");
                path.set_extension(ext);
                flags.push("-MD".to_string());
                flags.push("-MF".to_string());
                flags.push(shortest_path(&path, cwd));
                flags.push("-MQ".to_string());
                flags.push(shortest_path(&spec.out_path, cwd));
                gnu_depfile_path = Some(path);
            }
            DepsMode::MsvcShowIncludes => {
                flags.push("/showIncludes".to_string());
            }
            DepsMode::None => {}
        }

        let mut command = Vec::with_capacity(template.len() + flags.len());
        for arg in template {
            if arg == "<FLAGS>" {
                command.extend(flags.iter().cloned());
            } else {
                let arg = arg
                    .replace("<IN>", &shortest_path(&spec.source_path, cwd))
                    .replace("<OUT>", &shortest_path(&spec.out_path, cwd));
                command.push(arg);
            }
        }
        CompileCommandInfo { command, gnu_depfile_path }
    }

    pub fn create_archive_command(&self, spec: &ArchiveSpec, cwd: &Path) -> Vec<String> {
        let mut cmd = Vec::new();
        for arg in &self.link_archive {
            if arg == "<IN>" {
                cmd.extend(spec.input_files.iter().map(|p| shortest_path(p, cwd)));
            } else {
                cmd.push(arg.replace("<OUT>", &shortest_path(&spec.out_path, cwd)));
            }
        }
        cmd
    }

    pub fn create_link_executable_command(&self, spec: &LinkExeSpec, cwd: &Path) -> Vec<String> {
        let mut cmd = Vec::new();
        for arg in &self.link_exe {
            if arg == "<IN>" {
                cmd.extend(spec.inputs.iter().map(|p| shortest_path(p, cwd)));
            } else {
                cmd.push(arg.replace("<OUT>", &shortest_path(&spec.output, cwd)));
            }
        }
        cmd
    }

    /// A deterministic content hash over every argv template and affix.
    /// Recorded alongside each build-DB row; a mismatch forces recompile.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in [
            &self.c_compile,
            &self.cxx_compile,
            &self.inc_template,
            &self.def_template,
            &self.link_archive,
            &self.link_exe,
            &self.warning_flags,
            &self.tty_flags,
            &self.syntax_only_flags,
        ] {
            for arg in part {
                hasher.update(arg.as_bytes());
                hasher.update(b"\0");
            }
            hasher.update(b"\x1e");
        }
        hasher.update(self.archive_suffix.as_bytes());
        hasher.update(self.object_suffix.as_bytes());
        hasher.update(self.exe_suffix.as_bytes());
        hasher.update(format!("{:?}", self.deps_mode).as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

fn replace_all(template: &[String], placeholder: &str, value: &str) -> Vec<String> {
    template.iter().map(|a| a.replace(placeholder, value)).collect()
}

/// The shorter of the absolute path or the path relative to `cwd`, matching
/// the spec's "shortest of absolute or cwd-relative" rule for include dirs
/// and file arguments.
fn shortest_path(p: &Path, cwd: &Path) -> String {
    let absolute = if p.is_absolute() {
        p.to_path_buf()
    } else {
        cwd.join(p)
    };
    let absolute_str = absolute.to_string_lossy().into_owned();

    let relative = pathdiff(&absolute, cwd);
    match relative {
        Some(rel) if !rel.as_os_str().is_empty() => {
            let rel_str = rel.to_string_lossy().into_owned();
            if rel_str.len() < absolute_str.len() { rel_str } else { absolute_str }
        }
        _ => absolute_str,
    }
}

/// A minimal `..`-based relative path from `base` to `target`, both assumed
/// absolute. Returns `None` if no relative path can be formed (e.g. on
/// Windows across drive letters).
fn pathdiff(target: &Path, base: &Path) -> Option<PathBuf> {
    let mut target_components = target.components();
    let mut base_components = base.components();
    let mut common = 0;
    loop {
        let t = target_components.clone().next();
        let b = base_components.clone().next();
        match (t, b) {
            (Some(t), Some(b)) if t == b => {
                target_components.next();
                base_components.next();
                common += 1;
            }
            _ => break,
        }
    }
    let _ = common;
    let mut result = PathBuf::new();
    for _ in base_components {
        result.push("..");
    }
    for comp in target_components {
        result.push(comp.as_os_str());
    }
    Some(result)
}

/// Splits a free-form shell-style flag string into argv tokens, honoring
/// single/double quotes and backslash escapes.
pub fn split_shell_string(shell: &str) -> Vec<String> {
    let mut acc = Vec::new();
    let mut token: Option<String> = None;
    let mut cur_quote: Option<char> = None;
    let mut is_escaped = false;

    for c in shell.chars() {
        if is_escaped {
            if c != '\n' {
                token.get_or_insert_with(String::new).push(c);
            }
            is_escaped = false;
        } else if c == '\\' {
            is_escaped = true;
        } else if let Some(q) = cur_quote {
            if c == q {
                cur_quote = None;
            } else {
                token.get_or_insert_with(String::new).push(c);
            }
        } else if c == '"' || c == '\'' {
            cur_quote = Some(c);
            token.get_or_insert_with(String::new);
        } else if c.is_whitespace() {
            if let Some(t) = token.take() {
                acc.push(t);
            }
        } else {
            token.get_or_insert_with(String::new).push(c);
        }
    }
    if let Some(t) = token {
        acc.push(t);
    }
    acc
}

/// Builds one of the known built-in toolchains from a short identifier like
/// `gcc`, `gcc-10`, `clang`, `msvc`, `ccache:gcc`, walking and stripping
/// known prefixes before matching the base compiler family.
pub fn get_builtin(key: &str) -> Option<Toolchain> {
    let mut s = key;
    let mut ccache = false;
    if let Some(rest) = s.strip_prefix("ccache:") {
        s = rest;
        ccache = true;
    }

    let toolchain = if s.starts_with("gcc") || s.starts_with("clang") {
        gcc_or_clang(s)?
    } else if s == "msvc" {
        msvc()
    } else {
        return None;
    };

    if ccache {
        Some(prefix_compilers_with(toolchain, "ccache"))
    } else {
        Some(toolchain)
    }
}

fn prefix_compilers_with(mut tc: Toolchain, prefix: &str) -> Toolchain {
    tc.c_compile.insert(0, prefix.to_string());
    tc.cxx_compile.insert(0, prefix.to_string());
    tc
}

fn gcc_or_clang(s: &str) -> Option<Toolchain> {
    let (c_base, cxx_base, is_gcc) =
        if s.starts_with("gcc") { ("gcc", "g++", true) } else { ("clang", "clang++", false) };

    let suffix = ["-7", "-8", "-9", "-10"].iter().find(|suf| s.ends_with(*suf)).copied().unwrap_or("");

    let c_name = format!("{c_base}{suffix}");
    if c_name != s {
        return None;
    }
    let cxx_name = format!("{cxx_base}{suffix}");

    let mut common_flags = vec![
        "<FLAGS>".to_string(),
        "-g".to_string(),
        "-fPIC".to_string(),
        "-fdiagnostics-color".to_string(),
        "-pthread".to_string(),
        "-c".to_string(),
        "-o".to_string(),
        "<OUT>".to_string(),
        "<IN>".to_string(),
    ];
    if is_gcc {
        common_flags.push("-O0".to_string());
    }

    let mut c_compile = vec![c_name.clone()];
    c_compile.extend(common_flags.iter().cloned());

    let mut cxx_compile = vec![cxx_name.clone()];
    cxx_compile.extend(common_flags);
    cxx_compile.push("-std=c++17".to_string());

    let link_exe = vec![
        cxx_name,
        "-g".to_string(),
        "-fPIC".to_string(),
        "-fdiagnostics-color".to_string(),
        "<IN>".to_string(),
        "-pthread".to_string(),
        "-lstdc++fs".to_string(),
        "-o".to_string(),
        "<OUT>".to_string(),
    ];

    Some(Toolchain {
        c_compile,
        cxx_compile,
        inc_template: vec!["-isystem".to_string(), "<PATH>".to_string()],
        def_template: vec!["-D".to_string(), "<DEF>".to_string()],
        link_archive: vec!["ar".to_string(), "rcs".to_string(), "<OUT>".to_string(), "<IN>".to_string()],
        link_exe,
        warning_flags: vec!["-Wall".to_string(), "-Wextra".to_string()],
        tty_flags: vec!["-fdiagnostics-color=always".to_string()],
        syntax_only_flags: vec!["-fsyntax-only".to_string()],
        archive_suffix: ".a".to_string(),
        object_suffix: ".o".to_string(),
        exe_suffix: String::new(),
        deps_mode: DepsMode::GnuMakefile,
    })
}

fn msvc() -> Toolchain {
    let common_flags = ["/Z7", "/O2", "/MT", "/DEBUG"];

    let mut c_compile =
        vec!["cl.exe".to_string(), "/nologo".to_string(), "<FLAGS>".to_string(), "/c".to_string(), "<IN>".to_string(), "/Fo<OUT>".to_string()];
    c_compile.extend(common_flags.iter().map(|s| s.to_string()));

    let mut cxx_compile = vec![
        "cl.exe".to_string(),
        "/nologo".to_string(),
        "<FLAGS>".to_string(),
        "/std:c++latest".to_string(),
        "/permissive-".to_string(),
        "/EHsc".to_string(),
        "/c".to_string(),
        "<IN>".to_string(),
        "/Fo<OUT>".to_string(),
    ];
    cxx_compile.extend(common_flags.iter().map(|s| s.to_string()));

    Toolchain {
        c_compile,
        cxx_compile,
        inc_template: vec!["/I<PATH>".to_string()],
        def_template: vec!["/D<DEF>".to_string()],
        link_archive: vec!["lib".to_string(), "/nologo".to_string(), "/OUT:<OUT>".to_string(), "<IN>".to_string()],
        link_exe: vec![
            "cl.exe".to_string(),
            "/nologo".to_string(),
            "/std:c++latest".to_string(),
            "/EHsc".to_string(),
            "<IN>".to_string(),
            "/Fe<OUT>".to_string(),
        ],
        warning_flags: vec!["/W4".to_string()],
        tty_flags: vec!["/diagnostics:color".to_string()],
        syntax_only_flags: vec!["/Zs".to_string()],
        archive_suffix: ".lib".to_string(),
        object_suffix: ".obj".to_string(),
        exe_suffix: ".exe".to_string(),
        deps_mode: DepsMode::MsvcShowIncludes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_shell_string_handles_quotes_and_escapes() {
        let tokens = split_shell_string(r#"-DFOO="bar baz" -I/usr/include"#);
        assert_eq!(tokens, vec!["-DFOO=bar baz", "-I/usr/include"]);
    }

    #[test]
    fn get_builtin_rejects_unknown_gcc_suffix() {
        assert!(get_builtin("gcc-99").is_none());
    }

    #[test]
    fn get_builtin_gcc10_uses_versioned_binary() {
        let tc = get_builtin("gcc-10").unwrap();
        assert_eq!(tc.c_compile[0], "gcc-10");
        assert_eq!(tc.cxx_compile[0], "g++-10");
    }

    #[test]
    fn get_builtin_strips_ccache_prefix() {
        let tc = get_builtin("ccache:clang").unwrap();
        assert_eq!(tc.c_compile[0], "ccache");
        assert_eq!(tc.c_compile[1], "clang");
    }

    #[test]
    fn get_builtin_msvc_suffixes() {
        let tc = get_builtin("msvc").unwrap();
        assert_eq!(tc.archive_suffix, ".lib");
        assert_eq!(tc.exe_suffix, ".exe");
    }

    #[test]
    fn create_compile_command_substitutes_flags_in_and_out() {
        let tc = get_builtin("gcc").unwrap();
        let mut spec = CompileFileSpec::new(PathBuf::from("src/a.cpp"), PathBuf::from("build/a.o"));
        spec.include_dirs.push(PathBuf::from("include"));
        let cwd = PathBuf::from("/work");
        let info = tc.create_compile_command(&spec, &cwd, ToolchainKnobs::default());
        assert!(info.command.contains(&"src/a.cpp".to_string()));
        assert!(info.command.contains(&"build/a.o".to_string()));
        assert!(info.command.contains(&"-isystem".to_string()));
        assert_eq!(info.gnu_depfile_path, Some(PathBuf::from("build/a.o.d")));
    }

    #[test]
    fn create_compile_command_picks_c_language_by_extension() {
        let tc = get_builtin("gcc").unwrap();
        let spec = CompileFileSpec::new(PathBuf::from("src/a.c"), PathBuf::from("build/a.o"));
        let cwd = PathBuf::from("/work");
        let info = tc.create_compile_command(&spec, &cwd, ToolchainKnobs::default());
        assert_eq!(info.command[0], "gcc");
    }

    #[test]
    fn content_hash_changes_when_flags_change() {
        let mut tc = get_builtin("gcc").unwrap();
        let h1 = tc.content_hash();
        tc.warning_flags.push("-Werror".to_string());
        let h2 = tc.content_hash();
        assert_ne!(h1, h2);
    }

    #[test]
    fn create_archive_command_expands_every_input() {
        let tc = get_builtin("gcc").unwrap();
        let spec = ArchiveSpec {
            input_files: vec![PathBuf::from("a.o"), PathBuf::from("b.o")],
            out_path: PathBuf::from("liba.a"),
        };
        let cmd = tc.create_archive_command(&spec, &PathBuf::from("/work"));
        assert!(cmd.contains(&"a.o".to_string()));
        assert!(cmd.contains(&"b.o".to_string()));
        assert!(cmd.contains(&"liba.a".to_string()));
    }

    #[test]
    fn create_compile_command_adds_tty_flags_only_when_tty() {
        let tc = get_builtin("gcc").unwrap();
        let spec = CompileFileSpec::new(PathBuf::from("src/a.cpp"), PathBuf::from("build/a.o"));
        let cwd = PathBuf::from("/work");

        let plain = tc.create_compile_command(&spec, &cwd, ToolchainKnobs { is_tty: false });
        assert!(!plain.command.iter().any(|a| a == "-fdiagnostics-color=always"));

        let tty = tc.create_compile_command(&spec, &cwd, ToolchainKnobs { is_tty: true });
        assert!(tty.command.iter().any(|a| a == "-fdiagnostics-color=always"));
    }

    #[test]
    fn create_compile_command_adds_syntax_only_flag_when_requested() {
        let tc = get_builtin("gcc").unwrap();
        let mut spec = CompileFileSpec::new(PathBuf::from("src/a.cpp"), PathBuf::from("build/a.o"));
        let cwd = PathBuf::from("/work");

        let normal = tc.create_compile_command(&spec, &cwd, ToolchainKnobs::default());
        assert!(!normal.command.iter().any(|a| a == "-fsyntax-only"));

        spec.syntax_only = true;
        let syncheck = tc.create_compile_command(&spec, &cwd, ToolchainKnobs::default());
        assert!(syncheck.command.iter().any(|a| a == "-fsyntax-only"));
    }
}
