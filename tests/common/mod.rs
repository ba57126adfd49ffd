//! Shared helpers for integration tests: app scaffolding and a small
//! directive-driven template processor exercising targets, structural
//! dependencies, and context variables.

#![allow(dead_code)]

use pydgeot::{
    error::{AppError, Result},
    App, Plugin, Processor, Registry,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

/// Creates an app directory with the given `pydgeot.json` plugin list and
/// opens it against a registry extended with the test plugins.
pub fn app_with(plugins: &[&str]) -> (TempDir, App) {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("site");
    drop(App::create(&root).unwrap());

    let list: Vec<String> = plugins.iter().map(|p| format!("\"{p}\"")).collect();
    fs::write(
        root.join("pydgeot.json"),
        format!("{{\"plugins\": [{}]}}", list.join(", ")),
    )
    .unwrap();

    let mut registry = Registry::builtin();
    registry.register(Box::new(TmplPlugin));
    registry.register(Box::new(NegotiationPlugin));
    registry.register(Box::new(ClashPlugin));
    registry.register(Box::new(CountingPlugin));

    let app = App::open_with(&root, registry).unwrap();
    (tmp, app)
}

pub fn write_source(app: &App, rel: &str, content: &str) -> PathBuf {
    let path = app.paths().source_root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

pub fn build_path(app: &App, rel: &str) -> PathBuf {
    app.paths().build_root.join(rel)
}

/// Sleeps long enough for a rewritten file's stored modified time to move
/// past the change tolerance.
pub fn age_mtime() {
    std::thread::sleep(std::time::Duration::from_millis(2100));
}

struct Parsed {
    deps: Vec<String>,
    sets: Vec<(String, String)>,
    needs: Vec<String>,
    partial: bool,
    body: Vec<String>,
}

fn parse(path: &Path) -> Result<Parsed> {
    let content = fs::read_to_string(path).map_err(|err| AppError::io(err, path))?;
    let mut parsed =
        Parsed { deps: Vec::new(), sets: Vec::new(), needs: Vec::new(), partial: false, body: Vec::new() };
    for line in content.lines() {
        if let Some(dep) = line.strip_prefix("@depends ") {
            parsed.deps.push(dep.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("@set ") {
            let mut parts = rest.splitn(2, ' ');
            let name = parts.next().unwrap_or_default().to_string();
            let value = parts.next().unwrap_or_default().to_string();
            parsed.sets.push((name, value));
        } else if let Some(name) = line.strip_prefix("@need ") {
            parsed.needs.push(name.trim().to_string());
        } else if line.trim() == "@partial" {
            parsed.partial = true;
        } else {
            parsed.body.push(line.to_string());
        }
    }
    Ok(parsed)
}

fn out_path(app: &App, path: &Path) -> PathBuf {
    let rel = app.paths().to_relative(path);
    let rel = match rel.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.out"),
        None => format!("{rel}.out"),
    };
    app.paths().build_root.join(rel)
}

fn render_body(app: &App, parsed: &Parsed, out: &mut String) -> Result<()> {
    for line in &parsed.body {
        if let Some(name) = line.strip_prefix("@get ") {
            let value = app
                .catalog()
                .get_first_context_var(name.trim(), None)?
                .unwrap_or_default();
            out.push_str(&value);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    Ok(())
}

pub struct TmplPlugin;

impl Plugin for TmplPlugin {
    fn name(&self) -> &'static str {
        "tmpl"
    }

    fn processors(&self) -> Vec<Box<dyn Processor>> {
        vec![Box::new(TmplProcessor)]
    }
}

/// Renders `.tmpl` files, honoring `@depends`, `@set`, `@need`, `@get`, and
/// `@partial` directives.
pub struct TmplProcessor;

impl Processor for TmplProcessor {
    fn name(&self) -> &'static str {
        "TmplProcessor"
    }

    fn can_process(&self, _app: &App, path: &Path) -> bool {
        path.extension().map_or(false, |ext| ext == "tmpl")
    }

    fn prepare(&self, app: &App, path: &Path) -> Result<()> {
        let parsed = parse(path)?;
        let targets = if parsed.partial { Vec::new() } else { vec![out_path(app, path)] };
        app.catalog().set_targets(path, &targets)?;

        let deps: Vec<PathBuf> =
            parsed.deps.iter().map(|dep| app.paths().to_source(dep)).collect();
        app.catalog().set_dependencies(path, &deps)?;

        for (name, value) in &parsed.sets {
            app.catalog().set_context_var(path, name, value)?;
        }
        app.catalog().set_context_var_deps(path, &parsed.needs)?;
        Ok(())
    }

    fn generate(&self, app: &App, path: &Path) -> Result<()> {
        let parsed = parse(path)?;
        if parsed.partial {
            return Ok(());
        }
        let mut content = String::new();
        for dep in &parsed.deps {
            let dep_path = app.paths().to_source(dep);
            render_body(app, &parse(&dep_path)?, &mut content)?;
        }
        render_body(app, &parsed, &mut content)?;

        let target = out_path(app, path);
        pydgeot::utils::create_parent_dir_all(&target)?;
        fs::write(&target, content).map_err(|err| AppError::io(err, &target))?;
        Ok(())
    }
}

pub struct NegotiationPlugin;

impl Plugin for NegotiationPlugin {
    fn name(&self) -> &'static str {
        "negotiate"
    }

    fn processors(&self) -> Vec<Box<dyn Processor>> {
        vec![Box::new(ProcA), Box::new(ProcB)]
    }
}

/// Claims `.html` paths and wins negotiation.
pub struct ProcA;

impl Processor for ProcA {
    fn name(&self) -> &'static str {
        "ProcA"
    }

    fn can_process(&self, _app: &App, path: &Path) -> bool {
        path.extension().map_or(false, |ext| ext == "html")
    }

    fn negotiate(&self, _app: &App, _path: &Path, _contenders: &[&dyn Processor]) -> bool {
        true
    }
}

/// Claims `.html` paths but yields during negotiation.
pub struct ProcB;

impl Processor for ProcB {
    fn name(&self) -> &'static str {
        "ProcB"
    }

    fn can_process(&self, _app: &App, path: &Path) -> bool {
        path.extension().map_or(false, |ext| ext == "html")
    }
}

/// Counts completion signals across all app instances in the process.
pub static COMPLETIONS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

pub struct CountingPlugin;

impl Plugin for CountingPlugin {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn processors(&self) -> Vec<Box<dyn Processor>> {
        vec![Box::new(CountingProcessor)]
    }
}

/// Accepts nothing; only observes cycle completion.
pub struct CountingProcessor;

impl Processor for CountingProcessor {
    fn name(&self) -> &'static str {
        "CountingProcessor"
    }

    fn can_process(&self, _app: &App, _path: &Path) -> bool {
        false
    }

    fn generation_complete(&self, _app: &App) -> Result<()> {
        COMPLETIONS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

pub struct ClashPlugin;

impl Plugin for ClashPlugin {
    fn name(&self) -> &'static str {
        "clash"
    }

    fn processors(&self) -> Vec<Box<dyn Processor>> {
        vec![Box::new(ProcC)]
    }
}

/// Claims `.html` paths and refuses to yield, clashing with [`ProcA`].
pub struct ProcC;

impl Processor for ProcC {
    fn name(&self) -> &'static str {
        "ProcC"
    }

    fn can_process(&self, _app: &App, path: &Path) -> bool {
        path.extension().map_or(false, |ext| ext == "html")
    }

    fn negotiate(&self, _app: &App, _path: &Path, _contenders: &[&dyn Processor]) -> bool {
        true
    }
}
