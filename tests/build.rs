//! Incremental build cycles against real app directories.

mod common;

use common::{age_mtime, app_with, build_path, write_source};
use pydgeot::{ChangeSet, Generator};
use std::fs;

#[test]
fn structural_dependency_change_rebuilds_dependents() {
    let (_tmp, app) = app_with(&["tmpl"]);
    let base = write_source(&app, "base.tmpl", "@partial\nheader v1");
    write_source(&app, "a.tmpl", "@depends base.tmpl\nbody of a");

    Generator::new(&app).generate().unwrap();

    let out = build_path(&app, "a.out");
    let content = fs::read_to_string(&out).unwrap();
    assert!(content.contains("header v1"));
    assert!(content.contains("body of a"));
    // A template-only source legitimately has no targets.
    assert!(app.catalog().get_targets(&base).unwrap().is_empty());

    age_mtime();
    fs::write(&base, "@partial\nheader v2").unwrap();

    let generator = Generator::new(&app);
    let changes = generator.collect_changes().unwrap();
    assert_eq!(changes.generate.len(), 1);
    assert!(changes.generate.contains(&base));
    assert!(changes.delete.is_empty());

    generator.process_changes(changes).unwrap();
    let content = fs::read_to_string(&out).unwrap();
    assert!(content.contains("header v2"));
    assert!(content.contains("body of a"));
}

#[test]
fn context_var_change_rebuilds_consumers() {
    let (_tmp, app) = app_with(&["tmpl"]);
    let producer = write_source(&app, "x.tmpl", "@set category news\nx page");
    write_source(&app, "index.tmpl", "@need category\n@get category");

    Generator::new(&app).generate().unwrap();
    assert_eq!(fs::read_to_string(build_path(&app, "index.out")).unwrap(), "news\n");

    age_mtime();
    fs::write(&producer, "@set category blog\nx page").unwrap();

    let generator = Generator::new(&app);
    let changes = generator.collect_changes().unwrap();
    assert_eq!(changes.generate.len(), 1);
    assert!(changes.generate.contains(&producer));

    generator.process_changes(changes).unwrap();
    assert_eq!(fs::read_to_string(build_path(&app, "index.out")).unwrap(), "blog\n");
    assert!(build_path(&app, "x.out").is_file());
}

#[test]
fn deleting_a_context_producer_rebuilds_consumers() {
    let (_tmp, app) = app_with(&["tmpl"]);
    let producer = write_source(&app, "x.tmpl", "@set category news\nx page");
    write_source(&app, "index.tmpl", "@need category\ncategory is @get category");

    Generator::new(&app).generate().unwrap();
    let index_out = build_path(&app, "index.out");
    assert!(fs::read_to_string(&index_out).unwrap().contains("news"));

    fs::remove_file(&producer).unwrap();
    Generator::new(&app).generate().unwrap();

    // The producer's row and target are gone, and the consumer regenerated
    // without the now-unpublished value.
    assert!(app.catalog().get_source(&producer).unwrap().is_none());
    assert!(!build_path(&app, "x.out").exists());
    let content = fs::read_to_string(&index_out).unwrap();
    assert!(!content.contains("news"));
}

#[test]
fn fallback_copies_and_deletes_with_source() {
    let (_tmp, app) = app_with(&["builtins.copy"]);
    let source = write_source(&app, "copy_me.bin", "payload");

    Generator::new(&app).generate().unwrap();

    let target = build_path(&app, "copy_me.bin");
    assert_eq!(fs::read_to_string(&target).unwrap(), "payload");
    assert_eq!(app.catalog().get_targets(&source).unwrap().len(), 1);

    fs::remove_file(&source).unwrap();
    Generator::new(&app).generate().unwrap();

    assert!(!target.exists());
    assert!(app.catalog().get_source(&source).unwrap().is_none());
}

#[test]
fn negotiation_breaks_priority_ties() {
    let (_tmp, app) = app_with(&["negotiate"]);
    let page = write_source(&app, "x.html", "<html/>");

    let selected = app.get_processor(&page).unwrap().unwrap();
    assert_eq!(selected.name(), "ProcA");
}

#[test]
fn unresolved_negotiation_is_an_error() {
    let (_tmp, app) = app_with(&["negotiate", "clash"]);
    let page = write_source(&app, "x.html", "<html/>");

    // ProcA and ProcC both claim the path and both insist during
    // negotiation.
    assert!(app.get_processor(&page).is_err());
}

#[test]
fn ignored_files_never_enter_the_catalog() {
    let (_tmp, app) = app_with(&["builtins.copy"]);
    write_source(&app, ".pydgeot.conf", r#"{"ignore": ["drafts/**"]}"#);
    let hidden = write_source(&app, "drafts/hidden.html", "wip");
    write_source(&app, "visible.html", "done");

    Generator::new(&app).generate().unwrap();

    assert!(build_path(&app, "visible.html").is_file());
    assert!(!build_path(&app, "drafts/hidden.html").exists());
    assert!(app.catalog().get_source(&hidden).unwrap().is_none());
    assert!(app
        .catalog()
        .get_sources(&app.paths().source_root, true)
        .unwrap()
        .iter()
        .all(|record| !record.path.starts_with(app.paths().source_root.join("drafts"))));
}

#[test]
fn unchanged_tree_produces_an_empty_changeset() {
    let (_tmp, app) = app_with(&["builtins.copy"]);
    write_source(&app, "a.txt", "a");
    write_source(&app, "sub/b.txt", "b");

    Generator::new(&app).generate().unwrap();
    let sources = app.catalog().get_sources(&app.paths().source_root, true).unwrap();

    let changes = Generator::new(&app).collect_changes().unwrap();
    assert_eq!(changes, ChangeSet::default());

    // A second full run is a no-op and leaves the catalog identical.
    Generator::new(&app).generate().unwrap();
    assert_eq!(
        app.catalog().get_sources(&app.paths().source_root, true).unwrap(),
        sources
    );
}

#[test]
fn quick_rewrite_within_tolerance_is_not_a_change() {
    let (_tmp, app) = app_with(&["builtins.copy"]);
    let source = write_source(&app, "a.txt", "one");

    Generator::new(&app).generate().unwrap();
    fs::write(&source, "two").unwrap();

    let changes = Generator::new(&app).collect_changes().unwrap();
    assert!(changes.generate.is_empty());
}

#[test]
fn clean_rebuilds_a_subtree_from_scratch() {
    let (_tmp, app) = app_with(&["builtins.copy"]);
    let kept = write_source(&app, "keep.txt", "keep");
    let cleaned = write_source(&app, "sub/gone.txt", "gone");

    Generator::new(&app).generate().unwrap();
    assert!(build_path(&app, "sub/gone.txt").is_file());

    app.clean(Some(&[app.paths().source_root.join("sub")])).unwrap();

    // Targets and rows under the subtree are gone, the rest is untouched.
    assert!(!build_path(&app, "sub/gone.txt").exists());
    assert!(app.catalog().get_source(&cleaned).unwrap().is_none());
    assert!(app.catalog().get_source(&kept).unwrap().is_some());
    assert!(build_path(&app, "keep.txt").is_file());

    // The untouched sources rebuild on the next cycle.
    Generator::new(&app).generate().unwrap();
    assert!(build_path(&app, "sub/gone.txt").is_file());
    assert_eq!(app.catalog().get_targets(&cleaned).unwrap().len(), 1);
}

#[test]
fn reset_wipes_build_tree_and_catalog() {
    let (_tmp, mut app) = app_with(&["builtins.copy"]);
    write_source(&app, "a.txt", "a");

    Generator::new(&app).generate().unwrap();
    assert!(build_path(&app, "a.txt").is_file());

    app.reset().unwrap();
    assert!(!app.paths().build_root.join("a.txt").exists());
    assert!(app
        .catalog()
        .get_sources(&app.paths().source_root, true)
        .unwrap()
        .is_empty());

    Generator::new(&app).generate().unwrap();
    assert!(build_path(&app, "a.txt").is_file());
}

#[test]
fn generation_complete_fires_once_per_cycle() {
    let (_tmp, app) = app_with(&["builtins.copy", "counting"]);
    write_source(&app, "a.txt", "a");

    let before = common::COMPLETIONS.load(std::sync::atomic::Ordering::SeqCst);
    Generator::new(&app).generate().unwrap();
    Generator::new(&app).generate().unwrap();
    let after = common::COMPLETIONS.load(std::sync::atomic::Ordering::SeqCst);

    assert_eq!(after - before, 2);
}

#[test]
fn per_directory_processor_selection() {
    let (_tmp, app) = app_with(&["builtins.copy", "tmpl"]);
    write_source(
        &app,
        "raw/.pydgeot.conf",
        r#"{"processors": ["CopyFallbackProcessor"]}"#,
    );
    let rendered = write_source(&app, "page.tmpl", "hello");
    let raw = write_source(&app, "raw/page.tmpl", "@partial\nnot a directive here");

    assert_eq!(app.get_processor(&rendered).unwrap().unwrap().name(), "TmplProcessor");
    assert_eq!(
        app.get_processor(&raw).unwrap().unwrap().name(),
        "CopyFallbackProcessor"
    );

    Generator::new(&app).generate().unwrap();
    assert!(build_path(&app, "page.out").is_file());
    // Copied verbatim, directives and all.
    assert_eq!(
        fs::read_to_string(build_path(&app, "raw/page.tmpl")).unwrap(),
        "@partial\nnot a directive here"
    );
}
