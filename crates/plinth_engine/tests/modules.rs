//! Module resolution, navigation and scripted pipelines on disk.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use plinth_common::module_name;
use plinth_engine::{
    DeclareContext, EngineError, EngineResult, MakeOptions, MakeReport, ModuleImpl, ModuleSource,
    Session, SessionOptions, Staleness, TargetSpec,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Creates `root/rel` with a description file named after the module.
fn module_dir(root: &Path, rel: &str, description: &str) -> PathBuf {
    let dir = root.join(rel);
    fs::create_dir_all(&dir).unwrap();
    let name = module_name(&dir).unwrap().to_string();
    fs::write(dir.join(format!("{name}.toml")), description).unwrap();
    dir
}

fn pin(path: &Path, secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

fn make_all(s: &mut Session, dir: &Path) -> MakeReport {
    let module = s.resolve(dir).unwrap();
    let mut report = MakeReport::default();
    for id in s.select_targets(module, &[]).unwrap() {
        report.absorb(s.make(id, MakeOptions::default()).unwrap());
    }
    report
}

// ---------------------------------------------------------------------------
// Resolution and navigation
// ---------------------------------------------------------------------------

#[test]
fn scenario_parent_chain_and_codename() {
    let tmp = tempfile::tempdir().unwrap();
    let r = module_dir(tmp.path(), "R", "[R]\nroot = true\n");
    let m = module_dir(tmp.path(), "R/M", "[M]\n");

    let mut s = Session::new(SessionOptions::default());
    let child = s.resolve(&m).unwrap();
    let root = s.resolve(&r).unwrap();

    assert_eq!(s.get_parent(child).unwrap(), root);
    assert_eq!(s.root_of(child), root);
    assert_eq!(s.enumerate_pipeline(child), vec![root, child]);
    assert_eq!(s.codename_pipeline(child), "R-M");
    assert!(matches!(
        s.get_parent(root),
        Err(EngineError::NoParent { .. })
    ));
    assert!(matches!(s.module(child).source(), ModuleSource::Local(_)));
}

#[test]
fn resolving_twice_returns_the_same_module() {
    let tmp = tempfile::tempdir().unwrap();
    let r = module_dir(tmp.path(), "R", "[R]\nroot = true\n");
    let mut s = Session::new(SessionOptions::default());
    let first = s.resolve(&r).unwrap();
    let second = s.resolve(r.join(".")).unwrap();
    assert_eq!(first, second);
    assert_eq!(s.module_ids().count(), 1);
}

#[test]
fn codename_override() {
    let tmp = tempfile::tempdir().unwrap();
    module_dir(tmp.path(), "Root.main", "[Main]\nroot = true\ncodename = \"top\"\n");
    let m = module_dir(tmp.path(), "Root.main/Split.v2", "[Split]\n");
    let mut s = Session::new(SessionOptions::default());
    let id = s.resolve(&m).unwrap();
    assert_eq!(s.codename_pipeline(id), "top-Split.v2");
}

#[test]
fn find_ancestor_by_base_name_and_suffix() {
    let tmp = tempfile::tempdir().unwrap();
    let data = module_dir(tmp.path(), "Data.v2", "[Data]\nroot = true\n");
    let sub = module_dir(tmp.path(), "Data.v2/Sub", "[Sub]\n");
    let mut s = Session::new(SessionOptions::default());
    let sub_id = s.resolve(&sub).unwrap();
    let data_id = s.resolve(&data).unwrap();

    assert_eq!(s.find_ancestor(sub_id, "Sub"), Some(sub_id));
    assert_eq!(s.find_ancestor(sub_id, "Data.v2"), Some(data_id));
    assert_eq!(s.find_ancestor(sub_id, ".v2"), Some(data_id));
    assert_eq!(s.find_ancestor(sub_id, "Data"), None);
    assert_eq!(s.find_ancestor(sub_id, "v2"), None);
    assert_eq!(s.find_ancestor(sub_id, "Nope"), None);
}

#[test]
fn find_ancestor_skips_module_sharing_the_stem() {
    let tmp = tempfile::tempdir().unwrap();
    module_dir(tmp.path(), "Root", "[Root]\nroot = true\n");
    let data = module_dir(tmp.path(), "Root/Data", "[Data]\n");
    let versioned = module_dir(tmp.path(), "Root/Data/Data.v2", "[Data]\n");
    let mut s = Session::new(SessionOptions::default());
    let versioned_id = s.resolve(&versioned).unwrap();
    let data_id = s.resolve(&data).unwrap();

    assert_ne!(data_id, versioned_id);
    assert_eq!(s.find_ancestor(versioned_id, "Data"), Some(data_id));
    assert_eq!(s.find_ancestor(versioned_id, ".v2"), Some(versioned_id));
}

#[test]
fn find_ancestor_matches_last_suffix_only() {
    let tmp = tempfile::tempdir().unwrap();
    let top = module_dir(tmp.path(), "X.b.c", "[X]\nroot = true\n");
    let leaf = module_dir(tmp.path(), "X.b.c/Leaf", "[Leaf]\n");
    let mut s = Session::new(SessionOptions::default());
    let leaf_id = s.resolve(&leaf).unwrap();
    let top_id = s.resolve(&top).unwrap();

    assert_eq!(s.find_ancestor(leaf_id, ".c"), Some(top_id));
    assert_eq!(s.find_ancestor(leaf_id, "X.b.c"), Some(top_id));
    assert_eq!(s.find_ancestor(leaf_id, ".b.c"), None);
}

#[test]
fn scenario_primary_names_deduplicate() {
    let tmp = tempfile::tempdir().unwrap();
    let d = module_dir(
        tmp.path(),
        "D",
        r#"
        [D]
        root = true
        [D.targets.x]
        path = "x.json"
        format = "json"
        [D.targets."x:trn"]
        path = "x_trn.json"
        format = "json"
        [D.targets."x:val"]
        path = "x_val.json"
        format = "json"
        [D.targets.y]
        path = "y.txt"
        format = "text"
        "#,
    );
    let mut s = Session::new(SessionOptions::default());
    let id = s.resolve(&d).unwrap();
    assert_eq!(s.module(id).primary_names(), vec!["x", "y"]);

    assert_eq!(s.select_targets(id, &["x".to_string()]).unwrap().len(), 3);
    assert_eq!(
        s.select_targets(id, &["x:trn".to_string()]).unwrap(),
        vec![s.module(id).target("x:trn").unwrap()]
    );
    assert!(matches!(
        s.select_targets(id, &["z".to_string()]),
        Err(EngineError::UnknownTarget { .. })
    ));

    let json: Vec<&str> = s.targets_by_kind(id, "json").into_iter().map(|(n, _)| n).collect();
    assert_eq!(json, vec!["x", "x:trn", "x:val"]);
    assert_eq!(s.targets_by_kind(id, "text").len(), 1);

    let ignore = fs::read_to_string(d.join(".gitignore")).unwrap();
    assert_eq!(ignore, "x.json\nx_trn.json\nx_val.json\ny.txt\n");
}

#[test]
fn unresolvable_parent_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let orphan = module_dir(tmp.path(), "Orphan", "[Orphan]\n");
    let mut s = Session::new(SessionOptions::default());
    let err = s.resolve(&orphan).unwrap_err();
    assert!(matches!(err, EngineError::ModuleResolution { .. }));
    assert_eq!(s.module_ids().count(), 0);
}

#[test]
fn source_space_and_catalog_extension() {
    struct Echo;

    impl ModuleImpl for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        fn is_root(&self) -> bool {
            true
        }

        fn declare_targets(&self, cx: &mut DeclareContext<'_>) -> EngineResult<()> {
            cx.declare_exported("said", TargetSpec::new("said.txt"))?;
            Ok(())
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let space = tmp.path().join("space");
    fs::create_dir_all(space.join("lib")).unwrap();
    fs::write(space.join("lib").join("Shared.toml"), "[Module]\nroot = true\n").unwrap();
    let shared = tmp.path().join("Shared.a");
    let echo = tmp.path().join("Echo");
    fs::create_dir_all(&shared).unwrap();
    fs::create_dir_all(&echo).unwrap();

    let mut s = Session::new(SessionOptions {
        source_space: Some(space.clone()),
        ..SessionOptions::default()
    });
    s.catalog_mut().register("Echo", || Rc::new(Echo));

    let shared_id = s.resolve(&shared).unwrap();
    assert!(matches!(s.module(shared_id).source(), ModuleSource::SourceSpace(_)));
    let echo_id = s.resolve(&echo).unwrap();
    assert_eq!(
        s.module(echo_id).source(),
        &ModuleSource::Builtin("Echo".to_string())
    );
    let said = s.module(echo_id).target("said").unwrap();
    assert!(s.target(said).location().ends_with("Echo/said.txt"));
}

// ---------------------------------------------------------------------------
// Declaration errors
// ---------------------------------------------------------------------------

#[test]
fn local_cycle_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = module_dir(
        tmp.path(),
        "Cyc",
        r#"
        [Cyc]
        root = true
        [Cyc.targets.a]
        path = "a"
        depends = { x = "b" }
        [Cyc.targets.b]
        path = "b"
        depends = { y = "a" }
        "#,
    );
    let mut s = Session::new(SessionOptions::default());
    match s.resolve(&dir).unwrap_err() {
        EngineError::DependencyCycle { members, .. } => assert_eq!(members, vec!["a", "b"]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(s.module_at(&dir), None);
    assert_eq!(s.target_count(), 0);
}

#[test]
fn unknown_local_reference() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = module_dir(
        tmp.path(),
        "Bad",
        "[Bad]\nroot = true\n[Bad.targets.a]\npath = \"a\"\ndepends = { x = \"ghost\" }\n",
    );
    let mut s = Session::new(SessionOptions::default());
    assert!(matches!(
        s.resolve(&dir),
        Err(EngineError::UnknownTarget { name, .. }) if name == "ghost"
    ));
}

#[test]
fn local_data_requires_pattern() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("LocalData");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("config.toml"), "other = 1\n").unwrap();
    let mut s = Session::new(SessionOptions::default());
    assert!(matches!(
        s.resolve(&dir),
        Err(EngineError::Declaration { .. })
    ));
}

// ---------------------------------------------------------------------------
// Scripted pipelines
// ---------------------------------------------------------------------------

const COUNT: &str = r#"
[Count.targets.total]
path = "total.txt"
command = "cat {a} {b} > {out}"
hint = "1"
depends = { a = { parent = "a" }, b = { parent = "b" } }

[Count.each_parent]
path = "{stem}.count"
format = "text"
command = "wc -l < {src} > {out}"
"#;

fn data_pipeline(root: &Path) -> (PathBuf, PathBuf) {
    let data = root.join("LocalData.raw");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("config.toml"), "pattern = \"*.csv\"\n").unwrap();
    fs::write(data.join("a.csv"), "1\n2\n").unwrap();
    fs::write(data.join("b.csv"), "3\n").unwrap();
    let count = module_dir(root, "LocalData.raw/Count", COUNT);
    (data, count)
}

#[test]
fn command_pipeline_builds_then_rests() {
    let tmp = tempfile::tempdir().unwrap();
    let (data, count) = data_pipeline(tmp.path());
    let mut s = Session::new(SessionOptions::default());

    let first = make_all(&mut s, &count);
    assert_eq!(first.made.len(), 3);
    assert!(count.join("a.count").exists());
    assert!(count.join("b.count").exists());
    assert_eq!(fs::read_to_string(count.join("total.txt")).unwrap(), "1\n2\n3\n");

    let second = make_all(&mut s, &count);
    assert!(second.made.is_empty());

    let data_id = s.resolve(&data).unwrap();
    assert_eq!(s.module(data_id).primary_names(), vec!["a", "b"]);
    assert_eq!(
        fs::read_to_string(data.join(".gitignore")).unwrap(),
        "a.csv\nb.csv\n"
    );
    assert_eq!(
        fs::read_to_string(count.join(".gitignore")).unwrap(),
        "total.txt\na.count\nb.count\n"
    );
}

#[test]
fn command_pipeline_rebuilds_only_stale_branch() {
    let tmp = tempfile::tempdir().unwrap();
    let (data, count) = data_pipeline(tmp.path());
    let mut s = Session::new(SessionOptions::default());
    make_all(&mut s, &count);

    pin(&data.join("a.csv"), 1_000);
    pin(&data.join("b.csv"), 1_000);
    pin(&count.join("a.count"), 500);
    pin(&count.join("b.count"), 2_000);
    pin(&count.join("total.txt"), 3_000);

    let report = make_all(&mut s, &count);
    assert_eq!(report.made.len(), 1);
    assert!(s.target(report.made[0]).location().ends_with("a.count"));
}

#[test]
fn failing_command_is_a_maker_error() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = module_dir(
        tmp.path(),
        "Fail",
        "[Fail]\nroot = true\n[Fail.targets.out]\npath = \"out\"\ncommand = \"exit 7\"\n",
    );
    let mut s = Session::new(SessionOptions::default());
    let id = s.resolve(&dir).unwrap();
    let out = s.module(id).target("out").unwrap();
    let err = s.make(out, MakeOptions::default()).unwrap_err();
    assert!(matches!(err, EngineError::Maker { .. }));
    assert!(err.to_string().contains("status 7"));
}

#[test]
fn ancestor_and_file_references() {
    let tmp = tempfile::tempdir().unwrap();
    module_dir(
        tmp.path(),
        "Data.v1",
        "[Data]\nroot = true\n[Data.targets.rows]\npath = \"rows.csv\"\n",
    );
    module_dir(tmp.path(), "Data.v1/Mid", "[Mid]\n");
    let leaf = module_dir(
        tmp.path(),
        "Data.v1/Mid/Leaf",
        r#"
        [Leaf.targets.report]
        path = "report.json"
        format = "json"
        depends = { rows = { ancestor = ".v1", target = "rows" }, cfg = { file = "config.toml", format = "toml" } }
        "#,
    );
    let mut s = Session::new(SessionOptions::default());
    let id = s.resolve(&leaf).unwrap();
    let report = s.module(id).target("report").unwrap();
    let deps = s.target(report).dependencies().clone();
    assert!(s.target(deps["rows"]).location().ends_with("Data.v1/rows.csv"));
    assert_eq!(s.target(deps["cfg"]).kind(), "toml");
    assert_eq!(s.target(report).depth(), 1);
}

#[test]
fn module_source_tracking_makes_targets_stale() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = module_dir(
        tmp.path(),
        "Gen",
        "[Gen]\nroot = true\n[Gen.targets.out]\npath = \"out.txt\"\ncommand = \"echo hi > {out}\"\n",
    );
    let mut s = Session::new(SessionOptions {
        track_module_source: true,
        ..SessionOptions::default()
    });
    let id = s.resolve(&dir).unwrap();
    let out = s.module(id).target("out").unwrap();
    assert!(s.target(out).dependency("__module_source__").is_some());

    pin(&dir.join("Gen.toml"), 100);
    s.make(out, MakeOptions::default()).unwrap();
    assert!(s.is_up_to_date(out).unwrap());

    pin(&dir.join("out.txt"), 100);
    pin(&dir.join("Gen.toml"), 200);
    assert_eq!(
        s.staleness(out).unwrap(),
        Staleness::OlderThan("__module_source__".to_string())
    );
}
