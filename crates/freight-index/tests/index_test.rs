//! Index behavior over real workspaces: ownership, DAG traversal, cycle
//! detection, persistence.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use freight_artifact::Strategy;
use freight_cache::LocalCache;
use freight_index::{Index, IndexError, IndexStatus};

struct Workspace {
    _dir: tempfile::TempDir,
    root: PathBuf,
    cache: LocalCache,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let cache = LocalCache::new(root.join(".freight/cache")).unwrap();
    Workspace {
        _dir: dir,
        root,
        cache,
    }
}

fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A three-stage pipeline: A produces a.out, B turns it into b.out, C
/// turns that into c.out. Output files are pre-created as if the stage
/// commands had already run.
fn linear_pipeline(ws: &Workspace) {
    write_file(&ws.root, "a.out", "output of A\n");
    write_file(&ws.root, "b.out", "output of B\n");
    write_file(&ws.root, "c.out", "output of C\n");
    write_file(&ws.root, "A.yaml", "Command: make a.out\nOutputs:\n  a.out: {}\n");
    write_file(
        &ws.root,
        "B.yaml",
        "Command: make b.out\nDependencies:\n  a.out: {}\nOutputs:\n  b.out: {}\n",
    );
    write_file(
        &ws.root,
        "C.yaml",
        "Command: make c.out\nDependencies:\n  b.out: {}\nOutputs:\n  c.out: {}\n",
    );
}

fn add(idx: &mut Index, ws: &Workspace, paths: &[&str]) {
    idx.add_stages_from_paths(&ws.root, paths.iter().copied())
        .unwrap();
}

// ---------------------------------------------------------------
// Adding stages
// ---------------------------------------------------------------

#[test]
fn add_new_stage() {
    let ws = workspace();
    write_file(&ws.root, "train.yaml", "Command: train\nOutputs:\n  model.bin: {}\n");
    let mut idx = Index::new();
    add(&mut idx, &ws, &["train.yaml"]);
    assert!(idx.get("train.yaml").is_some());
    assert!(!idx.get("train.yaml").unwrap().is_locked);
}

#[test]
fn add_already_indexed_stage_errors() {
    let ws = workspace();
    write_file(&ws.root, "train.yaml", "Command: train\nOutputs:\n  model.bin: {}\n");
    let mut idx = Index::new();
    add(&mut idx, &ws, &["train.yaml"]);
    let err = idx
        .add_stages_from_paths(&ws.root, ["train.yaml"])
        .unwrap_err();
    assert!(matches!(err, IndexError::AlreadyIndexed(_)));
}

#[test]
fn add_lock_file_errors() {
    let ws = workspace();
    write_file(&ws.root, "train.yaml.lock", "Command: train\n");
    let mut idx = Index::new();
    let err = idx
        .add_stages_from_paths(&ws.root, ["train.yaml.lock"])
        .unwrap_err();
    assert!(matches!(err, IndexError::IsLockFile(_)));
}

#[test]
fn add_invalid_stage_errors() {
    let ws = workspace();
    let mut idx = Index::new();
    let err = idx
        .add_stages_from_paths(&ws.root, ["missing.yaml"])
        .unwrap_err();
    assert!(matches!(err, IndexError::Stage(_)));
}

#[test]
fn ownership_conflict_names_both_stages() {
    let ws = workspace();
    write_file(&ws.root, "a.yaml", "WorkingDir: sub\nOutputs:\n  foo.bin: {}\n");
    write_file(&ws.root, "b.yaml", "Outputs:\n  sub/foo.bin: {}\n");

    let mut idx = Index::new();
    add(&mut idx, &ws, &["a.yaml"]);
    let err = idx.add_stages_from_paths(&ws.root, ["b.yaml"]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "add stage b.yaml: artifact sub/foo.bin is already owned by a.yaml"
    );
}

#[test]
fn remove_drops_the_entry_only() {
    let ws = workspace();
    write_file(&ws.root, "train.yaml", "Command: train\nOutputs:\n  model.bin: {}\n");
    let mut idx = Index::new();
    add(&mut idx, &ws, &["train.yaml"]);

    idx.remove("train.yaml").unwrap();
    assert!(idx.is_empty());
    // The manifest itself is untouched.
    assert!(ws.root.join("train.yaml").exists());
}

// ---------------------------------------------------------------
// Status traversal
// ---------------------------------------------------------------

#[test]
fn status_walks_the_dependency_chain() {
    let ws = workspace();
    linear_pipeline(&ws);
    let mut idx = Index::new();
    add(&mut idx, &ws, &["A.yaml", "B.yaml", "C.yaml"]);

    let mut out = IndexStatus::new();
    let mut in_progress = HashSet::new();
    idx.status("C.yaml", &ws.cache, &ws.root, &mut out, &mut in_progress)
        .unwrap();

    // C pulls in B which pulls in A.
    assert_eq!(out.len(), 3);
    assert_eq!(out["A.yaml"]["a.out"].to_string(), "uncommitted");
    assert_eq!(out["C.yaml"]["c.out"].to_string(), "uncommitted");
}

#[test]
fn status_detects_cycles() {
    let ws = workspace();
    write_file(
        &ws.root,
        "X.yaml",
        "Dependencies:\n  y: {}\nOutputs:\n  x: {}\n",
    );
    write_file(
        &ws.root,
        "Y.yaml",
        "Dependencies:\n  x: {}\nOutputs:\n  y: {}\n",
    );
    let mut idx = Index::new();
    add(&mut idx, &ws, &["X.yaml", "Y.yaml"]);

    let mut out = IndexStatus::new();
    let mut in_progress = HashSet::new();
    let err = idx
        .status("X.yaml", &ws.cache, &ws.root, &mut out, &mut in_progress)
        .unwrap_err();
    assert!(matches!(err, IndexError::Cycle(_)));
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn status_of_unknown_stage_errors() {
    let ws = workspace();
    let mut idx = Index::new();
    let mut out = IndexStatus::new();
    let mut in_progress = HashSet::new();
    let err = idx
        .status("ghost.yaml", &ws.cache, &ws.root, &mut out, &mut in_progress)
        .unwrap_err();
    assert!(matches!(err, IndexError::UnknownStage(_)));
}

// ---------------------------------------------------------------
// Commit traversal
// ---------------------------------------------------------------

#[test]
fn commit_orders_dependencies_before_dependents() {
    let ws = workspace();
    linear_pipeline(&ws);
    let mut idx = Index::new();
    add(&mut idx, &ws, &["A.yaml", "B.yaml", "C.yaml"]);

    let mut committed = Vec::new();
    let mut in_progress = HashSet::new();
    idx.commit(
        "C.yaml",
        &ws.cache,
        &ws.root,
        Strategy::Link,
        &mut committed,
        &mut in_progress,
    )
    .unwrap();

    assert_eq!(committed, ["A.yaml", "B.yaml", "C.yaml"]);
    for stage in ["A.yaml", "B.yaml", "C.yaml"] {
        assert!(ws.root.join(format!("{stage}.lock")).is_file());
        assert!(idx.get(stage).unwrap().is_locked);
    }

    // B's dependency record carries A's committed output checksum.
    let b = &idx.get("B.yaml").unwrap().stage;
    assert_eq!(
        b.dependencies["a.out"].checksum,
        freight_digest::checksum_bytes(b"output of A\n")
    );
}

#[test]
fn commit_then_status_is_up_to_date() {
    let ws = workspace();
    linear_pipeline(&ws);
    let mut idx = Index::new();
    add(&mut idx, &ws, &["A.yaml", "B.yaml", "C.yaml"]);

    let mut committed = Vec::new();
    idx.commit(
        "C.yaml",
        &ws.cache,
        &ws.root,
        Strategy::Link,
        &mut committed,
        &mut HashSet::new(),
    )
    .unwrap();

    let mut out = IndexStatus::new();
    idx.status("C.yaml", &ws.cache, &ws.root, &mut out, &mut HashSet::new())
        .unwrap();
    for stage_status in out.values() {
        for art_status in stage_status.values() {
            assert!(art_status.contents_match);
            assert_eq!(art_status.to_string(), "up-to-date");
        }
    }
}

#[test]
fn commit_visits_a_diamond_once_per_stage() {
    let ws = workspace();
    write_file(&ws.root, "d.out", "base data\n");
    write_file(&ws.root, "b.out", "left\n");
    write_file(&ws.root, "c.out", "right\n");
    write_file(&ws.root, "a.out", "joined\n");
    write_file(&ws.root, "D.yaml", "Outputs:\n  d.out: {}\n");
    write_file(
        &ws.root,
        "B.yaml",
        "Dependencies:\n  d.out: {}\nOutputs:\n  b.out: {}\n",
    );
    write_file(
        &ws.root,
        "C.yaml",
        "Dependencies:\n  d.out: {}\nOutputs:\n  c.out: {}\n",
    );
    write_file(
        &ws.root,
        "A.yaml",
        "Dependencies:\n  b.out: {}\n  c.out: {}\nOutputs:\n  a.out: {}\n",
    );

    let mut idx = Index::new();
    add(&mut idx, &ws, &["D.yaml", "B.yaml", "C.yaml", "A.yaml"]);

    let mut committed = Vec::new();
    idx.commit(
        "A.yaml",
        &ws.cache,
        &ws.root,
        Strategy::Link,
        &mut committed,
        &mut HashSet::new(),
    )
    .unwrap();

    assert_eq!(committed, ["D.yaml", "B.yaml", "C.yaml", "A.yaml"]);
}

#[test]
fn commit_detects_cycles() {
    let ws = workspace();
    write_file(&ws.root, "x", "x\n");
    write_file(&ws.root, "y", "y\n");
    write_file(
        &ws.root,
        "X.yaml",
        "Dependencies:\n  y: {}\nOutputs:\n  x: {}\n",
    );
    write_file(
        &ws.root,
        "Y.yaml",
        "Dependencies:\n  x: {}\nOutputs:\n  y: {}\n",
    );
    let mut idx = Index::new();
    add(&mut idx, &ws, &["X.yaml", "Y.yaml"]);

    let err = idx
        .commit(
            "X.yaml",
            &ws.cache,
            &ws.root,
            Strategy::Link,
            &mut Vec::new(),
            &mut HashSet::new(),
        )
        .unwrap_err();
    assert!(err.to_string().contains("cycle"));
}

// ---------------------------------------------------------------
// Checkout traversal
// ---------------------------------------------------------------

#[test]
fn checkout_restores_a_committed_pipeline() {
    let ws = workspace();
    linear_pipeline(&ws);
    let mut idx = Index::new();
    add(&mut idx, &ws, &["A.yaml", "B.yaml", "C.yaml"]);

    idx.commit(
        "C.yaml",
        &ws.cache,
        &ws.root,
        Strategy::Copy,
        &mut Vec::new(),
        &mut HashSet::new(),
    )
    .unwrap();

    for rel in ["a.out", "b.out", "c.out"] {
        fs::remove_file(ws.root.join(rel)).unwrap();
    }

    let mut done = Vec::new();
    idx.checkout(
        "C.yaml",
        &ws.cache,
        &ws.root,
        Strategy::Copy,
        &mut done,
        &mut HashSet::new(),
    )
    .unwrap();

    assert_eq!(done, ["A.yaml", "B.yaml", "C.yaml"]);
    assert_eq!(fs::read(ws.root.join("a.out")).unwrap(), b"output of A\n");
    assert_eq!(fs::read(ws.root.join("b.out")).unwrap(), b"output of B\n");
    assert_eq!(fs::read(ws.root.join("c.out")).unwrap(), b"output of C\n");
}

#[test]
fn checkout_skips_matching_artifacts() {
    let ws = workspace();
    linear_pipeline(&ws);
    let mut idx = Index::new();
    add(&mut idx, &ws, &["A.yaml", "B.yaml", "C.yaml"]);
    idx.commit(
        "C.yaml",
        &ws.cache,
        &ws.root,
        Strategy::Copy,
        &mut Vec::new(),
        &mut HashSet::new(),
    )
    .unwrap();

    // Nothing was removed, so checkout finds every artifact in place.
    idx.checkout(
        "C.yaml",
        &ws.cache,
        &ws.root,
        Strategy::Copy,
        &mut Vec::new(),
        &mut HashSet::new(),
    )
    .unwrap();
}

// ---------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------

#[test]
fn save_and_load_roundtrip() {
    let ws = workspace();
    linear_pipeline(&ws);
    let mut idx = Index::new();
    add(&mut idx, &ws, &["A.yaml", "B.yaml", "C.yaml"]);
    idx.commit(
        "B.yaml",
        &ws.cache,
        &ws.root,
        Strategy::Link,
        &mut Vec::new(),
        &mut HashSet::new(),
    )
    .unwrap();

    let index_path = ws.root.join(".freight/index");
    idx.save(&index_path).unwrap();

    let loaded = Index::load(&index_path).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(
        loaded.get("B.yaml").unwrap().stage,
        idx.get("B.yaml").unwrap().stage
    );
    assert!(loaded.get("B.yaml").unwrap().is_locked);
}

#[test]
fn load_missing_index_is_empty() {
    let ws = workspace();
    let idx = Index::load(&ws.root.join(".freight/index")).unwrap();
    assert!(idx.is_empty());
}
