//! End-to-end tests driving the public API the way the CLI does: build a
//! `Promise`, evaluate it against a fresh `EngineContext`, and check both
//! the returned `Outcome` and the resulting filesystem state.

use convergefs::hashdb::HashDb;
use convergefs::statsdb::StatsDb;
use convergefs::{
    combined_outcome, evaluate, Action, Attributes, CompareMethod, CopyFrom, DepthSearch,
    EngineContext, Outcome, Perms, Promise, Purge, Rename, TypeCheck,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::tempdir;

fn fresh_ctx() -> EngineContext {
    EngineContext::new(HashDb::open_in_memory().unwrap(), StatsDb::open_in_memory().unwrap())
}

fn copy_from(source: &std::path::Path, compare: CompareMethod) -> CopyFrom {
    CopyFrom {
        source: source.to_path_buf(),
        source_host: None,
        compare,
        preserve: false,
        copy_backup: false,
        link_instead: false,
        copy_links_matching: None,
    }
}

#[test]
fn missing_destination_is_created_and_converges_to_idempotent() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let dest = dir.path().join("dest");
    fs::write(&source, b"payload").unwrap();

    let promise = Promise::new(
        &dest,
        Attributes {
            create: true,
            type_check: TypeCheck::File,
            copy_from: Some(copy_from(&source, CompareMethod::Binary)),
            perms: Perms { mode: Some(0o644), ..Perms::default() },
            ..Attributes::default()
        },
    );

    let ctx = fresh_ctx();
    let first = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&first), Outcome::Change);
    assert_eq!(fs::read(&dest).unwrap(), b"payload");

    let second = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&second), Outcome::Noop);
}

#[test]
fn checksum_compare_converges_once_hashdb_has_seen_a_same_size_match() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let dest = dir.path().join("dest");
    // Same length, different bytes, so the size short-circuit never fires
    // and every comparison actually exercises the checksum path.
    fs::write(&source, b"aaaa").unwrap();
    fs::write(&dest, b"bbbb").unwrap();

    let promise = Promise::new(
        &dest,
        Attributes {
            copy_from: Some(copy_from(&source, CompareMethod::Checksum)),
            perms: Perms { mode: Some(0o644), ..Perms::default() },
            ..Attributes::default()
        },
    );

    let ctx = fresh_ctx();
    let first = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&first), Outcome::Change);
    assert_eq!(fs::read(&dest).unwrap(), b"aaaa");

    let second = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&second), Outcome::Noop);
}

#[test]
fn stale_checksum_triggers_restore() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let dest = dir.path().join("dest");
    fs::write(&source, b"authoritative").unwrap();
    fs::write(&dest, b"drifted").unwrap();

    let promise = Promise::new(
        &dest,
        Attributes {
            copy_from: Some(copy_from(&source, CompareMethod::Checksum)),
            perms: Perms { mode: Some(0o644), ..Perms::default() },
            ..Attributes::default()
        },
    );

    let ctx = fresh_ctx();
    let reports = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&reports), Outcome::Change);
    assert_eq!(fs::read(&dest).unwrap(), b"authoritative");
}

#[test]
fn warn_action_reports_divergence_without_mutating() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let dest = dir.path().join("dest");
    fs::write(&source, b"new content").unwrap();
    fs::write(&dest, b"old content").unwrap();

    let promise = Promise::new(
        &dest,
        Attributes {
            action: Action::Warn,
            copy_from: Some(copy_from(&source, CompareMethod::Binary)),
            ..Attributes::default()
        },
    );

    let ctx = fresh_ctx();
    let reports = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&reports), Outcome::Warn);
    assert_eq!(fs::read(&dest).unwrap(), b"old content");
}

#[test]
fn hard_link_topology_is_preserved_across_two_promisers() {
    let dir = tempdir().unwrap();
    let source_a = dir.path().join("source_a");
    let source_b = dir.path().join("source_b_hardlink");
    fs::write(&source_a, b"shared payload").unwrap();
    fs::hard_link(&source_a, &source_b).unwrap();

    let dest_a = dir.path().join("dest_a");
    let dest_b = dir.path().join("dest_b");

    let ctx = fresh_ctx();

    let promise_a = Promise::new(
        &dest_a,
        Attributes {
            create: true,
            copy_from: Some(copy_from(&source_a, CompareMethod::Binary)),
            ..Attributes::default()
        },
    );
    let promise_b = Promise::new(
        &dest_b,
        Attributes {
            create: true,
            copy_from: Some(copy_from(&source_b, CompareMethod::Binary)),
            ..Attributes::default()
        },
    );

    evaluate(&promise_a, &ctx).unwrap();
    evaluate(&promise_b, &ctx).unwrap();

    assert_eq!(fs::read(&dest_b).unwrap(), b"shared payload");
    use std::os::unix::fs::MetadataExt;
    assert_eq!(fs::metadata(&dest_a).unwrap().ino(), fs::metadata(&dest_b).unwrap().ino());
}

#[test]
fn rename_rotate_shifts_the_promiser_into_its_first_backup_slot() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("log");
    fs::write(&dest, b"current").unwrap();
    fs::write(dir.path().join("log.0"), b"was-0").unwrap();

    let promise = Promise::new(&dest, Attributes { rename: Rename::Rotate { levels: 2 }, ..Attributes::default() });

    let ctx = fresh_ctx();
    let reports = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&reports), Outcome::Change);

    assert!(!dest.exists());
    assert_eq!(fs::read(dir.path().join("log.0")).unwrap(), b"current");
    assert_eq!(fs::read(dir.path().join("log.1")).unwrap(), b"was-0");
}

#[test]
fn depth_search_recurses_and_reconciles_attributes_on_every_leaf() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("tree");
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("a"), b"a").unwrap();
    fs::write(root.join("sub/b"), b"b").unwrap();
    fs::set_permissions(root.join("a"), fs::Permissions::from_mode(0o644)).unwrap();
    fs::set_permissions(root.join("sub/b"), fs::Permissions::from_mode(0o644)).unwrap();

    let promise = Promise::new(
        &root,
        Attributes {
            type_check: TypeCheck::Directory,
            perms: Perms { mode: Some(0o700), ..Perms::default() },
            depth_search: Some(DepthSearch {
                recurse: true,
                max_depth: None,
                include_dirs: vec![],
                exclude_dirs: vec![],
                traverse_links: false,
                xdev: false,
            }),
            ..Attributes::default()
        },
    );

    let ctx = fresh_ctx();
    let reports = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&reports), Outcome::Change);

    assert_eq!(fs::metadata(root.join("a")).unwrap().permissions().mode() & 0o777, 0o700);
    assert_eq!(fs::metadata(root.join("sub/b")).unwrap().permissions().mode() & 0o777, 0o700);
}

#[test]
fn purge_removes_stale_destination_entries_once_authenticated_gates_pass() {
    let dir = tempdir().unwrap();
    let source_root = dir.path().join("source");
    let dest_root = dir.path().join("dest_root_long_enough");
    fs::create_dir_all(&source_root).unwrap();
    fs::create_dir_all(&dest_root).unwrap();
    fs::write(source_root.join("keep"), b"keep").unwrap();
    fs::write(dest_root.join("keep"), b"keep").unwrap();
    fs::write(dest_root.join("stale"), b"stale").unwrap();

    let promise = Promise::new(
        &dest_root,
        Attributes {
            type_check: TypeCheck::Directory,
            copy_from: Some(copy_from(&source_root, CompareMethod::Exists)),
            purge: Some(Purge { enabled: true, authenticated_remote: true }),
            ..Attributes::default()
        },
    );

    let ctx = fresh_ctx();
    let reports = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&reports), Outcome::Change);
    assert!(!dest_root.join("stale").exists());
    assert!(dest_root.join("keep").exists());
}

#[test]
fn recursive_copy_preserves_hardlink_topology_across_a_directory_tree() {
    let dir = tempdir().unwrap();
    let source_root = dir.path().join("source_tree");
    let dest_root = dir.path().join("dest_tree");
    fs::create_dir_all(source_root.join("sub")).unwrap();
    fs::write(source_root.join("x"), b"shared payload").unwrap();
    fs::hard_link(source_root.join("x"), source_root.join("sub/y")).unwrap();
    fs::write(source_root.join("standalone"), b"not linked").unwrap();

    let promise = Promise::new(
        &dest_root,
        Attributes {
            create: true,
            type_check: TypeCheck::Directory,
            copy_from: Some(copy_from(&source_root, CompareMethod::Binary)),
            depth_search: Some(DepthSearch {
                recurse: true,
                max_depth: None,
                include_dirs: vec![],
                exclude_dirs: vec![],
                traverse_links: false,
                xdev: false,
            }),
            ..Attributes::default()
        },
    );

    let ctx = fresh_ctx();
    let first = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&first), Outcome::Change);

    assert_eq!(fs::read(dest_root.join("x")).unwrap(), b"shared payload");
    assert_eq!(fs::read(dest_root.join("sub/y")).unwrap(), b"shared payload");
    assert_eq!(fs::read(dest_root.join("standalone")).unwrap(), b"not linked");

    use std::os::unix::fs::MetadataExt;
    assert_eq!(fs::metadata(dest_root.join("x")).unwrap().ino(), fs::metadata(dest_root.join("sub/y")).unwrap().ino());

    let second = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&second), Outcome::Noop);
}

#[test]
fn disable_rename_moves_promiser_aside_with_restrictive_mode() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("config");
    fs::write(&dest, b"secret").unwrap();
    fs::set_permissions(&dest, fs::Permissions::from_mode(0o644)).unwrap();

    let promise = Promise::new(&dest, Attributes { rename: Rename::Disable, ..Attributes::default() });

    let ctx = fresh_ctx();
    let reports = evaluate(&promise, &ctx).unwrap();
    assert_eq!(combined_outcome(&reports), Outcome::Change);
    assert!(!dest.exists());
    let disabled = dir.path().join("config.cfdisabled");
    assert!(disabled.exists());
    assert_eq!(fs::metadata(&disabled).unwrap().permissions().mode() & 0o777, 0o600);
}
