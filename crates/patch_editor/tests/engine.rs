use std::fs;

use assert_matches::assert_matches;
use patch_editor::{
    apply_hunks, content_hash, patch_file, write_atomic, Anchor, Hunk, PatchError, PatchRequest,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[test]
fn replace_insert_and_delete_in_one_request() {
    let original = "fn main() {\n    old();\n    noise();\n}\n";
    let hunks = vec![
        Hunk::replace(Anchor::exact("old();"), "new();"),
        Hunk::insert_before(Anchor::exact("fn main"), "// entry\n"),
        Hunk::delete(Anchor::exact("    noise();\n")),
        Hunk::insert_after(Anchor::exact("}\n"), "\nfn helper() {}\n"),
    ];

    assert_eq!(
        apply_hunks(original, &hunks).expect("apply"),
        "// entry\nfn main() {\n    new();\n}\n\nfn helper() {}\n"
    );
}

#[test]
fn regex_anchor_with_three_matches_is_ambiguous_without_occurrence() {
    let original = "item = 1\nitem = 2\nitem = 3\n";
    let hunks = vec![Hunk::replace(Anchor::regex(r"item = \d"), "item = x")];

    let error = apply_hunks(original, &hunks).expect_err("ambiguous");
    assert_matches!(error, PatchError::AmbiguousAnchor { hunk: 1, matches: 3, .. });
}

#[test]
fn last_occurrence_edits_only_the_third_match() {
    let original = "item = 1\nitem = 2\nitem = 3\n";
    let hunks = vec![Hunk::replace(Anchor::regex(r"item = \d").last(), "item = x")];

    assert_eq!(
        apply_hunks(original, &hunks).expect("apply"),
        "item = 1\nitem = 2\nitem = x\n"
    );
}

#[test]
fn nth_occurrence_is_one_based_and_bounded() {
    let original = "a a a";
    let second = vec![Hunk::replace(Anchor::exact("a").nth(2), "b")];
    assert_eq!(apply_hunks(original, &second).expect("apply"), "a b a");

    let fourth = vec![Hunk::replace(Anchor::exact("a").nth(4), "b")];
    assert_matches!(
        apply_hunks(original, &fourth),
        Err(PatchError::AnchorNotFound { found: 3, .. })
    );
}

#[test]
fn missing_anchor_is_reported() {
    let hunks = vec![Hunk::delete(Anchor::exact("absent"))];
    assert_matches!(
        apply_hunks("present", &hunks),
        Err(PatchError::AnchorNotFound { hunk: 1, found: 0, .. })
    );
}

#[test]
fn hunks_resolve_against_the_original_snapshot() {
    // The second anchor only exists after the first hunk, so it must not be found.
    let hunks = vec![
        Hunk::replace(Anchor::exact("alpha"), "beta"),
        Hunk::replace(Anchor::exact("beta"), "gamma"),
    ];
    assert_matches!(
        apply_hunks("alpha", &hunks),
        Err(PatchError::AnchorNotFound { hunk: 2, .. })
    );
}

#[test]
fn invalid_regex_is_rejected() {
    let hunks = vec![Hunk::delete(Anchor::regex("(unclosed"))];
    assert_matches!(
        apply_hunks("text", &hunks),
        Err(PatchError::InvalidAnchor { hunk: 1, .. })
    );
}

#[test]
fn replace_without_content_is_rejected() {
    let hunks = vec![Hunk {
        content: None,
        ..Hunk::replace(Anchor::exact("x"), "")
    }];
    assert_matches!(
        apply_hunks("x", &hunks),
        Err(PatchError::MissingContent { hunk: 1, .. })
    );
}

#[test]
fn overlapping_hunks_are_rejected_and_file_is_untouched() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("overlap.txt");
    fs::write(&file, "abcdef\n").expect("seed");

    // "bcd" and "def" share the byte 'd'.
    let request = PatchRequest::new(vec![
        Hunk::replace(Anchor::exact("bcd"), "X"),
        Hunk::replace(Anchor::exact("def"), "Y"),
    ]);

    let error = patch_file(&file, &request).expect_err("overlap");
    assert_matches!(error, PatchError::OverlappingHunks { first: 1, second: 2 });
    assert_eq!(fs::read_to_string(&file).expect("read"), "abcdef\n");
}

#[test]
fn stale_hash_fails_and_leaves_external_edit_in_place() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("guarded.txt");
    fs::write(&file, "version one\n").expect("seed");
    let stale_hash = content_hash(b"version one\n");

    fs::write(&file, "version two\n").expect("external edit");

    let request = PatchRequest::new(vec![Hunk::replace(Anchor::exact("version"), "release")])
        .with_expected_hash(stale_hash);
    let error = patch_file(&file, &request).expect_err("precondition");

    assert_matches!(error, PatchError::PreconditionMismatch { .. });
    assert_eq!(fs::read_to_string(&file).expect("read"), "version two\n");
}

#[test]
fn matching_hash_applies_and_reports_hashes() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("guarded.txt");
    fs::write(&file, "one\ntwo\n").expect("seed");

    let request = PatchRequest::new(vec![Hunk::replace(Anchor::exact("two"), "2")])
        .with_expected_hash(content_hash(b"one\ntwo\n"));
    let outcome = patch_file(&file, &request).expect("patch");

    assert!(outcome.written);
    assert_eq!(outcome.hunks_applied, 1);
    assert_eq!(outcome.previous_hash, content_hash(b"one\ntwo\n"));
    assert_eq!(outcome.new_hash, content_hash(b"one\n2\n"));
    assert_eq!(outcome.diff.stat_line(), "+1 -1");
    assert_eq!(fs::read_to_string(&file).expect("read"), "one\n2\n");
}

#[test]
fn dry_run_returns_content_without_writing() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("preview.txt");
    fs::write(&file, "keep\n").expect("seed");

    let request =
        PatchRequest::new(vec![Hunk::insert_after(Anchor::exact("keep\n"), "more\n")]).dry_run();
    let outcome = patch_file(&file, &request).expect("dry run");

    assert!(!outcome.written);
    assert_eq!(outcome.new_content, "keep\nmore\n");
    assert!(outcome.diff.unified.contains("+more"));
    assert_eq!(fs::read_to_string(&file).expect("read"), "keep\n");
}

#[test]
fn empty_request_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("empty.txt");
    fs::write(&file, "x").expect("seed");

    assert_matches!(
        patch_file(&file, &PatchRequest::default()),
        Err(PatchError::EmptyPatch)
    );
}

#[test]
fn failed_rename_leaves_no_partial_target_or_temp_file() {
    let dir = tempdir().expect("tempdir");
    let target = dir.path().join("occupied");
    fs::create_dir(&target).expect("create dir target");
    fs::write(target.join("inner.txt"), "inner").expect("seed inner");

    let error = write_atomic(&target, b"replacement").expect_err("rename over dir fails");
    assert_matches!(error, PatchError::Io { .. });

    let entries: Vec<_> = fs::read_dir(dir.path())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("occupied")]);
    assert_eq!(
        fs::read_to_string(target.join("inner.txt")).expect("read inner"),
        "inner"
    );
}

#[cfg(unix)]
#[test]
fn atomic_write_preserves_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("script.sh");
    fs::write(&file, "#!/bin/sh\n").expect("seed");
    fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).expect("chmod");

    write_atomic(&file, b"#!/bin/sh\necho hi\n").expect("write");

    let mode = fs::metadata(&file).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn request_deserializes_from_tool_arguments() {
    let request: PatchRequest = serde_json::from_value(serde_json::json!({
        "hunks": [
            {"operation": "replace", "anchor": {"kind": "regex", "pattern": "v\\d", "occurrence": "last"}, "content": "v9"},
            {"operation": "delete", "anchor": {"pattern": "junk"}}
        ],
        "expected_hash": "abc"
    }))
    .expect("deserialize");

    assert_eq!(request.hunks.len(), 2);
    assert_eq!(request.hunks[0], Hunk::replace(Anchor::regex("v\\d").last(), "v9"));
    assert_eq!(request.hunks[1], Hunk::delete(Anchor::exact("junk")));
    assert_eq!(request.expected_hash.as_deref(), Some("abc"));
    assert!(!request.dry_run);
}
