use std::fs;
use std::path::Path;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use symbol_index::{find_symbols, IndexError, Language, SymbolKind, SymbolQuery};
use tempfile::tempdir;

const GO_SOURCE: &str = "\
package main

type Server struct {
\taddr string
}

type Handler interface {
\tServe()
}

func (s *Server) Start() error {
\treturn nil
}

func main() {}
";

const JAVA_SOURCE: &str = "\
public class Greeter {
    public Greeter() {}

    public String greet() {
        return \"hi\";
    }
}
";

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, contents).expect("write");
}

fn names(page: &symbol_index::SymbolPage) -> Vec<(&str, SymbolKind)> {
    page.symbols
        .iter()
        .map(|symbol| (symbol.name.as_str(), symbol.kind))
        .collect()
}

#[test]
fn go_definitions_are_listed_in_line_order() {
    let dir = tempdir().expect("tempdir");
    write(dir.path(), "cmd/main.go", GO_SOURCE);

    let page = find_symbols(dir.path(), &SymbolQuery::default()).expect("scan");

    assert_eq!(page.total, 4);
    assert!(!page.truncated);
    assert_eq!(
        names(&page),
        vec![
            ("Server", SymbolKind::Struct),
            ("Handler", SymbolKind::Interface),
            ("Start", SymbolKind::Method),
            ("main", SymbolKind::Function),
        ]
    );
    let start = &page.symbols[2];
    assert_eq!((start.start_line, start.end_line), (11, 13));
    assert_eq!(start.path, dir.path().join("cmd/main.go"));
}

#[test]
fn offset_and_max_results_page_through_matches() {
    let dir = tempdir().expect("tempdir");
    write(dir.path(), "main.go", GO_SOURCE);

    let query = SymbolQuery {
        offset: 1,
        max_results: 2,
        ..SymbolQuery::default()
    };
    let page = find_symbols(dir.path(), &query).expect("scan");

    assert_eq!(page.total, 4);
    assert_eq!(page.offset, 1);
    assert!(page.truncated);
    assert_eq!(
        names(&page),
        vec![("Handler", SymbolKind::Interface), ("Start", SymbolKind::Method)]
    );
}

#[test]
fn search_is_exact_and_filters_by_kind_and_language() {
    let dir = tempdir().expect("tempdir");
    write(dir.path(), "src/Greeter.java", JAVA_SOURCE);
    write(dir.path(), "src/server.go", GO_SOURCE);

    let page = find_symbols(dir.path(), &SymbolQuery::named("Greeter")).expect("scan");
    assert_eq!(
        names(&page),
        vec![
            ("Greeter", SymbolKind::Class),
            ("Greeter", SymbolKind::Constructor),
        ]
    );

    let constructors = SymbolQuery {
        kind: Some(SymbolKind::Constructor),
        ..SymbolQuery::named("Greeter")
    };
    let page = find_symbols(dir.path(), &constructors).expect("scan");
    assert_eq!(names(&page), vec![("Greeter", SymbolKind::Constructor)]);
    assert_eq!(page.symbols[0].start_line, 2);

    let go_only = SymbolQuery {
        language: Some(Language::Go),
        ..SymbolQuery::named("greet")
    };
    assert_eq!(find_symbols(dir.path(), &go_only).expect("scan").total, 0);

    let page = find_symbols(dir.path(), &SymbolQuery::named("serve")).expect("scan");
    assert_eq!(page.total, 0);
}

#[test]
fn hidden_directories_and_unknown_extensions_are_skipped() {
    let dir = tempdir().expect("tempdir");
    write(dir.path(), ".git/hooks/hook.py", "def hidden():\n    pass\n");
    write(dir.path(), "notes.txt", "def not_code():\n");
    write(dir.path(), "tool.py", "def visible():\n    pass\n");

    let page = find_symbols(dir.path(), &SymbolQuery::default()).expect("scan");

    assert_eq!(names(&page), vec![("visible", SymbolKind::Function)]);
}

#[test]
fn a_single_file_can_be_scanned() {
    let dir = tempdir().expect("tempdir");
    write(dir.path(), "lib.rs", "pub fn alpha() {}\n\npub fn beta() {}\n");
    write(dir.path(), "other.rs", "pub fn gamma() {}\n");

    let page = find_symbols(&dir.path().join("lib.rs"), &SymbolQuery::default()).expect("scan");

    assert_eq!(
        names(&page),
        vec![("alpha", SymbolKind::Function), ("beta", SymbolKind::Function)]
    );
    assert_eq!(page.symbols[0].language, Language::Rust);
}

#[test]
fn unknown_filters_are_rejected_with_choices() {
    let error = "macro".parse::<SymbolKind>().expect_err("not a kind");
    assert_matches!(&error, IndexError::UnknownKind { .. });
    assert!(error.to_string().contains("function"));
}
