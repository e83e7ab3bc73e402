//! Definition extraction from a parsed syntax tree.
//!
//! Each grammar maps a handful of node kinds to a [`SymbolKind`]. The
//! reported span starts at the first line of any comment or attribute block
//! sitting directly above the definition.

use tree_sitter::{Node, Tree};

use crate::language::{Language, SymbolKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Definition {
    pub kind: SymbolKind,
    pub name: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
}

pub(crate) fn definitions(language: Language, tree: &Tree, source: &str) -> Vec<Definition> {
    let bytes = source.as_bytes();
    let lines: Vec<&str> = source.lines().collect();
    let mut found = Vec::new();
    let mut pending = vec![tree.root_node()];

    while let Some(node) = pending.pop() {
        if let Some((kind, name)) = classify(language, node, bytes) {
            let first_row = leading_row(language, anchor(node).start_position().row, &lines);
            found.push(Definition {
                kind,
                name,
                start_line: first_row + 1,
                end_line: node.end_position().row + 1,
            });
        }
        let mut cursor = node.walk();
        pending.extend(node.named_children(&mut cursor));
    }

    found.sort_by(|a, b| {
        (a.start_line, a.end_line, &a.name).cmp(&(b.start_line, b.end_line, &b.name))
    });
    found
}

fn classify(language: Language, node: Node<'_>, source: &[u8]) -> Option<(SymbolKind, String)> {
    let (kind, name) = match language {
        Language::Rust => rust(node, source)?,
        Language::Python => python(node, source)?,
        Language::Go => go(node, source)?,
        Language::Java => java(node, source)?,
        Language::C | Language::Cpp => c_family(node, source)?,
        Language::Bash => match node.kind() {
            "function_definition" => (SymbolKind::Function, field_text(node, "name", source)?),
            _ => return None,
        },
    };
    (!name.is_empty()).then_some((kind, name))
}

fn rust(node: Node<'_>, source: &[u8]) -> Option<(SymbolKind, String)> {
    let kind = match node.kind() {
        "function_item" | "function_signature_item" => {
            callable_kind(node, &["impl_item", "trait_item"], &["function_item", "mod_item"])
        }
        "struct_item" | "union_item" => SymbolKind::Struct,
        "enum_item" => SymbolKind::Enum,
        "trait_item" => SymbolKind::Trait,
        "mod_item" => SymbolKind::Module,
        "type_item" => SymbolKind::Type,
        "impl_item" => {
            let target = field_text(node, "type", source)?;
            let bare = target.split('<').next().unwrap_or(&target).trim();
            return Some((SymbolKind::Impl, bare.to_string()));
        }
        _ => return None,
    };
    Some((kind, field_text(node, "name", source)?))
}

fn python(node: Node<'_>, source: &[u8]) -> Option<(SymbolKind, String)> {
    let kind = match node.kind() {
        "function_definition" => {
            callable_kind(node, &["class_definition"], &["function_definition"])
        }
        "class_definition" => SymbolKind::Class,
        _ => return None,
    };
    Some((kind, field_text(node, "name", source)?))
}

fn go(node: Node<'_>, source: &[u8]) -> Option<(SymbolKind, String)> {
    let kind = match node.kind() {
        "function_declaration" => SymbolKind::Function,
        "method_declaration" => SymbolKind::Method,
        "type_spec" => match node.child_by_field_name("type")?.kind() {
            "struct_type" => SymbolKind::Struct,
            "interface_type" => SymbolKind::Interface,
            _ => SymbolKind::Type,
        },
        "type_alias" => SymbolKind::Type,
        _ => return None,
    };
    Some((kind, field_text(node, "name", source)?))
}

fn java(node: Node<'_>, source: &[u8]) -> Option<(SymbolKind, String)> {
    let kind = match node.kind() {
        "class_declaration" => SymbolKind::Class,
        "interface_declaration" => SymbolKind::Interface,
        "enum_declaration" => SymbolKind::Enum,
        "record_declaration" => SymbolKind::Record,
        "annotation_type_declaration" => SymbolKind::Annotation,
        "method_declaration" => SymbolKind::Method,
        "constructor_declaration" => SymbolKind::Constructor,
        _ => return None,
    };
    Some((kind, field_text(node, "name", source)?))
}

fn c_family(node: Node<'_>, source: &[u8]) -> Option<(SymbolKind, String)> {
    match node.kind() {
        "function_definition" => {
            let name = declarator_name(node, source)?;
            let kind = if name.contains("::") {
                SymbolKind::Method
            } else {
                callable_kind(
                    node,
                    &["class_specifier", "struct_specifier", "union_specifier"],
                    &["function_definition", "namespace_definition"],
                )
            };
            Some((kind, name))
        }
        "struct_specifier" | "union_specifier" | "class_specifier" | "enum_specifier" => {
            // Bare `struct foo` references carry no body.
            node.child_by_field_name("body")?;
            let kind = match node.kind() {
                "class_specifier" => SymbolKind::Class,
                "enum_specifier" => SymbolKind::Enum,
                _ => SymbolKind::Struct,
            };
            Some((kind, field_text(node, "name", source)?))
        }
        "type_definition" => Some((SymbolKind::Type, declarator_name(node, source)?)),
        "namespace_definition" => Some((SymbolKind::Module, field_text(node, "name", source)?)),
        _ => None,
    }
}

/// Method when the nearest enclosing scope is a type body, function otherwise.
fn callable_kind(node: Node<'_>, containers: &[&str], barriers: &[&str]) -> SymbolKind {
    let mut current = node.parent();
    while let Some(scope) = current {
        if containers.contains(&scope.kind()) {
            return SymbolKind::Method;
        }
        if barriers.contains(&scope.kind()) {
            break;
        }
        current = scope.parent();
    }
    SymbolKind::Function
}

/// Node whose first line opens the definition, including decorators and templates.
fn anchor(node: Node<'_>) -> Node<'_> {
    match node.parent() {
        Some(parent)
            if matches!(parent.kind(), "decorated_definition" | "template_declaration") =>
        {
            parent
        }
        _ => node,
    }
}

fn leading_row(language: Language, row: usize, lines: &[&str]) -> usize {
    let prefixes = language.leading_prefixes();
    let mut first = row;
    while first > 0 {
        let above = lines.get(first - 1).map_or("", |line| line.trim_start());
        let attached = !above.is_empty()
            && !above.starts_with("#!")
            && prefixes.iter().any(|prefix| above.starts_with(prefix));
        if !attached {
            break;
        }
        first -= 1;
    }
    first
}

fn field_text(node: Node<'_>, field: &str, source: &[u8]) -> Option<String> {
    let text = node.child_by_field_name(field)?.utf8_text(source).ok()?;
    Some(text.trim().to_string())
}

/// Innermost declarator name, e.g. `make` in `int *make(int n)`.
fn declarator_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    let mut current = node.child_by_field_name("declarator")?;
    while let Some(inner) = current.child_by_field_name("declarator") {
        current = inner;
    }
    let text = current.utf8_text(source).ok()?;
    let head = text.split('(').next().unwrap_or(text);
    head.split(|c: char| c.is_whitespace() || c == '*' || c == '&')
        .filter(|part| !part.is_empty())
        .last()
        .map(str::to_string)
}
