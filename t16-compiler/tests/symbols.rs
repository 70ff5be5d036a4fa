use t16_compiler::symbols::{ArityCheck, Region, SymbolKind, SymbolTable, GLOBAL_DEPTH};
use t16_compiler::SemanticErrorKind;

// ── Helpers ──────────────────────────────────────────────────────────────

fn declare(table: &mut SymbolTable, name: &str, size: usize, ref_level: u8) -> usize {
    let id = table.lookup_or_create(name);
    let id = table
        .declare_variable(id, size, ref_level)
        .expect("declaration should succeed");
    table.get(id).offset
}

/// Enter a function: parameter scope then body scope.
fn open_function(table: &mut SymbolTable) {
    table.begin_function();
    table.enter_scope();
    table.enter_scope();
}

fn close_function(table: &mut SymbolTable) {
    table.leave_scope();
    table.leave_scope();
}

// ── Region offsets ───────────────────────────────────────────────────────

#[test]
fn global_array_anchors_its_last_cell() {
    let mut table = SymbolTable::new();
    assert_eq!(declare(&mut table, "a", 5, 0), 4);
    assert_eq!(declare(&mut table, "g", 0, 0), 5);
    assert_eq!(table.global_size(), 6);
}

#[test]
fn global_scalars_grow_upwards_around_arrays() {
    let mut table = SymbolTable::new();
    assert_eq!(declare(&mut table, "x", 0, 0), 0);
    assert_eq!(declare(&mut table, "buf", 3, 0), 3);
    assert_eq!(declare(&mut table, "y", 0, 0), 4);
    assert_eq!(declare(&mut table, "p", 0, 1), 5);
}

#[test]
fn parameters_number_in_declaration_order() {
    let mut table = SymbolTable::new();
    table.begin_function();
    table.enter_scope();
    assert_eq!(declare(&mut table, "a", 0, 0), 0);
    assert_eq!(declare(&mut table, "b", 0, 1), 1);
    assert_eq!(declare(&mut table, "c", 0, 0), 2);
    assert_eq!(table.param_count(), 3);

    let b = table.find("b").unwrap();
    let address = table.address(b);
    assert_eq!(address.region, Region::Parameter);
    assert_eq!(address.arity, 3);
    assert!(address.is_pointer());
}

#[test]
fn locals_restart_for_every_function() {
    let mut table = SymbolTable::new();

    open_function(&mut table);
    assert_eq!(declare(&mut table, "x", 0, 0), 0);
    assert_eq!(declare(&mut table, "y", 0, 0), 1);
    close_function(&mut table);

    open_function(&mut table);
    assert_eq!(declare(&mut table, "x", 0, 0), 0);
    assert_eq!(table.frame_size(), 1);
    close_function(&mut table);
}

#[test]
fn local_array_starts_at_the_current_top() {
    let mut table = SymbolTable::new();
    open_function(&mut table);
    assert_eq!(declare(&mut table, "i", 0, 0), 0);
    assert_eq!(declare(&mut table, "v", 4, 0), 1);
    assert_eq!(declare(&mut table, "j", 0, 0), 5);
    assert_eq!(table.frame_size(), 6);
}

#[test]
fn nested_blocks_reuse_cells_and_frame_keeps_the_maximum() {
    let mut table = SymbolTable::new();
    open_function(&mut table);
    assert_eq!(declare(&mut table, "a", 0, 0), 0);

    table.enter_scope();
    assert_eq!(declare(&mut table, "b", 2, 0), 1);
    table.leave_scope();

    table.enter_scope();
    assert_eq!(declare(&mut table, "c", 0, 0), 1);
    table.leave_scope();

    assert_eq!(table.frame_size(), 3);
}

// ── Shadowing and scope lifetime ─────────────────────────────────────────

#[test]
fn local_shadows_global_until_the_function_ends() {
    let mut table = SymbolTable::new();
    declare(&mut table, "x", 0, 0);
    let global = table.find("x").unwrap();

    open_function(&mut table);
    declare(&mut table, "x", 0, 0);
    let local = table.find("x").unwrap();
    assert_ne!(local, global);
    assert_eq!(table.address(local).region, Region::Local);
    close_function(&mut table);

    assert_eq!(table.find("x"), Some(global));
    assert_eq!(table.get(global).kind, SymbolKind::Variable);
    assert_eq!(table.address(global).region, Region::Global);
}

#[test]
fn leaving_a_scope_removes_exactly_its_symbols() {
    let mut table = SymbolTable::new();
    declare(&mut table, "g", 0, 0);
    open_function(&mut table);
    declare(&mut table, "outer", 0, 0);
    let before = table.live_symbols();

    for depth in 0..6 {
        table.enter_scope();
        declare(&mut table, &format!("v{depth}"), 0, 0);
        declare(&mut table, "outer", 0, 0);
    }
    for _ in 0..6 {
        table.leave_scope();
    }

    assert_eq!(table.live_symbols(), before);
    let outer = table.find("outer").unwrap();
    assert_eq!(table.get(outer).depth, 3);
    assert!(table.find("v0").is_none());
    assert!(table.find("g").is_some());
}

#[test]
fn arena_slots_are_reused_after_scope_exit() {
    let mut table = SymbolTable::new();
    open_function(&mut table);
    for round in 0..50 {
        table.enter_scope();
        declare(&mut table, &format!("tmp{round}"), 0, 0);
        table.leave_scope();
    }
    assert!(table.capacity() < 5);
}

#[test]
fn same_scope_redeclaration_is_an_error_but_still_shadows() {
    let mut table = SymbolTable::new();
    open_function(&mut table);
    declare(&mut table, "x", 0, 0);
    let first = table.find("x").unwrap();

    let err = table.declare_variable(first, 0, 0).unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::DuplicateName);
    let second = table.find("x").unwrap();
    assert_ne!(first, second);
    assert_eq!(table.get(second).offset, 1);
}

#[test]
fn duplicate_parameter_is_an_error_not_a_shadow() {
    let mut table = SymbolTable::new();
    table.begin_function();
    table.enter_scope();
    declare(&mut table, "a", 0, 0);
    let a = table.find("a").unwrap();

    let err = table.declare_variable(a, 0, 0).unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::DuplicateParameter);
    assert_eq!(table.find("a"), Some(a));
    // The argument slot is still reserved.
    assert_eq!(table.param_count(), 2);
}

#[test]
#[should_panic(expected = "internal compiler error")]
fn leaving_the_sentinel_scope_is_fatal() {
    let mut table = SymbolTable::new();
    table.leave_scope();
    table.leave_scope();
}

// ── Functions ────────────────────────────────────────────────────────────

#[test]
fn forward_call_is_promoted_to_global() {
    let mut table = SymbolTable::new();
    open_function(&mut table);
    table.enter_scope();
    let callee = table.lookup_or_create("later");
    table.use_as_function(callee).unwrap();
    table.leave_scope();
    close_function(&mut table);

    let found = table.find("later").unwrap();
    assert_eq!(found, callee);
    assert_eq!(table.get(found).kind, SymbolKind::UndefinedFunction);
    assert_eq!(table.get(found).depth, GLOBAL_DEPTH);

    table.declare_function(found, true).unwrap();
    assert_eq!(table.get(found).kind, SymbolKind::Function);
    assert!(table.leave_scope().is_empty());
}

#[test]
fn undefined_functions_are_reported_when_the_global_scope_closes() {
    let mut table = SymbolTable::new();
    for name in ["putc", "getc"] {
        let id = table.lookup_or_create(name);
        table.use_as_function(id).unwrap();
    }
    assert_eq!(table.leave_scope(), vec!["getc".to_string(), "putc".to_string()]);
}

#[test]
fn declare_function_rejects_redefinition() {
    let mut table = SymbolTable::new();
    let f = table.lookup_or_create("f");
    table.declare_function(f, false).unwrap();
    assert_eq!(table.get(f).kind, SymbolKind::VoidFunction);
    let err = table.declare_function(f, true).unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::DuplicateDefinition);

    declare(&mut table, "g", 0, 0);
    let g = table.find("g").unwrap();
    let err = table.declare_function(g, true).unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::DuplicateDefinition);
}

#[test]
fn use_site_kinds_are_distinct_errors() {
    let mut table = SymbolTable::new();
    let f = table.lookup_or_create("f");
    table.declare_function(f, true).unwrap();
    declare(&mut table, "v", 0, 0);
    let v = table.find("v").unwrap();

    table.begin_function();
    table.enter_scope();
    declare(&mut table, "p", 0, 0);
    let p = table.find("p").unwrap();
    let missing = table.lookup_or_create("missing");

    let kind = |r: Result<(), t16_compiler::SemanticError>| r.unwrap_err().kind;
    assert_eq!(
        kind(table.use_as_variable(f)),
        SemanticErrorKind::FunctionUsedAsVariable
    );
    assert_eq!(
        kind(table.use_as_variable(missing)),
        SemanticErrorKind::UndeclaredVariable
    );
    assert_eq!(
        kind(table.use_as_function(v)),
        SemanticErrorKind::VariableUsedAsFunction
    );
    assert_eq!(
        kind(table.use_as_function(p)),
        SemanticErrorKind::UnexpectedParameter
    );
    assert!(table.use_as_variable(p).is_ok());
    assert!(table.use_as_function(f).is_ok());
}

#[test]
fn parameter_chain_follows_declaration_order() {
    let mut table = SymbolTable::new();
    let f = table.lookup_or_create("f");
    table.declare_function(f, true).unwrap();
    table.begin_function();
    table.enter_scope();

    let mut prev = None;
    for name in ["x", "y", "z"] {
        let id = table.lookup_or_create(name);
        let id = table.declare_variable(id, 0, 0).unwrap();
        table.link_parameter(f, prev, id);
        prev = Some(id);
    }
    let names: Vec<_> = table
        .parameters(f)
        .into_iter()
        .map(|id| table.get(id).name.clone())
        .collect();
    assert_eq!(names, ["x", "y", "z"]);
}

#[test]
fn check_arity_memoizes_then_compares() {
    let mut table = SymbolTable::new();
    let f = table.lookup_or_create("f");
    table.use_as_function(f).unwrap();

    assert_eq!(table.check_arity(f, 2), ArityCheck::Memoized);
    for _ in 0..5 {
        assert_eq!(table.check_arity(f, 2), ArityCheck::Matched);
    }
    assert_eq!(
        table.check_arity(f, 3),
        ArityCheck::Mismatch {
            expected: 2,
            found: 3
        }
    );
    // A mismatch does not overwrite the memo.
    assert_eq!(table.check_arity(f, 2), ArityCheck::Matched);
}

#[test]
fn zero_page_overflow_is_reported_once_per_declaration() {
    let mut table = SymbolTable::new();
    declare(&mut table, "big", 250, 0);
    declare(&mut table, "edge", 6, 0);

    let id = table.lookup_or_create("over");
    let err = table.declare_variable(id, 0, 0).unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::ZeroPageOverflow);

    let id = table.lookup_or_create("worse");
    let err = table.declare_variable(id, 4, 0).unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::ZeroPageOverflow);
}
