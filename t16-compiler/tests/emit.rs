use t16_compiler::backend::{AsmItem, TargetKind};
use t16_compiler::emit::{BinOp, Emitter, Label, Op};
use t16_compiler::symbols::Address;
use t16_compiler::SemanticErrorKind;

// ── Helpers ──────────────────────────────────────────────────────────────

fn trace_emitter() -> Emitter {
    let mut emitter = Emitter::new(TargetKind::Trace);
    emitter.begin_program();
    emitter
}

fn trace_lines(emitter: &Emitter) -> Vec<String> {
    emitter
        .items()
        .iter()
        .filter_map(|item| match item {
            AsmItem::Trace(line) => Some(line.clone()),
            _ => None,
        })
        .collect()
}

fn last_line(emitter: &Emitter) -> String {
    trace_lines(emitter).pop().unwrap_or_default()
}

// ── Labels ───────────────────────────────────────────────────────────────

#[test]
fn labels_are_unique_and_increasing() {
    let mut emitter = trace_emitter();
    let labels: Vec<Label> = (0..5).map(|_| emitter.new_label()).collect();
    assert_eq!(labels, [Label(0), Label(1), Label(2), Label(3), Label(4)]);
    assert_eq!(emitter.labels_used(), 5);
    assert_eq!(Label(7).to_string(), "L7");
}

#[test]
fn backend_labels_share_the_counter() {
    let mut emitter = Emitter::new(TargetKind::T16);
    emitter.begin_program();
    let first = emitter.new_label();
    emitter.emit(Op::LoadImmediate(1)).unwrap();
    emitter.emit(Op::LoadImmediate(2)).unwrap();
    emitter.emit(Op::Binary(BinOp::Lt)).unwrap();
    let after = emitter.new_label();
    assert_eq!(first, Label(0));
    assert_eq!(after, Label(2));
}

// ── Loop stacks ──────────────────────────────────────────────────────────

#[test]
fn break_without_a_loop_is_an_error_and_emits_nothing() {
    let mut emitter = trace_emitter();
    let before = emitter.items().len();
    let err = emitter.emit_break().unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::NoLoopOpen);
    let err = emitter.emit_continue().unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::NoLoopOpen);
    assert_eq!(emitter.items().len(), before);
}

#[test]
fn break_and_continue_target_the_innermost_loop() {
    let mut emitter = trace_emitter();
    let (outer_break, outer_continue) = (emitter.new_label(), emitter.new_label());
    let (inner_break, inner_continue) = (emitter.new_label(), emitter.new_label());

    emitter.enter_loop(outer_break, outer_continue);
    emitter.enter_loop(inner_break, inner_continue);
    assert_eq!(emitter.loop_depth(), 2);

    emitter.emit_break().unwrap();
    assert_eq!(last_line(&emitter), format!("JMP {inner_break}"));
    emitter.emit_continue().unwrap();
    assert_eq!(last_line(&emitter), format!("JMP {inner_continue}"));

    emitter.leave_loop();
    emitter.emit_break().unwrap();
    assert_eq!(last_line(&emitter), format!("JMP {outer_break}"));
    emitter.emit_continue().unwrap();
    assert_eq!(last_line(&emitter), format!("JMP {outer_continue}"));

    emitter.leave_loop();
    assert_eq!(emitter.loop_depth(), 0);
}

#[test]
#[should_panic(expected = "internal compiler error")]
fn leaving_a_loop_that_was_never_entered_is_fatal() {
    let mut emitter = trace_emitter();
    emitter.leave_loop();
}

// ── Frame fixups ─────────────────────────────────────────────────────────

#[test]
fn entry_placeholder_is_resolved_after_the_body() {
    let mut emitter = trace_emitter();
    let fixup = emitter.entry("f");
    assert_eq!(emitter.fixups().pending().count(), 1);
    let placeholder = emitter.fixups().get(fixup).label;
    assert!(trace_lines(&emitter).contains(&format!("ENTRY {placeholder}")));

    emitter.emit(Op::LoadImmediate(0)).unwrap();
    emitter.fix_entry(fixup, 3);

    assert_eq!(emitter.fixups().pending().count(), 0);
    assert_eq!(emitter.fixups().get(fixup).value, Some(3));
    let define = emitter.items().iter().find_map(|item| match item {
        AsmItem::Define { name, value } => Some((name.clone(), *value)),
        _ => None,
    });
    assert_eq!(define, Some((placeholder.to_string(), 3)));
}

#[test]
#[should_panic(expected = "internal compiler error")]
fn resolving_a_fixup_twice_is_fatal() {
    let mut emitter = trace_emitter();
    let fixup = emitter.entry("f");
    emitter.fix_entry(fixup, 1);
    emitter.fix_entry(fixup, 2);
}

#[test]
#[should_panic(expected = "never resolved")]
fn ending_with_a_pending_fixup_is_fatal() {
    let mut emitter = trace_emitter();
    emitter.entry("f");
    emitter.end_program();
}

#[test]
fn end_program_closes_the_listing() {
    let mut emitter = trace_emitter();
    let fixup = emitter.entry("main");
    emitter
        .emit(Op::Return {
            has_value: false,
            is_main: true,
        })
        .unwrap();
    emitter.fix_entry(fixup, 0);
    let listing = emitter.end_program();
    let lines = listing.lines();
    assert_eq!(lines.first().map(String::as_str), Some("  BEGIN"));
    assert_eq!(lines.last().map(String::as_str), Some("  END"));
    assert!(lines.contains(&"main:".to_string()));
    assert!(lines.contains(&"  RET main".to_string()));
}

// ── Calls ────────────────────────────────────────────────────────────────

#[test]
fn call_cleans_arguments_then_fetches_the_result() {
    let mut emitter = trace_emitter();
    emitter.emit(Op::LoadImmediate(1)).unwrap();
    emitter.emit(Op::LoadImmediate(2)).unwrap();
    emitter.call("add", 2, true).unwrap();
    let lines = trace_lines(&emitter);
    assert_eq!(
        &lines[lines.len() - 4..],
        ["CALL add 2", "DROPARG", "DROPARG", "RESULT"]
    );
    assert!(!emitter.take_void());
}

#[test]
fn void_call_loads_no_result() {
    let mut emitter = trace_emitter();
    emitter.call("foo", 0, false).unwrap();
    assert_eq!(last_line(&emitter), "CALL foo 0");
    assert!(emitter.take_void());
    // The mark is consumed.
    assert!(!emitter.take_void());
}

#[test]
fn consuming_a_void_result_is_an_error() {
    let mut emitter = trace_emitter();
    emitter.call("foo", 0, false).unwrap();
    let err = emitter
        .emit(Op::Store(t16_compiler::emit::StoreTarget::Direct(
            Address::global(0),
        )))
        .unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::VoidValueUsed);

}

#[test]
fn void_result_below_a_later_value_is_still_caught() {
    let mut emitter = trace_emitter();
    emitter.call("foo", 0, false).unwrap();
    emitter.emit(Op::LoadImmediate(1)).unwrap();
    assert_eq!(emitter.stack_depth(), 2);
    let err = emitter.emit(Op::Binary(BinOp::Add)).unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::VoidValueUsed);
    // The add still leaves one value behind.
    assert_eq!(emitter.stack_depth(), 1);
    assert!(!emitter.take_void());
}

#[test]
fn void_result_passed_as_an_argument_is_caught() {
    let mut emitter = trace_emitter();
    emitter.call("foo", 0, false).unwrap();
    emitter.emit(Op::LoadImmediate(1)).unwrap();
    let err = emitter.call("g", 2, true).unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::VoidValueUsed);
    assert_eq!(emitter.stack_depth(), 1);
}

#[test]
fn values_after_a_void_statement_are_usable() {
    let mut emitter = trace_emitter();
    emitter.call("foo", 0, false).unwrap();
    assert!(emitter.take_void());
    emitter.emit(Op::LoadImmediate(1)).unwrap();
    emitter.emit(Op::LoadImmediate(2)).unwrap();
    assert!(emitter.emit(Op::Binary(BinOp::Add)).is_ok());
    assert_eq!(emitter.stack_depth(), 1);
}

// ── Trace syntax ─────────────────────────────────────────────────────────

#[test]
fn trace_names_the_region_of_each_access() {
    let mut emitter = trace_emitter();
    emitter
        .emit(Op::Load {
            access: t16_compiler::emit::Access::Direct,
            address: Address::local(2),
            rvalue: true,
        })
        .unwrap();
    emitter
        .emit(Op::Load {
            access: t16_compiler::emit::Access::Reference,
            address: Address::parameter(1, 2),
            rvalue: false,
        })
        .unwrap();
    let lines = trace_lines(&emitter);
    assert_eq!(&lines[lines.len() - 2..], ["LOAD local 2", "ADDR param 1"]);
}
