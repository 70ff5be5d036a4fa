use proptest::prelude::*;
use t16_compiler::backend::t16::abi::{
    encode_frame_field, local_field, param_displacement, param_field,
};
use t16_compiler::backend::t16::instruction::{Instr, Operand};
use t16_compiler::sim::{self, Machine, DEFAULT_MAX_STEPS};
use t16_compiler::{compile, CompileOptions};

// ── Helpers ──────────────────────────────────────────────────────────────

fn run_program(source: &str) -> (i16, Machine) {
    let compilation = compile(source, &CompileOptions::default())
        .unwrap_or_else(|e| panic!("should compile: {e}\n{source}"));
    let (outcome, machine) = sim::execute(&compilation.listing, DEFAULT_MAX_STEPS)
        .unwrap_or_else(|e| panic!("should run: {e}\n{}", compilation.listing));
    (outcome.exit_value, machine)
}

fn run(source: &str) -> i16 {
    run_program(source).0
}

/// Evaluate `a <op> b` with both operands held in globals.
fn binary(a: i16, op: &str, b: i16) -> i16 {
    run(&format!(
        "int a; int b; int main() {{ a = {a}; b = {b}; return a {op} b; }}"
    ))
}

fn unary(op: &str, a: i16) -> i16 {
    run(&format!("int a; int main() {{ a = {a}; return {op}a; }}"))
}

fn listing_of(source: &str) -> String {
    compile(source, &CompileOptions::default())
        .expect("should compile")
        .listing
        .to_string()
}

// ── 5-bit frame field ────────────────────────────────────────────────────

#[test]
fn frame_field_keeps_only_five_bits() {
    assert_eq!(encode_frame_field(31), 31);
    assert_eq!(encode_frame_field(32), encode_frame_field(0));
    assert_eq!(encode_frame_field(33), encode_frame_field(1));
    assert_ne!(encode_frame_field(31), encode_frame_field(32));
    assert_eq!(local_field(32), local_field(0));
    assert_eq!(local_field(31), local_field(63));
}

#[test]
fn frame_fields_are_unsigned_with_a_direction() {
    assert_eq!(Operand::FrameUp(param_field(0, 14)).to_string(), "[bp+16]");
    assert_eq!(Operand::FrameDown(local_field(20)).to_string(), "[bp-20]");
    assert_eq!(Operand::FrameDown(local_field(31)).to_string(), "[bp-31]");
    assert_eq!(Operand::FrameDown(local_field(32)).to_string(), "[bp-0]");
}

#[test]
fn parameters_sit_above_the_return_address() {
    // Last argument pushed is nearest bp.
    assert_eq!(param_displacement(2, 3), 3);
    assert_eq!(param_displacement(0, 3), 5);
    assert_eq!(param_field(0, 1), 3);
    assert_eq!(
        Operand::FrameUp(param_field(1, 2)).to_string(),
        "[bp+3]".to_string()
    );
    assert_eq!(Operand::FrameDown(local_field(2)).to_string(), "[bp-2]");
}

#[test]
fn fourteen_parameters_keep_their_own_cells() {
    let names: Vec<String> = (0..14).map(|i| format!("p{i}")).collect();
    let params = names
        .iter()
        .map(|n| format!("int {n}"))
        .collect::<Vec<_>>()
        .join(", ");
    let args = (1..=14).map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
    let first = format!("int f({params}) {{ return p0; }} int main() {{ return f({args}); }}");
    assert_eq!(run(&first), 1);

    let sum = names.join(" + ");
    let total = format!("int f({params}) {{ return {sum}; }} int main() {{ return f({args}); }}");
    assert_eq!(run(&total), 105);
}

#[test]
fn deep_locals_do_not_overlap_parameters() {
    let locals: String = (0..20).map(|i| format!("int l{i}; ")).collect();
    let source = format!(
        "int f(int p, int q) {{ {locals} l0 = 1; l19 = p; l18 = q; \
         return l0 + l19 * 10 + l18 * 100 + p; }} \
         int main() {{ return f(7, 9); }}"
    );
    assert_eq!(run(&source), 978);
}

// ── Operators under the interpreter ──────────────────────────────────────

#[test]
fn additive_and_bitwise_operators() {
    assert_eq!(binary(20, "+", 22), 42);
    assert_eq!(binary(5, "-", 9), -4);
    assert_eq!(binary(0b1100, "&", 0b1010), 0b1000);
    assert_eq!(binary(0b1100, "|", 0b1010), 0b1110);
    assert_eq!(binary(0b1100, "^", 0b1010), 0b0110);
    assert_eq!(binary(32767, "+", 1), -32768);
}

#[test]
fn multiply_divide_and_modulo_use_library_routines() {
    assert_eq!(binary(6, "*", 7), 42);
    assert_eq!(binary(-6, "*", 7), -42);
    assert_eq!(binary(-6, "*", -7), 42);
    assert_eq!(binary(300, "*", 300), (300i32 * 300) as i16);
    assert_eq!(binary(17, "/", 5), 3);
    assert_eq!(binary(-17, "/", 5), -3);
    assert_eq!(binary(17, "/", -5), -3);
    assert_eq!(binary(-17, "/", -5), 3);
    assert_eq!(binary(17, "%", 5), 2);
    assert_eq!(binary(-17, "%", 5), -2);
    assert_eq!(binary(17, "%", -5), 2);
    assert_eq!(binary(15, "%", 5), 0);

    let asm = listing_of("int a; int main() { return a * 3; }");
    assert!(asm.contains("  jsr __mul"));
    assert!(asm.contains("__div:"));
    assert!(asm.contains("__mod:"));
}

#[test]
fn division_by_zero_yields_zero() {
    assert_eq!(binary(9, "/", 0), 0);
    assert_eq!(binary(9, "%", 0), 0);
}

#[test]
fn shifts_loop_once_per_count() {
    assert_eq!(binary(1, "<<", 3), 8);
    assert_eq!(binary(5, "<<", 0), 5);
    assert_eq!(binary(64, ">>", 3), 8);
    // `>>` is a logical shift.
    assert_eq!(binary(-2, ">>", 1), 0x7FFF);
}

#[test]
fn relational_operators() {
    let cases = [
        (3, 5, [0, 1, 1, 1, 0, 0]),
        (5, 5, [1, 0, 0, 1, 0, 1]),
        (7, 5, [0, 1, 0, 0, 1, 1]),
        (-4, 2, [0, 1, 1, 1, 0, 0]),
        (2, -4, [0, 1, 0, 0, 1, 1]),
    ];
    let ops = ["==", "!=", "<", "<=", ">", ">="];
    for (a, b, expected) in cases {
        for (op, want) in ops.iter().zip(expected) {
            assert_eq!(binary(a, op, b), want, "{a} {op} {b}");
        }
    }
}

#[test]
fn comparisons_follow_the_sign_of_the_wrapped_difference() {
    // 30000 - (-30000) wraps negative, so `<` holds and `>` does not.
    assert_eq!(binary(30000, "<", -30000), 1);
    assert_eq!(binary(30000, ">", -30000), 0);
    assert_eq!(binary(-30000, "<", 30000), 0);
    // Equality is unaffected by wraparound.
    assert_eq!(binary(-32768, "==", -32768), 1);
    assert_eq!(binary(32767, "!=", -32768), 1);
}

#[test]
fn logical_operators_produce_zero_or_one() {
    assert_eq!(binary(3, "&&", 9), 1);
    assert_eq!(binary(3, "&&", 0), 0);
    assert_eq!(binary(0, "||", 0), 0);
    assert_eq!(binary(0, "||", -7), 1);
}

#[test]
fn logical_operators_evaluate_both_sides() {
    let source = r#"
        int calls;
        int bump() { calls = calls + 1; return 1; }
        int main() {
            calls = 0;
            0 && bump();
            1 || bump();
            return calls;
        }
    "#;
    assert_eq!(run(source), 2);
}

#[test]
fn unary_operators() {
    assert_eq!(unary("!", 0), 1);
    assert_eq!(unary("!", 12), 0);
    assert_eq!(unary("~", 0), -1);
    assert_eq!(unary("~", 0x00FF), !0x00FFi16);
    assert_eq!(unary("-", 9), -9);
    assert_eq!(unary("-", -32768), -32768);
}

// ── Addressing modes ─────────────────────────────────────────────────────

#[test]
fn global_array_elements_sit_below_the_anchor() {
    let source = r#"
        int a[5];
        int g;
        int main() {
            int i;
            i = 0;
            while (i < 5) {
                a[i] = i * 10;
                i = i + 1;
            }
            g = 99;
            return a[3] + a[4];
        }
    "#;
    let (exit, machine) = run_program(source);
    assert_eq!(exit, 70);
    // `a` anchors cell 4, so a[i] lives at 4 - i.
    assert_eq!(machine.global(4), 0);
    assert_eq!(machine.global(3), 10);
    assert_eq!(machine.global(0), 40);
    assert_eq!(machine.global(5), 99);
}

#[test]
fn pointer_parameter_indexes_a_caller_array() {
    let source = r#"
        int sum(int *p, int n) {
            int s;
            int i;
            s = 0;
            for (i = 0; i < n; i = i + 1)
                s = s + p[i];
            return s;
        }
        int main() {
            int v[4];
            v[0] = 1;
            v[1] = 2;
            v[2] = 3;
            v[3] = 4;
            return sum(v, 4);
        }
    "#;
    assert_eq!(run(source), 10);
}

#[test]
fn address_of_and_store_through_pointer() {
    let source = r#"
        void set(int *p, int v) { *p = v; }
        int main() {
            int x;
            set(&x, 42);
            return x;
        }
    "#;
    assert_eq!(run(source), 42);
}

#[test]
fn dereference_of_names_and_expressions() {
    let source = r#"
        int main() {
            int x;
            int *p;
            x = 9;
            p = &x;
            *(p) = *p + 1;
            return *p + *(p);
        }
    "#;
    assert_eq!(run(source), 20);
}

#[test]
fn address_of_an_element() {
    let source = r#"
        int buf[3];
        int main() {
            int *p;
            p = &buf[1];
            *p = 5;
            return buf[1];
        }
    "#;
    assert_eq!(run(source), 5);
}

#[test]
fn parameters_keep_declaration_order() {
    let source = r#"
        int digits(int a, int b, int c) { return a * 100 + b * 10 + c; }
        int main() { return digits(1, 2, 3); }
    "#;
    assert_eq!(run(source), 123);
}

#[test]
fn recursion_uses_fresh_frames() {
    let source = r#"
        int fact(int n) {
            if (n <= 1)
                return 1;
            return n * fact(n - 1);
        }
        int main() { return fact(6); }
    "#;
    assert_eq!(run(source), 720);
}

#[test]
fn nested_block_locals_share_cells() {
    let source = r#"
        int main() {
            int a;
            a = 1;
            { int b; b = 2; a = a + b; }
            { int c; c = 5; a = a + c; }
            return a;
        }
    "#;
    let compilation = compile(source, &CompileOptions::default()).unwrap();
    let frame = compilation
        .listing
        .items
        .iter()
        .find_map(|item| match item {
            t16_compiler::backend::AsmItem::Define { value, .. } => Some(*value),
            _ => None,
        });
    assert_eq!(frame, Some(2));
    assert_eq!(run(source), 8);
}

// ── Control flow ─────────────────────────────────────────────────────────

#[test]
fn while_with_break_and_continue() {
    let source = r#"
        int main() {
            int i;
            int s;
            i = 0;
            s = 0;
            while (1) {
                i = i + 1;
                if (i > 10) break;
                if (i % 2) continue;
                s = s + i;
            }
            return s;
        }
    "#;
    assert_eq!(run(source), 30);
}

#[test]
fn do_while_runs_the_body_first() {
    let source = r#"
        int main() {
            int i;
            i = 20;
            do { i = i + 3; } while (i < 10);
            return i;
        }
    "#;
    assert_eq!(run(source), 23);
}

#[test]
fn for_continue_goes_to_the_step() {
    let source = r#"
        int main() {
            int i;
            int s;
            s = 0;
            for (i = 0; i < 10; i = i + 1) {
                if (i == 5) continue;
                s = s + i;
            }
            return s;
        }
    "#;
    assert_eq!(run(source), 40);
}

#[test]
fn if_else_chains() {
    let source = r#"
        int classify(int n) {
            if (n < 0) return -1;
            else if (n == 0) return 0;
            else return 1;
        }
        int main() { return classify(-5) * 100 + classify(0) * 10 + classify(8); }
    "#;
    assert_eq!(run(source), -99);
}

// ── Listing shape ────────────────────────────────────────────────────────

#[test]
fn program_starts_with_the_bootstrap() {
    let compilation = compile("int main() { return 0; }", &CompileOptions::default()).unwrap();
    let instrs: Vec<String> = compilation
        .listing
        .instrs()
        .take(3)
        .map(Instr::to_string)
        .collect();
    assert_eq!(instrs, ["  mov sp, #65535", "  mov bp, #0", "  bra main"]);
    let asm = compilation.listing.to_string();
    assert!(asm.contains("__exit:\n  bra __exit"));
}

#[test]
fn main_exits_and_other_functions_return() {
    let asm = listing_of("int f() { return 1; } int main() { return f(); }");
    let f_start = asm.find("f:").unwrap();
    let main_start = asm.find("main:").unwrap();
    assert!(asm[f_start..main_start].contains("  rts"));
    assert!(asm[main_start..].contains("  bra __exit"));
}

#[test]
fn prologue_reserves_the_resolved_frame() {
    let asm = listing_of("int main() { int x; int y; x = 1; y = x; return y; }");
    assert!(asm.contains("main:\n  push bp\n  mov bp, sp\n  sub sp, #L0"));
    assert!(asm.contains("  .define L0, 2"));
    assert!(asm.contains("  mov [bp-1], r0"));
}

#[test]
fn call_sequence_cleans_arguments() {
    let asm = listing_of("int add(int a, int b) { return a + b; } int main() { return add(1, 2); }");
    assert!(asm.contains("  jsr add"));
    let after_call = &asm[asm.find("  jsr add").unwrap()..];
    let lines: Vec<&str> = after_call.lines().skip(1).take(3).collect();
    assert_eq!(lines, ["  pop r1", "  pop r1", "  push r0"]);
}

// ── Properties ───────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn add_sub_wrap_like_i16(a in any::<i16>(), b in any::<i16>()) {
        prop_assert_eq!(binary(a, "+", b), a.wrapping_add(b));
        prop_assert_eq!(binary(a, "-", b), a.wrapping_sub(b));
    }

    #[test]
    fn bitwise_ops_match(a in any::<i16>(), b in any::<i16>()) {
        prop_assert_eq!(binary(a, "&", b), a & b);
        prop_assert_eq!(binary(a, "|", b), a | b);
        prop_assert_eq!(binary(a, "^", b), a ^ b);
    }

    #[test]
    fn multiply_wraps_like_i16(a in any::<i16>(), b in any::<i16>()) {
        prop_assert_eq!(binary(a, "*", b), a.wrapping_mul(b));
    }

    #[test]
    fn divide_and_modulo_truncate(
        a in -3000i16..3000,
        b in prop_oneof![-60i16..-1, 1i16..60],
    ) {
        prop_assert_eq!(binary(a, "/", b), a / b);
        prop_assert_eq!(binary(a, "%", b), a % b);
    }

    #[test]
    fn shifts_match_u16_shifts(a in any::<i16>(), n in 0i16..16) {
        let bits = a as u16;
        prop_assert_eq!(binary(a, "<<", n), (bits << n) as i16);
        prop_assert_eq!(binary(a, ">>", n), (bits >> n) as i16);
    }

    #[test]
    fn comparisons_without_overflow(a in -16000i16..16000, b in -16000i16..16000) {
        prop_assert_eq!(binary(a, "<", b), i16::from(a < b));
        prop_assert_eq!(binary(a, "<=", b), i16::from(a <= b));
        prop_assert_eq!(binary(a, ">", b), i16::from(a > b));
        prop_assert_eq!(binary(a, ">=", b), i16::from(a >= b));
        prop_assert_eq!(binary(a, "==", b), i16::from(a == b));
        prop_assert_eq!(binary(a, "!=", b), i16::from(a != b));
    }

    #[test]
    fn less_than_is_the_sign_of_the_difference(a in any::<i16>(), b in any::<i16>()) {
        prop_assert_eq!(binary(a, "<", b), i16::from(a.wrapping_sub(b) < 0));
    }
}
