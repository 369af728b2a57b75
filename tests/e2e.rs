//! End-to-end scenarios driving [`dusk::compile`] directly and inspecting
//! the returned SPIR-V word stream, mirroring the pipeline's own
//! section-order and entry-point-interface invariants.

use pretty_assertions::assert_eq;

const MAGIC: u32 = 0x0723_0203;

/// Splits a SPIR-V word stream (past the 5-word header) into
/// `(opcode, operand_words)` pairs.
fn instructions(words: &[u32]) -> Vec<(u16, &[u32])> {
    let mut out = Vec::new();
    let mut i = 5;
    while i < words.len() {
        let header = words[i];
        let word_count = (header >> 16) as usize;
        let opcode = (header & 0xffff) as u16;
        out.push((opcode, &words[i + 1..i + word_count]));
        i += word_count;
    }
    out
}

fn opcodes(words: &[u32]) -> Vec<u16> {
    instructions(words).into_iter().map(|(op, _)| op).collect()
}

const OP_ENTRY_POINT: u16 = 15;
const OP_EXECUTION_MODE: u16 = 16;
const OP_FUNCTION: u16 = 54;
const OP_FUNCTION_END: u16 = 56;
const OP_LABEL: u16 = 248;
const OP_RETURN: u16 = 253;
const OP_KILL: u16 = 252;
const OP_PHI: u16 = 245;
const OP_SELECTION_MERGE: u16 = 247;
const OP_VECTOR_SHUFFLE: u16 = 79;
const OP_VARIABLE: u16 = 59;
const OP_DECORATE: u16 = 71;

#[test]
fn e1_empty_vertex_shader() {
    let src = r#"
        [[stage(vertex)]]
        fn main() void {}
    "#;
    let words = dusk::compile("e1.dusk", src, None).unwrap();
    assert_eq!(words[0], MAGIC);

    let ops = opcodes(&words);
    assert!(ops.contains(&OP_ENTRY_POINT));

    let fn_start = ops.iter().position(|&op| op == OP_FUNCTION).unwrap();
    let fn_end = ops.iter().position(|&op| op == OP_FUNCTION_END).unwrap();
    let body = &ops[fn_start + 1..fn_end];
    // Only a parameterless entry function: label then a bare return.
    assert_eq!(body, &[OP_LABEL, OP_RETURN]);
}

#[test]
fn e2_position_passthrough() {
    let src = r#"
        [[stage(vertex)]]
        fn main([[location(0)]] pos: float4) [[builtin(position)]] float4 {
            return pos;
        }
    "#;
    let words = dusk::compile("e2.dusk", src, None).unwrap();
    let ops = opcodes(&words);
    assert!(ops.contains(&OP_ENTRY_POINT));
    // Two interface globals (one Input, one Output) are declared.
    assert_eq!(ops.iter().filter(|&&op| op == OP_VARIABLE).count(), 2);
    // Both carry a decoration (Location on the input, BuiltIn on the output).
    assert_eq!(ops.iter().filter(|&&op| op == OP_DECORATE).count(), 2);
}

#[test]
fn e3_uniform_buffer() {
    let src = r#"
        [[set(0), binding(0)]] let(uniform) u : struct(std140) { m: float4x4 };

        [[stage(vertex)]]
        fn main() void {}
    "#;
    let words = dusk::compile("e3.dusk", src, None).unwrap();
    let ops = opcodes(&words);
    // set/binding decorations on the global, plus Block on the struct
    // and Offset on its one member.
    assert!(ops.iter().filter(|&&op| op == OP_DECORATE).count() >= 3);
}

#[test]
fn e4_fragment_discard() {
    let src = r#"
        [[stage(fragment)]]
        fn main() void { discard; }
    "#;
    let words = dusk::compile("e4.dusk", src, None).unwrap();
    let ops = opcodes(&words);
    assert!(ops.contains(&OP_ENTRY_POINT));
    assert!(ops.contains(&OP_EXECUTION_MODE));
    assert!(ops.contains(&OP_KILL));
}

#[test]
fn e5_short_circuit_and() {
    let src = r#"
        fn f(a: bool, b: bool) bool {
            return a && b;
        }

        [[stage(fragment)]]
        fn main() void {}
    "#;
    let words = dusk::compile("e5.dusk", src, None).unwrap();
    let ops = opcodes(&words);
    assert!(ops.contains(&OP_SELECTION_MERGE));
    assert!(ops.contains(&OP_PHI));
}

#[test]
fn e6_swizzle_shuffle() {
    let src = r#"
        fn f(v: float4) float3 {
            return v.xyz;
        }

        [[stage(fragment)]]
        fn main() void {}
    "#;
    let words = dusk::compile("e6.dusk", src, None).unwrap();
    let ops = opcodes(&words);
    assert!(ops.contains(&OP_VECTOR_SHUFFLE));
}

#[test]
fn section_order_is_stable() {
    let src = r#"
        [[stage(vertex)]]
        fn main() void {}
    "#;
    let words = dusk::compile("order.dusk", src, None).unwrap();
    let ops = opcodes(&words);
    // Capability, ExtInstImport, MemoryModel, EntryPoint, Source must
    // each appear before the first Function.
    let fn_pos = ops.iter().position(|&op| op == OP_FUNCTION).unwrap();
    for required in [17u16, 11, 14, OP_ENTRY_POINT, 3] {
        let pos = ops.iter().position(|&op| op == required).unwrap();
        assert!(pos < fn_pos, "opcode {required} should precede the first function");
    }
}

#[test]
fn every_block_has_one_terminator() {
    let src = r#"
        fn f(a: bool) int {
            if (a) {
                return 1;
            } else {
                return 2;
            }
        }

        [[stage(fragment)]]
        fn main() void {}
    "#;
    let words = dusk::compile("term.dusk", src, None).unwrap();
    let insts = instructions(&words);
    const TERMINATORS: &[u16] = &[OP_RETURN, 254 /* ReturnValue */, OP_KILL, 249 /* Branch */, 250 /* BranchConditional */];
    let mut in_function = false;
    let mut since_label = 0usize;
    for (op, _) in insts {
        if op == OP_FUNCTION {
            in_function = true;
        } else if op == OP_FUNCTION_END {
            in_function = false;
        } else if in_function && op == OP_LABEL {
            since_label = 0;
        } else if in_function && TERMINATORS.contains(&op) {
            since_label += 1;
        }
    }
    assert!(since_label > 0);
}

#[test]
fn array_type_emits_its_length_constant_first() {
    let src = r#"
        [[set(0), binding(0)]] let(uniform) u : struct(std140) { values: float[4] };

        [[stage(vertex)]]
        fn main() void {}
    "#;
    let words = dusk::compile("array.dusk", src, None).unwrap();
    let insts = instructions(&words);
    const OP_TYPE_ARRAY: u16 = 28;
    const OP_CONSTANT: u16 = 43;
    let array_pos = insts.iter().position(|(op, _)| *op == OP_TYPE_ARRAY).unwrap();
    let const_pos = insts.iter().position(|(op, _)| *op == OP_CONSTANT).unwrap();
    assert!(const_pos < array_pos, "the array length constant must be defined before OpTypeArray");
}

#[test]
fn missing_entry_point_is_reported() {
    let src = "fn helper() int { return 1; }";
    let err = dusk::compile("no_entry.dusk", src, None).unwrap_err();
    assert!(err[0].message.contains("no entry points"));
}
