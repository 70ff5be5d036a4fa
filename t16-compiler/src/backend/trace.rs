//! Debug trace syntax: one line per abstract op.

use super::{AsmItem, Backend};
use crate::emit::{Access, LabelAllocator, Op, StoreTarget};

#[derive(Debug, Default)]
pub struct TraceBackend;

impl TraceBackend {
    pub fn new() -> Self {
        Self
    }
}

fn access_mnemonic(access: Access, rvalue: bool) -> &'static str {
    match (access, rvalue) {
        (Access::Direct, _) => "LOAD",
        (Access::Indirect, true) => "LOADX",
        (Access::Indirect, false) => "ADDRX",
        (Access::Pointer, true) => "LOADP",
        (Access::Pointer, false) => "ADDRP",
        (Access::Reference, _) => "ADDR",
    }
}

impl Backend for TraceBackend {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn lower(&mut self, op: &Op, _labels: &mut LabelAllocator, out: &mut Vec<AsmItem>) {
        let line = match op {
            Op::BeginProgram => "BEGIN".to_string(),
            Op::EndProgram => "END".to_string(),
            Op::LoadImmediate(v) => format!("IMM {v}"),
            Op::Binary(b) => format!("BIN {}", b.symbol()),
            Op::Unary(u) => format!("UN {}", u.symbol()),
            Op::Load {
                access,
                address,
                rvalue,
            } => format!("{} {address}", access_mnemonic(*access, *rvalue)),
            Op::Store(StoreTarget::Direct(address)) => format!("STORE {address}"),
            Op::Store(StoreTarget::Pointer(address)) => format!("STOREP {address}"),
            Op::Store(StoreTarget::Indirect) => "STOREX".to_string(),
            Op::Deref => "DEREF".to_string(),
            Op::Discard => "DROP".to_string(),
            Op::Call { name, args } => format!("CALL {name} {args}"),
            Op::DiscardArgument => "DROPARG".to_string(),
            Op::ReturnValue => "RESULT".to_string(),
            Op::Entry { name, frame } => {
                out.push(AsmItem::Label(name.clone()));
                format!("ENTRY {frame}")
            }
            Op::FixEntry { frame, size } => {
                out.push(AsmItem::Define {
                    name: frame.to_string(),
                    value: *size as i64,
                });
                return;
            }
            Op::Return { has_value, is_main } => match (has_value, is_main) {
                (true, true) => "RET value main".to_string(),
                (true, false) => "RET value".to_string(),
                (false, true) => "RET main".to_string(),
                (false, false) => "RET".to_string(),
            },
            Op::Jump(l) => format!("JMP {l}"),
            Op::JumpIfFalse(l) => format!("JF {l}"),
            Op::JumpIfTrue(l) => format!("JT {l}"),
            Op::Label(l) => {
                out.push(AsmItem::Label(l.to_string()));
                return;
            }
        };
        out.push(AsmItem::Trace(line));
    }
}
