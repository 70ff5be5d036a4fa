//! Reference interpreter for T16 listings.
//!
//! Loading is two-pass: the first pass records label positions and
//! `.define` equates, the second resolves every symbolic operand. A run
//! stops when an instruction branches to itself (the machine has no halt)
//! or the step budget runs out.

use std::collections::HashMap;

use thiserror::Error;

use crate::backend::t16::abi::{Register, STACK_TOP};
use crate::backend::t16::instruction::{frame_field, Instr, Operand, ShiftOp};
use crate::backend::{AsmItem, Listing};

pub const DEFAULT_MAX_STEPS: u64 = 10_000_000;

const MEMORY_CELLS: usize = 1 << 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("undefined symbol '{0}'")]
    UndefinedSymbol(String),
    #[error("step limit of {0} reached")]
    StepLimit(u64),
    #[error("program counter {0} is outside the program")]
    PcOutOfRange(usize),
    #[error("listing contains a non-T16 line: {0}")]
    NotNative(String),
    #[error("cannot write to operand {0}")]
    BadDestination(String),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// `r0` at halt, as a signed word.
    pub exit_value: i16,
    pub steps: u64,
}

#[derive(Debug)]
pub struct Machine {
    program: Vec<Instr>,
    labels: HashMap<String, usize>,
    defines: HashMap<String, i64>,
    memory: Vec<u16>,
    regs: [u16; 5],
    pc: usize,
    zero: bool,
    negative: bool,
}

impl Machine {
    pub fn load(listing: &Listing) -> Result<Self, SimError> {
        let mut program = Vec::new();
        let mut labels = HashMap::new();
        let mut defines = HashMap::new();

        for item in &listing.items {
            match item {
                AsmItem::Label(name) => {
                    labels.insert(name.clone(), program.len());
                }
                AsmItem::Instr { instr, .. } => program.push(instr.clone()),
                AsmItem::Define { name, value } => {
                    defines.insert(name.clone(), *value);
                }
                AsmItem::Trace(line) => return Err(SimError::NotNative(line.clone())),
            }
        }

        let machine = Self {
            program,
            labels,
            defines,
            memory: vec![0; MEMORY_CELLS],
            regs: [0; 5],
            pc: 0,
            zero: false,
            negative: false,
        };
        machine.check_symbols()?;
        tracing::debug!(
            instructions = machine.program.len(),
            labels = machine.labels.len(),
            "listing loaded"
        );
        Ok(machine)
    }

    fn check_symbols(&self) -> Result<(), SimError> {
        for instr in &self.program {
            if let Some(target) = instr.target() {
                self.label(target)?;
            }
            let operands = match instr {
                Instr::Mov { dst, src } => vec![dst, src],
                Instr::Alu { src, .. } => vec![src],
                _ => Vec::new(),
            };
            for operand in operands {
                if let Operand::Symbol(name) = operand {
                    self.symbol_value(name)?;
                }
            }
        }
        Ok(())
    }

    fn label(&self, name: &str) -> Result<usize, SimError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UndefinedSymbol(name.to_string()))
    }

    fn symbol_value(&self, name: &str) -> Result<u16, SimError> {
        if let Some(value) = self.defines.get(name) {
            return Ok(*value as u16);
        }
        self.label(name).map(|index| index as u16)
    }

    // ── State access ────────────────────────────────────────────────────

    pub fn register(&self, reg: Register) -> u16 {
        self.regs[reg.index()]
    }

    pub fn memory(&self, address: u16) -> u16 {
        self.memory[usize::from(address)]
    }

    /// Zero-page cell `offset` as a signed word.
    pub fn global(&self, offset: u16) -> i16 {
        self.memory(offset) as i16
    }

    // ── Execution ───────────────────────────────────────────────────────

    pub fn run(&mut self, max_steps: u64) -> Result<Outcome, SimError> {
        self.pc = 0;
        self.regs[Register::Sp.index()] = STACK_TOP as u16;
        let mut steps = 0;
        loop {
            if steps >= max_steps {
                return Err(SimError::StepLimit(max_steps));
            }
            steps += 1;
            if self.step()? {
                let exit_value = self.register(Register::R0) as i16;
                tracing::debug!(steps, exit_value, "halted");
                return Ok(Outcome { exit_value, steps });
            }
        }
    }

    /// Execute one instruction. Returns `true` on a branch to itself.
    pub fn step(&mut self) -> Result<bool, SimError> {
        let Some(instr) = self.program.get(self.pc).cloned() else {
            return Err(SimError::PcOutOfRange(self.pc));
        };
        let mut next = self.pc + 1;
        match &instr {
            Instr::Mov { dst, src } => {
                let value = self.read(src)?;
                self.write(dst, value)?;
            }
            Instr::Alu { op, d, src } => {
                let value = op.apply(self.register(*d), self.read(src)?);
                self.set_result(*d, value);
            }
            Instr::Shift { op, d } => {
                let current = self.register(*d);
                let value = match op {
                    ShiftOp::Asl => current << 1,
                    ShiftOp::Lsr => current >> 1,
                };
                self.set_result(*d, value);
            }
            Instr::Push(r) => self.push(self.register(*r)),
            Instr::Pop(r) => {
                let value = self.pop();
                self.regs[r.index()] = value;
            }
            Instr::Jsr(target) => {
                self.push(next as u16);
                next = self.label(target)?;
            }
            Instr::Rts => next = usize::from(self.pop()),
            Instr::Branch { cond, target } => {
                if cond.holds(self.zero, self.negative) {
                    let destination = self.label(target)?;
                    if destination == self.pc {
                        return Ok(true);
                    }
                    next = destination;
                }
            }
        }
        self.pc = next;
        Ok(false)
    }

    fn set_result(&mut self, d: Register, value: u16) {
        self.regs[d.index()] = value;
        self.zero = value == 0;
        self.negative = value & 0x8000 != 0;
    }

    fn push(&mut self, value: u16) {
        let sp = self.register(Register::Sp);
        self.memory[usize::from(sp)] = value;
        self.regs[Register::Sp.index()] = sp.wrapping_sub(1);
    }

    fn pop(&mut self) -> u16 {
        let sp = self.register(Register::Sp).wrapping_add(1);
        self.regs[Register::Sp.index()] = sp;
        self.memory[usize::from(sp)]
    }

    fn effective_address(&self, operand: &Operand) -> Option<u16> {
        match operand {
            Operand::ZeroPage(a) => Some(*a),
            Operand::FrameUp(field) => {
                Some(self.register(Register::Bp).wrapping_add(frame_field(*field)))
            }
            Operand::FrameDown(field) => {
                Some(self.register(Register::Bp).wrapping_sub(frame_field(*field)))
            }
            Operand::Indirect(r) => Some(self.register(*r)),
            _ => None,
        }
    }

    fn read(&self, operand: &Operand) -> Result<u16, SimError> {
        match operand {
            Operand::Reg(r) => Ok(self.register(*r)),
            Operand::Imm(v) => Ok(*v as u16),
            Operand::Symbol(name) => self.symbol_value(name),
            memory => match self.effective_address(memory) {
                Some(address) => Ok(self.memory(address)),
                None => Err(SimError::BadDestination(memory.to_string())),
            },
        }
    }

    fn write(&mut self, operand: &Operand, value: u16) -> Result<(), SimError> {
        if let Operand::Reg(r) = operand {
            self.regs[r.index()] = value;
            return Ok(());
        }
        match self.effective_address(operand) {
            Some(address) => {
                self.memory[usize::from(address)] = value;
                Ok(())
            }
            None => Err(SimError::BadDestination(operand.to_string())),
        }
    }
}

/// Load and run a listing in one go.
pub fn execute(listing: &Listing, max_steps: u64) -> Result<(Outcome, Machine), SimError> {
    let mut machine = Machine::load(listing)?;
    let outcome = machine.run(max_steps)?;
    Ok((outcome, machine))
}
