//! Register file and spill/reload
//!
//! A register holds at most one value; a value sits in at most one register.
//! The association is mutated only through [`CodeGen::assign`] and
//! [`CodeGen::load`], which is what keeps the two directions consistent.
//! When `load` needs a register that is occupied, the occupant is spilled to
//! a freshly allocated stack slot and its storage updated, so later mentions
//! read it back from memory.

use super::state::{Storage, ValueId};
use super::{CodeGen, CodeGenError};
use std::fmt::Write as _;

pub(super) const NUM_REGS: usize = 9;

/// Index into the register pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Reg(pub(super) usize);

struct Names {
    qword: &'static str,
    dword: &'static str,
    byte: &'static str,
}

/// The general pool, in allocation order. %rbx and %r12-%r15 are callee
/// saved and stay untouched; %r10 and %r11 are last so the parameter
/// registers drain first into calls.
const REGISTERS: [Names; NUM_REGS] = [
    Names { qword: "%rax", dword: "%eax", byte: "%al" },
    Names { qword: "%rdi", dword: "%edi", byte: "%dil" },
    Names { qword: "%rsi", dword: "%esi", byte: "%sil" },
    Names { qword: "%rdx", dword: "%edx", byte: "%dl" },
    Names { qword: "%rcx", dword: "%ecx", byte: "%cl" },
    Names { qword: "%r8", dword: "%r8d", byte: "%r8b" },
    Names { qword: "%r9", dword: "%r9d", byte: "%r9b" },
    Names { qword: "%r10", dword: "%r10d", byte: "%r10b" },
    Names { qword: "%r11", dword: "%r11d", byte: "%r11b" },
];

pub(super) const RAX: Reg = Reg(0);
pub(super) const RDX: Reg = Reg(3);
pub(super) const RCX: Reg = Reg(4);

/// SysV integer parameter registers, in argument order.
pub(super) const PARAM_REGS: [Reg; 6] = [Reg(1), Reg(2), Reg(3), Reg(4), Reg(5), Reg(6)];

/// Name of a register at an operand size.
pub(super) fn reg_name(reg: Reg, size: u64) -> &'static str {
    let names = &REGISTERS[reg.0];
    match size {
        1 => names.byte,
        4 => names.dword,
        _ => names.qword,
    }
}

impl CodeGen<'_> {
    /// Bind `value` and `reg` to each other, unbinding whatever either side
    /// was previously attached to. Passing `None` on one side clears the
    /// other.
    pub(super) fn assign(&mut self, value: Option<ValueId>, reg: Option<Reg>) {
        if let Some(id) = value {
            if let Some(old) = self.values[id.0].reg {
                self.registers[old.0] = None;
            }
            self.values[id.0].reg = reg;
        }
        if let Some(r) = reg {
            if let Some(occupant) = self.registers[r.0] {
                self.values[occupant.0].reg = None;
            }
            self.registers[r.0] = value;
        }
    }

    /// Make `reg` hold `value`. Any live occupant is spilled to a fresh
    /// stack slot first. With `value` None this just evicts the occupant.
    pub(super) fn load(&mut self, value: Option<ValueId>, reg: Reg) -> Result<(), CodeGenError> {
        if self.registers[reg.0] == value {
            return Ok(());
        }

        if let Some(occupant) = self.registers[reg.0] {
            let size = self.value(occupant).size;
            self.offset -= size as i64;
            self.values[occupant.0].storage = Storage::Stack(self.offset);
            writeln!(
                self.output,
                "\tmov{}\t{}, {}(%rbp)",
                super::state::suffix(size),
                reg_name(reg, size),
                self.offset
            )?;
        }

        if let Some(id) = value {
            let size = self.value(id).size;
            let source = self.operand(id);
            writeln!(
                self.output,
                "\tmov{}\t{}, {}",
                super::state::suffix(size),
                source,
                reg_name(reg, size)
            )?;
        }

        self.assign(value, Some(reg));
        Ok(())
    }

    /// First free register. Exhaustion cannot happen on trees this compiler
    /// builds; hitting it means the allocator lost track of a binding.
    pub(super) fn getreg(&self) -> Reg {
        for index in 0..NUM_REGS {
            if self.registers[index].is_none() {
                return Reg(index);
            }
        }
        unreachable!("register pool exhausted");
    }

    /// Ensure the value is register-resident and return its register.
    pub(super) fn ensure_register(&mut self, value: ValueId) -> Result<Reg, CodeGenError> {
        if let Some(reg) = self.value(value).reg {
            return Ok(reg);
        }
        let reg = self.getreg();
        self.load(Some(value), reg)?;
        Ok(reg)
    }
}
