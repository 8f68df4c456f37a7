//! Expression code generation
//!
//! One function per node class, mirroring the operator groups: `add`/`sub`/
//! `imul` share a two-operand pattern, division runs through %rax/%rdx,
//! comparisons materialize flags with `setcc`, and the logical operators
//! short-circuit through the shared `test` helper.

use super::platform::{GLOBAL_PREFIX, NUM_PARAM_REGS, SIZEOF_PARAM};
use super::registers::{NUM_REGS, PARAM_REGS, RAX, RCX, RDX, Reg, reg_name};
use super::state::{Storage, ValueId, align, suffix};
use super::{CodeGen, CodeGenError};
use crate::ast::{Binary, Expression, Unary};
use crate::scope::SymbolId;
use crate::types::{Parameters, Type, TypeKind};
use std::fmt::Write as _;

impl CodeGen<'_> {
    pub(super) fn gen_expr(&mut self, expr: &Expression) -> Result<ValueId, CodeGenError> {
        match expr {
            Expression::Number { value, ty } => {
                Ok(self.new_value(ty.size(), Storage::Immediate(*value)))
            }
            Expression::StringLiteral { value, .. } => {
                let label = self.string_label(value);
                Ok(self.new_value(8, Storage::Label(label)))
            }
            Expression::Identifier { symbol, ty } => {
                let storage = if self.symbols[*symbol].offset == 0 {
                    Storage::Global(self.symbols[*symbol].name.clone())
                } else {
                    Storage::Stack(self.symbols[*symbol].offset)
                };
                Ok(self.new_value(ty.size(), storage))
            }
            Expression::Call { callee, arguments, ty } => self.call(*callee, arguments, ty),
            Expression::Add(b) => self.compute(b, "add"),
            Expression::Subtract(b) => self.compute(b, "sub"),
            Expression::Multiply(b) => self.compute(b, "imul"),
            Expression::Divide(b) => self.divide(b, true),
            Expression::Remainder(b) => self.divide(b, false),
            Expression::LessThan(b) => self.compare(b, "l"),
            Expression::GreaterThan(b) => self.compare(b, "g"),
            Expression::LessOrEqual(b) => self.compare(b, "le"),
            Expression::GreaterOrEqual(b) => self.compare(b, "ge"),
            Expression::Equal(b) => self.compare(b, "e"),
            Expression::NotEqual(b) => self.compare(b, "ne"),
            Expression::LogicalOr(b) => self.logical(b, true),
            Expression::LogicalAnd(b) => self.logical(b, false),
            Expression::Not(u) => self.not(u),
            Expression::Negate(u) => self.negate(u),
            Expression::Address(u) => self.address(u),
            Expression::Dereference(u) => self.dereference(u),
            Expression::Cast(u) => self.cast(u),
        }
    }

    /// add, sub, imul: both operands in place, left forced into a register,
    /// `op right, left`; the result takes over left's register.
    fn compute(&mut self, binary: &Binary, opcode: &str) -> Result<ValueId, CodeGenError> {
        let left = self.gen_expr(&binary.left)?;
        let right = self.gen_expr(&binary.right)?;
        self.ensure_register(left)?;

        let size = binary.ty.size();
        let rhs = self.operand(right);
        let lhs = self.operand(left);
        writeln!(self.output, "\t{}{}\t{}, {}", opcode, suffix(size), rhs, lhs)?;

        self.assign(Some(right), None);
        let register = self.value(left).reg;
        let result = self.new_value(size, Storage::None);
        self.assign(Some(result), register);
        Ok(result)
    }

    /// idiv wants the dividend in %rax with %rdx clear; the divisor goes to
    /// %rcx. Quotient lands in %rax, remainder in %rdx.
    fn divide(&mut self, binary: &Binary, quotient: bool) -> Result<ValueId, CodeGenError> {
        let left = self.gen_expr(&binary.left)?;
        let right = self.gen_expr(&binary.right)?;

        self.load(Some(left), RAX)?;
        self.load(None, RDX)?;
        self.load(Some(right), RCX)?;

        let size = binary.ty.size();
        writeln!(self.output, "\t{}", if size == 4 { "cltd" } else { "cqto" })?;
        let divisor = self.operand(right);
        writeln!(self.output, "\tidiv{}\t{}", suffix(size), divisor)?;

        self.assign(Some(left), None);
        self.assign(Some(right), None);
        let result = self.new_value(size, Storage::None);
        self.assign(Some(result), Some(if quotient { RAX } else { RDX }));
        Ok(result)
    }

    /// cmp, then materialize the flag with setcc + movzbl in a fresh register.
    fn compare(&mut self, binary: &Binary, condition: &str) -> Result<ValueId, CodeGenError> {
        let left = self.gen_expr(&binary.left)?;
        let right = self.gen_expr(&binary.right)?;
        self.ensure_register(left)?;

        let size = self.value(left).size;
        let rhs = self.operand(right);
        let lhs = self.operand(left);
        writeln!(self.output, "\tcmp{}\t{}, {}", suffix(size), rhs, lhs)?;

        self.assign(Some(left), None);
        self.assign(Some(right), None);

        let result = self.new_value(binary.ty.size(), Storage::None);
        let register = self.getreg();
        self.assign(Some(result), Some(register));
        writeln!(self.output, "\tset{}\t{}", condition, reg_name(register, 1))?;
        writeln!(
            self.output,
            "\tmovzbl\t{}, {}",
            reg_name(register, 1),
            reg_name(register, 4)
        )?;
        Ok(result)
    }

    /// Short-circuit || and &&. The result register is claimed up front;
    /// both operands jump through the shared `test` helper.
    fn logical(&mut self, binary: &Binary, or: bool) -> Result<ValueId, CodeGenError> {
        if or && self.config.emit_comments {
            writeln!(self.output, "# or")?;
        }
        let size = binary.ty.size();
        let result = self.new_value(size, Storage::None);
        let register = self.getreg();
        self.assign(Some(result), Some(register));

        let taken = self.new_label();
        let exit = self.new_label();

        if or {
            self.test(&binary.left, taken, true)?;
            self.test(&binary.right, taken, true)?;
            let operand = self.operand(result);
            writeln!(self.output, "\tmov{}\t$0, {}", suffix(size), operand)?;
            writeln!(self.output, "\tjmp\t.L{}", exit)?;
            writeln!(self.output, ".L{}:", taken)?;
            let operand = self.operand(result);
            writeln!(self.output, "\tmov{}\t$1, {}", suffix(size), operand)?;
            writeln!(self.output, ".L{}:", exit)?;
        } else {
            self.test(&binary.left, exit, false)?;
            self.test(&binary.right, exit, false)?;
            let operand = self.operand(result);
            writeln!(self.output, "\tmov{}\t$1, {}", suffix(size), operand)?;
            writeln!(self.output, "\tjmp\t.L{}", taken)?;
            writeln!(self.output, ".L{}:", exit)?;
            let operand = self.operand(result);
            writeln!(self.output, "\tmov{}\t$0, {}", suffix(size), operand)?;
            writeln!(self.output, ".L{}:", taken)?;
        }
        Ok(result)
    }

    fn not(&mut self, unary: &Unary) -> Result<ValueId, CodeGenError> {
        let value = self.gen_expr(&unary.expr)?;
        let register = self.ensure_register(value)?;

        let size = self.value(value).size;
        let operand = self.operand(value);
        writeln!(self.output, "\tcmp{}\t$0, {}", suffix(size), operand)?;
        writeln!(self.output, "\tsete\t{}", reg_name(register, 1))?;
        writeln!(
            self.output,
            "\tmovzbl\t{}, {}",
            reg_name(register, 1),
            reg_name(register, 4)
        )?;

        let result = self.new_value(unary.ty.size(), Storage::None);
        self.assign(Some(result), Some(register));
        Ok(result)
    }

    fn negate(&mut self, unary: &Unary) -> Result<ValueId, CodeGenError> {
        let value = self.gen_expr(&unary.expr)?;
        let register = self.ensure_register(value)?;

        let size = self.value(value).size;
        writeln!(self.output, "\tneg{}\t{}", suffix(size), reg_name(register, size))?;

        let result = self.new_value(unary.ty.size(), Storage::None);
        self.assign(Some(result), Some(register));
        Ok(result)
    }

    /// The address of `*p` is just `p`; anything else takes a `leaq` on the
    /// operand's home.
    fn address(&mut self, unary: &Unary) -> Result<ValueId, CodeGenError> {
        if let Expression::Dereference(inner) = &*unary.expr {
            let pointer = self.gen_expr(&inner.expr)?;
            let register = self.ensure_register(pointer)?;
            let result = self.new_value(unary.ty.size(), Storage::None);
            self.assign(Some(result), Some(register));
            return Ok(result);
        }

        let result = self.new_value(unary.ty.size(), Storage::None);
        let register = self.getreg();
        self.assign(Some(result), Some(register));
        let source = self.place_operand(&unary.expr)?;
        writeln!(self.output, "\tleaq\t{}, {}", source, reg_name(register, 8))?;
        Ok(result)
    }

    /// Load through the pointer, reusing its register at the pointee width.
    fn dereference(&mut self, unary: &Unary) -> Result<ValueId, CodeGenError> {
        let pointer = self.gen_expr(&unary.expr)?;
        let register = self.ensure_register(pointer)?;

        let size = unary.ty.size();
        writeln!(
            self.output,
            "\tmov{}\t({}), {}",
            suffix(size),
            reg_name(register, 8),
            reg_name(register, size)
        )?;

        let result = self.new_value(size, Storage::None);
        self.assign(Some(result), Some(register));
        Ok(result)
    }

    /// Narrowing just carries the register; widening sign-extends.
    fn cast(&mut self, unary: &Unary) -> Result<ValueId, CodeGenError> {
        let source = unary.expr.ty().size();
        let target = unary.ty.size();

        let value = self.gen_expr(&unary.expr)?;
        let register = self.ensure_register(value)?;

        if source < target {
            let instruction = match (source, target) {
                (1, 4) => "movsbl",
                (1, 8) => "movsbq",
                _ => "movslq",
            };
            writeln!(
                self.output,
                "\t{}\t{}, {}",
                instruction,
                reg_name(register, source),
                reg_name(register, target)
            )?;
        }

        let result = self.new_value(target, Storage::None);
        self.assign(Some(result), Some(register));
        Ok(result)
    }

    /// SysV call: arguments generated right to left, overflow arguments
    /// pushed after aligning the stack, register arguments loaded into the
    /// parameter registers, every register flushed, then the call. The
    /// %eax-zeroing guard is only for unprototyped callees, which might be
    /// variadic for all we know.
    fn call(
        &mut self,
        callee: SymbolId,
        arguments: &[Expression],
        ty: &Type,
    ) -> Result<ValueId, CodeGenError> {
        let count = arguments.len();
        let mut values = Vec::with_capacity(count);
        for argument in arguments.iter().rev() {
            values.push(self.gen_expr(argument)?);
        }
        values.reverse();

        let mut bytes: i64 = 0;
        if count > NUM_PARAM_REGS {
            bytes = align((count - NUM_PARAM_REGS) as i64 * SIZEOF_PARAM);
            if bytes > 0 {
                writeln!(self.output, "\tsubq\t${}, %rsp", bytes)?;
            }
        }

        for index in (0..count).rev() {
            let value = values[index];
            if index >= NUM_PARAM_REGS {
                bytes += SIZEOF_PARAM;
                self.load(Some(value), RAX)?;
                writeln!(self.output, "\tpushq\t%rax")?;
            } else {
                self.load(Some(value), PARAM_REGS[index])?;
            }
            self.assign(Some(value), None);
        }

        // Flush everything still live before clobbering the caller-saved
        // world.
        for index in 0..NUM_REGS {
            self.load(None, Reg(index))?;
        }

        let name = self.symbols[callee].name.clone();
        let unprototyped = matches!(
            self.symbols[callee].ty.kind,
            TypeKind::Function(Parameters::Unprototyped)
        );
        if unprototyped {
            writeln!(self.output, "\tmovl\t$0, %eax")?;
        }
        writeln!(self.output, "\tcall\t{}{}", GLOBAL_PREFIX, name)?;
        if bytes > 0 {
            writeln!(self.output, "\taddq\t${}, %rsp", bytes)?;
        }

        let result = self.new_value(ty.size(), Storage::None);
        self.assign(Some(result), Some(RAX));
        Ok(result)
    }

    /// The operand of something we can take the address of or store into,
    /// without generating a load. Identifiers resolve straight to their
    /// home; anything else (only reachable on already-diagnosed programs)
    /// is generated and named so the output stays well-formed text.
    pub(super) fn place_operand(&mut self, expr: &Expression) -> Result<String, CodeGenError> {
        match expr {
            Expression::Identifier { symbol, .. } => Ok(self.symbol_operand(*symbol)),
            _ => {
                let value = self.gen_expr(expr)?;
                let text = self.operand(value);
                self.assign(Some(value), None);
                Ok(text)
            }
        }
    }
}
