//! Statement and function code generation
//!
//! Statements own the control-flow labels and the statement-boundary
//! invariant: after each statement in a block, no register holds a value.
//! Functions own frame layout: locals and the first six parameters get
//! descending slots below %rbp, overflow parameters already sit above it,
//! and the final frame size is bound late through the `<name>.size` symbol.

use super::platform::{GLOBAL_PREFIX, NUM_PARAM_REGS, SIZEOF_PARAM, SIZEOF_REG};
use super::registers::{NUM_REGS, PARAM_REGS, RAX, reg_name};
use super::state::{Storage, align, suffix};
use super::{CodeGen, CodeGenError};
use crate::ast::{Block, Expression, Function, Statement};
use std::fmt::Write as _;

impl CodeGen<'_> {
    pub(super) fn generate_function(&mut self, function: &Function) -> Result<(), CodeGenError> {
        self.allocate(function);
        self.values.clear();
        self.registers = [None; NUM_REGS];
        self.funcname = self.symbols[function.symbol].name.clone();

        writeln!(self.output, "{}{}:", GLOBAL_PREFIX, self.funcname)?;
        writeln!(self.output, "\tpushq\t%rbp")?;
        writeln!(self.output, "\tmovq\t%rsp, %rbp")?;
        writeln!(self.output, "\tmovl\t${}.size, %eax", self.funcname)?;
        writeln!(self.output, "\tsubq\t%rax, %rsp")?;

        // Spill register-passed parameters into their assigned slots.
        for (index, &parameter) in function.parameters.iter().take(NUM_PARAM_REGS).enumerate() {
            let size = self.symbols[parameter].ty.size();
            let slot = self.symbols[parameter].offset;
            writeln!(
                self.output,
                "\tmov{}\t{}, {}(%rbp)",
                suffix(size),
                reg_name(PARAM_REGS[index], size),
                slot
            )?;
        }

        self.generate_block(&function.body)?;

        writeln!(self.output)?;
        writeln!(self.output, "{}.exit:", self.funcname)?;
        writeln!(self.output, "\tmovq\t%rbp, %rsp")?;
        writeln!(self.output, "\tpopq\t%rbp")?;
        writeln!(self.output, "\tret")?;
        writeln!(self.output)?;

        // Spills may have grown the frame during emission, so the size is
        // only known now; pad it out to the ABI alignment.
        let mut offset = self.offset;
        offset -= align(offset - 2 * SIZEOF_REG);
        writeln!(self.output, "\t.set\t{}.size, {}", self.funcname, -offset)?;
        writeln!(self.output, "\t.globl\t{}{}", GLOBAL_PREFIX, self.funcname)?;
        writeln!(self.output)?;
        Ok(())
    }

    /// Assign frame offsets: parameters one through six and every local get
    /// descending negative slots; parameters seven and up were pushed by the
    /// caller and start at `2 * SIZEOF_REG` above %rbp.
    fn allocate(&mut self, function: &Function) {
        let mut offset: i64 = 0;
        for (index, &parameter) in function.parameters.iter().enumerate() {
            if index < NUM_PARAM_REGS {
                offset -= self.symbols[parameter].ty.size() as i64;
                self.symbols[parameter].offset = offset;
            } else {
                self.symbols[parameter].offset =
                    2 * SIZEOF_REG + SIZEOF_PARAM * (index - NUM_PARAM_REGS) as i64;
            }
        }
        self.allocate_block(&function.body, &mut offset);
        self.offset = offset;
    }

    fn allocate_block(&mut self, block: &Block, offset: &mut i64) {
        for &declaration in &block.declarations {
            *offset -= self.symbols[declaration].ty.size() as i64;
            self.symbols[declaration].offset = *offset;
        }
        for statement in &block.statements {
            self.allocate_statement(statement, offset);
        }
    }

    fn allocate_statement(&mut self, statement: &Statement, offset: &mut i64) {
        match statement {
            Statement::Block(block) => self.allocate_block(block, offset),
            Statement::While { body, .. } => self.allocate_statement(body, offset),
            Statement::For { body, .. } => self.allocate_statement(body, offset),
            Statement::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.allocate_statement(then_branch, offset);
                if let Some(else_branch) = else_branch {
                    self.allocate_statement(else_branch, offset);
                }
            }
            _ => {}
        }
    }

    pub(super) fn generate_block(&mut self, block: &Block) -> Result<(), CodeGenError> {
        for statement in &block.statements {
            self.generate_statement(statement)?;
            debug_assert!(
                self.registers.iter().all(Option::is_none),
                "register still bound at statement boundary"
            );
        }
        Ok(())
    }

    fn generate_statement(&mut self, statement: &Statement) -> Result<(), CodeGenError> {
        match statement {
            Statement::Simple(expr) => {
                let value = self.gen_expr(expr)?;
                self.assign(Some(value), None);
            }
            Statement::Assignment { left, right } => self.assignment(left, right)?,
            Statement::Block(block) => self.generate_block(block)?,
            Statement::While { condition, body } => {
                if self.config.emit_comments {
                    writeln!(self.output, "# while")?;
                }
                let top = self.new_label();
                let exit = self.new_label();
                writeln!(self.output, ".L{}:", top)?;
                self.test(condition, exit, false)?;
                self.generate_statement(body)?;
                writeln!(self.output, "\tjmp\t.L{}", top)?;
                writeln!(self.output, ".L{}:", exit)?;
            }
            Statement::For {
                init,
                condition,
                step,
                body,
            } => {
                if self.config.emit_comments {
                    writeln!(self.output, "# for")?;
                }
                let top = self.new_label();
                let exit = self.new_label();
                self.generate_statement(init)?;
                writeln!(self.output, ".L{}:", top)?;
                self.test(condition, exit, false)?;
                self.generate_statement(body)?;
                self.generate_statement(step)?;
                writeln!(self.output, "\tjmp\t.L{}", top)?;
                writeln!(self.output, ".L{}:", exit)?;
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.config.emit_comments {
                    writeln!(self.output, "# if")?;
                }
                let then_label = self.new_label();
                let else_label = self.new_label();
                let exit = self.new_label();

                self.test(condition, then_label, true)?;
                writeln!(self.output, "\tjmp\t.L{}", else_label)?;

                writeln!(self.output, ".L{}:", then_label)?;
                self.generate_statement(then_branch)?;
                writeln!(self.output, "\tjmp\t.L{}", exit)?;

                writeln!(self.output, ".L{}:", else_label)?;
                if let Some(else_branch) = else_branch {
                    self.generate_statement(else_branch)?;
                }
                writeln!(self.output, "\tjmp\t.L{}", exit)?;
                writeln!(self.output, ".L{}:", exit)?;
            }
            Statement::Return(expr) => {
                let value = self.gen_expr(expr)?;
                self.load(Some(value), RAX)?;
                writeln!(self.output, "\tjmp\t{}.exit", self.funcname)?;
                self.assign(Some(value), None);
            }
        }
        Ok(())
    }

    /// Stores go through one of two shapes: through a pointer when the left
    /// side is a dereference, otherwise straight to the target's home. The
    /// store width follows the dereferenced type in the first case and the
    /// right-hand side in the second.
    fn assignment(&mut self, left: &Expression, right: &Expression) -> Result<(), CodeGenError> {
        let value = self.gen_expr(right)?;

        if let Expression::Dereference(inner) = left {
            let pointer = self.gen_expr(&inner.expr)?;
            self.ensure_register(pointer)?;
            if !matches!(self.value(value).storage, Storage::Immediate(_)) {
                self.ensure_register(value)?;
            }
            let size = left.ty().size();
            let source = self.operand_sized(value, size);
            let target = self.operand(pointer);
            writeln!(self.output, "\tmov{}\t{}, ({})", suffix(size), source, target)?;
            self.assign(Some(pointer), None);
        } else {
            if !matches!(self.value(value).storage, Storage::Immediate(_)) {
                self.ensure_register(value)?;
            }
            let size = self.value(value).size;
            let source = self.operand(value);
            let target = self.place_operand(left)?;
            writeln!(self.output, "\tmov{}\t{}, {}", suffix(size), source, target)?;
        }

        self.assign(Some(value), None);
        Ok(())
    }

    /// Evaluate an expression as a condition: compare against zero and jump
    /// to `label` when the outcome matches `if_true`. The register is freed
    /// either way.
    pub(super) fn test(
        &mut self,
        expr: &Expression,
        label: usize,
        if_true: bool,
    ) -> Result<(), CodeGenError> {
        let value = self.gen_expr(expr)?;
        self.ensure_register(value)?;

        let size = self.value(value).size;
        let operand = self.operand(value);
        writeln!(self.output, "\tcmp{}\t$0, {}", suffix(size), operand)?;
        writeln!(
            self.output,
            "\t{}\t.L{}",
            if if_true { "jne" } else { "je" },
            label
        )?;

        self.assign(Some(value), None);
        Ok(())
    }
}
