//! Simple C compiler library
//!
//! Compiles Simple C — a statically-typed subset of C with `int`, `char`,
//! `long`, and `void`, scalars, arrays, and pointers — to x86-64 assembly
//! (System V ABI, AT&T syntax).
//!
//! The pipeline is a single pass: the recursive-descent [`Parser`] drives
//! the semantic [`checker::Checker`] while building a typed AST, and
//! [`codegen`] walks that AST emitting assembly text. Syntax errors are
//! fatal and surface as the `Err` of [`compile`]; semantic diagnostics are
//! collected and returned alongside whatever assembly was produced.

pub mod ast;
pub mod checker;
pub mod codegen;
pub mod config;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod types;

pub use checker::Checker;
pub use codegen::CodeGenError;
pub use config::CompilerConfig;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
pub use types::{Parameters, Specifier, Type};

/// Result of a successful compile: the assembly text plus any semantic
/// diagnostics. Diagnostics do not make a compile fail; the first syntax
/// error does.
pub struct CompileOutput {
    pub assembly: String,
    pub diagnostics: Vec<String>,
}

/// Compile Simple C source to x86-64 assembly.
pub fn compile(source: &str, config: &CompilerConfig) -> Result<CompileOutput, String> {
    let mut program = Parser::new(source).parse()?;
    let diagnostics = std::mem::take(&mut program.diagnostics);

    if !diagnostics.is_empty() && !config.continue_after_errors {
        return Ok(CompileOutput {
            assembly: String::new(),
            diagnostics,
        });
    }

    let assembly = codegen::generate(&mut program, config).map_err(|e| e.to_string())?;
    Ok(CompileOutput {
        assembly,
        diagnostics,
    })
}

/// Compile with default configuration and return just the assembly.
pub fn compile_to_asm(source: &str) -> Result<String, String> {
    compile(source, &CompilerConfig::default()).map(|output| output.assembly)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asm(source: &str) -> String {
        compile_to_asm(source).expect("program should compile")
    }

    /// The line immediately preceding the first occurrence of `needle`.
    fn line_before<'a>(haystack: &'a str, needle: &str) -> &'a str {
        let position = haystack.find(needle).expect("needle not found");
        haystack[..position].lines().next_back().unwrap_or("")
    }

    #[test]
    fn test_global_scalar_emits_comm() {
        let output = asm("int x;");
        assert!(output.contains("\t.comm\tx, 4"), "{}", output);
    }

    #[test]
    fn test_global_array_emits_full_size() {
        let output = asm("char buffer[40]; long counts[10];");
        assert!(output.contains("\t.comm\tbuffer, 40"), "{}", output);
        assert!(output.contains("\t.comm\tcounts, 80"), "{}", output);
    }

    #[test]
    fn test_function_symbols_are_not_comm() {
        let output = asm("int f(void) { return 0; }");
        assert!(!output.contains(".comm\tf"), "{}", output);
        assert!(output.contains("\t.globl\tf"), "{}", output);
    }

    #[test]
    fn test_constant_addition() {
        let output = asm("int f() { return 1+2; }");
        assert!(output.contains("f:\n\tpushq\t%rbp\n\tmovq\t%rsp, %rbp"), "{}", output);
        assert!(output.contains("\tmovl\t$1, %eax"), "{}", output);
        assert!(output.contains("\taddl\t$2, %eax"), "{}", output);
        assert!(output.contains("\tjmp\tf.exit"), "{}", output);

        // The late-bound frame size is padded to the stack alignment.
        let set_line = output
            .lines()
            .find(|line| line.starts_with("\t.set\tf.size, "))
            .expect("missing .set");
        let size: i64 = set_line.rsplit(' ').next().unwrap().parse().unwrap();
        assert_eq!(size % 16, 0, "{}", set_line);
        assert!(size >= 0, "{}", set_line);
    }

    #[test]
    fn test_while_loop_shape() {
        let output = asm("int main() { int a; a = 0; while (a < 10) a = a + 1; return a; }");
        // One backward jump, one forward conditional exit, one epilogue label.
        assert_eq!(output.matches("\tjmp\t.L").count(), 1, "{}", output);
        assert_eq!(output.matches("\tje\t.L").count(), 1, "{}", output);
        assert_eq!(output.matches(".exit:").count(), 1, "{}", output);
    }

    #[test]
    fn test_prototyped_call_has_no_eax_guard() {
        let output = asm("void f(void) { } int main() { f(); return 0; }");
        assert!(output.contains("\tcall\tf"), "{}", output);
        assert_ne!(line_before(&output, "\tcall\tf\n"), "\tmovl\t$0, %eax", "{}", output);
    }

    #[test]
    fn test_unprototyped_call_zeroes_eax() {
        let output = asm("int g(); int main() { g(); return 0; }");
        assert_eq!(line_before(&output, "\tcall\tg\n"), "\tmovl\t$0, %eax", "{}", output);
    }

    #[test]
    fn test_store_through_pointer() {
        let output = asm("int main() { int *p; *p = 5; return 0; }");
        assert!(output.contains("\tmovl\t$5, (%"), "{}", output);
    }

    #[test]
    fn test_parameters_spill_into_slots() {
        let output = asm("int add(int a, int b) { return a + b; }");
        assert!(output.contains("\tmovl\t%edi, -4(%rbp)"), "{}", output);
        assert!(output.contains("\tmovl\t%esi, -8(%rbp)"), "{}", output);
    }

    #[test]
    fn test_seventh_argument_goes_to_stack() {
        let output = asm(
            "int f(int a, int b, int c, int d, int e, int g, int h) { return h; } \
             int main() { return f(1, 2, 3, 4, 5, 6, 7); }",
        );
        // Callee reads it above the saved frame pointer.
        assert!(output.contains("16(%rbp)"), "{}", output);
        // Caller aligns, pushes, and reclaims.
        assert!(output.contains("\tsubq\t$8, %rsp"), "{}", output);
        assert!(output.contains("\tpushq\t%rax"), "{}", output);
        assert!(output.contains("\taddq\t$16, %rsp"), "{}", output);
    }

    #[test]
    fn test_short_circuit_or() {
        let output = asm("int a(); int b(); int main() { a() || b(); return 0; }");
        let first = output.find("\tcall\ta").expect("call a");
        let second = output.find("\tcall\tb").expect("call b");
        assert!(first < second, "{}", output);
        // The second call is only reached when the first came back zero.
        let between = &output[first..second];
        assert!(between.contains("\tjne\t.L"), "{}", output);
    }

    #[test]
    fn test_live_value_spills_across_call() {
        let output = asm(
            "int id(int n) { return n; } \
             int main() { int a; a = 2; return a*a + id(a); }",
        );
        // The product is flushed to a spill slot before the call and the
        // final add reads the call result against a reloaded value.
        assert!(output.contains("\tmovl\t%eax, -8(%rbp)"), "{}", output);
        assert!(output.contains("\tmovl\t-8(%rbp), "), "{}", output);
    }

    #[test]
    fn test_index_scales_by_element_size() {
        let output = asm("long a[4]; int main(void) { int i; i = 1; a[i] = 9; return 0; }");
        assert!(output.contains("\timulq\t$8, "), "{}", output);
        assert!(output.contains("\tleaq\ta, "), "{}", output);
    }

    #[test]
    fn test_division_uses_idiv() {
        let output = asm("int main(void) { int a; a = 7; return a / 2; }");
        assert!(output.contains("\tcltd"), "{}", output);
        assert!(output.contains("\tidivl\t%ecx"), "{}", output);

        let output = asm("long f(long a, long b) { return a % b; }");
        assert!(output.contains("\tcqto"), "{}", output);
        assert!(output.contains("\tidivq\t%rcx"), "{}", output);
    }

    #[test]
    fn test_comparison_materializes_flag() {
        let output = asm("int f(int a, int b) { return a <= b; }");
        assert!(output.contains("\tsetle\t"), "{}", output);
        assert!(output.contains("\tmovzbl\t"), "{}", output);
    }

    #[test]
    fn test_string_literals_land_in_data() {
        let output = asm(r#"char *s; int main() { s = "hi\n"; return 0; }"#);
        assert!(output.contains("\tmovq\t$.L0, "), "{}", output);
        assert!(output.contains("\t.data\n.L0:\t.asciz\t\"hi\\n\""), "{}", output);
    }

    #[test]
    fn test_string_literals_are_interned() {
        let output = asm(r#"char *s; int main() { s = "x"; s = "x"; return 0; }"#);
        assert_eq!(output.matches(".asciz").count(), 1, "{}", output);
    }

    #[test]
    fn test_undeclared_is_diagnosed_not_fatal() {
        let output = compile(
            "int x; int main() { y = 1; return 0; }",
            &CompilerConfig::default(),
        )
        .expect("semantic errors are not fatal");
        assert_eq!(output.diagnostics, vec!["'y' undeclared"]);
        assert!(!output.assembly.is_empty());
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        assert_eq!(
            compile_to_asm("int main() { return 0 }").unwrap_err(),
            "syntax error at '}'"
        );
        assert_eq!(
            compile_to_asm("int main() {").unwrap_err(),
            "syntax error at end of file"
        );
    }

    #[test]
    fn test_comments_can_be_disabled() {
        let source = "int main() { int a; a = 0; while (a) a = 0; return 0; }";
        let with = compile(source, &CompilerConfig::default()).unwrap().assembly;
        let without = compile(source, &CompilerConfig::new().with_comments(false))
            .unwrap()
            .assembly;
        assert!(with.contains("# while"));
        assert!(!without.contains("# while"));
    }

    #[test]
    fn test_bail_on_errors_can_be_requested() {
        let config = CompilerConfig::new().with_continue_after_errors(false);
        let output = compile("int main() { y = 1; return 0; }", &config).unwrap();
        assert!(output.assembly.is_empty());
        assert_eq!(output.diagnostics, vec!["'y' undeclared"]);
    }

    #[test]
    fn test_nested_blocks_and_shadowing() {
        let output = asm(
            "int main(void) { int a; a = 1; { int a; a = 2; } return a; }",
        );
        // Two distinct slots.
        assert!(output.contains("\tmovl\t$1, -4(%rbp)"), "{}", output);
        assert!(output.contains("\tmovl\t$2, -8(%rbp)"), "{}", output);
    }

    #[test]
    fn test_dereference_loads_through_pointer() {
        let output = asm("int f(int *p) { return *p; }");
        assert!(output.contains("\tmovl\t(%"), "{}", output);
    }

    #[test]
    fn test_address_of_local() {
        let output = asm("int main(void) { int a; int *p; p = &a; a = 0; return *p; }");
        assert!(output.contains("\tleaq\t-4(%rbp), "), "{}", output);
    }

    #[test]
    fn test_char_widen_through_cast() {
        let output = asm("int f(char c) { return c + 1; }");
        assert!(output.contains("\tmovsbl\t"), "{}", output);
    }
}
