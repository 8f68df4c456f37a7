//! Semantic checker for Simple C
//!
//! Owns the scope stack and the symbol arena, records declarations, and
//! enforces the per-operator typing rules. Redeclarations are discarded and
//! the original retained. Diagnostics are collected rather than printed;
//! they never abort the compile.
//!
//! Every rule is absorbing over the error type: once a subexpression has
//! gone wrong and been reported, anything built from it stays silent.

use crate::scope::{OUTERMOST, Scopes, Symbol, SymbolId, SymbolTable};
use crate::types::{Specifier, Type};

pub struct Checker {
    pub symbols: SymbolTable,
    scopes: Scopes,
    pub diagnostics: Vec<String>,
}

impl Default for Checker {
    fn default() -> Self {
        Self::new()
    }
}

impl Checker {
    pub fn new() -> Self {
        Checker {
            symbols: SymbolTable::new(),
            scopes: Scopes::new(),
            diagnostics: Vec::new(),
        }
    }

    fn report(&mut self, message: String) {
        self.diagnostics.push(message);
    }

    pub fn open_scope(&mut self) {
        self.scopes.open();
    }

    pub fn close_scope(&mut self) {
        self.scopes.close();
    }

    /// File-scope symbols in declaration order.
    pub fn file_scope_symbols(&self) -> Vec<SymbolId> {
        self.scopes.symbols(OUTERMOST).to_vec()
    }

    /// Define a function. Functions always live in the outermost scope, and
    /// a definition replaces whatever was there: a previous definition is a
    /// redefinition error, a previous declaration with a different type is a
    /// conflict, but either way the new symbol wins so the body is checked
    /// against itself.
    pub fn define_function(&mut self, name: &str, ty: Type) -> SymbolId {
        if let Some(id) = self.scopes.find(OUTERMOST, name, &self.symbols) {
            let previous = &self.symbols[id].ty;
            if previous.is_function() && previous.parameters().is_some() {
                self.report(format!("redefinition of '{}'", name));
            } else if ty != *previous {
                self.report(format!("conflicting types for '{}'", name));
            }
            self.scopes.remove(OUTERMOST, name, &self.symbols);
        }

        let id = self.symbols.insert(Symbol::new(name, ty));
        self.scopes.insert(OUTERMOST, id);
        id
    }

    /// Declare a function, also always in the outermost scope. A
    /// redeclaration keeps the original; if the types disagree the
    /// just-parsed parameter list is simply dropped with the new type.
    pub fn declare_function(&mut self, name: &str, ty: Type) -> SymbolId {
        match self.scopes.find(OUTERMOST, name, &self.symbols) {
            None => {
                let id = self.symbols.insert(Symbol::new(name, ty));
                self.scopes.insert(OUTERMOST, id);
                id
            }
            Some(id) => {
                if ty != self.symbols[id].ty {
                    self.report(format!("conflicting types for '{}'", name));
                }
                id
            }
        }
    }

    /// Declare a variable in the current scope. The original declaration is
    /// retained on any redeclaration.
    pub fn declare_variable(&mut self, name: &str, ty: Type) -> SymbolId {
        match self.scopes.find(self.scopes.current(), name, &self.symbols) {
            None => {
                if ty.specifier == Specifier::Void && ty.indirection == 0 {
                    self.report(format!("'{}' has type void", name));
                }
                let id = self.symbols.insert(Symbol::new(name, ty));
                self.scopes.insert(self.scopes.current(), id);
                id
            }
            Some(id) => {
                if self.scopes.current() != OUTERMOST {
                    self.report(format!("redeclaration of '{}'", name));
                } else if ty != self.symbols[id].ty {
                    self.report(format!("conflicting types for '{}'", name));
                }
                id
            }
        }
    }

    /// Resolve an identifier use. An undeclared name is reported once and
    /// then installed with the error type so later uses stay quiet.
    pub fn check_identifier(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.scopes.lookup(name, &self.symbols) {
            return id;
        }
        self.report(format!("'{}' undeclared", name));
        let id = self.symbols.insert(Symbol::new(name, Type::error()));
        self.scopes.insert(self.scopes.current(), id);
        id
    }

    fn logical(&mut self, left: &Type, right: &Type, op: &str) -> Type {
        if left.is_error() || right.is_error() {
            return Type::error();
        }
        if left.promote().is_predicate() && right.promote().is_predicate() {
            Type::int()
        } else {
            self.report(format!("invalid operands to binary {}", op));
            Type::error()
        }
    }

    pub fn check_logical_or(&mut self, left: &Type, right: &Type) -> Type {
        self.logical(left, right, "||")
    }

    pub fn check_logical_and(&mut self, left: &Type, right: &Type) -> Type {
        self.logical(left, right, "&&")
    }

    /// The condition of an `if`, `while`, or `for`.
    pub fn check_test(&mut self, ty: &Type) -> Type {
        if ty.is_error() {
            return Type::error();
        }
        if ty.promote().is_predicate() {
            Type::int()
        } else {
            self.report("invalid type for test expression".to_string());
            Type::error()
        }
    }

    pub fn check_not(&mut self, ty: &Type) -> Type {
        if ty.is_error() {
            return Type::error();
        }
        if ty.promote().is_predicate() {
            Type::int()
        } else {
            self.report("invalid operand to unary !".to_string());
            Type::error()
        }
    }

    /// `*`, `/`, and `%`: both operands numeric; `long` wins.
    pub fn check_mul_div_rem(&mut self, left: &Type, right: &Type, op: &str) -> Type {
        if left.is_error() || right.is_error() {
            return Type::error();
        }
        let left = left.promote();
        let right = right.promote();
        if left.is_numeric() && right.is_numeric() {
            if left.specifier == Specifier::Long || right.specifier == Specifier::Long {
                Type::long()
            } else {
                Type::int()
            }
        } else {
            self.report(format!("invalid operands to binary {}", op));
            Type::error()
        }
    }

    pub fn check_negate(&mut self, ty: &Type) -> Type {
        if ty.is_error() {
            return Type::error();
        }
        let ty = ty.promote();
        if ty.is_numeric() {
            if ty.specifier == Specifier::Long {
                Type::long()
            } else {
                Type::int()
            }
        } else {
            self.report("invalid operand to unary -".to_string());
            Type::error()
        }
    }

    /// `<`, `>`, `<=`, `>=`: compatible predicate operands.
    pub fn check_relational(&mut self, left: &Type, right: &Type, op: &str) -> Type {
        if left.is_error() || right.is_error() {
            return Type::error();
        }
        if left.is_compatible_with(right)
            && left.promote().is_predicate()
            && right.promote().is_predicate()
        {
            Type::int()
        } else {
            self.report(format!("invalid operands to binary {}", op));
            Type::error()
        }
    }

    pub fn check_equality(&mut self, left: &Type, right: &Type, op: &str) -> Type {
        if left.is_error() || right.is_error() {
            return Type::error();
        }
        if left.is_compatible_with(right) {
            Type::int()
        } else {
            self.report(format!("invalid operands to binary {}", op));
            Type::error()
        }
    }

    /// `+`: numeric + numeric, or (non-`void *`) pointer + numeric in either
    /// order, yielding the pointer type.
    pub fn check_add(&mut self, left: &Type, right: &Type) -> Type {
        if left.is_error() || right.is_error() {
            return Type::error();
        }
        let l = left.promote();
        let r = right.promote();
        if l.is_numeric() && r.is_numeric() {
            if l.specifier == Specifier::Long || r.specifier == Specifier::Long {
                return Type::long();
            }
            return Type::int();
        }
        if l.is_pointer() && !l.is_void_pointer() && !l.is_function() && r.is_numeric() {
            return l;
        }
        if r.is_pointer() && !r.is_void_pointer() && !r.is_function() && l.is_numeric() {
            return r;
        }
        self.report("invalid operands to binary +".to_string());
        Type::error()
    }

    /// `-`: as `+`, plus pointer - pointer of identical type, which is a
    /// `long` element count.
    pub fn check_subtract(&mut self, left: &Type, right: &Type) -> Type {
        if left.is_error() || right.is_error() {
            return Type::error();
        }
        let l = left.promote();
        let r = right.promote();
        if l.is_numeric() && r.is_numeric() {
            if l.specifier == Specifier::Long || r.specifier == Specifier::Long {
                return Type::long();
            }
            return Type::int();
        }
        if l.is_pointer() && !l.is_void_pointer() && !l.is_function() {
            if r.is_numeric() {
                return l;
            }
            if r == l {
                return Type::long();
            }
        }
        self.report("invalid operands to binary -".to_string());
        Type::error()
    }

    pub fn check_dereference(&mut self, ty: &Type) -> Type {
        if ty.is_error() {
            return Type::error();
        }
        let ty = ty.promote();
        if ty.is_pointer() && !ty.is_void_pointer() && !ty.is_function() {
            Type::scalar(ty.specifier, ty.indirection - 1)
        } else {
            self.report("invalid operand to unary *".to_string());
            Type::error()
        }
    }

    pub fn check_address(&mut self, ty: &Type, lvalue: bool) -> Type {
        if ty.is_error() {
            return Type::error();
        }
        if !lvalue {
            self.report("lvalue required in expression".to_string());
            return Type::error();
        }
        Type::scalar(ty.specifier, ty.indirection + 1)
    }

    pub fn check_index(&mut self, left: &Type, index: &Type) -> Type {
        if left.is_error() || index.is_error() {
            return Type::error();
        }
        let l = left.promote();
        if l.is_pointer() && !l.is_void_pointer() && !l.is_function() && index.promote().is_numeric()
        {
            Type::scalar(l.specifier, l.indirection - 1)
        } else {
            self.report("invalid operands to binary []".to_string());
            Type::error()
        }
    }

    pub fn check_sizeof(&mut self, ty: &Type) -> Type {
        if ty.is_error() {
            return Type::error();
        }
        if ty.promote().is_predicate() {
            Type::long()
        } else {
            self.report("invalid operand to unary sizeof".to_string());
            Type::error()
        }
    }

    /// A call through a function name. Unprototyped callees accept any
    /// predicate arguments; prototyped ones check arity and compatibility.
    pub fn check_call(&mut self, callee: &Type, arguments: &[Type]) -> Type {
        if callee.is_error() || arguments.iter().any(Type::is_error) {
            return Type::error();
        }
        if !callee.is_function() {
            self.report("called object is not a function".to_string());
            return Type::error();
        }
        match callee.parameters() {
            None => {
                for argument in arguments {
                    if !argument.promote().is_predicate() {
                        self.report("invalid arguments to called function".to_string());
                        return Type::error();
                    }
                }
            }
            Some(parameters) => {
                if parameters.len() != arguments.len() {
                    self.report("invalid arguments to called function".to_string());
                    return Type::error();
                }
                for (argument, parameter) in arguments.iter().zip(parameters) {
                    if !argument.is_compatible_with(parameter) {
                        self.report("invalid arguments to called function".to_string());
                        return Type::error();
                    }
                }
            }
        }
        Type::scalar(callee.specifier, callee.indirection)
    }

    /// `return` checked against the enclosing function's return type.
    pub fn check_return(&mut self, return_type: &Type, ty: &Type) {
        if return_type.is_error() || ty.is_error() {
            return;
        }
        if !return_type.is_compatible_with(ty) {
            self.report("invalid return type".to_string());
        }
    }

    pub fn check_assignment(&mut self, left: &Type, right: &Type, lvalue: bool) {
        if left.is_error() || right.is_error() {
            return;
        }
        if !lvalue {
            self.report("lvalue required in expression".to_string());
            return;
        }
        if !left.is_compatible_with(right) {
            self.report("invalid operands to binary =".to_string());
        }
    }
}
