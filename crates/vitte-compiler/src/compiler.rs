//! compiler.rs — Compilateur Pratt à une passe : source → bytecode.
//!
//! Pas d'arbre de syntaxe intermédiaire : chaque règle de grammaire émet
//! directement dans le [`Chunk`] de la fonction en cours de compilation.
//! La chaîne de compilateurs imbriqués (une par `fun`/méthode) est modélisée
//! par une pile explicite ([`Compiler::functions`]) plutôt que par un
//! pointeur global mutable, pour que plusieurs compilations indépendantes
//! (REPL) ne partagent jamais d'état caché.

use vitte_core::chunk::MAX_CONSTANTS;
use vitte_core::{Chunk, Heap, ObjFunction, OpCode, Value};

use crate::error::CompileError;
use crate::lexer::{Lexer, Token, TokenKind};

const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

struct Local<'src> {
    name: &'src str,
    /// -1 tant que l'initialisateur du local n'a pas fini de s'exécuter.
    depth: i32,
    is_captured: bool,
}

struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

struct FunctionScope<'src> {
    function: ObjFunction,
    kind: FunctionKind,
    locals: Vec<Local<'src>>,
    upvalues: Vec<UpvalueDesc>,
    scope_depth: i32,
}

impl<'src> FunctionScope<'src> {
    fn new(kind: FunctionKind, name: Option<vitte_core::ObjRef>) -> Self {
        // Le slot 0 est réservé : `this` pour une méthode/initialisateur,
        // un emplacement anonyme pour le récepteur d'appel sinon.
        let slot0_name = if matches!(kind, FunctionKind::Method | FunctionKind::Initializer) {
            "this"
        } else {
            ""
        };
        Self {
            function: ObjFunction::new(name),
            kind,
            locals: vec![Local {
                name: slot0_name,
                depth: 0,
                is_captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

struct ClassScope {
    has_superclass: bool,
}

pub struct Compiler<'src> {
    heap: &'src mut Heap,
    lexer: Lexer<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<CompileError>,
    functions: Vec<FunctionScope<'src>>,
    classes: Vec<ClassScope>,
}

/// Compile une source complète en une [`ObjFunction`] de plus haut niveau
/// (`<script>`), ou renvoie la liste des diagnostics accumulés.
///
/// La fonction renvoyée n'est pas encore allouée sur le tas : c'est la VM
/// qui décide du moment où elle devient un objet GC-visible (en général
/// immédiatement, avant de construire la fermeture racine).
pub fn compile(source: &str, heap: &mut Heap) -> Result<ObjFunction, Vec<CompileError>> {
    let mut compiler = Compiler {
        heap,
        lexer: Lexer::new(source),
        previous: Token {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 0,
        },
        current: Token {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 0,
        },
        had_error: false,
        panic_mode: false,
        errors: Vec::new(),
        functions: vec![FunctionScope::new(FunctionKind::Script, None)],
        classes: Vec::new(),
    };
    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.emit_return();
    let script = compiler.functions.pop().expect("script scope always present");
    if compiler.had_error {
        Err(compiler.errors)
    } else {
        Ok(script.function)
    }
}

type PrefixFn = fn(&mut Compiler<'_>, bool);
type InfixFn = fn(&mut Compiler<'_>, bool);

struct ParseRule {
    prefix: Option<PrefixFn>,
    infix: Option<InfixFn>,
    precedence: Precedence,
}

fn get_rule(kind: TokenKind) -> ParseRule {
    use TokenKind::*;
    let (prefix, infix, precedence): (Option<PrefixFn>, Option<InfixFn>, Precedence) = match kind {
        LeftParen => (Some(Compiler::grouping), Some(Compiler::call), Precedence::Call),
        Dot => (None, Some(Compiler::dot), Precedence::Call),
        Minus => (Some(Compiler::unary), Some(Compiler::binary), Precedence::Term),
        Plus => (None, Some(Compiler::binary), Precedence::Term),
        Slash => (None, Some(Compiler::binary), Precedence::Factor),
        Star => (None, Some(Compiler::binary), Precedence::Factor),
        Bang => (Some(Compiler::unary), None, Precedence::None),
        BangEqual => (None, Some(Compiler::binary), Precedence::Equality),
        EqualEqual => (None, Some(Compiler::binary), Precedence::Equality),
        Greater => (None, Some(Compiler::binary), Precedence::Comparison),
        GreaterEqual => (None, Some(Compiler::binary), Precedence::Comparison),
        Less => (None, Some(Compiler::binary), Precedence::Comparison),
        LessEqual => (None, Some(Compiler::binary), Precedence::Comparison),
        Identifier => (Some(Compiler::variable), None, Precedence::None),
        String => (Some(Compiler::string), None, Precedence::None),
        Number => (Some(Compiler::number), None, Precedence::None),
        And => (None, Some(Compiler::and_), Precedence::And),
        Or => (None, Some(Compiler::or_), Precedence::Or),
        False => (Some(Compiler::literal), None, Precedence::None),
        Nil => (Some(Compiler::literal), None, Precedence::None),
        True => (Some(Compiler::literal), None, Precedence::None),
        Super => (Some(Compiler::super_), None, Precedence::None),
        This => (Some(Compiler::this_), None, Precedence::None),
        _ => (None, None, Precedence::None),
    };
    ParseRule { prefix, infix, precedence }
}

impl<'src> Compiler<'src> {
    // ------------------------------------------------------------------
    // Flux de tokens
    // ------------------------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.lexeme);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &'static str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.error_at(token, message);
    }

    fn error(&mut self, message: &str) {
        let token = self.previous;
        self.error_at(token, message);
    }

    fn error_at(&mut self, token: Token<'_>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let location = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!(" at '{}'", token.lexeme),
        };
        self.errors.push(CompileError {
            line: token.line,
            location,
            message: message.to_string(),
        });
        self.had_error = true;
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Émission
    // ------------------------------------------------------------------

    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.functions.last_mut().expect("function scope stack never empty").function.chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk().write_byte(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.current_chunk().write_op(op, line);
    }

    fn emit_ops(&mut self, a: OpCode, b: u8) {
        self.emit_op(a);
        self.emit_byte(b);
    }

    fn emit_return(&mut self) {
        match self.functions.last().unwrap().kind {
            FunctionKind::Initializer => self.emit_ops(OpCode::GetLocal, 0),
            _ => self.emit_op(OpCode::Nil),
        }
        self.emit_op(OpCode::Return);
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.current_chunk().add_constant(value);
        if idx >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk.");
            return;
        }
        let line = self.previous.line;
        if idx <= u8::MAX as usize {
            self.emit_op(OpCode::Constant);
            self.emit_byte(idx as u8);
        } else {
            self.emit_op(OpCode::ConstantLong);
            self.current_chunk().write_u24(idx as u32, line);
        }
    }

    /// Interne le lexème (sans guillemets pour une chaîne) comme une
    /// constante unique, utilisée par les opcodes qui référencent un nom
    /// (globales, propriétés, méthodes) : toujours un index un octet, comme
    /// le désassembleur de `vitte-core` l'attend pour ces opcodes.
    fn identifier_constant(&mut self, name: &str) -> u8 {
        let obj_ref = self.heap.intern(name);
        let idx = self.current_chunk().add_constant(Value::Obj(obj_ref));
        if idx > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        idx as u8
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk().len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let jump = self.current_chunk().len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
            return;
        }
        self.current_chunk().patch_u16_be_at(offset, jump as u16);
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.current_chunk().len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        let line = self.previous.line;
        self.current_chunk().write_u16_be(offset as u16, line);
    }

    fn emit_closure(&mut self, const_idx: u8, upvalues: &[UpvalueDesc]) {
        self.emit_ops(OpCode::Closure, const_idx);
        for up in upvalues {
            self.emit_byte(if up.is_local { 1 } else { 0 });
            self.emit_byte(up.index);
        }
    }

    // ------------------------------------------------------------------
    // Scopes / locals / upvalues
    // ------------------------------------------------------------------

    fn begin_scope(&mut self) {
        self.functions.last_mut().unwrap().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let scope = self.functions.last_mut().unwrap();
        scope.scope_depth -= 1;
        let depth = scope.scope_depth;
        while let Some(local) = scope.locals.last() {
            if local.depth <= depth {
                break;
            }
            if local.is_captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.functions.last_mut().unwrap().locals.pop();
        }
    }

    fn add_local(&mut self, name: &'src str) {
        let scope = self.functions.last_mut().unwrap();
        if scope.locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        scope.locals.push(Local {
            name,
            depth: -1,
            is_captured: false,
        });
    }

    fn declare_variable(&mut self) {
        let scope = self.functions.last().unwrap();
        if scope.scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let depth = scope.scope_depth;
        let duplicate = scope.locals.iter().rev().take_while(|l| l.depth == -1 || l.depth == depth).any(|l| l.name == name);
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn mark_initialized(&mut self) {
        let scope = self.functions.last_mut().unwrap();
        if scope.scope_depth == 0 {
            return;
        }
        let depth = scope.scope_depth;
        scope.locals.last_mut().unwrap().depth = depth;
    }

    fn parse_variable(&mut self, message: &'static str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.functions.last().unwrap().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.lexeme)
    }

    fn define_variable(&mut self, global: u8) {
        if self.functions.last().unwrap().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_ops(OpCode::DefineGlobal, global);
    }

    fn resolve_local(&mut self, fn_idx: usize, name: &str) -> Option<u8> {
        let scope = &self.functions[fn_idx];
        for (i, local) in scope.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    self.error("Can't read local variable in its own initializer.");
                }
                return Some(i as u8);
            }
        }
        None
    }

    fn resolve_upvalue(&mut self, fn_idx: usize, name: &str) -> Option<u8> {
        if fn_idx == 0 {
            return None;
        }
        if let Some(local_idx) = self.resolve_local(fn_idx - 1, name) {
            self.functions[fn_idx - 1].locals[local_idx as usize].is_captured = true;
            return Some(self.add_upvalue(fn_idx, local_idx, true));
        }
        if let Some(up_idx) = self.resolve_upvalue(fn_idx - 1, name) {
            return Some(self.add_upvalue(fn_idx, up_idx, false));
        }
        None
    }

    fn add_upvalue(&mut self, fn_idx: usize, index: u8, is_local: bool) -> u8 {
        let scope = &mut self.functions[fn_idx];
        for (i, up) in scope.upvalues.iter().enumerate() {
            if up.index == index && up.is_local == is_local {
                return i as u8;
            }
        }
        if scope.upvalues.len() >= MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        scope.upvalues.push(UpvalueDesc { index, is_local });
        scope.function.upvalue_count = scope.upvalues.len() as u32;
        (scope.upvalues.len() - 1) as u8
    }

    // ------------------------------------------------------------------
    // Déclarations
    // ------------------------------------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous.lexeme;
        let name_constant = self.identifier_constant(class_name);
        self.declare_variable();

        self.emit_ops(OpCode::Class, name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassScope { has_superclass: false });

        if self.match_token(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            self.variable(false);
            if self.previous.lexeme == class_name {
                self.error("A class can't inherit from itself.");
            }

            self.begin_scope();
            self.add_local("super");
            self.define_variable(0);

            self.named_variable(class_name, false);
            self.emit_op(OpCode::Inherit);
            self.classes.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(class_name, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);

        if self.classes.last().unwrap().has_superclass {
            self.end_scope();
        }
        self.classes.pop();
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let name = self.previous.lexeme;
        let constant = self.identifier_constant(name);
        let kind = if name == "init" { FunctionKind::Initializer } else { FunctionKind::Method };
        self.function(kind);
        self.emit_ops(OpCode::Method, constant);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    fn function(&mut self, kind: FunctionKind) {
        let name_ref = self.heap.intern(self.previous.lexeme);
        self.functions.push(FunctionScope::new(kind, Some(name_ref)));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                let scope = self.functions.last_mut().unwrap();
                scope.function.arity += 1;
                if scope.function.arity > 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        self.emit_return();
        let scope = self.functions.pop().unwrap();
        let func_ref = self.heap.alloc_function(scope.function);
        let const_idx = {
            let idx = self.current_chunk().add_constant(Value::Obj(func_ref));
            if idx > u8::MAX as usize {
                self.error("Too many constants in one chunk.");
                0
            } else {
                idx as u8
            }
        };
        self.emit_closure(const_idx, &scope.upvalues);
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn return_statement(&mut self) {
        if self.functions.last().unwrap().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.functions.last().unwrap().kind == FunctionKind::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // pas d'initialisateur
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().len();
        let mut exit_jump: Option<usize> = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk().len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = get_rule(self.previous.kind).prefix;
        let Some(prefix) = prefix else {
            self.error("Expect expression.");
            return;
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            let infix = get_rule(self.previous.kind).infix.expect("rule table precedence implies an infix fn");
            infix(self, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self.previous.lexeme.parse().expect("lexer only emits well-formed numbers");
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let raw = self.previous.lexeme;
        let text = &raw[1..raw.len() - 1];
        let obj_ref = self.heap.intern(text);
        self.emit_constant(Value::Obj(obj_ref));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => unreachable!("literal() only called for literal tokens"),
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            _ => unreachable!("unary() only called for unary operator tokens"),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let rule = get_rule(operator);
        self.parse_precedence(rule.precedence.next());
        match operator {
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => unreachable!("binary() only called for binary operator tokens"),
        }
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let argc = self.argument_list();
        self.emit_ops(OpCode::Call, argc);
    }

    fn argument_list(&mut self) -> u8 {
        let mut argc: u32 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if argc == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                argc += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        argc.min(255) as u8
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.identifier_constant(self.previous.lexeme);
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_ops(OpCode::SetProperty, name);
        } else if self.match_token(TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.emit_op(OpCode::Invoke);
            self.emit_byte(name);
            self.emit_byte(argc);
        } else {
            self.emit_ops(OpCode::GetProperty, name);
        }
    }

    fn this_(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.named_variable("this", false);
    }

    fn super_(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self.classes.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name = self.identifier_constant(self.previous.lexeme);

        self.named_variable("this", false);
        if self.match_token(TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.named_variable("super", false);
            self.emit_op(OpCode::SuperInvoke);
            self.emit_byte(name);
            self.emit_byte(argc);
        } else {
            self.named_variable("super", false);
            self.emit_ops(OpCode::GetSuper, name);
        }
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous.lexeme, can_assign);
    }

    fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        let fn_idx = self.functions.len() - 1;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(fn_idx, name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue(fn_idx, name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let arg = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, arg)
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_ops(set_op, arg);
        } else {
            self.emit_ops(get_op, arg);
        }
    }
}
