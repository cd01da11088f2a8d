//! vitte-compiler — Lexer et compilateur Pratt à une passe du langage
//! Vitte, qui émet directement dans un [`vitte_core::Chunk`] sans passer par
//! un arbre de syntaxe intermédiaire.
//!
//! ## Modules
//! - [`lexer`] : scanner sans allocation, un `Token` par tranche de source.
//! - [`compiler`] : grammaire Pratt, résolution de portée/upvalue, émission.
//! - [`error`] : diagnostics de compilation accumulés en mode panique.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

pub mod compiler;
pub mod error;
pub mod lexer;

pub use compiler::compile;
pub use error::CompileError;
pub use lexer::{Lexer, Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;
    use vitte_core::{disassemble_chunk, Heap};

    fn compile_ok(src: &str) -> (vitte_core::ObjFunction, Heap) {
        let mut heap = Heap::new();
        match compile(src, &mut heap) {
            Ok(func) => (func, heap),
            Err(errs) => panic!("unexpected compile errors: {errs:?}"),
        }
    }

    fn compile_err(src: &str) -> Vec<CompileError> {
        let mut heap = Heap::new();
        match compile(src, &mut heap) {
            Ok(_) => panic!("expected compile errors, got a function"),
            Err(errs) => errs,
        }
    }

    #[test]
    fn compiles_trivial_expression_statement() {
        let (func, _heap) = compile_ok("1 + 2;");
        assert_eq!(func.arity, 0);
        assert!(!func.chunk.is_empty());
    }

    #[test]
    fn compiles_variable_declaration_and_print() {
        let (func, heap) = compile_ok("var x = 1; print x;");
        let dump = disassemble_chunk(&func.chunk, "<script>");
        assert!(dump.contains("OP_DEFINE_GLOBAL"));
        assert!(dump.contains("OP_PRINT"));
        drop(heap);
    }

    #[test]
    fn reports_unterminated_string() {
        let errs = compile_err("var x = \"abc;");
        assert!(errs.iter().any(|e| e.message.contains("Unterminated string")));
    }

    #[test]
    fn reports_invalid_assignment_target() {
        let errs = compile_err("1 + 2 = 3;");
        assert!(errs.iter().any(|e| e.message.contains("Invalid assignment target")));
    }

    #[test]
    fn reports_top_level_return() {
        let errs = compile_err("return 1;");
        assert!(errs.iter().any(|e| e.message.contains("Can't return from top-level code")));
    }

    #[test]
    fn compiles_function_with_closure_capture() {
        let (func, _heap) = compile_ok(
            r#"
            fun makeCounter() {
                var count = 0;
                fun inc() {
                    count = count + 1;
                    return count;
                }
                return inc;
            }
            "#,
        );
        let dump = disassemble_chunk(&func.chunk, "<script>");
        assert!(dump.contains("OP_CLOSURE"));
    }

    #[test]
    fn compiles_class_with_inheritance_and_super() {
        let (func, _heap) = compile_ok(
            r#"
            class Animal {
                speak() {
                    print "...";
                }
            }
            class Dog < Animal {
                speak() {
                    super.speak();
                    print "Woof";
                }
            }
            "#,
        );
        let dump = disassemble_chunk(&func.chunk, "<script>");
        assert!(dump.contains("OP_CLASS"));
        assert!(dump.contains("OP_INHERIT"));
        assert!(dump.contains("OP_METHOD"));
    }

    #[test]
    fn rejects_super_outside_class() {
        let errs = compile_err("fun f() { super.g(); }");
        assert!(errs.iter().any(|e| e.message.contains("Can't use 'super' outside of a class")));
    }

    #[test]
    fn rejects_this_outside_class() {
        let errs = compile_err("print this;");
        assert!(errs.iter().any(|e| e.message.contains("Can't use 'this' outside of a class")));
    }

    #[test]
    fn for_loop_desugars_to_jumps_and_loop() {
        let (func, _heap) = compile_ok("for (var i = 0; i < 3; i = i + 1) print i;");
        let dump = disassemble_chunk(&func.chunk, "<script>");
        assert!(dump.contains("OP_LOOP"));
        assert!(dump.contains("OP_JUMP_IF_FALSE"));
    }

    #[test]
    fn panic_mode_recovers_at_next_statement() {
        // Le `+` orphelin est une erreur ; la compilation doit repartir après
        // le `;` et ne pas empêcher de rapporter le reste du fichier.
        let errs = compile_err("var a = ; var b = 1;");
        assert!(!errs.is_empty());
    }
}
