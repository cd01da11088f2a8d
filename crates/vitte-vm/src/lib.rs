//! vitte-vm — Machine virtuelle à pile pour le langage Vitte.
//!
//! Ce crate exécute le bytecode produit par `vitte-compiler` : boucle
//! fetch-decode-dispatch, frames d'appel, fermetures, classes et méthodes,
//! adossée au tas garbage-collecté de `vitte-core`.
//!
//! ```no_run
//! use vitte_vm::Vm;
//!
//! let mut vm = Vm::new();
//! vm.interpret("print 1 + 2;").unwrap();
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

mod error;
mod natives;
mod vm;

pub use error::{InterpretError, RuntimeError};
pub use vm::{Vm, VmOptions, FRAMES_MAX};

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Result<(), InterpretError> {
        Vm::new().interpret(source)
    }

    #[test]
    fn arithmetic_and_print() {
        assert!(run("print 1 + 2 * 3;").is_ok());
    }

    #[test]
    fn global_variables_round_trip() {
        assert!(run("var a = 1; var b = 2; print a + b;").is_ok());
    }

    #[test]
    fn undefined_global_read_is_a_runtime_error() {
        let err = run("print x;").unwrap_err();
        match err {
            InterpretError::Runtime(e) => assert!(e.message.contains("Undefined variable")),
            other => panic!("expected a runtime error, got {other:?}"),
        }
    }

    #[test]
    fn undefined_global_assignment_is_a_runtime_error() {
        let err = run("x = 1;").unwrap_err();
        match err {
            InterpretError::Runtime(e) => assert!(e.message.contains("Undefined variable")),
            other => panic!("expected a runtime error, got {other:?}"),
        }
    }

    #[test]
    fn closures_capture_locals_by_reference() {
        let source = r#"
            fun makeCounter() {
                var i = 0;
                fun count() {
                    i = i + 1;
                    print i;
                }
                return count;
            }
            var counter = makeCounter();
            counter();
            counter();
        "#;
        assert!(run(source).is_ok());
    }

    #[test]
    fn two_closures_from_the_same_function_have_independent_upvalues() {
        let source = r#"
            fun makeCounter() {
                var i = 0;
                fun count() {
                    i = i + 1;
                    return i;
                }
                return count;
            }
            var a = makeCounter();
            var b = makeCounter();
            a();
            a();
            print b();
        "#;
        assert!(run(source).is_ok());
    }

    #[test]
    fn classes_fields_and_methods() {
        let source = r#"
            class Counter {
                init() {
                    this.count = 0;
                }
                increment() {
                    this.count = this.count + 1;
                    return this.count;
                }
            }
            var c = Counter();
            c.increment();
            print c.increment();
        "#;
        assert!(run(source).is_ok());
    }

    #[test]
    fn inheritance_and_super_calls() {
        let source = r#"
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
            Dog().speak();
        "#;
        assert!(run(source).is_ok());
    }

    #[test]
    fn calling_a_non_callable_value_is_a_runtime_error() {
        let err = run("var x = 1; x();").unwrap_err();
        match err {
            InterpretError::Runtime(e) => assert!(e.message.contains("Can only call")),
            other => panic!("expected a runtime error, got {other:?}"),
        }
    }

    #[test]
    fn arity_mismatch_is_a_runtime_error() {
        let err = run("fun f(a, b) { return a + b; } f(1);").unwrap_err();
        match err {
            InterpretError::Runtime(e) => assert!(e.message.contains("Expected 2 arguments")),
            other => panic!("expected a runtime error, got {other:?}"),
        }
    }

    #[test]
    fn compile_errors_are_collected_not_abandoned_at_first() {
        let errs = match run("var = ; print") {
            Err(InterpretError::Compile(errs)) => errs,
            other => panic!("expected compile errors, got {other:?}"),
        };
        assert!(errs.len() >= 1);
    }

    #[test]
    fn stress_gc_does_not_corrupt_reachable_state() {
        let mut vm = Vm::with_options(VmOptions {
            stress_gc: true,
            ..VmOptions::default()
        });
        let source = r#"
            class Node {
                init(value) {
                    this.value = value;
                }
            }
            var a = Node("a");
            var b = Node("b");
            print a.value;
            print b.value;
        "#;
        assert!(vm.interpret(source).is_ok());
    }

    #[test]
    fn native_clock_returns_a_number() {
        assert!(run("print clock() > 0;").is_ok());
    }
}
