//! error.rs — Erreurs runtime et résultat global d'une interprétation.

use std::fmt;

use vitte_compiler::CompileError;

/// Une erreur runtime porte son message et l'instantané de la pile
/// d'appels au moment où elle a été levée (innermost en premier), pour
/// produire la trace `[line N] in <fn>()` affichée par le pilote CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub message: String,
    /// Une ligne par frame active, de la plus interne à la plus externe.
    pub trace: Vec<String>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        for (i, line) in self.trace.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// Issue d'un appel à [`crate::Vm::interpret`] : soit le succès, soit l'une
/// des deux familles d'échec (une erreur de compilation regroupe tous les
/// diagnostics accumulés en mode panique ; une erreur runtime est unique,
/// la première rencontrée).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
    Compile(Vec<CompileError>),
    Runtime(RuntimeError),
}

impl fmt::Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpretError::Compile(errs) => {
                for (i, e) in errs.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{e}")?;
                }
                Ok(())
            }
            InterpretError::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for InterpretError {}
