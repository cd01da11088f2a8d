//! error.rs — Diagnostics de compilation (lexicaux et syntaxiques).

use thiserror::Error;

/// Un diagnostic de compilation unique, rattaché à une ligne source.
///
/// La compilation continue en mode panique après la première erreur ;
/// [`crate::compile`] accumule donc un `Vec<CompileError>` plutôt que de
/// s'arrêter à la première.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("[line {line}] Error{location}: {message}")]
pub struct CompileError {
    pub line: u32,
    /// `" at 'lexeme'"`, `" at end"`, ou vide pour un message qui ne porte
    /// pas sur un token précis (erreur du scanner déjà formulée).
    pub location: String,
    pub message: String,
}
