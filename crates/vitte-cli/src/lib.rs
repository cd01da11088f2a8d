//! vitte-cli — pilote REPL et fichier du langage Vitte.
//!
//! Ce crate ne connaît ni le lexer, ni le compilateur, ni la VM en détail :
//! il se contente de choisir entre REPL et exécution de fichier, de lire la
//! source, de déléguer l'interprétation à [`vitte_vm::Vm`] et de traduire le
//! résultat en code de sortie processus (§6 de la spécification : 0 succès,
//! 64 usage, 65 erreur de compilation, 70 erreur runtime, 74 E/S).
//!
//! L'analyse des arguments est volontairement écrite à la main plutôt que
//! confiée à `clap` : le contrat "tout autre nombre d'arguments → usage sur
//! stderr, code 64" porte sur le comptage brut des arguments positionnels,
//! ce que la machinerie de sous-commandes de `clap` ne rend pas avec le code
//! de sortie exact attendu (voir DESIGN.md).

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

use std::fs;
use std::io::{self, BufRead, Write as _};
use std::path::{Path, PathBuf};

use vitte_vm::{InterpretError, Vm, VmOptions};

pub const EXIT_OK: u8 = 0;
pub const EXIT_USAGE: u8 = 64;
pub const EXIT_COMPILE_ERROR: u8 = 65;
pub const EXIT_RUNTIME_ERROR: u8 = 70;
pub const EXIT_IO_ERROR: u8 = 74;

/// Drapeaux de diagnostic — aucun n'a de contrat comportemental au-delà de
/// "peut être activé" (§4.1 PURPOSE & SCOPE : disassembly/debug logging est
/// exclu du cœur). Ils n'affectent ni stdout, ni les codes de sortie.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    /// Trace d'exécution instruction par instruction (`tracing::trace!`).
    pub trace: bool,
    /// Force une collecte du GC à chaque allocation.
    pub stress_gc: bool,
}

impl Flags {
    fn to_vm_options(self) -> VmOptions {
        VmOptions {
            trace: self.trace,
            stress_gc: self.stress_gc,
            ..VmOptions::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Repl(Flags),
    RunFile(PathBuf, Flags),
    /// Nombre d'arguments positionnels incompatible, ou drapeau inconnu.
    Usage,
}

/// Classe les arguments de ligne de commande (sans `argv[0]`).
///
/// Les drapeaux reconnus (`--trace`, `--trace-steps`, `--stress-gc`) sont
/// acceptés dans n'importe quel ordre autour d'au plus un argument
/// positionnel (le chemin du fichier source). Tout drapeau inconnu ou tout
/// second argument positionnel retombe sur [`Mode::Usage`], à l'image du
/// `clox` de référence qui ne tolère que `argc == 1` (REPL) ou `argc == 2`
/// (fichier).
pub fn classify_args<I>(args: I) -> Mode
where
    I: IntoIterator<Item = String>,
{
    let mut flags = Flags::default();
    let mut positional: Option<String> = None;

    for arg in args {
        match arg.as_str() {
            "--trace" | "--trace-steps" => flags.trace = true,
            "--stress-gc" => flags.stress_gc = true,
            _ if arg.starts_with('-') => return Mode::Usage,
            _ if positional.is_some() => return Mode::Usage,
            _ => positional = Some(arg),
        }
    }

    match positional {
        None => Mode::Repl(flags),
        Some(path) => Mode::RunFile(PathBuf::from(path), flags),
    }
}

/// Point d'entrée appelé par `main` ; renvoie le code de sortie processus.
pub fn run<I>(args: I) -> u8
where
    I: IntoIterator<Item = String>,
{
    match classify_args(args) {
        Mode::Usage => {
            eprintln!("Usage: vitte [path]");
            EXIT_USAGE
        }
        Mode::Repl(flags) => {
            repl(flags.to_vm_options());
            EXIT_OK
        }
        Mode::RunFile(path, flags) => run_file(&path, flags.to_vm_options()),
    }
}

/// Boucle interactive ligne-à-ligne : une seule VM persiste sur toute la
/// session (les globales et classes déclarées à une invite restent
/// visibles aux suivantes), mais chaque ligne est compilée indépendamment.
/// Une erreur n'interrompt jamais la boucle (§6 : "errors do not terminate
/// the REPL") ; seule une fin de flux (Ctrl-D) y met fin.
fn repl(options: VmOptions) {
    let mut vm = Vm::with_options(options);
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => {
                println!();
                break;
            }
            Ok(_) => {
                if let Err(err) = vm.interpret(&line) {
                    report_language_error(&err);
                }
            }
        }
    }
}

/// Lit `path` en entier puis l'interprète une seule fois dans une VM
/// fraîche. Renvoie le code de sortie correspondant à l'issue (§6/§7).
fn run_file(path: &Path, options: VmOptions) -> u8 {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Could not open file \"{}\": {e}", path.display());
            return EXIT_IO_ERROR;
        }
    };

    let mut vm = Vm::with_options(options);
    match vm.interpret(&source) {
        Ok(()) => EXIT_OK,
        Err(InterpretError::Compile(errs)) => {
            for e in &errs {
                eprintln!("{e}");
            }
            EXIT_COMPILE_ERROR
        }
        Err(InterpretError::Runtime(e)) => {
            eprintln!("{e}");
            EXIT_RUNTIME_ERROR
        }
    }
}

fn report_language_error(err: &InterpretError) {
    match err {
        InterpretError::Compile(errs) => {
            for e in errs {
                eprintln!("{e}");
            }
        }
        InterpretError::Runtime(e) => eprintln!("{e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_args_means_repl() {
        assert_eq!(classify_args(args(&[])), Mode::Repl(Flags::default()));
    }

    #[test]
    fn single_path_means_run_file() {
        assert_eq!(
            classify_args(args(&["script.vitte"])),
            Mode::RunFile(PathBuf::from("script.vitte"), Flags::default())
        );
    }

    #[test]
    fn two_positional_args_is_usage() {
        assert_eq!(classify_args(args(&["a.vitte", "b.vitte"])), Mode::Usage);
    }

    #[test]
    fn unknown_flag_is_usage() {
        assert_eq!(classify_args(args(&["--bogus"])), Mode::Usage);
    }

    #[test]
    fn trace_flag_can_precede_or_follow_the_path() {
        let expected = Mode::RunFile(PathBuf::from("a.vitte"), Flags { trace: true, stress_gc: false });
        assert_eq!(classify_args(args(&["--trace", "a.vitte"])), expected.clone());
        assert_eq!(classify_args(args(&["a.vitte", "--trace"])), expected);
    }

    #[test]
    fn stress_gc_flag_alone_still_means_repl() {
        assert_eq!(classify_args(args(&["--stress-gc"])), Mode::Repl(Flags { trace: false, stress_gc: true }));
    }

    #[test]
    fn run_file_reports_io_error_on_missing_path() {
        let missing = PathBuf::from("/nonexistent/path/to/a/vitte/script/that/does/not/exist.vitte");
        let code = run_file(&missing, VmOptions::default());
        assert_eq!(code, EXIT_IO_ERROR);
    }

    #[test]
    fn run_file_runs_source_to_completion() {
        let mut path = std::env::temp_dir();
        path.push(format!("vitte-cli-test-{}.vitte", std::process::id()));
        fs::write(&path, "print 1 + 2;").expect("write temp script");
        let code = run_file(&path, VmOptions::default());
        let _ = fs::remove_file(&path);
        assert_eq!(code, EXIT_OK);
    }

    #[test]
    fn run_file_maps_compile_error_to_65() {
        let mut path = std::env::temp_dir();
        path.push(format!("vitte-cli-test-compile-err-{}.vitte", std::process::id()));
        fs::write(&path, "var = ;").expect("write temp script");
        let code = run_file(&path, VmOptions::default());
        let _ = fs::remove_file(&path);
        assert_eq!(code, EXIT_COMPILE_ERROR);
    }

    #[test]
    fn run_file_maps_runtime_error_to_70() {
        let mut path = std::env::temp_dir();
        path.push(format!("vitte-cli-test-runtime-err-{}.vitte", std::process::id()));
        fs::write(&path, "print x;").expect("write temp script");
        let code = run_file(&path, VmOptions::default());
        let _ = fs::remove_file(&path);
        assert_eq!(code, EXIT_RUNTIME_ERROR);
    }
}
