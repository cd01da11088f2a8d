//! vitte-cli/src/main.rs — point d'entrée du binaire `vitte`.
//!
//! Reste minimal à dessein : initialise la sortie d'erreurs et le filtre de
//! traces (`RUST_LOG`), délègue tout le reste à [`vitte_cli::run`], puis
//! traduit son code de sortie en `ExitCode` processus.

fn main() -> std::process::ExitCode {
    // Rapports d'erreur lisibles pour les panics hors du chemin normal
    // (langage) : les erreurs de compilation/exécution, elles, sont
    // imprimées par `vitte_cli::run` dans le format exact du contrat §6/§7,
    // jamais via color-eyre.
    let _ = color_eyre::install();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = std::env::args().skip(1);
    std::process::ExitCode::from(vitte_cli::run(args))
}
