use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use lilith::{
    build_tree, export_code_tree, stringify_code_tree, BuildCommand, ConsoleProgress, NoProgress,
    StoreConfig, TreeBuildOptions,
};

#[derive(Parser)]
#[command(name = "lilith", version, about = "Indexa la estructura de un proyecto Python en Neo4j")]
struct Cli {
    /// Nivel de log (DEBUG, INFO, WARNING, ERROR, CRITICAL). Sin él se usa RUST_LOG.
    #[arg(long, global = true, value_parser = parse_level)]
    log_level: Option<Level>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Construye el índice del proyecto en PATH y lo guarda en Neo4j.
    Build {
        path: PathBuf,
        /// Vacía la base de datos antes de escribir.
        #[arg(long)]
        reset: bool,
        /// Recorre cada directorio en orden alfabético.
        #[arg(long)]
        sorted: bool,
    },
    /// Muestra el árbol de código de PATH.
    Tree {
        path: PathBuf,
        #[arg(long)]
        sorted: bool,
    },
    /// Exporta los registros del árbol de PATH como JSON.
    Export {
        path: PathBuf,
        /// Fichero de salida (por defecto, la salida estándar).
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long)]
        sorted: bool,
    },
}

fn parse_level(value: &str) -> Result<Level, String> {
    match value.to_ascii_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" => Ok(Level::ERROR),
        _ => Err(format!("Nivel de log inválido: {value}")),
    }
}

fn init_logging(level: Option<Level>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level.as_str().to_ascii_lowercase()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_level);

    // 2. Ejecutar la orden y traducir el resultado a código de salida
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Se produjo un error durante la ejecución: {err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Build { path, reset, sorted } => {
            // La configuración se valida antes de tocar el sistema de archivos.
            let cfg = StoreConfig::from_env()?;
            let path = resolve_directory(&path)?;
            info!("Construyendo el proyecto en {}", path.display());

            let summary = BuildCommand::new(path, reset)
                .with_options(TreeBuildOptions { sort_entries: sorted })
                .run_scoped(&cfg, &ConsoleProgress)
                .await?;
            println!("{summary}");
        }
        Command::Tree { path, sorted } => {
            let path = resolve_directory(&path)?;
            let tree = build_tree(&path, TreeBuildOptions { sort_entries: sorted }, &NoProgress)?;
            println!("{}", stringify_code_tree(&tree));
        }
        Command::Export { path, output, sorted } => {
            let path = resolve_directory(&path)?;
            let tree = build_tree(&path, TreeBuildOptions { sort_entries: sorted }, &ConsoleProgress)?;
            let json = serde_json::to_string_pretty(&export_code_tree(&tree))?;

            match output {
                Some(file) => {
                    fs::write(&file, json)
                        .with_context(|| format!("No se pudo escribir {}", file.display()))?;
                    info!("Registros exportados a {}", file.display());
                }
                None => println!("{json}"),
            }
        }
    }
    Ok(())
}

fn resolve_directory(path: &Path) -> Result<PathBuf> {
    let resolved = path
        .canonicalize()
        .with_context(|| format!("La ruta no existe: {}", path.display()))?;
    if !resolved.is_dir() {
        bail!("La ruta no es un directorio: {}", resolved.display());
    }
    Ok(resolved)
}
