//! VarStore command-line interface
//!
//! Thin glue over a file-backed session. Values are entered and printed in
//! their type's text form; the literal `NULL` stands for a null value.
//!
//! # Examples
//!
//! ```bash
//! # Create and read a variable
//! varstore create-variable counter int4 0
//! varstore set counter 5
//! varstore get counter int4
//!
//! # Constants reject assignment
//! varstore create-constant pi float8 3.14159
//!
//! # Migrate a legacy-format store
//! varstore upgrade-format
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use varstore::error::Result;
use varstore::{FileBackend, Session, TypedValue};

/// VarStore - session-scoped named value store
#[derive(Parser, Debug)]
#[command(name = "varstore")]
#[command(version = varstore::VERSION)]
#[command(about = "VarStore - session-scoped named value store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Variables file path
    #[arg(long, global = true, default_value = "varstore.json", env = "VARSTORE_DATA")]
    data: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a variable, optionally with an initial value
    CreateVariable {
        name: String,
        /// Type spec, e.g. "int4" or "core.text"
        r#type: String,
        /// Initial value in text form, or NULL
        value: Option<String>,
    },

    /// Create a constant
    CreateConstant {
        name: String,
        r#type: String,
        /// Value in text form, or NULL
        value: String,
    },

    /// Drop a variable or constant
    Drop { name: String },

    /// Assign a value; prints the prior value
    Set {
        name: String,
        /// New value in text form, or NULL
        value: String,
    },

    /// Read a value, coerced to the given type
    Get { name: String, r#type: String },

    /// Show the declared type of a variable or constant
    TypeOf { name: String },

    /// Check whether a variable or constant exists
    Exists { name: String },

    /// Check whether a name is a constant
    IsConstant { name: String },

    /// List all variable and constant names
    List,

    /// Reload everything from the variables file, print the count
    Init,

    /// Migrate a legacy-format store to the current format
    UpgradeFormat,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    let backend = FileBackend::open(&cli.data)
        .with_context(|| format!("opening {}", cli.data.display()))?;
    let mut session = Session::with_builtins(backend)?;

    match cli.command {
        Commands::CreateVariable { name, r#type, value } => {
            let ty = session.resolve_type(&r#type)?;
            let initial = value
                .as_deref()
                .map(|raw| parse_value(&session, ty, raw))
                .transpose()?
                .flatten();
            session.create_variable(&name, ty, initial)?;
            println!("created variable '{name}'");
        }
        Commands::CreateConstant { name, r#type, value } => {
            let ty = session.resolve_type(&r#type)?;
            let value = parse_value(&session, ty, &value)?;
            session.create_constant(&name, ty, value)?;
            println!("created constant '{name}'");
        }
        Commands::Drop { name } => {
            session.drop_variable(&name)?;
            println!("dropped '{name}'");
        }
        Commands::Set { name, value } => {
            let ty = session.type_of(&name)?;
            let value = parse_value(&session, ty, &value)?;
            let prior = session.set(&name, value)?;
            println!("prior value: {}", render_value(&session, prior.as_ref())?);
        }
        Commands::Get { name, r#type } => {
            let ty = session.resolve_type(&r#type)?;
            let value = session.get(&name, ty)?;
            println!("{}", render_value(&session, value.as_ref())?);
        }
        Commands::TypeOf { name } => {
            let ty = session.type_of(&name)?;
            println!("{}", session.catalog().display_name(ty));
        }
        Commands::Exists { name } => {
            println!("{}", session.exists(&name)?);
        }
        Commands::IsConstant { name } => {
            println!("{}", session.is_constant(&name)?);
        }
        Commands::List => {
            let names = session.variable_names()?;
            if names.is_empty() {
                println!("no variables");
            } else {
                for name in names {
                    println!("{name}");
                }
            }
        }
        Commands::Init => {
            let count = session.init()?;
            println!("{count} variables loaded");
        }
        Commands::UpgradeFormat => {
            session.upgrade_format()?;
            println!("storage format is current");
        }
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log level")?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(!cli.no_color))
        .with(filter)
        .init();
    Ok(())
}

/// Parses a text-form value for `ty`; the literal `NULL` yields a null.
fn parse_value(
    session: &Session<FileBackend>,
    ty: varstore::TypeId,
    raw: &str,
) -> anyhow::Result<Option<TypedValue>> {
    if raw == "NULL" {
        return Ok(None);
    }
    let io = session.catalog().text_io(ty)?;
    let datum = (io.from_text)(raw)
        .map_err(|_| anyhow::anyhow!("'{raw}' does not parse as {}", session.catalog().display_name(ty)))?;
    Ok(Some(TypedValue::new(ty, datum)))
}

fn render_value(
    session: &Session<FileBackend>,
    value: Option<&TypedValue>,
) -> Result<String> {
    match value {
        None => Ok("NULL".to_string()),
        Some(value) => {
            let io = session.catalog().text_io(value.ty)?;
            (io.to_text)(&value.datum)
        }
    }
}
