use anyhow::Result;
use clap::{Parser, Subcommand};
use corodex_core::database::Database;
use corodex_core::effectiveness::TypeChart;
use corodex_core::parsers::load_seed_dir;
use corodex_core::resolver::TraitList;
use corodex_core::{Dataset, Resolver, TierTable};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(
    name = "corodex",
    version = "0.1.0",
    about = "CLI tool for the Coromon reference database",
    long_about = None
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true, env = "CORODEX_DATABASE", default_value = "./corodex.sqlite")]
    database: PathBuf,

    /// TOML file overriding the built-in trait tier table
    #[arg(long, global = true, env = "CORODEX_TIER_TABLE")]
    tier_table: Option<PathBuf>,

    /// Path to log file
    #[arg(long, global = true, default_value = "/tmp/corodex.log")]
    log_file: PathBuf,

    /// Verbosity level (repeat for more verbose output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load CSV seed files into the database
    Seed {
        /// Directory containing the seed CSV files
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
        /// Quiet mode (0=show messages/warnings, 1=suppress messages, 2=suppress both)
        #[arg(long, default_value_t = 0)]
        quiet: u8,
    },

    /// Print every evolution chain
    Chains {
        /// Also write the evolution lines as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
        /// Quiet mode
        #[arg(long, default_value_t = 0)]
        quiet: u8,
    },

    /// Resolve the trait tier and effective traits of one species
    Resolve {
        /// Species id or exact name
        species: String,
    },

    /// Resolve every species
    Report {
        /// Write the report as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
        /// Quiet mode
        #[arg(long, default_value_t = 0)]
        quiet: u8,
    },

    /// Show a species with its base stats
    Species {
        /// Species id or exact name
        species: String,
    },

    /// Damage multiplier of one type attacking another
    Effectiveness {
        #[arg(long)]
        attacking: String,
        #[arg(long)]
        defending: String,
    },

    /// List the types a defending type is weak and resistant to
    Weaknesses {
        /// Defending type name
        type_name: String,
    },

    /// List skills and their effects
    Skills {
        /// Only skills of this type
        #[arg(long = "type")]
        type_name: Option<String>,
    },
}

fn setup_logging(verbose: u8, log_file: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter_level = match verbose {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(filter_level.into());

    let file_appender = tracing_appender::rolling::never(
        log_file.parent().unwrap_or(Path::new(".")),
        log_file.file_name().unwrap_or(std::ffi::OsStr::new("corodex.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::Layer::new().with_writer(std::io::stderr).with_ansi(true))
        .with(fmt::Layer::new().with_writer(non_blocking).with_ansi(false));

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}

fn load_tier_table(path: Option<&Path>) -> Result<TierTable> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Tier table not found: {:?}", path);
            }
            let table = TierTable::from_file(path)?;
            info!("Loaded tier table from {:?}", path);
            Ok(table)
        }
        None => Ok(TierTable::default()),
    }
}

/// Open the database and build the chain index over its contents.
fn load(cli_database: &Path, tier_table: Option<&Path>) -> Result<(Dataset, Resolver)> {
    let db = Database::new(cli_database)?;
    let dataset = db.load_dataset()?;
    if dataset.species.is_empty() {
        anyhow::bail!("Database {:?} holds no species, run `corodex seed` first", cli_database);
    }
    let resolver = Resolver::new(&dataset, load_tier_table(tier_table)?)?;
    info!(
        "Loaded {} species in {} evolution chains",
        dataset.species.len(),
        resolver.chains.chains().len()
    );
    Ok((dataset, resolver))
}

fn find_species<'a>(dataset: &'a Dataset, key: &str) -> Result<&'a corodex_core::models::Species> {
    match dataset.find_species(key) {
        Some(species) => Ok(species),
        None => anyhow::bail!("Unknown species: {}", key),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

fn print_traits(traits: &TraitList) {
    match traits {
        TraitList::NoneAvailable => println!("  traits: none available"),
        TraitList::Available(traits) => {
            for t in traits {
                let source = match t.source {
                    corodex_core::resolver::TraitSource::Direct => String::new(),
                    corodex_core::resolver::TraitSource::Inherited { from } => {
                        format!(" (from species {})", from)
                    }
                };
                println!(
                    "  {:>3}%  {} +{} [{}]{}: {}",
                    t.display_percent(),
                    t.name,
                    t.plus,
                    t.kind.as_str(),
                    source,
                    t.description
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = setup_logging(cli.verbose, &cli.log_file)?;

    info!("Starting corodex CLI");

    let tier_table = cli.tier_table.as_deref();

    match cli.command {
        Commands::Seed { data_dir, quiet } => {
            if !data_dir.exists() {
                anyhow::bail!("Seed directory not found: {:?}", data_dir);
            }

            let spinner = if quiet == 0 {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
                spinner.enable_steady_tick(Duration::from_millis(100));
                spinner
            } else {
                ProgressBar::hidden()
            };

            spinner.set_message(format!("Reading seed files from {}", data_dir.display()));
            let dataset = Dataset::from_raw(load_seed_dir(&data_dir)?)?;

            // Refuse to store evolution rows that cannot form chains.
            spinner.set_message("Checking evolution chains");
            let resolver = Resolver::new(&dataset, load_tier_table(tier_table)?)?;

            spinner.set_message(format!("Writing {}", cli.database.display()));
            let db = Database::new(&cli.database)?;
            let rows = db.replace_dataset(&dataset)?;
            spinner.finish_and_clear();

            if quiet == 0 {
                info!(
                    "Seeded {} rows: {} species, {} chains, {} traits, {} skills",
                    rows,
                    dataset.species.len(),
                    resolver.chains.chains().len(),
                    dataset.traits.len(),
                    dataset.skills.len()
                );
            }
            if quiet < 2 {
                for chain in resolver.tiers.unsupported_chains(&resolver.chains) {
                    tracing::warn!(
                        "Species {} starts a {}-stage chain with no tier entry",
                        chain.root,
                        chain.len()
                    );
                }
            }
            println!("Seeded {} rows into {}", rows, cli.database.display());
        }
        Commands::Chains { json, quiet } => {
            let (dataset, resolver) = load(&cli.database, tier_table)?;
            let lines = resolver.evolution_lines(&dataset)?;

            for chain in resolver.chains.chains() {
                let names: Vec<&str> = chain
                    .members
                    .iter()
                    .filter_map(|id| dataset.species.get(id).map(|s| s.name.as_str()))
                    .collect();
                println!("{:>5}  {}", chain.root, names.join(" -> "));
            }

            if let Some(path) = json {
                write_json(&path, &lines)?;
                if quiet == 0 {
                    info!("Wrote {} evolution lines to {:?}", lines.len(), path);
                }
            }
        }
        Commands::Resolve { species } => {
            let (dataset, resolver) = load(&cli.database, tier_table)?;
            let target = find_species(&dataset, &species)?;
            let resolution = resolver.resolve(target.id)?;

            println!(
                "{} (#{}) stage {}/{} plus {}",
                target.name,
                target.id,
                resolution.chain.position,
                resolution.chain.length,
                resolution.plus
            );
            print_traits(&resolution.traits);
        }
        Commands::Report { json, quiet } => {
            let (dataset, resolver) = load(&cli.database, tier_table)?;
            let report = resolver.report(&dataset);

            for row in &report.species {
                println!(
                    "{:>5}  {:<20} {}/{} plus {}  {}",
                    row.species_id,
                    row.name,
                    row.position,
                    row.chain_length,
                    row.plus,
                    row.traits
                        .traits()
                        .iter()
                        .map(|t| format!("{} {}%", t.name, t.display_percent()))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            for failure in &report.failures {
                println!("{:>5}  {:<20} error: {}", failure.species_id, failure.name, failure.error);
            }

            if let Some(path) = json {
                write_json(&path, &report)?;
                if quiet == 0 {
                    info!("Wrote report for {} species to {:?}", report.species.len(), path);
                }
            }
            if quiet < 2 && !report.failures.is_empty() {
                tracing::warn!("{} species could not be resolved", report.failures.len());
            }
        }
        Commands::Species { species } => {
            let db = Database::new(&cli.database)?;
            let found = match species.trim().parse::<i32>() {
                Ok(id) => db.get_species(id)?,
                Err(_) => db.get_species_by_name(&species)?,
            };
            let Some(found) = found else {
                anyhow::bail!("Unknown species: {}", species);
            };

            let type_name = db
                .type_name(found.type_id)?
                .unwrap_or_else(|| format!("#{}", found.type_id));
            println!("{} (#{}) {} SP {}", found.name, found.id, type_name, found.base_sp);
            for (kind, value) in &found.stats {
                println!("  {:<16} {}", kind.as_str(), value);
            }
        }
        Commands::Effectiveness { attacking, defending } => {
            let (dataset, _) = load(&cli.database, tier_table)?;
            let chart = TypeChart::from_dataset(&dataset);
            let (Some(attack), Some(defend)) =
                (dataset.type_by_name(&attacking), dataset.type_by_name(&defending))
            else {
                anyhow::bail!("Unknown type: {} or {}", attacking, defending);
            };
            println!(
                "{} -> {}: x{}",
                attack.name,
                defend.name,
                chart.multiplier(attack.id, defend.id)
            );
        }
        Commands::Weaknesses { type_name } => {
            let (dataset, _) = load(&cli.database, tier_table)?;
            let chart = TypeChart::from_dataset(&dataset);
            let Some(defending) = dataset.type_by_name(&type_name) else {
                anyhow::bail!("Unknown type: {}", type_name);
            };

            let describe = |rows: Vec<(i32, f64)>| {
                rows.into_iter()
                    .map(|(id, m)| format!("{} x{}", dataset.type_name(id).unwrap_or("?"), m))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            println!("{} weak to: {}", defending.name, describe(chart.weaknesses(defending.id)));
            println!("{} resists: {}", defending.name, describe(chart.resistances(defending.id)));
        }
        Commands::Skills { type_name } => {
            let db = Database::new(&cli.database)?;
            let skills = db.skills(type_name.as_deref())?;
            if skills.is_empty() {
                info!("No skills found");
            }
            for skill in skills {
                println!(
                    "{:>4}  {:<16} power {:>3} accuracy {:>3}",
                    skill.id,
                    skill.name,
                    skill.power.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                    skill.accuracy.map(|a| a.to_string()).unwrap_or_else(|| "-".into())
                );
                for effect in db.skill_effects(skill.id)? {
                    println!(
                        "        {}{} magnitude {:?} chance {:?}",
                        effect.effect,
                        if effect.is_primary { " (primary)" } else { "" },
                        effect.magnitude,
                        effect.chance
                    );
                }
            }
        }
    }

    info!("Corodex CLI finished");
    Ok(())
}
