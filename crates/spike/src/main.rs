use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evolution_core::fitness::FitnessSpec;
use evolution_core::genome::{TraitSet, TraitSpec};
use evolution_core::{RunSummary, SimConfig, Simulation};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const WARMUP_GENERATIONS: usize = 3;
const BENCHMARK_GENERATIONS: usize = 20;

#[derive(Parser)]
#[command(name = "evolution-sim")]
#[command(about = "Food-limited evolution simulation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a run file (or the built-in demo)
    Run {
        /// Path to run file (JSON); the thermal demo is used when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for results (optional)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Number of generations to run
        #[arg(long, default_value_t = 100)]
        generations: usize,

        /// Capture a population snapshot every N generations (0 disables)
        #[arg(long, default_value_t = 0)]
        snapshot_every: usize,
    },
    /// Time generation steps across population sizes
    Benchmark,
    /// Dump the default run file to stdout
    DumpDefaultConfig,
}

/// Everything one run needs: engine knobs, genome layout and the scoring rule.
#[derive(Debug, Serialize, Deserialize)]
struct RunFile {
    #[serde(default)]
    sim: SimConfig,
    traits: TraitSet,
    fitness: FitnessSpec,
}

impl RunFile {
    /// Thermal tolerance demo: the traits `ThermalTolerance` scores, default knobs.
    fn thermal_demo() -> Result<Self> {
        let specs = vec![
            TraitSpec::new("temperature_ideal", -10.0, 40.0, 2.0, 0.0)?,
            TraitSpec::new("temperature_range", 0.0, 15.0, 0.5, 0.2)?,
            TraitSpec::new("resilience", 0.0, 1.0, 0.05, 1.0)?,
        ];
        Ok(Self {
            sim: SimConfig::default(),
            traits: TraitSet::new(specs).context("invalid demo traits")?,
            fitness: FitnessSpec::ThermalTolerance,
        })
    }
}

fn load_run_file(path: &Path) -> Result<RunFile> {
    let file = File::open(path).context("failed to open run file")?;
    let run: RunFile =
        serde_json::from_reader(BufReader::new(file)).context("failed to parse run file")?;
    run.traits.validate().context("Trait validation error")?;
    run.sim.validate().context("Config validation error")?;
    Ok(run)
}

fn build_simulation(run: RunFile) -> Result<Simulation> {
    let fitness = run
        .fitness
        .build(&run.traits)
        .context("failed to build fitness function")?;
    Simulation::new(run.traits, run.sim, fitness).context("failed to initialize simulation")
}

fn report(summary: &RunSummary) {
    if let Some(last) = summary.samples.last() {
        println!(
            "Run complete. Generations: {}/{}, final population: {}",
            summary.generations_completed,
            summary.generations_requested,
            summary.final_population_size
        );
        if let Some(best) = last.best_fitness {
            println!("  Last best fitness: {best:.4}");
        }
        for stats in &last.trait_stats {
            println!("  {:<20} mean={:.3} std={:.3}", stats.name, stats.mean, stats.std);
        }
    }
    if let Some(generation) = summary.extinct_at {
        println!("  Extinct at generation {generation}");
    }
}

fn run_benchmark(population_size: usize) -> Result<()> {
    let sim = SimConfig {
        initial_population_size: population_size,
        max_population_size: population_size,
        ..SimConfig::default()
    };
    let run = RunFile {
        sim,
        ..RunFile::thermal_demo()?
    };
    let mut simulation = build_simulation(run)?;

    for _ in 0..WARMUP_GENERATIONS {
        simulation.step()?;
    }

    let start = Instant::now();
    let mut completed = 0;
    for _ in 0..BENCHMARK_GENERATIONS {
        let summary = simulation.step()?;
        completed += 1;
        if summary.is_extinct() {
            break;
        }
    }
    let elapsed = start.elapsed();
    let avg_ms = elapsed.as_secs_f64() * 1000.0 / completed.max(1) as f64;

    println!("--- max population {population_size} ---");
    println!("  Avg generation: {avg_ms:.2} ms over {completed} generations");
    println!("  Final size:     {}", simulation.population().len());
    println!();
    Ok(())
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
    let cli = Cli::parse();

    match cli.command {
        Commands::DumpDefaultConfig => {
            println!("{}", serde_json::to_string_pretty(&RunFile::thermal_demo()?)?);
        }
        Commands::Benchmark => {
            if cfg!(debug_assertions) {
                eprintln!("WARNING: running in debug mode. Results are not representative.");
                eprintln!("         Use: cargo run -p spike --release -- benchmark");
                eprintln!();
            }
            println!("=== Evolution Benchmark ===");
            println!(
                "Warmup: {WARMUP_GENERATIONS} generations, Benchmark: {BENCHMARK_GENERATIONS} generations"
            );
            println!();
            for size in [100, 1_000, 10_000, 100_000] {
                run_benchmark(size)?;
            }
        }
        Commands::Run {
            config,
            out,
            generations,
            snapshot_every,
        } => {
            let run = match &config {
                Some(path) => {
                    let run = load_run_file(path)?;
                    tracing::info!(path = %path.display(), "loaded run file");
                    run
                }
                None => {
                    tracing::info!("no run file given, using the thermal tolerance demo");
                    RunFile::thermal_demo()?
                }
            };
            tracing::info!(generations, snapshot_every, "starting run");

            let mut simulation = build_simulation(run)?;
            let summary = simulation.run(generations, snapshot_every)?;

            if let Some(out_dir) = out {
                std::fs::create_dir_all(&out_dir).context("failed to create output directory")?;
                let summary_path = out_dir.join("summary.json");
                let file = File::create(summary_path).context("failed to create summary file")?;
                serde_json::to_writer_pretty(file, &summary).context("failed to write summary")?;
                tracing::info!(out = %out_dir.display(), "results saved");
            }
            report(&summary);
        }
    }
    Ok(())
}
