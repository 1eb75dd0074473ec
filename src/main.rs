//! Modular Evo CLI - Run an evolution from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::PathBuf;

use modular_evo::{
    evolution::{EvolutionEngine, RunArchive, SurrogateEvaluator},
    schema::EvolutionConfig,
};

/// Modules the surrogate simulator builds before giving up.
const SURROGATE_MAX_MODULES: usize = 50;

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [output_dir]", args[0]);
        eprintln!();
        eprintln!("Co-evolve modular robot bodies and controllers from JSON configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to evolution configuration file");
        eprintln!("  output_dir   Directory receiving run_<n> folders (default: runs)");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: EvolutionConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    let output_dir = args
        .get(2)
        .cloned()
        .or_else(|| config.archive.output_dir.clone())
        .unwrap_or_else(|| "runs".to_string());

    println!("Modular Evo");
    println!("===========");
    println!("Strategy: {}", config.strategy.label());
    println!(
        "Population: {} x {} generations (elitism {})",
        config.population.size, config.population.generations, config.population.elitism
    );
    println!("Max modules: {}", config.constraints.max_modules);
    println!("Workers: {}", config.evaluation.workers);
    println!();

    let sessions = (0..config.evaluation.workers)
        .map(|_| {
            SurrogateEvaluator::new(SURROGATE_MAX_MODULES, config.evaluation.delta_time)
                .with_output_bounds(config.controller.output_bounds)
        })
        .collect();

    let mut engine = EvolutionEngine::new(config, sessions).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let interrupt = engine.cancel_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Interrupted, finishing the current generation...");
        interrupt.cancel();
    }) {
        eprintln!("Warning: could not install interrupt handler: {}", e);
    }

    let result = engine
        .run(|record| println!("  {}", record))
        .unwrap_or_else(|e| {
            eprintln!("Evolution failed: {}", e);
            std::process::exit(1);
        });
    engine.close();

    let archive = RunArchive::create(&output_dir).unwrap_or_else(|e| {
        eprintln!("Error creating run directory: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = archive.save(&result) {
        eprintln!("Error saving run: {}", e);
        std::process::exit(1);
    }

    let stats = &result.stats;
    println!();
    println!("Finished: {:?}", stats.stop_reason);
    println!("  Generations: {}", stats.generations);
    println!("  Best fitness: {:.3}", stats.best_fitness);
    println!("  Final average fitness: {:.3}", stats.final_avg_fitness);
    println!(
        "  Evaluations: {} ({:.1}/s)",
        stats.total_evaluations, stats.evaluations_per_second
    );
    println!("  Time: {:.2}s", stats.elapsed_seconds);
    println!("  Saved to {}", archive.dir().display());
}

fn print_example_config() {
    let config = EvolutionConfig::default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("Example configuration (config.json):");
            println!("{}", json);
        }
        Err(e) => {
            eprintln!("Error serializing example config: {}", e);
            std::process::exit(1);
        }
    }
}
