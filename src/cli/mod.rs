// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Uses `clap` to parse
// arguments; all work is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `pretrain` — builds a corpus and trains with LARS
//   2. `inspect`  — reports per-variable LARS treatment of a run
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, InspectArgs, PretrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "bert-lars",
    version = "0.1.0",
    about = "Pretrain BERT with a gathered masked-LM head and the LARS optimizer."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Pretrain(args) => run_pretrain(args),
            Commands::Inspect(args)  => run_inspect(args),
        }
    }
}

fn run_pretrain(args: PretrainArgs) -> Result<()> {
    use crate::application::pretrain_use_case::PretrainUseCase;

    tracing::info!("Starting pretraining, checkpoints in: {}", args.checkpoint_dir);

    let summary = PretrainUseCase::new(args.into()).execute()?;

    println!(
        "Pretraining complete: {} epochs, {} steps, best val_loss {:.4}",
        summary.epochs, summary.steps, summary.best_val_loss
    );
    if let Some(last) = summary.last {
        println!(
            "Last epoch: mlm_acc {:.1}%, nsp_acc {:.1}%, mean trust ratio {:.3e}",
            last.mlm_acc * 100.0,
            last.nsp_acc * 100.0,
            last.mean_trust_ratio
        );
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    use crate::application::inspect_use_case::InspectUseCase;

    let report = InspectUseCase::new(args.checkpoint_dir.clone()).execute()?;

    match report.epoch {
        Some(epoch) => println!("Weights: epoch {epoch}"),
        None        => println!("Weights: fresh initialisation"),
    }
    if args.verbose {
        println!("\n{:<64} {:>14} {:>12}  wd  ada", "variable", "shape", "norm");
        for p in &report.params {
            println!(
                "{:<64} {:>14} {:>12.4}  {}   {}",
                p.name,
                format!("{:?}", p.dims),
                p.norm,
                if p.weight_decay { "y" } else { "-" },
                if p.layer_adaptation { "y" } else { "-" },
            );
        }
        println!();
    }
    println!(
        "{} variables, {} parameters; weight decay on {}, layer adaptation on {}",
        report.params.len(),
        report.total_params(),
        report.decayed(),
        report.adapted()
    );
    Ok(())
}
