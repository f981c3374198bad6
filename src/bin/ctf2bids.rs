use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use ctf2bids::{
    attach_headshapes, convert_with_roster, ConversionConfig, HeadshapeOptions, Roster, RosterSchema, Task,
};

#[derive(Parser)]
#[command(name = "ctf2bids", about = "Convert FGCM CTF MEG recordings to BIDS")]
struct Args {
    /// Convert a single subject (lab code like C03, or standard id like 003)
    #[arg(long)]
    subject: Option<String>,

    /// Convert a single task (audio_base … visual_test)
    #[arg(long)]
    task: Option<String>,

    /// Run every step except writing output
    #[arg(long)]
    dry_run: bool,

    /// Raw CTF tree ({raw_root}/{sid}/{sid}-1/*.ds)
    #[arg(long)]
    raw_root: Option<PathBuf>,

    /// BIDS output root
    #[arg(long)]
    bids_root: Option<PathBuf>,

    /// Subject roster (tab- or comma-delimited)
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Directory of Polhemus .pos headshape files
    #[arg(long)]
    pos_root: Option<PathBuf>,

    /// Power line frequency in Hz (default: 50)
    #[arg(long, default_value_t = 50.0)]
    line_freq: f64,

    /// Attach headshape files after conversion
    #[arg(long)]
    add_headshape: bool,

    /// Only attach headshape files to an existing dataset
    #[arg(long, conflicts_with = "add_headshape")]
    only_headshape: bool,

    /// Skip units whose output is already complete
    #[arg(long)]
    skip_existing: bool,

    /// Replace existing output
    #[arg(long, conflicts_with = "skip_existing")]
    overwrite: bool,

    /// Days to shift the measurement date back (default: 3650)
    #[arg(long)]
    days_back: Option<u32>,

    /// Keep the real measurement date
    #[arg(long, conflicts_with = "days_back")]
    no_anonymize: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let defaults = ConversionConfig::default();
    let cfg = ConversionConfig {
        raw_root: args.raw_root.unwrap_or(defaults.raw_root.clone()),
        bids_root: args.bids_root.unwrap_or(defaults.bids_root.clone()),
        roster_path: args.roster.unwrap_or(defaults.roster_path.clone()),
        pos_root: args.pos_root.unwrap_or(defaults.pos_root.clone()),
        line_freq: args.line_freq,
        overwrite: args.overwrite,
        dry_run: args.dry_run,
        skip_existing: args.skip_existing,
        days_back: if args.no_anonymize { None } else { args.days_back.or(defaults.days_back) },
        ..defaults
    };

    let tasks: Vec<Task> = match &args.task {
        Some(t) => vec![t.parse::<Task>().with_context(|| format!("--task {t}"))?],
        None => Task::ALL.to_vec(),
    };

    let roster = Roster::load(&cfg.roster_path, &RosterSchema::default())?;
    let subjects: Vec<String> = match args.subject {
        Some(s) => vec![s],
        None => roster.subjects().iter().map(|s| s.source_id.clone()).collect(),
    };

    if !args.only_headshape {
        let report = convert_with_roster(&cfg, &roster, &subjects, &tasks);
        print!("{report}");
    }

    if args.add_headshape || args.only_headshape {
        let opts = HeadshapeOptions { dry_run: cfg.dry_run, ..HeadshapeOptions::default() };
        let report = attach_headshapes(&roster, &subjects, &cfg.bids_root, &cfg.pos_root, &opts)?;
        print!("{report}");
    }

    Ok(())
}
