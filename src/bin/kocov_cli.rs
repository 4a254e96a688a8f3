use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use kocov::config::PipelineConfig;
use kocov::{
    build_ko_info_file, compute_region_coverage, filter_best_matches_file, locate_regions_file,
    CoverageOptions, Result,
};

#[derive(Parser)]
#[command(name = "kocov", version, about = "KO region location and per-region coverage depth")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbosity: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Keep the best ortholog hit per (taxid, sseqid)
    BestMatches(BestMatchesArgs),
    /// Find the genomic regions of resolved hits for one taxon
    LocateRegions(LocateRegionsArgs),
    /// Summarise per-base coverage over every region, per sample
    RegionCoverage(RegionCoverageArgs),
    /// Tabulate ENTRY/SYMBOL/NAME from KEGG orthology flat files
    KoInfo(KoInfoArgs),
}

#[derive(Args, Debug)]
struct BestMatchesArgs {
    /// Combined hit table (TSV with taxid, sseqid, ko, evalue, pident)
    #[arg(short = 'i', long = "infpath")]
    input: PathBuf,
    #[arg(short = 'o', long = "outfpath")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct LocateRegionsArgs {
    #[arg(short = 't', long = "taxid")]
    taxid: u32,
    /// GFF3 annotation, optionally gzipped
    #[arg(short = 'a', long = "annotation_fpath")]
    annotation: PathBuf,
    /// Resolved hit table from `best-matches`
    #[arg(short = 'd', long = "diamond_fpath")]
    resolved: PathBuf,
    #[arg(short = 'o', long = "outdir")]
    outdir: PathBuf,
}

#[derive(Args, Debug)]
struct RegionCoverageArgs {
    /// Directory of identified_regions_{taxid}.tsv tables
    #[arg(short = 'r', long = "regions_dir")]
    regions_dir: PathBuf,
    #[arg(short = 'o', long = "outdir")]
    outdir: PathBuf,
    /// Directory of per-sample .npz coverage arrays
    #[arg(long = "coverage_dir")]
    coverage_dir: PathBuf,
    /// Directory of same-named .npz files for per-sequence taxa
    #[arg(long = "secondary_coverage_dir", alias = "para_coverage_dir")]
    secondary_coverage_dir: Option<PathBuf>,
    #[arg(long = "accessions", default_value = "data/taxid_to_accnum.csv")]
    accessions: PathBuf,
    #[arg(long = "scaffolds", default_value = "data/taxid_to_scaffold.csv")]
    scaffolds: PathBuf,
    /// JSON file overriding coverage-key strategies and file prefixes
    #[arg(long = "config")]
    config: Option<PathBuf>,
    #[arg(long = "threads", default_value_t = 1)]
    threads: usize,
    #[arg(long = "progress")]
    progress: bool,
}

#[derive(Args, Debug)]
struct KoInfoArgs {
    /// File listing one KO per line
    #[arg(short = 'i', long = "kos_fpath")]
    kos: PathBuf,
    /// Directory holding {KO}.txt flat files
    #[arg(short = 'd', long = "datdir")]
    datdir: PathBuf,
    #[arg(short = 'o', long = "outfpath")]
    output: PathBuf,
}

fn init_verbose(verbosity: u8) {
    let filter_level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(filter_level)
        .init();
}

fn spinner(color: &str, msg: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&format!("{{spinner:.{color}}} {{msg}}"))
    {
        spinner.set_style(style);
    }
    spinner.set_message(msg);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::BestMatches(args) => {
            log::trace!("best-matches arguments: {:#?}", args);
            let spinner = spinner("green", "Resolving best matches...");
            let n = filter_best_matches_file(&args.input, &args.output)?;
            spinner.finish_with_message(format!("Wrote {} resolved hit(s) to {}", n, args.output.display()));
        }
        Command::LocateRegions(args) => {
            log::trace!("locate-regions arguments: {:#?}", args);
            let spinner = spinner("yellow", "Locating regions...");
            let out = locate_regions_file(args.taxid, &args.annotation, &args.resolved, &args.outdir)?;
            spinner.finish_with_message(format!("Wrote {}", out.display()));
        }
        Command::RegionCoverage(args) => {
            log::trace!("region-coverage arguments: {:#?}", args);
            let config = match &args.config {
                Some(path) => PipelineConfig::from_json_file(path)?,
                None => PipelineConfig::default(),
            };
            let opts = CoverageOptions {
                regions_dir: args.regions_dir,
                coverage_dir: args.coverage_dir,
                secondary_coverage_dir: args.secondary_coverage_dir,
                accessions_path: args.accessions,
                scaffolds_path: args.scaffolds,
                outdir: args.outdir,
                config,
                threads: args.threads,
            };

            let bar = if args.progress {
                let bar = ProgressBar::new(0);
                if let Ok(style) =
                    ProgressStyle::default_bar().template("{bar:40.green} {pos}/{len} samples [{elapsed_precise}]")
                {
                    bar.set_style(style);
                }
                Some(bar)
            } else {
                None
            };
            let written = compute_region_coverage(&opts, bar.as_ref())?;
            if let Some(bar) = bar {
                bar.finish();
            }
            log::info!("Wrote {} sample table(s) to {}", written.len(), opts.outdir.display());
        }
        Command::KoInfo(args) => {
            log::trace!("ko-info arguments: {:#?}", args);
            let spinner = spinner("blue", "Collecting KO info...");
            let n = build_ko_info_file(&args.kos, &args.datdir, &args.output)?;
            spinner.finish_with_message(format!("Collected {n} KO record(s)."));
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_verbose(cli.verbosity);
    log::info!("Running {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let start = Instant::now();
    if let Err(e) = run(cli) {
        log::error!("{e}");
        process::exit(1);
    }
    log::info!("Total execution time: {:.2?}", start.elapsed());
}
