use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    conversion::{self, ConversionConfig, ConversionSummary},
    raw::VendorFormat,
    upload::Uploader,
};

const DEFAULT_DATASET: &str = "raw2vcf dataset";
const DEFAULT_VARIANT_SET: &str = "raw2vcf variants";

#[derive(Debug, Parser)]
#[command(
    name = "raw2vcf",
    author,
    version,
    about = "Convert raw genotype calls from sources like 23andme or ancestry.com into VCF format",
    long_about = None
)]
struct Cli {
    /// Logging verbosity (e.g. error, warn, info, debug)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert raw data to vcf format
    Conv(ConvArgs),
    /// Push a vcf into the variant store
    Push(PushArgs),
}

#[derive(Debug, Args)]
struct ConvArgs {
    /// Source of the raw genotype data
    #[arg(value_name = "SOURCE", value_enum)]
    source: VendorFormat,

    /// Path to the input data: the vendor's zip download, gzip, or ascii
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output path (default: input path with a .vcf.gz extension)
    #[arg(short = 'o', long, value_name = "OUTPUT")]
    output_file: Option<PathBuf>,

    /// Path to the gzipped vcf reference data
    #[arg(
        short = 'v',
        long,
        value_name = "VCF_REF",
        default_value = "reference/reference.vcf.gz"
    )]
    vcf_ref: PathBuf,

    /// Emit hemizygous X/Y calls as homozygous diploid genotypes
    #[arg(long)]
    double_allosomes: bool,

    /// Sample identifier for the vcf header (default: input file name)
    #[arg(long, value_name = "SAMPLE")]
    sample: Option<String>,

    /// Push the generated vcf into the variant store
    #[arg(short = 'p', long)]
    push: bool,

    /// Cloud project to push the vcf into
    #[arg(short = 'g', long, value_name = "PROJECT")]
    google_project: Option<String>,

    /// Storage bucket url used for staging, e.g. gs://my-bucket
    #[arg(short = 'b', long, value_name = "BUCKET")]
    bucket: Option<String>,
}

#[derive(Debug, Args)]
struct PushArgs {
    /// Path to the vcf file to import
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Cloud project to push the vcf into
    #[arg(short = 'g', long, value_name = "PROJECT")]
    google_project: String,

    /// Storage bucket url used for staging, e.g. gs://my-bucket
    #[arg(short = 'b', long, value_name = "BUCKET")]
    bucket: String,

    /// Dataset to load variants into, created when absent
    #[arg(short = 'd', long, value_name = "NAME", default_value = DEFAULT_DATASET)]
    dataset_name: String,

    /// Variant set to load variants into, created when absent
    #[arg(short = 's', long, value_name = "NAME", default_value = DEFAULT_VARIANT_SET)]
    variantset_name: String,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Command::Conv(args) => run_conv(args),
        Command::Push(args) => run_push(args),
    }
}

fn run_conv(args: ConvArgs) -> Result<()> {
    let push_target = if args.push {
        let (Some(project), Some(bucket)) = (args.google_project.clone(), args.bucket.clone())
        else {
            bail!(
                "if --push is used to push the output of conversion into the variant store, \
                 a project and bucket must be specified"
            );
        };
        Some((project, bucket))
    } else {
        None
    };

    let output = args
        .output_file
        .clone()
        .unwrap_or_else(|| default_output(&args.input));

    let config = ConversionConfig {
        vendor: args.source,
        input: args.input.clone(),
        output: output.clone(),
        vcf_ref: args.vcf_ref.clone(),
        sample_id: args.sample.clone(),
        double_allosomes: args.double_allosomes,
    };

    let spinner = spinner("converting raw data to vcf");
    let result = conversion::convert(&config);
    spinner.finish_and_clear();
    let summary = result?;

    println!("vcf output at: {}", output.display());
    print_summary(&summary);

    if let Some((project, bucket)) = push_target {
        let uploader = Uploader::new(&project, &bucket)?;
        let job = uploader.import_vcf(&output, DEFAULT_DATASET, DEFAULT_VARIANT_SET)?;
        println!("variant import started: {}", job.name);
    }

    Ok(())
}

fn run_push(args: PushArgs) -> Result<()> {
    let uploader = Uploader::new(&args.google_project, &args.bucket)?;
    let job = uploader.import_vcf(&args.input, &args.dataset_name, &args.variantset_name)?;
    println!("variant import started: {}", job.name);
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .ok();
    Ok(())
}

/// Default output path: the input with its trailing extension swapped for .vcf.gz.
fn default_output(input: &Path) -> PathBuf {
    input.with_extension("vcf.gz")
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .expect("template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_summary(summary: &ConversionSummary) {
    println!(
        "Matched {emitted} of {sites} reference sites against {markers} raw markers.",
        emitted = summary.emitted_records,
        sites = summary.reference_sites,
        markers = summary.raw_markers,
    );

    if summary.doubled_calls > 0 {
        println!(
            "Rewrote {count} hemizygous allosome calls as diploid.",
            count = summary.doubled_calls
        );
    }

    if summary.unmatched_alleles > 0 {
        println!(
            "Warning: {count} observed alleles were absent from their site's allele list \
             and were encoded as the reference allele.",
            count = summary.unmatched_alleles
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_conv_with_defaults() {
        let cli = Cli::parse_from(["raw2vcf", "conv", "23andme", "genome_data.zip"]);
        let Command::Conv(args) = cli.command else {
            panic!("expected conv");
        };
        assert_eq!(args.source, VendorFormat::TwentyThreeAndMe);
        assert_eq!(args.input, PathBuf::from("genome_data.zip"));
        assert_eq!(args.output_file, None);
        assert_eq!(args.vcf_ref, PathBuf::from("reference/reference.vcf.gz"));
        assert!(!args.double_allosomes);
        assert!(!args.push);
    }

    #[test]
    fn parses_ancestry_with_flags() {
        let cli = Cli::parse_from([
            "raw2vcf",
            "conv",
            "ancestry",
            "dna.txt",
            "-o",
            "out.vcf.gz",
            "--double-allosomes",
        ]);
        let Command::Conv(args) = cli.command else {
            panic!("expected conv");
        };
        assert_eq!(args.source, VendorFormat::Ancestry);
        assert_eq!(args.output_file, Some(PathBuf::from("out.vcf.gz")));
        assert!(args.double_allosomes);
    }

    #[test]
    fn parses_push_with_default_names() {
        let cli = Cli::parse_from([
            "raw2vcf",
            "push",
            "calls.vcf.gz",
            "-g",
            "my-project",
            "-b",
            "gs://staging",
        ]);
        let Command::Push(args) = cli.command else {
            panic!("expected push");
        };
        assert_eq!(args.dataset_name, DEFAULT_DATASET);
        assert_eq!(args.variantset_name, DEFAULT_VARIANT_SET);
    }

    #[test]
    fn default_output_swaps_extension() {
        assert_eq!(
            default_output(Path::new("genome_data.zip")),
            PathBuf::from("genome_data.vcf.gz")
        );
        assert_eq!(
            default_output(Path::new("dna.txt")),
            PathBuf::from("dna.vcf.gz")
        );
    }
}
