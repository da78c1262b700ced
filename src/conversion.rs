use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{
    merge::{MergeEngine, MergeOptions},
    output::VariantWriter,
    raw::{self, VendorFormat},
    reference,
};

/// Configuration required to drive a conversion, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub vendor: VendorFormat,
    pub input: PathBuf,
    pub output: PathBuf,
    pub vcf_ref: PathBuf,
    /// Sample column name; derived from the input filename when `None`.
    pub sample_id: Option<String>,
    pub double_allosomes: bool,
}

/// Counters reported after a conversion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConversionSummary {
    /// Distinct markers indexed from the raw export.
    pub raw_markers: u64,
    /// Sites read from the reference catalog.
    pub reference_sites: u64,
    /// Records written to the output.
    pub emitted_records: u64,
    /// Hemizygous allosome calls rewritten as diploid.
    pub doubled_calls: u64,
    /// Observed allele symbols absent from their site's allele list.
    pub unmatched_alleles: u64,
}

/// Convert a raw vendor export into a single-sample VCF.
///
/// Ingestion builds the marker table up front; the catalog is then streamed
/// once, each matching site merged and written record-by-record.
pub fn convert(config: &ConversionConfig) -> Result<ConversionSummary> {
    tracing::info!(
        vendor = ?config.vendor,
        input = %config.input.display(),
        reference = %config.vcf_ref.display(),
        output = %config.output.display(),
        "starting conversion",
    );

    let mut summary = ConversionSummary::default();

    let calls = raw::load_raw_calls(&config.input, config.vendor)?;
    summary.raw_markers = calls.len() as u64;

    let mut reader = reference::open_catalog(&config.vcf_ref)?;
    let header = reader.read_header().with_context(|| {
        format!("malformed reference catalog {}", config.vcf_ref.display())
    })?;

    let sample = config
        .sample_id
        .clone()
        .unwrap_or_else(|| reference::sample_name(&config.input));
    let mut output_header = header.clone();
    reference::augment_header(&mut output_header, &sample);

    let engine = MergeEngine::new(
        calls,
        MergeOptions {
            double_allosomes: config.double_allosomes,
        },
    );

    let mut writer = VariantWriter::create(&config.output)?;
    writer.write_header(&output_header)?;

    for result in reader.record_bufs(&header) {
        let mut record = result.with_context(|| {
            format!("malformed reference catalog {}", config.vcf_ref.display())
        })?;
        summary.reference_sites += 1;

        if engine.merge(&mut record, &mut summary) {
            writer.write_record(&output_header, &record)?;
            summary.emitted_records += 1;
        }
    }

    writer.finish()?;

    tracing::info!(
        emitted = summary.emitted_records,
        reference_sites = summary.reference_sites,
        "conversion complete",
    );

    Ok(summary)
}
