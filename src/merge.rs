use std::collections::HashMap;

use noodles::vcf::variant::record_buf::{
    samples::{sample::Value, Keys},
    RecordBuf, Samples,
};

use crate::{conversion::ConversionSummary, raw::RawCall};

/// Knobs for the genotype merge, fixed at construction time.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Rewrite hemizygous X/Y calls as homozygous diploid genotypes.
    pub double_allosomes: bool,
}

/// Inner-joins reference sites against the marker-indexed call table.
pub struct MergeEngine {
    calls: HashMap<String, RawCall>,
    options: MergeOptions,
    keys: Keys,
}

impl MergeEngine {
    pub fn new(calls: HashMap<String, RawCall>, options: MergeOptions) -> Self {
        let keys: Keys = vec![String::from("GT")].into_iter().collect();
        Self {
            calls,
            options,
            keys,
        }
    }

    /// Attach the single-sample genotype to a reference record.
    ///
    /// Returns `false` when no raw call matches the record's marker id; the
    /// record is then dropped from the output (inner-join semantics).
    pub fn merge(&self, record: &mut RecordBuf, summary: &mut ConversionSummary) -> bool {
        let Some(rsid) = record.ids().as_ref().iter().next() else {
            return false;
        };
        let Some(call) = self.calls.get(rsid.as_str()) else {
            return false;
        };

        let mut alleles = call.alleles.clone();
        if self.options.double_allosomes
            && is_allosome(&call.chromosome)
            && alleles.chars().count() == 1
        {
            alleles = alleles.repeat(2);
            summary.doubled_calls += 1;
        }

        let (indices, unmatched) = genotype_indices(
            record.reference_bases(),
            record.alternate_bases().as_ref(),
            &alleles,
        );
        if unmatched > 0 {
            summary.unmatched_alleles += unmatched as u64;
            tracing::warn!(
                rsid = %call.rsid,
                alleles = %alleles,
                "observed allele absent from site alleles, encoding as reference"
            );
        }

        let genotype = indices
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("/");
        let samples = Samples::new(
            self.keys.clone(),
            vec![vec![Some(Value::String(genotype))]],
        );
        *record.samples_mut() = samples;

        true
    }
}

/// Whether the chromosome label names a sex chromosome, chr-prefix aside.
pub fn is_allosome(chromosome: &str) -> bool {
    let upper = chromosome.trim().to_ascii_uppercase();
    let short = upper.strip_prefix("CHR").unwrap_or(&upper);
    matches!(short, "X" | "Y")
}

/// Index each observed allele character into `[REF] ++ ALTs`.
///
/// The scan is linear over at most a handful of symbols. A character that
/// matches no symbol resolves to index 0, the reference slot; the second
/// return value counts those misses so callers can surface them.
pub fn genotype_indices(
    reference: &str,
    alternates: &[String],
    alleles: &str,
) -> (Vec<usize>, usize) {
    let mut unmatched = 0;
    let indices = alleles
        .chars()
        .map(|observed| {
            std::iter::once(reference)
                .chain(alternates.iter().map(String::as_str))
                .position(|symbol| symbol.len() == 1 && symbol.starts_with(observed))
                .unwrap_or_else(|| {
                    unmatched += 1;
                    0
                })
        })
        .collect();
    (indices, unmatched)
}
