use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use noodles::vcf::{
    self,
    header::record::value::{
        map::{format::Number, format::Type, Format},
        Map,
    },
};

/// Lazy reader over the gzip-compressed canonical variant catalog.
pub type CatalogReader = vcf::io::Reader<BufReader<MultiGzDecoder<BufReader<File>>>>;

/// Open the reference catalog for a single forward pass.
pub fn open_catalog(path: &Path) -> Result<CatalogReader> {
    let file = File::open(path)
        .with_context(|| format!("failed to open reference catalog {}", path.display()))?;
    let decoder = MultiGzDecoder::new(BufReader::new(file));
    Ok(vcf::io::Reader::new(BufReader::new(decoder)))
}

/// Turn the catalog header into a single-sample output header: register the
/// GT format descriptor and append the sample column.
///
/// The descriptor advertises `Number=.` and `Type=Integer` while the sample
/// values are rendered as slash-joined text; that mismatch is inherited from
/// the catalog's producers and is preserved for wire compatibility.
pub fn augment_header(header: &mut vcf::Header, sample_name: &str) {
    let genotype = Map::<Format>::new(Number::Unknown, Type::Integer, "Genotype");
    header.formats_mut().insert(String::from("GT"), genotype);
    header.sample_names_mut().insert(sample_name.to_string());
}

/// Sample column name: the raw input's base filename, extension stripped.
pub fn sample_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| String::from("sample"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;
    use std::path::PathBuf;

    const CATALOG: &str = "\
##fileformat=VCFv4.2
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO
1\t42\trs1\tA\tG\t.\t.\t.
";

    fn write_catalog(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("reference.vcf.gz");
        let file = File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(CATALOG.as_bytes()).unwrap();
        encoder.finish().unwrap();
        path
    }

    #[test]
    fn streams_catalog_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir);

        let mut reader = open_catalog(&path).unwrap();
        let header = reader.read_header().unwrap();
        let records: Vec<_> = reader
            .record_bufs(&header)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reference_bases(), "A");
    }

    #[test]
    fn augmented_header_carries_sample_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir);

        let mut reader = open_catalog(&path).unwrap();
        let mut header = reader.read_header().unwrap();
        augment_header(&mut header, "genome_data");

        let mut buf = Vec::new();
        let mut writer = vcf::io::Writer::new(&mut buf);
        writer.write_header(&header).unwrap();
        let rendered = String::from_utf8(buf).unwrap();

        assert!(
            rendered.contains("##FORMAT=<ID=GT,Number=.,Type=Integer,Description=\"Genotype\">")
        );
        assert!(rendered.contains("FORMAT\tgenome_data"));
    }

    #[test]
    fn sample_name_strips_extension() {
        assert_eq!(
            sample_name(Path::new("data/genome_data.zip")),
            "genome_data"
        );
        assert_eq!(sample_name(Path::new("a.b.txt")), "a.b");
        assert_eq!(sample_name(Path::new("")), "sample");
    }

    #[test]
    fn missing_catalog_is_an_error() {
        assert!(open_catalog(Path::new("/nonexistent/reference.vcf.gz")).is_err());
    }
}
