use std::{fs::File, path::Path};

use anyhow::{Context, Result};
use noodles::bgzf;
use noodles::vcf::{
    self,
    variant::{io::Write as VariantRecordWrite, record_buf::RecordBuf},
};

/// Writes a single-sample, BGZF-compressed VCF.
pub struct VariantWriter {
    inner: vcf::io::Writer<bgzf::Writer<File>>,
}

impl VariantWriter {
    pub fn create<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = File::create(path.as_ref())
            .with_context(|| format!("failed to create output {}", path.as_ref().display()))?;
        Ok(Self {
            inner: vcf::io::Writer::new(bgzf::Writer::new(file)),
        })
    }

    pub fn write_header(&mut self, header: &vcf::Header) -> Result<()> {
        self.inner
            .write_header(header)
            .context("failed to write VCF header")
    }

    pub fn write_record(&mut self, header: &vcf::Header, record: &RecordBuf) -> Result<()> {
        self.inner
            .write_variant_record(header, record)
            .context("failed to write VCF record")
    }

    /// Flush the trailing BGZF block and append the EOF marker so the file
    /// can be decompressed on its own.
    pub fn finish(self) -> Result<()> {
        self.inner
            .into_inner()
            .finish()
            .context("failed to finalize BGZF stream")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::MultiGzDecoder;
    use noodles::vcf::variant::record_buf::samples::{sample::Value, Keys};
    use noodles::vcf::variant::record_buf::Samples;
    use std::fs;
    use std::io::Read;

    // 28-byte empty BGZF member marking end-of-file
    const BGZF_EOF: [u8; 28] = [
        0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43,
        0x02, 0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn output_is_standalone_bgzf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.vcf.gz");

        let mut header = vcf::Header::default();
        crate::reference::augment_header(&mut header, "sample");

        let keys: Keys = vec![String::from("GT")].into_iter().collect();
        let record = RecordBuf::builder()
            .set_reference_sequence_name("1")
            .set_variant_start(noodles::core::Position::new(42).unwrap())
            .set_ids([String::from("rs1")].into_iter().collect())
            .set_reference_bases("A")
            .set_alternate_bases(vec![String::from("G")].into())
            .set_samples(Samples::new(
                keys,
                vec![vec![Some(Value::String(String::from("0/1")))]],
            ))
            .build();

        let mut writer = VariantWriter::create(&path).unwrap();
        writer.write_header(&header).unwrap();
        writer.write_record(&header, &record).unwrap();
        writer.finish().unwrap();

        let compressed = fs::read(&path).unwrap();
        assert!(compressed.len() > BGZF_EOF.len());
        assert_eq!(compressed[compressed.len() - BGZF_EOF.len()..], BGZF_EOF);

        let mut text = String::new();
        MultiGzDecoder::new(&compressed[..])
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.contains("rs1"));
        assert!(text.contains("GT\t0/1"));
    }
}
