use anyhow::Result;

fn main() -> Result<()> {
    raw2vcf::cli::run()
}
