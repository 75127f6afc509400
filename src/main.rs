use anyhow::Result;

fn main() -> Result<()> {
    refprofile::cli::run()
}
