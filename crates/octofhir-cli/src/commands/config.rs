use anyhow::{Result, anyhow};
use octofhir_loader::LoaderConfig;

pub fn show(cfg: &LoaderConfig) -> Result<()> {
    let text = cfg.to_toml().map_err(|e| anyhow!(e))?;
    print!("{text}");
    Ok(())
}
