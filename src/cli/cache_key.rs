//! Cache-key command: where the embeddings for a catalog live.

use anyhow::Result;
use clap::Args;
use tracing::Level;

use super::utils::{load_run_config, require_path, ReferenceArgs};
use crate::embed::{configured_cache, configured_model_id};
use crate::source::load_reference_catalog;
use crate::utils::corpus_cache_key;

#[derive(Args)]
pub struct CacheKeyArgs {
    #[command(flatten)]
    pub reference: ReferenceArgs,
}

pub fn run(args: CacheKeyArgs, verbose: bool) -> Result<()> {
    super::init_logging(verbose, Level::WARN, None)?;

    let config = load_run_config(args.reference.config.as_deref(), args.reference.overrides())?;
    let reference_file =
        require_path(&config.reference_file, "--reference-file", "reference_file")?;
    let catalog = load_reference_catalog(&reference_file, config.task)?;

    let model_id = configured_model_id(&config);
    let key = corpus_cache_key(&model_id, catalog.corpus());
    let cache = configured_cache(&config);
    let path = cache.path_for_key(&key);

    println!("model:   {model_id}");
    println!("texts:   {}", catalog.corpus().len());
    println!("key:     {key}");
    println!("path:    {}", path.display());
    println!("cached:  {}", if path.exists() { "yes" } else { "no" });
    Ok(())
}
