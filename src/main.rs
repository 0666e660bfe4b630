//! eifmap: map free-text activities to emission impact factors
//!
//! Reads an activity file, shortlists reference categories by embedding
//! similarity and asks a language model to pick the best match for each row.

use anyhow::Result;

fn main() -> Result<()> {
    eifmap::cli::run()
}
