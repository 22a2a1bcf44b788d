//! `medley info`: dump entry properties.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use medley_core::{MediaId, Query};

use super::{connect, print_properties};

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Collection pattern; the current entry when omitted.
    pub pattern: Vec<String>,
}

impl InfoArgs {
    pub fn run(self, socket: Option<PathBuf>) -> Result<()> {
        let mut client = connect(socket)?;

        let ids = if self.pattern.is_empty() {
            let current = client
                .playback_current_id()
                .context("failed to query current entry")?;
            if current == MediaId::NONE {
                bail!("nothing is playing; give a pattern");
            }
            vec![current]
        } else {
            let pattern = self.pattern.join(" ");
            let query = Query::parse(&pattern)
                .with_context(|| format!("failed to parse pattern '{pattern}'"))?;
            client.query_ids(&query).context("query failed")?
        };

        for (n, id) in ids.into_iter().enumerate() {
            if n > 0 {
                println!();
            }
            let props = client
                .medialib_get_info(id)
                .with_context(|| format!("failed to get info for entry {id}"))?;
            print_properties(&props);
        }
        Ok(())
    }
}
