use anyhow::Result;
use clap::Args;
use common::cli::utils::display_config;
use common::config::Configuration;
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl ConfigArgs {
    pub fn run(self, config: &Configuration) -> Result<ExitCode> {
        display_config(config, self.json)?;
        Ok(ExitCode::SUCCESS)
    }
}
