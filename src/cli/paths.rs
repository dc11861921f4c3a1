use anyhow::Result;

use crate::config::Config;

pub fn run(config: &Config) -> Result<()> {
    let paths = &config.paths;
    println!("Config dir:  {}", paths.config_dir.display());
    println!("Config file: {}", paths.config_file().display());
    println!("Data dir:    {}", paths.data_dir.display());
    println!("State dir:   {}", paths.state_dir.display());
    println!("Workspace:   {}", config.workspace_path().display());
    Ok(())
}
