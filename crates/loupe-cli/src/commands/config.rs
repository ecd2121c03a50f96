//! Config command - print the resolved configuration.

use loupe_core::Config;

/// Run the config command. Prints the configuration as it would be
/// written back to disk, after defaults and CLI overrides are applied.
pub fn run(config: Config) -> anyhow::Result<()> {
    print!("{}", config.render()?);
    if let Ok(path) = Config::default_config_path() {
        eprintln!();
        eprintln!("# config file location: {}", path.display());
    }
    Ok(())
}
