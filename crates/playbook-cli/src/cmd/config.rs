use crate::output::print_json;
use clap::Subcommand;
use playbook_core::config::{ExecutorConfig, WarnLevel};

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective config, defaults filled in
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(config: &ExecutorConfig, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(config, json),
        ConfigSubcommand::Validate => validate(config, json),
    }
}

fn show(config: &ExecutorConfig, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(config);
    }
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

fn validate(config: &ExecutorConfig, json: bool) -> anyhow::Result<()> {
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
