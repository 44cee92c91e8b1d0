use clap::Subcommand;
use geoshift_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "tracking.exit_grace_minutes")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match lookup(&config, &key)? {
                Some(value) => println!("{value}"),
                None => {
                    eprintln!("unknown key: {key}");
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let config = Config::load()?;
            let updated = set_key(config, &key, &value)?;
            updated.save()?;
            println!("ok");
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}

/// Dotted-path lookup over the config's JSON representation.
fn lookup(
    config: &Config,
    key: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let mut node = serde_json::to_value(config)?;
    for part in key.split('.') {
        match node.get(part) {
            Some(child) => node = child.clone(),
            None => return Ok(None),
        }
    }
    Ok(Some(match node {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }))
}

/// Set a dotted-path key, validating the result deserializes back.
fn set_key(
    config: Config,
    key: &str,
    value: &str,
) -> Result<Config, Box<dyn std::error::Error>> {
    let mut root = serde_json::to_value(&config)?;
    let mut node = &mut root;
    let parts: Vec<&str> = key.split('.').collect();
    let (last, path) = parts.split_last().ok_or("empty config key")?;
    for part in path {
        node = node
            .get_mut(*part)
            .ok_or_else(|| format!("unknown key: {key}"))?;
    }
    let slot = node
        .get_mut(*last)
        .ok_or_else(|| format!("unknown key: {key}"))?;
    // Interpret the raw string as JSON where possible so numbers and
    // booleans keep their types; fall back to a plain string.
    *slot = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok(serde_json::from_value(root).map_err(|e| format!("invalid value for {key}: {e}"))?)
}
