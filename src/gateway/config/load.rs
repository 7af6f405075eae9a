use std::borrow::Cow;
use std::env;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use tracing::{debug, info, info_span};

use crate::gateway::common::{Error, Result};

use super::settings::{config, set_global, Settings};

/// Loads `gateway.yaml`, searching in order:
/// 1) the path passed as the first command line argument
/// 2) the current directory, then any parent up to root
/// 3) `~/.config/iris-pgwire/`
/// 4) `~/`
/// 5) `/etc/iris-pgwire/`
///
/// `${ENV_VAR}` / `${ENV_VAR:-default}` / `${ENV_VAR:?message}` references in
/// the file are substituted from the environment before parsing.
pub fn load_config(config_name: &str) -> Result<&'static Settings> {
    let _span = info_span!("loading config file");
    let config_path = find_config_file(config_name)?;
    info!(config_path = %config_path.to_string_lossy().into_owned(), "found config file");
    let raw_yaml = std::fs::read_to_string(&config_path)?;
    let yaml_text = replace_env_vars(&raw_yaml)?;

    let mut settings: Settings = serde_yaml::from_str(&yaml_text)?;
    settings.validate(config_path)?;
    set_global(settings);
    Ok(config())
}

fn find_config_file(config_name: &str) -> Result<PathBuf> {
    if let Some(path) = env::args().nth(1) {
        debug!("using config_path passed on command line");
        return Ok(PathBuf::from(path));
    }

    if let Ok(start) = env::current_dir() {
        let mut dir = start.as_path();
        while !dir.as_os_str().is_empty() {
            debug!("checking for config file in {}", dir.to_string_lossy());
            let fp = Path::join(dir, config_name);
            if fp.exists() {
                return Ok(fp);
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    let home = env::var("HOME").unwrap_or_else(|_| "~/".to_string());

    let mut conf_path = Path::join(Path::new(&home), Path::join(Path::new(".config/iris-pgwire"), config_name));
    debug!("checking for config file in {}", conf_path.to_string_lossy());
    if conf_path.exists() {
        return Ok(conf_path);
    }

    conf_path = Path::join(Path::new(&home), ".".to_string() + config_name);
    debug!("checking for config file in {}", conf_path.to_string_lossy());
    if conf_path.exists() {
        return Ok(conf_path);
    }

    conf_path = Path::join(Path::new("/etc/iris-pgwire"), config_name);
    debug!("checking for config file in {}", conf_path.to_string_lossy());
    if conf_path.exists() {
        return Ok(conf_path);
    }

    Err(Error::new(format!("config file {} not found", config_name)))
}

fn replace_env_vars(raw_yaml: &str) -> Result<Cow<str>> {
    let re_var = Regex::new(r"\$\{([a-zA-Z_][0-9a-zA-Z_]*)(?::([^}]+?))?\}").unwrap();
    let mut errors = Vec::<String>::new();

    let replaced_text = re_var.replace_all(raw_yaml, |caps: &Captures| {
        match env::var(&caps[1]) {
            Ok(val) => val,
            Err(_) => {
                if let Some(default) = caps.get(2) {
                    let s = default.as_str();
                    if let Some(message) = s.strip_prefix('?') {
                        errors.push(message.to_string());
                        String::new()
                    } else {
                        s.to_string()
                    }
                } else {
                    errors.push(format!("environment variable {} is required but not defined", &caps[1]));
                    String::new()
                }
            }
        }
    });

    if errors.is_empty() {
        Ok(replaced_text)
    } else {
        Err(Error::new(errors.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_env_var_with_default() {
        let out = replace_env_vars("port: ${GATEWAY_TEST_PORT:-5432}").unwrap();
        assert_eq!(out, "port: 5432");
    }

    #[test]
    fn substitutes_env_var_from_environment() {
        env::set_var("GATEWAY_TEST_HOST", "iris.example.com");
        let out = replace_env_vars("host: ${GATEWAY_TEST_HOST}").unwrap();
        assert_eq!(out, "host: iris.example.com");
        env::remove_var("GATEWAY_TEST_HOST");
    }

    #[test]
    fn required_var_without_default_errors() {
        env::remove_var("GATEWAY_TEST_MISSING");
        assert!(replace_env_vars("x: ${GATEWAY_TEST_MISSING}").is_err());
    }
}
