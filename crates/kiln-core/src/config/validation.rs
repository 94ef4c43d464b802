//! Configuration validation

use globset::Glob;
use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::{Config, StepConfig, TaskConfig};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_tasks(config)?;
    validate_groups(config)?;
    validate_watch(config)?;
    validate_exports(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_name(field: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::invalid(field, "name cannot be empty").into());
    }
    Ok(())
}

fn validate_glob(field: &str, pattern: &str) -> Result<()> {
    let pattern = pattern.strip_prefix('!').unwrap_or(pattern);
    if pattern.is_empty() {
        return Err(ConfigError::invalid(field, "glob pattern cannot be empty").into());
    }
    Glob::new(pattern)
        .map_err(|e| ConfigError::invalid(field, format!("invalid glob '{}': {}", pattern, e)))?;
    Ok(())
}

fn validate_reference(config: &Config, field: &str, name: &str) -> Result<()> {
    if !config.defines(name) {
        return Err(ConfigError::UnknownReference {
            field: field.to_string(),
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

fn validate_tasks(config: &Config) -> Result<()> {
    for (name, task) in &config.tasks {
        validate_name("tasks", name)?;

        if config.groups.contains_key(name) {
            return Err(ConfigError::invalid(
                format!("tasks.{}", name),
                "name is also used by a group",
            )
            .into());
        }

        match task {
            TaskConfig::Pipeline(pipeline) => {
                if pipeline.src.is_empty() {
                    return Err(ConfigError::invalid(
                        format!("tasks.{}.src", name),
                        "at least one source pattern is required",
                    )
                    .into());
                }
                for (i, pattern) in pipeline.src.iter().enumerate() {
                    validate_glob(&format!("tasks.{}.src[{}]", name, i), pattern)?;
                }
                for (i, step) in pipeline.steps.iter().enumerate() {
                    validate_step(&format!("tasks.{}.steps[{}]", name, i), step)?;
                }
                if !pipeline.has_output() {
                    return Err(ConfigError::invalid(
                        format!("tasks.{}.steps", name),
                        "pipeline must end with a `dest` or `reload` step",
                    )
                    .into());
                }
            }
            TaskConfig::Clean { patterns } => {
                if patterns.is_empty() {
                    return Err(ConfigError::invalid(
                        format!("tasks.{}.patterns", name),
                        "at least one pattern is required",
                    )
                    .into());
                }
                for (i, pattern) in patterns.iter().enumerate() {
                    validate_glob(&format!("tasks.{}.patterns[{}]", name, i), pattern)?;
                }
            }
            TaskConfig::Serve => {
                if config.server.is_none() {
                    return Err(ConfigError::invalid(
                        format!("tasks.{}", name),
                        "a `serve` task requires a [server] section",
                    )
                    .into());
                }
            }
            TaskConfig::ClearCache | TaskConfig::Reload | TaskConfig::Watch => {}
        }
    }
    Ok(())
}

fn validate_step(field: &str, step: &StepConfig) -> Result<()> {
    match step {
        StepConfig::Concat { file } => {
            if file.trim().is_empty() {
                return Err(ConfigError::invalid(field, "concat file name cannot be empty").into());
            }
        }
        StepConfig::Rename { to, suffix, extname } => {
            if to.is_none() && suffix.is_none() && extname.is_none() {
                return Err(ConfigError::invalid(
                    field,
                    "rename needs one of `to`, `suffix` or `extname`",
                )
                .into());
            }
            if to.as_deref().is_some_and(|t| t.trim().is_empty()) {
                return Err(ConfigError::invalid(field, "rename target cannot be empty").into());
            }
        }
        StepConfig::Replace { pattern, .. } => {
            Regex::new(pattern).map_err(|e| {
                ConfigError::invalid(field, format!("invalid regex '{}': {}", pattern, e))
            })?;
        }
        StepConfig::Command { command } => {
            if command.trim().is_empty() {
                return Err(ConfigError::invalid(field, "command cannot be empty").into());
            }
        }
        StepConfig::Dest { dir } => {
            if dir.trim().is_empty() {
                return Err(ConfigError::invalid(field, "destination cannot be empty").into());
            }
        }
        StepConfig::Autoprefix { browsers, .. } => {
            if browsers.is_empty() {
                return Err(ConfigError::invalid(field, "browser target list cannot be empty").into());
            }
        }
        StepConfig::StyleCompile { .. }
        | StepConfig::Transpile { .. }
        | StepConfig::MinifyJs { .. }
        | StepConfig::MinifyCss { .. }
        | StepConfig::Reload => {}
    }
    Ok(())
}

fn validate_groups(config: &Config) -> Result<()> {
    for (name, group) in &config.groups {
        validate_name("groups", name)?;
        if group.tasks.is_empty() {
            return Err(ConfigError::invalid(
                format!("groups.{}.tasks", name),
                "a group needs at least one member",
            )
            .into());
        }
        for member in &group.tasks {
            validate_reference(config, &format!("groups.{}", name), member)?;
        }
    }
    Ok(())
}

fn validate_watch(config: &Config) -> Result<()> {
    if !config.watch.is_empty() {
        debug!(count = config.watch.len(), "validating watch rules");
    }
    for (i, rule) in config.watch.iter().enumerate() {
        if rule.patterns.is_empty() {
            return Err(ConfigError::invalid(
                format!("watch[{}].patterns", i),
                "at least one pattern is required",
            )
            .into());
        }
        for (j, pattern) in rule.patterns.iter().enumerate() {
            validate_glob(&format!("watch[{}].patterns[{}]", i, j), pattern)?;
        }
        validate_reference(config, &format!("watch[{}].run", i), &rule.run)?;
    }
    Ok(())
}

fn validate_exports(config: &Config) -> Result<()> {
    if let Some(default) = &config.exports.default {
        validate_reference(config, "exports.default", default)?;
    }
    for (alias, target) in &config.exports.named {
        validate_name("exports.named", alias)?;
        validate_reference(config, &format!("exports.named.{}", alias), target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GroupConfig, PipelineConfig, Preset, WatchConfig};

    fn pipeline(steps: Vec<StepConfig>) -> TaskConfig {
        let mut p = PipelineConfig::new(["src/**/*.js"]);
        p.steps = steps;
        TaskConfig::Pipeline(p)
    }

    #[test]
    fn test_validate_presets() {
        for preset in Preset::ALL {
            assert!(validate_config(&preset.config()).is_ok());
        }
    }

    #[test]
    fn test_validate_empty_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_pipeline_without_output_rejected() {
        let mut config = Config::default();
        config
            .tasks
            .insert("js".to_string(), pipeline(vec![StepConfig::concat("all.js")]));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("dest"));
    }

    #[test]
    fn test_unknown_group_member_rejected() {
        let mut config = Config::default();
        config
            .groups
            .insert("all".to_string(), GroupConfig::series(["missing"]));
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_watch_target_must_exist() {
        let mut config = Config::default();
        config.watch.push(WatchConfig::new("src/**/*.js", "js"));
        assert!(validate_config(&config).is_err());

        config
            .tasks
            .insert("js".to_string(), pipeline(vec![StepConfig::dest("dist")]));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let mut config = Config::default();
        config
            .tasks
            .insert("js".to_string(), pipeline(vec![StepConfig::dest("dist")]));
        config.watch.push(WatchConfig::new("src/[", "js"));
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let mut config = Config::default();
        config.tasks.insert(
            "js".to_string(),
            pipeline(vec![
                StepConfig::Replace {
                    pattern: "(".to_string(),
                    replacement: String::new(),
                },
                StepConfig::dest("dist"),
            ]),
        );
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_serve_requires_server_section() {
        let mut config = Config::default();
        config.tasks.insert("serve".to_string(), TaskConfig::Serve);
        assert!(validate_config(&config).is_err());
        config.server = Some(Default::default());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_task_and_group_name_clash_rejected() {
        let mut config = Config::default();
        config.tasks.insert("reload".to_string(), TaskConfig::Reload);
        config
            .groups
            .insert("reload".to_string(), GroupConfig::series(["reload"]));
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rename_needs_target() {
        let mut config = Config::default();
        config.tasks.insert(
            "css".to_string(),
            pipeline(vec![
                StepConfig::Rename {
                    to: None,
                    suffix: None,
                    extname: None,
                },
                StepConfig::dest("dist"),
            ]),
        );
        assert!(validate_config(&config).is_err());
    }
}
