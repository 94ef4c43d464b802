//! Default configuration values and built-in presets

use std::str::FromStr;

use super::types::{
    Config, GroupConfig, OutputStyle, PipelineConfig, ServerConfig, StepConfig, TaskConfig,
    WatchConfig,
};

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "kiln.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "kiln.yaml";

/// Browser support targets handed to the autoprefixer
pub const DEFAULT_BROWSERS: &[&str] = &["last 15 versions", "> 1%", "ie 8", "ie 7"];

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".kiln.toml",
        ".kiln.yaml",
    ]
}

/// Built-in starting configurations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Preset {
    /// Indented-syntax stylesheets compiled into `src/css`, then minified into `dist`
    #[default]
    Sass,
    /// SCSS compiled, minified and written straight into `dist`
    Scss,
}

impl Preset {
    /// All presets, in display order
    pub const ALL: [Preset; 2] = [Preset::Sass, Preset::Scss];

    /// Preset name as used on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sass => "sass",
            Self::Scss => "scss",
        }
    }

    /// Build the preset's configuration
    pub fn config(&self) -> Config {
        match self {
            Self::Sass => sass_preset(),
            Self::Scss => scss_preset(),
        }
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sass" => Ok(Self::Sass),
            "scss" => Ok(Self::Scss),
            other => Err(format!("unknown preset '{}' (expected sass or scss)", other)),
        }
    }
}

fn style_compile() -> StepConfig {
    StepConfig::StyleCompile {
        output_style: OutputStyle::Expanded,
        command: None,
    }
}

fn autoprefix() -> StepConfig {
    StepConfig::Autoprefix {
        browsers: DEFAULT_BROWSERS.iter().map(|b| b.to_string()).collect(),
        command: None,
    }
}

fn transpile() -> StepConfig {
    StepConfig::Transpile {
        preset: "@babel/env".to_string(),
        command: None,
    }
}

/// Tasks shared by both presets: vendor bundles, reload, server and watcher
fn common_tasks(config: &mut Config, libs: &str, normalize: &str) {
    config.tasks.insert(
        "js-libs".to_string(),
        TaskConfig::Pipeline(
            PipelineConfig::new([format!("{}jquery/dist/jquery.min.js", libs)])
                .step(StepConfig::concat("libs.min.js"))
                .step(StepConfig::MinifyJs { command: None })
                .step(StepConfig::dest("dist/js")),
        ),
    );
    config.tasks.insert(
        "css-libs".to_string(),
        TaskConfig::Pipeline(
            PipelineConfig::new([format!("{}{}/normalize.css", libs, normalize)])
                .step(StepConfig::concat("libs.min.css"))
                .step(StepConfig::MinifyCss { command: None })
                .step(StepConfig::dest("dist/css"))
                .step(StepConfig::Reload),
        ),
    );
    config.tasks.insert("reload".to_string(), TaskConfig::Reload);
    config.tasks.insert("serve".to_string(), TaskConfig::Serve);
    config.tasks.insert("watch".to_string(), TaskConfig::Watch);
    config.tasks.insert("clear".to_string(), TaskConfig::ClearCache);
    config.tasks.insert(
        "clear-dist".to_string(),
        TaskConfig::Clean {
            patterns: vec!["dist/**".to_string()],
        },
    );

    config
        .groups
        .insert("dev".to_string(), GroupConfig::parallel(["watch", "serve"]));

    config.watch.push(WatchConfig::new("*.html", "reload"));
    config.exports.default = Some("dev".to_string());
    for name in ["js-libs", "css-libs", "clear", "clear-dist"] {
        config.exports.named.insert(name.to_string(), name.to_string());
    }
    config.server = Some(ServerConfig::default());
}

fn sass_preset() -> Config {
    let mut config = Config {
        name: Some("sass".to_string()),
        ..Config::default()
    };
    common_tasks(&mut config, "libs/", "normalize-css");

    config.tasks.insert(
        "main-sass".to_string(),
        TaskConfig::Pipeline(
            PipelineConfig::new(["src/sass/main.sass"])
                .step(style_compile())
                .step(StepConfig::concat("common.css"))
                .step(autoprefix())
                .step(StepConfig::dest("src/css")),
        ),
    );
    config.tasks.insert(
        "common-js".to_string(),
        TaskConfig::Pipeline(
            PipelineConfig::new(["src/js/main/main.js"])
                .step(StepConfig::concat("common.js"))
                .step(transpile())
                .step(StepConfig::dest("src/js")),
        ),
    );
    config.tasks.insert(
        "common-css-dist".to_string(),
        TaskConfig::Pipeline(
            PipelineConfig::new(["src/css/common.css"])
                .step(StepConfig::MinifyCss { command: None })
                .step(StepConfig::rename_to("common.min.css"))
                .step(StepConfig::dest("dist/css"))
                .step(StepConfig::Reload),
        ),
    );
    config.tasks.insert(
        "common-js-dist".to_string(),
        TaskConfig::Pipeline(
            PipelineConfig::new(["src/js/common.js"])
                .step(StepConfig::MinifyJs { command: None })
                .step(StepConfig::rename_to("common.min.js"))
                .step(StepConfig::dest("dist/js"))
                .step(StepConfig::Reload),
        ),
    );

    config.groups.insert(
        "css".to_string(),
        GroupConfig::series(["main-sass", "common-css-dist"]),
    );
    config.groups.insert(
        "js".to_string(),
        GroupConfig::series(["common-js", "common-js-dist"]),
    );

    config.watch.push(WatchConfig::new("src/sass/**/*.sass", "css"));
    config.watch.push(WatchConfig::new("src/js/main/**/*.js", "js"));
    config.watch.push(WatchConfig::new("*.php", "reload"));

    for name in ["common-js-dist", "common-css-dist"] {
        config.exports.named.insert(name.to_string(), name.to_string());
    }

    config
}

fn scss_preset() -> Config {
    let mut config = Config {
        name: Some("scss".to_string()),
        ..Config::default()
    };
    common_tasks(&mut config, "node_modules/", "normalize.css");

    config.tasks.insert(
        "styles".to_string(),
        TaskConfig::Pipeline(
            PipelineConfig::new(["src/scss/main.scss"])
                .step(style_compile())
                .step(StepConfig::concat("common.min.css"))
                .step(autoprefix())
                .step(StepConfig::MinifyCss { command: None })
                .step(StepConfig::dest("dist/css"))
                .step(StepConfig::Reload),
        ),
    );
    config.tasks.insert(
        "scripts".to_string(),
        TaskConfig::Pipeline(
            PipelineConfig::new(["src/js/**/*.js"])
                .step(StepConfig::concat("common.min.js"))
                .step(transpile())
                .step(StepConfig::MinifyJs { command: None })
                .step(StepConfig::dest("dist/js"))
                .step(StepConfig::Reload),
        ),
    );

    config.groups.insert(
        "build".to_string(),
        GroupConfig::parallel(["js-libs", "css-libs", "styles", "scripts"]),
    );

    config.watch.push(WatchConfig::new("src/scss/**/*.scss", "styles"));
    config.watch.push(WatchConfig::new("src/js/**/*.js", "scripts"));

    for name in ["styles", "scripts", "build"] {
        config.exports.named.insert(name.to_string(), name.to_string());
    }

    config
}

/// Render a preset as a commented TOML file
pub fn preset_toml(preset: Preset) -> Result<String, toml::ser::Error> {
    let body = toml::to_string_pretty(&preset.config())?;
    Ok(format!(
        "# Kiln configuration ({} preset)\n# Run `kiln list` to see the exported tasks.\n\n{}",
        preset.as_str(),
        body
    ))
}

/// Render a preset as a commented YAML file
pub fn preset_yaml(preset: Preset) -> Result<String, serde_yaml::Error> {
    let body = serde_yaml::to_string(&preset.config())?;
    Ok(format!(
        "# Kiln configuration ({} preset)\n# Run `kiln list` to see the exported tasks.\n\n{}",
        preset.as_str(),
        body
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sass_preset_shape() {
        let config = Preset::Sass.config();
        assert_eq!(config.exports.default.as_deref(), Some("dev"));
        assert!(config.exports.named.contains_key("common-js-dist"));
        assert!(config.exports.named.contains_key("common-css-dist"));
        assert_eq!(config.groups["css"].tasks, vec!["main-sass", "common-css-dist"]);
        assert!(config
            .watch
            .iter()
            .any(|w| w.patterns == vec!["src/sass/**/*.sass"] && w.run == "css"));
    }

    #[test]
    fn test_scss_preset_writes_dist_directly() {
        let config = Preset::Scss.config();
        match &config.tasks["styles"] {
            TaskConfig::Pipeline(p) => {
                assert!(p.steps.contains(&StepConfig::dest("dist/css")));
                assert!(p.steps.contains(&StepConfig::concat("common.min.css")));
            }
            other => panic!("unexpected task {:?}", other),
        }
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("sass".parse::<Preset>().unwrap(), Preset::Sass);
        assert_eq!("scss".parse::<Preset>().unwrap(), Preset::Scss);
        assert!("less".parse::<Preset>().is_err());
    }

    #[test]
    fn test_preset_toml_roundtrips_through_parser() {
        for preset in Preset::ALL {
            let rendered = preset_toml(preset).unwrap();
            let parsed: Config = toml::from_str(&rendered).unwrap();
            assert_eq!(parsed, preset.config());
        }
    }

    #[test]
    fn test_preset_yaml_parses() {
        let rendered = preset_yaml(Preset::Sass).unwrap();
        let parsed: Config = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(parsed.tasks.len(), Preset::Sass.config().tasks.len());
    }
}
