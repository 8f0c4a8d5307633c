//! Conversion of CLI arguments into an [`OverlayConfig`]

use crate::cli::main_impl::ComposeArgs;
use crate::{
    backends::BackendType,
    config::{ExecutionProvider, Language, OverlayConfig},
    models::ModelSpec,
    preferences::Preferences,
};
use anyhow::{Context, Result};

/// Environment variable consulted for the generative API key
pub(crate) const API_KEY_ENV: &str = "GEMINI_API_KEY";

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the session configuration for `compose`
    ///
    /// Explicit arguments win over stored preferences.
    pub(crate) fn from_compose(args: &ComposeArgs, preferences: &Preferences) -> Result<OverlayConfig> {
        Self::validate_compose(args)?;

        let mut builder = OverlayConfig::builder()
            .padding(args.padding)
            .intra_threads(args.threads)
            .execution_provider(Self::execution_provider(&args.execution_provider)?)
            .language(Self::language(args.language.as_deref(), preferences)?);

        if let Some(model) = &args.model {
            builder = builder.model(ModelSpec::parse(model));
        }
        if let Some(pane_height) = args.pane_height {
            builder = builder.pane_height(pane_height);
        }
        if let Some(margin) = args.margin {
            builder = builder.margin(margin);
        }
        if let Some(background) = &args.background {
            builder = builder
                .background_hex(background)
                .with_context(|| format!("Invalid background colour '{background}'"))?;
        }
        if let Some(prompt) = &args.prompt {
            builder = builder.prompt(prompt.clone());
        }
        if let Some(model) = &args.generation_model {
            builder = builder.generation_model(model.clone());
        }

        builder.build().context("Invalid overlay configuration")
    }

    pub(crate) fn backend_type(value: &str) -> Result<BackendType> {
        value
            .parse()
            .with_context(|| format!("Invalid backend '{value}'"))
    }

    fn execution_provider(value: &str) -> Result<ExecutionProvider> {
        value
            .parse()
            .with_context(|| format!("Invalid execution provider '{value}'"))
    }

    fn language(value: Option<&str>, preferences: &Preferences) -> Result<Language> {
        match value {
            Some(tag) => tag
                .parse()
                .with_context(|| format!("Invalid language '{tag}'")),
            None => Ok(preferences.language),
        }
    }

    /// Reject argument combinations clap cannot express
    pub(crate) fn validate_compose(args: &ComposeArgs) -> Result<()> {
        if let Some(scale) = args.scale {
            if !(scale.is_finite() && scale > 0.0) {
                anyhow::bail!("Scale must be a positive number, got {scale}");
            }
        }
        if let Some(opacity) = args.opacity {
            if !(0.0..=1.0).contains(&opacity) {
                anyhow::bail!("Opacity must be between 0.0 and 1.0, got {opacity}");
            }
        }
        if args.exports.is_empty() {
            anyhow::bail!("At least one export is required");
        }
        Ok(())
    }
}

/// Pick the API key: argument, then environment, then stored preference
pub(crate) fn resolve_api_key(
    argument: Option<&str>,
    environment: Option<&str>,
    preferences: &Preferences,
) -> Option<String> {
    [argument, environment]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|key| !key.is_empty())
        .or_else(|| preferences.api_key())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::main_impl::{Cli, Command};
    use clap::Parser;

    fn compose_args(extra: &[&str]) -> ComposeArgs {
        let mut argv = vec![
            "pilgrimage-overlay",
            "compose",
            "--screenshot",
            "shot.png",
            "--photo",
            "photo.jpg",
        ];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Compose(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_defaults_follow_preferences() {
        let preferences = Preferences {
            language: Language::English,
            api_key: None,
        };
        let config = CliConfigBuilder::from_compose(&compose_args(&[]), &preferences).unwrap();
        assert_eq!(config.language, Language::English);
        assert_eq!(config.layout, crate::config::LayoutConfig::default());
        assert_eq!(config.extraction.padding, crate::bounds::DEFAULT_PADDING);
    }

    #[test]
    fn test_layout_overrides() {
        let args = compose_args(&[
            "--pane-height",
            "720",
            "--margin",
            "12",
            "--background",
            "#101010",
            "--language",
            "zh-CN",
            "--execution-provider",
            "cpu",
        ]);
        let preferences = Preferences {
            language: Language::English,
            api_key: None,
        };
        let config = CliConfigBuilder::from_compose(&args, &preferences).unwrap();
        assert_eq!(config.layout.pane_height, 720);
        assert_eq!(config.layout.margin, 12);
        assert_eq!(config.layout.background, image::Rgba([0x10, 0x10, 0x10, 0xFF]));
        assert_eq!(config.language, Language::ChineseSimplified);
        assert_eq!(config.extraction.execution_provider, ExecutionProvider::Cpu);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let preferences = Preferences::default();
        for extra in [
            &["--background", "nope"][..],
            &["--opacity", "1.5"][..],
            &["--scale", "0"][..],
            &["--execution-provider", "tpu"][..],
            &["--pane-height", "0"][..],
        ] {
            assert!(
                CliConfigBuilder::from_compose(&compose_args(extra), &preferences).is_err(),
                "{extra:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_api_key_precedence() {
        let mut preferences = Preferences::default();
        preferences.set_api_key(Some("stored"));

        assert_eq!(
            resolve_api_key(Some("arg"), Some("env"), &preferences).as_deref(),
            Some("arg")
        );
        assert_eq!(
            resolve_api_key(Some("  "), Some("env"), &preferences).as_deref(),
            Some("env")
        );
        assert_eq!(resolve_api_key(None, None, &preferences).as_deref(), Some("stored"));
        assert_eq!(resolve_api_key(None, Some(""), &Preferences::default()), None);
    }

    #[test]
    fn test_backend_type() {
        assert_eq!(CliConfigBuilder::backend_type("mock").unwrap(), BackendType::Mock);
        assert!(CliConfigBuilder::backend_type("tflite").is_err());
    }
}
