//! Simple setting handlers for single-value settings.

use std::path::PathBuf;

use crate::cli::settings::error::SettingError;
use crate::cli::settings::helpers::{success_set, success_unset, validate_backend};
use crate::cli::settings::{SetContext, SettingHandler};
use crate::core::config::{path_display, Config};

/// Handler for the `backend` setting.
pub struct BackendHandler;

impl SettingHandler for BackendHandler {
    fn key(&self) -> &'static str {
        "backend"
    }

    fn set(&self, args: &[String], ctx: &mut SetContext<'_>) -> Result<String, SettingError> {
        if args.is_empty() {
            return Err(SettingError::MissingArgs {
                hint: "To set the default backend, specify its kind:",
                example: "promptpad set backend kobold-cpp",
            });
        }

        let kind = validate_backend(&args.join(" "))?;
        ctx.config.backend = Some(kind);
        Ok(success_set("backend", kind.id()))
    }

    fn unset(
        &self,
        _args: Option<&str>,
        ctx: &mut SetContext<'_>,
    ) -> Result<String, SettingError> {
        ctx.config.backend = None;
        Ok(success_unset("backend"))
    }

    fn format(&self, config: &Config) -> String {
        match config.backend {
            Some(kind) => format!("  backend: {}", kind.id()),
            None => format!("  backend: (unset, default: {})", config.backend_kind().id()),
        }
    }
}

/// Handler for the `endpoint` setting.
pub struct EndpointHandler;

impl SettingHandler for EndpointHandler {
    fn key(&self) -> &'static str {
        "endpoint"
    }

    fn set(&self, args: &[String], ctx: &mut SetContext<'_>) -> Result<String, SettingError> {
        let Some(endpoint) = args.first().map(|arg| arg.trim()).filter(|arg| !arg.is_empty())
        else {
            return Err(SettingError::MissingArgs {
                hint: "To set the server address, specify a URL:",
                example: "promptpad set endpoint http://127.0.0.1:8080",
            });
        };

        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(SettingError::InvalidValue {
                key: "endpoint",
                input: endpoint.to_string(),
                expected: "an http:// or https:// URL",
            });
        }

        ctx.config.endpoint = Some(endpoint.to_string());
        Ok(success_set("endpoint", endpoint))
    }

    fn unset(
        &self,
        _args: Option<&str>,
        ctx: &mut SetContext<'_>,
    ) -> Result<String, SettingError> {
        ctx.config.endpoint = None;
        Ok(format!(
            "✅ Unset endpoint (will use {})",
            ctx.config.backend_kind().default_endpoint()
        ))
    }

    fn format(&self, config: &Config) -> String {
        match &config.endpoint {
            Some(endpoint) => format!("  endpoint: {endpoint}"),
            None => format!(
                "  endpoint: (unset, default: {})",
                config.backend_kind().default_endpoint()
            ),
        }
    }
}

/// Handler for the `sessions-dir` setting.
pub struct SessionsDirHandler;

impl SettingHandler for SessionsDirHandler {
    fn key(&self) -> &'static str {
        "sessions-dir"
    }

    fn set(&self, args: &[String], ctx: &mut SetContext<'_>) -> Result<String, SettingError> {
        if args.is_empty() {
            return Err(SettingError::MissingArgs {
                hint: "To store sessions elsewhere, specify a directory:",
                example: "promptpad set sessions-dir ~/Documents/prompts",
            });
        }

        let dir = PathBuf::from(args.join(" "));
        let message = success_set("sessions-dir", &path_display(&dir));
        ctx.config.sessions_dir = Some(dir);
        Ok(message)
    }

    fn unset(
        &self,
        _args: Option<&str>,
        ctx: &mut SetContext<'_>,
    ) -> Result<String, SettingError> {
        ctx.config.sessions_dir = None;
        Ok(success_unset("sessions-dir"))
    }

    fn format(&self, config: &Config) -> String {
        match config.sessions_dir() {
            Ok(dir) if config.sessions_dir.is_some() => {
                format!("  sessions-dir: {}", path_display(dir))
            }
            Ok(dir) => format!("  sessions-dir: (unset, default: {})", path_display(dir)),
            Err(err) => format!("  sessions-dir: (unavailable: {err})"),
        }
    }
}
