//! Configuration types for embryo image analysis and report export.
//!
//! All behaviour is controlled through [`AnalyzerConfig`], built via its
//! [`AnalyzerConfigBuilder`]. The analysis instruction itself is *not* part of
//! the configuration: it is a fixed, versioned value in [`crate::prompts`].

use crate::error::AnalyzerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Environment variable holding the vision-service credential.
pub const API_KEY_ENV: &str = "EMBRYO_ANALYZER_API_KEY";

/// Fallback credential variable, shared with other OpenAI tooling.
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

/// Credential baked in at build time, if any.
const BAKED_API_KEY: Option<&str> = option_env!("EMBRYO_ANALYZER_API_KEY");

/// Default name of the exported report.
pub const DEFAULT_REPORT_FILE_NAME: &str = "embryo_analysis_report.pdf";

/// Configuration for a session: which model to call and how to export.
///
/// # Example
/// ```rust
/// use embryo_analyzer::AnalyzerConfig;
///
/// let config = AnalyzerConfig::builder()
///     .model("gpt-4o")
///     .temperature(0.2)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gpt-4o");
/// ```
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// Vision model identifier. Default: `gpt-4-turbo`.
    pub model: String,

    /// Provider name for the edgequake-llm backend (`anthropic`, `gemini`,
    /// `ollama`, …). `None` selects the built-in chat-completions backend.
    pub provider_name: Option<String>,

    /// Base URL of the chat-completions endpoint. Default: OpenAI v1.
    pub api_base: String,

    /// Explicit credential. When `None`, the environment and then the
    /// build-time value are consulted by [`AnalyzerConfig::resolve_api_key`].
    pub api_key: Option<String>,

    /// Consult the environment and the build-time value when no explicit
    /// credential is set. Default: `true`.
    pub ambient_credentials: bool,

    /// Sampling temperature. Default: 0.7.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 1024.
    pub max_tokens: usize,

    /// Timeout for the single analysis call, in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Page size and margins of the exported report. Default: A4, 10 mm.
    pub page: PageGeometry,

    /// What to do when the captured view is taller than one page.
    pub overflow: OverflowPolicy,

    /// File name used when the caller does not pick an export path.
    pub report_file_name: String,

    /// Explicit pdfium library to bind for raster capture. When `None`,
    /// `PDFIUM_LIB_PATH` and then the system library are tried.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4-turbo".to_string(),
            provider_name: None,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            ambient_credentials: true,
            temperature: 0.7,
            max_tokens: 1024,
            request_timeout_secs: 60,
            page: PageGeometry::default(),
            overflow: OverflowPolicy::default(),
            report_file_name: DEFAULT_REPORT_FILE_NAME.to_string(),
            pdfium_library_path: None,
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("ambient_credentials", &self.ambient_credentials)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("page", &self.page)
            .field("overflow", &self.overflow)
            .field("report_file_name", &self.report_file_name)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .finish()
    }
}

impl AnalyzerConfig {
    /// Create a new builder for `AnalyzerConfig`.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Find the service credential or fail fast.
    ///
    /// Order: explicit value, `EMBRYO_ANALYZER_API_KEY`, `OPENAI_API_KEY`,
    /// then the value baked in at build time.
    /// With `ambient_credentials` off only the explicit value counts.
    pub fn resolve_api_key(&self) -> Result<String, AnalyzerError> {
        let ambient = self.ambient_credentials;
        pick_credential(
            self.api_key.as_deref(),
            |name| ambient.then(|| std::env::var(name).ok()).flatten(),
            BAKED_API_KEY.filter(|_| ambient),
        )
        .ok_or(AnalyzerError::MissingCredential)
    }
}

fn pick_credential(
    explicit: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
    baked: Option<&str>,
) -> Option<String> {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };

    explicit
        .and_then(non_empty)
        .or_else(|| env(API_KEY_ENV).as_deref().and_then(non_empty))
        .or_else(|| env(OPENAI_KEY_ENV).as_deref().and_then(non_empty))
        .or_else(|| baked.and_then(non_empty))
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn ambient_credentials(mut self, enabled: bool) -> Self {
        self.config.ambient_credentials = enabled;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn page(mut self, page: PageGeometry) -> Self {
        self.config.page = page;
        self
    }

    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    pub fn report_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.report_file_name = name.into();
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalyzerConfig, AnalyzerError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(AnalyzerError::InvalidConfig("model must not be empty".into()));
        }
        if !(c.api_base.starts_with("http://") || c.api_base.starts_with("https://")) {
            return Err(AnalyzerError::InvalidConfig(format!(
                "api base must be an HTTP/HTTPS URL, got '{}'",
                c.api_base
            )));
        }
        if c.max_tokens == 0 {
            return Err(AnalyzerError::InvalidConfig("max tokens must be ≥ 1".into()));
        }
        if c.request_timeout_secs == 0 {
            return Err(AnalyzerError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.page.content_width() <= 0.0 || c.page.printable_height() <= 0.0 {
            return Err(AnalyzerError::InvalidConfig(format!(
                "margins of {}pt leave no room on a {}×{}pt page",
                c.page.margin_pt, c.page.width_pt, c.page.height_pt
            )));
        }
        if c.report_file_name.trim().is_empty() {
            return Err(AnalyzerError::InvalidConfig(
                "report file name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Export geometry ──────────────────────────────────────────────────────

/// Millimetres to PDF points.
pub fn mm(v: f32) -> f32 {
    v * 72.0 / 25.4
}

/// Page size and uniform margin of the exported report, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width_pt: f32,
    pub height_pt: f32,
    pub margin_pt: f32,
}

impl Default for PageGeometry {
    /// A4 portrait with 10 mm margins.
    fn default() -> Self {
        Self::a4()
    }
}

impl PageGeometry {
    pub fn a4() -> Self {
        Self {
            width_pt: mm(210.0),
            height_pt: mm(297.0),
            margin_pt: mm(10.0),
        }
    }

    pub fn letter() -> Self {
        Self {
            width_pt: 612.0,
            height_pt: 792.0,
            margin_pt: mm(10.0),
        }
    }

    /// Width available to content between the side margins.
    pub fn content_width(&self) -> f32 {
        self.width_pt - 2.0 * self.margin_pt
    }

    /// Height available to content between the top and bottom margins.
    pub fn printable_height(&self) -> f32 {
        self.height_pt - 2.0 * self.margin_pt
    }
}

/// How pagination treats a captured view taller than one page.
///
/// | Policy | Behaviour |
/// |--------|-----------|
/// | `Split` | slice into as many pages as needed; nothing is lost (default) |
/// | `Clamp` | keep exactly one page and drop the overflow, with a warning |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    #[default]
    Split,
    Clamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let c = AnalyzerConfig::default();
        assert_eq!(c.model, "gpt-4-turbo");
        assert_eq!(c.temperature, 0.7);
        assert_eq!(c.report_file_name, "embryo_analysis_report.pdf");
        assert_eq!(c.overflow, OverflowPolicy::Split);
    }

    #[test]
    fn debug_redacts_key() {
        let c = AnalyzerConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert!(AnalyzerConfig::builder().model("  ").build().is_err());
        assert!(AnalyzerConfig::builder().api_base("ftp://x").build().is_err());
        assert!(AnalyzerConfig::builder().max_tokens(0).build().is_err());
        let squashed = PageGeometry {
            width_pt: 100.0,
            height_pt: 100.0,
            margin_pt: 60.0,
        };
        assert!(AnalyzerConfig::builder().page(squashed).build().is_err());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = AnalyzerConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn credential_order() {
        let env: HashMap<&str, &str> =
            HashMap::from([(API_KEY_ENV, "from-env"), (OPENAI_KEY_ENV, "from-openai")]);
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());

        assert_eq!(
            pick_credential(Some("explicit"), lookup, Some("baked")).as_deref(),
            Some("explicit")
        );
        assert_eq!(
            pick_credential(None, lookup, Some("baked")).as_deref(),
            Some("from-env")
        );
        assert_eq!(
            pick_credential(None, |k| (k == OPENAI_KEY_ENV).then(|| "o".into()), None)
                .as_deref(),
            Some("o")
        );
        assert_eq!(
            pick_credential(Some("  "), |_| None, Some("baked")).as_deref(),
            Some("baked")
        );
        assert_eq!(pick_credential(None, |_| None, None), None);
    }

    #[test]
    fn explicit_key_is_used_without_ambient_lookup() {
        let c = AnalyzerConfig::builder()
            .api_key("sk-explicit")
            .ambient_credentials(false)
            .build()
            .unwrap();
        assert_eq!(c.resolve_api_key().unwrap(), "sk-explicit");

        let none = AnalyzerConfig::builder()
            .ambient_credentials(false)
            .build()
            .unwrap();
        assert!(matches!(
            none.resolve_api_key(),
            Err(AnalyzerError::MissingCredential)
        ));
    }

    #[test]
    fn a4_geometry() {
        let g = PageGeometry::a4();
        assert!((g.width_pt - 595.28).abs() < 0.01);
        assert!((g.content_width() - (595.28 - 2.0 * 28.35)).abs() < 0.05);
    }
}
