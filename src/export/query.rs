//! Query template rendering
//!
//! Extraction queries are minijinja templates with two placeholders,
//! `{{startTime}}` and `{{endTime}}`, holding the window bounds as RFC 3339
//! UTC timestamps (`2021-01-01T00:00:00Z`). Templates are expected to select
//! `ts >= '{{startTime}}' AND ts < '{{endTime}}'`.
//!
//! Undefined placeholders are errors, not empty strings.

use chrono::{DateTime, SecondsFormat, Utc};
use minijinja::{Environment, UndefinedBehavior, context};

use crate::error::Result;

use super::window::PartitionWindow;

/// Render a window bound the way templates receive it
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Renders extraction query templates for a window
pub struct QueryRenderer {
    env: Environment<'static>,
}

impl Default for QueryRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Check that a template compiles, without rendering it
    pub fn validate(&self, template: &str) -> Result<()> {
        self.env.template_from_str(template)?;
        Ok(())
    }

    /// Substitute the window bounds into `template`
    ///
    /// # Returns
    /// * `Result<String>` - Rendered SQL or a template error
    pub fn render(&self, template: &str, window: &PartitionWindow) -> Result<String> {
        let tmpl = self.env.template_from_str(template)?;
        let rendered = tmpl.render(context! {
            startTime => format_timestamp(window.start),
            endTime => format_timestamp(window.end),
        })?;
        Ok(rendered)
    }
}
