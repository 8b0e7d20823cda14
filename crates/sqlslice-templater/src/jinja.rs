//! Jinja templater backed by minijinja
//!
//! Before rendering, the template is scanned for names it reads but never
//! assigns. Any such name the context does not define is bound to a
//! [`JinjaSentinel`], so the render completes and the name is reported
//! instead of failing the file.

use crate::cache::EnvironmentCache;
use crate::context::TemplateContext;
use crate::functions::{self, BUILTIN_NAMES};
use crate::undefined::JinjaSentinel;
use crate::{ProcessResult, Templater, TemplaterError};
use minijinja::{Environment, ErrorKind};
use sqlslice_align::{slice_file, RenderError, Sentinel, Syntax, UndefinedSet, UndefinedTracker};
use sqlslice_core::{Config, SeverityThreshold};
use std::collections::HashSet;
use std::sync::Arc;

/// Globals and loop names minijinja resolves itself
const ENGINE_NAMES: &[&str] = &[
    "range", "dict", "debug", "namespace", "loop", "self", "super", "caller", "varargs", "kwargs",
];

/// Templater for Jinja templates
#[derive(Debug, Clone)]
pub struct JinjaTemplater {
    context: TemplateContext,
    ignore_templating: bool,
    apply_dbt_builtins: bool,
    keep_trailing_newline: bool,
    severity: SeverityThreshold,
    cache: Option<(EnvironmentCache, String)>,
}

impl Default for JinjaTemplater {
    fn default() -> Self {
        Self::new(TemplateContext::default())
    }
}

impl JinjaTemplater {
    pub fn new(context: TemplateContext) -> Self {
        Self {
            context,
            ignore_templating: false,
            apply_dbt_builtins: true,
            keep_trailing_newline: true,
            severity: SeverityThreshold::default(),
            cache: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            context: TemplateContext::from_config(config),
            ignore_templating: config.ignore_templating,
            apply_dbt_builtins: config.apply_dbt_builtins,
            keep_trailing_newline: config.keep_trailing_newline,
            severity: config.severity.clone(),
            cache: None,
        }
    }

    /// Render missing names as stand-ins instead of recording them
    pub fn ignore_templating(mut self, ignore: bool) -> Self {
        self.ignore_templating = ignore;
        self
    }

    pub fn dbt_builtins(mut self, apply: bool) -> Self {
        self.apply_dbt_builtins = apply;
        self
    }

    pub fn keep_trailing_newline(mut self, keep: bool) -> Self {
        self.keep_trailing_newline = keep;
        self
    }

    /// Reuse the environment stored under `key` in `cache`.
    ///
    /// The key must identify this templater's settings: whichever templater
    /// first creates an entry decides its builtins and variables.
    pub fn with_cache(mut self, cache: EnvironmentCache, key: impl Into<String>) -> Self {
        self.cache = Some((cache, key.into()));
        self
    }

    /// A fresh environment with this templater's settings
    pub fn build_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(self.keep_trailing_newline);
        if self.apply_dbt_builtins {
            functions::register(&mut env, Arc::new(self.context.vars.clone()));
        }
        env
    }

    fn resolves_without_context(&self, name: &str) -> bool {
        ENGINE_NAMES.contains(&name) || (self.apply_dbt_builtins && BUILTIN_NAMES.contains(&name))
    }

    /// Render `raw`, recording missing names into `undefined`
    pub fn render(&self, raw: &str, undefined: &mut UndefinedSet) -> Result<String, RenderError> {
        let tracker = UndefinedTracker::new();
        let mut ctx = self.context.to_minijinja_map();

        for name in undeclared_names(raw)? {
            if self.context.defines(&name) || self.resolves_without_context(&name) {
                continue;
            }
            let sentinel = if self.ignore_templating {
                Sentinel::stand_in(name.as_str())
            } else {
                tracker.sentinel(name.as_str())
            };
            ctx.insert(name, JinjaSentinel(sentinel).into_value());
        }

        let rendered = match &self.cache {
            Some((cache, key)) => {
                let env = cache.get_or_create(key, || self.build_environment());
                let env = env.lock().map_err(|_| RenderError::Render {
                    message: "template environment lock poisoned".to_string(),
                    line: None,
                })?;
                env.render_str(raw, &ctx)
            }
            None => self.build_environment().render_str(raw, &ctx),
        }
        .map_err(render_error)?;

        tracker.drain_into(undefined);
        Ok(rendered)
    }
}

impl Templater for JinjaTemplater {
    fn name(&self) -> &'static str {
        "jinja"
    }

    fn process(&self, raw: &str, path: Option<&str>) -> Result<ProcessResult, TemplaterError> {
        let alignment = slice_file(raw, Syntax::Jinja, |raw, undefined| self.render(raw, undefined))?;
        tracing::debug!(
            path = path.unwrap_or("<string>"),
            undefined = alignment.undefined.len(),
            degraded = alignment.degraded,
            "rendered jinja template"
        );
        ProcessResult::from_alignment(alignment, path, &self.severity)
    }
}

/// Names the template reads without assigning them first
fn undeclared_names(raw: &str) -> Result<HashSet<String>, RenderError> {
    let env = Environment::new();
    let template = env.template_from_str(raw).map_err(render_error)?;
    Ok(template.undeclared_variables(false))
}

fn render_error(err: minijinja::Error) -> RenderError {
    let message = match err.detail() {
        Some(detail) => detail.to_string(),
        None => err.kind().to_string(),
    };
    match err.kind() {
        ErrorKind::SyntaxError => RenderError::Syntax {
            message,
            line: err.line(),
        },
        _ => RenderError::Render {
            message,
            line: err.line(),
        },
    }
}
