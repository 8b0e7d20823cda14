//! Pass-through templater for files that are not templated

use crate::{ProcessResult, Templater, TemplaterError};
use sqlslice_align::{slice_file, RenderError, Syntax, UndefinedSet};
use sqlslice_core::{Config, SeverityThreshold};

/// Renders every file to itself
#[derive(Debug, Clone, Default)]
pub struct RawTemplater {
    severity: SeverityThreshold,
}

impl RawTemplater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            severity: config.severity.clone(),
        }
    }
}

fn identity(raw: &str, _: &mut UndefinedSet) -> Result<String, RenderError> {
    Ok(raw.to_string())
}

impl Templater for RawTemplater {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn process(&self, raw: &str, path: Option<&str>) -> Result<ProcessResult, TemplaterError> {
        let alignment = slice_file(raw, Syntax::Plain, identity)?;
        ProcessResult::from_alignment(alignment, path, &self.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlslice_core::{MappingSlice, SliceKind};

    #[test]
    fn braces_are_plain_text() {
        let result = RawTemplater::new()
            .process("select '{{ x }}' from t", Some("a.sql"))
            .unwrap();
        let file = result.templated_file;

        assert_eq!(file.rendered_str(), "select '{{ x }}' from t");
        assert_eq!(file.slices(), &[MappingSlice::new(SliceKind::Literal, 0..23, 0..23)]);
        assert_eq!(file.path(), Some("a.sql"));
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn empty_file() {
        let result = RawTemplater::new().process("", None).unwrap();
        assert!(result.templated_file.slices().is_empty());
    }
}
