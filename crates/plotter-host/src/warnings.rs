//! Deduplicated user-visible warnings, reported once each at end of run.

/// Collects warning tags during a plot. A tag added twice is reported
/// once; insertion order is preserved in the report.
#[derive(Debug, Default)]
pub struct Warnings {
    tags: Vec<String>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning tag if it has not been seen yet.
    pub fn add(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Render the accumulated warnings as user-facing messages.
    pub fn messages(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|tag| match tag.as_str() {
                "bounds" => concat!(
                    "Warning: Plotter movement was limited by its physical range of motion.\n",
                    "If everything else looks right, you may have an issue with your paper size,\n",
                    "document size, or margins."
                )
                .to_string(),
                "voltage" => concat!(
                    "Warning: Low voltage detected.\n",
                    "Check that the power supply is plugged in."
                )
                .to_string(),
                other => format!("Warning: {other}"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_tags_report_once() {
        let mut warnings = Warnings::new();
        warnings.add("bounds");
        warnings.add("voltage");
        warnings.add("bounds");
        assert_eq!(warnings.messages().len(), 2);
        assert!(warnings.contains("bounds"));
        assert!(!warnings.contains("clipping"));
    }

    #[test]
    fn unknown_tags_get_a_generic_message() {
        let mut warnings = Warnings::new();
        warnings.add("clipping");
        assert!(warnings.messages()[0].contains("clipping"));
    }
}
