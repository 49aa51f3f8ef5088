use std::io::Write;

use anyhow::{Context, Result};

use crate::engine::MatchResult;

/// Write the three mapping sections as plain UTF-8 text, one `src -> tgt`
/// line per confirmed pair, with an empty line between sections.
pub(crate) fn write_mappings(result: &MatchResult, writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "## Class Mappings").context("failed to write mappings")?;
    for (source, target) in &result.classes {
        writeln!(writer, "{source} -> {target}").context("failed to write mappings")?;
    }
    writeln!(writer).context("failed to write mappings")?;

    writeln!(writer, "## Method Mappings").context("failed to write mappings")?;
    for (source, target) in &result.methods {
        writeln!(writer, "{source} -> {target}").context("failed to write mappings")?;
    }
    writeln!(writer).context("failed to write mappings")?;

    writeln!(writer, "## Field Mappings").context("failed to write mappings")?;
    for (source, target) in &result.fields {
        writeln!(writer, "{source} -> {target}").context("failed to write mappings")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn sections_are_ordered_and_separated() {
        let mut classes = BTreeMap::new();
        classes.insert("a".to_string(), "x".to_string());
        let mut methods = BTreeMap::new();
        methods.insert("a.m()V".to_string(), "x.p()V".to_string());
        let mut fields = BTreeMap::new();
        fields.insert("a.f:I".to_string(), "x.g:I".to_string());
        let result = MatchResult {
            classes,
            methods,
            fields,
        };

        let mut buffer = Vec::new();
        write_mappings(&result, &mut buffer).expect("write mappings");
        let text = String::from_utf8(buffer).expect("utf-8 output");

        assert_eq!(
            text,
            "## Class Mappings\na -> x\n\n## Method Mappings\na.m()V -> x.p()V\n\n\
             ## Field Mappings\na.f:I -> x.g:I\n"
        );
    }

    #[test]
    fn empty_results_still_emit_all_sections() {
        let result = MatchResult {
            classes: BTreeMap::new(),
            methods: BTreeMap::new(),
            fields: BTreeMap::new(),
        };
        let mut buffer = Vec::new();
        write_mappings(&result, &mut buffer).expect("write mappings");
        let text = String::from_utf8(buffer).expect("utf-8 output");

        assert!(text.contains("## Class Mappings"));
        assert!(text.contains("## Method Mappings"));
        assert!(text.contains("## Field Mappings"));
    }
}
