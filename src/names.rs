/// Prefix-based predicate deciding which simple names are obfuscated.
///
/// A symbol counts as non-obfuscated iff its simple name starts with one of
/// the configured prefixes. The default set matches corpora that rename
/// symbols to `class123`/`method456`-style placeholders; other corpora can
/// swap in their own prefixes without a rebuild.
#[derive(Clone, Debug)]
pub(crate) struct NamePolicy {
    clean_prefixes: Vec<String>,
}

pub(crate) const DEFAULT_CLEAN_PREFIXES: [&str; 4] = ["class", "method", "field", "client"];

impl NamePolicy {
    pub(crate) fn new(clean_prefixes: Vec<String>) -> Self {
        Self { clean_prefixes }
    }

    pub(crate) fn is_obfuscated(&self, simple_name: &str) -> bool {
        // Compiler-reserved names (<init>, <clinit>) are never renamed by an
        // obfuscator, so they are always treated as clean.
        if simple_name.starts_with('<') {
            return false;
        }
        !self
            .clean_prefixes
            .iter()
            .any(|prefix| simple_name.starts_with(prefix.as_str()))
    }
}

impl Default for NamePolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_CLEAN_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
        )
    }
}

/// Last segment of a slash-form binary name.
pub(crate) fn simple_class_name(binary_name: &str) -> &str {
    binary_name.rsplit('/').next().unwrap_or(binary_name)
}

pub(crate) fn in_default_package(binary_name: &str) -> bool {
    !binary_name.contains('/')
}
