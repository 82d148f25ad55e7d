//! Remediation hints for packages whose manifest failed to load.

use regex::Regex;
use std::sync::OnceLock;

fn missing_module_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"Cannot find (?:module|package) ['"`]([^'"`]+)['"`]"#)
            .unwrap_or_else(|e| panic!("invalid missing-module pattern: {e}"))
    })
}

/// Pull the missing module name out of a load error message.
pub fn extract_missing_module(error_text: &str) -> Option<String> {
    missing_module_pattern()
        .captures(error_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Suggest how an operator can fix a missing module.
///
/// Bare package names are installable; relative or absolute paths point at
/// build output that is missing from the package itself.
pub fn remediation_hint(package: &str, module: &str) -> String {
    if module.starts_with('.') || module.starts_with('/') {
        format!("rebuild {package}: {module} is missing from the package")
    } else {
        format!("pnpm add {module}")
    }
}
