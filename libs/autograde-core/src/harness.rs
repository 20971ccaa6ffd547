// Combines a submission with one test unit into a runnable program

use crate::languages::{LanguageConfig, SplitStrategyKind, SUCCESS_MARKER};
use autograde_common::types::TestUnit;

/// Separate `import` lines from the rest of a source fragment.
fn split_imports(text: &str) -> (Vec<&str>, String) {
    let (imports, rest): (Vec<&str>, Vec<&str>) = text
        .lines()
        .partition(|line| line.trim_start().starts_with("import "));
    (imports, rest.join("\n"))
}

/// Render the program executed for one unit.
///
/// Template placeholders: `{{preamble}}`, `{{submission}}`, `{{unit}}`,
/// `{{invoke}}` (call of the unit's entry point, empty for bare assertions),
/// `{{entry}}` (the entry point's bare name) and `{{marker}}`. The marker is
/// only printed if the unit ran to the end.
///
/// Templates that contain `{{imports}}` get the `import` lines of the preamble
/// and the submission there, for languages where imports must precede a
/// wrapping class.
pub fn render(config: &LanguageConfig, preamble: &str, submission: &str, unit: &TestUnit) -> String {
    let invoke = match (&unit.entry, config.split_strategy) {
        (Some(entry), SplitStrategyKind::Python) => format!("{}()", entry),
        (Some(entry), SplitStrategyKind::Brace) => format!("{}();", entry),
        (None, _) => String::new(),
    };

    let (imports, preamble, submission) = if config.harness.contains("{{imports}}") {
        let (mut imports, preamble) = split_imports(preamble);
        let (submission_imports, submission) = split_imports(submission);
        for import in submission_imports {
            if !imports.iter().any(|i| i.trim() == import.trim()) {
                imports.push(import);
            }
        }
        (imports.join("\n"), preamble, submission)
    } else {
        (String::new(), preamble.to_string(), submission.to_string())
    };

    config
        .harness
        .replace("{{imports}}", &imports)
        .replace("{{preamble}}", &preamble)
        .replace("{{submission}}", &submission)
        .replace("{{unit}}", &unit.code)
        .replace("{{invoke}}", &invoke)
        .replace("{{entry}}", unit.entry.as_deref().unwrap_or_default())
        .replace("{{marker}}", SUCCESS_MARKER)
}
