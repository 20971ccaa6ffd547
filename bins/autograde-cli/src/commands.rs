// CLI commands for previewing suites and grading locally
use anyhow::{bail, Context, Result};
use autograde_common::config::GradingConfig;
use autograde_common::types::{ExecutionResult, Language, SubmissionWindow, TestUnit};
use autograde_core::aggregator::GradeReport;
use autograde_core::dispatcher::cancel_pair;
use autograde_core::judge0::Judge0Client;
use autograde_core::languages::LanguageConfigManager;
use autograde_core::splitter::{validate_total, TestUnitSplitter};
use autograde_core::store::MemoryAttemptStore;
use autograde_core::{AssignmentSpec, GradingService};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Assignment id used for the throwaway in-memory publication.
const LOCAL_ASSIGNMENT: i64 = 0;

fn load_languages(override_path: Option<&Path>, config: &GradingConfig) -> Result<LanguageConfigManager> {
    match override_path {
        Some(path) => LanguageConfigManager::load(path),
        None => LanguageConfigManager::load_or_builtin(Path::new(&config.languages_path)),
    }
}

fn parse_language(name: &str) -> Result<Language> {
    match Language::from_str(name) {
        Some(language) => Ok(language),
        None => bail!("Unknown language '{}'. Expected one of: python, java, rust, cpp", name),
    }
}

fn read_source(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {} {}", what, path.display()))
}

fn first_line(text: &str, width: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() > width {
        let cut: String = line.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

/// Render the unit table printed by `split`.
pub fn format_units(units: &[TestUnit]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<4} {:<28} {:>6}  {:<7} {}\n", "#", "ID", "POINTS", "VISIBLE", "LABEL"));
    for unit in units {
        out.push_str(&format!(
            "{:<4} {:<28} {:>6}  {:<7} {}\n",
            unit.order + 1,
            unit.id,
            unit.points,
            if unit.visible { "yes" } else { "no" },
            first_line(&unit.label, 40)
        ));
    }
    out
}

/// Preview how a suite splits into units
pub fn split_suite(languages: Option<&Path>, suite: &Path, language: &str, total: Option<u32>) -> Result<()> {
    let config = GradingConfig::from_env()?;
    let languages = load_languages(languages, &config)?;
    let language = parse_language(language)?;
    let source = read_source(suite, "suite")?;

    let splitter = TestUnitSplitter::from_languages(&languages);
    let split = splitter.split(&source, language)?;

    println!("📄 {} ({})", suite.display(), language);
    if !split.preamble.is_empty() {
        println!("\nShared preamble ({} lines)", split.preamble.lines().count());
    }
    println!();
    print!("{}", format_units(&split.units));
    println!("\nTotal: {} unit(s), {} point(s)", split.units.len(), split.total_points()?);

    if let Some(declared) = total {
        validate_total(&split, declared)?;
        println!("✅ Matches declared total of {}", declared);
    }
    Ok(())
}

fn print_report(results: &[ExecutionResult], report: &GradeReport, show_output: bool) {
    println!(
        "{:<4} {:<28} {:<17} {:>6} {:>8} {:>9}",
        "#", "UNIT", "OUTCOME", "POINTS", "TIME", "MEMORY"
    );
    for (unit, result) in report.breakdown.iter().zip(results) {
        let flag = if unit.infra_failure.is_some() { " ⚠" } else { "" };
        println!(
            "{:<4} {:<28} {:<17} {:>3}/{:<2} {:>6}ms {:>7}KB{}",
            result.order + 1,
            unit.unit_id,
            unit.outcome.to_string(),
            unit.earned,
            unit.points,
            unit.time_ms,
            unit.memory_kb,
            flag
        );
        if show_output && unit.earned == 0 && !result.stderr.is_empty() {
            for line in result.stderr.lines().take(10) {
                println!("       │ {}", line);
            }
        }
    }

    println!();
    for (outcome, count) in &report.by_outcome {
        println!("  {:<17} {}", outcome.to_string(), count);
    }
    println!();

    match report.grade {
        Some(grade) if report.partial => println!(
            "⚠️  Partial grade: {}% ({}/{} over unaffected units)",
            grade, report.earned_points, report.total_points
        ),
        Some(grade) => println!("✅ Grade: {}% ({}/{})", grade, report.earned_points, report.total_points),
        None => println!(
            "❌ Grading failed, infrastructure errors in: {}",
            report.infra_affected.join(", ")
        ),
    }
}

/// Grade a local submission through the configured sandbox
pub async fn grade_local(
    languages: Option<&Path>,
    suite: &Path,
    submission: &Path,
    language: &str,
    json: bool,
    show_output: bool,
) -> Result<()> {
    let config = GradingConfig::from_env()?;
    let languages = load_languages(languages, &config)?;
    let language = parse_language(language)?;
    let suite_source = read_source(suite, "suite")?;
    let code = read_source(submission, "submission")?;

    let sandbox = Arc::new(Judge0Client::new(&config)?);
    if !json {
        println!("🚀 Grading {} against {} via {}", submission.display(), suite.display(), config.sandbox_url);
    }

    let service = GradingService::new(config, languages, sandbox.clone(), Arc::new(MemoryAttemptStore::new()));

    let total_points = service.split(&suite_source, language)?.total_points()?;
    let assignment = service
        .publish_assignment(AssignmentSpec {
            id: LOCAL_ASSIGNMENT,
            language,
            suite_source,
            total_points,
            window: SubmissionWindow::default(),
            sub_limit: None,
        })
        .await?;

    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⚠ Cancelling, unfinished units are discarded...");
            handle.cancel();
        }
    });

    let outcome = service.evaluate(&assignment.suite, &code, signal).await;
    let cleaned = sandbox.cleanup().await;
    if cleaned > 0 && !json {
        println!("🧹 Removed {} unfinished sandbox submission(s)", cleaned);
    }
    let (results, report) = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        print_report(&results, &report, show_output);
    }
    Ok(())
}

/// List configured languages
pub fn list_languages(languages: Option<&Path>) -> Result<()> {
    let config = GradingConfig::from_env()?;
    let manager = load_languages(languages, &config)?;

    println!("{:<8} {:>11} {:<8} {:>8} {:>10}", "LANGUAGE", "SANDBOX ID", "SPLIT", "CPU (s)", "MEMORY KB");
    for language in manager.list_languages() {
        let lang = manager.get_config(&language)?;
        println!(
            "{:<8} {:>11} {:<8} {:>8.1} {:>10}",
            language.to_string(),
            lang.sandbox_language_id,
            format!("{:?}", lang.split_strategy).to_lowercase(),
            lang.cpu_time_limit_secs,
            lang.memory_limit_kb
        );
    }
    Ok(())
}

/// Write the built-in language table
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    LanguageConfigManager::builtin().save(path)?;
    println!("📝 Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language_accepts_aliases() {
        assert_eq!(parse_language("py").unwrap(), Language::Python);
        assert_eq!(parse_language("C++").unwrap(), Language::Cpp);
        assert!(parse_language("fortran").is_err());
    }

    #[test]
    fn test_first_line_truncates() {
        assert_eq!(first_line("assert f(1) == 2\nmore", 40), "assert f(1) == 2");
        assert_eq!(first_line(&"x".repeat(50), 10), "xxxxxxx...");
    }

    #[test]
    fn test_format_units_lists_every_unit() {
        let manager = LanguageConfigManager::builtin();
        let splitter = TestUnitSplitter::from_languages(&manager);
        let split = splitter
            .split("# points: 3\ndef test_a():\n    pass\n\n# hidden\nassert 1 == 1\n", Language::Python)
            .unwrap();

        let table = format_units(&split.units);

        assert!(table.contains("test_a"));
        assert!(table.contains("assert_1"));
        assert!(table.lines().nth(2).unwrap().contains(" no "));
    }
}
