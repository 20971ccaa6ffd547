// Language configuration management for the grading engine
use anyhow::{bail, Context, Result};
use autograde_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Printed by every harness after the unit ran to completion.
pub const SUCCESS_MARKER: &str = "__AUTOGRADE_UNIT_PASSED__";

/// How a language's suites are cut into units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategyKind {
    /// `def test_*` functions and top-level `assert` lines, `#` comments.
    Python,
    /// `test_*` functions delimited by braces, `//` comments.
    Brace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: Language,
    /// Language id understood by the sandbox provider.
    pub sandbox_language_id: u32,
    pub split_strategy: SplitStrategyKind,
    pub cpu_time_limit_secs: f64,
    pub memory_limit_kb: u64,
    /// Program template; see `harness::render`.
    pub harness: String,
    /// Substrings in stderr that identify a failed assertion.
    pub assertion_signatures: Vec<String>,
    /// Substrings in compile output that identify a compiler or syntax diagnostic.
    pub compile_signatures: Vec<String>,
    /// Syntax errors surface in stderr at run time instead of in a separate compile step.
    #[serde(default)]
    pub interpreted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Language configuration manager
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: HashMap<Language, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path).context("Failed to read languages.json")?;

        let languages_json: LanguagesJson =
            serde_json::from_str(&content).context("Failed to parse languages.json")?;

        if languages_json.languages.is_empty() {
            bail!("No languages configured in {}", config_path.display());
        }

        let mut configs = HashMap::new();
        for lang in languages_json.languages {
            if !lang.harness.contains("{{unit}}") || !lang.harness.contains("{{marker}}") {
                bail!("Harness for '{}' must contain {{{{unit}}}} and {{{{marker}}}}", lang.name);
            }
            configs.insert(lang.name, lang);
        }

        Ok(Self { configs })
    }

    /// Load from `path`, falling back to the built-in table when the file is absent.
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if path.exists() {
            let manager = Self::load(path)?;
            info!(path = %path.display(), languages = ?manager.list_languages(), "Loaded language configurations");
            Ok(manager)
        } else {
            warn!(path = %path.display(), "Language config not found, using built-in defaults");
            Ok(Self::builtin())
        }
    }

    /// Built-in profiles for the Judge0 CE language ids.
    pub fn builtin() -> Self {
        let configs = [python(), java(), rust(), cpp()]
            .into_iter()
            .map(|c| (c.name, c))
            .collect();
        Self { configs }
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: &Language) -> Result<&LanguageConfig> {
        self.configs
            .get(language)
            .ok_or_else(|| anyhow::anyhow!("No configuration found for language: {}", language))
    }

    pub fn configs(&self) -> impl Iterator<Item = &LanguageConfig> {
        self.configs.values()
    }

    /// Write the current table as a languages.json file
    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut languages: Vec<LanguageConfig> = self.configs.values().cloned().collect();
        languages.sort_by_key(|l| l.name.to_string());

        let content = serde_json::to_string_pretty(&LanguagesJson { languages })?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        Ok(())
    }

    /// List all supported languages
    pub fn list_languages(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self.configs.keys().copied().collect();
        langs.sort_by_key(|l| l.to_string());
        langs
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn python() -> LanguageConfig {
    LanguageConfig {
        name: Language::Python,
        sandbox_language_id: 71,
        split_strategy: SplitStrategyKind::Python,
        cpu_time_limit_secs: 5.0,
        memory_limit_kb: 128_000,
        harness: "{{preamble}}\n{{submission}}\n\n# ---- TEST HARNESS ----\n{{unit}}\n{{invoke}}\nprint(\"{{marker}}\")\n"
            .to_string(),
        assertion_signatures: strings(&["AssertionError"]),
        compile_signatures: strings(&["SyntaxError", "IndentationError", "TabError"]),
        interpreted: true,
    }
}

fn java() -> LanguageConfig {
    LanguageConfig {
        name: Language::Java,
        sandbox_language_id: 62,
        split_strategy: SplitStrategyKind::Brace,
        cpu_time_limit_secs: 5.0,
        memory_limit_kb: 256_000,
        // java runs without -ea, so the test class is reloaded with assertions enabled
        harness: "{{imports}}\npublic class Main {\n{{preamble}}\n{{submission}}\n\n{{unit}}\n\n    public static void main(String[] args) throws Throwable {\n        java.net.URL[] classpath = { Main.class.getProtectionDomain().getCodeSource().getLocation() };\n        ClassLoader loader = new java.net.URLClassLoader(classpath, null);\n        loader.setDefaultAssertionStatus(true);\n        Class<?> main = loader.loadClass(\"Main\");\n        java.lang.reflect.Method test = main.getDeclaredMethod(\"{{entry}}\");\n        test.setAccessible(true);\n        Object target = java.lang.reflect.Modifier.isStatic(test.getModifiers()) ? null : main.getDeclaredConstructor().newInstance();\n        try {\n            test.invoke(target);\n        } catch (java.lang.reflect.InvocationTargetException e) {\n            throw e.getCause();\n        }\n        System.out.println(\"{{marker}}\");\n    }\n}\n"
            .to_string(),
        assertion_signatures: strings(&["AssertionError"]),
        compile_signatures: strings(&["error:"]),
        interpreted: false,
    }
}

fn rust() -> LanguageConfig {
    LanguageConfig {
        name: Language::Rust,
        sandbox_language_id: 73,
        split_strategy: SplitStrategyKind::Brace,
        cpu_time_limit_secs: 5.0,
        memory_limit_kb: 256_000,
        harness: "{{preamble}}\n{{submission}}\n\n{{unit}}\n\nfn main() {\n    {{invoke}}\n    println!(\"{{marker}}\");\n}\n"
            .to_string(),
        assertion_signatures: strings(&["assertion failed", "assertion `"]),
        compile_signatures: strings(&["error[E", "error: expected", "error: could not compile"]),
        interpreted: false,
    }
}

fn cpp() -> LanguageConfig {
    LanguageConfig {
        name: Language::Cpp,
        sandbox_language_id: 54,
        split_strategy: SplitStrategyKind::Brace,
        cpu_time_limit_secs: 5.0,
        memory_limit_kb: 256_000,
        harness: "#include <iostream>\n{{preamble}}\n{{submission}}\n\n{{unit}}\n\nint main() {\n    {{invoke}}\n    std::cout << \"{{marker}}\" << std::endl;\n    return 0;\n}\n"
            .to_string(),
        assertion_signatures: strings(&["Assertion `", "Assertion failed"]),
        compile_signatures: strings(&["error:"]),
        interpreted: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_every_language() {
        let manager = LanguageConfigManager::builtin();
        for lang in Language::ALL {
            let config = manager.get_config(&lang).unwrap();
            assert!(config.harness.contains("{{unit}}"));
            assert!(config.harness.contains("{{marker}}"));
        }
        assert_eq!(manager.list_languages().len(), 4);
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let manager = LanguageConfigManager::load_or_builtin(Path::new("does/not/exist.json")).unwrap();
        assert_eq!(manager.get_config(&Language::Python).unwrap().sandbox_language_id, 71);
    }

    #[test]
    fn test_load_rejects_harness_without_marker() {
        let dir = std::env::temp_dir().join(format!("autograde-lang-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("languages.json");
        let mut bad = python();
        bad.harness = "{{submission}}\n{{unit}}".to_string();
        let json = serde_json::to_string(&LanguagesJson { languages: vec![bad] }).unwrap();
        fs::write(&path, json).unwrap();

        let err = LanguageConfigManager::load(&path).unwrap_err();
        assert!(err.to_string().contains("must contain"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_then_load_keeps_every_language() {
        let dir = std::env::temp_dir().join(format!("autograde-lang-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config").join("languages.json");

        LanguageConfigManager::builtin().save(&path).unwrap();
        let loaded = LanguageConfigManager::load(&path).unwrap();

        assert_eq!(loaded.list_languages(), LanguageConfigManager::builtin().list_languages());
        assert_eq!(loaded.get_config(&Language::Rust).unwrap().sandbox_language_id, 73);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_repository_languages_json_parses() {
        // Only present when tests run from the workspace root
        match LanguageConfigManager::load(Path::new("../../config/languages.json")) {
            Ok(manager) => assert!(manager.get_config(&Language::Python).is_ok()),
            Err(e) => println!("Config not found (expected outside the workspace): {}", e),
        }
    }
}
