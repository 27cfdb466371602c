use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mount point of the staged workspace inside every sandbox
pub const SANDBOX_WORKDIR: &str = "/code";

/// Name of the stdin file staged next to the source when input is given
pub const INPUT_FILE_NAME: &str = "input.txt";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language '{0}'")]
pub struct UnsupportedLanguage(pub String);

/// A supported submission language
///
/// The set is closed: anything else is rejected while the request is
/// validated, before a workspace or sandbox exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Go,
    Ruby,
    Java,
}

/// How a language's entry file is invoked inside the sandbox
///
/// Placeholders: `{workdir}` (the mount point), `{entry}` (the entry file
/// name) and `{source}` (`{workdir}/{entry}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// Program and arguments, executed directly
    Exec(&'static [&'static str]),
    /// Script executed by `/bin/sh -c`
    Shell(&'static str),
}

/// Static registry entry for one language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    pub language: Language,
    /// Container image the sandbox is created from
    pub image: &'static str,
    /// File name the source is staged under
    pub entry_file: &'static str,
    pub invocation: Invocation,
}

// Indexed by `Language as usize`.
static REGISTRY: [LanguageProfile; 5] = [
    LanguageProfile {
        language: Language::Python,
        image: "python:3.9-slim",
        entry_file: "main.py",
        invocation: Invocation::Exec(&["python", "{source}"]),
    },
    LanguageProfile {
        language: Language::JavaScript,
        image: "node:16-slim",
        entry_file: "main.js",
        invocation: Invocation::Exec(&["node", "{source}"]),
    },
    LanguageProfile {
        language: Language::Go,
        image: "golang:1.21-alpine",
        entry_file: "main.go",
        invocation: Invocation::Exec(&["go", "run", "{source}"]),
    },
    LanguageProfile {
        language: Language::Ruby,
        image: "ruby:3.0-slim",
        entry_file: "main.rb",
        invocation: Invocation::Exec(&["ruby", "{source}"]),
    },
    LanguageProfile {
        language: Language::Java,
        image: "openjdk:17-slim",
        entry_file: "Main.java",
        invocation: Invocation::Shell("cd {workdir} && javac {entry} && java Main"),
    },
];

impl Language {
    /// Every supported language, in registry order
    pub const ALL: [Language; 5] = [
        Language::Python,
        Language::JavaScript,
        Language::Go,
        Language::Ruby,
        Language::Java,
    ];

    /// Look up the registry entry for this language
    pub fn profile(self) -> &'static LanguageProfile {
        &REGISTRY[self as usize]
    }

    /// The wire tag of this language (e.g., "javascript")
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Ruby => "ruby",
            Language::Java => "java",
        }
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|language| language.as_str() == tag)
            .ok_or_else(|| UnsupportedLanguage(tag.to_owned()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LanguageProfile {
    /// Path of the entry file as seen from inside the sandbox
    pub fn source_path(&self) -> String {
        format!("{SANDBOX_WORKDIR}/{}", self.entry_file)
    }

    /// Expand placeholders in a single template fragment
    pub fn expand(&self, template: &str) -> String {
        template
            .replace("{source}", &self.source_path())
            .replace("{workdir}", SANDBOX_WORKDIR)
            .replace("{entry}", self.entry_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_supported_tags() {
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!(
            "javascript".parse::<Language>().unwrap(),
            Language::JavaScript
        );
        assert_eq!("go".parse::<Language>().unwrap(), Language::Go);
        assert_eq!("ruby".parse::<Language>().unwrap(), Language::Ruby);
        assert_eq!("java".parse::<Language>().unwrap(), Language::Java);
    }

    #[test]
    fn parse_rejects_unknown_tags() {
        for tag in ["rust", "cpp17", "", "python3", "node"] {
            let err = tag.parse::<Language>().unwrap_err();
            assert_eq!(err, UnsupportedLanguage(tag.to_owned()));
        }
    }

    #[test]
    fn parse_is_case_sensitive() {
        assert!("Python".parse::<Language>().is_err());
        assert!("JAVA".parse::<Language>().is_err());
    }

    #[test]
    fn registry_is_indexed_by_language() {
        for language in Language::ALL {
            assert_eq!(language.profile().language, language);
        }
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for language in Language::ALL {
            assert_eq!(language.to_string().parse::<Language>().unwrap(), language);
        }
    }

    #[test]
    fn serde_uses_lowercase_tags() {
        let json = serde_json::to_string(&Language::JavaScript).unwrap();
        assert_eq!(json, "\"javascript\"");
        let parsed: Language = serde_json::from_str("\"ruby\"").unwrap();
        assert_eq!(parsed, Language::Ruby);
    }

    #[test]
    fn java_entry_file_matches_public_class() {
        assert_eq!(Language::Java.profile().entry_file, "Main.java");
    }

    #[test]
    fn expand_source_placeholder() {
        let profile = Language::Python.profile();
        assert_eq!(profile.expand("{source}"), "/code/main.py");
    }

    #[test]
    fn expand_shell_script_placeholders() {
        let profile = Language::Java.profile();
        let Invocation::Shell(script) = profile.invocation else {
            panic!("java should be invoked through a shell script");
        };
        assert_eq!(
            profile.expand(script),
            "cd /code && javac Main.java && java Main"
        );
    }

    #[test]
    fn expand_leaves_plain_text_alone() {
        let profile = Language::Ruby.profile();
        assert_eq!(profile.expand("ruby"), "ruby");
    }
}
