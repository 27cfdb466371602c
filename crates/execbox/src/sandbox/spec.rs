//! Sandbox launch descriptors
//!
//! Turns a language and a staged workspace into everything the engine needs
//! to create the sandbox: image, command, mount, limits and network mode.

use crate::config::{INPUT_FILE_NAME, Invocation, Language, SANDBOX_WORKDIR};
use crate::sandbox::SandboxHandle;
use crate::sandbox::workspace::Workspace;
use crate::types::{MountConfig, SandboxLimits};

/// Shell used when the command needs redirection or is a script
const SHELL: &str = "/bin/sh";

/// Fully specified launch descriptor for one sandbox
///
/// Built per execution and never shared: the mount, name and command all
/// depend on the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    /// Sandbox instance name (`execbox-<execution id>`)
    pub name: String,
    pub execution_id: String,
    pub image: String,
    /// Command and arguments run inside the sandbox
    pub command: Vec<String>,
    /// Workspace bind mount
    pub mount: MountConfig,
    pub limits: SandboxLimits,
    /// Always true; there is no way to build a spec with networking
    pub network_disabled: bool,
}

impl SandboxSpec {
    /// Build the descriptor for `language` running out of `workspace`
    pub fn build(execution_id: &str, language: Language, workspace: &Workspace) -> Self {
        let profile = language.profile();

        Self {
            name: sandbox_name(execution_id),
            execution_id: execution_id.to_owned(),
            image: profile.image.to_owned(),
            command: build_command(language, workspace.has_input()),
            mount: MountConfig {
                source: workspace.path().to_path_buf(),
                target: SANDBOX_WORKDIR.to_owned(),
                writable: true,
            },
            limits: SandboxLimits::default(),
            network_disabled: true,
        }
    }

    /// Handle for the sandbox this spec creates
    pub fn handle(&self) -> SandboxHandle {
        SandboxHandle::named(&self.name)
    }
}

/// Name of the sandbox instance for an execution
pub fn sandbox_name(execution_id: &str) -> String {
    format!("execbox-{execution_id}")
}

/// Resolve the registry invocation, redirecting stdin from the staged input
/// file when there is one
fn build_command(language: Language, has_input: bool) -> Vec<String> {
    let profile = language.profile();
    let redirect = format!("{SANDBOX_WORKDIR}/{INPUT_FILE_NAME}");

    match profile.invocation {
        Invocation::Exec(args) => {
            let args: Vec<String> = args.iter().map(|arg| profile.expand(arg)).collect();
            if !has_input {
                return args;
            }
            let line = args
                .iter()
                .map(|arg| shell_quote(arg))
                .collect::<Vec<_>>()
                .join(" ");
            shell(format!("{line} < {redirect}"))
        }
        Invocation::Shell(script) => {
            let script = profile.expand(script);
            if has_input {
                shell(format!("{{ {script}; }} < {redirect}"))
            } else {
                shell(script)
            }
        }
    }
}

fn shell(script: String) -> Vec<String> {
    vec![SHELL.to_owned(), "-c".to_owned(), script]
}

/// Quote an argument for a POSIX shell
///
/// Plain words pass through unchanged; anything else is single-quoted.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));
    if plain {
        arg.to_owned()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    /// Decode one shell word built from single quotes and backslash escapes
    fn unquote(word: &str) -> Option<String> {
        let mut out = String::new();
        let mut chars = word.chars();
        let mut quoted = false;
        while let Some(c) = chars.next() {
            match (quoted, c) {
                (_, '\'') => quoted = !quoted,
                (false, '\\') => out.push(chars.next()?),
                (_, c) => out.push(c),
            }
        }
        (!quoted).then_some(out)
    }

    proptest! {
        #[test]
        fn quoting_survives_shell_parsing(arg in ".*") {
            prop_assert_eq!(unquote(&shell_quote(&arg)), Some(arg));
        }

        #[test]
        fn plain_words_are_untouched(arg in "[a-zA-Z0-9_./-]+") {
            prop_assert_eq!(shell_quote(&arg), arg);
        }

        #[test]
        fn every_command_ends_with_redirect_when_input_is_staged(index in 0usize..5) {
            let language = Language::ALL[index];
            let command = build_command(language, true);
            prop_assert_eq!(&command[0], "/bin/sh");
            prop_assert!(command[2].ends_with("< /code/input.txt"));
        }
    }
}
