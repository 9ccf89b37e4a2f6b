//! Separates configuration flags from the subcommand.
//!
//! Flags listed in [`CONFIG_CLI_FLAGS`] that precede the subcommand are handed
//! to `ortho_config`; everything from the first other token onwards is parsed
//! by clap.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use toolkeeper_config::Config;

use crate::errors::AppError;

/// Flags understood by the configuration loader.
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--server-port",
    "--browser-debug-port",
    "--log-filter",
    "--log-format",
    "--log-file",
    "--runtime-dir",
    "--host-config-path",
    "--package-root",
    "--schema-preference",
    "--service-name",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the leading configuration flags.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

/// Arguments split between the configuration loader and clap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArgumentSplit {
    /// Program name followed by configuration flags.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by the subcommand and its arguments.
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_arguments(args: &[OsString]) -> ArgumentSplit {
    let mut remaining = args.iter();
    let program: Vec<OsString> = remaining.next().cloned().into_iter().collect();
    let mut config_arguments = program.clone();
    let mut command_arguments = program;

    while let Some(argument) = remaining.next() {
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                if needs_value {
                    config_arguments.extend(remaining.next().cloned());
                }
            }
            FlagAction::Stop => {
                command_arguments.push(argument.clone());
                command_arguments.extend(remaining.cloned());
                break;
            }
        }
    }

    ArgumentSplit {
        config_arguments,
        command_arguments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn args(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case::separate("--log-filter", FlagAction::Include { needs_value: true })]
    #[case::inline("--server-port=4000", FlagAction::Include { needs_value: false })]
    #[case::subcommand("status", FlagAction::Stop)]
    #[case::command_flag("--json", FlagAction::Stop)]
    fn classifies_arguments(#[case] argument: &str, #[case] expected: FlagAction) {
        assert_eq!(classify(OsStr::new(argument)), expected);
    }

    #[test]
    fn leading_config_flags_go_to_loader() {
        let split = split_arguments(&args(&[
            "toolkeeper",
            "--server-port",
            "4000",
            "--log-format=compact",
            "status",
            "--json",
        ]));

        assert_eq!(
            split.config_arguments,
            args(&["toolkeeper", "--server-port", "4000", "--log-format=compact"])
        );
        assert_eq!(
            split.command_arguments,
            args(&["toolkeeper", "status", "--json"])
        );
    }

    #[test]
    fn config_flags_after_subcommand_stay_with_command() {
        let split = split_arguments(&args(&["toolkeeper", "stop", "--server-port", "1"]));

        assert_eq!(split.config_arguments, args(&["toolkeeper"]));
        assert_eq!(
            split.command_arguments,
            args(&["toolkeeper", "stop", "--server-port", "1"])
        );
    }

    #[test]
    fn empty_arguments_stay_empty() {
        let split = split_arguments(&[]);
        assert!(split.config_arguments.is_empty());
        assert!(split.command_arguments.is_empty());
    }
}
