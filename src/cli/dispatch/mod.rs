use crate::cli::{
    actions::Action,
    commands::{ARG_API_URL, ARG_EMAIL, ARG_NAME, ARG_PASSWORD, ARG_TIMEOUT, ARG_TOKEN_FILE},
    globals::GlobalArgs,
};
use crate::config::{DEFAULT_API_BASE_URL, DEFAULT_TIMEOUT_SECS};
use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;
use std::path::PathBuf;

fn required(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow!("missing required argument: --{name}"))
}

fn password(matches: &ArgMatches) -> Result<SecretString> {
    required(matches, ARG_PASSWORD).map(SecretString::from)
}

/// # Errors
/// Returns an error if a required argument is missing or the subcommand is unknown.
pub fn handler(matches: &ArgMatches) -> Result<(Action, GlobalArgs)> {
    let globals = GlobalArgs {
        api_url: matches
            .get_one::<String>(ARG_API_URL)
            .cloned()
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        token_file: matches.get_one::<PathBuf>(ARG_TOKEN_FILE).cloned(),
        timeout_secs: matches
            .get_one::<u64>(ARG_TIMEOUT)
            .copied()
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    };

    let (name, sub_m) = matches.subcommand().context("missing subcommand")?;

    let action = match name {
        "register" => Action::Register {
            name: required(sub_m, ARG_NAME)?,
            email: required(sub_m, ARG_EMAIL)?,
            password: password(sub_m)?,
        },
        "login" => Action::Login {
            email: required(sub_m, ARG_EMAIL)?,
            password: password(sub_m)?,
        },
        "logout" => Action::Logout,
        "whoami" => Action::Whoami,
        other => return Err(anyhow!("unknown subcommand: {other}")),
    };

    Ok((action, globals))
}
