pub mod logging;

use crate::config::DEFAULT_API_BASE_URL;
use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_API_URL: &str = "api-url";
pub const ARG_TOKEN_FILE: &str = "token-file";
pub const ARG_TIMEOUT: &str = "timeout";
pub const ARG_NAME: &str = "name";
pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";

/// Mirrors [`crate::config::DEFAULT_TIMEOUT_SECS`].
const DEFAULT_TIMEOUT: &str = "10";

fn email_arg() -> Arg {
    Arg::new(ARG_EMAIL)
        .short('e')
        .long("email")
        .help("Account email address")
        .env("AUTH_SESSION_EMAIL")
        .required(true)
}

fn password_arg() -> Arg {
    Arg::new(ARG_PASSWORD)
        .short('p')
        .long("password")
        .help("Account password")
        .env("AUTH_SESSION_PASSWORD")
        .hide_env_values(true)
        .required(true)
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let command = Command::new("auth-session")
        .about("Client authentication session manager")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_API_URL)
                .short('u')
                .long("api-url")
                .help("Identity service base URL, example: https://id.example.com")
                .default_value(DEFAULT_API_BASE_URL)
                .env("AUTH_SESSION_API_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_FILE)
                .long("token-file")
                .help("File the session token is persisted in")
                .env("AUTH_SESSION_TOKEN_FILE")
                .global(true)
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            Arg::new(ARG_TIMEOUT)
                .long("timeout")
                .help("Request timeout in seconds, 0 disables it")
                .default_value(DEFAULT_TIMEOUT)
                .env("AUTH_SESSION_TIMEOUT")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .subcommand(
            Command::new("register")
                .about("Create an account and sign in")
                .arg(
                    Arg::new(ARG_NAME)
                        .short('n')
                        .long("name")
                        .help("Display name")
                        .required(true),
                )
                .arg(email_arg())
                .arg(password_arg()),
        )
        .subcommand(
            Command::new("login")
                .about("Sign in with email and password")
                .arg(email_arg())
                .arg(password_arg()),
        )
        .subcommand(Command::new("logout").about("Sign out and forget the stored token"))
        .subcommand(Command::new("whoami").about("Show the signed-in user"));

    logging::with_args(command)
}
