use crate::{
    api::{HttpIdentityApi, IdentityApi, User},
    cli::{actions::Action, globals::GlobalArgs},
    errors::SessionError,
    session::{AuthSession, FileStorage, KeyValueStorage},
};
use anyhow::{anyhow, Result};
use tracing::debug;

fn describe(user: &User) -> String {
    let mut line = format!("{} <{}> (id {})", user.name, user.email, user.id);
    if user.email_verified_at.is_none() {
        line.push_str(", email not verified");
    }
    line
}

/// Turns a failed register/login into the message the session recorded.
fn rejected<A: IdentityApi, S: KeyValueStorage>(
    session: &AuthSession<A, S>,
    err: SessionError,
) -> anyhow::Error {
    match (&err, session.state().error) {
        (SessionError::Rejected(_), Some(message)) => anyhow!(message),
        _ => err.into(),
    }
}

/// Runs `action` against an already constructed session and returns what to print.
///
/// # Errors
/// Returns an error if the action fails; rejected register/login calls carry the
/// session's error text.
pub async fn run<A: IdentityApi, S: KeyValueStorage>(
    action: Action,
    session: &AuthSession<A, S>,
) -> Result<String> {
    session.restore().await?;
    let restored = session.state();
    if let Some(message) = &restored.error {
        debug!(%message, "previous session discarded");
    }

    match action {
        Action::Register {
            name,
            email,
            password,
        } => {
            let user = session
                .register(&name, &email, password)
                .await
                .map_err(|err| rejected(session, err))?;
            Ok(format!("Registered and signed in as {}", describe(&user)))
        }
        Action::Login { email, password } => {
            let user = session
                .login(&email, password)
                .await
                .map_err(|err| rejected(session, err))?;
            Ok(format!("Signed in as {}", describe(&user)))
        }
        Action::Logout => {
            let was_signed_in = restored.is_authenticated();
            session.logout().await?;
            Ok(if was_signed_in {
                "Signed out".to_string()
            } else {
                "Not logged in".to_string()
            })
        }
        Action::Whoami => Ok(match (&restored.user, &restored.error) {
            (Some(user), _) => describe(user),
            (None, Some(message)) => format!("Not logged in: {message}"),
            (None, None) => "Not logged in".to_string(),
        }),
    }
}

/// Handle a session action with the HTTP identity API and file-backed token.
///
/// # Errors
/// Returns an error if configuration is invalid or the action fails.
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    let config = globals.config()?;
    debug!(api_url = %config.api_url(), token_file = %config.token_path.display(), "session config");

    let storage = FileStorage::new(&config.token_path);
    let api = HttpIdentityApi::new(config)?;
    let session = AuthSession::new(api, storage);

    let output = run(action, &session).await?;
    println!("{output}");

    Ok(())
}
