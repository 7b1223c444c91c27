use anyhow::Result;
use auth_session::cli::{actions, start, telemetry};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    let (action, globals) = start()?;

    let result = actions::session::handle(action, &globals).await;

    telemetry::shutdown_tracer();

    result
}
