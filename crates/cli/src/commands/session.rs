//! Session commands.
//!
//! # Usage
//!
//! ```bash
//! shop login -e ada@example.com -p hunter2
//! shop whoami
//! shop route /client/orders
//! shop logout
//! ```

use shopfront_client::session::{ConfirmOutcome, GuardDecision, Identity, SessionState};
use shopfront_client::state::AppState;
use shopfront_client::ClientError;

/// Sign in and persist the token.
#[allow(clippy::print_stdout)]
pub async fn login(app: &AppState, email: &str, password: &str) -> Result<(), ClientError> {
    let identity = app.login(email, password).await?;
    tracing::info!(user_id = %identity.id, "Signed in");

    println!("Signed in as {} ({})", identity.label(), identity.role);
    Ok(())
}

/// Sign out. Succeeds even with no session.
#[allow(clippy::print_stdout)]
pub fn logout(app: &AppState) {
    app.session().logout();

    println!("Signed out");
}

/// Show the current identity, confirming it unless `offline`.
#[allow(clippy::print_stdout)]
pub async fn whoami(app: &AppState, offline: bool) {
    let snapshot = app.snapshot();
    let Some(optimistic) = snapshot.identity else {
        println!("Not signed in");
        return;
    };

    if offline {
        print_identity(&optimistic, "unconfirmed");
        return;
    }

    match app.session().confirm().await {
        ConfirmOutcome::Confirmed(identity) => print_identity(&identity, "confirmed"),
        ConfirmOutcome::Unconfirmed(identity) => {
            print_identity(&identity, "unconfirmed, profile unavailable");
        }
        ConfirmOutcome::Expired => {
            println!("Session expired; signed out");
        }
        ConfirmOutcome::Stale | ConfirmOutcome::NoSession => {
            println!("Not signed in");
        }
    }
}

#[allow(clippy::print_stdout)]
fn print_identity(identity: &Identity, status: &str) {
    println!("{} ({status})", identity.label());
    println!("  id:    {}", identity.id);
    println!("  role:  {}", identity.role);
    if let Some(email) = &identity.email {
        println!("  email: {email}");
    }
    if let Some(profile_role) = identity.role_mismatch {
        println!("  warning: profile reports role {profile_role}");
    }
}

/// Report what the route guard decides for `path`.
#[allow(clippy::print_stdout)]
pub fn route(app: &AppState, path: &str) {
    let decision = app.check_route(path);
    let state = match app.snapshot().state {
        SessionState::Anonymous => "anonymous",
        SessionState::Pending => "pending",
        SessionState::Authenticated => "authenticated",
    };

    let outcome = match (decision, decision.redirect_target(app.policy())) {
        (GuardDecision::Render, _) => "render".to_string(),
        (GuardDecision::ShowLoading, _) => "loading".to_string(),
        (_, Some(target)) => format!("redirect to {target}"),
        (_, None) => "redirect".to_string(),
    };

    println!("{path}: {outcome} (session {state})");
}
