//! Operator-facing HTML routes. Actions redirect back to `/dashboard` with the
//! current controls and a one-shot notice in the query string.

use askama::Template;
use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
    Form,
};
use serde::Deserialize;
use tracing::{error, info};

use super::AppState;
use crate::{
    control::PumpCommand,
    dashboard::{DashboardPage, DashboardTemplate, Notice, ViewParams},
};

fn render<T: Template>(tmpl: T) -> Html<String> {
    Html(tmpl.render().unwrap_or_else(|e| {
        error!(error = %e, "Template rendering failed");
        format!("<pre>Template error: {e}</pre>")
    }))
}

pub async fn index() -> Redirect {
    Redirect::to("/dashboard")
}

pub async fn dashboard(
    State(state): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Html<String> {
    let page = DashboardPage::load(&state.sensors, params.settings(), params.notice()).await;
    render(DashboardTemplate::from_page(&page))
}

pub async fn refresh(State(state): State<AppState>, Form(params): Form<ViewParams>) -> Redirect {
    let cleared = state.sensors.refresh_now().await;
    info!(cleared, "Manual refresh requested");
    let notice = Notice::success("Data refreshed.");
    Redirect::to(&params.settings().dashboard_url(Some(&notice)))
}

#[derive(Debug, Deserialize)]
pub struct PumpForm {
    #[serde(default)]
    pub command: String,
    #[serde(flatten)]
    pub view: ViewParams,
}

pub async fn pump(State(state): State<AppState>, Form(form): Form<PumpForm>) -> Redirect {
    let notice = match form.command.parse::<PumpCommand>() {
        Err(e) => Notice::error(e),
        Ok(command) => match state.pump.publish(command).await {
            Ok(()) => Notice::success(format!("Command sent: {command}")),
            Err(e) => Notice::error(format!("Failed to send {command}: {e}")),
        },
    };
    Redirect::to(&form.view.settings().dashboard_url(Some(&notice)))
}
