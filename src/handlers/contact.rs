use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::AppError;
use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{ContactForm, ContactReply};
use crate::state::AppState;

pub async fn contact_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ContactForm>, JsonRejection>,
) -> Result<Json<ContactReply>, AppError> {
    REQUEST_TOTAL.inc();
    // observes on drop, so rejected bodies are timed too
    let _timer = REQUEST_LATENCY.start_timer();

    let Json(form) = payload.map_err(|e| {
        debug!(error = %e, "Unreadable contact body");
        AppError::InvalidBody
    })?;

    if !form.is_complete() {
        return Err(AppError::IncompleteData);
    }

    let cal_link = scheduling_link(&state.cal_url, &form);

    info!(
        name = form.name(),
        email = form.email(),
        services = form.services().len(),
        "Contact request received"
    );

    Ok(Json(ContactReply { ok: true, cal_link }))
}

// Scheduling link prefilled with the visitor's details
fn scheduling_link(base: &str, form: &ContactForm) -> String {
    let notes = form.notes();
    let params = [
        ("name", form.name()),
        ("email", form.email()),
        ("notes", notes.as_str()),
    ];
    match Url::parse_with_params(base, params) {
        Ok(url) => url.into(),
        Err(e) => {
            warn!(error = %e, base, "Invalid scheduling url");
            base.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_encodes_notes() {
        let form = ContactForm {
            name: Some("Ada Lovelace".into()),
            email: Some("ada@example.com".into()),
            message: Some("hi".into()),
            ..Default::default()
        };
        let link = scheduling_link("https://cal.com/l4zarusdev", &form);
        assert_eq!(
            link,
            "https://cal.com/l4zarusdev?name=Ada+Lovelace&email=ada%40example.com&notes=Services%3A+N%2FA%0ABudget%3A+N%2FA"
        );
    }
}
