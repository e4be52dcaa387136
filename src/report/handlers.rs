use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Router,
};
use serde::Deserialize;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{error, instrument};

use crate::report::{build_report, filename, pdf, ReportRange};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/report", get(download_report))
}

/// Date range as ISO dates, e.g. `?start=2024-03-01&end=2024-03-31`.
#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub start: String,
    pub end: String,
}

const DATE_FORMAT: &'static [time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

fn parse_date(value: &str) -> Result<Date, (StatusCode, String)> {
    Date::parse(value, DATE_FORMAT).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid date '{value}', expected YYYY-MM-DD"),
        )
    })
}

#[instrument(skip(state))]
pub async fn download_report(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<(HeaderMap, Vec<u8>), (StatusCode, String)> {
    let range = ReportRange {
        start: parse_date(&params.start)?,
        end: parse_date(&params.end)?,
    };

    let tickets = state.db.tickets_snapshot().await.map_err(|e| {
        error!(error = %e, "ticket fetch for report failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let Some(report) = build_report(&tickets, range) else {
        return Err((
            StatusCode::NOT_FOUND,
            "No closed tickets in the selected range".into(),
        ));
    };

    let bytes = pdf::render(&report).map_err(|e| {
        error!(error = %e, "pdf render failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Report render error".into())
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/pdf"),
    );
    let name = filename(OffsetDateTime::now_utc().date());
    if let Ok(disposition) = HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    Ok((headers, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn parses_iso_dates() {
        assert_eq!(parse_date("2024-03-15").unwrap(), date!(2024 - 03 - 15));
        assert!(parse_date("15/03/2024").is_err());
        assert!(parse_date("2024-13-01").is_err());
    }
}
