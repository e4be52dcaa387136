use time::{Date, OffsetDateTime};

use crate::db::{Ticket, TicketStatus};
use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod pdf;

pub fn router() -> Router<AppState> {
    handlers::routes()
}

/// Inclusive closure-date range, compared on the date portion only, no
/// timezone normalization.
#[derive(Debug, Clone, Copy)]
pub struct ReportRange {
    pub start: Date,
    pub end: Date,
}

/// One line of the summary table.
#[derive(Debug)]
pub struct SummaryRow {
    pub id_suffix: String,
    pub title: String,
    pub author: String,
    pub priority: &'static str,
    pub closed_on: String,
    pub solution: String,
}

/// One per-ticket detail block.
#[derive(Debug)]
pub struct DetailSection {
    pub title: String,
    pub solution: String,
    pub recommendation: String,
}

/// Fully laid-out report, ready for a renderer.
#[derive(Debug)]
pub struct Report {
    pub generated_at: OffsetDateTime,
    pub range: ReportRange,
    pub rows: Vec<SummaryRow>,
    pub sections: Vec<DetailSection>,
}

/// A ticket makes the report iff it is closed, has a closure timestamp,
/// and that timestamp's date falls within the range, both ends included.
fn included(ticket: &Ticket, range: &ReportRange) -> bool {
    if ticket.status != TicketStatus::Closed {
        return false;
    }
    match &ticket.closure {
        Some(closure) => {
            let closed_on = closure.closed_at.date();
            closed_on >= range.start && closed_on <= range.end
        }
        None => false,
    }
}

/// Build the report from an already-fetched ticket set. Returns `None`
/// when nothing matches; the degenerate case never reaches a renderer.
pub fn build_report(tickets: &[Ticket], range: ReportRange) -> Option<Report> {
    let matched: Vec<&Ticket> = tickets.iter().filter(|t| included(t, &range)).collect();
    if matched.is_empty() {
        return None;
    }

    let rows = matched
        .iter()
        .map(|t| {
            let closure = t.closure.as_ref().expect("filtered to closed tickets");
            SummaryRow {
                id_suffix: id_suffix(&t.id.to_string()),
                title: t.title.clone(),
                author: t.author.clone(),
                priority: t.priority.as_str(),
                closed_on: closure.closed_at.date().to_string(),
                solution: closure.solution.clone(),
            }
        })
        .collect();

    let sections = matched
        .iter()
        .map(|t| {
            let closure = t.closure.as_ref().expect("filtered to closed tickets");
            DetailSection {
                title: t.title.clone(),
                solution: closure.solution.clone(),
                recommendation: closure.recommendation.clone(),
            }
        })
        .collect();

    Some(Report {
        generated_at: OffsetDateTime::now_utc(),
        range,
        rows,
        sections,
    })
}

/// Short display form of a record id: its last six characters.
fn id_suffix(id: &str) -> String {
    let start = id.len().saturating_sub(6);
    id[start..].to_string()
}

/// The one externally observable artifact contract.
pub fn filename(on: Date) -> String {
    format!("Reporte_IT_ElspecAndina_{on}.pdf")
}
