use anyhow::anyhow;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Rgb,
};
use time::format_description::well_known::Rfc3339;

use super::Report;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 14.0;
// Matches the source layout: start a new page once the cursor passes
// 250mm from the top of an A4 page.
const BREAK_AT: f32 = 250.0;
const TOP_MARGIN: f32 = 20.0;

const LINE_WIDTH_CHARS: usize = 95;

/// Column start offsets (mm) and character budgets for the summary table.
const COLUMNS: [(f32, usize); 6] = [
    (14.0, 8),   // id suffix
    (34.0, 28),  // title
    (86.0, 16),  // author
    (116.0, 10), // priority
    (138.0, 12), // closure date
    (162.0, 24), // solution
];
const TABLE_HEADER: [&str; 6] = [
    "ID",
    "Título",
    "Autor",
    "Prioridad",
    "Fecha Cierre",
    "Resolución",
];

struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    from_top: f32,
}

impl PageWriter<'_> {
    fn break_page_if_needed(&mut self) {
        if self.from_top > BREAK_AT {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "content");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.from_top = TOP_MARGIN;
        }
    }

    fn text(&self, font: &IndirectFontRef, size: f32, x: f32, line: &str) {
        self.layer
            .use_text(line, size, Mm(x), Mm(PAGE_HEIGHT - self.from_top), font);
    }

    fn color(&self, r: f32, g: f32, b: f32) {
        self.layer
            .set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
    }
}

/// Render the already-built report as a PDF byte buffer: header, summary
/// table, then one detail block per ticket, breaking pages as space runs
/// out.
pub fn render(report: &Report) -> anyhow::Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(
        "Informe Técnico",
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "content",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("pdf font: {e}"))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| anyhow!("pdf font: {e}"))?;

    let mut writer = PageWriter {
        doc: &doc,
        layer: doc.get_page(page).get_layer(layer),
        from_top: 22.0,
    };

    // Header block.
    writer.color(0.0, 0.42, 0.88);
    writer.text(&bold, 22.0, MARGIN_LEFT, "ELSPEC ANDINA - INFORME TÉCNICO");

    writer.color(0.4, 0.4, 0.4);
    let generated = report
        .generated_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| report.generated_at.to_string());
    writer.from_top = 30.0;
    writer.text(&regular, 10.0, MARGIN_LEFT, &format!("Generado el: {generated}"));
    writer.from_top = 35.0;
    writer.text(
        &regular,
        10.0,
        MARGIN_LEFT,
        &format!(
            "Filtro periodo: {} a {}",
            report.range.start, report.range.end
        ),
    );

    // Summary table.
    writer.from_top = 45.0;
    writer.color(0.0, 0.42, 0.88);
    for (header, (x, width)) in TABLE_HEADER.iter().zip(COLUMNS) {
        writer.text(&bold, 10.0, x, &truncate(header, width));
    }
    writer.color(0.0, 0.0, 0.0);
    for row in &report.rows {
        writer.from_top += 7.0;
        writer.break_page_if_needed();
        let cells = [
            row.id_suffix.as_str(),
            row.title.as_str(),
            row.author.as_str(),
            row.priority,
            row.closed_on.as_str(),
            row.solution.as_str(),
        ];
        for (cell, (x, width)) in cells.iter().zip(COLUMNS) {
            writer.text(&regular, 10.0, x, &truncate(cell, width));
        }
    }

    // Detail blocks.
    writer.from_top += 15.0;
    for (index, section) in report.sections.iter().enumerate() {
        writer.break_page_if_needed();
        writer.color(0.0, 0.0, 0.0);
        writer.text(
            &bold,
            12.0,
            MARGIN_LEFT,
            &format!("{}. DETALLES TÉCNICOS: {}", index + 1, section.title),
        );
        writer.from_top += 8.0;

        writer.color(0.24, 0.24, 0.24);
        for line in wrap(&format!("SOLUCIÓN: {}", section.solution), LINE_WIDTH_CHARS) {
            writer.break_page_if_needed();
            writer.text(&regular, 10.0, MARGIN_LEFT, &line);
            writer.from_top += 5.0;
        }
        writer.from_top += 3.0;
        for line in wrap(
            &format!("RECOMENDACIÓN: {}", section.recommendation),
            LINE_WIDTH_CHARS,
        ) {
            writer.break_page_if_needed();
            writer.text(&regular, 10.0, MARGIN_LEFT, &line);
            writer.from_top += 5.0;
        }
        writer.from_top += 12.0;
    }

    doc.save_to_bytes().map_err(|e| anyhow!("pdf save: {e}"))
}

/// Greedy word wrap on a character budget. Words longer than the budget
/// get a line of their own.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Closure, Priority, Ticket, TicketStatus};
    use crate::report::{build_report, ReportRange};
    use time::macros::date;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[test]
    fn wrap_respects_width_and_keeps_words() {
        let lines = wrap("replaced the faulty switch and rewired the rack", 20);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= 20));
        assert_eq!(lines.join(" "), "replaced the faulty switch and rewired the rack");
    }

    #[test]
    fn wrap_of_empty_text_is_one_empty_line() {
        assert_eq!(wrap("", 20), vec![String::new()]);
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer cell value", 10), "a much lo…");
    }

    #[test]
    fn render_produces_a_pdf() {
        let ticket = Ticket {
            id: Uuid::new_v4(),
            title: "vpn outage".to_string(),
            description: "site to site tunnel down".to_string(),
            priority: Priority::High,
            author: "user".to_string(),
            status: TicketStatus::Closed,
            closure: Some(Closure {
                solution: "renegotiated the tunnel after updating the PSK".to_string(),
                recommendation: "monitor tunnel state and rotate keys quarterly".to_string(),
                closed_at: OffsetDateTime::now_utc(),
                closed_by: "alejandro".to_string(),
            }),
            deleted: false,
            deleted_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let range = ReportRange {
            start: date!(2000 - 01 - 01),
            end: date!(2100 - 01 - 01),
        };
        let report = build_report(&[ticket], range).expect("one match");
        let bytes = render(&report).expect("render");
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }

    #[test]
    fn render_breaks_pages_on_many_tickets() {
        let base = OffsetDateTime::now_utc();
        let tickets: Vec<Ticket> = (0..40)
            .map(|i| Ticket {
                id: Uuid::new_v4(),
                title: format!("ticket {i}"),
                description: "d".to_string(),
                priority: Priority::Low,
                author: "user".to_string(),
                status: TicketStatus::Closed,
                closure: Some(Closure {
                    solution: "restarted the service and verified the logs".to_string(),
                    recommendation: "add an alert for the failure mode".to_string(),
                    closed_at: base,
                    closed_by: "alejandro".to_string(),
                }),
                deleted: false,
                deleted_at: None,
                created_at: base,
            })
            .collect();
        let range = ReportRange {
            start: date!(2000 - 01 - 01),
            end: date!(2100 - 01 - 01),
        };
        let report = build_report(&tickets, range).expect("matches");
        let bytes = render(&report).expect("render");
        assert!(bytes.starts_with(b"%PDF"));
    }
}
