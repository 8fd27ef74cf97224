//! Plain-text rendering backend for a [`ReportPlan`].
//!
//! Cells are placed on a character grid by scaling their x offset, so the output
//! keeps the plan's column alignment and page breaks.

use std::fmt::Write;

use crate::layout::{Block, BlockKind, ReportPlan};

/// Characters per layout unit along x.
const COLUMN_SCALE: f32 = 0.6;
const PAGE_WIDTH: usize = 100;
/// x offset rendered as the first character column.
const LEFT_MARGIN: f32 = 20.0;

pub fn render_text(plan: &ReportPlan) -> String {
    let mut output = String::new();

    for page in &plan.pages {
        if page.index > 1 {
            let _ = writeln!(output, "\u{000C}");
        }
        let _ = writeln!(output, "{}", page.header);
        let _ = writeln!(output);

        for block in &page.blocks {
            match block.kind {
                BlockKind::Spacer => {
                    let _ = writeln!(output);
                }
                BlockKind::Rule => {
                    let _ = writeln!(output, "{}", "-".repeat(PAGE_WIDTH));
                }
                BlockKind::Title => {
                    let text = block.cells.first().map(|c| c.text.as_str()).unwrap_or("");
                    let _ = writeln!(output, "{:^width$}", text, width = PAGE_WIDTH);
                }
                BlockKind::SectionHeader => {
                    let text = block.cells.first().map(|c| c.text.as_str()).unwrap_or("");
                    let _ = writeln!(output, "## {text}");
                }
                BlockKind::TableHeader => {
                    let _ = writeln!(output, "{}", grid_line(block));
                    let _ = writeln!(output, "{}", "-".repeat(PAGE_WIDTH));
                }
                BlockKind::Text | BlockKind::Row | BlockKind::Subtotal => {
                    let _ = writeln!(output, "{}", grid_line(block));
                }
            }
        }

        let _ = writeln!(output);
        let _ = writeln!(output, "{:^width$}", page.footer, width = PAGE_WIDTH);
    }

    output
}

fn grid_line(block: &Block) -> String {
    let mut line = String::new();
    for cell in &block.cells {
        let column = ((cell.x - LEFT_MARGIN) * COLUMN_SCALE).max(0.0) as usize;
        let width = line.chars().count();
        if width < column {
            line.push_str(&" ".repeat(column - width));
        } else if width > 0 {
            line.push(' ');
        }
        line.push_str(&cell.text);
    }
    line.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{group_by, GroupKey};
    use crate::layout::{plan_report, PageGeometry, ReportHeading};
    use crate::store::testing::daily;
    use chrono::{TimeZone, Utc};

    fn heading() -> ReportHeading {
        ReportHeading {
            label: "Poultry_Report".to_string(),
            title: "Poultry Management Report".to_string(),
            lines: vec!["Supervisor: Dana Fields".to_string()],
            generated_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
        }
    }

    #[test]
    fn renders_sections_rows_and_footer() {
        let records = vec![
            daily("u-1", "B1", "2024-01-10", 50, 2, 12.5),
            daily("u-1", "B1", "2024-01-11", 45, 0, 12.0),
        ];
        let grouped = group_by(&records, GroupKey::Batch);
        let plan = plan_report(&heading(), &grouped, &PageGeometry::default()).unwrap();
        let text = render_text(&plan);

        assert!(text.contains("Poultry Management Report"));
        assert!(text.contains("Supervisor: Dana Fields"));
        assert!(text.contains("## Summary Statistics"));
        assert!(text.contains("Total Eggs: 95"));
        assert!(text.contains("## User: u-1 name - u-1 farm | Batch: B1"));
        assert!(text.contains("Page 1 of 1"));

        let row = text
            .lines()
            .find(|line| line.starts_with("2024-01-10"))
            .unwrap();
        assert!(row.contains("50"));
        assert!(row.contains("12.5"));
    }

    #[test]
    fn pages_are_separated_by_form_feed() {
        let records: Vec<_> = (1..=28)
            .map(|d| daily("u-1", "B1", &format!("2024-02-{d:02}"), d, 0, 1.0))
            .collect();
        let grouped = group_by(&records, GroupKey::Batch);
        let geometry = PageGeometry {
            page_height: 100.0,
            row_height: 10.0,
            header_height: 20.0,
            footer_margin: 10.0,
            top_margin: 10.0,
        };
        let plan = plan_report(&heading(), &grouped, &geometry).unwrap();
        let text = render_text(&plan);

        assert_eq!(text.matches('\u{000C}').count(), plan.page_count() - 1);
        assert!(text.contains(&format!("Page {0} of {0}", plan.page_count())));
    }
}
