//! Report layout planning.
//!
//! Turns a grouped result into pages of positioned blocks. The plan is backend
//! agnostic: a renderer only has to draw each block's cells at `(cell.x, block.y)`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{DailyStats, GroupedResult, IncomeStats, LeafGroup, OwnerGroup, Summarize};
use crate::error::{FarmError, FarmResult};
use crate::format;
use crate::models::{DailyRecord, IncomeRecord};

/// Vertical measures, in the renderer's unit (millimetres for A4).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageGeometry {
    pub page_height: f32,
    pub row_height: f32,
    pub header_height: f32,
    pub footer_margin: f32,
    pub top_margin: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            page_height: 297.0,
            row_height: 5.0,
            header_height: 8.0,
            footer_margin: 20.0,
            top_margin: 20.0,
        }
    }
}

impl PageGeometry {
    /// Content must end at or above this offset.
    pub fn limit(&self) -> f32 {
        self.page_height - self.footer_margin
    }

    pub fn validate(&self) -> FarmResult<()> {
        let measures = [
            ("page height", self.page_height),
            ("row height", self.row_height),
            ("header height", self.header_height),
        ];
        for (name, value) in measures {
            if !value.is_finite() || value <= 0.0 {
                return Err(FarmError::Validation(format!("{name} must be positive")));
            }
        }
        if self.footer_margin < 0.0 || self.top_margin < 0.0 {
            return Err(FarmError::Validation("margins cannot be negative".to_string()));
        }
        // A section header, a table header and one row must fit on an empty page.
        let smallest_unit = self.header_height + 2.0 * self.row_height;
        if self.top_margin + smallest_unit > self.limit() {
            return Err(FarmError::Validation(format!(
                "page height {} leaves no room for a table section",
                self.page_height
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Title,
    Text,
    Rule,
    SectionHeader,
    TableHeader,
    Row,
    Subtotal,
    Spacer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub column: usize,
    pub x: f32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Offset of the block's top edge from the top of the page.
    pub y: f32,
    pub height: f32,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// 1-based.
    pub index: usize,
    pub header: String,
    pub blocks: Vec<Block>,
    pub footer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPlan {
    pub label: String,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub pages: Vec<Page>,
}

impl ReportPlan {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// `<Label>_<isoDate>.<ext>`
    pub fn file_name(&self, extension: &str) -> String {
        report_file_name(&self.label, self.generated_at, extension)
    }
}

pub fn report_file_name(label: &str, generated_at: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{label}_{}.{extension}",
        format::date(generated_at.date_naive())
    )
}

/// Fixed column of a report table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub title: &'static str,
    pub x: f32,
}

const LEFT_EDGE: f32 = 20.0;

/// Record kinds that can be laid out as report tables.
pub trait Tabular: Summarize {
    fn columns() -> &'static [Column];

    fn cells(&self) -> Vec<String>;

    fn subtotal(stats: &Self::Stats) -> Vec<String>;

    /// Lines of the "Summary Statistics" block.
    fn summary(grouped: &GroupedResult<Self>) -> Vec<String>;

    fn section_title(owner: &OwnerGroup<Self>, leaf: &LeafGroup<Self>) -> String {
        format!(
            "User: {} - {} | Batch: {}",
            owner.owner_name, owner.farm_name, leaf.key
        )
    }
}

const DAILY_COLUMNS: [Column; 6] = [
    Column { title: "Date", x: 20.0 },
    Column { title: "Batch", x: 50.0 },
    Column { title: "Eggs", x: 75.0 },
    Column { title: "Mortality", x: 95.0 },
    Column { title: "Feed", x: 115.0 },
    Column { title: "Vacc/Med", x: 140.0 },
];

impl Tabular for DailyRecord {
    fn columns() -> &'static [Column] {
        &DAILY_COLUMNS
    }

    fn cells(&self) -> Vec<String> {
        vec![
            format::date(self.date),
            format::truncate(&self.batch_id, 8),
            self.egg_count.to_string(),
            self.mortality.to_string(),
            format::feed(self.feed),
            format::treatment_label(self).to_string(),
        ]
    }

    fn subtotal(stats: &DailyStats) -> Vec<String> {
        vec![
            "Total".to_string(),
            String::new(),
            stats.total_eggs.to_string(),
            stats.total_mortality.to_string(),
            format::feed(stats.total_feed),
            String::new(),
        ]
    }

    fn summary(grouped: &GroupedResult<Self>) -> Vec<String> {
        let stats = &grouped.stats;
        vec![
            format!("Total Users: {}", grouped.owners.len()),
            format!("Total Batches: {}", grouped.leaves().count()),
            format!("Total Eggs: {}", stats.total_eggs),
            format!("Total Mortality: {}", stats.total_mortality),
            format!("Total Feed Used: {}", format::feed_total(stats.total_feed)),
        ]
    }
}

const INCOME_COLUMNS: [Column; 5] = [
    Column { title: "Date", x: 20.0 },
    Column { title: "Batch", x: 50.0 },
    Column { title: "Type", x: 75.0 },
    Column { title: "Quantity", x: 105.0 },
    Column { title: "Amount", x: 140.0 },
];

impl Tabular for IncomeRecord {
    fn columns() -> &'static [Column] {
        &INCOME_COLUMNS
    }

    fn cells(&self) -> Vec<String> {
        vec![
            format::date(self.date),
            format::truncate(&self.batch_id, 8),
            self.income_type.to_string(),
            format!("{} {}", format::quantity(self.quantity), self.unit),
            format::currency(self.amount),
        ]
    }

    fn subtotal(stats: &IncomeStats) -> Vec<String> {
        vec![
            "Total".to_string(),
            String::new(),
            String::new(),
            format::quantity(stats.total_quantity),
            format::currency(stats.total_amount),
        ]
    }

    fn summary(grouped: &GroupedResult<Self>) -> Vec<String> {
        let stats = &grouped.stats;
        vec![
            format!("Total Users: {}", grouped.owners.len()),
            format!("Total Batches: {}", grouped.leaves().count()),
            format!("Egg Sales: {}", format::currency(stats.egg_sales)),
            format!("Meat Sales: {}", format::currency(stats.meat_sales)),
            format!("Total Income: {}", format::currency(stats.total_amount)),
        ]
    }
}

/// Document-level text placed before the tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportHeading {
    pub label: String,
    pub title: String,
    pub lines: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

struct Planner<'a> {
    geometry: &'a PageGeometry,
    header: String,
    pages: Vec<Page>,
    blocks: Vec<Block>,
    y: f32,
}

impl<'a> Planner<'a> {
    fn new(geometry: &'a PageGeometry, header: String) -> Self {
        Self {
            geometry,
            header,
            pages: Vec::new(),
            blocks: Vec::new(),
            y: geometry.top_margin,
        }
    }

    fn break_page(&mut self) {
        let blocks = std::mem::take(&mut self.blocks);
        self.pages.push(Page {
            index: self.pages.len() + 1,
            header: self.header.clone(),
            blocks,
            footer: String::new(),
        });
        self.y = self.geometry.top_margin;
    }

    fn fits(&self, height: f32) -> bool {
        self.y + height <= self.geometry.limit()
    }

    /// Places blocks on one page, breaking first if they would overflow. A unit
    /// taller than a whole page still goes on a fresh page rather than looping.
    fn place_unit(&mut self, unit: Vec<(BlockKind, f32, Vec<Cell>)>) {
        let height: f32 = unit.iter().map(|(_, h, _)| *h).sum();
        if !self.fits(height) && !self.blocks.is_empty() {
            self.break_page();
        }
        for (kind, height, cells) in unit {
            self.blocks.push(Block {
                kind,
                y: self.y,
                height,
                cells,
            });
            self.y += height;
        }
    }

    fn place(&mut self, kind: BlockKind, height: f32, cells: Vec<Cell>) {
        self.place_unit(vec![(kind, height, cells)]);
    }

    /// Whitespace is dropped rather than pushed onto a new page.
    fn space(&mut self, height: f32) {
        if self.fits(height) {
            self.place(BlockKind::Spacer, height, Vec::new());
        }
    }

    /// A body row. On a continuation page the table header is repeated in front of it.
    fn place_row(&mut self, kind: BlockKind, cells: Vec<Cell>, table_header: &[Cell]) {
        let row = self.geometry.row_height;
        if self.fits(row) || self.blocks.is_empty() {
            self.place(kind, row, cells);
        } else {
            self.break_page();
            self.place_unit(vec![
                (BlockKind::TableHeader, row, table_header.to_vec()),
                (kind, row, cells),
            ]);
        }
    }

    fn finish(mut self) -> Vec<Page> {
        if !self.blocks.is_empty() || self.pages.is_empty() {
            self.break_page();
        }
        let total = self.pages.len();
        for page in &mut self.pages {
            page.footer = format!("Page {} of {}", page.index, total);
        }
        self.pages
    }
}

fn text_cell(text: impl Into<String>) -> Vec<Cell> {
    vec![Cell {
        column: 0,
        x: LEFT_EDGE,
        text: text.into(),
    }]
}

fn row_cells(columns: &[Column], texts: Vec<String>) -> Vec<Cell> {
    columns
        .iter()
        .zip(texts)
        .enumerate()
        .map(|(index, (column, text))| Cell {
            column: index,
            x: column.x,
            text,
        })
        .collect()
}

/// Lays out `grouped` as one table section per (owner, group key).
///
/// A section header, its table header and its first row are one unit: when
/// they do not fit together the break goes before the section header. Later
/// rows break individually, with the table header repeated on the new page.
/// Footers read `Page i of N` once the page count is known.
pub fn plan_report<T: Tabular>(
    heading: &ReportHeading,
    grouped: &GroupedResult<T>,
    geometry: &PageGeometry,
) -> FarmResult<ReportPlan> {
    geometry.validate()?;
    let row = geometry.row_height;
    let mut planner = Planner::new(geometry, heading.title.clone());

    planner.place(BlockKind::Title, geometry.header_height, text_cell(&heading.title));
    for line in &heading.lines {
        planner.place(BlockKind::Text, row, text_cell(line));
    }
    planner.place(BlockKind::Rule, row, Vec::new());

    let mut summary = T::summary(grouped).into_iter();
    let mut summary_unit = vec![(
        BlockKind::SectionHeader,
        geometry.header_height,
        text_cell("Summary Statistics"),
    )];
    if let Some(line) = summary.next() {
        summary_unit.push((BlockKind::Text, row, text_cell(line)));
    }
    planner.place_unit(summary_unit);
    for line in summary {
        planner.place(BlockKind::Text, row, text_cell(line));
    }
    planner.space(row);

    if grouped.is_empty() {
        planner.place(
            BlockKind::Text,
            row,
            text_cell("No records match this report window."),
        );
    }

    let columns = T::columns();
    let table_header = row_cells(columns, columns.iter().map(|c| c.title.to_string()).collect());

    for (owner, leaf) in grouped.leaves() {
        let mut rows = leaf.ascending().iter();
        let Some(first) = rows.next() else {
            continue;
        };

        planner.place_unit(vec![
            (
                BlockKind::SectionHeader,
                geometry.header_height,
                text_cell(T::section_title(owner, leaf)),
            ),
            (BlockKind::TableHeader, row, table_header.clone()),
            (BlockKind::Row, row, row_cells(columns, first.cells())),
        ]);

        for record in rows {
            planner.place_row(BlockKind::Row, row_cells(columns, record.cells()), &table_header);
        }
        planner.place_row(
            BlockKind::Subtotal,
            row_cells(columns, T::subtotal(&leaf.stats)),
            &table_header,
        );
        planner.space(row);
    }

    Ok(ReportPlan {
        label: heading.label.clone(),
        title: heading.title.clone(),
        generated_at: heading.generated_at,
        pages: planner.finish(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{group_by, GroupKey};
    use crate::models::IncomeType;
    use crate::store::testing::{daily, income};
    use chrono::TimeZone;

    fn heading() -> ReportHeading {
        ReportHeading {
            label: "Poultry_Report".to_string(),
            title: "Poultry Management Report".to_string(),
            lines: Vec::new(),
            generated_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
        }
    }

    fn tight() -> PageGeometry {
        PageGeometry {
            page_height: 100.0,
            row_height: 10.0,
            header_height: 20.0,
            footer_margin: 10.0,
            top_margin: 10.0,
        }
    }

    fn kinds(page: &Page) -> Vec<BlockKind> {
        page.blocks.iter().map(|b| b.kind).collect()
    }

    fn assert_headers_never_stranded(plan: &ReportPlan) {
        for page in &plan.pages {
            for (i, block) in page.blocks.iter().enumerate() {
                match block.kind {
                    BlockKind::SectionHeader if block.cells[0].text.starts_with("User:") => {
                        assert_eq!(page.blocks[i + 1].kind, BlockKind::TableHeader);
                    }
                    BlockKind::TableHeader => {
                        let next = page.blocks.get(i + 1).map(|b| b.kind);
                        assert!(
                            matches!(next, Some(BlockKind::Row) | Some(BlockKind::Subtotal)),
                            "table header without a row on page {}",
                            page.index
                        );
                    }
                    _ => {}
                }
            }
        }
    }

    fn assert_within_limits(plan: &ReportPlan, geometry: &PageGeometry) {
        for page in &plan.pages {
            for block in &page.blocks {
                assert!(block.y >= geometry.top_margin);
                assert!(block.y + block.height <= geometry.limit() + f32::EPSILON);
            }
        }
    }

    /// Four heading lines push the summary block onto page 2 under `tight()`,
    /// so the first table section opens page 3 at the top margin.
    fn padded_heading() -> ReportHeading {
        ReportHeading {
            lines: (1..=4).map(|i| format!("Line {i}")).collect(),
            ..heading()
        }
    }

    fn section_page(plan: &ReportPlan, batch: &str) -> usize {
        let suffix = format!("Batch: {batch}");
        plan.pages
            .iter()
            .position(|page| {
                page.blocks.iter().any(|block| {
                    block.kind == BlockKind::SectionHeader && block.cells[0].text.ends_with(&suffix)
                })
            })
            .unwrap()
    }

    fn rows_on(page: &Page) -> usize {
        page.blocks.iter().filter(|b| b.kind == BlockKind::Row).count()
    }

    #[test]
    fn section_moves_whole_when_header_and_first_row_do_not_fit() {
        let records = vec![
            daily("u-1", "A", "2024-01-10", 1, 0, 1.0),
            daily("u-1", "B", "2024-01-10", 3, 0, 1.0),
        ];
        let grouped = group_by(&records, GroupKey::Batch);
        let geometry = tight();
        let plan = plan_report(&padded_heading(), &grouped, &geometry).unwrap();

        let a = section_page(&plan, "A");
        assert_eq!(
            kinds(&plan.pages[a]),
            vec![
                BlockKind::SectionHeader,
                BlockKind::TableHeader,
                BlockKind::Row,
                BlockKind::Subtotal,
                BlockKind::Spacer
            ]
        );

        // B's section header alone would still fit below A, its first row would not.
        let last = plan.pages[a].blocks.last().unwrap();
        let end = last.y + last.height;
        assert!(end + geometry.header_height <= geometry.limit());
        assert!(end + geometry.header_height + 2.0 * geometry.row_height > geometry.limit());

        let b = section_page(&plan, "B");
        assert_eq!(b, a + 1);
        let first = &plan.pages[b].blocks[0];
        assert_eq!(first.kind, BlockKind::SectionHeader);
        assert!(first.cells[0].text.ends_with("Batch: B"));
        assert_eq!(first.y, geometry.top_margin);
        assert_eq!(
            kinds(&plan.pages[b])[..3],
            [BlockKind::SectionHeader, BlockKind::TableHeader, BlockKind::Row]
        );
    }

    #[test]
    fn long_table_splits_between_rows_and_repeats_header() {
        // Header 20 + table header 10 + nine rows 90 cannot fit in 80 usable units.
        let records: Vec<DailyRecord> = (1..=9)
            .map(|d| daily("u-1", "B1", &format!("2024-01-{d:02}"), d, 0, 1.0))
            .collect();
        let grouped = group_by(&records, GroupKey::Batch);
        let plan = plan_report(&padded_heading(), &grouped, &tight()).unwrap();

        let start = section_page(&plan, "B1");
        let page = &plan.pages[start];
        assert_eq!(
            kinds(page)[..3],
            [BlockKind::SectionHeader, BlockKind::TableHeader, BlockKind::Row]
        );
        assert_eq!(rows_on(page), 5);

        let next = &plan.pages[start + 1];
        assert_eq!(next.blocks[0].kind, BlockKind::TableHeader);
        assert_eq!(next.blocks[1].kind, BlockKind::Row);
        assert_eq!(rows_on(next), 4);
        assert!(next.blocks.iter().any(|b| b.kind == BlockKind::Subtotal));
        assert_headers_never_stranded(&plan);
    }

    #[test]
    fn footers_carry_final_page_count() {
        let records: Vec<DailyRecord> = (1..=28)
            .map(|d| daily("u-1", "B1", &format!("2024-02-{d:02}"), d, 0, 1.0))
            .collect();
        let grouped = group_by(&records, GroupKey::Batch);
        let geometry = tight();
        let plan = plan_report(&heading(), &grouped, &geometry).unwrap();

        let total = plan.page_count();
        assert!(total > 2);
        for (i, page) in plan.pages.iter().enumerate() {
            assert_eq!(page.index, i + 1);
            assert_eq!(page.footer, format!("Page {} of {}", i + 1, total));
        }
        assert_headers_never_stranded(&plan);
        assert_within_limits(&plan, &geometry);
    }

    #[test]
    fn many_sections_never_strand_headers() {
        let mut records = Vec::new();
        for owner in ["u-1", "u-2", "u-3"] {
            for batch in ["B1", "B2", "B3"] {
                for d in 1..=4 {
                    records.push(daily(owner, batch, &format!("2024-03-{d:02}"), d, 0, 1.0));
                }
            }
        }
        let grouped = group_by(&records, GroupKey::Batch);
        let geometry = tight();
        let plan = plan_report(&heading(), &grouped, &geometry).unwrap();

        assert_headers_never_stranded(&plan);
        assert_within_limits(&plan, &geometry);
        let rows: usize = plan
            .pages
            .iter()
            .map(|p| p.blocks.iter().filter(|b| b.kind == BlockKind::Row).count())
            .sum();
        assert_eq!(rows, records.len());
    }

    #[test]
    fn empty_report_still_has_one_page() {
        let grouped = group_by::<DailyRecord>(&[], GroupKey::Batch);
        let plan = plan_report(&heading(), &grouped, &PageGeometry::default()).unwrap();
        assert_eq!(plan.page_count(), 1);
        assert_eq!(plan.pages[0].footer, "Page 1 of 1");
        assert!(plan.pages[0]
            .blocks
            .iter()
            .any(|b| b.cells.first().is_some_and(|c| c.text.starts_with("No records"))));
    }

    #[test]
    fn rows_assign_cells_to_columns() {
        let mut record = daily("u-1", "LAYER-A-2024", "2024-01-10", 50, 2, 12.46);
        record.vaccination = Some("Newcastle".to_string());
        let grouped = group_by(&[record], GroupKey::Batch);
        let plan = plan_report(&heading(), &grouped, &PageGeometry::default()).unwrap();

        let row = plan.pages[0]
            .blocks
            .iter()
            .find(|b| b.kind == BlockKind::Row)
            .unwrap();
        let texts: Vec<&str> = row.cells.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["2024-01-10", "LAYER-A-", "50", "2", "12.5", "Vacc"]);
        assert_eq!(row.cells[3].x, 95.0);
        assert_eq!(row.cells[3].column, 3);

        let subtotal = plan.pages[0]
            .blocks
            .iter()
            .find(|b| b.kind == BlockKind::Subtotal)
            .unwrap();
        assert_eq!(subtotal.cells[2].text, "50");
    }

    #[test]
    fn income_plan_uses_currency_columns() {
        let records = vec![income("u-1", "B1", "2024-01-10", IncomeType::MeatSale, 1250.5)];
        let grouped = group_by(&records, GroupKey::Batch);
        let plan = plan_report(&heading(), &grouped, &PageGeometry::default()).unwrap();
        let row = plan.pages[0]
            .blocks
            .iter()
            .find(|b| b.kind == BlockKind::Row)
            .unwrap();
        assert_eq!(row.cells[2].text, "Meat Sale");
        assert_eq!(row.cells[4].text, "1,250.50");
    }

    #[test]
    fn geometry_without_room_for_a_section_is_rejected() {
        let geometry = PageGeometry {
            page_height: 40.0,
            row_height: 10.0,
            header_height: 20.0,
            footer_margin: 10.0,
            top_margin: 10.0,
        };
        assert!(matches!(geometry.validate(), Err(FarmError::Validation(_))));
    }

    #[test]
    fn file_name_follows_label_and_date() {
        let grouped = group_by::<DailyRecord>(&[], GroupKey::Batch);
        let plan = plan_report(&heading(), &grouped, &PageGeometry::default()).unwrap();
        assert_eq!(plan.file_name("pdf"), "Poultry_Report_2024-01-15.pdf");
    }
}
