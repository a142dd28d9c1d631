use crate::core::aggregator;
use crate::core::columns::{AliasMatcher, ColumnMatcher, SemanticColumns};
use crate::core::export::{CellLinks, ExportMapper};
use crate::core::orchestrator::{PipelineOrchestrator, PipelineSnapshot, RunSummary};
use crate::core::view::ViewEngine;
use crate::domain::model::{
    cell_text, normalize_category, records_from_rows, CategorizedRow, FilterState, Record,
    SortSpec,
};
use crate::domain::ports::{Classifier, Sleeper, SourceReader, TableWriter};
use crate::domain::table::ExportTable;
use crate::utils::error::{ClassifyError, Result};
use crate::utils::validation::validate_required_field;
use std::collections::BTreeSet;
use tokio::sync::watch;

/// Workbook selection plus everything derived from it; cleared on reset.
#[derive(Debug, Default)]
struct Session {
    sheet: Option<String>,
    headers: Vec<String>,
    column: Option<String>,
    records: Vec<Record>,
    rows: Vec<CategorizedRow>,
    view: ViewEngine,
    filters: FilterState,
    sort: SortSpec,
}

/// Ties a workbook, the classification pipeline and the view together.
pub struct ClassificationEngine<R: SourceReader, C: Classifier, S: Sleeper> {
    reader: R,
    source_name: String,
    orchestrator: PipelineOrchestrator<C, S>,
    matcher: Box<dyn ColumnMatcher>,
    mapper: ExportMapper,
    session: Session,
}

impl<R: SourceReader, C: Classifier, S: Sleeper> ClassificationEngine<R, C, S> {
    pub fn new(reader: R, source_name: impl Into<String>, orchestrator: PipelineOrchestrator<C, S>) -> Self {
        Self {
            reader,
            source_name: source_name.into(),
            orchestrator,
            matcher: Box::new(AliasMatcher::default()),
            mapper: ExportMapper::default(),
            session: Session::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: impl ColumnMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn with_mapper(mut self, mapper: ExportMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn list_sheets(&self) -> Result<Vec<String>> {
        self.reader.list_sheets()
    }

    /// Selects the first sheet, if the workbook has any.
    pub fn open(&mut self) -> Result<Option<String>> {
        let first = self.reader.list_sheets()?.into_iter().next();
        if let Some(sheet) = &first {
            self.select_sheet(sheet)?;
        }
        Ok(first)
    }

    /// Switching sheets re-reads the headers and drops the column selection.
    pub fn select_sheet(&mut self, sheet: &str) -> Result<&[String]> {
        let headers = self.reader.read_header_row(sheet)?;
        self.reset();
        self.session.sheet = Some(sheet.to_string());
        self.session.headers = headers;
        tracing::info!("📄 Sheet '{}' has {} columns", sheet, self.session.headers.len());
        Ok(&self.session.headers)
    }

    /// Creates one record per data row for `column` and resets any previous results.
    pub fn select_column(&mut self, column: &str) -> Result<usize> {
        let sheet = validate_required_field("sheet", &self.session.sheet)?.clone();
        if !self.session.headers.iter().any(|h| h == column) {
            return Err(ClassifyError::InvalidConfigValueError {
                field: "column".to_string(),
                value: column.to_string(),
                reason: format!("Sheet '{}' has no such column", sheet),
            });
        }

        let rows = self.reader.read_rows(&sheet)?;
        let records = records_from_rows(rows, column);
        self.orchestrator.reset();
        self.session.view = ViewEngine::new(SemanticColumns::detect(
            &self.session.headers,
            &*self.matcher,
        ));
        self.session.column = Some(column.to_string());
        self.session.rows = aggregator::merge(&records, &[]);
        self.session.records = records;
        self.session.filters.clear();
        self.session.sort = SortSpec::default();

        tracing::info!(
            "📋 Column '{}' selected: {} records",
            column,
            self.session.records.len()
        );
        Ok(self.session.records.len())
    }

    pub fn headers(&self) -> &[String] {
        &self.session.headers
    }

    pub fn records(&self) -> &[Record] {
        &self.session.records
    }

    pub fn rows(&self) -> &[CategorizedRow] {
        &self.session.rows
    }

    pub fn semantic_columns(&self) -> &SemanticColumns {
        self.session.view.columns()
    }

    /// Snapshots carry raw results while a run is in progress; use
    /// [`PipelineSnapshot::merged`] with [`Self::records`] for the rows at that point.
    /// [`Self::rows`] is refreshed once the run ends.
    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.orchestrator.subscribe()
    }

    /// Runs the pipeline over the selected column and refreshes the merged rows,
    /// including after an aborted run.
    pub async fn classify(&mut self) -> Result<RunSummary> {
        validate_required_field("sheet", &self.session.sheet)?;
        let column = validate_required_field("column", &self.session.column)?.clone();

        let outcome = self.orchestrator.run(&column, &self.session.records).await;
        self.session.rows = aggregator::merge(
            &self.session.records,
            self.orchestrator.context().results(),
        );
        self.session.filters.clear();
        outcome
    }

    pub fn errors(&self) -> &[String] {
        self.orchestrator.context().errors()
    }

    pub fn filters(&self) -> &FilterState {
        &self.session.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterState {
        &mut self.session.filters
    }

    pub fn set_filters(&mut self, filters: FilterState) {
        self.session.filters = filters;
    }

    pub fn sort(&self) -> &SortSpec {
        &self.session.sort
    }

    pub fn set_sort(&mut self, sort: SortSpec) {
        self.session.sort = sort;
    }

    /// Normalized categories present in the current rows.
    pub fn available_categories(&self) -> BTreeSet<String> {
        self.session
            .rows
            .iter()
            .filter(|row| row.is_classified())
            .map(|row| normalize_category(&row.category))
            .collect()
    }

    /// Distinct region values, empty when no region column was detected.
    pub fn available_regions(&self) -> BTreeSet<String> {
        let Some(column) = &self.semantic_columns().region else {
            return BTreeSet::new();
        };
        self.session
            .rows
            .iter()
            .filter_map(|row| row.raw_row.get(column))
            .map(|cell| cell_text(cell).trim().to_string())
            .filter(|region| !region.is_empty())
            .collect()
    }

    pub fn view(&self) -> Vec<&CategorizedRow> {
        self.session
            .view
            .view(&self.session.rows, &self.session.filters, &self.session.sort)
    }

    pub fn export_table(&self) -> Result<ExportTable> {
        let sheet = validate_required_field("sheet", &self.session.sheet)?;
        let column = validate_required_field("column", &self.session.column)?;
        let links = CellLinks::collect(&self.reader, sheet, column, self.session.records.len())?;
        tracing::debug!("{} hyperlinks found in column '{}'", links.len(), column);
        let visible = self.view();

        Ok(self.mapper.project(
            &format!("categorized_{}", self.source_name),
            &self.session.headers,
            column,
            &visible,
            &links,
        ))
    }

    pub async fn export<W: TableWriter>(&self, writer: &W) -> Result<String> {
        let table = self.export_table()?;
        tracing::info!("💾 Exporting {} rows as '{}'", table.len(), table.name);
        writer.write_table(&table).await
    }

    /// Forgets the selection, records, results, filters and progress.
    pub fn reset(&mut self) {
        self.session = Session::default();
        self.orchestrator.reset();
    }
}
