//! Keeps the three ticker sources mutually exclusive and drives every
//! backend request.
//!
//! Each operation is split into a synchronous `begin_*` half that validates
//! input and mutates the selection state, and a `finish_*` half that applies
//! the response. The TUI runs the request in between on a background task;
//! the `async` helpers at the bottom chain both halves for the CLI.

use crate::api::{Backend, History, PortfolioRegistry, Row};
use crate::error::{ClientResult, InputError};
use crate::fields::FieldDescriptor;
use crate::state::{ActiveSource, FetchOutcome, FetchTicket, SelectionState};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const UPLOAD_EXTENSIONS: [&str; 3] = ["csv", "xls", "xlsx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub kind: StatusKind,
    pub message: String,
}

impl Status {
    fn info(message: impl Into<String>) -> Self {
        Status {
            kind: StatusKind::Info,
            message: message.into(),
        }
    }

    fn success(message: impl Into<String>) -> Self {
        Status {
            kind: StatusKind::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Status {
            kind: StatusKind::Error,
            message: message.into(),
        }
    }
}

/// What the user typed or picked for each source. Only one is ever filled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInputs {
    pub manual: String,
    pub portfolio: Option<String>,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRequest {
    pub ticker: String,
    pub indicator: &'static str,
    pub fallback: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub name: String,
    pub tickers: Vec<String>,
}

/// History as last received, tagged with what it was requested for.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedHistory {
    pub ticker: String,
    pub indicator: &'static str,
    pub history: History,
}

/// Trims, uppercases and deduplicates tickers, keeping first-seen order.
pub fn normalize_tickers<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();
    for token in tokens {
        let ticker = token.trim().to_uppercase();
        if !ticker.is_empty() && !tickers.contains(&ticker) {
            tickers.push(ticker);
        }
    }
    tickers
}

pub fn parse_ticker_list(text: &str) -> Vec<String> {
    normalize_tickers(text.split(','))
}

fn upload_request(path: &str) -> Result<UploadRequest, InputError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(InputError::NoFileSelected);
    }
    let path_buf = PathBuf::from(path);
    let file_name = path_buf
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or(InputError::NoFileSelected)?;
    let supported = Path::new(&file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| UPLOAD_EXTENSIONS.contains(&ext.as_str()));
    if !supported {
        return Err(InputError::UnsupportedFile(file_name));
    }
    Ok(UploadRequest {
        path: path_buf,
        file_name,
    })
}

/// Reads the local file and hands it to the backend for extraction.
pub async fn run_upload<B: Backend>(
    backend: &B,
    request: &UploadRequest,
) -> ClientResult<Vec<String>> {
    let contents = tokio::fs::read(&request.path)
        .await
        .map_err(|source| crate::error::ClientError::File {
            path: request.path.display().to_string(),
            source,
        })?;
    backend.upload(&request.file_name, contents).await
}

pub struct InputCoordinator<B> {
    backend: B,
    state: SelectionState,
    registry: PortfolioRegistry,
    inputs: SourceInputs,
    status: Status,
    history: Option<LoadedHistory>,
}

impl<B> InputCoordinator<B> {
    pub fn new(backend: B, indicator: &'static FieldDescriptor) -> Self {
        InputCoordinator {
            backend,
            state: SelectionState::new(indicator),
            registry: PortfolioRegistry::new(),
            inputs: SourceInputs::default(),
            status: Status::info("Ready"),
            history: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn registry(&self) -> &PortfolioRegistry {
        &self.registry
    }

    pub fn inputs(&self) -> &SourceInputs {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut SourceInputs {
        &mut self.inputs
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn history(&self) -> Option<&LoadedHistory> {
        self.history.as_ref()
    }

    fn report(&mut self, err: InputError) {
        debug!(%err, "input rejected");
        self.status = Status::error(err.to_string());
    }

    fn start_fetch(&mut self, source: ActiveSource, tickers: Vec<String>) -> FetchRequest {
        self.status = Status::info(format!("Loading {} tickers...", tickers.len()));
        let ticket = self.state.load(source, tickers.clone());
        FetchRequest { ticket, tickers }
    }

    pub fn begin_manual(&mut self, text: &str) -> Option<FetchRequest> {
        self.inputs.portfolio = None;
        self.inputs.file.clear();
        self.inputs.manual = text.to_string();

        let tickers = parse_ticker_list(text);
        if tickers.is_empty() {
            self.report(InputError::NoTickers);
            return None;
        }
        Some(self.start_fetch(ActiveSource::Manual, tickers))
    }

    pub fn begin_portfolio(&mut self, name: Option<&str>) -> Option<FetchRequest> {
        self.inputs.manual.clear();
        self.inputs.file.clear();
        self.inputs.portfolio = name.map(str::to_string);

        let Some(name) = name.filter(|n| !n.is_empty()) else {
            self.report(InputError::NoPortfolioSelected);
            return None;
        };
        let Some(tickers) = self.registry.get(name).cloned() else {
            self.report(InputError::UnknownPortfolio(name.to_string()));
            return None;
        };
        // An empty ticker list would make the backend return every ticker
        if tickers.is_empty() {
            self.report(InputError::NoTickers);
            return None;
        }
        Some(self.start_fetch(ActiveSource::Portfolio, tickers))
    }

    pub fn begin_upload(&mut self, path: &str) -> Option<UploadRequest> {
        self.inputs.manual.clear();
        self.inputs.portfolio = None;
        self.inputs.file = path.to_string();

        match upload_request(path) {
            Ok(request) => {
                self.status = Status::info(format!("Uploading {}...", request.file_name));
                Some(request)
            }
            Err(err) => {
                self.report(err);
                None
            }
        }
    }

    pub fn finish_upload(&mut self, result: ClientResult<Vec<String>>) -> Option<FetchRequest> {
        let extracted = match result {
            Ok(extracted) => extracted,
            Err(err) => {
                warn!(%err, "upload failed");
                self.status = Status::error(format!("Upload failed: {err}"));
                return None;
            }
        };

        let tickers = normalize_tickers(extracted.iter().map(String::as_str));
        if tickers.is_empty() {
            self.report(InputError::NoTickersInFile);
            return None;
        }
        info!(count = tickers.len(), "tickers extracted from upload");
        self.inputs.manual = tickers.join(", ");
        let request = self.start_fetch(ActiveSource::File, tickers);
        self.status = Status::info(format!(
            "{} tickers found in the file, loading...",
            request.tickers.len()
        ));
        Some(request)
    }

    pub fn finish_fetch(&mut self, ticket: FetchTicket, result: ClientResult<Vec<Row>>) {
        match result {
            Ok(rows) => {
                if self.state.apply_rows(ticket, rows) == FetchOutcome::Applied {
                    let count = self.state.rows().len();
                    info!(count, "rows loaded");
                    self.status = Status::success(format!("Loaded {count} tickers"));
                }
            }
            Err(err) => {
                warn!(%err, "ticker fetch failed, keeping previous rows");
                self.status = Status::error(format!("Failed to fetch data: {err}"));
            }
        }
    }

    /// Re-fetches the current ticker list without touching the source.
    pub fn begin_refetch(&mut self) -> Option<FetchRequest> {
        if self.state.tickers().is_empty() {
            return None;
        }
        let tickers = self.state.tickers().to_vec();
        self.status = Status::info(format!("Refreshing {} tickers...", tickers.len()));
        let ticket = self.state.begin_fetch();
        Some(FetchRequest { ticket, tickers })
    }

    /// Table selection. Starts a chart load when the ticker is loaded.
    pub fn select_ticker(&mut self, ticker: &str) -> Option<HistoryRequest> {
        if !self.state.select_ticker(ticker) {
            return None;
        }
        self.begin_history()
    }

    pub fn select_indicator(&mut self, key: &str) -> Option<HistoryRequest> {
        if !self.state.select_indicator(key) || self.state.selected_ticker().is_none() {
            return None;
        }
        self.begin_history()
    }

    pub fn begin_history(&mut self) -> Option<HistoryRequest> {
        let Some(ticker) = self.state.selected_ticker().map(str::to_string) else {
            self.report(InputError::NoTickerSelected);
            return None;
        };
        let indicator = self.state.selected_indicator().key;
        let Some(row) = self.state.row(&ticker) else {
            self.report(InputError::TickerNotLoaded(ticker));
            return None;
        };
        let fallback = row.value(indicator).as_number().filter(|x| *x != 0.0);

        self.status = Status::info(format!("Loading chart for {ticker}..."));
        Some(HistoryRequest {
            ticker,
            indicator,
            fallback,
        })
    }

    pub fn finish_history(&mut self, request: HistoryRequest, result: ClientResult<History>) {
        let current = self.state.selected_ticker() == Some(request.ticker.as_str())
            && self.state.selected_indicator().key == request.indicator;
        if !current {
            debug!(ticker = %request.ticker, "discarding history for a previous selection");
            return;
        }
        match result {
            Ok(history) => {
                self.history = Some(LoadedHistory {
                    ticker: request.ticker,
                    indicator: request.indicator,
                    history,
                });
                self.status = Status::success("Ready");
            }
            Err(err) => {
                warn!(%err, ticker = %request.ticker, "history request failed");
                self.status = Status::error(format!("Failed to load chart: {err}"));
            }
        }
    }

    pub fn finish_registry(&mut self, result: ClientResult<PortfolioRegistry>) {
        match result {
            Ok(registry) => {
                debug!(count = registry.len(), "portfolio registry refreshed");
                self.registry = registry;
                if let Some(name) = &self.inputs.portfolio {
                    if !self.registry.contains_key(name) {
                        self.inputs.portfolio = None;
                    }
                }
            }
            Err(err) => {
                warn!(%err, "failed to load portfolios");
                self.status = Status::error(format!("Failed to load portfolios: {err}"));
            }
        }
    }

    /// Saves the tickers of the loaded rows, not the raw input.
    pub fn begin_save(&mut self, name: &str) -> Option<SaveRequest> {
        let name = name.trim();
        if name.is_empty() {
            self.report(InputError::PortfolioNameRequired);
            return None;
        }
        let tickers: Vec<String> = self
            .state
            .rows()
            .iter()
            .filter_map(|r| r.ticker().map(str::to_string))
            .collect();
        if tickers.is_empty() {
            self.report(InputError::NothingLoaded);
            return None;
        }
        Some(SaveRequest {
            name: name.to_string(),
            tickers,
        })
    }

    /// Returns true when the registry should be re-read.
    pub fn finish_save(&mut self, name: &str, result: ClientResult<()>) -> bool {
        match result {
            Ok(()) => {
                info!(name, "portfolio saved");
                self.status = Status::success(format!("Portfolio '{name}' saved"));
                true
            }
            Err(err) => {
                self.status = Status::error(format!("Failed to save '{name}': {err}"));
                false
            }
        }
    }

    pub fn begin_delete(&mut self) -> Option<String> {
        match self.inputs.portfolio.clone().filter(|n| !n.is_empty()) {
            Some(name) => Some(name),
            None => {
                self.report(InputError::NoPortfolioSelected);
                None
            }
        }
    }

    pub fn finish_delete(&mut self, name: &str, result: ClientResult<()>) -> bool {
        match result {
            Ok(()) => {
                info!(name, "portfolio deleted");
                self.status = Status::success(format!("Portfolio '{name}' deleted"));
                true
            }
            Err(err) => {
                self.status = Status::error(format!("Failed to delete '{name}': {err}"));
                false
            }
        }
    }
}

impl<B: Backend> InputCoordinator<B> {
    pub async fn refresh_portfolios(&mut self) {
        let result = self.backend.portfolios().await;
        self.finish_registry(result);
    }

    pub async fn fetch(&mut self, request: FetchRequest) {
        let result = self.backend.tickers(&request.tickers).await;
        self.finish_fetch(request.ticket, result);
    }

    pub async fn load_manual(&mut self, text: &str) {
        if let Some(request) = self.begin_manual(text) {
            self.fetch(request).await;
        }
    }

    pub async fn load_portfolio(&mut self, name: &str) {
        if let Some(request) = self.begin_portfolio(Some(name)) {
            self.fetch(request).await;
        }
    }

    pub async fn load_file(&mut self, path: &str) {
        let Some(upload) = self.begin_upload(path) else {
            return;
        };
        let result = run_upload(&self.backend, &upload).await;
        if let Some(request) = self.finish_upload(result) {
            self.fetch(request).await;
        }
    }

    pub async fn load_history(&mut self, request: HistoryRequest) {
        let result = self
            .backend
            .history(&request.ticker, request.indicator, request.fallback)
            .await;
        self.finish_history(request, result);
    }

    pub async fn select_and_chart(&mut self, ticker: &str) -> Result<(), InputError> {
        if self.state.row(ticker).is_none() {
            let err = InputError::TickerNotLoaded(ticker.to_string());
            self.report(err.clone());
            return Err(err);
        }
        if let Some(request) = self.select_ticker(ticker) {
            self.load_history(request).await;
        }
        Ok(())
    }

    pub async fn save_current(&mut self, name: &str) {
        let Some(request) = self.begin_save(name) else {
            return;
        };
        let result = self
            .backend
            .save_portfolio(&request.name, &request.tickers)
            .await;
        if self.finish_save(&request.name, result) {
            self.refresh_portfolios().await;
        }
    }

    pub async fn delete_portfolio(&mut self, name: &str) {
        self.inputs.portfolio = Some(name.to_string());
        let Some(name) = self.begin_delete() else {
            return;
        };
        let result = self.backend.delete_portfolio(&name).await;
        if self.finish_delete(&name, result) {
            self.refresh_portfolios().await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeBackend;
    use super::*;
    use crate::error::ClientError;
    use crate::fields;
    use crate::state::rows_for;

    fn coordinator(known: &[&str]) -> InputCoordinator<FakeBackend> {
        InputCoordinator::new(
            FakeBackend::with_tickers(known),
            fields::default_indicator(),
        )
    }

    fn loaded_tickers(c: &InputCoordinator<FakeBackend>) -> Vec<&str> {
        c.state().rows().iter().filter_map(|r| r.ticker()).collect()
    }

    fn temp_file(name: &str) -> String {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, "papel\nPETR4\n").unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_parse_ticker_list() {
        assert_eq!(parse_ticker_list("bbas3, petr4, bbas3"), vec!["BBAS3", "PETR4"]);
        assert_eq!(parse_ticker_list(" , ,"), Vec::<String>::new());
        assert_eq!(parse_ticker_list("itub4"), vec!["ITUB4"]);
    }

    #[tokio::test]
    async fn test_manual_load() {
        let mut c = coordinator(&["BBAS3", "PETR4"]);
        c.load_manual("bbas3, petr4, bbas3").await;
        assert_eq!(c.state().active_source(), ActiveSource::Manual);
        assert_eq!(c.state().tickers(), ["BBAS3", "PETR4"]);
        assert_eq!(loaded_tickers(&c), vec!["BBAS3", "PETR4"]);
        assert_eq!(c.status().kind, StatusKind::Success);
    }

    #[tokio::test]
    async fn test_empty_manual_text_changes_nothing() {
        let mut c = coordinator(&["PETR4"]);
        c.load_manual("petr4").await;
        c.load_manual("  ,  ").await;
        assert_eq!(c.state().tickers(), ["PETR4"]);
        assert_eq!(loaded_tickers(&c), vec!["PETR4"]);
        assert_eq!(c.status().kind, StatusKind::Error);
        assert_eq!(c.status().message, InputError::NoTickers.to_string());
    }

    #[tokio::test]
    async fn test_unknown_portfolio_is_reported() {
        let mut c = coordinator(&["PETR4"]);
        c.load_portfolio("Inexistente").await;
        assert_eq!(c.state().active_source(), ActiveSource::None);
        assert_eq!(c.status().message, "Unknown portfolio: Inexistente");
    }

    #[test]
    fn test_no_portfolio_selected() {
        let mut c = coordinator(&[]);
        assert!(c.begin_portfolio(None).is_none());
        assert_eq!(c.status().message, InputError::NoPortfolioSelected.to_string());
    }

    #[tokio::test]
    async fn test_loading_a_source_clears_the_other_inputs() {
        let mut c = coordinator(&["ITUB4", "VALE3"]);
        c.backend()
            .registry
            .lock()
            .unwrap()
            .insert("Bancos".to_string(), vec!["ITUB4".to_string()]);
        c.refresh_portfolios().await;

        c.inputs_mut().file = "old.csv".to_string();
        c.load_manual("vale3").await;
        assert_eq!(c.inputs().file, "");
        assert_eq!(c.inputs().portfolio, None);

        c.load_portfolio("Bancos").await;
        assert_eq!(c.inputs().manual, "");
        assert_eq!(c.inputs().portfolio.as_deref(), Some("Bancos"));
        assert_eq!(c.state().active_source(), ActiveSource::Portfolio);
    }

    #[tokio::test]
    async fn test_switching_source_clears_missing_selection() {
        let mut c = coordinator(&["ITUB4", "VALE3"]);
        c.backend().registry.lock().unwrap().insert(
            "Minha Carteira".to_string(),
            vec!["ITUB4".to_string(), "VALE3".to_string()],
        );
        c.refresh_portfolios().await;

        c.load_portfolio("Minha Carteira").await;
        assert_eq!(loaded_tickers(&c), vec!["ITUB4", "VALE3"]);
        c.select_and_chart("ITUB4").await.unwrap();
        assert_eq!(c.state().selected_ticker(), Some("ITUB4"));

        c.load_manual("vale3").await;
        assert_eq!(loaded_tickers(&c), vec!["VALE3"]);
        assert_eq!(c.state().selected_ticker(), None);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_last_good_rows() {
        let mut c = coordinator(&["ITUB4", "VALE3"]);
        c.load_manual("itub4, vale3").await;
        c.select_and_chart("VALE3").await.unwrap();
        let rows_before = c.state().rows().to_vec();

        c.backend().set_failing(true);
        c.load_manual("petr4").await;
        assert_eq!(c.state().rows(), rows_before.as_slice());
        assert_eq!(c.state().selected_ticker(), Some("VALE3"));
        assert_eq!(c.status().kind, StatusKind::Error);
    }

    #[tokio::test]
    async fn test_selecting_unloaded_ticker_is_rejected() {
        let mut c = coordinator(&["ITUB4"]);
        c.load_manual("itub4").await;
        c.select_and_chart("ITUB4").await.unwrap();
        let err = c.select_and_chart("PETR4").await.unwrap_err();
        assert_eq!(err, InputError::TickerNotLoaded("PETR4".to_string()));
        assert_eq!(c.state().selected_ticker(), Some("ITUB4"));
    }

    #[tokio::test]
    async fn test_history_forwards_non_zero_fallback() {
        let mut c = coordinator(&["ITUB4"]);
        c.load_manual("itub4").await;
        c.select_and_chart("ITUB4").await.unwrap();

        let calls = c.backend().history_calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![("ITUB4".to_string(), "cotacao".to_string(), Some(10.0))]
        );
        let loaded = c.history().unwrap();
        assert_eq!(loaded.ticker, "ITUB4");
        assert_eq!(loaded.indicator, "cotacao");
    }

    #[tokio::test]
    async fn test_history_skips_absent_fallback() {
        let mut c = coordinator(&["ITUB4"]);
        c.load_manual("itub4").await;
        c.select_ticker("ITUB4");
        let request = c.select_indicator("dy").unwrap();
        assert_eq!(request.indicator, "dy");
        assert_eq!(request.fallback, None);
    }

    #[test]
    fn test_history_skips_zero_fallback() {
        let mut c = coordinator(&[]);
        let ticket = c.begin_manual("ZERO3").unwrap().ticket;
        let row = serde_json::from_value(serde_json::json!({"ticker": "ZERO3", "cotacao": "0,0"}))
            .unwrap();
        c.finish_fetch(ticket, Ok(vec![row]));
        let request = c.select_ticker("ZERO3").unwrap();
        assert_eq!(request.fallback, None);
    }

    #[test]
    fn test_history_for_previous_selection_is_dropped() {
        let mut c = coordinator(&[]);
        let ticket = c.begin_manual("itub4, vale3").unwrap().ticket;
        c.finish_fetch(ticket, Ok(rows_for(&["ITUB4", "VALE3"])));

        let stale = c.select_ticker("ITUB4").unwrap();
        c.select_ticker("VALE3").unwrap();
        let history = History {
            dates: vec!["2024-01-02".to_string()],
            prices: vec![Some(1.0)],
            indicator_series: Vec::new(),
            indicator_name: None,
        };
        c.finish_history(stale, Ok(history));
        assert!(c.history().is_none());
    }

    #[test]
    fn test_begin_history_without_selection() {
        let mut c = coordinator(&[]);
        assert!(c.begin_history().is_none());
        assert_eq!(c.status().message, InputError::NoTickerSelected.to_string());
    }

    #[tokio::test]
    async fn test_file_load_uses_extracted_tickers() {
        let mut backend = FakeBackend::with_tickers(&["PETR4", "BBAS3"]);
        backend.extracted = vec!["petr4".to_string(), "BBAS3".to_string(), "PETR4".to_string()];
        let mut c = InputCoordinator::new(backend, fields::default_indicator());
        c.inputs_mut().manual = "vale3".to_string();

        c.load_file(&temp_file("fundamentus_dash_upload.csv")).await;
        assert_eq!(c.state().active_source(), ActiveSource::File);
        assert_eq!(c.state().tickers(), ["PETR4", "BBAS3"]);
        assert_eq!(c.inputs().manual, "PETR4, BBAS3");
        assert_eq!(loaded_tickers(&c), vec!["PETR4", "BBAS3"]);
    }

    #[tokio::test]
    async fn test_empty_extraction_changes_nothing() {
        let mut c = coordinator(&["PETR4"]);
        c.load_manual("petr4").await;
        c.load_file(&temp_file("fundamentus_dash_empty.xlsx")).await;
        assert_eq!(c.state().active_source(), ActiveSource::Manual);
        assert_eq!(c.state().tickers(), ["PETR4"]);
        assert_eq!(c.status().message, InputError::NoTickersInFile.to_string());
    }

    #[tokio::test]
    async fn test_missing_or_unsupported_file() {
        let mut c = coordinator(&[]);
        c.load_file("   ").await;
        assert_eq!(c.status().message, InputError::NoFileSelected.to_string());

        c.load_file("notes.txt").await;
        assert_eq!(
            c.status().message,
            InputError::UnsupportedFile("notes.txt".to_string()).to_string()
        );

        c.load_file("/definitely/not/here.CSV").await;
        assert_eq!(c.status().kind, StatusKind::Error);
        assert!(c.status().message.contains("could not read"));
        assert_eq!(c.state().active_source(), ActiveSource::None);
    }

    #[tokio::test]
    async fn test_save_uses_loaded_rows() {
        let mut c = coordinator(&["ITUB4"]);
        c.load_manual("itub4, xxxx3").await;
        c.save_current("  Bancos ").await;
        assert_eq!(c.registry()["Bancos"], vec!["ITUB4"]);
        assert_eq!(c.status().message, "Portfolio 'Bancos' saved");
    }

    #[tokio::test]
    async fn test_save_requires_name_and_rows() {
        let mut c = coordinator(&["ITUB4"]);
        c.save_current("Bancos").await;
        assert_eq!(c.status().message, InputError::NothingLoaded.to_string());
        c.load_manual("itub4").await;
        c.save_current(" ").await;
        assert_eq!(c.status().message, InputError::PortfolioNameRequired.to_string());
        assert!(c.registry().is_empty());
    }

    #[tokio::test]
    async fn test_delete_refreshes_registry() {
        let mut c = coordinator(&["ITUB4"]);
        c.backend()
            .registry
            .lock()
            .unwrap()
            .insert("Bancos".to_string(), vec!["ITUB4".to_string()]);
        c.refresh_portfolios().await;
        assert!(c.registry().contains_key("Bancos"));

        c.delete_portfolio("Bancos").await;
        assert!(c.registry().is_empty());
        assert_eq!(c.inputs().portfolio, None);

        c.delete_portfolio("Bancos").await;
        assert_eq!(c.status().kind, StatusKind::Error);
    }

    #[tokio::test]
    async fn test_registry_failure_keeps_cache() {
        let mut c = coordinator(&[]);
        c.backend()
            .registry
            .lock()
            .unwrap()
            .insert("Bancos".to_string(), vec!["ITUB4".to_string()]);
        c.refresh_portfolios().await;
        c.backend().set_failing(true);
        c.refresh_portfolios().await;
        assert!(c.registry().contains_key("Bancos"));
        assert_eq!(c.status().kind, StatusKind::Error);
    }

    #[test]
    fn test_empty_portfolio_starts_no_fetch() {
        let mut c = coordinator(&["ITUB4"]);
        c.finish_registry(Ok(PortfolioRegistry::from([("Vazia".to_string(), Vec::new())])));
        assert!(c.begin_portfolio(Some("Vazia")).is_none());
        assert_eq!(c.state().active_source(), ActiveSource::None);
        assert!(c.state().tickers().is_empty());
        assert_eq!(c.status().message, InputError::NoTickers.to_string());
    }

    #[test]
    fn test_failed_history_for_previous_selection_keeps_status() {
        let mut c = coordinator(&[]);
        let ticket = c.begin_manual("itub4, vale3").unwrap().ticket;
        c.finish_fetch(ticket, Ok(rows_for(&["ITUB4", "VALE3"])));

        let stale = c.select_ticker("ITUB4").unwrap();
        c.select_ticker("VALE3").unwrap();
        let before = c.status().clone();
        c.finish_history(
            stale,
            Err(ClientError::Status {
                status: 500,
                detail: "boom".to_string(),
            }),
        );
        assert_eq!(c.status(), &before);
        assert_ne!(c.status().kind, StatusKind::Error);
    }

    #[test]
    fn test_portfolio_tickers_are_copied() {
        let mut c = coordinator(&[]);
        c.finish_registry(Ok(PortfolioRegistry::from([(
            "Bancos".to_string(),
            vec!["ITUB4".to_string()],
        )])));
        let request = c.begin_portfolio(Some("Bancos")).unwrap();
        c.finish_registry(Ok(PortfolioRegistry::new()));
        assert_eq!(request.tickers, vec!["ITUB4"]);
        assert_eq!(c.state().tickers(), ["ITUB4"]);
    }
}
