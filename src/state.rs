use crate::api::Row;
use crate::fields::{self, FieldDescriptor};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSource {
    None,
    Manual,
    Portfolio,
    File,
}

/// Issued when a fetch starts; orders responses that come back out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer fetch already landed; the response was dropped.
    Stale,
}

/// The single source of truth the views are projected from.
#[derive(Debug, Clone)]
pub struct SelectionState {
    active_source: ActiveSource,
    tickers: Vec<String>,
    rows: Vec<Row>,
    selected_ticker: Option<String>,
    selected_indicator: &'static FieldDescriptor,
    issued: u64,
    applied: u64,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new(fields::default_indicator())
    }
}

impl SelectionState {
    pub fn new(indicator: &'static FieldDescriptor) -> Self {
        SelectionState {
            active_source: ActiveSource::None,
            tickers: Vec::new(),
            rows: Vec::new(),
            selected_ticker: None,
            selected_indicator: indicator,
            issued: 0,
            applied: 0,
        }
    }

    pub fn active_source(&self) -> ActiveSource {
        self.active_source
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn selected_ticker(&self) -> Option<&str> {
        self.selected_ticker.as_deref()
    }

    pub fn selected_indicator(&self) -> &'static FieldDescriptor {
        self.selected_indicator
    }

    pub fn row(&self, ticker: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.ticker() == Some(ticker))
    }

    pub fn selected_row(&self) -> Option<&Row> {
        self.selected_ticker.as_deref().and_then(|t| self.row(t))
    }

    /// Switches the active source and ticker list, and starts a fetch for it.
    pub fn load(&mut self, source: ActiveSource, tickers: Vec<String>) -> FetchTicket {
        debug!(?source, count = tickers.len(), "loading tickers");
        self.active_source = source;
        self.tickers = tickers;
        self.begin_fetch()
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.issued += 1;
        FetchTicket(self.issued)
    }

    /// Replaces the rows wholesale. Responses older than the last applied
    /// one are dropped so a slow early fetch cannot overwrite a newer one.
    pub fn apply_rows(&mut self, ticket: FetchTicket, rows: Vec<Row>) -> FetchOutcome {
        if ticket.0 < self.applied {
            warn!(
                ticket = ticket.0,
                applied = self.applied,
                "discarding stale fetch response"
            );
            return FetchOutcome::Stale;
        }

        let received = rows.len();
        let rows: Vec<Row> = rows.into_iter().filter(|r| r.ticker().is_some()).collect();
        if rows.len() < received {
            warn!(
                dropped = received - rows.len(),
                "dropping rows without a ticker"
            );
        }

        self.applied = ticket.0;
        self.rows = rows;
        if let Some(selected) = self.selected_ticker.as_deref() {
            if self.row(selected).is_none() {
                debug!(ticker = selected, "selected ticker left the rows");
                self.selected_ticker = None;
            }
        }
        FetchOutcome::Applied
    }

    /// Returns false (and changes nothing) when the ticker is not loaded.
    pub fn select_ticker(&mut self, ticker: &str) -> bool {
        if self.row(ticker).is_none() {
            return false;
        }
        self.selected_ticker = Some(ticker.to_string());
        true
    }

    pub fn select_indicator(&mut self, key: &str) -> bool {
        match fields::field(key) {
            Some(field) => {
                self.selected_indicator = field;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) fn rows_for(tickers: &[&str]) -> Vec<Row> {
    tickers
        .iter()
        .enumerate()
        .map(|(i, t)| {
            serde_json::from_value(serde_json::json!({
                "ticker": t,
                "cotacao": 10.0 + i as f64,
                "Margem Graham %": -1.5,
            }))
            .unwrap()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(tickers: &[&str]) -> SelectionState {
        let mut state = SelectionState::default();
        let ticket = state.load(
            ActiveSource::Manual,
            tickers.iter().map(|t| t.to_string()).collect(),
        );
        state.apply_rows(ticket, rows_for(tickers));
        state
    }

    #[test]
    fn test_initial_state() {
        let state = SelectionState::default();
        assert_eq!(state.active_source(), ActiveSource::None);
        assert!(state.tickers().is_empty());
        assert!(state.rows().is_empty());
        assert_eq!(state.selected_ticker(), None);
        assert_eq!(state.selected_indicator().key, "cotacao");
    }

    #[test]
    fn test_select_unknown_ticker_is_ignored() {
        let mut state = loaded(&["ITUB4", "VALE3"]);
        assert!(state.select_ticker("ITUB4"));
        assert!(!state.select_ticker("PETR4"));
        assert_eq!(state.selected_ticker(), Some("ITUB4"));
    }

    #[test]
    fn test_selection_survives_when_ticker_remains() {
        let mut state = loaded(&["ITUB4", "VALE3"]);
        state.select_ticker("VALE3");
        let ticket = state.load(ActiveSource::Portfolio, vec!["VALE3".to_string()]);
        state.apply_rows(ticket, rows_for(&["VALE3"]));
        assert_eq!(state.selected_ticker(), Some("VALE3"));
    }

    #[test]
    fn test_selection_cleared_when_ticker_leaves() {
        let mut state = loaded(&["ITUB4", "VALE3"]);
        state.select_ticker("ITUB4");
        let ticket = state.load(ActiveSource::Manual, vec!["VALE3".to_string()]);
        // selection only changes once the new rows arrive
        assert_eq!(state.selected_ticker(), Some("ITUB4"));
        state.apply_rows(ticket, rows_for(&["VALE3"]));
        assert_eq!(state.selected_ticker(), None);
    }

    #[test]
    fn test_rows_are_replaced_not_merged() {
        let mut state = loaded(&["ITUB4", "VALE3"]);
        let ticket = state.begin_fetch();
        state.apply_rows(ticket, rows_for(&["PETR4"]));
        let tickers: Vec<_> = state.rows().iter().filter_map(|r| r.ticker()).collect();
        assert_eq!(tickers, vec!["PETR4"]);
    }

    #[test]
    fn test_rows_without_ticker_are_dropped() {
        let mut state = SelectionState::default();
        let ticket = state.begin_fetch();
        let mut rows = rows_for(&["ITUB4"]);
        rows.push(serde_json::from_value(serde_json::json!({"cotacao": 1.0})).unwrap());
        rows.push(serde_json::from_value(serde_json::json!({"ticker": ""})).unwrap());
        state.apply_rows(ticket, rows);
        assert_eq!(state.rows().len(), 1);
    }

    // Overlapping fetches: the response of the older request is discarded
    // when a newer one has already been applied.
    #[test]
    fn test_stale_fetch_response_is_discarded() {
        let mut state = SelectionState::default();
        let first = state.load(ActiveSource::Manual, vec!["ITUB4".to_string()]);
        let second = state.load(ActiveSource::Manual, vec!["VALE3".to_string()]);

        assert_eq!(state.apply_rows(second, rows_for(&["VALE3"])), FetchOutcome::Applied);
        assert_eq!(state.apply_rows(first, rows_for(&["ITUB4"])), FetchOutcome::Stale);
        assert_eq!(state.rows()[0].ticker(), Some("VALE3"));
    }

    #[test]
    fn test_in_order_responses_both_apply() {
        let mut state = SelectionState::default();
        let first = state.begin_fetch();
        let second = state.begin_fetch();
        assert_eq!(state.apply_rows(first, rows_for(&["ITUB4"])), FetchOutcome::Applied);
        assert_eq!(state.apply_rows(second, rows_for(&["VALE3"])), FetchOutcome::Applied);
        assert_eq!(state.rows()[0].ticker(), Some("VALE3"));
    }

    #[test]
    fn test_select_indicator_accepts_known_fields_only() {
        let mut state = SelectionState::default();
        assert!(state.select_indicator("dy"));
        assert!(!state.select_indicator("lpa"));
        assert_eq!(state.selected_indicator().key, "dy");
    }
}
