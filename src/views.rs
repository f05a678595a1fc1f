//! Presentation structures derived from the selection state. Nothing here
//! keeps state of its own; every view is rebuilt in full on each change.

use crate::api::Row;
use crate::coordinator::LoadedHistory;
use crate::fields::{self, FieldDescriptor, FieldKind, FIELDS};
use crate::format::{DisplayValue, FieldFormatter};
use crate::state::SelectionState;
use chrono::NaiveDate;

pub fn display_field(row: &Row, field: &FieldDescriptor, formatter: &FieldFormatter) -> DisplayValue {
    match field.kind {
        FieldKind::Identifier => formatter.format_identifier(row.ticker()),
        _ => formatter.format(row.value(field.key), field),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub ticker: String,
    pub cells: Vec<DisplayValue>,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    pub headers: Vec<&'static str>,
    pub rows: Vec<TableRow>,
}

impl TableView {
    /// Columns follow the descriptor list, rows follow fetch order.
    pub fn project(state: &SelectionState, formatter: &FieldFormatter) -> Self {
        let selected = state.selected_ticker();
        let rows = state
            .rows()
            .iter()
            .filter_map(|row| {
                let ticker = row.ticker()?;
                Some(TableRow {
                    ticker: ticker.to_string(),
                    cells: FIELDS
                        .iter()
                        .map(|f| display_field(row, f, formatter))
                        .collect(),
                    selected: selected == Some(ticker),
                })
            })
            .collect();

        TableView {
            headers: FIELDS.iter().map(|f| f.label).collect(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailEntry {
    pub label: &'static str,
    pub value: DisplayValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailView {
    pub ticker: String,
    pub entries: Vec<DetailEntry>,
}

impl DetailView {
    /// `None` when nothing is selected or the selection has no row.
    pub fn project(state: &SelectionState, formatter: &FieldFormatter) -> Option<Self> {
        let row = state.selected_row()?;
        let ticker = row.ticker()?.to_string();
        let entries = FIELDS
            .iter()
            .map(|f| DetailEntry {
                label: f.label,
                value: display_field(row, f, formatter),
            })
            .collect();
        Some(DetailView { ticker, entries })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    fn from_values(name: String, values: &[Option<f64>]) -> Self {
        let points = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| (*v).filter(|y| y.is_finite()).map(|y| (i as f64, y)))
            .collect();
        Series { name, points }
    }

    pub fn last(&self) -> Option<f64> {
        self.points.last().map(|(_, y)| *y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartView {
    pub ticker: String,
    pub price: Series,
    pub overlay: Option<Series>,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub x_labels: Vec<String>,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
}

fn format_date(raw: &str, formatter: &FieldFormatter) -> String {
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => date.format(formatter.locale().date_format()).to_string(),
        Err(_) => raw.to_string(),
    }
}

impl ChartView {
    /// Only history for the current ticker and indicator is shown.
    pub fn project(
        state: &SelectionState,
        loaded: Option<&LoadedHistory>,
        formatter: &FieldFormatter,
    ) -> Option<Self> {
        let loaded = loaded?;
        if state.selected_ticker() != Some(loaded.ticker.as_str())
            || state.selected_indicator().key != loaded.indicator
        {
            return None;
        }
        let history = &loaded.history;

        let price = Series::from_values("Preço".to_string(), &history.prices);
        let overlay_name = history
            .indicator_name
            .clone()
            .or_else(|| fields::field(loaded.indicator).map(|f| f.label.to_string()))
            .unwrap_or_else(|| loaded.indicator.to_string());
        let overlay = Some(Series::from_values(overlay_name, &history.indicator_series))
            .filter(|s| !s.points.is_empty());

        let len = history.dates.len().max(history.prices.len());
        let x_max = len.saturating_sub(1).max(1) as f64;

        let x_labels = if history.dates.is_empty() {
            Vec::new()
        } else {
            let last = history.dates.len() - 1;
            let mut picks = vec![0, last / 2, last];
            picks.dedup();
            picks
                .into_iter()
                .map(|i| format_date(&history.dates[i], formatter))
                .collect()
        };

        let ys = price
            .points
            .iter()
            .chain(overlay.iter().flat_map(|s| s.points.iter()))
            .map(|(_, y)| *y);
        let (min, max) = ys.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| {
            (lo.min(y), hi.max(y))
        });
        let y_bounds = if !min.is_finite() {
            [0.0, 1.0]
        } else if (max - min).abs() < f64::EPSILON {
            [min - 1.0, max + 1.0]
        } else {
            let pad = (max - min) * 0.05;
            [min - pad, max + pad]
        };

        Some(ChartView {
            ticker: loaded.ticker.clone(),
            price,
            overlay,
            first_date: history.dates.first().map(|d| format_date(d, formatter)),
            last_date: history.dates.last().map(|d| format_date(d, formatter)),
            x_labels,
            x_bounds: [0.0, x_max],
            y_bounds,
        })
    }
}
