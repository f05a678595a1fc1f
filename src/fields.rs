use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Key of the identifier field every row carries.
pub const TICKER_KEY: &str = "ticker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Identifier,
    Currency,
    /// Already a percentage number (12.3 means 12.3%).
    PercentageRatio,
    /// A fraction rendered as a percentage (0.0532 means 5.32%).
    PercentageFraction,
    PlainRatio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    /// Margin/spread fields get a positive/negative sentiment.
    pub sentiment_eligible: bool,
}

impl FieldDescriptor {
    const fn new(key: &'static str, label: &'static str, kind: FieldKind) -> Self {
        FieldDescriptor {
            key,
            label,
            kind,
            sentiment_eligible: false,
        }
    }

    const fn margin(key: &'static str, label: &'static str) -> Self {
        FieldDescriptor {
            key,
            label,
            kind: FieldKind::PercentageRatio,
            sentiment_eligible: true,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind != FieldKind::Identifier
    }
}

// Column and detail order.
pub const FIELDS: [FieldDescriptor; 12] = [
    FieldDescriptor::new(TICKER_KEY, "Ativo", FieldKind::Identifier),
    FieldDescriptor::new("cotacao", "Preço", FieldKind::Currency),
    FieldDescriptor::new("Preço Justo (Graham)", "Graham", FieldKind::Currency),
    FieldDescriptor::margin("Margem Graham %", "Mg. Graham %"),
    FieldDescriptor::new("Preço Teto (6%)", "Teto (6%)", FieldKind::Currency),
    FieldDescriptor::margin("Margem Barsi %", "Mg. Barsi %"),
    FieldDescriptor::new("dy", "DY", FieldKind::PercentageFraction),
    FieldDescriptor::new("pl", "P/L", FieldKind::PlainRatio),
    FieldDescriptor::new("pvp", "P/VP", FieldKind::PlainRatio),
    FieldDescriptor::new("c5y", "Cres", FieldKind::PlainRatio),
    FieldDescriptor::new("ev_ebitda", "EV/EBITDA", FieldKind::PlainRatio),
    FieldDescriptor::new("return_on_equity", "ROE", FieldKind::PlainRatio),
];

static FIELD_INDEX: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    FIELDS
        .iter()
        .enumerate()
        .map(|(i, field)| (field.key, i))
        .collect()
});

pub fn field(key: &str) -> Option<&'static FieldDescriptor> {
    FIELD_INDEX.get(key).map(|&i| &FIELDS[i])
}

/// Fields that can be overlaid on the price chart.
pub fn indicators() -> impl Iterator<Item = &'static FieldDescriptor> {
    FIELDS.iter().filter(|f| f.is_numeric())
}

/// The first numeric field after the identifier.
pub fn default_indicator() -> &'static FieldDescriptor {
    FIELDS
        .iter()
        .find(|f| f.is_numeric())
        .unwrap_or(&FIELDS[0])
}

/// Resolves a configured indicator key, falling back to the default one.
pub fn clamp_indicator(key: &str) -> &'static FieldDescriptor {
    field(key).unwrap_or_else(default_indicator)
}

/// Next indicator in descriptor order, wrapping around.
pub fn cycle_indicator(current: &str, forward: bool) -> &'static FieldDescriptor {
    let options: Vec<&'static FieldDescriptor> = indicators().collect();
    let pos = options.iter().position(|f| f.key == current);
    let next = match (pos, forward) {
        (None, _) => 0,
        (Some(i), true) => (i + 1) % options.len(),
        (Some(i), false) => (i + options.len() - 1) % options.len(),
    };
    options[next]
}
