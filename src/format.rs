use crate::fields::{FieldDescriptor, FieldKind};
use crate::normalize::NormalizedValue;

/// Text shown for anything that has no value.
pub const PLACEHOLDER: &str = "–";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Negative,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayValue {
    pub text: String,
    pub sentiment: Sentiment,
}

impl DisplayValue {
    fn plain(text: String) -> Self {
        DisplayValue {
            text,
            sentiment: Sentiment::None,
        }
    }

    pub fn placeholder() -> Self {
        DisplayValue::plain(PLACEHOLDER.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    PtBr,
    EnUs,
    DeDe,
}

impl Locale {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().replace('_', "-").as_str() {
            "pt-br" | "pt" => Some(Locale::PtBr),
            "en-us" | "en" => Some(Locale::EnUs),
            "de-de" | "de" => Some(Locale::DeDe),
            _ => None,
        }
    }

    fn decimal_separator(self) -> char {
        match self {
            Locale::EnUs => '.',
            Locale::PtBr | Locale::DeDe => ',',
        }
    }

    fn group_separator(self) -> char {
        match self {
            Locale::EnUs => ',',
            Locale::PtBr | Locale::DeDe => '.',
        }
    }

    pub fn date_format(self) -> &'static str {
        match self {
            Locale::PtBr => "%d/%m/%Y",
            Locale::EnUs => "%m/%d/%Y",
            Locale::DeDe => "%d.%m.%Y",
        }
    }
}

fn currency_symbol(code: &str) -> &str {
    match code {
        "BRL" => "R$",
        "USD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        other => other,
    }
}

fn group_digits(integer: &str, separator: char) -> String {
    let len = integer.len();
    let mut grouped = String::with_capacity(len + len / 3);
    for (i, c) in integer.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(c);
    }
    grouped
}

/// Turns normalized values into locale-formatted display strings.
#[derive(Debug, Clone)]
pub struct FieldFormatter {
    locale: Locale,
    currency: String,
}

impl FieldFormatter {
    pub fn new(locale: Locale, currency: &str) -> Self {
        FieldFormatter {
            locale,
            currency: currency.trim().to_uppercase(),
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn format(&self, value: NormalizedValue, field: &FieldDescriptor) -> DisplayValue {
        let x = match value {
            NormalizedValue::Absent => return DisplayValue::placeholder(),
            // -0.0 prints as "-0.00"
            NormalizedValue::Number(x) if x == 0.0 => 0.0,
            NormalizedValue::Number(x) => x,
        };

        let text = match field.kind {
            FieldKind::Identifier => format!("{x}"),
            FieldKind::Currency => self.currency_text(x),
            FieldKind::PercentageFraction => format!("{:.2}%", x * 100.0),
            FieldKind::PercentageRatio => format!("{x:.2}%"),
            FieldKind::PlainRatio => format!("{x:.2}"),
        };

        let sentiment = if !field.sentiment_eligible {
            Sentiment::None
        } else if x > 0.0 {
            Sentiment::Positive
        } else if x < 0.0 {
            Sentiment::Negative
        } else {
            Sentiment::None
        };

        DisplayValue { text, sentiment }
    }

    pub fn format_identifier(&self, raw: Option<&str>) -> DisplayValue {
        match raw {
            Some(s) if !s.trim().is_empty() => DisplayValue::plain(s.to_string()),
            _ => DisplayValue::placeholder(),
        }
    }

    /// Currency string with grouping and exactly two fraction digits.
    pub fn currency_text(&self, value: f64) -> String {
        let fixed = format!("{:.2}", value.abs());
        let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
        let number = format!(
            "{}{}{}",
            group_digits(integer, self.locale.group_separator()),
            self.locale.decimal_separator(),
            fraction
        );

        let symbol = currency_symbol(&self.currency);
        let body = match self.locale {
            Locale::PtBr => format!("{symbol} {number}"),
            Locale::EnUs if symbol.len() > 1 && symbol == self.currency => {
                format!("{symbol} {number}")
            }
            Locale::EnUs => format!("{symbol}{number}"),
            Locale::DeDe => format!("{number} {symbol}"),
        };

        if value < 0.0 {
            format!("-{body}")
        } else {
            body
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{field, FIELDS};

    fn pt_br() -> FieldFormatter {
        FieldFormatter::new(Locale::PtBr, "BRL")
    }

    fn key(k: &str) -> &'static FieldDescriptor {
        field(k).unwrap()
    }

    #[test]
    fn test_absent_is_placeholder_for_every_field() {
        let f = pt_br();
        for descriptor in FIELDS.iter() {
            let shown = f.format(NormalizedValue::Absent, descriptor);
            assert_eq!(shown.text, "–");
            assert_eq!(shown.sentiment, Sentiment::None);
        }
    }

    #[test]
    fn test_fraction_percentage_is_rescaled() {
        let shown = pt_br().format(NormalizedValue::Number(0.0532), key("dy"));
        assert_eq!(shown.text, "5.32%");
    }

    #[test]
    fn test_ratio_percentage_is_not_rescaled() {
        let shown = pt_br().format(NormalizedValue::Number(12.3), key("Margem Graham %"));
        assert_eq!(shown.text, "12.30%");
    }

    #[test]
    fn test_plain_ratio() {
        let shown = pt_br().format(NormalizedValue::Number(7.456), key("pl"));
        assert_eq!(shown.text, "7.46");
        assert_eq!(shown.sentiment, Sentiment::None);
    }

    #[test]
    fn test_margin_sentiment() {
        let f = pt_br();
        let margin = key("Margem Barsi %");
        assert_eq!(
            f.format(NormalizedValue::Number(-0.01), margin).sentiment,
            Sentiment::Negative
        );
        assert_eq!(
            f.format(NormalizedValue::Number(3.2), margin).sentiment,
            Sentiment::Positive
        );
        assert_eq!(
            f.format(NormalizedValue::Number(0.0), margin).sentiment,
            Sentiment::None
        );
        assert_eq!(f.format(NormalizedValue::Absent, margin).sentiment, Sentiment::None);
    }

    #[test]
    fn test_non_margin_fields_never_carry_sentiment() {
        let f = pt_br();
        for k in ["cotacao", "dy", "pl", "Preço Teto (6%)"] {
            assert_eq!(
                f.format(NormalizedValue::Number(-5.0), key(k)).sentiment,
                Sentiment::None,
                "{k}"
            );
        }
    }

    #[test]
    fn test_negative_zero_prints_unsigned() {
        let f = pt_br();
        let zero = crate::normalize::parse_decimal("-0");
        assert_eq!(f.format(zero, key("pl")).text, "0.00");
        assert_eq!(f.format(zero, key("Margem Graham %")).text, "0.00%");
        assert_eq!(f.format(zero, key("dy")).text, "0.00%");
        assert_eq!(f.format(zero, key("cotacao")).text, "R$ 0,00");
    }

    #[test]
    fn test_identifier_is_shown_raw() {
        let f = pt_br();
        assert_eq!(f.format_identifier(Some(" itub4 ")).text, " itub4 ");
        assert_eq!(f.format_identifier(Some("   ")).text, PLACEHOLDER);
        assert_eq!(f.format_identifier(None).text, PLACEHOLDER);
    }

    #[test]
    fn test_brl_currency() {
        let shown = pt_br().format(NormalizedValue::Number(1234.5), key("cotacao"));
        assert_eq!(shown.text, "R$ 1.234,50");
    }

    #[test]
    fn test_currency_grouping_and_sign() {
        let f = pt_br();
        assert_eq!(f.currency_text(0.5), "R$ 0,50");
        assert_eq!(f.currency_text(999.999), "R$ 1.000,00");
        assert_eq!(f.currency_text(1234567.891), "R$ 1.234.567,89");
        assert_eq!(f.currency_text(-42.1), "-R$ 42,10");
    }

    #[test]
    fn test_other_locales() {
        let us = FieldFormatter::new(Locale::EnUs, "usd");
        assert_eq!(us.currency_text(1234.5), "$1,234.50");
        let us_brl = FieldFormatter::new(Locale::EnUs, "BRL");
        assert_eq!(us_brl.currency_text(1234.5), "R$1,234.50");
        let us_chf = FieldFormatter::new(Locale::EnUs, "CHF");
        assert_eq!(us_chf.currency_text(10.0), "CHF 10.00");
        let de = FieldFormatter::new(Locale::DeDe, "EUR");
        assert_eq!(de.currency_text(1234.5), "1.234,50 €");
    }

    #[test]
    fn test_identifier() {
        let f = pt_br();
        assert_eq!(f.format_identifier(Some("PETR4")).text, "PETR4");
        assert_eq!(f.format_identifier(Some("")).text, PLACEHOLDER);
        assert_eq!(f.format_identifier(None).text, PLACEHOLDER);
    }

    #[test]
    fn test_locale_tags() {
        assert_eq!(Locale::from_tag("pt-BR"), Some(Locale::PtBr));
        assert_eq!(Locale::from_tag("en_US"), Some(Locale::EnUs));
        assert_eq!(Locale::from_tag("DE-de"), Some(Locale::DeDe));
        assert_eq!(Locale::from_tag("fr-FR"), None);
    }

    #[test]
    fn test_group_digits() {
        assert_eq!(group_digits("1", '.'), "1");
        assert_eq!(group_digits("123", '.'), "123");
        assert_eq!(group_digits("1234", '.'), "1.234");
        assert_eq!(group_digits("123456", ','), "123,456");
    }
}
