//! Derived-column computations.
//!
//! Each function reads the merged per-entity view and returns the raw string
//! stored under the derived column. Missing or unusable inputs produce
//! [`UNAVAILABLE`]; partial upstream data is expected, so nothing here fails.

use crate::codec::{self, ColumnType, FloatParsing};
use crate::domain::MergedView;

/// Stored in place of a derived value whose inputs are not usable.
pub const UNAVAILABLE: &str = "-";

/// Price-to-earnings multiplied by price-to-book, both from the `ratios` table.
///
/// Readers compare the product against 22.5 (the Graham threshold).
pub fn indicator(view: &MergedView) -> String {
    let parsing = view.float_parsing();
    let pe = view
        .get("ratios", "priceToEarnings")
        .and_then(|raw| nonzero_float(raw, parsing));
    let pb = view
        .get("ratios", "priceToBookVal")
        .and_then(|raw| nonzero_float(raw, parsing));

    match (pe, pb) {
        (Some(pe), Some(pb)) => codec::format_fixed(pe * pb, 2),
        _ => UNAVAILABLE.to_string(),
    }
}

/// Decode a stored FLOAT field, treating zero and unparseable text as absent.
pub fn nonzero_float(raw: &str, parsing: FloatParsing) -> Option<f64> {
    codec::decode_with(raw, ColumnType::Float, parsing)
        .ok()
        .and_then(|v| v.as_f64())
        .filter(|v| *v != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Entity;

    fn view_with(fields: &[(&str, &str)]) -> MergedView {
        let mut ratios = Entity::new("ALK");
        for (k, v) in fields {
            ratios.insert(*k, *v);
        }
        let mut view = MergedView::new("ALK");
        view.absorb("ratios", &ratios);
        view
    }

    #[test]
    fn indicator_multiplies_pe_and_pb() {
        let view = view_with(&[("priceToEarnings", "12.5"), ("priceToBookVal", "2.0")]);
        assert_eq!(indicator(&view), "25.00");
    }

    #[test]
    fn indicator_unavailable_when_input_missing() {
        let view = view_with(&[("priceToEarnings", "12.5")]);
        assert_eq!(indicator(&view), UNAVAILABLE);
    }

    #[test]
    fn indicator_unavailable_for_zero_or_text() {
        let view = view_with(&[("priceToEarnings", "0"), ("priceToBookVal", "2.0")]);
        assert_eq!(indicator(&view), UNAVAILABLE);

        let view = view_with(&[("priceToEarnings", "n/a"), ("priceToBookVal", "2.0")]);
        assert_eq!(indicator(&view), UNAVAILABLE);
    }

    #[test]
    fn indicator_ignores_fields_from_other_tables() {
        let mut fin = Entity::new("ALK");
        fin.insert("priceToEarnings", "12.5");
        fin.insert("priceToBookVal", "2.0");
        let mut view = MergedView::new("ALK");
        view.absorb("financials", &fin);
        assert_eq!(indicator(&view), UNAVAILABLE);
    }

    #[test]
    fn indicator_follows_the_view_float_rules() {
        let view = view_with(&[("priceToEarnings", "12.5"), ("priceToBookVal", "2.0")])
            .with_float_parsing(FloatParsing::DigitsOnly);
        assert_eq!(indicator(&view), "2500.00");
    }

    #[test]
    fn indicator_reads_grouped_numbers() {
        let view = view_with(&[("priceToEarnings", "1,000.5"), ("priceToBookVal", "2")]);
        assert_eq!(indicator(&view), "2001.00");
    }
}
