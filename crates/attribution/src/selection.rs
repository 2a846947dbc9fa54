//! Eligibility predicates and best-match selection over a visitor pool.

use std::sync::Arc;

use funnel_core::types::{MatchResult, SaleRecord, VisitorRecord};

use crate::scoring::{match_sale_with_visitor, ScoringWeights};

/// A visitor paired with the winning score for a sale.
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    pub visitor: Arc<VisitorRecord>,
    pub result: MatchResult,
}

/// Sales need a purchase date, approved status, buyer city and country.
///
/// An unparsable date still passes; scoring reports it as invalid.
pub fn is_valid_sale(sale: &SaleRecord) -> bool {
    !sale.purchase_time_raw.trim().is_empty()
        && sale.status.is_approved()
        && sale.buyer.address.city.is_some()
        && sale.buyer.address.country.is_some()
}

/// Visitors need city, ISO country code and IP to be considered.
pub fn is_valid_visitor(visitor: &VisitorRecord) -> bool {
    visitor.geo.city.is_some() && visitor.geo.country_code.is_some() && visitor.geo.ip.is_some()
}

/// Global maximum over matched pairs; the first visitor wins on exact ties.
///
/// Returns `None` for an ineligible sale or when nothing clears the
/// threshold. Scans the whole pool with no pre-filtering.
pub fn find_best_match(
    sale: &SaleRecord,
    pool: &[Arc<VisitorRecord>],
    weights: &ScoringWeights,
) -> Option<BestMatch> {
    if !is_valid_sale(sale) {
        return None;
    }

    let mut best: Option<BestMatch> = None;
    let mut scored = 0u64;
    for visitor in pool.iter().filter(|v| is_valid_visitor(v)) {
        let result = match_sale_with_visitor(sale, visitor, weights);
        scored += 1;
        if !result.matched {
            continue;
        }
        let better = best
            .as_ref()
            .map_or(true, |b| result.confidence > b.result.confidence);
        if better {
            best = Some(BestMatch {
                visitor: Arc::clone(visitor),
                result,
            });
        }
    }
    metrics::counter!("attribution.pairs_scored").increment(scored);
    best
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::scoring::tests::{base_time, sale, visitor};
    use chrono::Duration;
    use funnel_core::types::SaleStatus;

    fn pool(visitors: Vec<VisitorRecord>) -> Vec<Arc<VisitorRecord>> {
        visitors.into_iter().map(Arc::new).collect()
    }

    fn recife_sale() -> SaleRecord {
        sale(
            Some(base_time()),
            Some("Recife"),
            Some("Pernambuco"),
            Some("Brazil"),
        )
    }

    #[test]
    fn test_returns_global_maximum() {
        let t = base_time();
        let visitors = pool(vec![
            // 40: window only.
            visitor("v40", t - Duration::minutes(45), Some("Lisboa"), Some("Lisboa"), Some("Portugal")),
            // 60: window + state.
            visitor("v60", t - Duration::minutes(45), Some("Natal"), Some("Pernambuco"), Some("Portugal")),
            // 75: window + country + close bonus.
            visitor("v75", t - Duration::minutes(10), Some("Olinda"), None, Some("BR")),
        ]);
        let weights = ScoringWeights::default();
        let best = find_best_match(&recife_sale(), &visitors, &weights).unwrap();

        assert_eq!(best.visitor.session_id, "v75");
        assert_eq!(best.result.confidence, 75);
        let scores: Vec<u8> = visitors
            .iter()
            .map(|v| match_sale_with_visitor(&recife_sale(), v, &weights).confidence)
            .collect();
        assert_eq!(scores, vec![40, 60, 75]);
    }

    #[test]
    fn test_first_seen_wins_exact_tie() {
        let t = base_time();
        let visitors = pool(vec![
            visitor("first", t - Duration::minutes(45), Some("Olinda"), None, Some("Brasil")),
            visitor("second", t - Duration::minutes(45), Some("Natal"), None, Some("BR")),
        ]);
        let best = find_best_match(&recife_sale(), &visitors, &ScoringWeights::default()).unwrap();
        assert_eq!(best.result.confidence, 65);
        assert_eq!(best.visitor.session_id, "first");
    }

    #[test]
    fn test_later_higher_score_replaces_earlier() {
        let t = base_time();
        let visitors = pool(vec![
            visitor("ok", t - Duration::minutes(45), Some("Olinda"), None, Some("BR")),
            visitor("great", t, Some("Recife"), Some("Pernambuco"), Some("BR")),
        ]);
        let best = find_best_match(&recife_sale(), &visitors, &ScoringWeights::default()).unwrap();
        assert_eq!(best.visitor.session_id, "great");
        assert_eq!(best.result.confidence, 100);
    }

    #[test]
    fn test_nothing_above_threshold_is_none() {
        let t = base_time();
        let visitors = pool(vec![visitor(
            "far",
            t - Duration::hours(3),
            Some("Recife"),
            Some("Pernambuco"),
            Some("Brazil"),
        )]);
        assert!(find_best_match(&recife_sale(), &visitors, &ScoringWeights::default()).is_none());
        assert!(find_best_match(&recife_sale(), &[], &ScoringWeights::default()).is_none());
    }

    #[test]
    fn test_invalid_visitors_are_skipped() {
        let t = base_time();
        let mut no_ip = visitor("no-ip", t, Some("Recife"), Some("Pernambuco"), Some("Brazil"));
        no_ip.geo.ip = None;
        let mut no_code = visitor("no-code", t, Some("Recife"), Some("Pernambuco"), Some("Brazil"));
        no_code.geo.country_code = None;
        let no_city = visitor("no-city", t, None, Some("Pernambuco"), Some("Brazil"));

        assert!(!is_valid_visitor(&no_ip));
        assert!(!is_valid_visitor(&no_code));
        assert!(!is_valid_visitor(&no_city));

        let visitors = pool(vec![no_ip, no_code, no_city]);
        assert!(find_best_match(&recife_sale(), &visitors, &ScoringWeights::default()).is_none());
    }

    #[test]
    fn test_ineligible_sales_short_circuit() {
        let t = base_time();
        let visitors = pool(vec![visitor("v", t, Some("Recife"), Some("Pernambuco"), Some("BR"))]);
        let weights = ScoringWeights::default();

        let mut canceled = recife_sale();
        canceled.status = SaleStatus::Canceled;
        assert!(!is_valid_sale(&canceled));
        assert!(find_best_match(&canceled, &visitors, &weights).is_none());

        let no_country = sale(Some(t), Some("Recife"), None, None);
        assert!(!is_valid_sale(&no_country));
        assert!(find_best_match(&no_country, &visitors, &weights).is_none());
    }

    #[test]
    fn test_invalid_date_sale_never_matches() {
        let t = base_time();
        let visitors = pool(vec![visitor("v", t, Some("Recife"), Some("Pernambuco"), Some("BR"))]);
        let mut bad = recife_sale();
        bad.purchase_time = None;
        bad.purchase_time_raw = "not-a-date".into();

        assert!(is_valid_sale(&bad));
        assert!(find_best_match(&bad, &visitors, &ScoringWeights::default()).is_none());
    }
}
