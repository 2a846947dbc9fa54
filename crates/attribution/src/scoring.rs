//! Pairwise scoring of one sale against one visitor.
//!
//! Additive, capped model: a base score for falling inside the time window,
//! independent geographic signals, and one proximity bonus tier. Signals
//! missing on either side are skipped, never penalized.

use chrono::{DateTime, Utc};
use funnel_core::config::MatcherConfig;
use funnel_core::types::{
    MatchDetails, MatchResult, SaleRecord, TimeProximity, VisitorAudit, VisitorRecord,
};

use crate::geo::{cities_match, countries_match, regions_overlap};

/// Method tag on every scored result.
pub const MATCH_METHOD: &str = "geo-api + time + location";
/// Terminal tag for a pair whose timestamps could not be compared.
pub const INVALID_DATES_METHOD: &str = "error-invalid-dates";

/// Tunable weights; defaults reproduce the reference 40/25/20/15 model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringWeights {
    pub time_window_minutes: i64,
    pub window_points: u32,
    pub country_points: u32,
    pub state_points: u32,
    pub city_points: u32,
    /// `(tier, max minutes, points)`, tightest tier first.
    pub proximity_tiers: [(TimeProximity, i64, u32); 3],
    pub match_threshold: u32,
}

impl From<&MatcherConfig> for ScoringWeights {
    fn from(config: &MatcherConfig) -> Self {
        Self {
            time_window_minutes: config.time_window_minutes,
            window_points: config.window_points,
            country_points: config.country_points,
            state_points: config.state_points,
            city_points: config.city_points,
            proximity_tiers: [
                (
                    TimeProximity::VeryClose,
                    config.very_close_minutes,
                    config.very_close_points,
                ),
                (TimeProximity::Close, config.close_minutes, config.close_points),
                (
                    TimeProximity::Reasonable,
                    config.reasonable_minutes,
                    config.reasonable_points,
                ),
            ],
            match_threshold: config.match_threshold,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::from(&MatcherConfig::default())
    }
}

impl ScoringWeights {
    fn proximity_bonus(&self, minutes: i64) -> Option<(TimeProximity, u32)> {
        self.proximity_tiers
            .iter()
            .find(|(_, max_minutes, _)| minutes <= *max_minutes)
            .map(|(tier, _, points)| (*tier, *points))
    }
}

/// Absolute distance in whole minutes, rounded half up.
pub fn minutes_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    let millis = (a - b).num_milliseconds().abs();
    (millis + 30_000) / 60_000
}

/// Score one (sale, visitor) pair. Pure and deterministic.
pub fn match_sale_with_visitor(
    sale: &SaleRecord,
    visitor: &VisitorRecord,
    weights: &ScoringWeights,
) -> MatchResult {
    let mut details = MatchDetails {
        transaction_id: sale.transaction_id.clone(),
        session_id: visitor.session_id.clone(),
        sale_time: sale.purchase_time_raw.clone(),
        visitor_time: visitor.timestamp.to_rfc3339(),
        visitor_data: VisitorAudit::from(visitor),
        ..Default::default()
    };

    let Some(purchase_time) = sale.purchase_time else {
        details.error = Some(format!(
            "unparsable purchase time {:?}",
            sale.purchase_time_raw
        ));
        return MatchResult {
            matched: false,
            confidence: 0,
            method: INVALID_DATES_METHOD.to_string(),
            details,
        };
    };

    let minutes = minutes_between(purchase_time, visitor.timestamp);
    details.time_diff_minutes = Some(minutes);

    let mut score: u32 = 0;
    if minutes <= weights.time_window_minutes {
        score += weights.window_points;
        details.time_match = true;

        let address = &sale.buyer.address;

        if let (Some(visitor_country), Some(sale_country)) =
            (visitor.country_signal(), address.country.as_deref())
        {
            if countries_match(visitor_country, sale_country) {
                score += weights.country_points;
                details.country_match = true;
            }
        }

        if let (Some(visitor_state), Some(sale_state)) =
            (visitor.geo.region_name.as_deref(), address.state.as_deref())
        {
            if regions_overlap(visitor_state, sale_state) {
                score += weights.state_points;
                details.state_match = true;
            }
        }

        if let (Some(visitor_city), Some(sale_city)) =
            (visitor.geo.city.as_deref(), address.city.as_deref())
        {
            if cities_match(visitor_city, sale_city) {
                score += weights.city_points;
                details.city_match = true;
            }
        }

        if let Some((tier, points)) = weights.proximity_bonus(minutes) {
            score += points;
            details.time_proximity = Some(tier);
        }
    } else {
        details.time_window_exceeded = true;
    }

    let confidence = score.min(100);
    MatchResult {
        matched: confidence >= weights.match_threshold,
        confidence: confidence as u8,
        method: MATCH_METHOD.to_string(),
        details,
    }
}
