//! Sell decision pipeline
//!
//! Evaluates an owned position against the current competing listings and
//! decides between listing, repricing and holding. All price comparisons use
//! two-digit decimals; exact-equality ties favor holding to avoid needless
//! API churn.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::common::money::{self, CENT};
use crate::common::types::{Listing, MarketStats, Position, PositionStatus};
use crate::engine::types::{SellAction, SellEvaluation, SellOpportunity};

/// Minimum margin demanded before listing below the target price
pub const MIN_MARGIN_PCT: Decimal = dec!(3);

/// Market-average drop from the purchase price that triggers a stop-loss
pub const STOP_LOSS_DROP_PCT: Decimal = dec!(10);

/// Days after which a holding may be listed near break-even
const STALE_HOLD_DAYS: i64 = 7;

/// Days after which a listing gets repriced toward the competition
const LISTED_REPRICE_DAYS: i64 = 3;

/// Days after which a listing may be repriced down to break-even
const LISTED_CUT_LOSS_DAYS: i64 = 5;

/// Price gap to the cheapest competitor that forces a reprice
const MAX_PRICE_GAP: Decimal = dec!(0.50);

/// State-dependent sell evaluation over a position snapshot
pub struct SellDecisionPipeline;

impl SellDecisionPipeline {
    /// Evaluate one position against the current market.
    ///
    /// `listings` are the competing listings for the position's item; our
    /// own listing is excluded by its sale id.
    pub fn evaluate(
        position: &Position,
        listings: &[Listing],
        stats: Option<&MarketStats>,
        now: DateTime<Utc>,
    ) -> SellEvaluation {
        match position.status {
            PositionStatus::Holding => Self::evaluate_holding(position, listings, stats, now),
            PositionStatus::Listed => Self::evaluate_listed(position, listings, now),
            status => SellEvaluation::Hold {
                reason: format!("position is {}", status),
            },
        }
    }

    fn evaluate_holding(
        position: &Position,
        listings: &[Listing],
        stats: Option<&MarketStats>,
        now: DateTime<Utc>,
    ) -> SellEvaluation {
        let cheapest = match Self::cheapest_competitor(position, listings) {
            Some(price) => price,
            None => {
                return SellEvaluation::Hold {
                    reason: "no competing listings".to_string(),
                }
            }
        };
        let undercut = money::round_cents(cheapest - CENT);
        let min_profitable = money::target_sell_price(position.purchase_price, MIN_MARGIN_PCT);
        let break_even = money::break_even_price(position.purchase_price);

        if undercut >= position.target_sell_price {
            return Self::list(
                position,
                undercut,
                format!("target achievable by undercutting to {}", undercut),
            );
        }

        if undercut >= min_profitable {
            let profit = money::net_proceeds(undercut) - position.purchase_price;
            let profit_pct = profit / position.purchase_price * dec!(100);
            return Self::list(
                position,
                undercut,
                format!("undercutting for {:.1}% profit", profit_pct),
            );
        }

        if position.hold_days(now) >= STALE_HOLD_DAYS && cheapest >= break_even {
            let price = undercut.max(break_even);
            return Self::list(
                position,
                price,
                format!("held too long, listing at {} near break-even", price),
            );
        }

        if let Some(stats) = stats {
            if position.purchase_price > Decimal::ZERO {
                let drop_pct = (position.purchase_price - stats.avg_price_7d)
                    / position.purchase_price
                    * dec!(100);
                if drop_pct >= STOP_LOSS_DROP_PCT {
                    return Self::list(
                        position,
                        undercut,
                        format!(
                            "stop-loss: market average dropped {:.1}% below purchase",
                            drop_pct
                        ),
                    );
                }
            }
        }

        SellEvaluation::Hold {
            reason: "waiting for a profitable exit".to_string(),
        }
    }

    fn evaluate_listed(
        position: &Position,
        listings: &[Listing],
        now: DateTime<Utc>,
    ) -> SellEvaluation {
        let our_price = match position.listed_price {
            Some(price) => price,
            None => {
                return SellEvaluation::Hold {
                    reason: "listed position has no recorded price".to_string(),
                }
            }
        };
        let cheapest = match Self::cheapest_competitor(position, listings) {
            Some(price) => price,
            None => {
                return SellEvaluation::Hold {
                    reason: "no competing listings".to_string(),
                }
            }
        };

        if our_price <= cheapest + CENT {
            return SellEvaluation::Hold {
                reason: "still competitive".to_string(),
            };
        }

        let undercut = money::round_cents(cheapest - CENT);
        let gap = our_price - cheapest;
        let hold_days = position.hold_days(now);

        if hold_days < LISTED_REPRICE_DAYS && gap <= MAX_PRICE_GAP {
            return SellEvaluation::Hold {
                reason: "price gap within tolerance".to_string(),
            };
        }

        let min_profitable = money::target_sell_price(position.purchase_price, MIN_MARGIN_PCT);
        let break_even = money::break_even_price(position.purchase_price);

        if undercut >= min_profitable {
            let reason = if gap > MAX_PRICE_GAP {
                format!("competitive undercut to {}", undercut)
            } else {
                format!("held too long, undercutting to {}", undercut)
            };
            return Self::adjust(position, our_price, undercut, reason);
        }

        if hold_days >= LISTED_CUT_LOSS_DAYS && undercut >= break_even {
            let price = undercut.max(break_even);
            return Self::adjust(
                position,
                our_price,
                price,
                format!("cutting losses, repricing to {}", price),
            );
        }

        SellEvaluation::Hold {
            reason: "repricing would fall below the minimum profitable price".to_string(),
        }
    }

    /// Lowest competing listing, excluding our own by sale id
    fn cheapest_competitor(position: &Position, listings: &[Listing]) -> Option<Decimal> {
        listings
            .iter()
            .filter(|listing| listing.listing_id != position.sale_id)
            .map(|listing| money::round_cents(listing.price))
            .min()
    }

    fn list(position: &Position, price: Decimal, reason: String) -> SellEvaluation {
        SellEvaluation::Act(SellOpportunity {
            sale_id: position.sale_id.clone(),
            item_name: position.item_name.clone(),
            action: SellAction::List { price },
            reason,
        })
    }

    fn adjust(
        position: &Position,
        current_price: Decimal,
        new_price: Decimal,
        reason: String,
    ) -> SellEvaluation {
        // Equal prices mean no action is worth an API call
        if new_price == current_price {
            return SellEvaluation::Hold {
                reason: "already listed at the computed price".to_string(),
            };
        }
        SellEvaluation::Act(SellOpportunity {
            sale_id: position.sale_id.clone(),
            item_name: position.item_name.clone(),
            action: SellAction::Adjust { price: new_price },
            reason,
        })
    }
}
