//! Splits a purchase across cards to capture welcome bonuses first, then
//! routes whatever is left to the card with the best ongoing earn rate.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::AllocationError;
use crate::models::{
    AllocationResult, BonusSource, BonusTier, Card, PartnerBonus, SpecialBonus, SpecialCategory,
};

pub type Result<T> = std::result::Result<T, AllocationError>;

/// Allocation results together with their aggregate totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationSummary {
    pub results: Vec<AllocationResult>,
    pub total_spend: f64,
    pub total_net_benefit: f64,
}

impl AllocationSummary {
    pub fn new(results: Vec<AllocationResult>) -> Self {
        Self {
            total_spend: total_spend(&results),
            total_net_benefit: total_net_benefit(&results),
            results,
        }
    }
}

/// Recommends how much of `purchase_amount` to put on each card.
///
/// Cards are ranked by value density, then each card in turn receives up to
/// its minimum spend so its welcome bonus is earned. Anything left over is
/// added to the allocated card with the highest ongoing earn rate.
///
/// `category` and `partner_name` enable the matching special-category and
/// partner rules; empty strings count as not supplied.
pub fn allocate(
    purchase_amount: f64,
    cards: &[Card],
    category: Option<&str>,
    partner_name: Option<&str>,
) -> Result<Vec<AllocationResult>> {
    if !purchase_amount.is_finite() || purchase_amount <= 0.0 {
        return Err(AllocationError::InvalidInput(format!(
            "purchase amount must be a positive number, got {purchase_amount}"
        )));
    }
    if cards.is_empty() {
        return Err(AllocationError::InvalidInput(
            "no cards to allocate across".to_string(),
        ));
    }
    for card in cards {
        validate_card(card)?;
    }

    let category = category.filter(|c| !c.is_empty());
    let partner_name = partner_name.filter(|p| !p.is_empty());

    let ranked = rank_cards(cards, category, partner_name);
    let mut remaining = purchase_amount;
    let mut results = Vec::new();

    for card in ranked {
        if remaining <= 0.0 {
            break;
        }
        let spend_amount = remaining.min(card.min_spend);
        if spend_amount <= 0.0 {
            continue;
        }
        let result = allocate_to_card(card, spend_amount, category, partner_name);
        debug!(
            card = %card.name,
            spend_amount,
            net_benefit = result.net_benefit,
            "allocated minimum spend"
        );
        results.push(result);
        remaining -= spend_amount;
    }

    if remaining > 0.0 {
        allocate_residual(&mut results, remaining);
    }

    info!(
        purchase_amount,
        cards = cards.len(),
        allocations = results.len(),
        "allocation complete"
    );
    Ok(results)
}

pub fn total_spend(results: &[AllocationResult]) -> f64 {
    results.iter().map(|r| r.spend_amount).sum()
}

pub fn total_net_benefit(results: &[AllocationResult]) -> f64 {
    results.iter().map(|r| r.net_benefit).sum()
}

/// Cards ordered by descending value density. Equal scores keep input order.
fn rank_cards<'a>(
    cards: &'a [Card],
    category: Option<&str>,
    partner_name: Option<&str>,
) -> Vec<&'a Card> {
    let mut scored: Vec<(f64, &Card)> = cards
        .iter()
        .map(|card| (value_density(card, category, partner_name), card))
        .collect();
    // sort_by is stable
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .map(|(score, card)| {
            debug!(card = %card.name, score, "ranked card");
            card
        })
        .collect()
}

fn value_density(card: &Card, category: Option<&str>, partner_name: Option<&str>) -> f64 {
    let potential = card.welcome_bonus_value() + card.ongoing_rate();
    let mut score = if card.min_spend > 0.0 {
        potential / card.min_spend
    } else {
        // No spend needed to unlock the bonus, so there is nothing to divide by.
        warn!(card = %card.name, "card has no minimum spend; scoring without a spend divisor");
        potential
    };

    if let Some(rule) = category.and_then(|c| card.special_category(c)) {
        score += rule.reward_rate * card.point_value;
    }
    if let Some(rule) = partner_name.and_then(|p| card.partner_bonus(p)) {
        score += rule.bonus_rate * card.point_value;
    }
    score
}

fn allocate_to_card(
    card: &Card,
    spend_amount: f64,
    category: Option<&str>,
    partner_name: Option<&str>,
) -> AllocationResult {
    let mut points_earned = spend_amount * card.reward_rate * card.reward_multiplier;
    let mut rewards_value = points_earned * card.point_value;
    let mut special_bonuses = Vec::new();

    if let Some(category) = category
        && let Some(rule) = card.special_category(category)
    {
        let (points, value) = special_category_bonus(spend_amount, rule, card.point_value);
        points_earned += points;
        rewards_value += value;
        special_bonuses.push(SpecialBonus {
            source: BonusSource::Category(category.to_string()),
            additional_points: points,
            additional_value: value,
            description: format!("{}x points in {}", rule.reward_rate, category),
        });
    }

    if let Some(partner_name) = partner_name
        && let Some(rule) = card.partner_bonus(partner_name)
    {
        let (points, value) = partner_bonus(spend_amount, rule, card.point_value);
        points_earned += points;
        rewards_value += value;
        special_bonuses.push(SpecialBonus {
            source: BonusSource::Partner(partner_name.to_string()),
            additional_points: points,
            additional_value: value,
            description: rule.description.clone(),
        });
    }

    let (tier_points, tier_value) = bonus_tier_bonus(spend_amount, &card.bonus_tiers);
    points_earned += tier_points;
    rewards_value += tier_value;

    let welcome_bonus_value = if spend_amount >= card.min_spend {
        card.welcome_bonus_value()
    } else {
        0.0
    };

    AllocationResult {
        card: card.clone(),
        spend_amount,
        points_earned,
        welcome_bonus_value,
        rewards_value,
        net_benefit: welcome_bonus_value + rewards_value - card.annual_fee,
        special_bonuses,
    }
}

/// Extra (points, value) from a category rule. An unset or zero bound is ignored.
fn special_category_bonus(
    spend_amount: f64,
    rule: &SpecialCategory,
    point_value: f64,
) -> (f64, f64) {
    let mut eligible = spend_amount;
    if let Some(max_spend) = rule.max_spend.filter(|m| *m > 0.0) {
        eligible = eligible.min(max_spend);
    }
    if let Some(min_spend) = rule.min_spend.filter(|m| *m > 0.0)
        && eligible < min_spend
    {
        eligible = 0.0;
    }

    let points = eligible * rule.reward_rate;
    (points, points * point_value)
}

fn partner_bonus(spend_amount: f64, rule: &PartnerBonus, point_value: f64) -> (f64, f64) {
    let points = spend_amount * rule.bonus_rate;
    (points, points * point_value)
}

/// Extra (points, value) from tiered bonuses.
///
/// The tier's `point_value` is applied twice: once as the points-per-unit rate
/// and again as the value of each point. Existing results depend on this, so
/// it is kept, but it is most likely a defect.
fn bonus_tier_bonus(spend_amount: f64, tiers: &[BonusTier]) -> (f64, f64) {
    let mut sorted: Vec<&BonusTier> = tiers.iter().collect();
    sorted.sort_by(|a, b| a.min_spend.total_cmp(&b.min_spend));

    let mut total_points = 0.0;
    let mut total_value = 0.0;
    for tier in sorted {
        if spend_amount >= tier.min_spend {
            let tier_spend = spend_amount.min(tier.max_spend) - tier.min_spend;
            let points = tier_spend * tier.point_value;
            total_points += points;
            total_value += points * tier.point_value;
        }
    }
    (total_points, total_value)
}

/// Folds the unallocated remainder into the result with the best ongoing rate.
/// Only the base rate applies; bonuses were settled in the first pass.
fn allocate_residual(results: &mut [AllocationResult], remaining: f64) {
    let Some(best) = results.iter_mut().reduce(|best, current| {
        if current.card.ongoing_rate() > best.card.ongoing_rate() {
            current
        } else {
            best
        }
    }) else {
        return;
    };

    let additional_points = remaining * best.card.reward_rate * best.card.reward_multiplier;
    let additional_value = additional_points * best.card.point_value;

    best.spend_amount += remaining;
    best.points_earned += additional_points;
    best.rewards_value += additional_value;
    best.net_benefit += additional_value;

    debug!(card = %best.card.name, remaining, "allocated residual spend");
}

/// Rejects cards whose numbers would make the allocation meaningless.
pub fn validate_card(card: &Card) -> Result<()> {
    check_non_negative(card, "annual_fee", card.annual_fee)?;
    check_non_negative(card, "min_spend", card.min_spend)?;
    check_non_negative(card, "welcome_bonus", card.welcome_bonus)?;
    check_non_negative(card, "reward_rate", card.reward_rate)?;
    check_non_negative(card, "point_value", card.point_value)?;
    if !card.reward_multiplier.is_finite() || card.reward_multiplier < 1.0 {
        return Err(integrity_error(
            card,
            format!(
                "reward_multiplier must be at least 1, got {}",
                card.reward_multiplier
            ),
        ));
    }

    for rule in &card.special_categories {
        check_non_negative(card, "special category reward_rate", rule.reward_rate)?;
        if let Some(min_spend) = rule.min_spend {
            check_non_negative(card, "special category min_spend", min_spend)?;
        }
        if let Some(max_spend) = rule.max_spend {
            check_non_negative(card, "special category max_spend", max_spend)?;
        }
    }
    for tier in &card.bonus_tiers {
        check_non_negative(card, "bonus tier min_spend", tier.min_spend)?;
        check_non_negative(card, "bonus tier max_spend", tier.max_spend)?;
        check_non_negative(card, "bonus tier point_value", tier.point_value)?;
        if tier.max_spend < tier.min_spend {
            return Err(integrity_error(
                card,
                format!(
                    "bonus tier max_spend {} is below its min_spend {}",
                    tier.max_spend, tier.min_spend
                ),
            ));
        }
    }
    for rule in &card.partner_bonuses {
        check_non_negative(card, "partner bonus_rate", rule.bonus_rate)?;
    }
    Ok(())
}

fn check_non_negative(card: &Card, field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(integrity_error(
            card,
            format!("{field} must be a non-negative number, got {value}"),
        ))
    }
}

fn integrity_error(card: &Card, reason: String) -> AllocationError {
    AllocationError::DataIntegrity {
        card: card.name.clone(),
        reason,
    }
}
