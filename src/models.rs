use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// Defaults used when a card is added without specifying every field.
pub const DEFAULT_MIN_SPEND_PERIOD: u32 = 90;
pub const DEFAULT_REWARD_RATE: f64 = 1.0;
pub const DEFAULT_REWARD_MULTIPLIER: f64 = 1.0;
pub const DEFAULT_POINT_VALUE: f64 = 0.01;

fn default_min_spend_period() -> u32 {
    DEFAULT_MIN_SPEND_PERIOD
}

fn default_reward_multiplier() -> f64 {
    DEFAULT_REWARD_MULTIPLIER
}

fn display_id(id: &Option<i64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
}

fn display_money(value: &f64) -> String {
    format!("${value:.2}")
}

fn display_points(value: &f64) -> String {
    format!("{}", value.round())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct Card {
    /// Row id, absent for cards that were never saved (e.g. catalog cards)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[tabled(display_with = "display_id")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[tabled(skip)]
    pub user_id: Option<i64>,
    pub name: String,
    #[tabled(display_with = "display_money")]
    pub annual_fee: f64,
    /// Spend required to unlock the welcome bonus
    #[tabled(display_with = "display_money")]
    pub min_spend: f64,
    /// Days allowed to reach `min_spend`. Informational only.
    #[serde(default = "default_min_spend_period")]
    pub min_spend_period: u32,
    /// Welcome bonus in points
    pub welcome_bonus: f64,
    /// Points earned per currency unit
    pub reward_rate: f64,
    #[serde(default = "default_reward_multiplier")]
    pub reward_multiplier: f64,
    /// Currency value of a single point
    pub point_value: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[tabled(skip)]
    pub special_categories: Vec<SpecialCategory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[tabled(skip)]
    pub bonus_tiers: Vec<BonusTier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[tabled(skip)]
    pub partner_bonuses: Vec<PartnerBonus>,
}

impl Card {
    /// A card with the given name and every other field at its form default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: None,
            name: name.into(),
            annual_fee: 0.0,
            min_spend: 0.0,
            min_spend_period: DEFAULT_MIN_SPEND_PERIOD,
            welcome_bonus: 0.0,
            reward_rate: DEFAULT_REWARD_RATE,
            reward_multiplier: DEFAULT_REWARD_MULTIPLIER,
            point_value: DEFAULT_POINT_VALUE,
            special_categories: Vec::new(),
            bonus_tiers: Vec::new(),
            partner_bonuses: Vec::new(),
        }
    }

    /// Currency earned per currency unit spent, ignoring any bonuses.
    pub fn ongoing_rate(&self) -> f64 {
        self.reward_rate * self.reward_multiplier * self.point_value
    }

    pub fn welcome_bonus_value(&self) -> f64 {
        self.welcome_bonus * self.point_value
    }

    pub fn special_category(&self, category: &str) -> Option<&SpecialCategory> {
        self.special_categories.iter().find(|c| c.category == category)
    }

    pub fn partner_bonus(&self, partner_name: &str) -> Option<&PartnerBonus> {
        self.partner_bonuses
            .iter()
            .find(|p| p.partner_name == partner_name)
    }
}

/// Extra points earned when the purchase falls in a given category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialCategory {
    pub category: String,
    pub reward_rate: f64,
    /// Spend below this earns no category bonus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_spend: Option<f64>,
    /// Category bonus is only earned on spend up to this cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_spend: Option<f64>,
}

/// A `[min_spend, max_spend)` spend band paying an extra per-point bonus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusTier {
    pub min_spend: f64,
    pub max_spend: f64,
    pub point_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerBonus {
    pub partner_name: String,
    /// Extra points per currency unit spent with the partner
    pub bonus_rate: f64,
    pub description: String,
}

fn parse_number(field: &str, value: &str) -> Result<f64, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid {field} '{value}'"))
}

fn parse_optional(field: &str, value: Option<&str>) -> Result<Option<f64>, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_number(field, v).map(Some),
    }
}

/// Parses `CATEGORY:RATE[:MIN[:MAX]]`, e.g. `dining:3::1500`.
impl FromStr for SpecialCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let category = parts.next().unwrap_or_default().trim();
        if category.is_empty() {
            return Err(format!("missing category in '{s}'"));
        }
        let rate = parts
            .next()
            .ok_or_else(|| format!("missing rate in '{s}'"))?;
        let rule = SpecialCategory {
            category: category.to_string(),
            reward_rate: parse_number("rate", rate)?,
            min_spend: parse_optional("min spend", parts.next())?,
            max_spend: parse_optional("max spend", parts.next())?,
        };
        if parts.next().is_some() {
            return Err(format!("too many fields in '{s}'"));
        }
        Ok(rule)
    }
}

/// Parses `MIN:MAX:POINT_VALUE`.
impl FromStr for BonusTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [min_spend, max_spend, point_value] = parts.as_slice() else {
            return Err(format!("expected MIN:MAX:POINT_VALUE, got '{s}'"));
        };
        Ok(BonusTier {
            min_spend: parse_number("min spend", min_spend)?,
            max_spend: parse_number("max spend", max_spend)?,
            point_value: parse_number("point value", point_value)?,
        })
    }
}

/// Parses `NAME:RATE:DESCRIPTION`. The description may contain colons.
impl FromStr for PartnerBonus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(rate), Some(description)) if !name.trim().is_empty() => {
                Ok(PartnerBonus {
                    partner_name: name.trim().to_string(),
                    bonus_rate: parse_number("rate", rate)?,
                    description: description.trim().to_string(),
                })
            }
            _ => Err(format!("expected NAME:RATE:DESCRIPTION, got '{s}'")),
        }
    }
}

/// What triggered a special bonus line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum BonusSource {
    Category(String),
    Partner(String),
}

impl fmt::Display for BonusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BonusSource::Category(name) => write!(f, "category '{name}'"),
            BonusSource::Partner(name) => write!(f, "partner '{name}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialBonus {
    pub source: BonusSource,
    pub additional_points: f64,
    pub additional_value: f64,
    pub description: String,
}

/// How much of the purchase goes on one card and what it earns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub card: Card,
    pub spend_amount: f64,
    pub points_earned: f64,
    pub welcome_bonus_value: f64,
    pub rewards_value: f64,
    /// welcome_bonus_value + rewards_value - annual_fee
    pub net_benefit: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub special_bonuses: Vec<SpecialBonus>,
}

/// Used for printing allocation results
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct AllocationRow {
    pub card_name: String,
    #[tabled(display_with = "display_money")]
    pub spend_amount: f64,
    #[tabled(display_with = "display_points")]
    pub points_earned: f64,
    #[tabled(display_with = "display_money")]
    pub welcome_bonus_value: f64,
    #[tabled(display_with = "display_money")]
    pub rewards_value: f64,
    #[tabled(display_with = "display_money")]
    pub annual_fee: f64,
    #[tabled(display_with = "display_money")]
    pub net_benefit: f64,
}

impl From<&AllocationResult> for AllocationRow {
    fn from(result: &AllocationResult) -> Self {
        Self {
            card_name: result.card.name.clone(),
            spend_amount: result.spend_amount,
            points_earned: result.points_earned,
            welcome_bonus_value: result.welcome_bonus_value,
            rewards_value: result.rewards_value,
            annual_fee: result.card.annual_fee,
            net_benefit: result.net_benefit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_new_uses_form_defaults() {
        let card = Card::new("Plain Card");
        assert_eq!(card.min_spend_period, 90);
        assert_eq!(card.reward_rate, 1.0);
        assert_eq!(card.reward_multiplier, 1.0);
        assert_eq!(card.point_value, 0.01);
        assert_eq!(card.annual_fee, 0.0);
        assert!(card.id.is_none());
    }

    #[test]
    fn test_card_deserialize_fills_defaults() {
        let json = r#"{
            "name": "Sparse",
            "annual_fee": 95,
            "min_spend": 3000,
            "welcome_bonus": 50000,
            "reward_rate": 2,
            "point_value": 0.01
        }"#;
        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.min_spend_period, 90);
        assert_eq!(card.reward_multiplier, 1.0);
        assert!(card.special_categories.is_empty());
        assert!(card.bonus_tiers.is_empty());
        assert!(card.partner_bonuses.is_empty());
    }

    #[test]
    fn test_rule_lookup_is_exact_match() {
        let mut card = Card::new("Dining Card");
        card.special_categories.push(SpecialCategory {
            category: "dining".into(),
            reward_rate: 2.0,
            min_spend: None,
            max_spend: None,
        });
        card.partner_bonuses.push(PartnerBonus {
            partner_name: "Lyft".into(),
            bonus_rate: 5.0,
            description: "5x on Lyft".into(),
        });

        assert!(card.special_category("dining").is_some());
        assert!(card.special_category("travel").is_none());
        assert!(card.partner_bonus("Lyft").is_some());
        assert!(card.partner_bonus("Uber").is_none());
    }

    #[test]
    fn test_parse_special_category() {
        let rule: SpecialCategory = "dining:3".parse().unwrap();
        assert_eq!(rule.category, "dining");
        assert_eq!(rule.reward_rate, 3.0);
        assert_eq!(rule.min_spend, None);
        assert_eq!(rule.max_spend, None);

        let rule: SpecialCategory = "groceries:4::6000".parse().unwrap();
        assert_eq!(rule.min_spend, None);
        assert_eq!(rule.max_spend, Some(6000.0));

        assert!("dining".parse::<SpecialCategory>().is_err());
        assert!(":3".parse::<SpecialCategory>().is_err());
        assert!("dining:x".parse::<SpecialCategory>().is_err());
        assert!("dining:3:1:2:3".parse::<SpecialCategory>().is_err());
    }

    #[test]
    fn test_parse_bonus_tier() {
        let tier: BonusTier = "0:1000:0.1".parse().unwrap();
        assert_eq!(tier.min_spend, 0.0);
        assert_eq!(tier.max_spend, 1000.0);
        assert_eq!(tier.point_value, 0.1);
        assert!("0:1000".parse::<BonusTier>().is_err());
    }

    #[test]
    fn test_parse_partner_bonus_keeps_colons_in_description() {
        let rule: PartnerBonus = "Lyft:5:5x on rides: through 2025".parse().unwrap();
        assert_eq!(rule.partner_name, "Lyft");
        assert_eq!(rule.bonus_rate, 5.0);
        assert_eq!(rule.description, "5x on rides: through 2025");
        assert!("Lyft:5".parse::<PartnerBonus>().is_err());
    }

    #[test]
    fn test_bonus_source_serializes_tagged() {
        let source = BonusSource::Partner("Lyft".into());
        let json = serde_json::to_string(&source).unwrap();
        assert_eq!(json, r#"{"kind":"partner","name":"Lyft"}"#);
        assert_eq!(source.to_string(), "partner 'Lyft'");
    }
}
