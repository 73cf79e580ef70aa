use crate::models::Card;

/// Reference cards that can be optimized against without signing in.
pub fn default_cards() -> Vec<Card> {
    vec![
        Card {
            annual_fee: 550.0,
            min_spend: 4000.0,
            min_spend_period: 90,
            welcome_bonus: 60000.0,
            reward_rate: 3.0,
            reward_multiplier: 1.0,
            point_value: 0.0205,
            ..Card::new("Chase Sapphire Reserve")
        },
        Card {
            annual_fee: 395.0,
            min_spend: 4000.0,
            min_spend_period: 90,
            welcome_bonus: 75000.0,
            reward_rate: 2.0,
            reward_multiplier: 1.0,
            point_value: 0.018,
            ..Card::new("Capital One Venture X")
        },
        Card {
            annual_fee: 150.0,
            min_spend: 3000.0,
            min_spend_period: 90,
            welcome_bonus: 40000.0,
            reward_rate: 3.0,
            reward_multiplier: 1.0,
            point_value: 0.02,
            ..Card::new("American Express Green")
        },
    ]
}

/// Looks up a catalog card by name, ignoring case.
pub fn find_card(name: &str) -> Option<Card> {
    default_cards()
        .into_iter()
        .find(|card| card.name.eq_ignore_ascii_case(name))
}
