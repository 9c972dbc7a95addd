use crate::models::MarketPrice;

pub const ALL_CATEGORIES: &str = "all";

const DEFAULT_CATALOGUE: &[(&str, &str, &str)] = &[
    ("Vegetable", "Onion", "₹30-40/kg"),
    ("Vegetable", "Tomato", "₹25-35/kg"),
    ("Vegetable", "Potato", "₹20-25/kg"),
    ("Vegetable", "Carrot", "₹35-45/kg"),
    ("Vegetable", "Cabbage", "₹15-20/kg"),
    ("Vegetable", "Cauliflower", "₹25-30/kg"),
    ("Vegetable", "Green Beans", "₹40-50/kg"),
    ("Vegetable", "Okra (Ladyfinger)", "₹30-40/kg"),
    ("Vegetable", "Brinjal (Eggplant)", "₹25-35/kg"),
    ("Vegetable", "Bell Pepper", "₹50-60/kg"),
    ("Fruit", "Apple", "₹120-150/kg"),
    ("Fruit", "Banana", "₹40-50/dozen"),
    ("Fruit", "Orange", "₹60-80/kg"),
    ("Fruit", "Mango", "₹80-120/kg"),
    ("Fruit", "Grapes", "₹100-140/kg"),
    ("Fruit", "Papaya", "₹25-35/kg"),
    ("Fruit", "Watermelon", "₹15-20/kg"),
    ("Fruit", "Pineapple", "₹30-40/piece"),
    ("Fruit", "Pomegranate", "₹150-200/kg"),
    ("Fruit", "Guava", "₹40-60/kg"),
];

const FALLBACK_CATALOGUE: &[(&str, &str, &str)] = &[
    ("Vegetable", "Onion", "₹30-40/kg"),
    ("Vegetable", "Tomato", "₹25-35/kg"),
    ("Fruit", "Apple", "₹120-150/kg"),
    ("Fruit", "Banana", "₹40-50/dozen"),
];

pub fn default_prices() -> Vec<MarketPrice> {
    to_prices(DEFAULT_CATALOGUE)
}

/// Short list served when the price cache cannot be read.
pub fn fallback_prices() -> Vec<MarketPrice> {
    to_prices(FALLBACK_CATALOGUE)
}

/// Keeps prices whose category matches `category` case-insensitively;
/// `all` keeps everything.
pub fn filter_by_category(prices: Vec<MarketPrice>, category: &str) -> Vec<MarketPrice> {
    let wanted = category.trim().to_lowercase();
    if wanted.is_empty() || wanted == ALL_CATEGORIES {
        return prices;
    }

    prices
        .into_iter()
        .filter(|price| price.category.to_lowercase() == wanted)
        .collect()
}

fn to_prices(rows: &[(&str, &str, &str)]) -> Vec<MarketPrice> {
    rows.iter()
        .map(|(category, name, price)| MarketPrice::new(category, name, price))
        .collect()
}
