use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

use crate::models::{Answer, Category, HelpInfo};

pub type KeywordTable = BTreeMap<Category, BTreeSet<String>>;
pub type ResponseTable = BTreeMap<Category, String>;

const BUILTIN_GREETINGS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "namaste",
    "greetings",
    "howdy",
];

const BUILTIN_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Weather,
        &[
            "weather",
            "temperature",
            "rain",
            "climate",
            "forecast",
            "sunny",
            "cloudy",
            "humidity",
        ],
    ),
    (
        Category::Prices,
        &[
            "price", "cost", "market", "sell", "buy", "rate", "expensive", "cheap", "rupees",
        ],
    ),
    (
        Category::Disease,
        &[
            "disease",
            "sick",
            "problem",
            "leaf",
            "plant",
            "crop",
            "infection",
            "pest",
            "spots",
            "yellow",
        ],
    ),
    (
        Category::Fertilizer,
        &[
            "fertilizer",
            "nutrient",
            "soil",
            "compost",
            "manure",
            "nitrogen",
            "phosphorus",
            "potassium",
        ],
    ),
    (
        Category::Cultivation,
        &[
            "seed",
            "planting",
            "growing",
            "cultivation",
            "harvest",
            "farming",
            "irrigation",
            "water",
        ],
    ),
    (
        Category::Pest,
        &[
            "pest",
            "insect",
            "bug",
            "caterpillar",
            "aphid",
            "mite",
            "larvae",
        ],
    ),
    (
        Category::Soil,
        &[
            "soil", "ph", "acidity", "alkaline", "drainage", "clay", "sand", "loam",
        ],
    ),
    (
        Category::Season,
        &["season", "monsoon", "winter", "summer", "sowing", "timing"],
    ),
];

const BUILTIN_RESPONSES: &[(Category, &str)] = &[
    (
        Category::Weather,
        "🌤️ To get current weather information, use the Weather tab. Enter your city name or allow location access to get real-time weather data including temperature, humidity, and wind speed.",
    ),
    (
        Category::Prices,
        "💰 Check the Market Prices section for current rates of vegetables and fruits. You can filter by category to see specific produce prices in your area.",
    ),
    (
        Category::Disease,
        "🔬 For plant disease detection, use the Disease Detection tab. Take a clear photo of the affected plant leaves and upload it for AI-powered analysis and treatment recommendations.",
    ),
    (
        Category::Fertilizer,
        "🌱 For fertilizer recommendations: Use nitrogen-rich fertilizers for leafy growth, phosphorus for root development, and potassium for flowering. Consider organic compost and get soil testing for specific nutrient needs.",
    ),
    (
        Category::Cultivation,
        "🚜 Cultivation tips: Choose seeds based on your local climate and soil type. Ensure proper spacing, watering schedule, and crop rotation. Consult your local agricultural extension office for region-specific advice.",
    ),
    (
        Category::Pest,
        "🐛 For pest management: Use integrated pest management (IPM) approaches. Try neem oil, companion planting, and beneficial insects before chemical pesticides. Regular monitoring is key to early detection.",
    ),
    (
        Category::Soil,
        "🏔️ Soil health tips: Test your soil pH (6.0-7.0 is ideal for most crops). Improve drainage with organic matter. Add compost regularly to maintain soil structure and fertility.",
    ),
    (
        Category::Season,
        "📅 Seasonal farming: Plan crops according to local seasons. Monsoon is ideal for rice and sugarcane. Winter is good for wheat and vegetables. Summer crops include cotton and pulses.",
    ),
    (
        Category::Greeting,
        "👋 Hello! I'm your GrowWise farming assistant. I can help you with weather information, market prices, plant disease detection, and general farming guidance. What would you like to know?",
    ),
    (
        Category::Default,
        "🌾 I'm here to help with farming! I can assist with:\n• Weather information\n• Market prices\n• Plant disease detection\n• Soil and fertilizer advice\n• Pest management\n• Cultivation tips\n\nPlease ask me something specific about farming!",
    ),
];

const HELP_FEATURES: &[&str] = &[
    "🌤️ Weather Information - Get current weather for any location",
    "💰 Market Prices - Check latest vegetable and fruit prices",
    "🔬 Disease Detection - Upload plant photos for disease diagnosis",
    "🎤 Voice Assistant - Ask questions about farming",
    "📊 Analytics - View usage statistics and history",
];

const HELP_SAMPLE_QUERIES: &[&str] = &[
    "What is the weather like today?",
    "Show me tomato prices",
    "My plant leaves are turning yellow",
    "What fertilizer should I use for corn?",
    "How to manage pests in my crop?",
    "What is the best soil pH for vegetables?",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
    #[error("category `{0}` has no keyword entry")]
    MissingKeywords(Category),
    #[error("category `{0}` has an empty keyword entry")]
    EmptyKeywords(Category),
    #[error("category `{0}` contains a blank trigger")]
    BlankTrigger(Category),
    #[error("category `{0}` is not scored and cannot carry keywords")]
    UnscoredKeywords(Category),
    #[error("category `{0}` has no response")]
    MissingResponse(Category),
    #[error("greeting list is empty")]
    NoGreetings,
    #[error("greeting list contains a blank entry")]
    BlankGreeting,
}

/// Raw responder tables as read from configuration, keyed by category code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponderTables {
    pub keywords: BTreeMap<String, Vec<String>>,
    pub responses: BTreeMap<String, String>,
    pub greetings: Vec<String>,
}

impl ResponderTables {
    pub fn builtin() -> Self {
        Self {
            keywords: BUILTIN_KEYWORDS
                .iter()
                .map(|(category, triggers)| {
                    (
                        category.as_code().to_string(),
                        triggers.iter().map(|t| t.to_string()).collect(),
                    )
                })
                .collect(),
            responses: BUILTIN_RESPONSES
                .iter()
                .map(|(category, text)| (category.as_code().to_string(), text.to_string()))
                .collect(),
            greetings: BUILTIN_GREETINGS.iter().map(|g| g.to_string()).collect(),
        }
    }
}

/// Keyword-scoring classifier for free-text farming questions.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct IntentResponder {
    keywords: KeywordTable,
    responses: ResponseTable,
    greetings: Vec<String>,
    help: HelpInfo,
}

impl IntentResponder {
    pub fn builtin() -> Self {
        Self {
            keywords: BUILTIN_KEYWORDS
                .iter()
                .map(|(category, triggers)| {
                    (*category, triggers.iter().map(|t| t.to_string()).collect())
                })
                .collect(),
            responses: BUILTIN_RESPONSES
                .iter()
                .map(|(category, text)| (*category, text.to_string()))
                .collect(),
            greetings: BUILTIN_GREETINGS.iter().map(|g| g.to_string()).collect(),
            help: builtin_help(),
        }
    }

    pub fn from_tables(tables: ResponderTables) -> Result<Self, TableError> {
        let mut keywords = KeywordTable::new();
        for (code, triggers) in tables.keywords {
            let category = parse_category(&code)?;
            if !category.is_scored() {
                return Err(TableError::UnscoredKeywords(category));
            }
            let mut normalized = BTreeSet::new();
            for trigger in triggers {
                let trigger = normalize_query(&trigger);
                if trigger.is_empty() {
                    return Err(TableError::BlankTrigger(category));
                }
                normalized.insert(trigger);
            }
            if normalized.is_empty() {
                return Err(TableError::EmptyKeywords(category));
            }
            keywords.insert(category, normalized);
        }
        if let Some(missing) = Category::SCORED
            .into_iter()
            .find(|category| !keywords.contains_key(category))
        {
            return Err(TableError::MissingKeywords(missing));
        }

        let mut responses = ResponseTable::new();
        for (code, text) in tables.responses {
            let category = parse_category(&code)?;
            if !text.trim().is_empty() {
                responses.insert(category, text);
            }
        }
        if let Some(missing) = Category::ALL
            .into_iter()
            .find(|category| !responses.contains_key(category))
        {
            return Err(TableError::MissingResponse(missing));
        }

        if tables.greetings.is_empty() {
            return Err(TableError::NoGreetings);
        }
        let greetings = tables
            .greetings
            .iter()
            .map(|greeting| normalize_query(greeting))
            .collect::<Vec<_>>();
        if greetings.iter().any(String::is_empty) {
            return Err(TableError::BlankGreeting);
        }

        Ok(Self {
            keywords,
            responses,
            greetings,
            help: builtin_help(),
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading responder tables from {}", path.display()))?;
        let tables: ResponderTables = serde_json::from_str(&raw)
            .with_context(|| format!("invalid responder tables in {}", path.display()))?;
        Self::from_tables(tables)
            .with_context(|| format!("rejected responder tables in {}", path.display()))
    }

    /// Greeting first, then the category with the most matched triggers,
    /// ties going to the earlier-declared category; no match is `Default`.
    pub fn classify(&self, query: &str) -> Category {
        let normalized = normalize_query(query);

        if self.is_greeting(&normalized) {
            return Category::Greeting;
        }

        // BTreeMap iterates in declaration order, so on equal counts the
        // first-declared category is kept.
        let mut best: Option<(Category, usize)> = None;
        for (category, triggers) in &self.keywords {
            let count = triggers
                .iter()
                .filter(|trigger| normalized.contains(trigger.as_str()))
                .count();
            if count == 0 {
                continue;
            }
            match best {
                Some((_, top)) if top >= count => {}
                _ => best = Some((*category, count)),
            }
        }

        best.map(|(category, _)| category)
            .unwrap_or(Category::Default)
    }

    pub fn respond(&self, query: &str) -> &str {
        self.response_for(self.classify(query))
    }

    pub fn answer(&self, query: &str) -> Answer<'_> {
        let category = self.classify(query);
        Answer {
            category,
            response: self.response_for(category),
        }
    }

    pub fn response_for(&self, category: Category) -> &str {
        self.responses
            .get(&category)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn help_info(&self) -> &HelpInfo {
        &self.help
    }

    pub fn keywords(&self) -> &KeywordTable {
        &self.keywords
    }

    fn is_greeting(&self, normalized: &str) -> bool {
        self.greetings
            .iter()
            .any(|greeting| normalized.contains(greeting.as_str()))
    }
}

impl Default for IntentResponder {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn normalize_query(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Shortens a query to at most `max_graphemes` user-visible characters for log lines.
pub fn query_preview(input: &str, max_graphemes: usize) -> String {
    let trimmed = input.trim();
    let mut graphemes = trimmed.graphemes(true);
    let preview = graphemes.by_ref().take(max_graphemes).collect::<String>();
    if graphemes.next().is_some() {
        format!("{preview}…")
    } else {
        preview
    }
}

fn parse_category(code: &str) -> Result<Category, TableError> {
    Category::parse(code).ok_or_else(|| TableError::UnknownCategory(code.to_string()))
}

fn builtin_help() -> HelpInfo {
    HelpInfo {
        features: HELP_FEATURES.iter().map(|f| f.to_string()).collect(),
        sample_queries: HELP_SAMPLE_QUERIES.iter().map(|q| q.to_string()).collect(),
    }
}
