use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Weather,
    Prices,
    Disease,
    Fertilizer,
    Cultivation,
    Pest,
    Soil,
    Season,
    Greeting,
    Default,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Self::Weather,
        Self::Prices,
        Self::Disease,
        Self::Fertilizer,
        Self::Cultivation,
        Self::Pest,
        Self::Soil,
        Self::Season,
        Self::Greeting,
        Self::Default,
    ];

    /// Categories that take part in keyword scoring, in declaration order.
    pub const SCORED: [Category; 8] = [
        Self::Weather,
        Self::Prices,
        Self::Disease,
        Self::Fertilizer,
        Self::Cultivation,
        Self::Pest,
        Self::Soil,
        Self::Season,
    ];

    pub fn is_scored(self) -> bool {
        !matches!(self, Self::Greeting | Self::Default)
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::Prices => "prices",
            Self::Disease => "disease",
            Self::Fertilizer => "fertilizer",
            Self::Cultivation => "cultivation",
            Self::Pest => "pest",
            Self::Soil => "soil",
            Self::Season => "season",
            Self::Greeting => "greeting",
            Self::Default => "default",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_code() == value)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpInfo {
    pub features: Vec<String>,
    pub sample_queries: Vec<String>,
}

/// A classified voice query together with the canned response for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Answer<'a> {
    pub category: Category,
    pub response: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiseaseKind {
    Healthy,
    BrownSpots,
    YellowLeaves,
    DarkPatches,
    WhitePatches,
    AnalysisError,
}

impl DiseaseKind {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::BrownSpots => "brown_spots",
            Self::YellowLeaves => "yellow_leaves",
            Self::DarkPatches => "dark_patches",
            Self::WhitePatches => "white_patches",
            Self::AnalysisError => "analysis_error",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Healthy => "Plant Appears Healthy",
            Self::BrownSpots => "Possible Brown Spot Disease",
            Self::YellowLeaves => "Possible Yellowing/Chlorosis",
            Self::DarkPatches => "Possible Blight or Bacterial Infection",
            Self::WhitePatches => "Possible Powdery Mildew",
            Self::AnalysisError => "Analysis Error",
        }
    }

    pub fn treatment(self) -> &'static str {
        match self {
            Self::Healthy => {
                "Continue with regular care and monitoring. Maintain proper watering and fertilization."
            }
            Self::BrownSpots => {
                "Apply copper-based fungicide spray. Remove affected leaves and improve air circulation."
            }
            Self::YellowLeaves => {
                "Check for nutrient deficiency (nitrogen). Ensure proper watering and fertilization."
            }
            Self::DarkPatches => {
                "Remove infected parts immediately. Apply bactericide and ensure good drainage."
            }
            Self::WhitePatches => {
                "Improve air circulation. Apply fungicide spray and avoid overhead watering."
            }
            Self::AnalysisError => {
                "Unable to analyze image. Please ensure the image shows clear plant leaves and try again."
            }
        }
    }
}

/// Average channel values of an image, each in `0.0..=255.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorProfile {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseAssessment {
    pub disease: DiseaseKind,
    pub confidence: f64,
    pub treatment: String,
    pub formatted_name: String,
}

impl DiseaseAssessment {
    pub fn new(disease: DiseaseKind, confidence: f64) -> Self {
        Self {
            disease,
            confidence,
            treatment: disease.treatment().to_string(),
            formatted_name: disease.display_name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherLookup {
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub city: String,
    pub country: Option<String>,
    pub temperature: f64,
    pub description: Option<String>,
    pub humidity: Option<i64>,
    pub wind_speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPrice {
    pub category: String,
    pub name: String,
    pub price: String,
}

impl MarketPrice {
    pub fn new(category: &str, name: &str, price: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            price: price.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceQueryRecord {
    pub id: String,
    pub query: String,
    pub response: String,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub disease: String,
    pub confidence: f64,
    pub treatment: Option<String>,
    pub formatted_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub id: String,
    pub city: String,
    pub country: Option<String>,
    pub temperature: f64,
    pub description: Option<String>,
    pub humidity: Option<i64>,
    pub wind_speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseCount {
    pub disease: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppStats {
    pub total_predictions: i64,
    pub weather_queries: i64,
    pub voice_queries: i64,
    pub common_diseases: Vec<DiseaseCount>,
}
