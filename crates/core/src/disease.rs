use crate::models::{ColorProfile, DiseaseAssessment, DiseaseKind};

/// Maps the average colour of a leaf photo to a likely condition and a
/// confidence percentage. Rules are checked in order; the first hit wins.
/// A profile with no colour at all cannot be assessed.
pub fn assess_colors(profile: ColorProfile) -> (DiseaseKind, f64) {
    let ColorProfile { red, green, blue } = profile;
    let total = red + green + blue;
    if total <= 0.0 {
        return (DiseaseKind::AnalysisError, 0.0);
    }
    let (green_ratio, red_ratio) = (green / total, red / total);

    if green_ratio > 0.4 && green > red && green > blue {
        (DiseaseKind::Healthy, 85.0)
    } else if red_ratio > 0.35 && red > green {
        (DiseaseKind::BrownSpots, 75.0)
    } else if red > 150.0 && green > 150.0 && blue < 100.0 {
        (DiseaseKind::YellowLeaves, 70.0)
    } else if red < 100.0 && green < 100.0 && blue < 100.0 {
        (DiseaseKind::DarkPatches, 65.0)
    } else if red > 200.0 && green > 200.0 && blue > 200.0 {
        (DiseaseKind::WhitePatches, 60.0)
    } else {
        (DiseaseKind::Healthy, 50.0)
    }
}

pub fn assess(profile: ColorProfile) -> DiseaseAssessment {
    let (kind, confidence) = assess_colors(profile);
    DiseaseAssessment::new(kind, confidence)
}

pub fn analysis_error() -> DiseaseAssessment {
    DiseaseAssessment::new(DiseaseKind::AnalysisError, 0.0)
}
