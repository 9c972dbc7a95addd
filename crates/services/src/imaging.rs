use anyhow::{bail, Context, Result};
use growwise_core::disease::{analysis_error, assess};
use growwise_core::{ColorProfile, DiseaseAssessment};
use tracing::warn;

pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

pub fn is_allowed_filename(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_lowercase())
        .is_some_and(|extension| ALLOWED_EXTENSIONS.contains(&extension.as_str()))
}

/// Mean red, green and blue over every pixel of the decoded image.
pub fn color_profile(bytes: &[u8]) -> Result<ColorProfile> {
    let rgb = image::load_from_memory(bytes)
        .context("failed decoding image")?
        .to_rgb8();

    let pixel_count = u64::from(rgb.width()) * u64::from(rgb.height());
    if pixel_count == 0 {
        bail!("image has no pixels");
    }

    let (mut red, mut green, mut blue) = (0_u64, 0_u64, 0_u64);
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        red += u64::from(r);
        green += u64::from(g);
        blue += u64::from(b);
    }

    let count = pixel_count as f64;
    Ok(ColorProfile {
        red: red as f64 / count,
        green: green as f64 / count,
        blue: blue as f64 / count,
    })
}

/// Never fails: undecodable input yields the `analysis_error` assessment.
pub fn analyze_image(bytes: &[u8]) -> DiseaseAssessment {
    match color_profile(bytes) {
        Ok(profile) => assess(profile),
        Err(error) => {
            warn!(error = %format!("{error:#}"), "image analysis failed");
            analysis_error()
        }
    }
}

#[cfg(test)]
pub(crate) fn solid_png(color: [u8; 3]) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(8, 8, image::Rgb(color));
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encoding should succeed");
    out.into_inner()
}
