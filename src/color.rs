use std::collections::BTreeMap;

use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<[u8; 3]> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            [
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            ]
        })
        .collect()
}

fn to_hex([r, g, b]: [u8; 3]) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

// ---------------------------------------------------------------------------
// Treatment → colour
// ---------------------------------------------------------------------------

/// Stable colour per treatment, handed to plotting tools with the summaries.
#[derive(Debug, Clone)]
pub struct TreatmentColors {
    mapping: BTreeMap<String, String>,
    default_color: String,
}

impl TreatmentColors {
    /// Assign palette colours to treatments in the given order.
    pub fn new<I, S>(treatments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = treatments.into_iter().map(Into::into).collect();
        let palette = generate_palette(names.len());
        let mapping = names
            .into_iter()
            .zip(palette.into_iter().map(to_hex))
            .collect();
        TreatmentColors {
            mapping,
            default_color: "#808080".to_string(),
        }
    }

    /// Replace the generated colour for one treatment (e.g. `"#83bb03"`).
    pub fn set(&mut self, treatment: &str, hex: &str) {
        self.mapping.insert(treatment.to_string(), hex.to_string());
    }

    pub fn hex(&self, treatment: &str) -> String {
        self.mapping
            .get(treatment)
            .cloned()
            .unwrap_or_else(|| self.default_color.clone())
    }
}
