use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WasteCategory {
    Biodegradable,
    Recyclable,
    #[serde(rename = "Domestic Hazardous")]
    DomesticHazardous,
}

impl WasteCategory {
    pub const ALL: [WasteCategory; 3] = [
        WasteCategory::Biodegradable,
        WasteCategory::Recyclable,
        WasteCategory::DomesticHazardous,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Biodegradable => "Biodegradable",
            Self::Recyclable => "Recyclable",
            Self::DomesticHazardous => "Domestic Hazardous",
        }
    }

    /// Only non-hazardous bins come with do-it-yourself tips.
    pub fn allows_tips(self) -> bool {
        !matches!(self, Self::DomesticHazardous)
    }

    pub fn bin(self) -> &'static str {
        match self {
            Self::Biodegradable => "GREEN",
            Self::Recyclable => "BLUE",
            Self::DomesticHazardous => "RED",
        }
    }

    pub fn disposal_guidance(self) -> &'static str {
        match self {
            Self::Biodegradable => {
                "This is biodegradable waste. Please dump it in the GREEN bin."
            }
            Self::Recyclable => "This is recyclable waste. Please dump it in the BLUE bin.",
            Self::DomesticHazardous => {
                "This is domestic hazardous waste. Please dump it in the RED bin."
            }
        }
    }

    pub fn examples(self) -> &'static str {
        match self {
            Self::Biodegradable => "e.g., Vegetable peels, leftover food, garden leaves, tea bags.",
            Self::Recyclable => "e.g., Plastic bottles, paper, cardboard, metal tins, glass.",
            Self::DomesticHazardous => {
                "e.g., Paint cans, used batteries, expired medicines, broken thermometers."
            }
        }
    }
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WasteCategory {
    type Err = ScanError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == raw)
            .ok_or_else(|| {
                ScanError::schema(
                    "waste_category",
                    format!("'{raw}' is not one of Biodegradable, Recyclable, Domestic Hazardous"),
                )
            })
    }
}
