use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const HEIGHT_RANGE_CM: (f32, f32) = (120.0, 220.0);
pub const WEIGHT_RANGE_KG: (f32, f32) = (30.0, 200.0);

/// Raw form values as typed by the user.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MeasurementForm {
    pub height: f32,
    pub weight: f32,
    pub gender: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

/// Validated measurements, safe to send.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Measurements {
    pub height: f32,
    pub weight: f32,
    pub gender: Gender,
}

impl MeasurementForm {
    pub fn validate(&self) -> Result<Measurements> {
        let (min_h, max_h) = HEIGHT_RANGE_CM;
        if !self.height.is_finite() || !(min_h..=max_h).contains(&self.height) {
            return Err(AppError::InvalidInput(format!(
                "Height must be between {min_h}cm and {max_h}cm"
            )));
        }

        let (min_w, max_w) = WEIGHT_RANGE_KG;
        if !self.weight.is_finite() || !(min_w..=max_w).contains(&self.weight) {
            return Err(AppError::InvalidInput(format!(
                "Weight must be between {min_w}kg and {max_w}kg"
            )));
        }

        let gender = match self.gender.trim().to_lowercase().as_str() {
            "male" => Gender::Male,
            "female" => Gender::Female,
            _ => {
                return Err(AppError::InvalidInput(
                    "Gender must be \"male\" or \"female\"".into(),
                ))
            }
        };

        Ok(Measurements {
            height: self.height,
            weight: self.weight,
            gender,
        })
    }
}
