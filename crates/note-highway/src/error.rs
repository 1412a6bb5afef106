use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HighwayError {
    #[error("no notes to derive a pitch range from")]
    EmptyInput,

    #[error("invalid {name}: {value}")]
    InvalidDimension { name: &'static str, value: f64 },
}

impl HighwayError {
    pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<f64, Self> {
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(Self::InvalidDimension { name, value })
        }
    }
}
