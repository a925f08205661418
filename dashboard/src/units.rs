use serde::{Deserialize, Serialize};

/// Display unit for temperatures. Tags always report Fahrenheit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Fahrenheit,
    Celsius,
}

impl TemperatureUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Celsius => "°C",
        }
    }

    /// Converts a raw Fahrenheit reading into this unit.
    pub fn from_fahrenheit(self, fahrenheit: f64) -> f64 {
        match self {
            TemperatureUnit::Fahrenheit => fahrenheit,
            TemperatureUnit::Celsius => fahrenheit_to_celsius(fahrenheit),
        }
    }
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn format_temperature(fahrenheit: f64, unit: TemperatureUnit) -> String {
    format!("{:.1} {}", unit.from_fahrenheit(fahrenheit), unit.symbol())
}
