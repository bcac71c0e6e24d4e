//! Map settings document.
//!
//! Known fields are typed and validated; any other key is preserved as-is so
//! clients can store their own options alongside.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SettingsError;

/// Highest zoom a client may configure.
pub const MAX_SETTINGS_ZOOM: f64 = 24.0;

/// User-editable map configuration for one realm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSettings {
    /// `[longitude, latitude]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,

    /// `[west, south, east, north]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<[f64; 4]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_zoom: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geocode_url: Option<String>,

    /// Style overrides merged into the generated style document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Map<String, Value>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MapSettings {
    /// Parse and validate a settings document.
    pub fn from_value(doc: Value) -> Result<Self, SettingsError> {
        if !doc.is_object() {
            return Err(SettingsError::validation(
                "settings",
                "document must be a JSON object",
            ));
        }

        let settings: MapSettings = serde_json::from_value(doc)
            .map_err(|e| SettingsError::validation("settings", e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// The normalized JSON form that gets persisted.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if let Some([lon, lat]) = self.center {
            check_lon("center", lon)?;
            check_lat("center", lat)?;
        }

        if let Some([west, south, east, north]) = self.bounds {
            check_lon("bounds", west)?;
            check_lon("bounds", east)?;
            check_lat("bounds", south)?;
            check_lat("bounds", north)?;
            if south > north {
                return Err(SettingsError::validation(
                    "bounds",
                    format!("south {} is north of north {}", south, north),
                ));
            }
        }

        check_zoom("zoom", self.zoom)?;
        check_zoom("minZoom", self.min_zoom)?;
        check_zoom("maxZoom", self.max_zoom)?;

        let min = self.min_zoom.unwrap_or(0.0);
        let max = self.max_zoom.unwrap_or(MAX_SETTINGS_ZOOM);
        if min > max {
            return Err(SettingsError::validation(
                "minZoom",
                format!("minZoom {} is greater than maxZoom {}", min, max),
            ));
        }
        if let Some(zoom) = self.zoom {
            if zoom < min || zoom > max {
                return Err(SettingsError::validation(
                    "zoom",
                    format!("zoom {} is outside [{}, {}]", zoom, min, max),
                ));
            }
        }

        if let Some(geocode_url) = self.geocode_url.as_deref() {
            if !geocode_url.is_empty() {
                url::Url::parse(geocode_url)
                    .map_err(|e| SettingsError::validation("geocodeUrl", e.to_string()))?;
            }
        }

        Ok(())
    }
}

fn check_lon(field: &str, lon: f64) -> Result<(), SettingsError> {
    if lon.is_finite() && (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        Err(SettingsError::validation(
            field,
            format!("longitude {} is outside [-180, 180]", lon),
        ))
    }
}

fn check_lat(field: &str, lat: f64) -> Result<(), SettingsError> {
    if lat.is_finite() && (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        Err(SettingsError::validation(
            field,
            format!("latitude {} is outside [-90, 90]", lat),
        ))
    }
}

fn check_zoom(field: &str, zoom: Option<f64>) -> Result<(), SettingsError> {
    match zoom {
        Some(z) if !z.is_finite() || !(0.0..=MAX_SETTINGS_ZOOM).contains(&z) => {
            Err(SettingsError::validation(
                field,
                format!("{} is outside [0, {}]", z, MAX_SETTINGS_ZOOM),
            ))
        }
        _ => Ok(()),
    }
}
