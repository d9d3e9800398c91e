// Branding settings are a small JSON blob administrators edit rarely. The
// stored row holds overrides only; readers merge them over typed defaults so
// a half-filled row still yields a complete config.

use serde::{Deserialize, Serialize};

use crate::db::Db;

pub const BRANDING_CATEGORY: &str = "branding";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Branding {
    /// Hex color, e.g. "#1D4ED8".
    pub primary_color: String,
    pub company_name: String,
    pub logo_url: Option<String>,
}

impl Default for Branding {
    fn default() -> Self {
        Branding {
            primary_color: "#1D4ED8".into(),
            company_name: "RustiLMS".into(),
            logo_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrandingOverrides {
    pub primary_color: Option<String>,
    pub company_name: Option<String>,
    pub logo_url: Option<String>,
}

pub fn merge(defaults: Branding, overrides: BrandingOverrides) -> Branding {
    Branding {
        primary_color: overrides.primary_color.unwrap_or(defaults.primary_color),
        company_name: overrides.company_name.unwrap_or(defaults.company_name),
        logo_url: overrides.logo_url.or(defaults.logo_url),
    }
}

/// Missing row, empty blob, or unparseable blob all degrade to defaults.
pub async fn load_branding(db: &Db) -> Result<Branding, sqlx::Error> {
    let row: Option<(serde_json::Value,)> =
        sqlx::query_as("SELECT data FROM settings WHERE category = $1")
            .bind(BRANDING_CATEGORY)
            .fetch_optional(db)
            .await?;
    let overrides = row
        .and_then(|(data,)| serde_json::from_value(data).ok())
        .unwrap_or_default();
    Ok(merge(Branding::default(), overrides))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_overrides_keep_defaults() {
        let merged = merge(Branding::default(), BrandingOverrides::default());
        assert_eq!(merged, Branding::default());
    }

    #[test]
    fn overrides_win_field_by_field() {
        let overrides = BrandingOverrides {
            primary_color: Some("#AA0000".into()),
            company_name: None,
            logo_url: Some("/files/logo.png".into()),
        };
        let merged = merge(Branding::default(), overrides);
        assert_eq!(merged.primary_color, "#AA0000");
        assert_eq!(merged.company_name, Branding::default().company_name);
        assert_eq!(merged.logo_url.as_deref(), Some("/files/logo.png"));
    }

    #[test]
    fn unknown_keys_in_stored_blob_are_ignored() {
        let blob = serde_json::json!({
            "primaryColor": "#003366",
            "favicon": "ignored.ico"
        });
        let overrides: BrandingOverrides = serde_json::from_value(blob).unwrap();
        let merged = merge(Branding::default(), overrides);
        assert_eq!(merged.primary_color, "#003366");
    }
}
