use adl_schemas::{normalize_country_code, AttributionMode, CampaignAttributionSetting, CampaignRef};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttributionError {
    #[error("single attribution requires a two-letter country code")]
    MissingCountry,
    #[error("country code '{0}' is not ISO-3166 alpha-2")]
    InvalidCountry(String),
    #[error("campaign_id is required")]
    MissingCampaign,
}

/// Read/write surface for per-campaign settings. Only explicit user action
/// writes here.
#[async_trait::async_trait]
pub trait AttributionStore: Send + Sync {
    /// `None` when the campaign has never been configured.
    async fn get(&self, campaign: &CampaignRef) -> anyhow::Result<Option<CampaignAttributionSetting>>;

    async fn put(&self, setting: &CampaignAttributionSetting) -> anyhow::Result<()>;

    async fn list_for_user(&self, user_id: &str) -> anyhow::Result<Vec<CampaignAttributionSetting>>;

    /// Stored setting, or the `none` default for an unseen campaign.
    async fn effective(&self, campaign: &CampaignRef) -> anyhow::Result<CampaignAttributionSetting> {
        Ok(self
            .get(campaign)
            .await?
            .unwrap_or_else(|| CampaignAttributionSetting::default_for(campaign.clone())))
    }
}

/// Normalize a setting before it is stored: `single` needs an alpha-2
/// country (upper-cased); other modes drop the country.
pub fn validate_setting(
    mut setting: CampaignAttributionSetting,
) -> Result<CampaignAttributionSetting, AttributionError> {
    if setting.campaign.campaign_id.trim().is_empty() {
        return Err(AttributionError::MissingCampaign);
    }
    match setting.mode {
        AttributionMode::Single => {
            let raw = setting
                .country_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .ok_or(AttributionError::MissingCountry)?;
            let code = normalize_country_code(raw)
                .ok_or_else(|| AttributionError::InvalidCountry(raw.to_string()))?;
            setting.country_code = Some(code);
        }
        AttributionMode::None | AttributionMode::Multiple => setting.country_code = None,
    }
    Ok(setting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adl_schemas::Platform;

    fn s(mode: AttributionMode, country: Option<&str>) -> CampaignAttributionSetting {
        CampaignAttributionSetting {
            campaign: CampaignRef::new("u1", Platform::TikTokAds, "c1"),
            mode,
            country_code: country.map(str::to_string),
        }
    }

    #[test]
    fn single_country_is_upper_cased() {
        let v = validate_setting(s(AttributionMode::Single, Some("us"))).unwrap();
        assert_eq!(v.country_code.as_deref(), Some("US"));
    }

    #[test]
    fn single_requires_a_valid_country() {
        assert_eq!(
            validate_setting(s(AttributionMode::Single, None)).unwrap_err(),
            AttributionError::MissingCountry
        );
        assert_eq!(
            validate_setting(s(AttributionMode::Single, Some("USA"))).unwrap_err(),
            AttributionError::InvalidCountry("USA".into())
        );
    }

    #[test]
    fn other_modes_drop_country() {
        let v = validate_setting(s(AttributionMode::Multiple, Some("US"))).unwrap();
        assert_eq!(v.country_code, None);
    }

    #[test]
    fn setting_round_trips_through_json() {
        let v = validate_setting(s(AttributionMode::Single, Some("de"))).unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("\"mode\":\"single\""));
        let back: CampaignAttributionSetting = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
