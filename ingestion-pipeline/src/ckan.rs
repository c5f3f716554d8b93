use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{dataset::Dataset, resource::Resource},
    },
    utils::config::AppConfig,
};

/// STJ open-data datasets tracked by the service.
pub const DEFAULT_DATASET_SLUGS: [&str; 2] = ["acordaos", "decisoes-monocraticas"];

/// Browser-like headers; the portal rejects bare programmatic user agents.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Debug, Deserialize)]
pub struct CkanEnvelope {
    pub success: bool,
    pub result: Option<CkanPackage>,
}

#[derive(Debug, Deserialize)]
pub struct CkanPackage {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub groups: Vec<CkanGroup>,
    #[serde(default)]
    pub resources: Vec<CkanResource>,
}

#[derive(Debug, Deserialize)]
pub struct CkanGroup {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CkanResource {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    #[serde(default)]
    pub format: Option<String>,
}

impl CkanResource {
    pub fn is_json(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
            || self.url.to_lowercase().ends_with(".json")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub datasets: usize,
    pub resources: usize,
    pub json_resources: usize,
}

pub struct CkanClient {
    http: reqwest::Client,
    download_http: reqwest::Client,
    base_url: String,
}

impl CkanClient {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;
        let download_http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            download_http,
            base_url: config.ckan_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Direct GET of a resource dump. Downloads get a longer deadline than
    /// the catalogue calls.
    pub async fn download_resource(&self, url: &str) -> Result<bytes::Bytes, AppError> {
        let bytes = self
            .download_http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes)
    }

    pub async fn package_show(&self, slug: &str) -> Result<CkanPackage, AppError> {
        let url = format!("{}/api/3/action/package_show", self.base_url);

        let envelope: CkanEnvelope = self
            .http
            .get(&url)
            .query(&[("id", slug)])
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_package(envelope, slug)
    }

    /// Refresh dataset and resource rows for every tracked dataset. Individual
    /// dataset failures are logged and skipped so one broken slug does not
    /// abort the sync.
    pub async fn sync_datasets(&self, db: &SurrealDbClient) -> Result<SyncSummary, AppError> {
        let mut summary = SyncSummary::default();

        for slug in DEFAULT_DATASET_SLUGS {
            let package = match self.package_show(slug).await {
                Ok(package) => package,
                Err(err) => {
                    warn!(%slug, error = %err, "Dataset sync skipped");
                    continue;
                }
            };

            let json_resources = package.resources.iter().filter(|r| r.is_json()).count();
            let category = package.groups.iter().find_map(|g| g.title.clone());
            let title = package.title.clone().unwrap_or_else(|| package.name.clone());

            Dataset::record_sync(
                &package.name,
                &title,
                category,
                package.resources.len() as i64,
                json_resources as i64,
                db,
            )
            .await?;

            for ckan_resource in &package.resources {
                let resource = Resource::new(
                    ckan_resource.id.clone(),
                    package.name.clone(),
                    ckan_resource.name.clone(),
                    ckan_resource.url.clone(),
                    ckan_resource.format.clone(),
                );
                resource.upsert_metadata(db).await?;
            }

            info!(
                %slug,
                resources = package.resources.len(),
                json_resources,
                "Dataset synced"
            );

            summary.datasets += 1;
            summary.resources += package.resources.len();
            summary.json_resources += json_resources;
        }

        Ok(summary)
    }
}

fn parse_package(envelope: CkanEnvelope, slug: &str) -> Result<CkanPackage, AppError> {
    if !envelope.success {
        return Err(AppError::Validation(format!(
            "CKAN returned success=false for dataset {slug}"
        )));
    }
    envelope
        .result
        .ok_or_else(|| AppError::NotFound(format!("Dataset {slug} not found on CKAN")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(value: serde_json::Value) -> CkanEnvelope {
        serde_json::from_value(value).expect("envelope should deserialize")
    }

    #[test]
    fn parses_a_package_with_resources() {
        let package = parse_package(
            envelope(serde_json::json!({
                "success": true,
                "result": {
                    "name": "acordaos",
                    "title": "Acórdãos do STJ",
                    "groups": [{"title": "Jurisprudência"}],
                    "resources": [
                        {
                            "id": "res-1",
                            "name": "acordaos-2024.json",
                            "url": "https://example.test/acordaos-2024.json",
                            "format": "JSON"
                        },
                        {
                            "id": "res-2",
                            "name": "acordaos-2024.csv",
                            "url": "https://example.test/acordaos-2024.csv",
                            "format": "CSV"
                        }
                    ]
                }
            })),
            "acordaos",
        )
        .expect("parse");

        assert_eq!(package.name, "acordaos");
        assert_eq!(package.resources.len(), 2);
        assert_eq!(package.resources.iter().filter(|r| r.is_json()).count(), 1);
    }

    #[test]
    fn json_detection_falls_back_to_url_extension() {
        let resource = CkanResource {
            id: "r".into(),
            name: None,
            url: "https://example.test/dump.JSON".into(),
            format: None,
        };
        assert!(resource.is_json());
    }

    #[test]
    fn unsuccessful_envelope_is_a_validation_error() {
        let result = parse_package(
            envelope(serde_json::json!({"success": false, "result": null})),
            "acordaos",
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn missing_result_is_not_found() {
        let result = parse_package(
            envelope(serde_json::json!({"success": true, "result": null})),
            "ghost",
        );
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
