use std::collections::HashMap;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ProcessingError;
use crate::models::case::Case;
use crate::models::template::{Channel, Template};
use crate::ports::FulfilmentLookup;

const FIND_CASE_SQL: &str = "SELECT c.id, c.collection_exercise_id, x.survey_id, c.sample, c.sample_sensitive \
     FROM cases c \
     JOIN collection_exercise x ON x.id = c.collection_exercise_id \
     WHERE c.id = $1";

const FIND_SMS_TEMPLATE_SQL: &str =
    "SELECT pack_code, template, notify_template_id, notify_service_ref \
     FROM sms_template WHERE pack_code = $1";

const FIND_EMAIL_TEMPLATE_SQL: &str =
    "SELECT pack_code, template, notify_template_id, notify_service_ref \
     FROM email_template WHERE pack_code = $1";

const SMS_TEMPLATE_ON_SURVEY_SQL: &str =
    "SELECT EXISTS(SELECT 1 FROM fulfilment_survey_sms_template \
     WHERE sms_template_pack_code = $1 AND survey_id = $2)";

const EMAIL_TEMPLATE_ON_SURVEY_SQL: &str =
    "SELECT EXISTS(SELECT 1 FROM fulfilment_survey_email_template \
     WHERE email_template_pack_code = $1 AND survey_id = $2)";

/// Read-only Postgres access to cases, templates and the per-survey
/// fulfilment allow-lists.
pub struct Store {
    client: Client,
}

impl Store {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let (client, connection) = tokio_postgres::connect(&config.database_url, NoTls)
            .await
            .map_err(|_| anyhow!("Failed to connect to Postgres"))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Postgres connection closed");
            }
        });

        info!("Postgres connection established");

        Ok(Self { client })
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Postgres ping failed: {e}"))?;
        Ok(())
    }

    fn store_error(e: tokio_postgres::Error) -> ProcessingError {
        ProcessingError::RemoteCall {
            service: "reference data store",
            source: e.into(),
        }
    }
}

fn string_map(value: Option<serde_json::Value>) -> HashMap<String, String> {
    let Some(serde_json::Value::Object(map)) = value else {
        return HashMap::new();
    };

    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}

fn template_from_row(row: &Row) -> Template {
    let items: Option<serde_json::Value> = row.get("template");
    let items = match items {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Template {
        pack_code: row.get("pack_code"),
        items,
        provider_template_id: row.get("notify_template_id"),
        service_ref: row.get("notify_service_ref"),
    }
}

#[async_trait]
impl FulfilmentLookup for Store {
    async fn find_case(&self, case_id: Uuid) -> Result<Case, ProcessingError> {
        let row = self
            .client
            .query_opt(FIND_CASE_SQL, &[&case_id])
            .await
            .map_err(Self::store_error)?
            .ok_or_else(|| ProcessingError::NotFound("Case does not exist".to_string()))?;

        Ok(Case {
            id: row.get("id"),
            collection_exercise_id: row.get("collection_exercise_id"),
            survey_id: row.get("survey_id"),
            sample: string_map(row.get("sample")),
            sample_sensitive: string_map(row.get("sample_sensitive")),
        })
    }

    async fn find_template(
        &self,
        channel: Channel,
        pack_code: &str,
    ) -> Result<Template, ProcessingError> {
        let sql = match channel {
            Channel::Sms => FIND_SMS_TEMPLATE_SQL,
            Channel::Email => FIND_EMAIL_TEMPLATE_SQL,
        };

        debug!(%channel, pack_code, "Looking up template");

        let row = self
            .client
            .query_opt(sql, &[&pack_code])
            .await
            .map_err(Self::store_error)?
            .ok_or_else(|| ProcessingError::NotFound("Template does not exist".to_string()))?;

        Ok(template_from_row(&row))
    }

    async fn template_allowed_on_survey(
        &self,
        channel: Channel,
        pack_code: &str,
        survey_id: Uuid,
    ) -> Result<bool, ProcessingError> {
        let sql = match channel {
            Channel::Sms => SMS_TEMPLATE_ON_SURVEY_SQL,
            Channel::Email => EMAIL_TEMPLATE_ON_SURVEY_SQL,
        };

        let row = self
            .client
            .query_one(sql, &[&pack_code, &survey_id])
            .await
            .map_err(Self::store_error)?;

        Ok(row.get(0))
    }
}
