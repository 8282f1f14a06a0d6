// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{
    Client as DynamoClient,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::Blob,
    types::AttributeValue,
};
use chrono::Utc;
use tracing::info;

use super::{StateStore, StoreKey};
use crate::error::StoreError;

const KEY_ATTRIBUTE: &str = "key";
const VALUE_ATTRIBUTE: &str = "value";
const UPDATED_AT_ATTRIBUTE: &str = "updated_at";

/// DynamoDB table keyed by the logical store key. Reads are strongly
/// consistent so a put on one node is visible to a get on any other.
#[derive(Clone)]
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Returns `None` when neither `DYNAMODB_ENDPOINT` nor `AWS_REGION` is set.
    pub async fn from_env() -> Option<Self> {
        if std::env::var("DYNAMODB_ENDPOINT").is_err() && std::env::var("AWS_REGION").is_err() {
            return None;
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Ok(endpoint) = std::env::var("DYNAMODB_ENDPOINT") {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        let table_name = std::env::var("BRIDGE_STATE_TABLE")
            .ok()
            .unwrap_or_else(|| "arena_bridge_state".to_string());

        info!(table_name = %table_name, "DynamoDB bridge state store enabled");
        Some(Self::new(DynamoClient::new(&config), table_name))
    }

    fn key_value(key: &StoreKey) -> AttributeValue {
        AttributeValue::S(key.as_str().to_string())
    }

    async fn read(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(KEY_ATTRIBUTE, Self::key_value(key))
            .consistent_read(true)
            .send()
            .await
            .map_err(|error| {
                StoreError::unavailable(format!(
                    "get {key} failed: {}",
                    DisplayErrorContext(&error)
                ))
            })?;

        let Some(item) = output.item() else {
            return Ok(None);
        };
        match item.get(VALUE_ATTRIBUTE) {
            Some(AttributeValue::B(blob)) => Ok(Some(blob.as_ref().to_vec())),
            Some(_) | None => Ok(Some(Vec::new())),
        }
    }
}

#[async_trait]
impl StateStore for DynamoStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.read(key).await
    }

    async fn put(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item(KEY_ATTRIBUTE, Self::key_value(key))
            .item(VALUE_ATTRIBUTE, AttributeValue::B(Blob::new(value)))
            .item(
                UPDATED_AT_ATTRIBUTE,
                AttributeValue::S(Utc::now().to_rfc3339()),
            )
            .send()
            .await
            .map_err(|error| {
                StoreError::unavailable(format!(
                    "put {key} failed: {}",
                    DisplayErrorContext(&error)
                ))
            })?;
        Ok(())
    }

    async fn remove(&self, key: &StoreKey) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(KEY_ATTRIBUTE, Self::key_value(key))
            .send()
            .await
            .map_err(|error| {
                StoreError::unavailable(format!(
                    "delete {key} failed: {}",
                    DisplayErrorContext(&error)
                ))
            })?;
        Ok(())
    }

    async fn contains_key(&self, key: &StoreKey) -> Result<bool, StoreError> {
        Ok(self.read(key).await?.is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &StoreKey,
        expected: Option<Vec<u8>>,
        replacement: Option<Vec<u8>>,
    ) -> Result<bool, StoreError> {
        match (expected, replacement) {
            (None, None) => Ok(!self.contains_key(key).await?),
            (None, Some(value)) => {
                let result = self
                    .client
                    .put_item()
                    .table_name(&self.table_name)
                    .item(KEY_ATTRIBUTE, Self::key_value(key))
                    .item(VALUE_ATTRIBUTE, AttributeValue::B(Blob::new(value)))
                    .item(
                        UPDATED_AT_ATTRIBUTE,
                        AttributeValue::S(Utc::now().to_rfc3339()),
                    )
                    .condition_expression("attribute_not_exists(#k)")
                    .expression_attribute_names("#k", KEY_ATTRIBUTE)
                    .send()
                    .await;
                conditional_outcome(result, "conditional put", key)
            }
            (Some(current), Some(value)) => {
                let result = self
                    .client
                    .put_item()
                    .table_name(&self.table_name)
                    .item(KEY_ATTRIBUTE, Self::key_value(key))
                    .item(VALUE_ATTRIBUTE, AttributeValue::B(Blob::new(value)))
                    .item(
                        UPDATED_AT_ATTRIBUTE,
                        AttributeValue::S(Utc::now().to_rfc3339()),
                    )
                    .condition_expression("#v = :expected")
                    .expression_attribute_names("#v", VALUE_ATTRIBUTE)
                    .expression_attribute_values(":expected", AttributeValue::B(Blob::new(current)))
                    .send()
                    .await;
                conditional_outcome(result, "compare-and-swap", key)
            }
            (Some(current), None) => {
                let result = self
                    .client
                    .delete_item()
                    .table_name(&self.table_name)
                    .key(KEY_ATTRIBUTE, Self::key_value(key))
                    .condition_expression("#v = :expected")
                    .expression_attribute_names("#v", VALUE_ATTRIBUTE)
                    .expression_attribute_values(":expected", AttributeValue::B(Blob::new(current)))
                    .send()
                    .await;
                conditional_outcome(result, "conditional delete", key)
            }
        }
    }
}

/// Maps a failed condition check to `false` and any other failure to
/// `Unavailable`.
fn conditional_outcome<T, E, R>(
    result: Result<T, SdkError<E, R>>,
    operation: &str,
    key: &StoreKey,
) -> Result<bool, StoreError>
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match result {
        Ok(_) => Ok(true),
        Err(error)
            if error
                .as_service_error()
                .is_some_and(|service| service.code() == Some("ConditionalCheckFailedException")) =>
        {
            Ok(false)
        }
        Err(error) => Err(StoreError::unavailable(format!(
            "{operation} {key} failed: {}",
            DisplayErrorContext(&error)
        ))),
    }
}
