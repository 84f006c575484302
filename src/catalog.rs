use crate::error::AppError;
use crate::model_filter::ModelFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamModelList {
    pub data: Vec<UpstreamModel>,
}

/// Upstream catalog entry; everything besides `id` and `created` is dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamModel {
    pub id: String,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl From<UpstreamModel> for ModelEntry {
    fn from(model: UpstreamModel) -> Self {
        let owned_by = owner_of(&model.id).to_string();
        Self {
            id: model.id,
            object: "model".to_string(),
            created: model.created,
            owned_by,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

/// Provider prefix of a model id, or `""` for unqualified ids.
pub fn owner_of(model_id: &str) -> &str {
    model_id
        .split_once('/')
        .map(|(owner, _)| owner)
        .unwrap_or("")
}

pub fn parse_upstream(value: Value) -> Result<UpstreamModelList, AppError> {
    serde_json::from_value(value).map_err(|err| {
        AppError::internal(
            "upstream_models_invalid",
            format!("unexpected upstream model list: {err}"),
        )
    })
}

/// Applies the allow-list and reshapes entries, keeping upstream order.
pub fn build_model_list(upstream: UpstreamModelList, filter: Option<&ModelFilter>) -> ModelList {
    let data = upstream
        .data
        .into_iter()
        .filter(|model| filter.is_none_or(|f| f.allows(&model.id)))
        .map(ModelEntry::from)
        .collect();
    ModelList {
        object: "list".to_string(),
        data,
    }
}
