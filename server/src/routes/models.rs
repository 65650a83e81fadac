//! `GET /api/models`: the model registry with availability.

use axum::extract::State;
use axum::response::Json;
use lume_protocol::ModelSummary;

use crate::llm::registry::MODELS;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<ModelSummary>> {
    let models = MODELS
        .iter()
        .map(|model| ModelSummary {
            id: model.id.to_string(),
            provider: model.provider.as_str().to_string(),
            label: model.label.to_string(),
            reasoning: model.reasoning,
            available: state.llm.as_ref().is_some_and(|llm| llm.serves(model.provider)),
        })
        .collect();
    Json(models)
}
