//! Conversation endpoints

use axum::{
  extract::{Extension, Json, Path, State},
  response::Json as ResponseJson,
};
use uuid::Uuid;

use crate::server::middleware::RequestContext;
use crate::server::models::identity::Identity;
use crate::server::startup::AppState;
use crate::server::types::{
  ApiFailure, BaseResponse, ChatDetailResponse, ChatHistoryResponse, CreateChatRequest, CreateChatResponse,
};

/// POST /api/v1/chat - Start a conversation titled by its opening message
pub async fn create_chat(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  identity: Identity,
  Json(request): Json<CreateChatRequest>,
) -> Result<ResponseJson<BaseResponse<CreateChatResponse>>, ApiFailure> {
  let transaction_id = Uuid::new_v4();
  let title = request.message.trim();
  if title.is_empty() {
    return Err(ApiFailure::bad_request("invalid_request", "message must not be empty", transaction_id));
  }

  match state.conversations.create(&identity.user_id, title).await {
    Ok(conversation) => {
      context.log_success(&format!("Created conversation {}", conversation.id), "chat-api").await;
      let response = CreateChatResponse {
        id: conversation.id,
        title: conversation.title,
        created_at: conversation.created_at,
      };
      Ok(ResponseJson(BaseResponse::success(response, transaction_id)))
    }
    Err(e) => {
      context.log_error(&format!("Failed to create conversation: {e:#}"), "chat-api").await;
      Err(ApiFailure::internal("chat_create_failed", "Failed to create conversation", transaction_id))
    }
  }
}

/// GET /api/v1/chat/history - Caller's conversations, most recent first
pub async fn chat_history(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  identity: Identity,
) -> Result<ResponseJson<BaseResponse<ChatHistoryResponse>>, ApiFailure> {
  let transaction_id = Uuid::new_v4();
  match state.conversations.history(&identity.user_id).await {
    Ok(conversations) => {
      Ok(ResponseJson(BaseResponse::success(ChatHistoryResponse { conversations }, transaction_id)))
    }
    Err(e) => {
      context.log_error(&format!("Failed to list conversations: {e:#}"), "chat-api").await;
      Err(ApiFailure::internal("chat_history_failed", "Failed to list conversations", transaction_id))
    }
  }
}

/// GET /api/v1/chat/{id} - One conversation with its transcript
pub async fn get_chat(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  identity: Identity,
  Path(id): Path<String>,
) -> Result<ResponseJson<BaseResponse<ChatDetailResponse>>, ApiFailure> {
  let transaction_id = Uuid::new_v4();
  let failed = |e: anyhow::Error| ApiFailure::internal("chat_read_failed", &format!("{e:#}"), transaction_id);

  let conversation = match state.conversations.find(&id, &identity.user_id).await {
    Ok(Some(conversation)) => conversation,
    Ok(None) => {
      return Err(ApiFailure::not_found(
        "conversation_not_found",
        &format!("Conversation {id} not found"),
        transaction_id,
      ))
    }
    Err(e) => {
      context.log_error(&format!("Failed to load conversation {id}: {e:#}"), "chat-api").await;
      return Err(failed(e));
    }
  };

  let messages = state.conversations.messages(&id).await.map_err(failed)?;
  Ok(ResponseJson(BaseResponse::success(ChatDetailResponse { conversation, messages }, transaction_id)))
}
