use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use checkout_engine::{db_types::Shortfall, CheckoutError};
use log::error;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request query: {0}")]
    InvalidRequestQuery(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("{0}")]
    Checkout(#[from] CheckoutError),
}

impl ServerError {
    /// A short, stable, machine-readable name for the error. Clients switch on this rather than the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequestBody(_) | Self::InvalidRequestQuery(_) => "validation-error",
            Self::InitializeError(_) | Self::IOError(_) | Self::Unspecified(_) => "internal-error",
            Self::Checkout(e) => match e {
                CheckoutError::Validation(_) => "validation-error",
                CheckoutError::EventNotFound(_) => "event-not-found",
                CheckoutError::EventNotSellable { .. } => "event-not-sellable",
                CheckoutError::UnitNotFound(_) => "unit-not-found",
                CheckoutError::InsufficientInventory(_) => "insufficient-inventory",
                CheckoutError::OrderNotFound(_) => "order-not-found",
                CheckoutError::StateConflict { .. } => "state-conflict",
                CheckoutError::HoldStillActive { .. } => "hold-still-active",
                CheckoutError::StorageUnavailable(_) => "storage-unavailable",
                CheckoutError::Internal(_) => "internal-error",
            },
        }
    }

    fn shortfalls(&self) -> Option<&[Shortfall]> {
        match self {
            Self::Checkout(CheckoutError::InsufficientInventory(shortfalls)) => Some(shortfalls),
            _ => None,
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestQuery(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Checkout(e) => match e {
                CheckoutError::Validation(_) => StatusCode::BAD_REQUEST,
                CheckoutError::EventNotSellable { .. } => StatusCode::BAD_REQUEST,
                CheckoutError::EventNotFound(_) => StatusCode::NOT_FOUND,
                CheckoutError::UnitNotFound(_) => StatusCode::NOT_FOUND,
                CheckoutError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                CheckoutError::InsufficientInventory(_) => StatusCode::CONFLICT,
                CheckoutError::StateConflict { .. } => StatusCode::CONFLICT,
                CheckoutError::HoldStillActive { .. } => StatusCode::CONFLICT,
                CheckoutError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                CheckoutError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ Request failed with {status}. {self}");
        }
        let mut body = json!({ "error": self.kind(), "message": self.to_string() });
        if let Some(shortfalls) = self.shortfalls() {
            body["shortfalls"] = json!(shortfalls);
        }
        HttpResponse::build(status).insert_header(ContentType::json()).body(body.to_string())
    }
}
