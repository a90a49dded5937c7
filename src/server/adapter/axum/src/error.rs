/* src/server/adapter/axum/src/error.rs */

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use ridge_server::RidgeError;

/// Newtype so `RidgeError` can implement `IntoResponse` despite the orphan rule.
pub(crate) struct AxumError(pub RidgeError);

impl IntoResponse for AxumError {
  fn into_response(self) -> Response {
    self.0.into_response().map(Body::from)
  }
}

impl From<RidgeError> for AxumError {
  fn from(err: RidgeError) -> Self {
    Self(err)
  }
}
