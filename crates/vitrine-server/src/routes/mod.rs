pub mod health;
pub mod search;

use crate::error::ServerError;

pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
