//! Shared response envelope for the job endpoints.
//!
//! Job resources use a `{ "data": ... }` envelope. The work protocol
//! (`/service/work`) returns bare payloads that workers parse directly.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
