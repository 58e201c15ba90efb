use shared::TransportError;
use thiserror::Error;

use crate::info::Role;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is already active as {0}; leave it before switching roles")]
    RoleAlreadyActive(Role),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
