use serde::Serialize;

use super::{CredentialId, UserId};

/// A code host, identified by its external service id/type pair. At most one
/// credential is associated per host per viewer: a user credential if one
/// exists, otherwise the site credential for the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeHost {
    pub external_service_id: String,
    pub external_service_type: String,
    pub url: String,
}

/// A stored authentication credential for one code host. `user_id` is `None`
/// for site credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub id: CredentialId,
    pub user_id: Option<UserId>,
    pub external_service_id: String,
    pub external_service_type: String,
    /// Opaque to this layer; decryption happens in the credential service.
    #[serde(skip)]
    pub token: String,
}

impl Credential {
    pub fn is_site_credential(&self) -> bool {
        self.user_id.is_none()
    }
}
