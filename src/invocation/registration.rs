//! Registration (payload of REGISTER frames).

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// A client's self-declared identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RegistrationFields")]
pub struct Registration {
    client_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationFields {
    client_id: String,
}

impl TryFrom<RegistrationFields> for Registration {
    type Error = RelayError;

    fn try_from(fields: RegistrationFields) -> Result<Self> {
        Registration::new(fields.client_id)
    }
}

impl Registration {
    /// Create a registration. The client id must not be blank.
    pub fn new(client_id: impl Into<String>) -> Result<Self> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(RelayError::InvalidRequest(
                "clientId cannot be blank".to_string(),
            ));
        }
        Ok(Self { client_id })
    }

    #[inline]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}
