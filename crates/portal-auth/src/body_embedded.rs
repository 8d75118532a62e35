use async_trait::async_trait;
use chargeguard_core_types::{PortalError, PortalResult, Secret};
use portal_net::{Body, NetRequest};
use serde_json::{Map, Value};

use crate::strategy::{AuthScheme, AuthStrategy};

/// Where the credential object is placed inside the JSON body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbedTarget {
    /// Top level of the body object.
    Root,
    /// Inside the single request envelope, e.g. `{"getDisputeRequest": {..}}`.
    Envelope,
}

/// Credentials merged into every request body instead of headers.
#[derive(Clone, Debug)]
pub struct BodyEmbeddedCredentials {
    field: String,
    credentials: Vec<(String, Secret)>,
    target: EmbedTarget,
}

impl BodyEmbeddedCredentials {
    pub fn new(
        field: impl Into<String>,
        credentials: Vec<(String, Secret)>,
        target: EmbedTarget,
    ) -> PortalResult<Self> {
        if credentials.iter().any(|(_, secret)| secret.is_empty()) {
            return Err(PortalError::Configuration(
                "body-embedded credential value is empty".into(),
            ));
        }
        Ok(Self {
            field: field.into(),
            credentials,
            target,
        })
    }

    fn credential_object(&self) -> Value {
        let map: Map<String, Value> = self
            .credentials
            .iter()
            .map(|(key, secret)| (key.clone(), Value::String(secret.expose().to_string())))
            .collect();
        Value::Object(map)
    }

    /// Rebuilds `object` with the credentials as its first member; some
    /// portals reject envelopes where authentication is not first.
    fn prepend(&self, object: &mut Map<String, Value>) {
        let mut merged = Map::with_capacity(object.len() + 1);
        merged.insert(self.field.clone(), self.credential_object());
        for (key, value) in std::mem::take(object) {
            if key != self.field {
                merged.insert(key, value);
            }
        }
        *object = merged;
    }
}

#[async_trait]
impl AuthStrategy for BodyEmbeddedCredentials {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::BodyEmbedded
    }

    async fn ensure_valid(&self) -> PortalResult<()> {
        Ok(())
    }

    fn decorate(&self, request: &mut NetRequest) -> PortalResult<()> {
        match &mut request.body {
            Body::Empty => {
                let mut object = Map::new();
                self.prepend(&mut object);
                request.body = Body::Json(Value::Object(object));
                Ok(())
            }
            Body::Json(Value::Object(root)) => {
                if self.target == EmbedTarget::Envelope && root.len() == 1 {
                    if let Some(Value::Object(inner)) = root.values_mut().next() {
                        self.prepend(inner);
                        return Ok(());
                    }
                }
                self.prepend(root);
                Ok(())
            }
            _ => Err(PortalError::Configuration(
                "body-embedded credentials need a JSON object body".into(),
            )),
        }
    }
}
