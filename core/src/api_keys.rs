//! API key operations.
//!
//! Rejections are any status of 300 and above on create, update and delete.
//! Reads and listings skip the status check entirely and let the decoder
//! report whatever came back. Delete treats 404 as success.

use tracing::debug;
use urlencoding::encode;

use crate::client::SendGridClient;
use crate::error::{classify, decode, ApiError, StatusGate, ValidationError, STATUS_MULTIPLE_CHOICES, STATUS_NOT_FOUND};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::types::ApiKey;

const API_KEYS: &str = "/api_keys";

fn key_path(id: &str) -> Result<String, ApiError> {
    if id.is_empty() {
        return Err(ValidationError::ApiKeyIdRequired.into());
    }
    Ok(format!("{API_KEYS}/{}", encode(id)))
}

/// `PUT` replaces name and scopes when any scope is given, `PATCH` renames
/// otherwise. An empty scope list therefore never clears scopes.
pub fn update_method(scopes: &[String]) -> HttpMethod {
    if scopes.is_empty() {
        HttpMethod::Patch
    } else {
        HttpMethod::Put
    }
}

impl<T> SendGridClient<T> {
    pub fn build_create_api_key(&self, name: &str, scopes: &[String]) -> Result<HttpRequest, ApiError> {
        if name.is_empty() {
            return Err(ValidationError::ApiKeyNameRequired.into());
        }
        let payload = ApiKey {
            name: name.to_string(),
            scopes: scopes.to_vec(),
            ..Default::default()
        };
        self.json_request(HttpMethod::Post, API_KEYS, &payload)
    }

    pub fn build_read_api_key(&self, id: &str) -> Result<HttpRequest, ApiError> {
        Ok(self.request(HttpMethod::Get, &key_path(id)?))
    }

    pub fn build_list_api_keys(&self) -> HttpRequest {
        self.request(HttpMethod::Get, API_KEYS)
    }

    pub fn build_update_api_key(&self, id: &str, name: &str, scopes: &[String]) -> Result<HttpRequest, ApiError> {
        let path = key_path(id)?;
        let payload = ApiKey {
            name: name.to_string(),
            scopes: scopes.to_vec(),
            ..Default::default()
        };
        self.json_request(update_method(scopes), &path, &payload)
    }

    pub fn build_delete_api_key(&self, id: &str) -> Result<HttpRequest, ApiError> {
        Ok(self.request(HttpMethod::Delete, &key_path(id)?))
    }

    /// The only response that carries the key's secret.
    pub fn parse_create_api_key(&self, response: &HttpResponse) -> Result<ApiKey, ApiError> {
        StatusGate::Success.check(response)?;
        decode("API key", &response.body)
    }

    // No status check here: a rejected read surfaces as a decode failure, or
    // as an empty key when the error body happens to be a JSON object.
    pub fn parse_read_api_key(&self, response: &HttpResponse) -> Result<ApiKey, ApiError> {
        StatusGate::Ungated.check(response)?;
        decode("API key", &response.body)
    }

    /// Listings are a bare JSON array.
    pub fn parse_list_api_keys(&self, response: &HttpResponse) -> Result<Vec<ApiKey>, ApiError> {
        StatusGate::Ungated.check(response)?;
        decode("API keys", &response.body)
    }

    pub fn parse_update_api_key(&self, response: &HttpResponse) -> Result<ApiKey, ApiError> {
        StatusGate::Success.check(response)?;
        decode("API key", &response.body)
    }

    pub fn parse_delete_api_key(&self, response: &HttpResponse) -> Result<(), ApiError> {
        if response.status >= STATUS_MULTIPLE_CHOICES && response.status != STATUS_NOT_FOUND {
            return Err(classify(response));
        }
        Ok(())
    }
}

impl<T: Transport> SendGridClient<T> {
    pub fn create_api_key(&self, name: &str, scopes: &[String]) -> Result<ApiKey, ApiError> {
        let request = self.build_create_api_key(name, scopes)?;
        debug!(key_name = name, scopes = ?scopes, "creating API key");
        let key = self.parse_create_api_key(&self.send(&request)?)?;
        debug!(id = %key.id, "created API key");
        Ok(key)
    }

    pub fn read_api_key(&self, id: &str) -> Result<ApiKey, ApiError> {
        let request = self.build_read_api_key(id)?;
        self.parse_read_api_key(&self.send(&request)?)
    }

    pub fn list_api_keys(&self) -> Result<Vec<ApiKey>, ApiError> {
        let request = self.build_list_api_keys();
        self.parse_list_api_keys(&self.send(&request)?)
    }

    pub fn update_api_key(&self, id: &str, name: &str, scopes: &[String]) -> Result<ApiKey, ApiError> {
        let request = self.build_update_api_key(id, name, scopes)?;
        debug!(id, method = %request.method, "updating API key");
        self.parse_update_api_key(&self.send(&request)?)
    }

    pub fn delete_api_key(&self, id: &str) -> Result<(), ApiError> {
        let request = self.build_delete_api_key(id)?;
        debug!(id, "deleting API key");
        self.parse_delete_api_key(&self.send(&request)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn client() -> SendGridClient<()> {
        SendGridClient::new(ClientConfig::new("SG.test").with_base_url("http://localhost:3000"), ())
    }

    fn scopes(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn build_create_sends_name_and_scopes() {
        let req = client().build_create_api_key("ci", &scopes(&["mail.send"])).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/api_keys");
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({"name": "ci", "scopes": ["mail.send"]}));
    }

    #[test]
    fn ids_are_encoded_as_one_path_segment() {
        let req = client().build_read_api_key("k1/../other?x#y").unwrap();
        assert_eq!(req.path, "http://localhost:3000/api_keys/k1%2F..%2Fother%3Fx%23y");

        let req = client().build_delete_api_key("abc-123_DEF.~").unwrap();
        assert_eq!(req.path, "http://localhost:3000/api_keys/abc-123_DEF.~");
    }

    #[test]
    fn build_create_omits_empty_scopes() {
        let req = client().build_create_api_key("ci", &[]).unwrap();
        assert_eq!(req.body.as_deref(), Some(r#"{"name":"ci"}"#));
    }

    #[test]
    fn build_create_requires_name() {
        let err = client().build_create_api_key("", &[]).unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::ApiKeyNameRequired)));
    }

    #[test]
    fn update_method_depends_only_on_scopes() {
        assert_eq!(update_method(&[]), HttpMethod::Patch);
        assert_eq!(update_method(&scopes(&["mail.send"])), HttpMethod::Put);

        let req = client().build_update_api_key("k1", "", &scopes(&["mail.send"])).unwrap();
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.path, "http://localhost:3000/api_keys/k1");
        assert_eq!(req.body.as_deref(), Some(r#"{"scopes":["mail.send"]}"#));
    }

    #[test]
    fn id_is_required_everywhere() {
        let c = client();
        for err in [
            c.build_read_api_key("").unwrap_err(),
            c.build_update_api_key("", "name", &[]).unwrap_err(),
            c.build_delete_api_key("").unwrap_err(),
        ] {
            assert!(matches!(err, ApiError::Validation(ValidationError::ApiKeyIdRequired)));
        }
    }

    #[test]
    fn parse_create_returns_the_secret() {
        let response = HttpResponse::new(
            201,
            r#"{"api_key_id":"k1","api_key":"SG.abc","name":"ci","scopes":["mail.send","sender_verification_eligible"]}"#,
        );
        let key = client().parse_create_api_key(&response).unwrap();
        assert_eq!(key.id, "k1");
        assert_eq!(key.secret, "SG.abc");
        assert_eq!(key.explicit_scopes(), vec!["mail.send"]);
    }

    #[test]
    fn parse_create_rejects_redirects_and_errors() {
        let err = client()
            .parse_create_api_key(&HttpResponse::new(400, r#"{"errors":[{"message":"bad"}]}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::Remote { status: 400, .. }));

        let err = client().parse_create_api_key(&HttpResponse::new(429, "")).unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[test]
    fn parse_create_malformed_body_is_internal() {
        let err = client().parse_create_api_key(&HttpResponse::new(201, "<html>")).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert_eq!(err.status_code(), Some(500));
    }

    #[test]
    fn parse_read_is_not_status_gated() {
        let key = client()
            .parse_read_api_key(&HttpResponse::new(404, r#"{"errors":[]}"#))
            .unwrap();
        assert!(key.id.is_empty());

        let err = client().parse_read_api_key(&HttpResponse::new(500, "oops")).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn parse_list_expects_a_bare_array() {
        let keys = client()
            .parse_list_api_keys(&HttpResponse::new(200, r#"[{"api_key_id":"a","name":"one"},{"api_key_id":"b","name":"two"}]"#))
            .unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].name, "two");

        let err = client()
            .parse_list_api_keys(&HttpResponse::new(200, r#"{"result":[]}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn parse_delete_swallows_not_found() {
        let c = client();
        assert!(c.parse_delete_api_key(&HttpResponse::new(204, "")).is_ok());
        assert!(c.parse_delete_api_key(&HttpResponse::new(404, "")).is_ok());
        let err = c.parse_delete_api_key(&HttpResponse::new(403, "forbidden")).unwrap_err();
        assert!(matches!(err, ApiError::Remote { status: 403, ref body } if body == "forbidden"));
    }
}
