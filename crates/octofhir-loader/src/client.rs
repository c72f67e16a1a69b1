use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::AuthHeader;
use crate::error::ClientError;

/// Raw upstream reply: status code and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Diagnostics from an OperationOutcome body, if present.
    pub fn diagnostics(&self) -> Option<String> {
        let json = serde_json::from_str::<Value>(&self.body).ok()?;
        if json.get("resourceType").and_then(|v| v.as_str()) != Some("OperationOutcome") {
            return None;
        }
        let msgs: Vec<&str> = json
            .get("issue")
            .and_then(|v| v.as_array())?
            .iter()
            .filter_map(|i| i.get("diagnostics").and_then(|d| d.as_str()))
            .collect();
        (!msgs.is_empty()).then(|| msgs.join("; "))
    }
}

/// Remote clinical data store accepting one resource per request.
#[async_trait]
pub trait UpstreamStore: Send + Sync {
    /// Type-scoped create (`POST {base}/{type}`).
    async fn create(
        &self,
        resource_type: &str,
        body: &Value,
    ) -> Result<UpstreamResponse, ClientError>;

    /// Idempotent update by id (`PUT {base}/{type}/{id}`).
    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        body: &Value,
    ) -> Result<UpstreamResponse, ClientError>;
}

pub struct FhirClient {
    http: reqwest::Client,
    base_url: String,
    auth: Option<AuthHeader>,
}

impl FhirClient {
    /// # Errors
    ///
    /// Returns `ClientError::Build` if the TLS backend cannot be initialized.
    pub fn new(
        base_url: &str,
        auth: Option<AuthHeader>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self::with_http(http, base_url, auth))
    }

    pub fn with_http(http: reqwest::Client, base_url: &str, auth: Option<AuthHeader>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn fhir_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, url);
        match &self.auth {
            Some(AuthHeader::Basic { username, password }) => {
                req = req.basic_auth(username, Some(password));
            }
            Some(AuthHeader::Bearer { token }) => {
                req = req.bearer_auth(token);
            }
            None => {}
        }
        req.header("Accept", "application/fhir+json")
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: String,
        body: &Value,
    ) -> Result<UpstreamResponse, ClientError> {
        let payload = encode_body(body)?;
        let resp = self
            .request(method, &url)
            .header("Content-Type", "application/fhir+json")
            .body(payload)
            .send()
            .await
            .map_err(|e| ClientError::transport(&url, e))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| ClientError::transport(&url, e))?;
        Ok(UpstreamResponse { status, body })
    }
}

/// Serializes a request body; a failure is terminal, never retried.
fn encode_body<T: serde::Serialize + ?Sized>(body: &T) -> Result<Vec<u8>, ClientError> {
    serde_json::to_vec(body).map_err(ClientError::Serialization)
}

#[async_trait]
impl UpstreamStore for FhirClient {
    async fn create(
        &self,
        resource_type: &str,
        body: &Value,
    ) -> Result<UpstreamResponse, ClientError> {
        let url = self.fhir_url(resource_type);
        self.send(reqwest::Method::POST, url, body).await
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        body: &Value,
    ) -> Result<UpstreamResponse, ClientError> {
        let url = self.fhir_url(&format!("{resource_type}/{id}"));
        self.send(reqwest::Method::PUT, url, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_posts_to_type_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fhir/Patient"))
            .and(header("content-type", "application/fhir+json"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"id":"new"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = FhirClient::new(
            &format!("{}/fhir/", server.uri()),
            Some(AuthHeader::Bearer { token: "abc".into() }),
            Duration::from_secs(5),
        )
        .unwrap();

        let resp = client
            .create("Patient", &json!({"resourceType": "Patient"}))
            .await
            .unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.body, r#"{"id":"new"}"#);
    }

    #[tokio::test]
    async fn test_update_puts_to_instance_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/Observation/o-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = FhirClient::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
        let resp = client
            .update("Observation", "o-1", &json!({"resourceType": "Observation", "id": "o-1"}))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn test_error_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "resourceType": "OperationOutcome",
                "issue": [{"severity": "error", "diagnostics": "Patient.gender invalid"}]
            })))
            .mount(&server)
            .await;

        let client = FhirClient::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
        let resp = client.create("Patient", &json!({})).await.unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.diagnostics().as_deref(), Some("Patient.gender invalid"));
    }

    #[test]
    fn test_unserializable_body_is_an_error() {
        use std::collections::BTreeMap;

        let mut body = BTreeMap::new();
        body.insert((1u8, 2u8), "tuple keys have no JSON form");
        let err = encode_body(&body).unwrap_err();
        assert!(matches!(err, ClientError::Serialization(_)));
        assert!(!err.is_transient());

        let ok = encode_body(&json!({"resourceType": "Patient"})).unwrap();
        assert_eq!(ok, br#"{"resourceType":"Patient"}"#);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = FhirClient::new("http://127.0.0.1:1", None, Duration::from_secs(2)).unwrap();
        let err = client.create("Patient", &json!({})).await.unwrap_err();
        assert!(err.is_transient());
    }
}
