//! Client operations against a scripted, recording transport.
//!
//! The mock hands out canned responses in order and records every request,
//! so tests can assert on what went over the wire (or that nothing did).

use std::cell::RefCell;
use std::collections::VecDeque;

use sendgrid_core::{
    ApiError, ClientConfig, Generation, HttpMethod, HttpRequest, HttpResponse, SendGridClient, TemplateVersion,
    Transport, TransportError, ValidationError,
};

#[derive(Default)]
struct MockTransport {
    responses: RefCell<VecDeque<Result<HttpResponse, TransportError>>>,
    calls: RefCell<Vec<HttpRequest>>,
}

impl MockTransport {
    fn new() -> Self {
        Self::default()
    }

    fn respond(self, status: u16, body: &str) -> Self {
        self.responses
            .borrow_mut()
            .push_back(Ok(HttpResponse::new(status, body)));
        self
    }

    fn fail(self, message: &str) -> Self {
        self.responses
            .borrow_mut()
            .push_back(Err(TransportError::new(message)));
        self
    }

    fn calls(&self) -> Vec<HttpRequest> {
        self.calls.borrow().clone()
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected request: {} {}", request.method, request.path))
    }
}

fn client(transport: &MockTransport) -> SendGridClient<&MockTransport> {
    SendGridClient::new(
        ClientConfig::new("SG.test").with_base_url("https://api.example.test/v3"),
        transport,
    )
}

fn scopes(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn assert_validation(result: Result<impl std::fmt::Debug, ApiError>, expected: ValidationError) {
    match result {
        Err(ApiError::Validation(cause)) => assert_eq!(cause, expected),
        other => panic!("expected {expected:?}, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Local validation never reaches the transport
// ---------------------------------------------------------------------------

#[test]
fn missing_identifiers_make_zero_calls() {
    let transport = MockTransport::new();
    let c = client(&transport);

    assert_validation(c.create_api_key("", &[]), ValidationError::ApiKeyNameRequired);
    assert_validation(c.read_api_key(""), ValidationError::ApiKeyIdRequired);
    assert_validation(c.update_api_key("", "n", &[]), ValidationError::ApiKeyIdRequired);
    assert_validation(c.delete_api_key(""), ValidationError::ApiKeyIdRequired);

    assert_validation(c.create_template("", None), ValidationError::TemplateNameRequired);
    assert_validation(c.read_template(""), ValidationError::TemplateIdRequired);
    assert_validation(c.update_template("", "n"), ValidationError::TemplateIdRequired);
    assert_validation(c.update_template("t1", ""), ValidationError::TemplateNameRequired);
    assert_validation(c.delete_template(""), ValidationError::TemplateIdRequired);

    let version = TemplateVersion::default();
    assert_validation(c.create_template_version(&version), ValidationError::TemplateIdRequired);
    assert_validation(c.read_template_version("t1", ""), ValidationError::TemplateVersionIdRequired);
    assert_validation(c.update_template_version(&version), ValidationError::TemplateVersionIdRequired);
    assert_validation(c.delete_template_version("", "v1"), ValidationError::TemplateIdRequired);

    assert_eq!(transport.call_count(), 0);
}

// ---------------------------------------------------------------------------
// API keys
// ---------------------------------------------------------------------------

#[test]
fn update_api_key_picks_method_from_scopes() {
    let body = r#"{"api_key_id":"k1","name":"ci"}"#;
    let transport = MockTransport::new().respond(200, body).respond(200, body);
    let c = client(&transport);

    c.update_api_key("k1", "ci", &[]).unwrap();
    c.update_api_key("k1", "ci", &scopes(&["mail.send"])).unwrap();

    let methods: Vec<HttpMethod> = transport.calls().iter().map(|r| r.method).collect();
    assert_eq!(methods, vec![HttpMethod::Patch, HttpMethod::Put]);
    assert!(transport
        .calls()
        .iter()
        .all(|r| r.path == "https://api.example.test/v3/api_keys/k1"));
}

#[test]
fn delete_api_key_is_idempotent() {
    let transport = MockTransport::new().respond(204, "").respond(404, r#"{"errors":[]}"#);
    let c = client(&transport);

    assert!(c.delete_api_key("k1").is_ok());
    assert!(c.delete_api_key("k1").is_ok());
    assert_eq!(transport.call_count(), 2);
    assert!(transport.calls().iter().all(|r| r.method == HttpMethod::Delete));
}

#[test]
fn create_api_key_rejection_keeps_status_and_body() {
    let transport = MockTransport::new().respond(400, r#"{"errors":[{"message":"scope invalid"}]}"#);
    let err = client(&transport)
        .create_api_key("ci", &scopes(&["nope"]))
        .unwrap_err();
    match err {
        ApiError::Remote { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("scope invalid"));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[test]
fn transport_failure_passes_through() {
    let transport = MockTransport::new().fail("connection reset");
    let err = client(&transport).list_api_keys().unwrap_err();
    assert!(matches!(err, ApiError::Transport(ref e) if e.0 == "connection reset"));
    assert_eq!(err.status_code(), Some(500));
}

#[test]
fn list_api_keys_sends_authorization() {
    let transport = MockTransport::new().respond(200, "[]");
    let keys = client(&transport).list_api_keys().unwrap();
    assert!(keys.is_empty());

    let call = &transport.calls()[0];
    assert_eq!(call.method, HttpMethod::Get);
    assert!(call
        .headers
        .contains(&("authorization".to_string(), "Bearer SG.test".to_string())));
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[test]
fn create_template_needs_exactly_201() {
    let body = r#"{"id":"t1","name":"x","generation":"dynamic"}"#;

    let transport = MockTransport::new().respond(201, body);
    let template = client(&transport).create_template("x", None).unwrap();
    assert_eq!(template.id, "t1");
    assert_eq!(template.generation, Generation::Dynamic);

    let transport = MockTransport::new().respond(200, body);
    let err = client(&transport).create_template("x", None).unwrap_err();
    assert!(matches!(err, ApiError::Remote { status: 200, .. }));
}

#[test]
fn list_templates_preserves_order() {
    let transport = MockTransport::new().respond(
        200,
        r#"{"result":[{"id":"a","name":"first","generation":"dynamic"},{"id":"b","name":"second","generation":"dynamic"}]}"#,
    );
    let templates = client(&transport).list_templates(Generation::Dynamic).unwrap();
    let ids: Vec<&str> = templates.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(
        transport.calls()[0].path,
        "https://api.example.test/v3/templates?page_size=200&generations=dynamic"
    );
}

#[test]
fn delete_template_twice_succeeds() {
    let transport = MockTransport::new().respond(204, "").respond(404, "");
    let c = client(&transport);
    assert!(c.delete_template("t1").is_ok());
    assert!(c.delete_template("t1").is_ok());
}

#[test]
fn rate_limited_template_read_is_classified() {
    let transport = MockTransport::new().respond(429, r#"{"errors":[{"message":"too many requests"}]}"#);
    let err = client(&transport).read_template("t1").unwrap_err();
    assert!(err.is_rate_limited());
}

// ---------------------------------------------------------------------------
// Template versions
// ---------------------------------------------------------------------------

#[test]
fn create_version_sends_content_to_parent() {
    let transport = MockTransport::new().respond(201, r#"{"id":"v1","template_id":"t1","name":"v1","subject":"Hi"}"#);
    let version = TemplateVersion {
        template_id: "t1".to_string(),
        name: "v1".to_string(),
        subject: "Hi".to_string(),
        plain_content: "Hi there".to_string(),
        ..Default::default()
    };
    let created = client(&transport).create_template_version(&version).unwrap();
    assert_eq!(created.id, "v1");

    let call = &transport.calls()[0];
    assert_eq!(call.method, HttpMethod::Post);
    assert_eq!(call.path, "https://api.example.test/v3/templates/t1/versions");
    let sent: serde_json::Value = serde_json::from_str(call.body.as_deref().unwrap()).unwrap();
    assert_eq!(sent["plain_content"], "Hi there");
}

#[test]
fn delete_version_is_idempotent() {
    let transport = MockTransport::new().respond(204, "").respond(404, "");
    let c = client(&transport);
    assert!(c.delete_template_version("t1", "v1").is_ok());
    assert!(c.delete_template_version("t1", "v1").is_ok());
    assert_eq!(transport.calls()[1].path, "https://api.example.test/v3/templates/t1/versions/v1");
}

#[test]
fn read_version_without_id_is_unparseable() {
    let transport = MockTransport::new().respond(200, r#"{"name":"v1"}"#);
    let err = client(&transport).read_template_version("t1", "v1").unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}
