//! Template version operations.
//!
//! Versions live under `/templates/{template_id}/versions`. Create and update
//! only reject server errors (and 429) before decoding; a 4xx body without an
//! id is still caught by the decoder. Every response must carry an id.

use tracing::debug;
use urlencoding::encode;

use crate::client::SendGridClient;
use crate::error::{classify, decode, ApiError, StatusGate, ValidationError, STATUS_NOT_FOUND, STATUS_NO_CONTENT};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::types::TemplateVersion;

fn versions_path(template_id: &str) -> Result<String, ApiError> {
    if template_id.is_empty() {
        return Err(ValidationError::TemplateIdRequired.into());
    }
    Ok(format!("/templates/{}/versions", encode(template_id)))
}

fn version_path(template_id: &str, id: &str) -> Result<String, ApiError> {
    let base = versions_path(template_id)?;
    if id.is_empty() {
        return Err(ValidationError::TemplateVersionIdRequired.into());
    }
    Ok(format!("{base}/{}", encode(id)))
}

fn parse_version(body: &str) -> Result<TemplateVersion, ApiError> {
    let version: TemplateVersion = decode("template version", body)?;
    if version.id.is_empty() {
        return Err(ApiError::Decode(format!("response is missing id: {body}")));
    }
    Ok(version)
}

impl<T> SendGridClient<T> {
    /// Checks template id, name and subject, in that order.
    pub fn build_create_template_version(&self, version: &TemplateVersion) -> Result<HttpRequest, ApiError> {
        let path = versions_path(&version.template_id)?;
        if version.name.is_empty() {
            return Err(ValidationError::TemplateVersionNameRequired.into());
        }
        if version.subject.is_empty() {
            return Err(ValidationError::TemplateVersionSubjectRequired.into());
        }
        self.json_request(HttpMethod::Post, &path, version)
    }

    pub fn build_read_template_version(&self, template_id: &str, id: &str) -> Result<HttpRequest, ApiError> {
        Ok(self.request(HttpMethod::Get, &version_path(template_id, id)?))
    }

    /// Every content field is sent and may change.
    pub fn build_update_template_version(&self, version: &TemplateVersion) -> Result<HttpRequest, ApiError> {
        if version.id.is_empty() {
            return Err(ValidationError::TemplateVersionIdRequired.into());
        }
        let path = version_path(&version.template_id, &version.id)?;
        self.json_request(HttpMethod::Patch, &path, version)
    }

    pub fn build_delete_template_version(&self, template_id: &str, id: &str) -> Result<HttpRequest, ApiError> {
        Ok(self.request(HttpMethod::Delete, &version_path(template_id, id)?))
    }

    pub fn parse_create_template_version(&self, response: &HttpResponse) -> Result<TemplateVersion, ApiError> {
        StatusGate::BelowServerError.check(response)?;
        parse_version(&response.body)
    }

    pub fn parse_read_template_version(&self, response: &HttpResponse) -> Result<TemplateVersion, ApiError> {
        StatusGate::Ungated.check(response)?;
        parse_version(&response.body)
    }

    pub fn parse_update_template_version(&self, response: &HttpResponse) -> Result<TemplateVersion, ApiError> {
        StatusGate::BelowServerError.check(response)?;
        parse_version(&response.body)
    }

    pub fn parse_delete_template_version(&self, response: &HttpResponse) -> Result<(), ApiError> {
        match response.status {
            STATUS_NO_CONTENT | STATUS_NOT_FOUND => Ok(()),
            status => Err(classify(&HttpResponse::new(status, ""))),
        }
    }
}

impl<T: Transport> SendGridClient<T> {
    /// The parent template must already exist.
    pub fn create_template_version(&self, version: &TemplateVersion) -> Result<TemplateVersion, ApiError> {
        let request = self.build_create_template_version(version)?;
        debug!(template_id = %version.template_id, version_name = %version.name, "creating template version");
        let created = self.parse_create_template_version(&self.send(&request)?)?;
        debug!(id = %created.id, "created template version");
        Ok(created)
    }

    pub fn read_template_version(&self, template_id: &str, id: &str) -> Result<TemplateVersion, ApiError> {
        let request = self.build_read_template_version(template_id, id)?;
        self.parse_read_template_version(&self.send(&request)?)
    }

    pub fn update_template_version(&self, version: &TemplateVersion) -> Result<TemplateVersion, ApiError> {
        let request = self.build_update_template_version(version)?;
        debug!(template_id = %version.template_id, id = %version.id, "updating template version");
        self.parse_update_template_version(&self.send(&request)?)
    }

    pub fn delete_template_version(&self, template_id: &str, id: &str) -> Result<(), ApiError> {
        let request = self.build_delete_template_version(template_id, id)?;
        debug!(template_id, id, "deleting template version");
        self.parse_delete_template_version(&self.send(&request)?)
    }
}
