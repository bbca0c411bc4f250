//! Transactional template operations.
//!
//! Templates expect one exact status per operation: 201 for create and 200
//! for read, list and update. Any other code, another 2xx included, is a
//! rejection. Delete accepts 204 and 404 and reports anything else by status
//! alone.

use serde::Serialize;
use tracing::debug;
use urlencoding::encode;

use crate::client::SendGridClient;
use crate::error::{
    classify, decode, ApiError, StatusGate, ValidationError, STATUS_CREATED, STATUS_NOT_FOUND,
    STATUS_NO_CONTENT, STATUS_OK,
};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::types::{Generation, Template, TemplateList};

const TEMPLATES: &str = "/templates";

/// Largest page the listing endpoint serves.
pub const LIST_PAGE_SIZE: u32 = 200;

#[derive(Serialize)]
struct NewTemplate<'a> {
    name: &'a str,
    generation: Generation,
}

// Generation cannot change after creation, so it is never sent on update.
#[derive(Serialize)]
struct RenameTemplate<'a> {
    name: &'a str,
}

fn template_path(id: &str) -> Result<String, ApiError> {
    if id.is_empty() {
        return Err(ValidationError::TemplateIdRequired.into());
    }
    Ok(format!("{TEMPLATES}/{}", encode(id)))
}

/// A template without an id is never valid, whatever the status said.
pub(crate) fn parse_template(body: &str) -> Result<Template, ApiError> {
    let template: Template = decode("template", body)?;
    if template.id.is_empty() {
        return Err(ApiError::Decode(format!("response is missing id: {body}")));
    }
    Ok(template)
}

impl<T> SendGridClient<T> {
    /// `generation` defaults to dynamic.
    pub fn build_create_template(&self, name: &str, generation: Option<Generation>) -> Result<HttpRequest, ApiError> {
        if name.is_empty() {
            return Err(ValidationError::TemplateNameRequired.into());
        }
        let payload = NewTemplate {
            name,
            generation: generation.unwrap_or_default(),
        };
        self.json_request(HttpMethod::Post, TEMPLATES, &payload)
    }

    pub fn build_read_template(&self, id: &str) -> Result<HttpRequest, ApiError> {
        Ok(self.request(HttpMethod::Get, &template_path(id)?))
    }

    pub fn build_list_templates(&self, generation: Generation) -> HttpRequest {
        let path = format!("{TEMPLATES}?page_size={LIST_PAGE_SIZE}&generations={generation}");
        self.request(HttpMethod::Get, &path)
    }

    pub fn build_update_template(&self, id: &str, name: &str) -> Result<HttpRequest, ApiError> {
        let path = template_path(id)?;
        if name.is_empty() {
            return Err(ValidationError::TemplateNameRequired.into());
        }
        self.json_request(HttpMethod::Patch, &path, &RenameTemplate { name })
    }

    pub fn build_delete_template(&self, id: &str) -> Result<HttpRequest, ApiError> {
        Ok(self.request(HttpMethod::Delete, &template_path(id)?))
    }

    pub fn parse_create_template(&self, response: &HttpResponse) -> Result<Template, ApiError> {
        StatusGate::Exact(STATUS_CREATED).check(response)?;
        parse_template(&response.body)
    }

    pub fn parse_read_template(&self, response: &HttpResponse) -> Result<Template, ApiError> {
        StatusGate::Exact(STATUS_OK).check(response)?;
        parse_template(&response.body)
    }

    /// Unwraps the `{"result": [...]}` envelope, keeping server order.
    pub fn parse_list_templates(&self, response: &HttpResponse) -> Result<Vec<Template>, ApiError> {
        StatusGate::Exact(STATUS_OK).check(response)?;
        let list: TemplateList = decode("templates", &response.body)?;
        Ok(list.result)
    }

    pub fn parse_update_template(&self, response: &HttpResponse) -> Result<Template, ApiError> {
        StatusGate::Exact(STATUS_OK).check(response)?;
        parse_template(&response.body)
    }

    pub fn parse_delete_template(&self, response: &HttpResponse) -> Result<(), ApiError> {
        match response.status {
            STATUS_NO_CONTENT | STATUS_NOT_FOUND => Ok(()),
            status => Err(classify(&HttpResponse::new(status, ""))),
        }
    }
}

impl<T: Transport> SendGridClient<T> {
    pub fn create_template(&self, name: &str, generation: Option<Generation>) -> Result<Template, ApiError> {
        let request = self.build_create_template(name, generation)?;
        debug!(template_name = name, "creating template");
        let template = self.parse_create_template(&self.send(&request)?)?;
        debug!(id = %template.id, generation = %template.generation, "created template");
        Ok(template)
    }

    pub fn read_template(&self, id: &str) -> Result<Template, ApiError> {
        let request = self.build_read_template(id)?;
        self.parse_read_template(&self.send(&request)?)
    }

    pub fn list_templates(&self, generation: Generation) -> Result<Vec<Template>, ApiError> {
        let request = self.build_list_templates(generation);
        self.parse_list_templates(&self.send(&request)?)
    }

    pub fn update_template(&self, id: &str, name: &str) -> Result<Template, ApiError> {
        let request = self.build_update_template(id, name)?;
        debug!(id, template_name = name, "renaming template");
        self.parse_update_template(&self.send(&request)?)
    }

    pub fn delete_template(&self, id: &str) -> Result<(), ApiError> {
        let request = self.build_delete_template(id)?;
        debug!(id, "deleting template");
        self.parse_delete_template(&self.send(&request)?)
    }
}
