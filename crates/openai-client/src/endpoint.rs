//! Logical operations and endpoint resolution
//!
//! Every remote endpoint is identified by an `Operation` with a fixed HTTP
//! method and path suffix. The resolver turns an operation into a concrete
//! URL: a configured per-operation override wins, otherwise the configured
//! domain is joined with the suffix. `{placeholder}` segments expand
//! positionally from the call's path variables.

use std::collections::BTreeMap;

use reqwest::Method;

use crate::error::{Error, Result};

/// Logical operation identifiers, one per remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Moderations,
    Completions,
    Edits,
    ChatCompletions,
    ListModels,
    RetrieveModel,
    Embeddings,
    ListFiles,
    UploadFile,
    DeleteFile,
    RetrieveFile,
    CreateFineTune,
    ListFineTunes,
    RetrieveFineTune,
    CancelFineTune,
    ListFineTuneEvents,
    DeleteFineTuneModel,
    CreateTranscription,
    CreateTranslation,
    CreateImage,
    CreateImageEdit,
    CreateImageVariation,
    BillingCreditGrants,
    BillingSubscription,
    BillingUsage,
    Users,
}

impl Operation {
    pub fn method(&self) -> Method {
        use Operation::*;
        match self {
            ListModels | RetrieveModel | ListFiles | RetrieveFile | ListFineTunes
            | RetrieveFineTune | ListFineTuneEvents | BillingCreditGrants
            | BillingSubscription | BillingUsage | Users => Method::GET,
            DeleteFile | DeleteFineTuneModel => Method::DELETE,
            _ => Method::POST,
        }
    }

    /// Path suffix appended to the configured domain.
    pub fn suffix(&self) -> &'static str {
        use Operation::*;
        match self {
            Moderations => "/v1/moderations",
            Completions => "/v1/completions",
            Edits => "/v1/edits",
            ChatCompletions => "/v1/chat/completions",
            ListModels => "/v1/models",
            RetrieveModel => "/v1/models/{model}",
            Embeddings => "/v1/embeddings",
            ListFiles => "/v1/files",
            UploadFile => "/v1/files",
            DeleteFile => "/v1/files/{file_id}",
            RetrieveFile => "/v1/files/{file_id}",
            CreateFineTune => "/v1/fine-tunes",
            ListFineTunes => "/v1/fine-tunes",
            RetrieveFineTune => "/v1/fine-tunes/{fine_tune_id}",
            CancelFineTune => "/v1/fine-tunes/{fine_tune_id}/cancel",
            ListFineTuneEvents => "/v1/fine-tunes/{fine_tune_id}/events",
            DeleteFineTuneModel => "/v1/models/{model}",
            CreateTranscription => "/v1/audio/transcriptions",
            CreateTranslation => "/v1/audio/translations",
            CreateImage => "/v1/images/generations",
            CreateImageEdit => "/v1/images/edits",
            CreateImageVariation => "/v1/images/variations",
            BillingCreditGrants => "/v1/dashboard/billing/credit_grants",
            BillingSubscription => "/v1/dashboard/billing/subscription",
            BillingUsage => "/v1/dashboard/billing/usage?start_date={start_date}&end_date={end_date}",
            Users => "/v1/organizations/{organization_id}/users",
        }
    }

    /// Name used for config URL overrides and metrics labels.
    pub fn name(&self) -> &'static str {
        use Operation::*;
        match self {
            Moderations => "moderations",
            Completions => "completions",
            Edits => "edits",
            ChatCompletions => "chat-completions",
            ListModels => "list-models",
            RetrieveModel => "retrieve-model",
            Embeddings => "embeddings",
            ListFiles => "list-files",
            UploadFile => "upload-file",
            DeleteFile => "delete-file",
            RetrieveFile => "retrieve-file",
            CreateFineTune => "create-fine-tune",
            ListFineTunes => "list-fine-tunes",
            RetrieveFineTune => "retrieve-fine-tune",
            CancelFineTune => "cancel-fine-tune",
            ListFineTuneEvents => "list-fine-tune-events",
            DeleteFineTuneModel => "delete-fine-tune-model",
            CreateTranscription => "create-transcription",
            CreateTranslation => "create-translation",
            CreateImage => "create-image",
            CreateImageEdit => "create-image-edit",
            CreateImageVariation => "create-image-variation",
            BillingCreditGrants => "billing-credit-grants",
            BillingSubscription => "billing-subscription",
            BillingUsage => "billing-usage",
            Users => "users",
        }
    }
}

/// Maps operations to concrete URLs. Knows nothing about keys or payloads.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    domain: String,
    overrides: BTreeMap<String, String>,
}

impl EndpointResolver {
    /// `overrides` maps `Operation::name()` to a full URL template.
    pub fn new(domain: impl Into<String>, overrides: BTreeMap<String, String>) -> Self {
        let domain = domain.into().trim_end_matches('/').to_string();
        Self { domain, overrides }
    }

    /// Resolve an operation to its method and concrete URL, expanding
    /// `{placeholder}` segments positionally from `vars`.
    pub fn resolve(&self, operation: Operation, vars: &[&str]) -> Result<(Method, String)> {
        let template = match self.overrides.get(operation.name()) {
            Some(url) => url.clone(),
            None => format!("{}{}", self.domain, operation.suffix()),
        };
        let url = expand_template(&template, vars)?;
        Ok((operation.method(), url))
    }
}

/// Replace each `{name}` in the template with the next variable, in order.
fn expand_template(template: &str, vars: &[&str]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut vars = vars.iter();

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            return Err(Error::Endpoint(format!(
                "unterminated placeholder in template: {template}"
            )));
        };
        out.push_str(&rest[..open]);
        let Some(value) = vars.next() else {
            return Err(Error::Endpoint(format!(
                "not enough path variables for template: {template}"
            )));
        };
        out.push_str(value);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);

    if vars.next().is_some() {
        return Err(Error::Endpoint(format!(
            "too many path variables for template: {template}"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> EndpointResolver {
        EndpointResolver::new("https://api.openai.com", BTreeMap::new())
    }

    #[test]
    fn resolves_domain_plus_suffix() {
        let (method, url) = resolver().resolve(Operation::ChatCompletions, &[]).unwrap();
        assert_eq!(method, Method::POST);
        assert_eq!(url, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn trailing_domain_slash_is_normalized() {
        let resolver = EndpointResolver::new("https://api.openai.com/", BTreeMap::new());
        let (_, url) = resolver.resolve(Operation::ListModels, &[]).unwrap();
        assert_eq!(url, "https://api.openai.com/v1/models");
    }

    #[test]
    fn expands_path_variables_in_order() {
        let (method, url) = resolver()
            .resolve(Operation::RetrieveModel, &["gpt-4"])
            .unwrap();
        assert_eq!(method, Method::GET);
        assert_eq!(url, "https://api.openai.com/v1/models/gpt-4");

        let (_, url) = resolver()
            .resolve(Operation::BillingUsage, &["2024-01-01", "2024-02-01"])
            .unwrap();
        assert_eq!(
            url,
            "https://api.openai.com/v1/dashboard/billing/usage?start_date=2024-01-01&end_date=2024-02-01"
        );
    }

    #[test]
    fn override_replaces_default_url() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "chat-completions".to_string(),
            "https://eu.gateway.internal/openai/chat".to_string(),
        );
        let resolver = EndpointResolver::new("https://api.openai.com", overrides);
        let (_, url) = resolver.resolve(Operation::ChatCompletions, &[]).unwrap();
        assert_eq!(url, "https://eu.gateway.internal/openai/chat");
    }

    #[test]
    fn override_templates_still_expand() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "retrieve-model".to_string(),
            "https://mirror.internal/models/{id}".to_string(),
        );
        let resolver = EndpointResolver::new("https://api.openai.com", overrides);
        let (_, url) = resolver.resolve(Operation::RetrieveModel, &["ada"]).unwrap();
        assert_eq!(url, "https://mirror.internal/models/ada");
    }

    #[test]
    fn variable_count_mismatch_is_an_error() {
        assert!(matches!(
            resolver().resolve(Operation::RetrieveModel, &[]),
            Err(Error::Endpoint(_))
        ));
        assert!(matches!(
            resolver().resolve(Operation::ListModels, &["extra"]),
            Err(Error::Endpoint(_))
        ));
    }

    #[test]
    fn delete_operations_use_delete_method() {
        let (method, _) = resolver().resolve(Operation::DeleteFile, &["file-1"]).unwrap();
        assert_eq!(method, Method::DELETE);
    }
}
