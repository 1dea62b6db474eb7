use crate::api::{ApiRequest, JsonBody};
use crate::contract::schema::{ValidationError, ValidationErrorKind, ValidationResult};
use crate::contract::{ContractStore, ParamIn};

/// Validates inbound requests against the compiled contract: operation
/// existence, parameter presence and types, and request body schema.
pub struct RequestValidator<'a> {
    contract: &'a ContractStore,
}

impl<'a> RequestValidator<'a> {
    pub(crate) fn new(contract: &'a ContractStore) -> Self {
        Self { contract }
    }

    pub fn validate(&self, request: &ApiRequest) -> ValidationResult {
        let Some((operation, path_params)) = self.contract.find_operation(&request.method, &request.path) else {
            return ValidationResult::invalid(vec![ValidationError::new(
                ValidationErrorKind::OperationNotFound,
                format!("{} {}", request.method, request.path),
            )]);
        };

        let mut errors = Vec::new();
        let index = self.contract.schemas();

        for parameter in &operation.parameters {
            let raw = match parameter.location {
                ParamIn::Query => request.query_value(&parameter.name),
                ParamIn::Header => request.header_value(&parameter.name),
                ParamIn::Path => path_params
                    .iter()
                    .find(|(name, _)| name == &parameter.name)
                    .map(|(_, value)| value.as_str()),
            };
            match raw {
                Some(value) => {
                    if let Some(schema) = &parameter.schema {
                        schema.validate_parameter(value, index, &parameter.descriptor_location(), &mut errors);
                    }
                }
                None if parameter.required => {
                    errors.push(ValidationError::new(
                        ValidationErrorKind::MissingParameter,
                        parameter.descriptor_location(),
                    ));
                }
                None => {}
            }
        }

        match (&request.body, &operation.request_body) {
            (JsonBody::Malformed, _) => {
                errors.push(ValidationError::new(ValidationErrorKind::InvalidJson, "body"));
            }
            (JsonBody::Empty, Some(spec)) if spec.required => {
                errors.push(ValidationError::new(ValidationErrorKind::MissingRequiredField, "body"));
            }
            (JsonBody::Json(value), Some(spec)) => {
                if let Some(schema) = &spec.schema {
                    schema.validate(value, index, "body", &mut errors);
                }
            }
            // Body on an operation that documents none: tolerated, the
            // handler decides what to do with it
            _ => {}
        }

        if errors.is_empty() {
            ValidationResult::valid()
        } else {
            ValidationResult::invalid(errors)
        }
    }
}
