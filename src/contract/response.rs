use crate::api::{ApiRequest, ApiResponse};
use crate::contract::schema::{ValidationError, ValidationErrorKind, ValidationResult};
use crate::contract::ContractStore;

/// Validates outbound responses against the compiled contract: the status
/// code must be documented for the operation and the JSON body must conform
/// to the declared schema. Whether a failure is fatal is decided by the
/// pipeline's policy, not here.
pub struct ResponseValidator<'a> {
    contract: &'a ContractStore,
}

impl<'a> ResponseValidator<'a> {
    pub(crate) fn new(contract: &'a ContractStore) -> Self {
        Self { contract }
    }

    pub fn validate(&self, request: &ApiRequest, response: &ApiResponse) -> ValidationResult {
        // An undocumented operation was already reported on the request side;
        // there is nothing to hold the response against.
        let Some((operation, _)) = self.contract.find_operation(&request.method, &request.path) else {
            return ValidationResult::valid();
        };

        let status = response.status.as_u16();
        let Some(schema) = operation.response_schema(status) else {
            return ValidationResult::invalid(vec![ValidationError::new(
                ValidationErrorKind::UnexpectedStatus,
                format!("response.{}", status),
            )]);
        };

        let mut errors = Vec::new();
        if let Some(schema) = schema {
            schema.validate(&response.body, self.contract.schemas(), "response", &mut errors);
        }

        if errors.is_empty() {
            ValidationResult::valid()
        } else {
            ValidationResult::invalid(errors)
        }
    }
}
