use axum::{http::StatusCode, Json};
use serde::Serialize;
use validator::Validate;

use crate::{errors::ServiceError, ApiResponse};

/// Runs the derive validators and flattens field errors into one message
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(|errors| {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |err| match &err.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: invalid value", field),
                })
            })
            .collect();
        messages.sort();
        ServiceError::ValidationError(messages.join("; "))
    })
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::orders::CreateOrderRequest;

    #[test]
    fn field_errors_are_joined_and_named() {
        let request = CreateOrderRequest {
            shipping_address: String::new(),
            customer_name: "A".into(),
            customer_phone: "1".into(),
            payment_method: "visa".into(),
            notes: String::new(),
        };

        let err = validate_input(&request).unwrap_err();
        let ServiceError::ValidationError(message) = err else {
            panic!("expected validation error");
        };
        assert!(message.contains("shipping_address: Shipping address is required"));
        assert!(message.contains("payment_method: Payment method must be one of"));
    }
}
