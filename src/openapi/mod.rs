use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Orders API",
        version = "1.0.0",
        description = r#"
# Storefront Orders API

Checkout, order tracking and manual payment verification for the storefront.

## Authentication

Every endpoint except health and status requires a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

Signing in again invalidates the previous token for the same user. Admin
endpoints additionally require the `admin` role.

## Error Handling

```json
{
  "error": "Bad Request",
  "message": "cart is empty",
  "request_id": "0b5c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Buyer order endpoints"),
        (name = "payment-proofs", description = "Manual payment proof endpoints"),
        (name = "admin", description = "Administrative endpoints"),
        (name = "auth", description = "Session endpoints")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,

        crate::handlers::payment_proofs::submit_payment_proof,
        crate::handlers::payment_proofs::get_payment_proof,
        crate::handlers::payment_proofs::update_payment_proof,

        crate::handlers::admin::list_all_orders,
        crate::handlers::admin::update_order_status,
        crate::handlers::admin::review_payment_proof,

        crate::handlers::auth::logout,
    ),
    components(
        schemas(
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderListResponse,
            crate::services::payment_proofs::PaymentProofRequest,
            crate::services::payment_proofs::ReviewPaymentProofRequest,
            crate::services::payment_proofs::PaymentProofResponse,
            crate::entities::OrderStatus,
            crate::entities::PaymentStatus,
            crate::entities::ProofStatus,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
