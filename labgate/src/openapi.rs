//! OpenAPI document for the portal API, served at `/api-docs/openapi.json` and rendered at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, db, schedule};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token returned by `/authentication/login`:\n\n\
                            ```\nAuthorization: Bearer ACCESS_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "labgate_session",
                    "Session cookie set on login. The cookie name is configurable.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "labgate",
        description = "Training batch scheduling with time-gated lab credentials."
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::get_registration_info,
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::refresh,
        api::handlers::auth::logout,
        api::handlers::auth::me,
        api::handlers::batches::list_batches,
        api::handlers::batches::create_batch,
        api::handlers::batches::get_batch,
        api::handlers::batches::update_batch,
        api::handlers::batches::delete_batch,
        api::handlers::batches::cancel_batch,
        api::handlers::batches::get_batch_credentials,
        api::handlers::users::list_trainers,
        api::handlers::users::get_current_user,
    ),
    components(
        schemas(
            api::models::auth::RegistrationInfo,
            api::models::auth::RegisterRequest,
            api::models::auth::LoginRequest,
            api::models::auth::AuthResponse,
            api::models::auth::AuthSuccessResponse,
            api::models::auth::SessionStatus,
            api::models::batches::LabCredentialsInput,
            api::models::batches::BatchCreate,
            api::models::batches::BatchUpdate,
            api::models::batches::BatchResponse,
            api::models::batches::CredentialResponse,
            api::models::users::Role,
            api::models::users::UserResponse,
            api::models::users::TrainerSummary,
            api::models::users::CurrentUser,
            db::models::batches::LabCredentials,
            db::models::batches::AssignedTrainer,
            schedule::BatchPhase,
            schedule::gate::CredentialDenial,
        )
    ),
    tags(
        (name = "authentication", description = "Registration, login and session management"),
        (name = "batches", description = "Batch scheduling and lab credential release"),
        (name = "users", description = "Trainer directory and profile"),
    )
)]
pub struct ApiDoc;
