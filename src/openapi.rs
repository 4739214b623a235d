//! OpenAPI document served at `/swagger.json`.

use crate::handlers::{address, auth, opening_hours, store};
use crate::model::{Address, OpeningHours, Store};
use crate::payload::{AddressPayload, Credentials, OpeningHoursPayload, StorePayload};
use crate::response::PageMeta;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(title = "Store API", description = "Stores with shared addresses and opening hours"),
    paths(
        address::list,
        address::create,
        address::read,
        address::update,
        address::delete,
        opening_hours::list,
        opening_hours::create,
        opening_hours::read,
        opening_hours::update,
        opening_hours::delete,
        store::list,
        store::create,
        store::read,
        store::update,
        store::delete,
        auth::obtain_token,
    ),
    components(schemas(
        Address,
        OpeningHours,
        Store,
        AddressPayload,
        OpeningHoursPayload,
        StorePayload,
        Credentials,
        PageMeta,
        auth::TokenBody,
    )),
    modifiers(&TokenSecurity),
    tags(
        (name = "addresses"),
        (name = "opening-hours"),
        (name = "stores"),
        (name = "auth")
    )
)]
pub struct ApiDoc;

/// `Authorization: Token <key>` header scheme, referenced as `token` by the paths.
struct TokenSecurity;

impl Modify for TokenSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "token",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "Authorization",
                "Token <key> or Bearer <key>",
            ))),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_resource_path() {
        let doc = ApiDoc::openapi();
        for path in [
            "/addresses/",
            "/addresses/{id}/",
            "/opening-hours/",
            "/opening-hours/{id}/",
            "/stores/",
            "/stores/{id}/",
            "/api-token-auth/",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("token"));
        assert!(components.schemas.contains_key("Store"));
    }
}
