//! One-time notifications carried to the next rendered page in a cookie.

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap,
    },
    response::{AppendHeaders, Html, IntoResponse, Response},
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};

const COOKIE_NAME: &str = "flash";

/// `Set-Cookie` value that queues `message` for the next page.
pub fn set_cookie(message: &str) -> String {
    format!(
        "{COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax",
        utf8_percent_encode(message, NON_ALPHANUMERIC)
    )
}

fn clear_cookie() -> String {
    format!("{COOKIE_NAME}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

fn read_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix("flash="))
        .find(|value| !value.is_empty())
        .map(|value| percent_decode_str(value).decode_utf8_lossy().into_owned())
}

/// The pending notification of the incoming request, if any.
#[derive(Debug, Default)]
pub struct Flash {
    message: Option<String>,
}

impl Flash {
    /// Renders a page with the pending message and clears it, so it shows
    /// exactly once.
    pub fn render(self, page: impl FnOnce(Option<&str>) -> String) -> Response {
        let html = Html(page(self.message.as_deref()));
        match self.message {
            Some(_) => (AppendHeaders([(SET_COOKIE, clear_cookie())]), html).into_response(),
            None => html.into_response(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Flash
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Flash {
            message: read_cookie(&parts.headers),
        })
    }
}
