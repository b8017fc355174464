use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};

use crate::model::UserContext;

/// Caller identity from the `x-user-id` and `x-user-email` headers.
///
/// Requests without an `x-user-id` are attributed to the anonymous caller.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        match header_value(headers, "x-user-id") {
            Some(user_id) => Ok(UserContext::new(user_id, header_value(headers, "x-user-email"))),
            None => Ok(UserContext::anonymous()),
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> UserContext {
        let (mut parts, _) = request.into_parts();
        UserContext::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_headers_identify_caller() {
        let request = Request::builder()
            .header("x-user-id", "abcd1234")
            .header("x-user-email", "ada@example.com")
            .body(())
            .unwrap();
        let ctx = extract(request).await;
        assert_eq!(ctx.user_id, "abcd1234");
        assert_eq!(ctx.user_email.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn test_missing_or_blank_id_is_anonymous() {
        assert_eq!(extract(Request::builder().body(()).unwrap()).await, UserContext::anonymous());

        let blank = Request::builder().header("x-user-id", "  ").body(()).unwrap();
        assert_eq!(extract(blank).await, UserContext::anonymous());
    }
}
