use axum::http::HeaderMap;

/// Header carrying the shared admin secret.
pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

/// What the transport knows about the caller.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HeaderMap,
}

impl RequestContext {
    pub fn from_headers(headers: HeaderMap) -> Self {
        Self { headers }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Decides whether a request may run admin-only operations.
pub trait AuthorizationBoundary: Send + Sync {
    fn is_admin(&self, ctx: &RequestContext) -> bool;
}

impl<F> AuthorizationBoundary for F
where
    F: Fn(&RequestContext) -> bool + Send + Sync,
{
    fn is_admin(&self, ctx: &RequestContext) -> bool {
        self(ctx)
    }
}

/// Admin access granted to requests presenting the configured secret in
/// `x-admin-password`.
pub struct SharedSecret {
    secret: String,
}

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl AuthorizationBoundary for SharedSecret {
    fn is_admin(&self, ctx: &RequestContext) -> bool {
        !self.secret.is_empty() && ctx.header(ADMIN_PASSWORD_HEADER) == Some(self.secret.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ctx_with(secret: &str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_PASSWORD_HEADER, HeaderValue::from_str(secret).unwrap());
        RequestContext::from_headers(headers)
    }

    #[test]
    fn shared_secret_matches_header() {
        let boundary = SharedSecret::new("changeme");
        assert!(boundary.is_admin(&ctx_with("changeme")));
        assert!(!boundary.is_admin(&ctx_with("nope")));
        assert!(!boundary.is_admin(&RequestContext::default()));
    }

    #[test]
    fn empty_secret_never_grants_access() {
        let boundary = SharedSecret::new("");
        assert!(!boundary.is_admin(&ctx_with("")));
    }

    #[test]
    fn closures_are_boundaries() {
        let allow_all = |_: &RequestContext| true;
        assert!(allow_all.is_admin(&RequestContext::default()));
    }
}
